use crate::opts::WorkerOpts;
use crate::util::Result;

use cf_core::worker::Worker;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub async fn exec(_opts: WorkerOpts) -> Result<()> {
    let worker = Arc::new(Worker::new());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    log::debug!("worker ready");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        // Key derivation blocks for a while.
        let worker = worker.clone();
        let response = tokio::task::spawn_blocking(move || worker.handle_json(&line)).await?;

        stdout.write_all(response.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}
