use crate::opts::Credentials;

use bytes::Bytes;
use cf_core::session::Session;
use cf_core::stream::CipherStream;
use futures::{Stream, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

pub(crate) type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub(crate) fn session(credentials: &Credentials) -> Result<Session> {
    Ok(Session::initialize(&credentials.password, &credentials.salt)?)
}

pub(crate) fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("not a file name: {}", path.display()).into())
}

pub(crate) fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} {binary_bytes_per_sec} ({eta} left)")?
        .progress_chars("#>-"));

    Ok(pb)
}

/// The chunks of `file`, advancing `pb` as they are pulled.
pub(crate) fn tracked(
    file: File,
    pb: ProgressBar,
) -> impl Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static {
    ReaderStream::new(file).inspect_ok(move |chunk| pb.inc(chunk.len() as u64))
}

/// Write `stream` to `path`, removing the file again if the stream fails.
pub(crate) async fn write_stream(mut stream: CipherStream, path: &Path) -> Result<u64> {
    let mut out = File::create(path).await?;
    let mut written = 0;

    let copied: io::Result<()> = async {
        while let Some(chunk) = stream.try_next().await? {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await
    }
    .await;

    if let Err(e) = copied {
        drop(out);
        let _ = tokio::fs::remove_file(path).await;
        return Err(e.into());
    }

    Ok(written)
}
