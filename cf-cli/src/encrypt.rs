use crate::opts::FileOpts;
use crate::util::{file_name, progress_bar, session, tracked, write_stream, Result};

use std::path::{Path, PathBuf};
use tokio::fs::File;

pub async fn exec(enc_opts: FileOpts) -> Result<()> {
    let FileOpts {
        input,
        output,
        credentials,
    } = enc_opts;

    let session = session(&credentials)?;

    let input_path = Path::new(&input);
    let output = match output {
        Some(output) => PathBuf::from(output),
        None => input_path.with_file_name(session.encrypt_name(file_name(input_path)?)),
    };

    let source = File::open(input_path).await?;
    let pb = progress_bar(source.metadata().await?.len())?;

    eprintln!("Encrypting {} to {}...", input, output.display());

    let sealed = session.encrypt_stream(tracked(source, pb.clone()))?;
    let written = write_stream(sealed, &output).await?;

    pb.finish();
    log::info!("wrote {written} bytes to {}", output.display());

    Ok(())
}
