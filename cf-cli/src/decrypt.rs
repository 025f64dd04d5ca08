use crate::opts::FileOpts;
use crate::util::{file_name, progress_bar, session, tracked, write_stream, Result};

use cf_core::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs::File;

pub async fn exec(dec_opts: FileOpts) -> Result<()> {
    let FileOpts {
        input,
        output,
        credentials,
    } = dec_opts;

    let session = session(&credentials)?;

    eprintln!("Opening {}", input);

    let input_path = Path::new(&input);
    let output = match output {
        Some(output) => PathBuf::from(output),
        None => {
            let name = session
                .decrypt_name(file_name(input_path)?)
                .map_err(Error::from)?;
            input_path.with_file_name(name)
        }
    };

    let source = File::open(input_path).await?;
    let pb = progress_bar(source.metadata().await?.len())?;

    eprintln!("Decrypting {} to {}...", input, output.display());

    let opened = session.decrypt_stream(tracked(source, pb.clone()))?;
    let written = write_stream(opened, &output).await?;

    pb.finish();
    log::info!("wrote {written} bytes to {}", output.display());

    Ok(())
}
