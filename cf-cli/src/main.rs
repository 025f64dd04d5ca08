mod decrypt;
mod encrypt;
mod names;
mod opts;
mod util;
mod worker;

use crate::opts::{Opts, Subcommand};
use clap::Parser;

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("warn"));

    let opts = Opts::parse();

    let result = match opts.subcmd {
        Subcommand::Obscure(o) => crate::names::obscure(o),
        Subcommand::Reveal(o) => crate::names::reveal(o),
        Subcommand::EncName(o) => crate::names::encrypt(o),
        Subcommand::DecName(o) => crate::names::decrypt(o),
        Subcommand::Enc(o) => crate::encrypt::exec(o).await,
        Subcommand::Dec(o) => crate::decrypt::exec(o).await,
        Subcommand::Worker(o) => crate::worker::exec(o).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
