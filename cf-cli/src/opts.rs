use clap::{Parser, ValueHint};

/// Command line interface for CryptoFlow, rclone-compatible file encryption.
#[derive(Parser, Debug)]
#[clap(name = "cf-cli", version)]
pub struct Opts {
    #[clap(subcommand)]
    pub subcmd: Subcommand,
}

#[derive(Parser, Debug)]
pub enum Subcommand {
    Obscure(ObscureOpts),
    Reveal(RevealOpts),
    EncName(NameOpts),
    DecName(NameOpts),
    Enc(FileOpts),
    Dec(FileOpts),
    Worker(WorkerOpts),
}

/// The password and salt a session is derived from.
#[derive(Parser, Debug)]
pub struct Credentials {
    /// Password, in plaintext.
    #[clap(short, long, env = "CF_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Salt, in plaintext. Leave empty for the default salt.
    #[clap(short, long, env = "CF_SALT", default_value = "", hide_env_values = true)]
    pub salt: String,
}

/// Obscure a password for use in a configuration file.
#[derive(Parser, Debug)]
#[clap(name = "Obscure")]
pub struct ObscureOpts {
    /// Password to obscure.
    #[clap(index = 1)]
    pub password: String,
}

/// Reveal an obscured password.
#[derive(Parser, Debug)]
#[clap(name = "Reveal")]
pub struct RevealOpts {
    /// Obscured password.
    #[clap(index = 1)]
    pub obscured: String,
}

/// Encrypt or decrypt a file name or path.
#[derive(Parser, Debug)]
pub struct NameOpts {
    /// File name or path.
    #[clap(index = 1)]
    pub name: String,

    #[clap(flatten)]
    pub credentials: Credentials,
}

/// Encrypt or decrypt a file.
#[derive(Parser, Debug)]
pub struct FileOpts {
    /// Input file.
    #[clap(index = 1, value_hint = ValueHint::FilePath)]
    pub input: String,

    /// Output file. Defaults to the encrypted (or decrypted) name of the input, next to it.
    #[clap(short, long, value_hint = ValueHint::FilePath)]
    pub output: Option<String>,

    #[clap(flatten)]
    pub credentials: Credentials,
}

/// Answer JSON requests from stdin, one per line.
#[derive(Parser, Debug)]
#[clap(name = "Worker")]
pub struct WorkerOpts {}
