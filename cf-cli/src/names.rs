use crate::opts::{NameOpts, ObscureOpts, RevealOpts};
use crate::util::{session, Result};

use cf_core::error::Error;
use cf_core::obscure;

pub fn obscure(opts: ObscureOpts) -> Result<()> {
    println!("{}", obscure::obscure(&opts.password));
    Ok(())
}

pub fn reveal(opts: RevealOpts) -> Result<()> {
    println!("{}", obscure::reveal(&opts.obscured)?);
    Ok(())
}

pub fn encrypt(opts: NameOpts) -> Result<()> {
    let session = session(&opts.credentials)?;
    println!("{}", session.encrypt_name(&opts.name));
    Ok(())
}

pub fn decrypt(opts: NameOpts) -> Result<()> {
    let session = session(&opts.credentials)?;
    let name = session.decrypt_name(&opts.name).map_err(Error::from)?;
    println!("{name}");
    Ok(())
}
