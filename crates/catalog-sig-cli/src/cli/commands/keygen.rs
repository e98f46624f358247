//! `catalog-sig keygen` - Create a signing key and its policy issuer entry.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use ed25519_dalek::SigningKey;

use catalog_sig::keys::write_keypair;
use catalog_sig::SigError;

use super::fail;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Directory receiving private_key.pem and public_key.pem
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// Replace keys already present in the directory
    #[arg(long, short)]
    pub force: bool,
}

pub fn cmd_keygen(args: KeygenArgs) -> i32 {
    match run_keygen(&args) {
        Ok(()) => exit_codes::OK,
        Err(e) => fail(&e),
    }
}

fn run_keygen(args: &KeygenArgs) -> Result<()> {
    let signing_key = SigningKey::generate(&mut rand::thread_rng());
    let files = match write_keypair(&args.out, &signing_key, args.force) {
        Err(SigError::Config { message }) => {
            anyhow::bail!("{message} (use --force to overwrite)")
        }
        other => other?,
    };

    println!("private key: {} (mode 0600)", files.private_key.display());
    println!("public key:  {}", files.public_key.display());
    println!("key_id: {}", files.key_id);

    // Paste under `allowedIssuers` in the policy document.
    let entry = BTreeMap::from([(&files.key_id, &files.issuer)]);
    println!("{}", serde_json::to_string_pretty(&entry)?);

    Ok(())
}
