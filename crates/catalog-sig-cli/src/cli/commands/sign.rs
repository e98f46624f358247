//! `catalog-sig sign` - Sign a JSON artifact.

use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};

use catalog_sig::keys::load_private_key_pem;

use super::fail;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Artifact to sign (JSON)
    pub payload: PathBuf,

    /// Private key file (PKCS#8 PEM)
    #[arg(long)]
    pub key: PathBuf,

    /// Key id recorded in the envelope header
    #[arg(long)]
    pub key_id: String,

    /// Output path for the envelope (defaults to <payload>.sig)
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

pub fn cmd_sign(args: SignArgs) -> i32 {
    match run_sign(args) {
        Ok(()) => exit_codes::OK,
        Err(e) => fail(&e),
    }
}

fn run_sign(args: SignArgs) -> Result<()> {
    let content = fs::read_to_string(&args.payload)
        .with_context(|| format!("failed to read payload: {}", args.payload.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse payload JSON: {}", args.payload.display()))?;

    let signing_key = load_private_key_pem(&args.key)?;
    let envelope = catalog_sig::sign(&payload, &signing_key, &args.key_id)?;

    let out = args
        .out
        .unwrap_or_else(|| default_envelope_path(&args.payload));
    fs::write(&out, envelope.to_json_pretty()?)
        .with_context(|| format!("failed to write envelope: {}", out.display()))?;

    println!("Signed {}", args.payload.display());
    println!("  key_id:         {}", args.key_id);
    println!("  payload_digest: {}", envelope.payload_digest);
    println!("  envelope:       {}", out.display());

    Ok(())
}

fn default_envelope_path(payload: &Path) -> PathBuf {
    let mut name = payload.as_os_str().to_os_string();
    name.push(".sig");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_envelope_path_appends_suffix() {
        assert_eq!(
            default_envelope_path(Path::new("specs/orders.json")),
            PathBuf::from("specs/orders.json.sig")
        );
    }
}
