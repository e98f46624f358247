//! `catalog-sig policy` - Inspect the signature policy.

use anyhow::Result;
use clap::Subcommand;
use std::path::{Path, PathBuf};

use catalog_sig::{load_policy, GateConfig, SignaturePolicy};

use super::fail;
use crate::exit_codes;

#[derive(Subcommand, Debug)]
pub enum PolicyCmd {
    /// Print the effective policy (the permissive default if none loads)
    Show,

    /// Parse a policy document strictly, reporting errors instead of falling back
    Validate {
        /// Policy file (defaults to the configured policy path)
        path: Option<PathBuf>,
    },
}

pub fn cmd_policy(cmd: PolicyCmd, config: &GateConfig) -> i32 {
    let result = match cmd {
        PolicyCmd::Show => run_show(config),
        PolicyCmd::Validate { path } => {
            run_validate(path.as_deref().unwrap_or(&config.policy_path))
        }
    };
    match result {
        Ok(()) => exit_codes::OK,
        Err(e) => fail(&e),
    }
}

fn run_show(config: &GateConfig) -> Result<()> {
    let policy = load_policy(&config.policy_path);
    println!("{}", serde_json::to_string_pretty(policy.document())?);
    Ok(())
}

fn run_validate(path: &Path) -> Result<()> {
    let policy = SignaturePolicy::from_file(path)?;
    for (key_id, issuer) in &policy.allowed_issuers {
        issuer
            .verifying_key()
            .map_err(|e| anyhow::anyhow!("issuer {key_id}: {e}"))?;
    }
    println!(
        "{}: ok (mode {}, {} issuers, {} exemptions)",
        path.display(),
        policy.mode,
        policy.allowed_issuers.len(),
        policy.exemptions.len()
    );
    Ok(())
}
