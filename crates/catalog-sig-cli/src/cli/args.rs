use clap::{Parser, Subcommand};
use std::path::PathBuf;

use catalog_sig::config::{ENV_AUDIT_LOG_PATH, ENV_POLICY_PATH};
use catalog_sig::GateConfig;

use super::commands::{keygen, policy, scan, sign, verify};

#[derive(Parser, Debug)]
#[command(
    name = "catalog-sig",
    version,
    about = "Sign governed catalog artifacts and enforce signature policy"
)]
pub struct Cli {
    /// Signature policy document (JSON, or YAML by extension)
    #[arg(long, global = true, env = ENV_POLICY_PATH)]
    pub policy: Option<PathBuf>,

    /// Audit log (NDJSON, append-only)
    #[arg(long, global = true, env = ENV_AUDIT_LOG_PATH)]
    pub audit_log: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

impl Cli {
    /// Defaults overridden by flags (or their environment variables).
    pub fn gate_config(&self) -> GateConfig {
        let mut config = GateConfig::default();
        if let Some(path) = &self.policy {
            config = config.with_policy_path(path);
        }
        if let Some(path) = &self.audit_log {
            config = config.with_audit_log_path(path);
        }
        config
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate an ed25519 keypair for signing
    Keygen(keygen::KeygenArgs),

    /// Sign a JSON artifact, writing a detached envelope
    Sign(sign::SignArgs),

    /// Evaluate an envelope against the signature policy
    Verify(verify::VerifyArgs),

    /// Evaluate every envelope under a directory
    Scan(scan::ScanArgs),

    /// Inspect the signature policy
    #[command(subcommand)]
    Policy(policy::PolicyCmd),
}
