//! `catalog-sig verify` - Evaluate an envelope against the signature policy.

use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;

use catalog_sig::{Envelope, GateConfig, Operation, SignatureGate, VerifyContext};

use super::fail;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Envelope file
    pub envelope: PathBuf,

    /// Signed artifact (JSON); its digest must match the envelope
    #[arg(long)]
    pub payload: Option<PathBuf>,

    /// Resource path used for exemptions and audit (defaults to the envelope path)
    #[arg(long)]
    pub resource: Option<String>,

    /// Operation being gated: write, promote or scan
    #[arg(long, default_value = "write")]
    pub operation: Operation,
}

pub fn cmd_verify(args: VerifyArgs, config: &GateConfig) -> i32 {
    match run_verify(&args, config) {
        Ok(true) => exit_codes::OK,
        Ok(false) => exit_codes::DENIED,
        Err(e) => fail(&e),
    }
}

fn run_verify(args: &VerifyArgs, config: &GateConfig) -> Result<bool> {
    let bytes = fs::read(&args.envelope)
        .with_context(|| format!("failed to read envelope: {}", args.envelope.display()))?;
    // An undecodable envelope is evaluated as unsigned so the policy decides.
    let envelope = match Envelope::from_json(&bytes) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            tracing::warn!(
                path = %args.envelope.display(),
                error = %e,
                "undecodable envelope, evaluating as unsigned"
            );
            None
        }
    };

    let resource = args
        .resource
        .clone()
        .unwrap_or_else(|| args.envelope.to_string_lossy().replace('\\', "/"));
    let mut ctx = VerifyContext::new(resource, args.operation);
    if let Some(path) = &args.payload {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read payload: {}", path.display()))?;
        let payload = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse payload JSON: {}", path.display()))?;
        ctx = ctx.with_expected_payload(payload);
    }

    let gate = SignatureGate::new(config);
    let outcome = gate.verify_signature(envelope.as_ref(), &ctx);
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(outcome.ok)
}
