//! `catalog-sig scan` - Evaluate every envelope under a directory.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use catalog_sig::{
    load_policy, scan_directory, EnforcementEngine, FileAuditSink, GateConfig, ScanReport,
};

use super::fail;

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Root directory to scan
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Print the full report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn cmd_scan(args: ScanArgs, config: &GateConfig) -> i32 {
    match run_scan(&args, config) {
        Ok(code) => code,
        Err(e) => fail(&e),
    }
}

fn run_scan(args: &ScanArgs, config: &GateConfig) -> Result<i32> {
    let policy = load_policy(&config.policy_path);
    let engine = EnforcementEngine::new(Arc::new(FileAuditSink::new(&config.audit_log_path)));

    let report = scan_directory(&args.root, &policy, &engine)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(report.exit_code(policy.mode()))
}

fn print_report(report: &ScanReport) {
    for file in &report.files {
        let status = if !file.allowed {
            "DENY"
        } else if file.reason.is_pass() {
            "OK"
        } else {
            "WARN"
        };
        println!("{status:<5} {} ({})", file.path, file.reason);
    }
    println!();
    println!(
        "{} envelopes: {} verified, {} warned, {} errored",
        report.total(),
        report.verified,
        report.warned,
        report.errored
    );
}
