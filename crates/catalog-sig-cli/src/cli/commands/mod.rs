//! Command implementations.
//!
//! Each command exposes `cmd_x(...) -> i32` wrapping a fallible `run_x`.

pub mod keygen;
pub mod policy;
pub mod scan;
pub mod sign;
pub mod verify;

use catalog_sig::SigError;

use super::args::{Cli, Command};
use crate::exit_codes;

pub fn dispatch(cli: Cli) -> i32 {
    let config = cli.gate_config();
    match cli.cmd {
        Command::Keygen(args) => keygen::cmd_keygen(args),
        Command::Sign(args) => sign::cmd_sign(args),
        Command::Verify(args) => verify::cmd_verify(args, &config),
        Command::Scan(args) => scan::cmd_scan(args, &config),
        Command::Policy(cmd) => policy::cmd_policy(cmd, &config),
    }
}

/// Report an error and map it to an exit code.
pub(crate) fn fail(e: &anyhow::Error) -> i32 {
    eprintln!("error: {e:#}");
    e.downcast_ref::<SigError>()
        .map_or(exit_codes::ERROR, SigError::exit_code)
}
