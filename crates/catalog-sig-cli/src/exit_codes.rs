//! Process exit codes.

pub const OK: i32 = 0;
/// Usage, configuration or I/O error.
pub const ERROR: i32 = 1;
/// Signature denied by an enforcing policy.
pub const DENIED: i32 = 4;
