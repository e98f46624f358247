//! Signature envelopes and policy enforcement for governed catalog artifacts.
//!
//! Every write or promotion of a governed artifact passes through
//! [`SignatureGate::verify_signature`], which evaluates the attached
//! [`Envelope`] against a hot-reloaded [`SignaturePolicy`] and appends one
//! [`AuditEntry`] per decision.
//!
//! ```no_run
//! use catalog_sig::{GateConfig, Operation, SignatureGate, VerifyContext};
//!
//! let gate = SignatureGate::new(&GateConfig::from_env());
//! let ctx = VerifyContext::new("specs/orders.sig", Operation::Write);
//! let outcome = gate.verify_signature(None, &ctx);
//! if !outcome.ok {
//!     eprintln!("denied: {:?}", outcome.error_reason);
//! }
//! ```

pub mod audit;
pub mod clock;
pub mod config;
pub mod enforcement;
pub mod envelope;
pub mod error;
pub mod exemption;
pub mod gate;
pub mod jcs;
pub mod keys;
pub mod policy;
pub mod scan;

pub use audit::{
    read_audit_log, AuditEntry, AuditResult, AuditSink, FileAuditSink, MemoryAuditSink,
    NullAuditSink,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::GateConfig;
pub use enforcement::{Decision, EnforcementEngine, EnforcementRequest, Operation, Reason};
pub use envelope::{
    compute_payload_digest, sign, sign_at, verify, CodecError, Envelope, EnvelopeHeader,
    VerificationResult,
};
pub use error::{SigError, SigResult};
pub use exemption::{is_exempt, ExemptionSet};
pub use gate::{SignatureGate, VerifyContext, VerifyDetails, VerifyOutcome};
pub use keys::{compute_key_id, Issuer};
pub use policy::{load_policy, Mode, Policy, PolicyStore, SignaturePolicy};
pub use scan::{scan_directory, ScanFileResult, ScanReport};
