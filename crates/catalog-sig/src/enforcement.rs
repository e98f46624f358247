//! Signature enforcement engine.
//!
//! # Decision Procedure
//!
//! States are evaluated in order; the first terminal state wins and exactly
//! one audit entry is written before the verdict is returned.
//!
//! | # | State | Reason | Verdict |
//! |---|-------|--------|---------|
//! | 1 | resource matches an exemption | `exempted` | allow |
//! | 2 | `requireSignature=false` and permissive | `permissive_mode` | allow |
//! | 3 | no envelope | `unsigned` | by mode |
//! | 4 | no key id, or undecodable header | `missing_key_id`, `malformed_header` | by mode |
//! | 5 | key id not an allowed issuer | `unknown_issuer` | by mode |
//! | 6 | algorithm not in `policy.algorithms` | `unsupported_algorithm` | by mode |
//! | 7 | codec verification fails | first codec error | by mode |
//! | 8 | `iat + maxAgeDays` has passed (when checked) | `signature_too_old` | by mode |
//! | 9 | all checks pass | `valid_signature` | allow |
//!
//! State 7 reports `invalid_signature` when the codec gives no error, and
//! `digest_mismatch` when the signed artifact exists but is unreadable.
//!
//! "By mode" means denied under `enforce` and allowed under `permissive`. The
//! audited reason never depends on the mode. Permissive allowances in states
//! 3–7 also log a warning; state 8 does not.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::audit::{AuditEntry, AuditSink};
use crate::clock::{Clock, SystemClock};
use crate::envelope::{self, CodecError, Envelope};
use crate::error::SigError;
use crate::policy::{Mode, Policy};

/// Kind of operation being gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Write,
    Promote,
    Scan,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Promote => "promote",
            Self::Scan => "scan",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = SigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "write" => Ok(Self::Write),
            "promote" => Ok(Self::Promote),
            "scan" => Ok(Self::Scan),
            other => Err(SigError::Config {
                message: format!("unknown operation '{other}' (expected write, promote or scan)"),
            }),
        }
    }
}

/// Why a decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    Exempted,
    PermissiveMode,
    Unsigned,
    MissingKeyId,
    UnknownIssuer,
    UnsupportedAlgorithm,
    /// Cryptographic verification failed; carries the first codec error.
    Verification(CodecError),
    SignatureTooOld,
    ValidSignature,
}

impl Reason {
    /// Machine-readable reason code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exempted => "exempted",
            Self::PermissiveMode => "permissive_mode",
            Self::Unsigned => "unsigned",
            Self::MissingKeyId => "missing_key_id",
            Self::UnknownIssuer => "unknown_issuer",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::Verification(err) => err.as_str(),
            Self::SignatureTooOld => "signature_too_old",
            Self::ValidSignature => "valid_signature",
        }
    }

    /// Reasons that are not failures of any kind.
    pub fn is_pass(&self) -> bool {
        matches!(
            self,
            Self::Exempted | Self::PermissiveMode | Self::ValidSignature
        )
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Reason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Verdict plus traceability detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: Reason,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<CodecError>,
}

impl Decision {
    fn pass(mode: Mode, reason: Reason) -> Self {
        Self {
            allowed: true,
            reason,
            mode,
            key_id: None,
            algorithm: None,
            errors: Vec::new(),
        }
    }

    /// A failed check: denied under enforce, allowed under permissive.
    fn reject(mode: Mode, reason: Reason) -> Self {
        Self {
            allowed: mode == Mode::Permissive,
            reason,
            mode,
            key_id: None,
            algorithm: None,
            errors: Vec::new(),
        }
    }

    fn with_key(mut self, key_id: Option<&str>, algorithm: &str) -> Self {
        self.key_id = key_id.map(str::to_string);
        self.algorithm = Some(algorithm.to_string());
        self
    }

    fn with_errors(mut self, errors: Vec<CodecError>) -> Self {
        self.errors = errors;
        self
    }
}

/// One verification attempt.
#[derive(Debug, Clone, Copy)]
pub struct EnforcementRequest<'a> {
    pub envelope: Option<&'a Envelope>,
    pub resource_path: &'a str,
    pub operation: Operation,
    pub expected_payload: Option<&'a Value>,
    /// The signed artifact exists but could not be read or parsed. Its digest
    /// cannot match, so verification fails with `digest_mismatch`.
    pub payload_unreadable: bool,
}

impl<'a> EnforcementRequest<'a> {
    pub fn new(resource_path: &'a str, operation: Operation) -> Self {
        Self {
            envelope: None,
            resource_path,
            operation,
            expected_payload: None,
            payload_unreadable: false,
        }
    }

    pub fn with_envelope(mut self, envelope: Option<&'a Envelope>) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn with_expected_payload(mut self, payload: Option<&'a Value>) -> Self {
        self.expected_payload = payload;
        self
    }

    pub fn with_unreadable_payload(mut self, unreadable: bool) -> Self {
        self.payload_unreadable = unreadable;
        self
    }
}

/// Runs the decision procedure and records every outcome.
#[derive(Clone)]
pub struct EnforcementEngine {
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl EnforcementEngine {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self::with_clock(sink, Arc::new(SystemClock))
    }

    pub fn with_clock(sink: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self { sink, clock }
    }

    /// Decide, audit, return. Never fails.
    pub fn evaluate(&self, policy: &Policy, request: &EnforcementRequest<'_>) -> Decision {
        let now = self.clock.now();
        let decision = decide(policy, request, now);

        if decision.allowed {
            tracing::debug!(
                resource = request.resource_path,
                operation = %request.operation,
                reason = %decision.reason,
                "signature check allowed"
            );
        } else {
            tracing::info!(
                resource = request.resource_path,
                operation = %request.operation,
                reason = %decision.reason,
                "signature check denied"
            );
        }

        self.sink.record(&AuditEntry::from_decision(
            now,
            request.operation,
            request.resource_path,
            &decision,
        ));
        decision
    }
}

impl fmt::Debug for EnforcementEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnforcementEngine").finish_non_exhaustive()
    }
}

fn decide(policy: &Policy, request: &EnforcementRequest<'_>, now: DateTime<Utc>) -> Decision {
    let mode = policy.mode();

    // 1. Exempted
    if policy.exemptions().is_exempt(request.resource_path) {
        return Decision::pass(mode, Reason::Exempted);
    }

    // 2. Policy disabled
    if policy.is_disabled() {
        return Decision::pass(mode, Reason::PermissiveMode);
    }

    // 3. Unsigned
    let Some(envelope) = request.envelope else {
        return warn_if_permissive(request, Decision::reject(mode, Reason::Unsigned));
    };

    // 4. Missing key identifier
    let header = match envelope.header() {
        Ok(header) => header,
        Err(e) => {
            let decision = Decision::reject(mode, Reason::Verification(e)).with_errors(vec![e]);
            return warn_if_permissive(request, decision);
        }
    };
    let Some(key_id) = header.key_id.as_deref().filter(|k| !k.is_empty()) else {
        let decision =
            Decision::reject(mode, Reason::MissingKeyId).with_key(None, &header.algorithm);
        return warn_if_permissive(request, decision);
    };

    // 5. Unknown issuer
    let Some(issuer) = policy.issuer(key_id) else {
        let decision = Decision::reject(mode, Reason::UnknownIssuer)
            .with_key(Some(key_id), &header.algorithm);
        return warn_if_permissive(request, decision);
    };

    // 6. Unsupported algorithm
    if !policy.accepts_algorithm(&header.algorithm) {
        let decision = Decision::reject(mode, Reason::UnsupportedAlgorithm)
            .with_key(Some(key_id), &header.algorithm);
        return warn_if_permissive(request, decision);
    }

    // 7. Cryptographic verification
    let verification = envelope::verify(envelope, issuer, key_id, request.expected_payload);
    let mut errors = verification.errors;
    let mut digest_ok = request.expected_payload.is_none() || verification.digest_valid;
    if request.payload_unreadable && request.expected_payload.is_none() {
        errors.push(CodecError::DigestMismatch);
        digest_ok = false;
    }
    if !verification.signature_valid || !digest_ok {
        let first = errors.first().copied().unwrap_or(CodecError::InvalidSignature);
        let decision = Decision::reject(mode, Reason::Verification(first))
            .with_key(Some(key_id), &header.algorithm)
            .with_errors(errors);
        return warn_if_permissive(request, decision);
    }

    // 8. Expiration (no permissive warning)
    let validation = policy.validation();
    if validation.check_expiration && is_too_old(header.issued_at, validation.max_age_days, now) {
        return Decision::reject(mode, Reason::SignatureTooOld)
            .with_key(Some(key_id), &header.algorithm);
    }

    // 9. Success
    Decision::pass(mode, Reason::ValidSignature).with_key(Some(key_id), &header.algorithm)
}

fn warn_if_permissive(request: &EnforcementRequest<'_>, decision: Decision) -> Decision {
    if decision.allowed {
        tracing::warn!(
            resource = request.resource_path,
            operation = %request.operation,
            reason = %decision.reason,
            "signature check failed; allowed in permissive mode"
        );
    }
    decision
}

fn is_too_old(issued_at: DateTime<Utc>, max_age_days: u32, now: DateTime<Utc>) -> bool {
    match issued_at.checked_add_signed(Duration::days(i64::from(max_age_days))) {
        Some(deadline) => now > deadline,
        None => false,
    }
}
