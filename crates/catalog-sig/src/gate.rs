//! Programmatic entrypoint for the registry write path.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::audit::{AuditSink, FileAuditSink};
use crate::clock::{Clock, SystemClock};
use crate::config::GateConfig;
use crate::enforcement::{Decision, EnforcementEngine, EnforcementRequest, Operation, Reason};
use crate::envelope::{CodecError, Envelope};
use crate::policy::{Mode, Policy, PolicyStore};

/// What is being gated.
#[derive(Debug, Clone)]
pub struct VerifyContext {
    pub resource_path: String,
    pub operation: Operation,
    pub expected_payload: Option<Value>,
}

impl VerifyContext {
    pub fn new(resource_path: impl Into<String>, operation: Operation) -> Self {
        Self {
            resource_path: resource_path.into(),
            operation,
            expected_payload: None,
        }
    }

    pub fn with_expected_payload(mut self, payload: Value) -> Self {
        self.expected_payload = Some(payload);
        self
    }
}

/// Traceability detail of a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyDetails {
    pub reason: Reason,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<CodecError>,
}

/// Gate result.
///
/// `ok` is false only under an enforcing policy. `error_reason` is set for
/// every failure reason, so permissive callers still see what would have
/// been denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    pub details: VerifyDetails,
}

impl From<Decision> for VerifyOutcome {
    fn from(decision: Decision) -> Self {
        let error_reason =
            (!decision.reason.is_pass()).then(|| decision.reason.as_str().to_string());
        Self {
            ok: decision.allowed,
            error_reason,
            details: VerifyDetails {
                reason: decision.reason,
                mode: decision.mode,
                key_id: decision.key_id,
                algorithm: decision.algorithm,
                errors: decision.errors,
            },
        }
    }
}

/// Long-lived signature gate: policy cache, engine and audit sink.
#[derive(Debug)]
pub struct SignatureGate {
    store: PolicyStore,
    engine: EnforcementEngine,
}

impl SignatureGate {
    /// Filesystem policy store, file audit sink, wall clock.
    pub fn new(config: &GateConfig) -> Self {
        Self::with_parts(
            PolicyStore::new(&config.policy_path),
            Arc::new(FileAuditSink::new(&config.audit_log_path)),
            Arc::new(SystemClock),
        )
    }

    pub fn with_parts(
        store: PolicyStore,
        sink: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            engine: EnforcementEngine::with_clock(sink, clock),
        }
    }

    /// Current effective policy.
    pub fn policy(&self) -> Arc<Policy> {
        self.store.current()
    }

    pub fn engine(&self) -> &EnforcementEngine {
        &self.engine
    }

    /// Evaluate one envelope (or its absence) against the current policy.
    pub fn verify_signature(
        &self,
        envelope: Option<&Envelope>,
        ctx: &VerifyContext,
    ) -> VerifyOutcome {
        let policy = self.store.current();
        let request = EnforcementRequest::new(&ctx.resource_path, ctx.operation)
            .with_envelope(envelope)
            .with_expected_payload(ctx.expected_payload.as_ref());
        self.engine.evaluate(&policy, &request).into()
    }
}
