//! Gate configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable overriding the policy document location.
pub const ENV_POLICY_PATH: &str = "CATALOG_SIG_POLICY";

/// Environment variable overriding the audit log location.
pub const ENV_AUDIT_LOG_PATH: &str = "CATALOG_SIG_AUDIT_LOG";

/// Default policy document location, relative to the working directory.
pub const DEFAULT_POLICY_PATH: &str = ".catalog/signature-policy.json";

/// Default audit log location, relative to the working directory.
pub const DEFAULT_AUDIT_LOG_PATH: &str = ".catalog/audit/signatures.ndjson";

/// Where the gate reads its policy and writes its audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_policy_path")]
    pub policy_path: PathBuf,

    #[serde(default = "default_audit_log_path")]
    pub audit_log_path: PathBuf,
}

fn default_policy_path() -> PathBuf {
    PathBuf::from(DEFAULT_POLICY_PATH)
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from(DEFAULT_AUDIT_LOG_PATH)
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            policy_path: default_policy_path(),
            audit_log_path: default_audit_log_path(),
        }
    }
}

impl GateConfig {
    /// Defaults, overridden by `CATALOG_SIG_POLICY` and `CATALOG_SIG_AUDIT_LOG`.
    /// Empty values are ignored.
    pub fn from_env() -> Self {
        Self {
            policy_path: env_path(ENV_POLICY_PATH).unwrap_or_else(default_policy_path),
            audit_log_path: env_path(ENV_AUDIT_LOG_PATH).unwrap_or_else(default_audit_log_path),
        }
    }

    /// Set the policy path.
    pub fn with_policy_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.policy_path = path.into();
        self
    }

    /// Set the audit log path.
    pub fn with_audit_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_log_path = path.into();
        self
    }

    /// Resolve relative paths against `base`.
    pub fn rooted_at(mut self, base: &Path) -> Self {
        if self.policy_path.is_relative() {
            self.policy_path = base.join(&self.policy_path);
        }
        if self.audit_log_path.is_relative() {
            self.audit_log_path = base.join(&self.audit_log_path);
        }
        self
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
