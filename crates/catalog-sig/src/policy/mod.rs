//! Signature policy documents.
//!
//! A policy is a JSON (or YAML, by file extension) document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "mode": "enforce",
//!   "requireSignature": true,
//!   "exemptions": ["fixtures/**"],
//!   "allowedIssuers": {
//!     "key-1": { "algorithm": "ed25519", "publicKey": "MCowBQYDK2VwAyEA..." }
//!   },
//!   "algorithms": ["ed25519"],
//!   "validation": { "checkExpiration": true, "maxAgeDays": 90 }
//! }
//! ```
//!
//! Loading never fails: a missing or malformed document resolves to
//! [`SignaturePolicy::default`], which is permissive and evaluates nothing.

pub mod store;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::envelope::ALG_ED25519;
use crate::error::{SigError, SigResult};
use crate::exemption::ExemptionSet;
use crate::keys::Issuer;

pub use store::{FsPolicySource, PolicySource, PolicyStore};

/// Current policy schema version.
pub const POLICY_VERSION: u32 = 1;

/// Default `validation.maxAgeDays`.
pub const DEFAULT_MAX_AGE_DAYS: u32 = 90;

/// Enforcement mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Observe only: never block, record what would have failed.
    #[default]
    Permissive,
    /// Block on failure.
    Enforce,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permissive => "permissive",
            Self::Enforce => "enforce",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signature validation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSettings {
    #[serde(default)]
    pub check_expiration: bool,

    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            check_expiration: false,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
        }
    }
}

/// The policy document as written on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignaturePolicy {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub mode: Mode,

    #[serde(default)]
    pub require_signature: bool,

    /// Glob patterns; matching resources skip every check.
    #[serde(default)]
    pub exemptions: Vec<String>,

    /// Key id -> issuer record.
    #[serde(default)]
    pub allowed_issuers: BTreeMap<String, Issuer>,

    /// Accepted algorithm names, checked independently of issuer records.
    #[serde(default = "default_algorithms")]
    pub algorithms: BTreeSet<String>,

    #[serde(default)]
    pub validation: ValidationSettings,
}

fn default_version() -> u32 {
    POLICY_VERSION
}

fn default_max_age_days() -> u32 {
    DEFAULT_MAX_AGE_DAYS
}

fn default_algorithms() -> BTreeSet<String> {
    BTreeSet::from([ALG_ED25519.to_string()])
}

impl Default for SignaturePolicy {
    /// The fail-open policy: permissive, nothing required, nothing trusted.
    fn default() -> Self {
        Self {
            version: POLICY_VERSION,
            mode: Mode::Permissive,
            require_signature: false,
            exemptions: Vec::new(),
            allowed_issuers: BTreeMap::new(),
            algorithms: default_algorithms(),
            validation: ValidationSettings::default(),
        }
    }
}

impl SignaturePolicy {
    /// Parse a JSON document.
    pub fn from_json(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }

    /// Parse a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, String> {
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    /// Parse using the format implied by `path`'s extension (`.yaml`/`.yml`
    /// are YAML, anything else JSON).
    pub fn parse(path: &Path, content: &str) -> SigResult<Self> {
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        let parsed = if is_yaml {
            Self::from_yaml(content)
        } else {
            Self::from_json(content)
        };
        parsed.map_err(|message| SigError::Policy {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Read and parse a policy file, reporting failures.
    pub fn from_file(path: &Path) -> SigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SigError::io(path, e))?;
        Self::parse(path, &content)
    }
}

/// A loaded policy with its exemptions compiled.
#[derive(Debug, Clone)]
pub struct Policy {
    document: SignaturePolicy,
    exemptions: ExemptionSet,
}

impl Policy {
    pub fn compile(document: SignaturePolicy) -> Self {
        let exemptions = ExemptionSet::new(&document.exemptions);
        Self {
            document,
            exemptions,
        }
    }

    pub fn document(&self) -> &SignaturePolicy {
        &self.document
    }

    pub fn exemptions(&self) -> &ExemptionSet {
        &self.exemptions
    }

    pub fn mode(&self) -> Mode {
        self.document.mode
    }

    /// Signatures are not evaluated at all.
    pub fn is_disabled(&self) -> bool {
        !self.document.require_signature && self.document.mode == Mode::Permissive
    }

    pub fn issuer(&self, key_id: &str) -> Option<&Issuer> {
        self.document.allowed_issuers.get(key_id)
    }

    pub fn accepts_algorithm(&self, algorithm: &str) -> bool {
        self.document.algorithms.contains(algorithm)
    }

    pub fn validation(&self) -> &ValidationSettings {
        &self.document.validation
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::compile(SignaturePolicy::default())
    }
}

impl From<SignaturePolicy> for Policy {
    fn from(document: SignaturePolicy) -> Self {
        Self::compile(document)
    }
}

/// Load a policy file, falling back to the default on any failure.
pub fn load_policy(path: &Path) -> Policy {
    store::load_with(&FsPolicySource, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_is_fail_open() {
        let policy = SignaturePolicy::default();
        assert_eq!(policy.mode, Mode::Permissive);
        assert!(!policy.require_signature);
        assert!(policy.exemptions.is_empty());
        assert!(policy.allowed_issuers.is_empty());
        assert!(policy.algorithms.contains("ed25519"));
        assert_eq!(policy.validation.max_age_days, 90);
        assert!(Policy::default().is_disabled());
    }

    #[test]
    fn test_parse_json_camel_case() {
        let json = r#"{
            "version": 1,
            "mode": "enforce",
            "requireSignature": true,
            "exemptions": ["fixtures/**"],
            "allowedIssuers": {
                "key-1": {"algorithm": "ed25519", "publicKey": "AAAA"}
            },
            "algorithms": ["ed25519"],
            "validation": {"checkExpiration": true, "maxAgeDays": 30}
        }"#;
        let policy = SignaturePolicy::from_json(json).unwrap();
        assert_eq!(policy.mode, Mode::Enforce);
        assert!(policy.require_signature);
        assert_eq!(policy.allowed_issuers["key-1"].public_key, "AAAA");
        assert!(policy.validation.check_expiration);
        assert_eq!(policy.validation.max_age_days, 30);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let policy = SignaturePolicy::from_json(r#"{"mode": "enforce"}"#).unwrap();
        assert_eq!(policy.version, 1);
        assert!(!policy.require_signature);
        assert_eq!(policy.algorithms, default_algorithms());
        assert_eq!(policy.validation, ValidationSettings::default());

        let policy =
            SignaturePolicy::from_json(r#"{"validation": {"checkExpiration": true}}"#).unwrap();
        assert_eq!(policy.validation.max_age_days, DEFAULT_MAX_AGE_DAYS);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let policy = SignaturePolicy::from_json(r#"{"mode": "enforce", "owner": "team-a"}"#);
        assert!(policy.is_ok());
    }

    #[test]
    fn test_invalid_mode_rejected() {
        assert!(SignaturePolicy::from_json(r#"{"mode": "strict"}"#).is_err());
    }

    #[test]
    fn test_parse_by_extension() {
        let yaml = "mode: enforce\nrequireSignature: true\nexemptions:\n  - \"drafts/*\"\n";
        let policy = SignaturePolicy::parse(&PathBuf::from("policy.yaml"), yaml).unwrap();
        assert_eq!(policy.mode, Mode::Enforce);
        assert_eq!(policy.exemptions, vec!["drafts/*".to_string()]);

        let err = SignaturePolicy::parse(&PathBuf::from("policy.json"), yaml).unwrap_err();
        assert!(matches!(err, SigError::Policy { .. }));
    }

    #[test]
    fn test_compiled_policy_accessors() {
        let mut doc = SignaturePolicy {
            mode: Mode::Enforce,
            require_signature: true,
            exemptions: vec!["fixtures/**".to_string()],
            ..Default::default()
        };
        doc.allowed_issuers.insert(
            "key-1".to_string(),
            Issuer {
                algorithm: "ed25519".to_string(),
                public_key: "AAAA".to_string(),
            },
        );

        let policy = Policy::compile(doc);
        assert!(!policy.is_disabled());
        assert!(policy.exemptions().is_exempt("fixtures/a/b.sig"));
        assert!(policy.issuer("key-1").is_some());
        assert!(policy.issuer("key-2").is_none());
        assert!(policy.accepts_algorithm("ed25519"));
        assert!(!policy.accepts_algorithm("rsa"));
    }

    #[test]
    fn test_permissive_with_required_signature_is_not_disabled() {
        let policy = Policy::compile(SignaturePolicy {
            require_signature: true,
            ..Default::default()
        });
        assert!(!policy.is_disabled());

        let policy = Policy::compile(SignaturePolicy {
            mode: Mode::Enforce,
            ..Default::default()
        });
        assert!(!policy.is_disabled());
    }
}
