//! Batch scan of envelope files under a directory tree.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::enforcement::{EnforcementEngine, EnforcementRequest, Operation, Reason};
use crate::envelope::Envelope;
use crate::error::{SigError, SigResult};
use crate::policy::{Mode, Policy};

/// Exit code when an enforcing scan found denied artifacts.
pub const EXIT_DENIED: i32 = 4;

const SIGNATURE_SUFFIXES: &[&str] = &[".sig.json", ".sig"];

/// Outcome for one envelope file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFileResult {
    /// Root-relative path with forward slashes.
    pub path: String,
    pub allowed: bool,
    pub reason: Reason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Sibling artifact the envelope signs, if one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// Aggregate scan result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub files: Vec<ScanFileResult>,
    pub verified: usize,
    pub warned: usize,
    pub errored: usize,
}

impl ScanReport {
    pub fn total(&self) -> usize {
        self.files.len()
    }

    /// `EXIT_DENIED` under an enforcing policy with denials, otherwise 0.
    pub fn exit_code(&self, mode: Mode) -> i32 {
        if mode == Mode::Enforce && self.errored > 0 {
            EXIT_DENIED
        } else {
            0
        }
    }

    fn push(&mut self, result: ScanFileResult) {
        if !result.allowed {
            self.errored += 1;
        } else if matches!(result.reason, Reason::ValidSignature | Reason::Exempted) {
            self.verified += 1;
        } else {
            self.warned += 1;
        }
        self.files.push(result);
    }
}

/// Evaluate every envelope file under `root` with operation `scan`.
pub fn scan_directory(
    root: &Path,
    policy: &Policy,
    engine: &EnforcementEngine,
) -> SigResult<ScanReport> {
    let mut files = Vec::new();
    collect_signature_files(root, &mut files)?;
    files.sort();

    let mut report = ScanReport::default();
    for path in files {
        let resource = relative_resource_path(root, &path);
        let envelope = read_envelope(&path);
        let sibling = sibling_artifact(&path);
        let expected = sibling.as_deref().and_then(read_payload);
        let unreadable = sibling.is_some() && expected.is_none();

        let request = EnforcementRequest::new(&resource, Operation::Scan)
            .with_envelope(envelope.as_ref())
            .with_expected_payload(expected.as_ref())
            .with_unreadable_payload(unreadable);
        let decision = engine.evaluate(policy, &request);

        report.push(ScanFileResult {
            path: resource.clone(),
            allowed: decision.allowed,
            reason: decision.reason,
            key_id: decision.key_id,
            payload: sibling.map(|p| relative_resource_path(root, &p)),
        });
    }

    tracing::debug!(
        root = %root.display(),
        total = report.total(),
        verified = report.verified,
        warned = report.warned,
        errored = report.errored,
        "signature scan complete"
    );
    Ok(report)
}

fn collect_signature_files(dir: &Path, out: &mut Vec<PathBuf>) -> SigResult<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| SigError::io(dir, e))? {
        let entry = entry.map_err(|e| SigError::io(dir, e))?;
        let path = entry.path();
        let ft = entry.file_type().map_err(|e| SigError::io(&path, e))?;
        if ft.is_dir() {
            let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
            if should_skip_dir(name) {
                continue;
            }
            collect_signature_files(&path, out)?;
        } else if ft.is_file() && signature_stem(&path).is_some() {
            out.push(path);
        }
    }
    Ok(())
}

fn should_skip_dir(name: &str) -> bool {
    matches!(name, ".git" | "target" | "node_modules")
}

/// File name with the signature suffix removed, if it has one.
fn signature_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    SIGNATURE_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .filter(|stem| !stem.is_empty())
}

/// The artifact an envelope file signs: `a.json.sig` signs `a.json`, and
/// `a.sig.json` signs `a`, `a.json`, `a.yaml` or `a.yml`, first match wins.
fn sibling_artifact(sig_path: &Path) -> Option<PathBuf> {
    let stem = signature_stem(sig_path)?;
    let dir = sig_path.parent().unwrap_or_else(|| Path::new(""));
    [
        stem.to_string(),
        format!("{stem}.json"),
        format!("{stem}.yaml"),
        format!("{stem}.yml"),
    ]
    .into_iter()
    .map(|name| dir.join(name))
    .find(|candidate| candidate != sig_path && candidate.is_file())
}

fn read_envelope(path: &Path) -> Option<Envelope> {
    let parsed = std::fs::read(path)
        .map_err(|e| SigError::io(path, e))
        .and_then(|bytes| Envelope::from_json(&bytes));
    match parsed {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "unreadable envelope, evaluating as unsigned"
            );
            None
        }
    }
}

fn read_payload(path: &Path) -> Option<Value> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read signed artifact");
            return None;
        }
    };
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
    let parsed = if is_yaml {
        serde_yaml::from_str::<Value>(&content).map_err(|e| e.to_string())
    } else {
        serde_json::from_str::<Value>(&content).map_err(|e| e.to_string())
    };
    match parsed {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "signed artifact is not JSON or YAML"
            );
            None
        }
    }
}

fn relative_resource_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
