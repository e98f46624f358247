//! Modification-time cached policy loading.
//!
//! [`PolicyStore`] is owned by the long-lived caller (a registry service, a
//! scanner). It re-parses the document only when the file's modification time
//! advances, the file appears or disappears, or the last load failed, so hot
//! paths pay one `stat` per decision while policy edits take effect without a
//! restart.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use super::{Policy, SignaturePolicy};

/// Where policy documents come from.
pub trait PolicySource: Send + Sync {
    /// Modification time, or `None` if the document does not exist.
    fn modified(&self, path: &Path) -> Option<SystemTime>;

    fn read(&self, path: &Path) -> std::io::Result<String>;
}

/// Reads policy documents from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsPolicySource;

impl PolicySource for FsPolicySource {
    fn modified(&self, path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    fn read(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Read and compile a policy, falling back to the default on any failure.
pub(crate) fn load_with(source: &dyn PolicySource, path: &Path) -> Policy {
    try_load(source, path).unwrap_or_default()
}

/// Read and compile a policy; `None` (after a warning) if it is unavailable
/// or malformed.
fn try_load(source: &dyn PolicySource, path: &Path) -> Option<Policy> {
    let content = match source.read(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "signature policy unavailable, using permissive default"
            );
            return None;
        }
    };

    match SignaturePolicy::parse(path, &content) {
        Ok(document) => {
            tracing::debug!(
                path = %path.display(),
                mode = %document.mode,
                issuers = document.allowed_issuers.len(),
                "loaded signature policy"
            );
            Some(Policy::compile(document))
        }
        Err(e) => {
            tracing::warn!(error = %e, "malformed signature policy, using permissive default");
            None
        }
    }
}

#[derive(Debug)]
struct CachedPolicy {
    modified: Option<SystemTime>,
    policy: Arc<Policy>,
}

/// Cached, lazily reloaded policy.
pub struct PolicyStore {
    path: PathBuf,
    source: Arc<dyn PolicySource>,
    cache: RwLock<Option<CachedPolicy>>,
}

impl PolicyStore {
    /// Store backed by the filesystem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_source(path, Arc::new(FsPolicySource))
    }

    pub fn with_source(path: impl Into<PathBuf>, source: Arc<dyn PolicySource>) -> Self {
        Self {
            path: path.into(),
            source,
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current policy, re-parsed only if the document changed since the last
    /// load.
    ///
    /// Concurrent reloads may race; whichever finishes last stays cached.
    pub fn current(&self) -> Arc<Policy> {
        let seen = self.source.modified(&self.path);

        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache.as_ref() {
                if !needs_reload(seen, cached.modified) {
                    return Arc::clone(&cached.policy);
                }
            }
        }

        // A failed load is cached without an mtime, so an existing document
        // is retried on the next call even if its mtime does not advance.
        let (policy, modified) = match try_load(self.source.as_ref(), &self.path) {
            Some(policy) => (Arc::new(policy), seen),
            None => (Arc::new(Policy::default()), None),
        };
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        *cache = Some(CachedPolicy {
            modified,
            policy: Arc::clone(&policy),
        });
        policy
    }

    /// Drop the cached policy; the next [`current`](Self::current) re-reads.
    pub fn invalidate(&self) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        *cache = None;
    }
}

impl std::fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn needs_reload(seen: Option<SystemTime>, cached: Option<SystemTime>) -> bool {
    match (seen, cached) {
        (Some(seen), Some(cached)) => seen > cached,
        (None, None) => false,
        _ => true,
    }
}
