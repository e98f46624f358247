//! JSON Canonicalization Scheme (RFC 8785).
//!
//! Payload digests and header segments are computed over canonical bytes so
//! that key order and whitespace in the source document never change them.

use serde::Serialize;

use crate::error::{SigError, SigResult};

/// Serialize a value to JCS canonical JSON bytes.
pub fn to_vec<T: Serialize>(value: &T) -> SigResult<Vec<u8>> {
    serde_jcs::to_vec(value).map_err(|e| SigError::Canonicalize {
        message: e.to_string(),
    })
}

/// Serialize a value to a JCS canonical JSON string.
pub fn to_string<T: Serialize>(value: &T) -> SigResult<String> {
    serde_jcs::to_string(value).map_err(|e| SigError::Canonicalize {
        message: e.to_string(),
    })
}
