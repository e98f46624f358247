//! Detached-signature envelope codec.
//!
//! An envelope binds a header segment and a payload digest under one
//! signature:
//!
//! ```text
//! header         = base64url(JCS({"alg", "iat", "kid"}))
//! payload_digest = "sha256:" + hex(SHA256(JCS(payload)))
//! signed_bytes   = PAE(ENVELOPE_PAYLOAD_TYPE, header || "." || payload_digest)
//! signature      = base64(ed25519_sign(private_key, signed_bytes))
//! ```
//!
//! The header travels as its encoded segment and is never re-serialized, so
//! the bytes verification recomputes are exactly the bytes that were signed.
//! Verification never fails outright: every problem is reported as a
//! [`CodecError`] on the [`VerificationResult`].

use std::fmt;

use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64_URL};
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{SigError, SigResult};
use crate::jcs;
use crate::keys::{decode_public_key, Issuer};

/// Payload type bound into the pre-authentication encoding.
pub const ENVELOPE_PAYLOAD_TYPE: &str = "application/vnd.catalog.signature-envelope+json;v=1";

/// Ed25519 algorithm name.
pub const ALG_ED25519: &str = "ed25519";

/// Algorithms this codec can verify.
pub const SUPPORTED_ALGORITHMS: &[&str] = &[ALG_ED25519];

const DIGEST_PREFIX: &str = "sha256:";

/// Decoded header segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    #[serde(rename = "alg")]
    pub algorithm: String,

    #[serde(rename = "kid", default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    #[serde(rename = "iat")]
    pub issued_at: DateTime<Utc>,
}

impl EnvelopeHeader {
    /// Encode as the opaque header segment.
    pub fn encode(&self) -> SigResult<String> {
        Ok(BASE64_URL.encode(jcs::to_vec(self)?))
    }

    /// Decode a header segment.
    pub fn decode(segment: &str) -> Result<Self, CodecError> {
        let bytes = BASE64_URL
            .decode(segment.trim_end_matches('='))
            .map_err(|_| CodecError::MalformedHeader)?;
        serde_json::from_slice(&bytes).map_err(|_| CodecError::MalformedHeader)
    }
}

/// A detached-signature envelope as stored next to a governed artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Encoded header segment.
    pub header: String,

    /// `sha256:<hex>` of the canonical payload.
    pub payload_digest: String,

    /// Base64 signature over the pre-authentication encoding.
    pub signature: String,
}

impl Envelope {
    /// Decode the header segment.
    pub fn header(&self) -> Result<EnvelopeHeader, CodecError> {
        EnvelopeHeader::decode(&self.header)
    }

    /// Bytes covered by the signature.
    pub fn signed_bytes(&self) -> Vec<u8> {
        build_signed_bytes(&self.header, &self.payload_digest)
    }

    /// Parse an envelope document.
    pub fn from_json(bytes: &[u8]) -> SigResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| SigError::MalformedEnvelope {
            message: e.to_string(),
        })
    }

    /// Serialize as a pretty-printed envelope document.
    pub fn to_json_pretty(&self) -> SigResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SigError::MalformedEnvelope {
            message: e.to_string(),
        })
    }
}

/// Codec-level verification failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum CodecError {
    #[error("malformed_header")]
    MalformedHeader,
    #[error("unsupported_algorithm")]
    UnsupportedAlgorithm,
    #[error("algorithm_mismatch")]
    AlgorithmMismatch,
    #[error("key_id_mismatch")]
    KeyIdMismatch,
    #[error("invalid_public_key")]
    InvalidPublicKey,
    #[error("malformed_digest")]
    MalformedDigest,
    #[error("malformed_signature")]
    MalformedSignature,
    #[error("invalid_signature")]
    InvalidSignature,
    #[error("digest_mismatch")]
    DigestMismatch,
}

impl CodecError {
    /// Machine-readable code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedHeader => "malformed_header",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::AlgorithmMismatch => "algorithm_mismatch",
            Self::KeyIdMismatch => "key_id_mismatch",
            Self::InvalidPublicKey => "invalid_public_key",
            Self::MalformedDigest => "malformed_digest",
            Self::MalformedSignature => "malformed_signature",
            Self::InvalidSignature => "invalid_signature",
            Self::DigestMismatch => "digest_mismatch",
        }
    }
}

/// Outcome of [`verify`].
///
/// `signature_valid` and `digest_valid` are independent: a trusted signature
/// over a swapped payload reports `true`/`false`, a corrupt signature over the
/// right payload `false`/`true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub signature_valid: bool,
    pub digest_valid: bool,
    pub header: Option<EnvelopeHeader>,
    pub errors: Vec<CodecError>,
}

impl VerificationResult {
    /// Both checks passed.
    pub fn is_valid(&self) -> bool {
        self.signature_valid && self.digest_valid
    }

    /// First reported error, if any.
    pub fn first_error(&self) -> Option<CodecError> {
        self.errors.first().copied()
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "signature_valid={} digest_valid={}",
            self.signature_valid, self.digest_valid
        )?;
        if !self.errors.is_empty() {
            let codes: Vec<&str> = self.errors.iter().map(CodecError::as_str).collect();
            write!(f, " errors=[{}]", codes.join(","))?;
        }
        Ok(())
    }
}

/// Compute the digest of a payload's canonical form.
pub fn compute_payload_digest(payload: &Value) -> SigResult<String> {
    let canonical = jcs::to_vec(payload)?;
    Ok(format!("{DIGEST_PREFIX}{}", hex::encode(Sha256::digest(&canonical))))
}

fn is_well_formed_digest(digest: &str) -> bool {
    digest.strip_prefix(DIGEST_PREFIX).is_some_and(|hex_part| {
        hex_part.len() == 64
            && hex_part
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    })
}

/// Build DSSE Pre-Authentication Encoding (PAE).
///
/// ```text
/// PAE(type, payload) = "DSSEv1" SP LEN(type) SP type SP LEN(payload) SP payload
/// ```
fn build_pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let type_len = payload_type.len().to_string();
    let payload_len = payload.len().to_string();

    let mut pae = Vec::new();
    pae.extend_from_slice(b"DSSEv1 ");
    pae.extend_from_slice(type_len.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload_type.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload_len.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload);
    pae
}

fn build_signed_bytes(header: &str, payload_digest: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(header.len() + 1 + payload_digest.len());
    body.extend_from_slice(header.as_bytes());
    body.push(b'.');
    body.extend_from_slice(payload_digest.as_bytes());
    build_pae(ENVELOPE_PAYLOAD_TYPE, &body)
}

/// Sign a payload, stamping the header with the current time.
pub fn sign(payload: &Value, signing_key: &SigningKey, key_id: &str) -> SigResult<Envelope> {
    sign_at(payload, signing_key, key_id, Utc::now())
}

/// Sign a payload with an explicit issued-at time.
pub fn sign_at(
    payload: &Value,
    signing_key: &SigningKey,
    key_id: &str,
    issued_at: DateTime<Utc>,
) -> SigResult<Envelope> {
    // 1. Digest the canonical payload
    let payload_digest = compute_payload_digest(payload)?;

    // 2. Encode header
    let header = EnvelopeHeader {
        algorithm: ALG_ED25519.to_string(),
        key_id: Some(key_id.to_string()),
        issued_at,
    }
    .encode()?;

    // 3. Sign PAE(header || "." || digest)
    let signature: Signature = signing_key.sign(&build_signed_bytes(&header, &payload_digest));

    Ok(Envelope {
        header,
        payload_digest,
        signature: BASE64.encode(signature.to_bytes()),
    })
}

/// Verify an envelope against an issuer's key.
///
/// The signature check and the payload check run independently. Without an
/// expected payload, `digest_valid` only reflects whether the envelope's
/// digest is well formed.
pub fn verify(
    envelope: &Envelope,
    issuer: &Issuer,
    key_id: &str,
    expected_payload: Option<&Value>,
) -> VerificationResult {
    let mut errors = Vec::new();

    let header = match envelope.header() {
        Ok(header) => Some(header),
        Err(e) => {
            errors.push(e);
            None
        }
    };

    let signature_valid = match &header {
        Some(header) => match check_signature(envelope, header, issuer, key_id) {
            Ok(()) => true,
            Err(e) => {
                errors.push(e);
                false
            }
        },
        None => false,
    };

    let digest_well_formed = is_well_formed_digest(&envelope.payload_digest);
    let digest_valid = match expected_payload {
        Some(payload) => {
            let matches = digest_well_formed
                && compute_payload_digest(payload)
                    .is_ok_and(|actual| actual == envelope.payload_digest);
            if !matches {
                errors.push(CodecError::DigestMismatch);
            }
            matches
        }
        None => digest_well_formed,
    };

    VerificationResult {
        signature_valid,
        digest_valid,
        header,
        errors,
    }
}

fn check_signature(
    envelope: &Envelope,
    header: &EnvelopeHeader,
    issuer: &Issuer,
    key_id: &str,
) -> Result<(), CodecError> {
    // 1. Algorithm must be implemented and match the issuer record
    if !SUPPORTED_ALGORITHMS.contains(&header.algorithm.as_str()) {
        return Err(CodecError::UnsupportedAlgorithm);
    }
    if header.algorithm != issuer.algorithm {
        return Err(CodecError::AlgorithmMismatch);
    }

    // 2. Header must name the key we were asked to verify with
    if header.key_id.as_deref() != Some(key_id) {
        return Err(CodecError::KeyIdMismatch);
    }

    // 3. Decode material
    let key = decode_public_key(&issuer.public_key).map_err(|_| CodecError::InvalidPublicKey)?;
    if !is_well_formed_digest(&envelope.payload_digest) {
        return Err(CodecError::MalformedDigest);
    }
    let signature_bytes = BASE64
        .decode(envelope.signature.trim())
        .map_err(|_| CodecError::MalformedSignature)?;
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|_| CodecError::MalformedSignature)?;

    // 4. Verify
    key.verify(&envelope.signed_bytes(), &signature)
        .map_err(|_| CodecError::InvalidSignature)
}
