//! Ed25519 key material and issuer records.
//!
//! Public keys are exchanged as SPKI (PEM text or base64 of the DER bytes),
//! private keys as PKCS#8 PEM. A key's canonical identifier is
//! `sha256:<lowercase-hex>` of its SPKI DER encoding; policies may use any
//! identifier they like, this one is what `keygen` suggests.

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{SigningKey, VerifyingKey};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{SigError, SigResult};

const PEM_MARKER: &str = "-----BEGIN";

pub const PRIVATE_KEY_FILE: &str = "private_key.pem";
pub const PUBLIC_KEY_FILE: &str = "public_key.pem";

/// A policy-registered signing key: expected algorithm plus public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issuer {
    /// Algorithm this issuer signs with (e.g. `ed25519`).
    pub algorithm: String,

    /// SPKI public key, PEM or base64 DER.
    pub public_key: String,
}

impl Issuer {
    /// Build an Ed25519 issuer record from a verifying key.
    pub fn ed25519(key: &VerifyingKey) -> SigResult<Self> {
        Ok(Self {
            algorithm: crate::envelope::ALG_ED25519.to_string(),
            public_key: encode_public_key_b64(key)?,
        })
    }

    /// Decode the public key.
    pub fn verifying_key(&self) -> SigResult<VerifyingKey> {
        decode_public_key(&self.public_key)
    }
}

/// Compute key_id from SPKI-encoded public key bytes.
///
/// Returns `sha256:<lowercase-hex>`.
pub fn compute_key_id(spki_bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(spki_bytes)))
}

/// Compute key_id from a VerifyingKey.
pub fn compute_key_id_from_verifying_key(key: &VerifyingKey) -> SigResult<String> {
    Ok(compute_key_id(&key_to_spki_der(key)?))
}

fn key_to_spki_der(key: &VerifyingKey) -> SigResult<Vec<u8>> {
    let doc = key.to_public_key_der().map_err(|e| SigError::Key {
        message: format!("failed to encode public key as SPKI DER: {e}"),
    })?;
    Ok(doc.as_bytes().to_vec())
}

/// Encode a public key as base64 SPKI DER (the compact policy form).
pub fn encode_public_key_b64(key: &VerifyingKey) -> SigResult<String> {
    Ok(BASE64.encode(key_to_spki_der(key)?))
}

/// Encode a public key as SPKI PEM.
pub fn encode_public_key_pem(key: &VerifyingKey) -> SigResult<String> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| SigError::Key {
            message: format!("failed to encode public key as SPKI PEM: {e}"),
        })
}

/// Decode a public key given as SPKI PEM text or base64 SPKI DER.
pub fn decode_public_key(text: &str) -> SigResult<VerifyingKey> {
    let text = text.trim();
    if text.starts_with(PEM_MARKER) {
        return VerifyingKey::from_public_key_pem(text).map_err(|e| SigError::Key {
            message: format!("invalid SPKI PEM public key: {e}"),
        });
    }

    let bytes = BASE64.decode(text).map_err(|e| SigError::Key {
        message: format!("invalid base64 public key: {e}"),
    })?;
    VerifyingKey::from_public_key_der(&bytes).map_err(|e| SigError::Key {
        message: format!("invalid SPKI public key: {e}"),
    })
}

/// Load a public key from an SPKI PEM file.
pub fn load_public_key_pem(path: &Path) -> SigResult<VerifyingKey> {
    let pem = fs::read_to_string(path).map_err(|e| SigError::io(path, e))?;
    VerifyingKey::from_public_key_pem(pem.trim()).map_err(|e| SigError::Key {
        message: format!("failed to parse public key PEM {}: {e}", path.display()),
    })
}

/// Load a private key from a PKCS#8 PEM file.
pub fn load_private_key_pem(path: &Path) -> SigResult<SigningKey> {
    let pem = fs::read_to_string(path).map_err(|e| SigError::io(path, e))?;
    SigningKey::from_pkcs8_pem(pem.trim()).map_err(|e| SigError::Key {
        message: format!("failed to parse private key PEM {}: {e}", path.display()),
    })
}

/// A keypair persisted by [`write_keypair`].
#[derive(Debug, Clone)]
pub struct KeypairFiles {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
    pub key_id: String,
    /// Ready-made `allowedIssuers` record for the public key.
    pub issuer: Issuer,
}

/// Write `key` into `dir` as `private_key.pem` (PKCS#8, owner-only on unix)
/// and `public_key.pem` (SPKI).
///
/// Fails with [`SigError::Config`] if either file exists and `overwrite` is
/// not set; nothing is written in that case.
pub fn write_keypair(dir: &Path, key: &SigningKey, overwrite: bool) -> SigResult<KeypairFiles> {
    let private_key = dir.join(PRIVATE_KEY_FILE);
    let public_key = dir.join(PUBLIC_KEY_FILE);
    if !overwrite {
        if let Some(existing) = [&private_key, &public_key].into_iter().find(|p| p.exists()) {
            return Err(SigError::Config {
                message: format!("{} already exists", existing.display()),
            });
        }
    }
    fs::create_dir_all(dir).map_err(|e| SigError::io(dir, e))?;

    let pem = key.to_pkcs8_pem(LineEnding::LF).map_err(|e| SigError::Key {
        message: format!("failed to encode private key as PKCS#8 PEM: {e}"),
    })?;
    write_owner_only(&private_key, pem.as_bytes())?;

    let verifying = key.verifying_key();
    fs::write(&public_key, encode_public_key_pem(&verifying)?)
        .map_err(|e| SigError::io(&public_key, e))?;

    Ok(KeypairFiles {
        key_id: compute_key_id_from_verifying_key(&verifying)?,
        issuer: Issuer::ed25519(&verifying)?,
        private_key,
        public_key,
    })
}

#[cfg(unix)]
fn write_owner_only(path: &Path, bytes: &[u8]) -> SigResult<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| SigError::io(path, e))?;
    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))
        .map_err(|e| SigError::io(path, e))?;
    file.write_all(bytes).map_err(|e| SigError::io(path, e))
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, bytes: &[u8]) -> SigResult<()> {
    fs::write(path, bytes).map_err(|e| SigError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_keypair() -> SigningKey {
        SigningKey::generate(&mut rand::thread_rng())
    }

    #[test]
    fn test_key_id_lowercase_hex() {
        let key = generate_keypair();
        let key_id = compute_key_id_from_verifying_key(&key.verifying_key()).unwrap();

        assert!(key_id.starts_with("sha256:"));
        let hex_part = &key_id[7..];
        assert_eq!(hex_part.len(), 64);
        assert!(hex_part
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_decode_public_key_b64_and_pem() {
        let key = generate_keypair().verifying_key();

        let b64 = encode_public_key_b64(&key).unwrap();
        assert_eq!(decode_public_key(&b64).unwrap(), key);

        let pem = encode_public_key_pem(&key).unwrap();
        assert_eq!(decode_public_key(&pem).unwrap(), key);
    }

    #[test]
    fn test_decode_public_key_rejects_garbage() {
        assert!(decode_public_key("not base64 !!").is_err());
        assert!(decode_public_key("aGVsbG8=").is_err());
        let bad_pem = "-----BEGIN PUBLIC KEY-----\nxx\n-----END PUBLIC KEY-----";
        assert!(decode_public_key(bad_pem).is_err());
    }

    #[test]
    fn test_load_pem_files() {
        let dir = tempfile::tempdir().unwrap();
        let key = generate_keypair();

        let private_path = dir.path().join("private_key.pem");
        let public_path = dir.path().join("public_key.pem");
        let private_pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        fs::write(&private_path, private_pem.as_bytes()).unwrap();
        fs::write(
            &public_path,
            encode_public_key_pem(&key.verifying_key()).unwrap(),
        )
        .unwrap();

        let loaded = load_private_key_pem(&private_path).unwrap();
        assert_eq!(loaded.to_bytes(), key.to_bytes());
        assert_eq!(
            load_public_key_pem(&public_path).unwrap(),
            key.verifying_key()
        );
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_public_key_pem(Path::new("/nonexistent/public_key.pem")).unwrap_err();
        assert!(matches!(err, SigError::Io { .. }));
    }

    #[test]
    fn test_issuer_roundtrip() {
        let key = generate_keypair().verifying_key();
        let issuer = Issuer::ed25519(&key).unwrap();
        assert_eq!(issuer.algorithm, "ed25519");
        assert_eq!(issuer.verifying_key().unwrap(), key);

        let json = serde_json::to_value(&issuer).unwrap();
        assert!(json.get("publicKey").is_some());
    }

    #[test]
    fn test_write_keypair_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let key = generate_keypair();
        let out = dir.path().join("keys");

        let files = write_keypair(&out, &key, false).unwrap();
        assert_eq!(files.private_key, out.join(PRIVATE_KEY_FILE));
        assert_eq!(
            load_private_key_pem(&files.private_key).unwrap().to_bytes(),
            key.to_bytes()
        );
        assert_eq!(
            load_public_key_pem(&files.public_key).unwrap(),
            key.verifying_key()
        );
        assert_eq!(
            files.key_id,
            compute_key_id_from_verifying_key(&key.verifying_key()).unwrap()
        );
        assert_eq!(files.issuer.verifying_key().unwrap(), key.verifying_key());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&files.private_key).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_write_keypair_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let first = generate_keypair();
        write_keypair(dir.path(), &first, false).unwrap();

        let second = generate_keypair();
        let err = write_keypair(dir.path(), &second, false).unwrap_err();
        assert!(matches!(err, SigError::Config { .. }));
        let kept = load_private_key_pem(&dir.path().join(PRIVATE_KEY_FILE)).unwrap();
        assert_eq!(kept.to_bytes(), first.to_bytes());

        write_keypair(dir.path(), &second, true).unwrap();
        let replaced = load_private_key_pem(&dir.path().join(PRIVATE_KEY_FILE)).unwrap();
        assert_eq!(replaced.to_bytes(), second.to_bytes());
    }
}
