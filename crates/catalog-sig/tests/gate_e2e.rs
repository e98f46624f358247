//! End-to-end gate behaviour against real policy and audit files.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use catalog_sig::keys::encode_public_key_b64;
use catalog_sig::{
    read_audit_log, sign, AuditResult, FileAuditSink, GateConfig, MemoryAuditSink, Operation,
    PolicyStore, SignatureGate, SystemClock, VerifyContext,
};
use ed25519_dalek::SigningKey;
use serde_json::json;
use tempfile::TempDir;

fn write_policy(path: &Path, mode: &str, key: &SigningKey, exemptions: &[&str]) {
    let policy = json!({
        "version": 1,
        "mode": mode,
        "requireSignature": true,
        "exemptions": exemptions,
        "allowedIssuers": {
            "key-1": {
                "algorithm": "ed25519",
                "publicKey": encode_public_key_b64(&key.verifying_key()).unwrap()
            }
        },
        "algorithms": ["ed25519"]
    });
    std::fs::write(path, serde_json::to_vec_pretty(&policy).unwrap()).unwrap();
}

#[test]
fn test_enforce_round_trip_writes_one_audit_entry() {
    let tmp = TempDir::new().unwrap();
    let key = SigningKey::generate(&mut rand::thread_rng());
    let config = GateConfig::default().rooted_at(tmp.path());
    std::fs::create_dir_all(config.policy_path.parent().unwrap()).unwrap();
    write_policy(&config.policy_path, "enforce", &key, &[]);

    let gate = SignatureGate::new(&config);
    let payload = json!({"urn": "a"});
    let envelope = sign(&payload, &key, "key-1").unwrap();

    let outcome = gate.verify_signature(
        Some(&envelope),
        &VerifyContext::new("specs/a.json", Operation::Write).with_expected_payload(payload),
    );
    assert!(outcome.ok);
    assert_eq!(outcome.details.key_id.as_deref(), Some("key-1"));
    assert_eq!(outcome.details.algorithm.as_deref(), Some("ed25519"));

    let entries = read_audit_log(&config.audit_log_path).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].result, AuditResult::Allowed);
    assert_eq!(entries[0].reason, "valid_signature");
    assert_eq!(entries[0].resource, "specs/a.json");
    assert_eq!(entries[0].operation, Operation::Write);
}

#[test]
fn test_tampered_payload_denied_and_audited() {
    let tmp = TempDir::new().unwrap();
    let key = SigningKey::generate(&mut rand::thread_rng());
    let policy_path = tmp.path().join("policy.json");
    let audit_path = tmp.path().join("audit.ndjson");
    write_policy(&policy_path, "enforce", &key, &[]);

    let gate = SignatureGate::new(
        &GateConfig::default()
            .with_policy_path(&policy_path)
            .with_audit_log_path(&audit_path),
    );
    let envelope = sign(&json!({"urn": "a"}), &key, "key-1").unwrap();

    let outcome = gate.verify_signature(
        Some(&envelope),
        &VerifyContext::new("specs/a.json", Operation::Promote)
            .with_expected_payload(json!({"urn": "b"})),
    );
    assert!(!outcome.ok);
    assert_eq!(outcome.error_reason.as_deref(), Some("digest_mismatch"));

    let entries = read_audit_log(&audit_path).unwrap();
    assert_eq!(entries[0].result, AuditResult::Denied);
    assert_eq!(entries[0].errors, vec!["digest_mismatch".to_string()]);
}

#[test]
fn test_exemption_applies_even_under_enforce() {
    let tmp = TempDir::new().unwrap();
    let key = SigningKey::generate(&mut rand::thread_rng());
    let policy_path = tmp.path().join("policy.json");
    write_policy(&policy_path, "enforce", &key, &["fixtures/**"]);

    let sink = Arc::new(MemoryAuditSink::new());
    let gate = SignatureGate::with_parts(
        PolicyStore::new(&policy_path),
        sink.clone(),
        Arc::new(SystemClock),
    );

    let outcome = gate.verify_signature(
        None,
        &VerifyContext::new("fixtures\\deep\\x.sig", Operation::Write),
    );
    assert!(outcome.ok);
    assert_eq!(outcome.details.reason.as_str(), "exempted");
    assert_eq!(sink.entries()[0].reason, "exempted");
}

#[test]
fn test_policy_edit_takes_effect_without_restart() {
    let tmp = TempDir::new().unwrap();
    let key = SigningKey::generate(&mut rand::thread_rng());
    let policy_path = tmp.path().join("policy.json");
    write_policy(&policy_path, "permissive", &key, &[]);

    let gate = SignatureGate::with_parts(
        PolicyStore::new(&policy_path),
        Arc::new(MemoryAuditSink::new()),
        Arc::new(SystemClock),
    );
    let ctx = VerifyContext::new("a.sig", Operation::Write);
    assert!(gate.verify_signature(None, &ctx).ok);

    write_policy(&policy_path, "enforce", &key, &[]);
    // Bump mtime explicitly; coarse filesystem timestamps may not advance
    let file = std::fs::File::options()
        .write(true)
        .open(&policy_path)
        .unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(10))
        .unwrap();
    drop(file);

    let outcome = gate.verify_signature(None, &ctx);
    assert!(!outcome.ok);
    assert_eq!(outcome.error_reason.as_deref(), Some("unsigned"));
}

#[test]
fn test_unwritable_audit_log_does_not_block_decision() {
    let tmp = TempDir::new().unwrap();
    let key = SigningKey::generate(&mut rand::thread_rng());
    let policy_path = tmp.path().join("policy.json");
    write_policy(&policy_path, "enforce", &key, &[]);
    let blocker = tmp.path().join("blocker");
    std::fs::write(&blocker, "x").unwrap();

    let gate = SignatureGate::with_parts(
        PolicyStore::new(&policy_path),
        Arc::new(FileAuditSink::new(blocker.join("audit.ndjson"))),
        Arc::new(SystemClock),
    );
    let envelope = sign(&json!({"urn": "a"}), &key, "key-1").unwrap();
    let outcome = gate.verify_signature(
        Some(&envelope),
        &VerifyContext::new("a.sig", Operation::Write),
    );
    assert!(outcome.ok);
}

#[test]
fn test_gate_shared_across_threads() {
    let tmp = TempDir::new().unwrap();
    let key = SigningKey::generate(&mut rand::thread_rng());
    let policy_path = tmp.path().join("policy.json");
    let audit_path = tmp.path().join("audit.ndjson");
    write_policy(&policy_path, "enforce", &key, &[]);

    let gate = Arc::new(SignatureGate::new(
        &GateConfig::default()
            .with_policy_path(&policy_path)
            .with_audit_log_path(&audit_path),
    ));
    let envelope = Arc::new(sign(&json!({"urn": "a"}), &key, "key-1").unwrap());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let gate = Arc::clone(&gate);
            let envelope = Arc::clone(&envelope);
            std::thread::spawn(move || {
                for i in 0..10 {
                    let ctx = VerifyContext::new(format!("t{t}/{i}.sig"), Operation::Write);
                    assert!(gate.verify_signature(Some(&envelope), &ctx).ok);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(read_audit_log(&audit_path).unwrap().len(), 40);
}
