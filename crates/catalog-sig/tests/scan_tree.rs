//! Batch scanning of a catalog tree.

use std::path::Path;
use std::sync::Arc;

use catalog_sig::keys::encode_public_key_b64;
use catalog_sig::{
    load_policy, scan_directory, sign, EnforcementEngine, MemoryAuditSink, Mode, NullAuditSink,
    Operation, Reason,
};
use ed25519_dalek::SigningKey;
use serde_json::json;
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn setup(mode: &str) -> (TempDir, SigningKey) {
    let tmp = TempDir::new().unwrap();
    let key = SigningKey::generate(&mut rand::thread_rng());
    let policy = json!({
        "mode": mode,
        "requireSignature": true,
        "exemptions": ["fixtures/**"],
        "allowedIssuers": {
            "key-1": {
                "algorithm": "ed25519",
                "publicKey": encode_public_key_b64(&key.verifying_key()).unwrap()
            }
        }
    });
    write(&tmp.path().join("policy.json"), &policy.to_string());

    let root = tmp.path().join("catalog");
    let good = json!({"urn": "orders"});
    write(&root.join("specs/orders.json"), &good.to_string());
    let envelope = sign(&good, &key, "key-1").unwrap();
    write(
        &root.join("specs/orders.json.sig"),
        &envelope.to_json_pretty().unwrap(),
    );

    // Signed, then the artifact changed
    let envelope = sign(&json!({"urn": "users"}), &key, "key-1").unwrap();
    write(&root.join("specs/users.json"), r#"{"urn": "users-v2"}"#);
    write(
        &root.join("specs/users.sig.json"),
        &envelope.to_json_pretty().unwrap(),
    );

    write(&root.join("specs/broken.sig"), "not an envelope");
    write(&root.join("fixtures/sample.sig"), "not an envelope either");
    write(&root.join("node_modules/dep/x.sig"), "ignored");
    write(&root.join("README.md"), "# catalog");

    (tmp, key)
}

#[test]
fn test_scan_enforce() {
    let (tmp, _key) = setup("enforce");
    let policy = load_policy(&tmp.path().join("policy.json"));
    let sink = Arc::new(MemoryAuditSink::new());
    let engine = EnforcementEngine::new(sink.clone());

    let report = scan_directory(&tmp.path().join("catalog"), &policy, &engine).unwrap();

    let paths: Vec<_> = report.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "fixtures/sample.sig",
            "specs/broken.sig",
            "specs/orders.json.sig",
            "specs/users.sig.json",
        ]
    );

    let by_path = |p: &str| report.files.iter().find(|f| f.path == p).unwrap();
    assert_eq!(by_path("fixtures/sample.sig").reason, Reason::Exempted);
    assert_eq!(by_path("specs/broken.sig").reason, Reason::Unsigned);
    assert_eq!(by_path("specs/orders.json.sig").reason, Reason::ValidSignature);
    assert_eq!(
        by_path("specs/orders.json.sig").payload.as_deref(),
        Some("specs/orders.json")
    );
    assert_eq!(by_path("specs/users.sig.json").reason.as_str(), "digest_mismatch");

    assert_eq!(report.verified, 2);
    assert_eq!(report.warned, 0);
    assert_eq!(report.errored, 2);
    assert_eq!(report.exit_code(policy.mode()), 4);

    let entries = sink.entries();
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| e.operation == Operation::Scan));
}

#[test]
fn test_scan_permissive_never_fails() {
    let (tmp, _key) = setup("permissive");
    let policy = load_policy(&tmp.path().join("policy.json"));
    let engine = EnforcementEngine::new(Arc::new(NullAuditSink));

    let report = scan_directory(&tmp.path().join("catalog"), &policy, &engine).unwrap();
    assert_eq!(policy.mode(), Mode::Permissive);
    assert_eq!(report.errored, 0);
    assert_eq!(report.warned, 2);
    assert_eq!(report.verified, 2);
    assert_eq!(report.exit_code(policy.mode()), 0);
}

#[test]
fn test_scan_corrupted_artifact_is_denied() {
    let (tmp, _key) = setup("enforce");
    let root = tmp.path().join("catalog");
    write(&root.join("specs/orders.json"), r#"{"urn": "EVIL", broken"#);

    let policy = load_policy(&tmp.path().join("policy.json"));
    let sink = Arc::new(MemoryAuditSink::new());
    let engine = EnforcementEngine::new(sink.clone());
    let report = scan_directory(&root, &policy, &engine).unwrap();

    let orders = report
        .files
        .iter()
        .find(|f| f.path == "specs/orders.json.sig")
        .unwrap();
    assert!(!orders.allowed);
    assert_eq!(orders.reason.as_str(), "digest_mismatch");
    assert_eq!(orders.payload.as_deref(), Some("specs/orders.json"));

    assert_eq!(report.verified, 1);
    assert_eq!(report.errored, 3);
    assert_eq!(report.exit_code(policy.mode()), 4);

    let entry = sink
        .entries()
        .into_iter()
        .find(|e| e.resource == "specs/orders.json.sig")
        .unwrap();
    assert_eq!(entry.errors, vec!["digest_mismatch".to_string()]);
}

#[test]
fn test_scan_missing_root_is_error() {
    let tmp = TempDir::new().unwrap();
    let engine = EnforcementEngine::new(Arc::new(NullAuditSink));
    let result = scan_directory(
        &tmp.path().join("absent"),
        &catalog_sig::Policy::default(),
        &engine,
    );
    assert!(result.is_err());
}
