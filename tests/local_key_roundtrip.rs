//! End-to-end tests against the real tools.
//!
//! Tests that need `ssh-keygen` return early when it is not installed.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use rps_moves::signing::{
    AllowedSigners, Backend, LocalKeyBackend, MoveAssertion, RecordVerifier, SignedMoveRecord,
    SigningBackend, SigningConfig, SigningError, SigningMethod, VerificationOutcome,
};
use rps_moves::Move;

/// Generate an ed25519 key; `None` if ssh-keygen is missing.
fn generate_key(dir: &Path, name: &str) -> Option<(PathBuf, String)> {
    let key = dir.join(name);
    let status = Command::new("ssh-keygen")
        .args(["-q", "-t", "ed25519", "-N", "", "-C", name, "-f"])
        .arg(&key)
        .status();
    match status {
        Ok(status) if status.success() => {}
        Ok(status) => panic!("ssh-keygen failed: {status}"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            eprintln!("ssh-keygen not installed, skipping");
            return None;
        }
        Err(e) => panic!("ssh-keygen: {e}"),
    }
    let public = std::fs::read_to_string(key.with_extension("pub")).unwrap();
    let public = public.split_whitespace().take(2).collect::<Vec<_>>().join(" ");
    Some((key, public))
}

fn config(scratch: &Path) -> SigningConfig {
    SigningConfig {
        scratch_root: Some(scratch.to_path_buf()),
        ..SigningConfig::default()
    }
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[test]
fn test_ssh_sign_and_verify() {
    let keys = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let Some((key, public)) = generate_key(keys.path(), "peer_a") else {
        return;
    };

    let assertion = MoveAssertion::new(Move::Rock, "m1", 3, "peer-A");
    let backend = LocalKeyBackend::new(config(scratch.path())).with_key(&key);
    let record = backend.sign(&assertion).unwrap();
    assert_eq!(record.signing_method, SigningMethod::LocalKey);
    assert!(!record.signature.is_empty());
    assert!(record.transparency_entry.is_none());

    let mut allowed = AllowedSigners::new();
    allowed.insert("peer-A", public);
    let verifier = RecordVerifier::new(config(scratch.path()), allowed.clone());
    assert_eq!(verifier.verify(&record).unwrap(), VerificationOutcome::Verified);

    // Survives the wire.
    let decoded = SignedMoveRecord::from_json(&record.to_json().unwrap()).unwrap();
    assert_eq!(verifier.verify(&decoded).unwrap(), VerificationOutcome::Verified);

    let mut tampered = record.clone();
    tampered.mv = Move::Paper;
    assert_eq!(verifier.verify(&tampered).unwrap(), VerificationOutcome::Rejected);

    let mut other_round = record.clone();
    other_round.round = 4;
    assert_eq!(verifier.verify(&other_round).unwrap(), VerificationOutcome::Rejected);

    let mut impostor = record.clone();
    impostor.signer_identity = "peer-B".into();
    assert_eq!(verifier.verify(&impostor).unwrap(), VerificationOutcome::Rejected);

    let stranger = RecordVerifier::new(config(scratch.path()), AllowedSigners::new());
    assert_eq!(stranger.verify(&record).unwrap(), VerificationOutcome::Rejected);

    assert!(is_empty_dir(scratch.path()));
}

#[test]
fn test_ssh_wrong_key_rejected() {
    let keys = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let Some((key_a, _)) = generate_key(keys.path(), "peer_a") else {
        return;
    };
    let Some((_, public_b)) = generate_key(keys.path(), "peer_b") else {
        return;
    };

    let record = LocalKeyBackend::new(config(scratch.path()))
        .with_key(&key_a)
        .sign(&MoveAssertion::new(Move::Scissors, "m1", 1, "peer-A"))
        .unwrap();

    let mut allowed = AllowedSigners::new();
    allowed.insert("peer-A", public_b);
    let verifier = RecordVerifier::new(config(scratch.path()), allowed);
    assert_eq!(verifier.verify(&record).unwrap(), VerificationOutcome::Rejected);
}

#[test]
fn test_ssh_missing_key() {
    let scratch = tempfile::tempdir().unwrap();
    let backend = LocalKeyBackend::new(config(scratch.path())).with_key("/nonexistent/rps/id_ed25519");
    let err = backend
        .sign(&MoveAssertion::new(Move::Rock, "m1", 1, "peer-A"))
        .unwrap_err();
    assert!(matches!(err, SigningError::KeyNotFound { .. }));
}

#[test]
fn test_missing_cosign_is_unavailable() {
    let scratch = tempfile::tempdir().unwrap();
    let config = SigningConfig {
        cosign_bin: "rps-no-such-cosign-4242".into(),
        ..config(scratch.path())
    };
    let backend = Backend::for_method(SigningMethod::KeylessTransparency, config);
    let err = backend
        .sign(&MoveAssertion::new(Move::Rock, "m1", 1, "peer-A"))
        .unwrap_err();
    assert!(matches!(err, SigningError::Unavailable));
    assert!(is_empty_dir(scratch.path()));
}

#[cfg(unix)]
#[test]
fn test_hung_cosign_times_out_and_cleans_up() {
    use std::os::unix::fs::PermissionsExt;

    let bin = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let script = bin.path().join("cosign");
    std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = SigningConfig {
        cosign_bin: script,
        keyless_sign_timeout: Duration::from_millis(300),
        ..config(scratch.path())
    };
    let started = std::time::Instant::now();
    let err = Backend::for_method(SigningMethod::KeylessTransparency, config)
        .sign(&MoveAssertion::new(Move::Paper, "m1", 1, "peer-A"))
        .unwrap_err();

    assert!(matches!(err, SigningError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(is_empty_dir(scratch.path()));
}

#[cfg(unix)]
#[test]
fn test_hung_ssh_keygen_times_out_and_cleans_up() {
    use std::os::unix::fs::PermissionsExt;

    let bin = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let script = bin.path().join("ssh-keygen");
    std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    let key = bin.path().join("id_ed25519");
    std::fs::write(&key, "placeholder").unwrap();

    let config = SigningConfig {
        ssh_keygen_bin: script,
        local_key_timeout: Duration::from_millis(300),
        ..config(scratch.path())
    };
    let backend = LocalKeyBackend::new(config).with_key(&key);
    let started = std::time::Instant::now();
    let err = backend
        .sign(&MoveAssertion::new(Move::Rock, "m1", 1, "peer-A"))
        .unwrap_err();

    assert!(matches!(err, SigningError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(is_empty_dir(scratch.path()));
}
