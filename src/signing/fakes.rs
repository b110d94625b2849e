//! Fake cosign and ssh-keygen for unit tests.
//!
//! Both fakes read and write the real scratch files named in their
//! arguments, so backend tests exercise the full file lifecycle. Signatures
//! are SHA-256 digests over a key id and the payload: tampering with the
//! payload or swapping the key breaks verification, as with the real tools.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Sha256, Digest};

use crate::signing::error::{Result, SigningError};
use crate::signing::tool::{ToolInvocation, ToolOutput, ToolRunner};

fn fake_signature(key_id: &str, payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key_id.as_bytes());
    hasher.update(b":");
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

fn last_arg_path(invocation: &ToolInvocation) -> Option<PathBuf> {
    invocation.args.last().map(PathBuf::from)
}

/// Records every invocation it receives.
#[derive(Default)]
pub(crate) struct CallLog {
    calls: Mutex<Vec<ToolInvocation>>,
}

impl CallLog {
    fn push(&self, invocation: &ToolInvocation) {
        self.calls.lock().unwrap().push(invocation.clone());
    }

    pub(crate) fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Every path-like argument seen so far.
    pub(crate) fn paths(&self) -> Vec<PathBuf> {
        self.calls()
            .iter()
            .flat_map(|c| {
                c.args
                    .iter()
                    .map(|a| PathBuf::from(a.as_os_str()))
                    .chain(c.stdin.iter().cloned())
                    .collect::<Vec<_>>()
            })
            .filter(|p| p.is_absolute())
            .collect()
    }
}

// =============================================================================
// COSIGN
// =============================================================================

/// Behaviour of [`FakeCosign`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum CosignMode {
    /// Signs and verifies.
    Working,
    /// `sign-blob` fails with this stderr.
    SignFails(String),
    /// `sign-blob` exits 0 without writing a bundle.
    NoBundle,
    /// Binary not installed.
    Missing,
    /// Every call times out.
    Hangs,
}

/// In-process stand-in for `cosign`.
pub(crate) struct FakeCosign {
    pub(crate) mode: CosignMode,
    pub(crate) log: CallLog,
}

impl FakeCosign {
    pub(crate) fn new(mode: CosignMode) -> Self {
        Self {
            mode,
            log: CallLog::default(),
        }
    }

    fn sign_blob(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        if let CosignMode::SignFails(stderr) = &self.mode {
            return Ok(ToolOutput::failed(1, stderr.clone()));
        }
        let payload_path = last_arg_path(invocation).unwrap();
        let bundle_path = invocation.flag_value("--bundle").unwrap();
        let payload = std::fs::read(&payload_path)?;
        if self.mode == CosignMode::NoBundle {
            return Ok(ToolOutput::ok());
        }
        let bundle = serde_json::json!({
            "base64Signature": STANDARD.encode(fake_signature("fulcio-ephemeral", &payload)),
            "cert": "LS0tLS1CRUdJTiBDRVJUSUZJQ0FURS0tLS0t",
            "rekorBundle": {
                "SignedEntryTimestamp": "MEUCIQ==",
                "Payload": { "body": "eyJ9", "integratedTime": 1700000000, "logIndex": 42 }
            }
        });
        std::fs::write(bundle_path, bundle.to_string())?;
        Ok(ToolOutput::ok())
    }

    fn verify_blob(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        if invocation.flag_value("--certificate-identity-regexp") != Some(".*")
            || invocation.flag_value("--certificate-oidc-issuer-regexp") != Some(".*")
        {
            return Ok(ToolOutput::failed(1, "missing identity constraints"));
        }
        let payload = std::fs::read(last_arg_path(invocation).unwrap())?;
        let bundle = std::fs::read_to_string(invocation.flag_value("--bundle").unwrap())?;
        let Ok(bundle) = serde_json::from_str::<serde_json::Value>(&bundle) else {
            return Ok(ToolOutput::failed(1, "invalid bundle"));
        };
        let expected = STANDARD.encode(fake_signature("fulcio-ephemeral", &payload));
        if bundle["base64Signature"].as_str() == Some(expected.as_str()) {
            Ok(ToolOutput::ok())
        } else {
            Ok(ToolOutput::failed(1, "error: invalid signature when validating ASN.1 encoded signature"))
        }
    }
}

impl ToolRunner for FakeCosign {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        self.log.push(invocation);
        match self.mode {
            CosignMode::Missing => {
                return Err(SigningError::ToolMissing { tool: invocation.tool_name() })
            }
            CosignMode::Hangs => {
                return Err(SigningError::Timeout {
                    tool: invocation.tool_name(),
                    after: invocation.timeout,
                })
            }
            _ => {}
        }
        match invocation.arg_str(0) {
            Some("sign-blob") => self.sign_blob(invocation),
            Some("verify-blob") => self.verify_blob(invocation),
            Some("version") => Ok(ToolOutput {
                stdout: "GitVersion: v2.2.0".into(),
                ..ToolOutput::ok()
            }),
            _ => Ok(ToolOutput::failed(1, "unknown command")),
        }
    }
}

// =============================================================================
// SSH-KEYGEN
// =============================================================================

/// Write a fake private key; its public half is `ssh-fake <key_id>`.
pub(crate) fn write_fake_key(dir: &Path, key_id: &str) -> PathBuf {
    let path = dir.join(format!("{key_id}_ed25519"));
    std::fs::write(&path, format!("FAKE-PRIVATE {key_id}\n")).unwrap();
    path
}

/// Public key text matching [`write_fake_key`].
pub(crate) fn fake_public_key(key_id: &str) -> String {
    format!("ssh-fake {key_id}")
}

/// In-process stand-in for `ssh-keygen -Y sign|verify`.
#[derive(Default)]
pub(crate) struct FakeSshKeygen {
    pub(crate) log: CallLog,
    /// Every call times out.
    pub(crate) hangs: bool,
}

impl FakeSshKeygen {
    fn sign(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let key = std::fs::read_to_string(invocation.flag_value("-f").unwrap())?;
        let Some(key_id) = key.trim().strip_prefix("FAKE-PRIVATE ") else {
            return Ok(ToolOutput::failed(255, "Load key failed: invalid format"));
        };
        let namespace = invocation.flag_value("-n").unwrap();
        let payload_path = last_arg_path(invocation).unwrap();
        let payload = std::fs::read(&payload_path)?;

        let armored = format!(
            "-----BEGIN SSH SIGNATURE-----\n{} {} {}\n-----END SSH SIGNATURE-----\n",
            key_id,
            namespace,
            fake_signature(key_id, &payload)
        );
        let mut sig_path = payload_path.into_os_string();
        sig_path.push(".sig");
        std::fs::write(sig_path, armored)?;
        Ok(ToolOutput::ok())
    }

    fn verify(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let rejected = || -> Result<ToolOutput> {
            Ok(ToolOutput::failed(255, "Could not verify signature."))
        };

        let allowed = std::fs::read_to_string(invocation.flag_value("-f").unwrap())?;
        let identity = invocation.flag_value("-I").unwrap();
        let namespace = invocation.flag_value("-n").unwrap();
        let sig = std::fs::read_to_string(invocation.flag_value("-s").unwrap())?;
        let payload = std::fs::read(invocation.stdin.as_ref().unwrap())?;

        let Some(body) = sig.lines().nth(1) else { return rejected() };
        let parts: Vec<&str> = body.split_whitespace().collect();
        let [key_id, sig_namespace, digest] = parts.as_slice() else { return rejected() };

        let key_allowed = allowed.lines().any(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            fields.len() >= 3
                && fields[0].split(',').any(|p| p == identity)
                && fields[fields.len() - 2..] == ["ssh-fake", *key_id]
        });

        if key_allowed
            && *sig_namespace == namespace
            && *digest == fake_signature(key_id, &payload)
        {
            Ok(ToolOutput {
                stdout: format!("Good \"{namespace}\" signature for {identity}"),
                ..ToolOutput::ok()
            })
        } else {
            rejected()
        }
    }
}

impl ToolRunner for FakeSshKeygen {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        self.log.push(invocation);
        if self.hangs {
            return Err(SigningError::Timeout {
                tool: invocation.tool_name(),
                after: invocation.timeout,
            });
        }
        match (invocation.arg_str(0), invocation.arg_str(1)) {
            (Some("-Y"), Some("sign")) => self.sign(invocation),
            (Some("-Y"), Some("verify")) => self.verify(invocation),
            _ => Ok(ToolOutput::failed(1, "usage: ssh-keygen")),
        }
    }
}

// =============================================================================
// BOTH
// =============================================================================

/// Routes by program name to a fake cosign or a fake ssh-keygen.
pub(crate) struct FakeTools {
    pub(crate) cosign: FakeCosign,
    pub(crate) ssh: FakeSshKeygen,
}

impl FakeTools {
    pub(crate) fn new(mode: CosignMode) -> Self {
        Self {
            cosign: FakeCosign::new(mode),
            ssh: FakeSshKeygen::default(),
        }
    }
}

impl ToolRunner for FakeTools {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        match invocation.tool_name().as_str() {
            "cosign" => self.cosign.run(invocation),
            "ssh-keygen" => self.ssh.run(invocation),
            other => Err(SigningError::ToolMissing { tool: other.to_string() }),
        }
    }
}
