//! Local-Key Signing (SSH)
//!
//! Offline alternative to keyless signing. Payloads are signed with
//! `ssh-keygen -Y sign` under a fixed namespace and verified with
//! `ssh-keygen -Y verify` against an allowed-signers mapping of identity to
//! public key.
//!
//! The namespace tag stops a move signature from being replayed as a
//! signature for any other protocol using the same key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{info, warn};

use crate::signing::backend::SigningBackend;
use crate::signing::config::{expand_home, SigningConfig};
use crate::signing::error::{Result, SigningError};
use crate::signing::payload::MoveAssertion;
use crate::signing::record::{SignedMoveRecord, SigningMethod};
use crate::signing::tool::{ProcessRunner, ScratchSpace, ToolInvocation, ToolRunner};

/// `ssh-keygen -n` namespace for move signatures.
pub const SSH_NAMESPACE: &str = "rps-move";

const PAYLOAD_FILE: &str = "payload.json";
const SIGNATURE_FILE: &str = "payload.json.sig";
const ALLOWED_SIGNERS_FILE: &str = "allowed_signers";
const TOOL: &str = "ssh-keygen";

// =============================================================================
// ALLOWED SIGNERS
// =============================================================================

/// A public key authorized for an identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllowedKey {
    /// Options column (`namespaces="rps-move"`, `valid-after=...`), if any.
    pub options: Option<String>,
    /// Key type and base64 key, e.g. `ssh-ed25519 AAAA...`.
    pub public_key: String,
}

/// Verifier-side trust store: identity to authorized public keys.
///
/// Reads and writes the OpenSSH `allowed_signers` format:
///
/// ```text
/// spiffe://example.org/player/alice ssh-ed25519 AAAAC3Nza...
/// spiffe://example.org/player/bob namespaces="rps-move" ssh-ed25519 AAAAC3Nza...
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllowedSigners {
    entries: BTreeMap<String, Vec<AllowedKey>>,
}

impl AllowedSigners {
    /// Empty mapping (verifies nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorize `public_key` for `identity`.
    pub fn insert(&mut self, identity: impl Into<String>, public_key: impl Into<String>) {
        self.insert_key(
            identity.into(),
            AllowedKey {
                options: None,
                public_key: public_key.into(),
            },
        );
    }

    fn insert_key(&mut self, identity: String, key: AllowedKey) {
        let keys = self.entries.entry(identity).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    /// Keys authorized for `identity`.
    pub fn keys_for(&self, identity: &str) -> &[AllowedKey] {
        self.entries.get(identity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Is `identity` present?
    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    /// Number of identities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No identities at all?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse allowed_signers text. Malformed lines are skipped with a warning.
    pub fn parse(text: &str) -> Self {
        let mut signers = Self::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields = split_fields(line);
            let (options, key_fields) = match fields.as_slice() {
                [_, key_type, key, ..] if looks_like_key_type(key_type) => (None, [*key_type, *key]),
                [_, options, key_type, key, ..] if looks_like_key_type(key_type) => {
                    (Some(options.to_string()), [*key_type, *key])
                }
                _ => {
                    warn!("skipping malformed allowed_signers line {}", index + 1);
                    continue;
                }
            };
            let principals = fields[0].trim_matches('"');
            for principal in principals.split(',').filter(|p| !p.is_empty()) {
                signers.insert_key(
                    principal.to_string(),
                    AllowedKey {
                        options: options.clone(),
                        public_key: key_fields.join(" "),
                    },
                );
            }
        }
        signers
    }

    /// Load an allowed_signers file.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    /// Render in allowed_signers format, one line per key.
    ///
    /// Identities containing whitespace or commas cannot be expressed in the
    /// file format and are left out.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (identity, keys) in &self.entries {
            if identity.is_empty() || identity.contains(|c: char| c.is_whitespace() || c == ',') {
                warn!("identity {:?} cannot appear in allowed_signers, skipped", identity);
                continue;
            }
            for key in keys {
                out.push_str(identity);
                out.push(' ');
                if let Some(options) = &key.options {
                    out.push_str(options);
                    out.push(' ');
                }
                out.push_str(&key.public_key);
                out.push('\n');
            }
        }
        out
    }
}

/// Split on whitespace outside double quotes. Quotes stay in the fields.
fn split_fields(line: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = None;
    let mut quoted = false;
    for (index, c) in line.char_indices() {
        if c.is_whitespace() && !quoted {
            if let Some(begin) = start.take() {
                fields.push(&line[begin..index]);
            }
            continue;
        }
        if c == '"' {
            quoted = !quoted;
        }
        start.get_or_insert(index);
    }
    if let Some(begin) = start {
        fields.push(&line[begin..]);
    }
    fields
}

fn looks_like_key_type(field: &str) -> bool {
    field.starts_with("ssh-")
        || field.starts_with("ecdsa-")
        || field.starts_with("sk-")
        || field.starts_with("rsa-")
}

// =============================================================================
// BACKEND
// =============================================================================

/// SSH-key backend driving `ssh-keygen -Y`.
#[derive(Clone, Debug)]
pub struct LocalKeyBackend<R = ProcessRunner> {
    config: SigningConfig,
    runner: R,
    key: PathBuf,
    allowed_signers: AllowedSigners,
}

impl LocalKeyBackend<ProcessRunner> {
    /// Backend using the real ssh-keygen and the configured default key.
    pub fn new(config: SigningConfig) -> Self {
        Self::with_runner(config, ProcessRunner)
    }
}

impl<R: ToolRunner> LocalKeyBackend<R> {
    /// Backend using a custom tool runner.
    pub fn with_runner(config: SigningConfig, runner: R) -> Self {
        let key = config.default_key.clone();
        Self {
            config,
            runner,
            key,
            allowed_signers: AllowedSigners::new(),
        }
    }

    /// Sign with `key` instead of the default key.
    pub fn with_key(mut self, key: impl Into<PathBuf>) -> Self {
        self.key = key.into();
        self
    }

    /// Trust store used by [`SigningBackend::verify`].
    pub fn with_allowed_signers(mut self, allowed_signers: AllowedSigners) -> Self {
        self.allowed_signers = allowed_signers;
        self
    }

    /// Key used by [`SigningBackend::sign`] (unexpanded).
    pub fn key(&self) -> &Path {
        &self.key
    }

    /// Sign `assertion` with the private key at `key` (`~/` is expanded).
    ///
    /// # Errors
    ///
    /// - [`SigningError::KeyNotFound`] if the key file does not exist
    /// - [`SigningError::SigningFailed`] if ssh-keygen reports an error
    /// - [`SigningError::Timeout`] if ssh-keygen exceeds the configured bound
    /// - [`SigningError::ToolMissing`] if ssh-keygen is not installed
    pub fn sign_with_key(&self, assertion: &MoveAssertion, key: &Path) -> Result<SignedMoveRecord> {
        let key = expand_home(key);
        if !key.exists() {
            return Err(SigningError::KeyNotFound { path: key });
        }

        let payload = assertion.payload();
        let scratch = ScratchSpace::create(self.config.scratch_root.as_deref())?;
        let payload_path = scratch.write(PAYLOAD_FILE, payload.as_bytes())?;

        let invocation = ToolInvocation::new(&self.config.ssh_keygen_bin, self.config.local_key_timeout)
            .arg("-Y")
            .arg("sign")
            .arg("-f")
            .arg(&key)
            .arg("-n")
            .arg(SSH_NAMESPACE)
            .arg(&payload_path);

        let output = self.runner.run(&invocation)?;
        if !output.success {
            return Err(SigningError::SigningFailed {
                tool: TOOL.to_string(),
                diagnostic: output.diagnostic(),
            });
        }

        let armored = scratch.read_to_string(SIGNATURE_FILE).map_err(|e| SigningError::SigningFailed {
            tool: TOOL.to_string(),
            diagnostic: format!("signature not readable: {e}"),
        })?;

        info!(
            "Signed round {} of match {} for {} via ssh key {} (payload {})",
            assertion.round(),
            assertion.match_id(),
            assertion.signer_identity(),
            key.display(),
            payload.digest_hex()
        );

        Ok(SignedMoveRecord::new(
            assertion,
            STANDARD.encode(armored.as_bytes()),
            SigningMethod::LocalKey,
            None,
        ))
    }

    /// Verify an SSH record: true iff `allowed_signers` authorizes a key for
    /// the record's signer identity and the signature is valid for it.
    ///
    /// Bad signatures, unknown identities and malformed trust entries all
    /// return `Ok(false)`, as do local failures running ssh-keygen.
    ///
    /// # Errors
    ///
    /// - [`SigningError::WrongMethod`] for non-SSH records
    /// - [`SigningError::ToolMissing`] if ssh-keygen is not installed
    pub fn verify_with(&self, record: &SignedMoveRecord, allowed_signers: &AllowedSigners) -> Result<bool> {
        if record.signing_method != SigningMethod::LocalKey {
            return Err(SigningError::WrongMethod {
                expected: SigningMethod::LocalKey,
                found: record.signing_method,
            });
        }

        let signature = match STANDARD.decode(record.signature.trim()) {
            Ok(signature) => signature,
            Err(e) => {
                warn!("SSH signature for round {} is not base64: {}", record.round, e);
                return Ok(false);
            }
        };

        match self.run_verify(record, &signature, allowed_signers) {
            Ok(valid) => {
                info!(
                    "SSH verification of round {} of match {} for {}: {}",
                    record.round,
                    record.match_id,
                    record.signer_identity,
                    if valid { "valid" } else { "invalid" }
                );
                Ok(valid)
            }
            Err(e @ SigningError::ToolMissing { .. }) => Err(e),
            Err(e) => {
                warn!("SSH verification could not run, treating as invalid: {}", e);
                Ok(false)
            }
        }
    }

    fn run_verify(
        &self,
        record: &SignedMoveRecord,
        signature: &[u8],
        allowed_signers: &AllowedSigners,
    ) -> Result<bool> {
        let payload = record.payload();
        let scratch = ScratchSpace::create(self.config.scratch_root.as_deref())?;
        let payload_path = scratch.write(PAYLOAD_FILE, payload.as_bytes())?;
        let signature_path = scratch.write(SIGNATURE_FILE, signature)?;
        let allowed_path = scratch.write(ALLOWED_SIGNERS_FILE, allowed_signers.render().as_bytes())?;

        let invocation = ToolInvocation::new(&self.config.ssh_keygen_bin, self.config.local_key_timeout)
            .arg("-Y")
            .arg("verify")
            .arg("-f")
            .arg(&allowed_path)
            .arg("-I")
            .arg(&record.signer_identity)
            .arg("-n")
            .arg(SSH_NAMESPACE)
            .arg("-s")
            .arg(&signature_path)
            .stdin_file(&payload_path);

        let output = self.runner.run(&invocation)?;
        if !output.success {
            tracing::debug!("ssh-keygen rejected payload {}: {}", payload.digest_hex(), output.diagnostic());
        }
        Ok(output.success)
    }
}

impl<R: ToolRunner> SigningBackend for LocalKeyBackend<R> {
    fn method(&self) -> SigningMethod {
        SigningMethod::LocalKey
    }

    fn sign(&self, assertion: &MoveAssertion) -> Result<SignedMoveRecord> {
        self.sign_with_key(assertion, &self.key)
    }

    fn verify(&self, record: &SignedMoveRecord) -> Result<bool> {
        self.verify_with(record, &self.allowed_signers)
    }
}
