//! Keyless Signing (Sigstore)
//!
//! Signs the canonical payload with `cosign sign-blob` in keyless mode: the
//! signer authenticates with a short-lived OIDC identity, Fulcio issues an
//! ephemeral certificate, and the signature is logged in Rekor. The full
//! bundle is embedded in the record so later verification works offline.
//!
//! ## Scratch Layout
//!
//! ```text
//! rps-move-XXXXXX/
//! ├── payload.json          canonical payload
//! └── payload.json.bundle   cosign bundle (written by sign, supplied for verify)
//! ```

use tracing::{info, warn};

use crate::signing::backend::SigningBackend;
use crate::signing::config::SigningConfig;
use crate::signing::error::{Result, SigningError};
use crate::signing::payload::MoveAssertion;
use crate::signing::record::{SignedMoveRecord, SigningMethod};
use crate::signing::tool::{ProcessRunner, ScratchSpace, ToolInvocation, ToolRunner};

const PAYLOAD_FILE: &str = "payload.json";
const BUNDLE_FILE: &str = "payload.json.bundle";
const TOOL: &str = "cosign";

/// Sigstore keyless backend driving the cosign CLI.
#[derive(Clone, Debug)]
pub struct KeylessBackend<R = ProcessRunner> {
    config: SigningConfig,
    runner: R,
}

impl KeylessBackend<ProcessRunner> {
    /// Backend using the real cosign binary.
    pub fn new(config: SigningConfig) -> Self {
        Self::with_runner(config, ProcessRunner)
    }
}

impl<R: ToolRunner> KeylessBackend<R> {
    /// Backend using a custom tool runner.
    pub fn with_runner(config: SigningConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Sign `assertion` with an ephemeral Fulcio certificate.
    ///
    /// # Errors
    ///
    /// - [`SigningError::Unavailable`] if cosign is not installed
    /// - [`SigningError::SigningFailed`] if cosign reports an error or its
    ///   bundle carries no signature
    /// - [`SigningError::Timeout`] if cosign exceeds the configured bound
    pub fn sign(&self, assertion: &MoveAssertion) -> Result<SignedMoveRecord> {
        let payload = assertion.payload();
        let scratch = ScratchSpace::create(self.config.scratch_root.as_deref())?;
        let payload_path = scratch.write(PAYLOAD_FILE, payload.as_bytes())?;
        let bundle_path = scratch.file(BUNDLE_FILE);

        let invocation = ToolInvocation::new(&self.config.cosign_bin, self.config.keyless_sign_timeout)
            .arg("sign-blob")
            .arg("--yes")
            .arg("--bundle")
            .arg(&bundle_path)
            .arg(&payload_path)
            .env("COSIGN_EXPERIMENTAL", "true");

        let output = match self.runner.run(&invocation) {
            Ok(output) => output,
            Err(SigningError::ToolMissing { tool }) => {
                warn!("{} not installed, keyless signing unavailable", tool);
                return Err(SigningError::Unavailable);
            }
            Err(e) => return Err(e),
        };

        if !output.success {
            return Err(SigningError::SigningFailed {
                tool: TOOL.to_string(),
                diagnostic: output.diagnostic(),
            });
        }

        let bundle = scratch.read_to_string(BUNDLE_FILE).map_err(|e| SigningError::SigningFailed {
            tool: TOOL.to_string(),
            diagnostic: format!("bundle not readable: {e}"),
        })?;

        let signature = extract_bundle_signature(&bundle).ok_or_else(|| SigningError::SigningFailed {
            tool: TOOL.to_string(),
            diagnostic: "bundle has no signature field".to_string(),
        })?;

        info!(
            "Signed round {} of match {} for {} via sigstore (payload {})",
            assertion.round(),
            assertion.match_id(),
            assertion.signer_identity(),
            payload.digest_hex()
        );

        Ok(SignedMoveRecord::new(
            assertion,
            signature,
            SigningMethod::KeylessTransparency,
            Some(bundle),
        ))
    }

    /// Verify a keyless record against its embedded bundle.
    ///
    /// Any identity and issuer are accepted; the binding of identity to
    /// player is the transport's job. Returns `Ok(false)` for a bad
    /// signature, an invalid bundle, or any local failure running cosign.
    ///
    /// # Errors
    ///
    /// - [`SigningError::WrongMethod`] for non-keyless records
    /// - [`SigningError::MissingProof`] if the record carries no bundle
    /// - [`SigningError::ToolMissing`] if cosign is not installed
    pub fn verify(&self, record: &SignedMoveRecord) -> Result<bool> {
        if record.signing_method != SigningMethod::KeylessTransparency {
            return Err(SigningError::WrongMethod {
                expected: SigningMethod::KeylessTransparency,
                found: record.signing_method,
            });
        }

        let bundle = match record.transparency_entry.as_deref() {
            Some(bundle) if !bundle.trim().is_empty() => bundle,
            _ => return Err(SigningError::MissingProof),
        };

        match self.run_verify(record, bundle) {
            Ok(valid) => {
                info!(
                    "Sigstore verification of round {} of match {} for {}: {}",
                    record.round,
                    record.match_id,
                    record.signer_identity,
                    if valid { "valid" } else { "invalid" }
                );
                Ok(valid)
            }
            Err(e @ SigningError::ToolMissing { .. }) => Err(e),
            Err(e) => {
                warn!("Sigstore verification could not run, treating as invalid: {}", e);
                Ok(false)
            }
        }
    }

    fn run_verify(&self, record: &SignedMoveRecord, bundle: &str) -> Result<bool> {
        let payload = record.payload();
        let scratch = ScratchSpace::create(self.config.scratch_root.as_deref())?;
        let payload_path = scratch.write(PAYLOAD_FILE, payload.as_bytes())?;
        let bundle_path = scratch.write(BUNDLE_FILE, bundle.as_bytes())?;

        let invocation = ToolInvocation::new(&self.config.cosign_bin, self.config.keyless_verify_timeout)
            .arg("verify-blob")
            .arg("--bundle")
            .arg(&bundle_path)
            .arg("--certificate-identity-regexp")
            .arg(".*")
            .arg("--certificate-oidc-issuer-regexp")
            .arg(".*")
            .arg(&payload_path);

        let output = self.runner.run(&invocation)?;
        if !output.success {
            tracing::debug!("cosign verify-blob rejected payload {}: {}", payload.digest_hex(), output.diagnostic());
        }
        Ok(output.success)
    }
}

impl<R: ToolRunner> SigningBackend for KeylessBackend<R> {
    fn method(&self) -> SigningMethod {
        SigningMethod::KeylessTransparency
    }

    fn sign(&self, assertion: &MoveAssertion) -> Result<SignedMoveRecord> {
        KeylessBackend::sign(self, assertion)
    }

    fn verify(&self, record: &SignedMoveRecord) -> Result<bool> {
        KeylessBackend::verify(self, record)
    }
}

/// Pull the signature out of a cosign bundle.
///
/// Accepts the legacy `--bundle` layout (`base64Signature`) and the Sigstore
/// bundle v0.3 layout (`messageSignature.signature`).
pub fn extract_bundle_signature(bundle: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(bundle).ok()?;
    value
        .get("base64Signature")
        .or_else(|| value.get("messageSignature").and_then(|m| m.get("signature")))
        .and_then(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
