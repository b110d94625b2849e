//! Backend Dispatch
//!
//! The set of backends is closed: keyless (Sigstore), local key (SSH) and
//! unsigned. [`Backend`] picks one for signing; [`RecordVerifier`] checks a
//! received record by dispatching on the tag stored in it.

use std::fmt;

use crate::signing::config::SigningConfig;
use crate::signing::error::Result;
use crate::signing::keyless::KeylessBackend;
use crate::signing::local_key::{AllowedSigners, LocalKeyBackend};
use crate::signing::payload::MoveAssertion;
use crate::signing::probe::{probe, SigningEnvironment};
use crate::signing::record::{SignedMoveRecord, SigningMethod};
use crate::signing::tool::{ProcessRunner, ToolRunner};
use crate::signing::unsigned::UnsignedBackend;

/// Uniform contract of every signing backend.
///
/// Calls block on an external tool; run them off latency-sensitive threads.
pub trait SigningBackend {
    /// Method tag written into produced records.
    fn method(&self) -> SigningMethod;

    /// Sign an assertion.
    fn sign(&self, assertion: &MoveAssertion) -> Result<SignedMoveRecord>;

    /// Check a record produced by this backend.
    ///
    /// `Ok(false)` means "not verified"; errors indicate misuse or missing
    /// infrastructure.
    fn verify(&self, record: &SignedMoveRecord) -> Result<bool>;
}

/// One of the three backends.
#[derive(Clone, Debug)]
pub enum Backend<R = ProcessRunner> {
    /// Sigstore keyless signing.
    Keyless(KeylessBackend<R>),
    /// Local SSH key.
    LocalKey(LocalKeyBackend<R>),
    /// No signature.
    Unsigned(UnsignedBackend),
}

impl Backend<ProcessRunner> {
    /// Backend for `method` using the real tools.
    pub fn for_method(method: SigningMethod, config: SigningConfig) -> Self {
        Self::for_method_with_runner(method, config, ProcessRunner)
    }
}

impl<R: ToolRunner> Backend<R> {
    /// Backend for `method` using a custom tool runner.
    pub fn for_method_with_runner(method: SigningMethod, config: SigningConfig, runner: R) -> Self {
        match method {
            SigningMethod::KeylessTransparency => {
                Backend::Keyless(KeylessBackend::with_runner(config, runner))
            }
            SigningMethod::LocalKey => Backend::LocalKey(LocalKeyBackend::with_runner(config, runner)),
            SigningMethod::Unsigned => Backend::Unsigned(UnsignedBackend),
        }
    }

    /// Backend chosen by probing `environment`.
    pub fn probed<E: SigningEnvironment>(environment: &E, config: SigningConfig, runner: R) -> Self {
        Self::for_method_with_runner(probe(environment), config, runner)
    }
}

impl<R: ToolRunner> SigningBackend for Backend<R> {
    fn method(&self) -> SigningMethod {
        match self {
            Backend::Keyless(b) => b.method(),
            Backend::LocalKey(b) => b.method(),
            Backend::Unsigned(b) => b.method(),
        }
    }

    fn sign(&self, assertion: &MoveAssertion) -> Result<SignedMoveRecord> {
        match self {
            Backend::Keyless(b) => b.sign(assertion),
            Backend::LocalKey(b) => SigningBackend::sign(b, assertion),
            Backend::Unsigned(b) => b.sign(assertion),
        }
    }

    fn verify(&self, record: &SignedMoveRecord) -> Result<bool> {
        match self {
            Backend::Keyless(b) => b.verify(record),
            Backend::LocalKey(b) => SigningBackend::verify(b, record),
            Backend::Unsigned(b) => b.verify(record),
        }
    }
}

/// Verdict on a received record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Signature checked out for the claimed signer.
    Verified,
    /// Signature did not verify.
    Rejected,
    /// Record is unsigned: asserted but not authenticated.
    Unauthenticated,
}

impl VerificationOutcome {
    /// Only `Verified` counts as authentic.
    pub fn is_verified(self) -> bool {
        self == VerificationOutcome::Verified
    }

    fn from_valid(valid: bool) -> Self {
        if valid {
            VerificationOutcome::Verified
        } else {
            VerificationOutcome::Rejected
        }
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VerificationOutcome::Verified => "verified",
            VerificationOutcome::Rejected => "rejected",
            VerificationOutcome::Unauthenticated => "unauthenticated",
        })
    }
}

/// Verifies records of any method.
#[derive(Clone, Debug)]
pub struct RecordVerifier<R = ProcessRunner> {
    keyless: KeylessBackend<R>,
    local_key: LocalKeyBackend<R>,
}

impl RecordVerifier<ProcessRunner> {
    /// Verifier using the real tools.
    pub fn new(config: SigningConfig, allowed_signers: AllowedSigners) -> Self {
        Self::with_runner(config, allowed_signers, ProcessRunner)
    }
}

impl<R: ToolRunner + Clone> RecordVerifier<R> {
    /// Verifier using a custom tool runner.
    pub fn with_runner(config: SigningConfig, allowed_signers: AllowedSigners, runner: R) -> Self {
        Self {
            keyless: KeylessBackend::with_runner(config.clone(), runner.clone()),
            local_key: LocalKeyBackend::with_runner(config, runner).with_allowed_signers(allowed_signers),
        }
    }
}

impl<R: ToolRunner> RecordVerifier<R> {
    /// Check `record` with the backend named by its method tag.
    ///
    /// Unsigned records are reported as [`VerificationOutcome::Unauthenticated`],
    /// never as verified.
    pub fn verify(&self, record: &SignedMoveRecord) -> Result<VerificationOutcome> {
        let outcome = match record.signing_method {
            SigningMethod::KeylessTransparency => {
                VerificationOutcome::from_valid(self.keyless.verify(record)?)
            }
            SigningMethod::LocalKey => {
                VerificationOutcome::from_valid(SigningBackend::verify(&self.local_key, record)?)
            }
            SigningMethod::Unsigned => VerificationOutcome::Unauthenticated,
        };
        tracing::debug!(
            "round {} of match {} from {}: {}",
            record.round,
            record.match_id,
            record.signer_identity,
            outcome
        );
        Ok(outcome)
    }
}
