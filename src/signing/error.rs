//! Signing Errors
//!
//! Typed failures of signing and verification. A cryptographic mismatch is
//! never an error: verifiers return `Ok(false)` for it.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::signing::payload::AssertionError;
use crate::signing::record::SigningMethod;

/// Signing and verification failures.
#[derive(Debug, Error)]
pub enum SigningError {
    /// No backend can serve the request.
    #[error("no signing backend available")]
    Unavailable,

    /// The referenced private key does not exist.
    #[error("signing key not found: {}", path.display())]
    KeyNotFound {
        /// Resolved key location.
        path: PathBuf,
    },

    /// The external tool ran and reported an error.
    #[error("{tool} signing failed: {diagnostic}")]
    SigningFailed {
        /// Tool name.
        tool: String,
        /// Diagnostic text from the tool.
        diagnostic: String,
    },

    /// The external tool exceeded its time bound and was killed.
    #[error("{tool} timed out after {after:?}")]
    Timeout {
        /// Tool name.
        tool: String,
        /// Bound that was exceeded.
        after: Duration,
    },

    /// The tool binary is not installed.
    #[error("{tool} not found on this system")]
    ToolMissing {
        /// Tool name.
        tool: String,
    },

    /// Verify was called on a record produced by another backend.
    #[error("expected a {expected} record, got {found}")]
    WrongMethod {
        /// Method the verifier handles.
        expected: SigningMethod,
        /// Method found on the record.
        found: SigningMethod,
    },

    /// Keyless record carries no transparency log entry.
    #[error("keyless record has no transparency log entry")]
    MissingProof,

    /// The assertion was rejected before any tool ran.
    #[error("invalid move assertion: {0}")]
    InvalidAssertion(#[from] AssertionError),

    /// Local I/O failure while preparing a tool call.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SigningError {
    /// Is this an infrastructure problem rather than misuse?
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Unavailable | Self::ToolMissing { .. } | Self::Timeout { .. } | Self::Io(_)
        )
    }
}

/// Result alias for signing operations.
pub type Result<T> = std::result::Result<T, SigningError>;
