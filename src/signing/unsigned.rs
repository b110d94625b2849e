//! Unsigned Fallback
//!
//! For environments with neither cosign nor an SSH key. The move is asserted
//! but carries no proof; verification never reports it as authentic.

use tracing::warn;

use crate::signing::backend::SigningBackend;
use crate::signing::error::{Result, SigningError};
use crate::signing::payload::MoveAssertion;
use crate::signing::record::{SignedMoveRecord, SigningMethod};

/// Backend producing records with an empty signature.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnsignedBackend;

impl SigningBackend for UnsignedBackend {
    fn method(&self) -> SigningMethod {
        SigningMethod::Unsigned
    }

    fn sign(&self, assertion: &MoveAssertion) -> Result<SignedMoveRecord> {
        warn!(
            "Round {} of match {} for {} is unsigned",
            assertion.round(),
            assertion.match_id(),
            assertion.signer_identity()
        );
        Ok(SignedMoveRecord::new(assertion, String::new(), SigningMethod::Unsigned, None))
    }

    fn verify(&self, record: &SignedMoveRecord) -> Result<bool> {
        if record.signing_method != SigningMethod::Unsigned {
            return Err(SigningError::WrongMethod {
                expected: SigningMethod::Unsigned,
                found: record.signing_method,
            });
        }
        Ok(false)
    }
}
