//! Signed Move Record
//!
//! The value produced by a signing backend and consumed by verification.
//! Serialized as JSON for transport between peers.

use std::fmt;

use serde::{Serialize, Deserialize};

use crate::game::moves::Move;
use crate::signing::payload::{CanonicalPayload, MoveAssertion};

/// Which backend produced a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningMethod {
    /// Sigstore keyless signing, recorded in the Rekor transparency log.
    #[serde(rename = "sigstore")]
    KeylessTransparency,
    /// Local SSH key (`ssh-keygen -Y sign`).
    #[serde(rename = "ssh")]
    LocalKey,
    /// No signature at all.
    #[serde(rename = "none")]
    Unsigned,
}

impl SigningMethod {
    /// Wire name of the method.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeylessTransparency => "sigstore",
            Self::LocalKey => "ssh",
            Self::Unsigned => "none",
        }
    }
}

impl fmt::Display for SigningMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A move plus the signature binding it to its signer.
///
/// Immutable once created; verification only reads it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMoveRecord {
    /// The move made.
    #[serde(rename = "move")]
    pub mv: Move,

    /// Match identifier.
    pub match_id: String,

    /// Round within the match.
    pub round: u64,

    /// Claimed identity of the signer.
    #[serde(rename = "signer_spiffe_id")]
    pub signer_identity: String,

    /// Base64 signature text. Empty for unsigned records.
    pub signature: String,

    /// Backend that produced the record.
    pub signing_method: SigningMethod,

    /// Full Sigstore bundle (keyless records only).
    #[serde(rename = "transparency_log_entry", default)]
    pub transparency_entry: Option<String>,
}

impl SignedMoveRecord {
    /// Build a record for `assertion`.
    pub(crate) fn new(
        assertion: &MoveAssertion,
        signature: String,
        signing_method: SigningMethod,
        transparency_entry: Option<String>,
    ) -> Self {
        Self {
            mv: assertion.mv(),
            match_id: assertion.match_id().to_string(),
            round: assertion.round(),
            signer_identity: assertion.signer_identity().to_string(),
            signature,
            signing_method,
            transparency_entry,
        }
    }

    /// The assertion this record claims to sign.
    pub fn assertion(&self) -> MoveAssertion {
        MoveAssertion::new(self.mv, self.match_id.clone(), self.round, self.signer_identity.clone())
    }

    /// Canonical payload re-derived from the plain fields.
    pub fn payload(&self) -> CanonicalPayload {
        CanonicalPayload::from_record(self)
    }

    /// Serialize to JSON for transport.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a record received from a peer.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
