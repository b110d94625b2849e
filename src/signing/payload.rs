//! Canonical Move Payload
//!
//! Deterministic rendering of a move assertion into the exact bytes that are
//! signed. Any verifier can re-derive the same bytes from a record's plain
//! fields, so no decode operation exists.
//!
//! ## Format
//!
//! ```text
//! {"match_id":"m1","move":"rock","round":3,"scheme":"rps-move-v1","signer":"peer-A"}
//! ```
//!
//! - exactly five fields, sorted by name
//! - no insignificant whitespace
//! - integers as decimal literals
//! - strings UTF-8, only JSON-required escapes

use serde::Serialize;
use sha2::{Sha256, Digest};
use thiserror::Error;

use crate::game::moves::{Move, MoveParseError};
use crate::signing::record::SignedMoveRecord;

/// Scheme identifier embedded in every payload.
pub const SIGNING_SCHEME: &str = "rps-move-v1";

/// A player's claim of having made `mv` in `round` of `match_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveAssertion {
    mv: Move,
    match_id: String,
    round: u64,
    signer_identity: String,
}

impl MoveAssertion {
    /// Create a new assertion.
    pub fn new(
        mv: Move,
        match_id: impl Into<String>,
        round: u64,
        signer_identity: impl Into<String>,
    ) -> Self {
        Self {
            mv,
            match_id: match_id.into(),
            round,
            signer_identity: signer_identity.into(),
        }
    }

    /// Start a builder; fields may be supplied in any order.
    pub fn builder() -> MoveAssertionBuilder {
        MoveAssertionBuilder::default()
    }

    /// The asserted move.
    pub fn mv(&self) -> Move {
        self.mv
    }

    /// Match identifier.
    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    /// Round number within the match.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Identity (SPIFFE ID) of the player making the move.
    pub fn signer_identity(&self) -> &str {
        &self.signer_identity
    }

    /// Render the canonical payload for this assertion.
    pub fn payload(&self) -> CanonicalPayload {
        encode(self)
    }
}

/// Errors building an assertion from loose input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssertionError {
    /// A required field was never set.
    #[error("missing assertion field: {0}")]
    MissingField(&'static str),

    /// The move name is not one of the three moves.
    #[error(transparent)]
    InvalidMove(#[from] MoveParseError),
}

/// Builder for [`MoveAssertion`].
#[derive(Debug, Default)]
pub struct MoveAssertionBuilder {
    mv: Option<Move>,
    match_id: Option<String>,
    round: Option<u64>,
    signer_identity: Option<String>,
}

impl MoveAssertionBuilder {
    /// Set the move.
    pub fn mv(mut self, mv: Move) -> Self {
        self.mv = Some(mv);
        self
    }

    /// Set the move from its name.
    pub fn move_name(mut self, name: &str) -> Result<Self, AssertionError> {
        self.mv = Some(name.parse()?);
        Ok(self)
    }

    /// Set the match identifier.
    pub fn match_id(mut self, match_id: impl Into<String>) -> Self {
        self.match_id = Some(match_id.into());
        self
    }

    /// Set the round.
    pub fn round(mut self, round: u64) -> Self {
        self.round = Some(round);
        self
    }

    /// Set the signer identity.
    pub fn signer_identity(mut self, identity: impl Into<String>) -> Self {
        self.signer_identity = Some(identity.into());
        self
    }

    /// Finish the assertion.
    pub fn build(self) -> Result<MoveAssertion, AssertionError> {
        Ok(MoveAssertion {
            mv: self.mv.ok_or(AssertionError::MissingField("move"))?,
            match_id: self.match_id.ok_or(AssertionError::MissingField("match_id"))?,
            round: self.round.ok_or(AssertionError::MissingField("round"))?,
            signer_identity: self
                .signer_identity
                .ok_or(AssertionError::MissingField("signer_identity"))?,
        })
    }
}

/// The exact bytes a signer signs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CanonicalPayload(String);

impl CanonicalPayload {
    /// Re-derive the payload from a record's plain fields.
    pub fn from_record(record: &SignedMoveRecord) -> Self {
        render(
            record.mv,
            &record.match_id,
            record.round,
            &record.signer_identity,
        )
    }

    /// Payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Payload as text (always valid UTF-8).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA-256 of the payload bytes.
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.0.as_bytes()).into()
    }

    /// Hex SHA-256, used to identify payloads in logs.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest())
    }
}

/// Field layout of the payload. Declaration order is the sorted key order.
#[derive(Serialize)]
struct CanonicalFields<'a> {
    match_id: &'a str,
    #[serde(rename = "move")]
    mv: Move,
    round: u64,
    scheme: &'static str,
    signer: &'a str,
}

/// Encode an assertion. Pure and total.
pub fn encode(assertion: &MoveAssertion) -> CanonicalPayload {
    render(
        assertion.mv,
        &assertion.match_id,
        assertion.round,
        &assertion.signer_identity,
    )
}

fn render(mv: Move, match_id: &str, round: u64, signer: &str) -> CanonicalPayload {
    let fields = CanonicalFields {
        match_id,
        mv,
        round,
        scheme: SIGNING_SCHEME,
        signer,
    };
    // Only string, integer and unit-variant fields: serialization cannot fail.
    let json = serde_json::to_string(&fields).expect("canonical fields always serialize");
    CanonicalPayload(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_encoding() {
        let assertion = MoveAssertion::new(Move::Rock, "m1", 3, "peer-A");
        assert_eq!(
            encode(&assertion).as_str(),
            r#"{"match_id":"m1","move":"rock","round":3,"scheme":"rps-move-v1","signer":"peer-A"}"#
        );
    }

    #[test]
    fn test_spiffe_identity_is_not_escaped() {
        let assertion = MoveAssertion::new(
            Move::Scissors,
            "match-7",
            0,
            "spiffe://example.org/player/alice",
        );
        assert_eq!(
            encode(&assertion).as_str(),
            r#"{"match_id":"match-7","move":"scissors","round":0,"scheme":"rps-move-v1","signer":"spiffe://example.org/player/alice"}"#
        );
    }

    #[test]
    fn test_required_escapes_only() {
        let assertion = MoveAssertion::new(Move::Paper, "quote\"é", 1, "tab\there");
        assert_eq!(
            encode(&assertion).as_str(),
            "{\"match_id\":\"quote\\\"é\",\"move\":\"paper\",\"round\":1,\"scheme\":\"rps-move-v1\",\"signer\":\"tab\\there\"}"
        );
    }

    #[test]
    fn test_builder_order_independent() {
        let a = MoveAssertion::builder()
            .mv(Move::Paper)
            .match_id("m9")
            .round(12)
            .signer_identity("peer-B")
            .build()
            .unwrap();
        let b = MoveAssertion::builder()
            .signer_identity("peer-B")
            .round(12)
            .match_id("m9")
            .mv(Move::Paper)
            .build()
            .unwrap();
        assert_eq!(encode(&a), encode(&b));
        assert_eq!(a, MoveAssertion::new(Move::Paper, "m9", 12, "peer-B"));
    }

    #[test]
    fn test_builder_rejects_missing_and_invalid() {
        let missing = MoveAssertion::builder().mv(Move::Rock).round(1).build();
        assert_eq!(missing, Err(AssertionError::MissingField("match_id")));

        let invalid = MoveAssertion::builder().move_name("lizard");
        assert!(matches!(invalid, Err(AssertionError::InvalidMove(_))));
    }

    #[test]
    fn test_digest_matches_bytes() {
        let payload = MoveAssertion::new(Move::Rock, "m1", 3, "peer-A").payload();
        let expected: [u8; 32] = Sha256::digest(payload.as_bytes()).into();
        assert_eq!(payload.digest(), expected);
        assert_eq!(payload.digest_hex().len(), 64);
    }

    fn any_move() -> impl Strategy<Value = Move> {
        prop_oneof![Just(Move::Rock), Just(Move::Paper), Just(Move::Scissors)]
    }

    proptest! {
        #[test]
        fn prop_encoding_is_deterministic(
            mv in any_move(),
            match_id in ".*",
            round in any::<u64>(),
            signer in ".*",
        ) {
            let a = MoveAssertion::new(mv, match_id.clone(), round, signer.clone());
            let b = MoveAssertion::new(mv, match_id, round, signer);
            prop_assert_eq!(encode(&a), encode(&b));
        }

        #[test]
        fn prop_payload_is_compact_sorted_json(
            mv in any_move(),
            match_id in ".*",
            round in any::<u64>(),
            signer in ".*",
        ) {
            let payload = encode(&MoveAssertion::new(mv, match_id.clone(), round, signer.clone()));
            let value: serde_json::Value = serde_json::from_str(payload.as_str()).unwrap();
            let object = value.as_object().unwrap();
            let keys: Vec<&str> = object.keys().map(String::as_str).collect();
            prop_assert_eq!(keys, vec!["match_id", "move", "round", "scheme", "signer"]);
            prop_assert_eq!(object["match_id"].as_str().unwrap(), match_id.as_str());
            prop_assert_eq!(object["signer"].as_str().unwrap(), signer.as_str());
            prop_assert_eq!(object["round"].as_u64().unwrap(), round);
            prop_assert_eq!(serde_json::to_string(&value).unwrap(), payload.as_str());
        }

        #[test]
        fn prop_distinct_rounds_distinct_payloads(
            mv in any_move(),
            round in 0u64..u64::MAX,
        ) {
            let a = encode(&MoveAssertion::new(mv, "m", round, "p"));
            let b = encode(&MoveAssertion::new(mv, "m", round + 1, "p"));
            prop_assert_ne!(a, b);
        }
    }
}
