//! Match Ledger
//!
//! Keeps every signed move of one match so a disputed round can be replayed
//! later. Records are keyed by `(round, signer)`; a signer gets exactly one
//! move per round.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::game::moves::{play_round, Outcome};
use crate::signing::record::SignedMoveRecord;

/// Ledger rejections.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Record belongs to a different match.
    #[error("record for match {found} does not belong to match {expected}")]
    ForeignMatch {
        /// This ledger's match.
        expected: String,
        /// The record's match.
        found: String,
    },
    /// Signer already has a move for this round.
    #[error("{signer} already played round {round}")]
    Duplicate {
        /// Round number.
        round: u64,
        /// Signer identity.
        signer: String,
    },
    /// Export or import failed.
    #[error("ledger i/o: {0}")]
    Io(#[from] io::Error),
    /// A JSON line could not be decoded.
    #[error("ledger line {line}: {source}")]
    Decode {
        /// 1-based line number.
        line: usize,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Signed moves of a single match.
#[derive(Clone, Debug)]
pub struct MatchLedger {
    match_id: String,
    records: BTreeMap<(u64, String), SignedMoveRecord>,
}

impl MatchLedger {
    /// Empty ledger for `match_id`.
    pub fn new(match_id: impl Into<String>) -> Self {
        Self {
            match_id: match_id.into(),
            records: BTreeMap::new(),
        }
    }

    /// Match this ledger tracks.
    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    /// Add a record. Rejects other matches and repeated `(round, signer)`.
    pub fn insert(&mut self, record: SignedMoveRecord) -> Result<(), LedgerError> {
        if record.match_id != self.match_id {
            return Err(LedgerError::ForeignMatch {
                expected: self.match_id.clone(),
                found: record.match_id,
            });
        }
        let key = (record.round, record.signer_identity.clone());
        if self.records.contains_key(&key) {
            return Err(LedgerError::Duplicate {
                round: record.round,
                signer: record.signer_identity,
            });
        }
        self.records.insert(key, record);
        Ok(())
    }

    /// Record of `signer` for `round`.
    pub fn get(&self, round: u64, signer: &str) -> Option<&SignedMoveRecord> {
        self.records.get(&(round, signer.to_string()))
    }

    /// Both moves of `round`, ours first, once both are present.
    pub fn round_pair(
        &self,
        round: u64,
        me: &str,
        opponent: &str,
    ) -> Option<(&SignedMoveRecord, &SignedMoveRecord)> {
        Some((self.get(round, me)?, self.get(round, opponent)?))
    }

    /// Outcome of `round` from `me`'s point of view.
    pub fn outcome(&self, round: u64, me: &str, opponent: &str) -> Option<Outcome> {
        self.round_pair(round, me, opponent)
            .map(|(mine, theirs)| play_round(mine.mv, theirs.mv))
    }

    /// Records in `(round, signer)` order.
    pub fn records(&self) -> impl Iterator<Item = &SignedMoveRecord> {
        self.records.values()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// No records?
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write one JSON record per line.
    pub fn export_jsonl<W: Write>(&self, mut out: W) -> Result<(), LedgerError> {
        for record in self.records() {
            serde_json::to_writer(&mut out, record).map_err(io::Error::from)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }

    /// Rebuild a ledger from JSON lines. Blank lines are skipped.
    pub fn import_jsonl<B: BufRead>(match_id: impl Into<String>, input: B) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(match_id);
        for (index, line) in input.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = SignedMoveRecord::from_json(&line).map_err(|source| LedgerError::Decode {
                line: index + 1,
                source,
            })?;
            ledger.insert(record)?;
        }
        Ok(ledger)
    }
}
