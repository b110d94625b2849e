//! Per-Opponent Scores
//!
//! Wins and losses keyed by peer identity. Ties are not counted.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Serialize, Deserialize};
use tokio::sync::RwLock;

use crate::game::moves::Outcome;

/// Record against one opponent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerScore {
    /// Rounds we won.
    pub wins: u32,
    /// Rounds we lost.
    pub losses: u32,
}

/// Scores for every opponent seen so far.
///
/// BTreeMap keeps snapshots sorted by identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScoreBoard {
    peers: BTreeMap<String, PeerScore>,
}

impl ScoreBoard {
    /// Empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a round outcome (from our point of view) against `peer`.
    pub fn record(&mut self, peer: &str, outcome: Outcome) {
        let score = self.peers.entry(peer.to_string()).or_default();
        match outcome {
            Outcome::Win => score.wins = score.wins.saturating_add(1),
            Outcome::Loss => score.losses = score.losses.saturating_add(1),
            Outcome::Tie => {}
        }
    }

    /// Score against `peer`, if any round was played.
    pub fn get(&self, peer: &str) -> Option<PeerScore> {
        self.peers.get(peer).copied()
    }

    /// All opponents, sorted by identity.
    pub fn snapshot(&self) -> Vec<(String, PeerScore)> {
        self.peers.iter().map(|(id, score)| (id.clone(), *score)).collect()
    }

    /// Number of opponents.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// No opponent yet?
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Scoreboard shared between the game loop and the HTTP endpoint.
#[derive(Clone, Debug, Default)]
pub struct SharedScoreBoard {
    inner: Arc<RwLock<ScoreBoard>>,
}

impl SharedScoreBoard {
    /// Wrap an existing board.
    pub fn new(board: ScoreBoard) -> Self {
        Self {
            inner: Arc::new(RwLock::new(board)),
        }
    }

    /// Record an outcome from async code.
    pub async fn record(&self, peer: &str, outcome: Outcome) {
        self.inner.write().await.record(peer, outcome);
    }

    /// Snapshot from async code.
    pub async fn snapshot(&self) -> Vec<(String, PeerScore)> {
        self.inner.read().await.snapshot()
    }

    /// Record an outcome from synchronous code. Must not be called from
    /// within an async runtime.
    pub fn blocking_record(&self, peer: &str, outcome: Outcome) {
        self.inner.blocking_write().record(peer, outcome);
    }

    /// Snapshot from synchronous code. Must not be called from within an
    /// async runtime.
    pub fn blocking_snapshot(&self) -> Vec<(String, PeerScore)> {
        self.inner.blocking_read().snapshot()
    }
}
