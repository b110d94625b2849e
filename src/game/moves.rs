//! Moves and Round Outcomes
//!
//! The three moves and the pure rule deciding a round.
//! Move names are lowercase everywhere (payload, wire form, CLI).

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// A single rock-paper-scissors move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Move {
    /// Beats scissors.
    Rock,
    /// Beats rock.
    Paper,
    /// Beats paper.
    Scissors,
}

impl Move {
    /// All moves in declaration order.
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Move::Rock => "rock",
            Move::Paper => "paper",
            Move::Scissors => "scissors",
        }
    }

    /// Does this move beat `other`?
    pub fn beats(self, other: Move) -> bool {
        matches!(
            (self, other),
            (Move::Rock, Move::Scissors) | (Move::Paper, Move::Rock) | (Move::Scissors, Move::Paper)
        )
    }

    /// Pick a move uniformly at random (computer opponent).
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected move name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid move {0:?}: expected rock, paper or scissors")]
pub struct MoveParseError(pub String);

impl FromStr for Move {
    type Err = MoveParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rock" => Ok(Move::Rock),
            "paper" => Ok(Move::Paper),
            "scissors" => Ok(Move::Scissors),
            _ => Err(MoveParseError(s.to_string())),
        }
    }
}

/// Result of a round from one player's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Our move beat theirs.
    Win,
    /// Their move beat ours.
    Loss,
    /// Same move.
    Tie,
}

impl Outcome {
    /// The same round seen from the opponent's side.
    pub fn reversed(self) -> Self {
        match self {
            Outcome::Win => Outcome::Loss,
            Outcome::Loss => Outcome::Win,
            Outcome::Tie => Outcome::Tie,
        }
    }
}

/// Decide a round.
pub fn play_round(mine: Move, theirs: Move) -> Outcome {
    if mine == theirs {
        Outcome::Tie
    } else if mine.beats(theirs) {
        Outcome::Win
    } else {
        Outcome::Loss
    }
}
