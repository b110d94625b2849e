//! Game Module
//!
//! Rock-paper-scissors rules and match bookkeeping. Nothing here talks to
//! external tools.
//!
//! ## Module Structure
//!
//! - `moves`: Moves, outcomes, round resolution
//! - `scoreboard`: Per-opponent wins and losses
//! - `ledger`: Signed records of one match

pub mod ledger;
pub mod moves;
pub mod scoreboard;

// Re-export key types
pub use ledger::{LedgerError, MatchLedger};
pub use moves::{play_round, Move, MoveParseError, Outcome};
pub use scoreboard::{PeerScore, ScoreBoard, SharedScoreBoard};
