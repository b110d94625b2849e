//! Network Module
//!
//! The public scoreboard endpoint. Moves themselves travel over whatever
//! transport the embedding application uses.

pub mod scoreboard;

// Re-export key types
pub use scoreboard::{router, serve, ScoreboardConfig, ScoreboardServerError, ScoresResponse};
