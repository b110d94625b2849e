//! # RPS Signed Moves
//!
//! Non-repudiable rock-paper-scissors moves between peers that already know
//! each other's workload identity.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RPS SIGNED MOVES                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  signing/        - Move signing (blocking, external tools)   │
//! │  ├── payload.rs  - Canonical payload codec                   │
//! │  ├── record.rs   - Signed move record                        │
//! │  ├── keyless.rs  - Sigstore keyless (cosign)                 │
//! │  ├── local_key.rs- SSH key (ssh-keygen -Y)                   │
//! │  ├── unsigned.rs - Unsigned fallback                         │
//! │  ├── backend.rs  - Backend dispatch + record verifier        │
//! │  └── probe.rs    - Backend availability probe                │
//! │                                                              │
//! │  game/           - Rules and bookkeeping (pure)              │
//! │  ├── moves.rs    - Moves and round outcomes                  │
//! │  ├── scoreboard.rs - Per-opponent wins/losses                │
//! │  └── ledger.rs   - Signed records of one match               │
//! │                                                              │
//! │  network/        - Public scoreboard (async)                 │
//! │  └── scoreboard.rs - JSON endpoint (axum)                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Signed Bytes
//!
//! Every backend signs the same canonical payload: compact JSON with sorted
//! keys and no whitespace, e.g.
//!
//! ```text
//! {"match_id":"m1","move":"rock","round":3,"scheme":"rps-move-v1","signer":"peer-A"}
//! ```
//!
//! A verifier rebuilds these bytes from the received record, so any change
//! to move, match, round or signer invalidates the signature.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;
pub mod signing;

// Re-export commonly used types
pub use game::moves::{play_round, Move, Outcome};
pub use game::ledger::MatchLedger;
pub use game::scoreboard::{ScoreBoard, SharedScoreBoard};
pub use signing::{
    Backend, CanonicalPayload, MoveAssertion, RecordVerifier, SignedMoveRecord, SigningBackend,
    SigningConfig, SigningError, SigningMethod, VerificationOutcome,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
