//! Move Signing
//!
//! Non-repudiable moves: who played what, in which match and round.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    MOVE SIGNING                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  payload.rs   - Canonical payload (the signed bytes)        │
//! │  record.rs    - Signed move record (wire form)              │
//! │  tool.rs      - External tool runner + scratch files        │
//! │  keyless.rs   - Sigstore keyless backend (cosign)           │
//! │  local_key.rs - SSH key backend (ssh-keygen -Y)             │
//! │  unsigned.rs  - Unsigned fallback                           │
//! │  backend.rs   - Closed backend set + record verifier        │
//! │  probe.rs     - Which backend is usable here                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ```text
//! MoveAssertion --> CanonicalPayload --> backend.sign --> SignedMoveRecord
//!                                                              |
//!                                   (peer transport)           v
//! RecordVerifier <-- CanonicalPayload::from_record <-- SignedMoveRecord
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod keyless;
pub mod local_key;
pub mod payload;
pub mod probe;
pub mod record;
pub mod tool;
pub mod unsigned;

#[cfg(test)]
pub(crate) mod fakes;

// Re-export key types
pub use backend::{Backend, RecordVerifier, SigningBackend, VerificationOutcome};
pub use config::SigningConfig;
pub use error::SigningError;
pub use keyless::KeylessBackend;
pub use local_key::{AllowedSigners, LocalKeyBackend, SSH_NAMESPACE};
pub use payload::{encode, CanonicalPayload, MoveAssertion, SIGNING_SCHEME};
pub use probe::{probe, SigningEnvironment, SystemEnvironment};
pub use record::{SignedMoveRecord, SigningMethod};
pub use tool::{ProcessRunner, ToolRunner};
pub use unsigned::UnsignedBackend;
