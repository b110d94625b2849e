//! Signing Configuration
//!
//! Tool locations, per-call time bounds and the default key. Every value can
//! be overridden from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default cosign binary.
pub const DEFAULT_COSIGN_BIN: &str = "cosign";

/// Default ssh-keygen binary.
pub const DEFAULT_SSH_KEYGEN_BIN: &str = "ssh-keygen";

/// Conventional location of the local signing key.
pub const DEFAULT_SSH_KEY: &str = "~/.ssh/id_ed25519";

/// Configuration shared by all signing backends.
#[derive(Clone, Debug)]
pub struct SigningConfig {
    /// cosign executable.
    pub cosign_bin: PathBuf,
    /// ssh-keygen executable.
    pub ssh_keygen_bin: PathBuf,
    /// Bound for keyless signing (includes the Fulcio/Rekor round trips).
    pub keyless_sign_timeout: Duration,
    /// Bound for keyless verification.
    pub keyless_verify_timeout: Duration,
    /// Bound for ssh-keygen sign and verify.
    pub local_key_timeout: Duration,
    /// Bound for the cosign liveness check.
    pub probe_timeout: Duration,
    /// Default local key (a leading `~/` is expanded).
    pub default_key: PathBuf,
    /// Parent directory for per-call scratch directories (system temp if None).
    pub scratch_root: Option<PathBuf>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            cosign_bin: PathBuf::from(DEFAULT_COSIGN_BIN),
            ssh_keygen_bin: PathBuf::from(DEFAULT_SSH_KEYGEN_BIN),
            keyless_sign_timeout: Duration::from_secs(60),
            keyless_verify_timeout: Duration::from_secs(30),
            local_key_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            default_key: PathBuf::from(DEFAULT_SSH_KEY),
            scratch_root: None,
        }
    }
}

impl SigningConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cosign_bin: std::env::var_os("RPS_COSIGN_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.cosign_bin),
            ssh_keygen_bin: std::env::var_os("RPS_SSH_KEYGEN_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.ssh_keygen_bin),
            keyless_sign_timeout: env_secs("RPS_KEYLESS_SIGN_TIMEOUT_SECS")
                .unwrap_or(defaults.keyless_sign_timeout),
            keyless_verify_timeout: env_secs("RPS_KEYLESS_VERIFY_TIMEOUT_SECS")
                .unwrap_or(defaults.keyless_verify_timeout),
            local_key_timeout: env_secs("RPS_SSH_TIMEOUT_SECS")
                .unwrap_or(defaults.local_key_timeout),
            probe_timeout: env_secs("RPS_PROBE_TIMEOUT_SECS").unwrap_or(defaults.probe_timeout),
            default_key: std::env::var_os("RPS_SSH_KEY")
                .map(PathBuf::from)
                .unwrap_or(defaults.default_key),
            scratch_root: std::env::var_os("RPS_SCRATCH_DIR").map(PathBuf::from),
        }
    }

    /// The default key with `~` expanded.
    pub fn resolved_default_key(&self) -> PathBuf {
        expand_home(&self.default_key)
    }
}

/// Expand a leading `~` or `~/` to the user's home directory.
///
/// Paths without a tilde, or when no home directory is known, are returned
/// unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    let raw = std::env::var(name).ok()?;
    parse_secs(name, &raw)
}

/// Parse a positive number of whole seconds.
fn parse_secs(name: &str, raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(0) => {
            tracing::warn!("ignoring {}={:?}: timeout must be at least one second", name, raw);
            None
        }
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            tracing::warn!("ignoring {}={:?}: not a number of seconds", name, raw);
            None
        }
    }
}
