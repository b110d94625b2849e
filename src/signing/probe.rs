//! Backend Availability Probe
//!
//! Advisory check of which backend the current machine can use, in priority
//! order: keyless (cosign answers), local key (default key present), unsigned.

use tracing::debug;

use crate::signing::config::SigningConfig;
use crate::signing::record::SigningMethod;
use crate::signing::tool::{ProcessRunner, ToolInvocation, ToolRunner};

/// What the probe needs to know about the machine.
pub trait SigningEnvironment {
    /// Does the keyless signing tool answer a liveness query in time?
    fn keyless_tool_responds(&self) -> bool;

    /// Does the default local key exist?
    fn default_key_exists(&self) -> bool;
}

/// Pick the preferred available backend.
pub fn probe<E: SigningEnvironment + ?Sized>(environment: &E) -> SigningMethod {
    let method = if environment.keyless_tool_responds() {
        SigningMethod::KeylessTransparency
    } else if environment.default_key_exists() {
        SigningMethod::LocalKey
    } else {
        SigningMethod::Unsigned
    };
    debug!("probed signing method: {}", method);
    method
}

/// The real machine: runs `cosign version` and looks for the default key.
#[derive(Clone, Debug)]
pub struct SystemEnvironment<R = ProcessRunner> {
    config: SigningConfig,
    runner: R,
}

impl SystemEnvironment<ProcessRunner> {
    /// Probe with the real tools.
    pub fn new(config: SigningConfig) -> Self {
        Self::with_runner(config, ProcessRunner)
    }
}

impl<R: ToolRunner> SystemEnvironment<R> {
    /// Probe with a custom tool runner.
    pub fn with_runner(config: SigningConfig, runner: R) -> Self {
        Self { config, runner }
    }
}

impl<R: ToolRunner> SigningEnvironment for SystemEnvironment<R> {
    fn keyless_tool_responds(&self) -> bool {
        let invocation =
            ToolInvocation::new(&self.config.cosign_bin, self.config.probe_timeout).arg("version");
        match self.runner.run(&invocation) {
            Ok(output) => output.success,
            Err(e) => {
                debug!("cosign liveness check failed: {}", e);
                false
            }
        }
    }

    fn default_key_exists(&self) -> bool {
        self.config.resolved_default_key().exists()
    }
}
