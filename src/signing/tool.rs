//! External Tool Invocation
//!
//! Every call to cosign or ssh-keygen goes through [`ToolRunner`], so tests
//! can substitute deterministic fakes for the real binaries.
//!
//! Files handed to a tool live in a [`ScratchSpace`]: a directory with a
//! random name, created per call and removed when the value is dropped. This
//! covers success, early failure and timeout alike, and concurrent calls
//! never share a path.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use crate::signing::error::{Result, SigningError};

// =============================================================================
// INVOCATION
// =============================================================================

/// A single external program call.
#[derive(Clone, Debug)]
pub struct ToolInvocation {
    /// Program to run.
    pub program: PathBuf,
    /// Arguments.
    pub args: Vec<OsString>,
    /// Extra environment variables.
    pub envs: Vec<(OsString, OsString)>,
    /// File connected to stdin (null stdin if None).
    pub stdin: Option<PathBuf>,
    /// Upper bound on run time.
    pub timeout: Duration,
}

impl ToolInvocation {
    /// Create an invocation with no arguments.
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            stdin: None,
            timeout,
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Feed a file on stdin.
    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// Short tool name for errors and logs.
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Argument at `index` as text (used by fakes).
    pub fn arg_str(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(|a| a.to_str())
    }

    /// Value following the flag `flag` (used by fakes).
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let pos = self.args.iter().position(|a| a == flag)?;
        self.arg_str(pos + 1)
    }
}

/// What a finished tool reported.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code (None if killed by a signal).
    pub code: Option<i32>,
    /// Did the tool exit with status 0?
    pub success: bool,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl ToolOutput {
    /// Successful exit with no output.
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            success: true,
            ..Default::default()
        }
    }

    /// Failed exit with the given code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Best diagnostic text for a failure.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

impl From<std::process::Output> for ToolOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

// =============================================================================
// RUNNERS
// =============================================================================

/// Runs external programs.
///
/// Implementations must return [`SigningError::Timeout`] when the bound is
/// exceeded and [`SigningError::ToolMissing`] when the program does not exist.
pub trait ToolRunner: Send + Sync {
    /// Run `invocation` to completion (blocking).
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}

impl<T: ToolRunner + ?Sized> ToolRunner for std::sync::Arc<T> {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        (**self).run(invocation)
    }
}

/// Real process runner.
///
/// Blocks the calling thread. Safe to call from inside a tokio runtime: the
/// process is then driven on a separate thread, though the calling worker
/// still blocks, so prefer `tokio::task::spawn_blocking` from async code.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        // A thread already driving a runtime cannot block_on another one.
        if tokio::runtime::Handle::try_current().is_ok() {
            return std::thread::scope(|scope| {
                scope
                    .spawn(|| run_on_own_runtime(invocation))
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            });
        }
        run_on_own_runtime(invocation)
    }
}

fn run_on_own_runtime(invocation: &ToolInvocation) -> Result<ToolOutput> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_with_timeout(invocation))
}

async fn run_with_timeout(invocation: &ToolInvocation) -> Result<ToolOutput> {
    let tool = invocation.tool_name();

    let stdin = match &invocation.stdin {
        Some(path) => Stdio::from(std::fs::File::open(path)?),
        None => Stdio::null(),
    };

    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .envs(invocation.envs.iter().map(|(k, v)| (k, v)))
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("running {} {:?} (timeout {:?})", tool, invocation.args, invocation.timeout);

    let child = command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SigningError::ToolMissing { tool: tool.clone() },
        _ => SigningError::Io(e),
    })?;

    // Dropping the wait future on timeout drops the child, which kills it.
    match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await {
        Ok(output) => {
            let output = ToolOutput::from(output?);
            debug!("{} exited with {:?}", tool, output.code);
            Ok(output)
        }
        Err(_) => Err(SigningError::Timeout {
            tool,
            after: invocation.timeout,
        }),
    }
}

// =============================================================================
// SCRATCH SPACE
// =============================================================================

/// Per-call scratch directory, removed on drop.
#[derive(Debug)]
pub struct ScratchSpace {
    dir: TempDir,
}

impl ScratchSpace {
    /// Create a fresh directory under `root` (system temp dir if None).
    pub fn create(root: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("rps-move-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `name` inside the scratch directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `contents` to `name` and return its path.
    pub fn write(&self, name: &str, contents: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.file(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Read `name` back as text.
    pub fn read_to_string(&self, name: &str) -> std::io::Result<String> {
        std::fs::read_to_string(self.file(name))
    }
}
