//! Shell execution of accepted commands.
//!
//! Commands run as `<shell> -c <command>` with the terminal's stdin. The
//! child is killed as soon as the run is cancelled.

use crate::config::DEFAULT_SHELL;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Exit code reported for a child killed because the run was cancelled.
pub const CANCELLED_EXIT_CODE: i32 = 130;

/// Where the child's stdout and stderr go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Share the caller's terminal.
    Inherit,
    /// Discard both streams.
    Discard,
}

impl OutputMode {
    fn stdio(self) -> Stdio {
        match self {
            Self::Inherit => Stdio::inherit(),
            Self::Discard => Stdio::null(),
        }
    }
}

// =============================================================================
// Traits for Dependency Injection
// =============================================================================

/// Runs a command line through a shell.
///
/// This abstraction lets the runner be tested without spawning processes.
#[async_trait]
pub trait ShellExecutor: Send + Sync {
    /// Runs `command` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandExited`] when the command exits non-zero or is
    /// killed on cancellation, and [`Error::Io`] when the shell cannot start.
    async fn execute(&self, cancel: &CancellationToken, command: &str, output: OutputMode) -> Result<()>;
}

// =============================================================================
// Default Implementation
// =============================================================================

/// Executes commands with the configured shell.
pub struct SystemShellExecutor {
    shell: String,
}

impl SystemShellExecutor {
    /// Creates an executor for `shell`, falling back to `/bin/sh` when empty.
    pub fn new(shell: &str) -> Self {
        let shell = shell.trim();
        let shell = if shell.is_empty() { DEFAULT_SHELL } else { shell };
        Self {
            shell: resolve_shell(shell),
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }
}

/// Resolves a bare shell name such as `zsh` through PATH.
fn resolve_shell(shell: &str) -> String {
    if Path::new(shell).components().count() > 1 {
        return shell.to_string();
    }

    match which::which(shell) {
        Ok(path) => path.display().to_string(),
        Err(err) => {
            warn!("Could not find shell {} in PATH: {}", shell, err);
            shell.to_string()
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[async_trait]
impl ShellExecutor for SystemShellExecutor {
    async fn execute(&self, cancel: &CancellationToken, command: &str, output: OutputMode) -> Result<()> {
        info!("Executing with {}: {}", self.shell, command);

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::inherit())
            .stdout(output.stdio())
            .stderr(output.stdio())
            .kill_on_drop(true)
            .spawn()?;

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                debug!("Run cancelled, killing child process");
                if let Err(err) = child.kill().await {
                    warn!("Failed to kill child process: {}", err);
                }
                return Err(Error::CommandExited { code: CANCELLED_EXIT_CODE });
            }
        };

        if status.success() {
            Ok(())
        } else {
            let code = exit_code(status);
            debug!("Command exited with code {}", code);
            Err(Error::CommandExited { code })
        }
    }
}
