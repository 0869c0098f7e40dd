//! Turns one prompt into at most one executed command.
//!
//! The runner asks a [`CommandGenerator`] for a command and then, depending on
//! the [`RunMode`], prints it, runs it, or asks the user first. Declines,
//! refusals and interrupts end the run with [`RunOutcome::Cancelled`], which
//! callers treat as a clean exit.

use crate::error::{Error, Result};
use crate::executor::{OutputMode, ShellExecutor};
use crate::llm_generator::{CommandGenerator, REFUSAL_SENTINEL};
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const REFUSAL_NOTICE: &str = "Unable to process the request locally with shell scripting tools.";

const HIGHLIGHT: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// How a generated command is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Print the command, never run it.
    Print,
    /// Run without notices, discarding the command's output.
    Quiet,
    /// Run immediately after a notice.
    Yolo,
    /// Ask before running.
    #[default]
    Confirm,
}

impl From<&str> for RunMode {
    /// Unrecognized modes fall back to [`RunMode::Confirm`].
    fn from(mode: &str) -> Self {
        match mode.trim().to_lowercase().as_str() {
            "print" | "dry-run" | "dryrun" => Self::Print,
            "quiet" => Self::Quiet,
            "yolo" => Self::Yolo,
            _ => Self::Confirm,
        }
    }
}

/// Non-error end states of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Printed,
    Executed,
    /// Refused by the model, declined by the user, or interrupted.
    Cancelled,
}

// =============================================================================
// Confirmation input
// =============================================================================

/// Source of the confirmation answer.
///
/// `read_line` may block; the runner calls it off the async runtime.
pub trait LineSource: Send + Sync + 'static {
    /// Reads one line, or `None` at end of input.
    fn read_line(&self) -> io::Result<Option<String>>;
}

/// Reads confirmations from the process's stdin.
pub struct StdinInput;

impl LineSource for StdinInput {
    fn read_line(&self) -> io::Result<Option<String>> {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line)),
        }
    }
}

/// Reads confirmations from any buffered reader.
pub struct ReaderInput<R> {
    reader: Mutex<R>,
}

impl<R: BufRead + Send + 'static> ReaderInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(reader),
        }
    }
}

impl<R: BufRead + Send + 'static> LineSource for ReaderInput<R> {
    fn read_line(&self) -> io::Result<Option<String>> {
        let mut reader = self
            .reader
            .lock()
            .map_err(|_| io::Error::other("confirmation reader poisoned"))?;
        let mut line = String::new();
        match reader.read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line)),
        }
    }
}

fn is_acceptance(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

// =============================================================================
// Runner
// =============================================================================

/// Drives a single generate-then-maybe-execute cycle.
pub struct Runner<W: Write + Send> {
    mode: RunMode,
    out: W,
    input: Arc<dyn LineSource>,
    executor: Arc<dyn ShellExecutor>,
}

impl<W: Write + Send> Runner<W> {
    pub fn new(mode: RunMode, out: W, input: Arc<dyn LineSource>, executor: Arc<dyn ShellExecutor>) -> Self {
        Self {
            mode,
            out,
            input,
            executor,
        }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Generates a command for `prompt` and handles it according to the mode.
    ///
    /// # Errors
    ///
    /// Generation failures, empty commands, output failures and the
    /// executor's own errors are returned unchanged.
    pub async fn run(
        &mut self,
        cancel: &CancellationToken,
        prompt: &str,
        generator: &dyn CommandGenerator,
    ) -> Result<RunOutcome> {
        debug!("Generating command with {}", generator.name());

        let generated = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Cancelled while generating");
                return Ok(RunOutcome::Cancelled);
            }
            result = generator.generate_command(cancel, prompt) => result.map_err(Error::Generation)?,
        };

        let command = generated.trim();
        if command.is_empty() {
            return Err(Error::EmptyCommand);
        }

        if command == REFUSAL_SENTINEL {
            info!("Generator declined the request");
            if self.mode != RunMode::Quiet {
                writeln!(self.out, "{REFUSAL_NOTICE}")?;
            }
            return Ok(RunOutcome::Cancelled);
        }

        match self.mode {
            RunMode::Print => {
                writeln!(self.out, "{command}")?;
                Ok(RunOutcome::Printed)
            }
            RunMode::Quiet => {
                self.executor.execute(cancel, command, OutputMode::Discard).await?;
                Ok(RunOutcome::Executed)
            }
            RunMode::Yolo => self.execute_with_notice(cancel, command).await,
            RunMode::Confirm => {
                if !self.confirm(cancel, command).await? {
                    return Ok(RunOutcome::Cancelled);
                }
                self.execute_with_notice(cancel, command).await
            }
        }
    }

    async fn execute_with_notice(&mut self, cancel: &CancellationToken, command: &str) -> Result<RunOutcome> {
        writeln!(self.out, "Running: {HIGHLIGHT}`{command}`{RESET}")?;
        self.out.flush()?;

        self.executor.execute(cancel, command, OutputMode::Inherit).await?;
        Ok(RunOutcome::Executed)
    }

    /// Asks for confirmation, racing the answer against cancellation.
    ///
    /// The read happens on a detached thread. If cancellation wins, the
    /// thread's eventual answer is dropped with the channel.
    async fn confirm(&mut self, cancel: &CancellationToken, command: &str) -> Result<bool> {
        write!(self.out, "I would run {HIGHLIGHT}`{command}`{RESET}, confirm? [y/N] ")?;
        self.out.flush()?;

        let (tx, rx) = oneshot::channel();
        let input = Arc::clone(&self.input);
        std::thread::Builder::new()
            .name("aida-confirm".to_string())
            .spawn(move || {
                let _ = tx.send(input.read_line());
            })?;

        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                writeln!(self.out)?;
                info!("Cancelled while waiting for confirmation");
                return Ok(false);
            }
            received = rx => received.unwrap_or(Ok(None))?,
        };

        if answer.as_deref().is_some_and(is_acceptance) {
            return Ok(true);
        }

        writeln!(self.out, "Canceled.")?;
        Ok(false)
    }
}
