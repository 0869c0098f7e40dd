//! aida - natural language to shell commands.
//!
//! aida sends a request to an LLM provider, receives a single shell command
//! back and then prints it, runs it, or asks before running it.
//!
//! # Architecture
//!
//! - [`config`] - Persisted providers, mode and shell, with environment overlays
//! - [`providers`] - Static registry of known providers and their aliases
//! - [`resolver`] - Per-run command line overrides
//! - [`llm_generator`] - Provider API clients that produce commands
//! - [`runner`] - Print / confirm / execute state machine
//! - [`executor`] - Runs accepted commands through a shell
//! - [`prompt_ui`] - Interactive provider setup prompts
//! - [`http_client`] - HTTP client abstraction
//! - [`cli`] - Command line surface
//!
//! # Example
//!
//! ```ignore
//! use aida::config::Config;
//! use aida::llm_generator::{build_generator, format_prompt};
//! use aida::runner::{RunMode, Runner, StdinInput};
//! use aida::executor::SystemShellExecutor;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> aida::Result<()> {
//!     let config = Config::load()?;
//!     let (name, provider) = config.active_provider()?;
//!     let generator = build_generator(&name, &provider, false)?;
//!
//!     let mut runner = Runner::new(
//!         RunMode::Confirm,
//!         std::io::stdout(),
//!         Arc::new(StdinInput),
//!         Arc::new(SystemShellExecutor::new(&config.shell)),
//!     );
//!     let prompt = format_prompt("show disk usage", &config.shell);
//!     runner.run(&CancellationToken::new(), &prompt, generator.as_ref()).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod http_client;
pub mod llm_generator;
pub mod prompt_ui;
pub mod providers;
pub mod resolver;
pub mod runner;

pub use error::{Error, Result};
