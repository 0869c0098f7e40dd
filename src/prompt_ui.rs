//! Interactive prompts used by `aida providers configure`.
//!
//! Each prompt has a `_with_io` variant taking the reader and writer so it
//! can be driven from tests.

use crate::error::Result;
use crate::providers::{api_key_hint, default_model_for_provider};
use std::io::{BufRead, Write};
use tracing::debug;

/// Collects provider credentials from the terminal.
pub struct ProviderSetupUI;

impl ProviderSetupUI {
    pub fn new() -> Self {
        Self
    }

    // =========================================================================
    // Core methods with I/O injection (testable)
    // =========================================================================

    /// Shows where to create a key, then reads one line.
    ///
    /// Returns the trimmed answer, which is empty at end of input.
    pub fn prompt_for_api_key_with_io<R: BufRead, W: Write>(
        &self,
        provider: &str,
        input: &mut R,
        output: &mut W,
    ) -> Result<String> {
        if let Some(hint) = api_key_hint(provider) {
            writeln!(output, "Create an API key at: {}", hint)?;
        }
        write!(output, "Enter API key: ")?;
        output.flush()?;

        let key = read_trimmed_line(input)?;
        debug!("Read API key for {} ({} chars)", provider, key.len());
        Ok(key)
    }

    /// Reads a model name, falling back to the registry default on an empty
    /// answer. The result is empty for providers without a default.
    pub fn prompt_for_model_with_io<R: BufRead, W: Write>(
        &self,
        provider: &str,
        input: &mut R,
        output: &mut W,
    ) -> Result<String> {
        let default_model = default_model_for_provider(provider);
        if default_model.is_empty() {
            write!(output, "Enter model (optional): ")?;
        } else {
            write!(output, "Enter model (default: {}): ", default_model)?;
        }
        output.flush()?;

        let model = read_trimmed_line(input)?;
        if model.is_empty() {
            return Ok(default_model.to_string());
        }
        Ok(model)
    }
}

impl Default for ProviderSetupUI {
    fn default() -> Self {
        Self::new()
    }
}

fn read_trimmed_line<R: BufRead>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}
