//! Applies per-invocation CLI overrides to a loaded [`Config`].
//!
//! Overrides only change the in-memory copy; nothing here saves.

use crate::config::{Config, DEFAULT_SHELL, ProviderConfig};
use crate::error::{Error, Result};
use crate::providers::normalize_provider_name;
use tracing::debug;

/// Values given on the command line for a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub shell: Option<String>,
}

fn non_empty(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or("")
}

/// Applies `overrides` to `config`, returning the provider they targeted.
///
/// An explicit provider becomes the default. Credential overrides without a
/// provider go to the current default, then the first configured provider,
/// then the fallback provider. Returns `None` when no provider or credential
/// override was given.
///
/// # Errors
///
/// [`Error::UnsupportedProvider`] when an explicit provider name is blank.
/// Unknown but non-blank names are accepted here.
pub fn apply_overrides(config: &mut Config, overrides: &Overrides) -> Result<Option<String>> {
    if let Some(shell) = &overrides.shell {
        let shell = shell.trim();
        config.shell = if shell.is_empty() { DEFAULT_SHELL } else { shell }.to_string();
    }

    let api_key = non_empty(&overrides.api_key);
    let model = non_empty(&overrides.model);
    let has_credentials = !api_key.is_empty() || !model.is_empty();

    let candidate = match &overrides.provider {
        Some(raw) => {
            let name = normalize_provider_name(raw);
            if name.is_empty() {
                return Err(Error::UnsupportedProvider(raw.clone()));
            }
            config.default_provider = name.clone();
            name
        }
        None if !has_credentials => return Ok(None),
        None => config.override_target(),
    };

    if has_credentials {
        debug!("Applying command line overrides to provider {}", candidate);
        config.upsert_provider(&candidate, ProviderConfig::new(api_key, model));
    }

    Ok(Some(candidate))
}
