//! Persisted configuration: providers, default provider, run mode and shell.
//!
//! A [`Config`] is rebuilt on every invocation from, lowest precedence first:
//!
//! 1. hardcoded defaults (`mode = "confirm"`, `shell = "/bin/sh"`),
//! 2. the config file under `~/.config/aida` (TOML or YAML),
//! 3. `AIDA_DEFAULT_PROVIDER`,
//! 4. the generic active-provider variables `AIDA_LLM_PROVIDER`,
//!    `AIDA_LLM_API_KEY` and `AIDA_LLM_MODEL`,
//! 5. per-provider variables `AIDA_PROVIDER_<NAME>_API_KEY` and
//!    `AIDA_PROVIDER_<NAME>_MODEL`,
//! 6. `AIDA_MODE` and `AIDA_SHELL`.
//!
//! After the overlays a legacy single-provider `[llm]` table is migrated,
//! provider keys are normalized and the default provider is repaired.

use crate::error::{Error, Result};
use crate::providers::{
    FALLBACK_PROVIDER, default_model_for_provider, normalize_provider_name, provider_spec,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_MODE: &str = "confirm";
pub const DEFAULT_SHELL: &str = "/bin/sh";

const CONFIG_FILE_NAMES: [&str; 3] = ["config.toml", "config.yaml", "config.yml"];

const ENV_PREFIX: &str = "AIDA_";
const ENV_DEFAULT_PROVIDER: &str = "AIDA_DEFAULT_PROVIDER";
const ENV_LLM_PROVIDER: &str = "AIDA_LLM_PROVIDER";
const ENV_LLM_API_KEY: &str = "AIDA_LLM_API_KEY";
const ENV_LLM_MODEL: &str = "AIDA_LLM_MODEL";
const ENV_MODE: &str = "AIDA_MODE";
const ENV_SHELL: &str = "AIDA_SHELL";
const ENV_PROVIDER_PREFIX: &str = "AIDA_PROVIDER_";

/// Credentials and model for a single provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: String,
    pub model: String,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Field-wise merge: non-empty incoming values win, empty ones never
    /// clear what is already stored.
    fn merge(&mut self, incoming: ProviderConfig) {
        if !incoming.api_key.is_empty() {
            self.api_key = incoming.api_key;
        }
        if !incoming.model.is_empty() {
            self.model = incoming.model;
        }
    }

    /// Fills only the fields that are still empty.
    fn fill_missing(&mut self, other: ProviderConfig) {
        if self.api_key.is_empty() {
            self.api_key = other.api_key;
        }
        if self.model.is_empty() {
            self.model = other.model;
        }
    }
}

/// Single-provider layout used before named providers existed. Read only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyLlmConfig {
    pub provider: String,
    pub api_key: String,
    pub model: String,
}

impl LegacyLlmConfig {
    fn is_empty(&self) -> bool {
        self.provider.is_empty() && self.api_key.is_empty() && self.model.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_provider: String,
    pub mode: String,
    pub shell: String,
    // Tables go last so the TOML encoder can emit scalars first.
    #[serde(rename = "provider")]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(skip_serializing)]
    pub llm: LegacyLlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_provider: String::new(),
            mode: DEFAULT_MODE.to_string(),
            shell: DEFAULT_SHELL.to_string(),
            providers: BTreeMap::new(),
            llm: LegacyLlmConfig::default(),
        }
    }
}

/// Location of the config directory and the files checked inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    dir: PathBuf,
}

impl ConfigPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.config/aida`.
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            Error::config_io(
                "failed to get home directory",
                "home directory could not be determined",
            )
        })?;
        Ok(Self::new(home.join(".config").join("aida")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First config file that exists, in fixed preference order
    /// (`config.toml`, `config.yaml`, `config.yml`).
    pub fn existing(&self) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| self.dir.join(name))
            .find(|path| path.is_file())
    }

    /// Path [`Config::save_to`] writes: the existing file, else `config.toml`.
    pub fn resolve(&self) -> PathBuf {
        self.existing()
            .unwrap_or_else(|| self.dir.join(CONFIG_FILE_NAMES[0]))
    }
}

type CodecError = Box<dyn std::error::Error + Send + Sync>;

/// Serialization format of a config file, chosen from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
}

impl ConfigFormat {
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Self::Yaml,
            _ => Self::Toml,
        }
    }

    pub fn decode(self, text: &str) -> std::result::Result<Config, CodecError> {
        if text.trim().is_empty() {
            return Ok(Config::default());
        }

        let config: Config = match self {
            Self::Toml => toml::from_str(text)?,
            Self::Yaml => serde_yaml::from_str(text)?,
        };
        Ok(config)
    }

    pub fn encode(self, config: &Config) -> std::result::Result<String, CodecError> {
        let text = match self {
            Self::Toml => toml::to_string_pretty(config)?,
            Self::Yaml => serde_yaml::to_string(config)?,
        };
        Ok(text)
    }
}

impl Config {
    /// Loads the configuration for the current user and process environment.
    pub fn load() -> Result<Self> {
        let paths = ConfigPaths::from_home()?;
        let env = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
        Self::load_from(&paths, env)
    }

    /// Loads from `paths`, overlaying the given environment variables.
    pub fn load_from<I, K, V>(paths: &ConfigPaths, env: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let env: BTreeMap<String, String> = env
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect();

        let mut config = match paths.existing() {
            Some(path) => Self::read_file(&path)?,
            None => {
                debug!("No config file in {}, using defaults", paths.dir().display());
                Self::default()
            }
        };

        config.normalize_providers();
        config.apply_env_overrides(&env);
        config.migrate_legacy_llm();
        config.normalize_providers();
        config.repair_default_provider();

        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::config_io(format!("failed to read config file {}", path.display()), e))?;
        let config = ConfigFormat::for_path(path)
            .decode(&content)
            .map_err(|e| Error::config_io(format!("failed to parse config file {}", path.display()), e))?;
        info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Saves to `~/.config/aida`, returning the path written.
    pub fn save(&self) -> Result<PathBuf> {
        self.save_to(&ConfigPaths::from_home()?)
    }

    /// Writes the whole configuration (legacy fields excluded) to the file
    /// [`ConfigPaths::resolve`] picks, replacing it atomically.
    pub fn save_to(&self, paths: &ConfigPaths) -> Result<PathBuf> {
        let path = paths.resolve();
        create_private_dir(paths.dir())?;

        let content = ConfigFormat::for_path(&path)
            .encode(self)
            .map_err(|e| Error::config_io("marshal config", e))?;
        write_private_file(paths.dir(), &path, content.as_bytes())?;

        info!("Saved config to: {}", path.display());
        Ok(path)
    }

    /// Inserts or merges a provider, returning the normalized name used.
    ///
    /// Returns an empty string, leaving the config untouched, when `name`
    /// normalizes to nothing. A provider left without a model gets the
    /// registry default. The provider becomes the default only when it is the
    /// first one added and no default is set.
    pub fn upsert_provider(&mut self, name: &str, provider: ProviderConfig) -> String {
        let name = normalize_provider_name(name);
        if name.is_empty() {
            return String::new();
        }

        let was_empty = self.providers.is_empty();
        let entry = self.providers.entry(name.clone()).or_default();
        entry.merge(provider);
        if entry.model.is_empty() {
            entry.model = default_model_for_provider(&name).to_string();
        }

        if was_empty && self.default_provider.is_empty() {
            self.default_provider = name.clone();
        }

        name
    }

    /// Removes a provider. A removed default is replaced by the smallest
    /// remaining key, or cleared when none remain.
    pub fn remove_provider(&mut self, name: &str) -> bool {
        let name = normalize_provider_name(name);
        if name.is_empty() || self.providers.remove(&name).is_none() {
            return false;
        }

        if self.default_provider == name {
            self.default_provider = self.first_provider_name().unwrap_or_default();
        }

        true
    }

    pub fn find_provider(&self, name: &str) -> Option<&ProviderConfig> {
        let name = normalize_provider_name(name);
        if name.is_empty() {
            return None;
        }
        self.providers.get(&name)
    }

    /// The provider a run should use.
    ///
    /// Unlike loading, this does not repair a dangling default: by the time
    /// it runs the configuration is expected to be consistent.
    pub fn active_provider(&self) -> Result<(String, ProviderConfig)> {
        let mut name = normalize_provider_name(&self.default_provider);
        if name.is_empty() {
            name = self
                .first_provider_name()
                .ok_or(Error::NoProviderConfigured)?;
        }

        match self.providers.get(&name) {
            Some(provider) => Ok((name, provider.clone())),
            None => Err(Error::ProviderNotConfigured(name)),
        }
    }

    /// Lexicographically smallest provider key.
    pub fn first_provider_name(&self) -> Option<String> {
        self.providers.keys().next().cloned()
    }

    /// Provider that credential-only overrides apply to: the default, else
    /// the first configured provider, else the fallback provider, which then
    /// becomes the default.
    pub(crate) fn override_target(&mut self) -> String {
        let current = normalize_provider_name(&self.default_provider);
        if !current.is_empty() {
            return current;
        }

        if let Some(first) = self.first_provider_name() {
            return first;
        }

        self.default_provider = FALLBACK_PROVIDER.to_string();
        self.default_provider.clone()
    }

    fn apply_env_overrides(&mut self, env: &BTreeMap<String, String>) {
        if let Some(name) = env_value(env, ENV_DEFAULT_PROVIDER) {
            self.default_provider = normalize_provider_name(name);
        }

        self.apply_generic_provider_overrides(env);
        self.apply_specific_provider_overrides(env);

        if let Some(mode) = env_value(env, ENV_MODE) {
            self.mode = mode.trim().to_lowercase();
        }
        if let Some(shell) = env_value(env, ENV_SHELL) {
            self.shell = shell.to_string();
        }
    }

    fn apply_generic_provider_overrides(&mut self, env: &BTreeMap<String, String>) {
        let provider = env_value(env, ENV_LLM_PROVIDER)
            .map(normalize_provider_name)
            .filter(|name| !name.is_empty());
        let api_key = env_value(env, ENV_LLM_API_KEY).unwrap_or_default();
        let model = env_value(env, ENV_LLM_MODEL).unwrap_or_default();

        let target = match provider {
            Some(name) => {
                self.default_provider = name.clone();
                name
            }
            None if api_key.is_empty() && model.is_empty() => return,
            None => self.override_target(),
        };

        debug!("Applying {} overrides to provider {}", ENV_LLM_PROVIDER, target);
        self.upsert_provider(&target, ProviderConfig::new(api_key, model));
    }

    fn apply_specific_provider_overrides(&mut self, env: &BTreeMap<String, String>) {
        for (key, value) in env {
            if value.trim().is_empty() {
                continue;
            }
            let Some(remaining) = key.strip_prefix(ENV_PROVIDER_PREFIX) else {
                continue;
            };

            let (name, provider) = if let Some(name) = remaining.strip_suffix("_API_KEY") {
                (name, ProviderConfig::new(value.as_str(), ""))
            } else if let Some(name) = remaining.strip_suffix("_MODEL") {
                (name, ProviderConfig::new("", value.as_str()))
            } else {
                continue;
            };

            let name = provider_from_env_name(name);
            debug!("Applying {} override to provider {}", key, name);
            self.upsert_provider(&name, provider);
        }
    }

    fn migrate_legacy_llm(&mut self) {
        let legacy = std::mem::take(&mut self.llm);
        if !self.providers.is_empty() || legacy.is_empty() {
            return;
        }

        let mut name = normalize_provider_name(&legacy.provider);
        if name.is_empty() {
            name = FALLBACK_PROVIDER.to_string();
        }

        info!("Migrating legacy [llm] settings to provider {}", name);
        self.providers
            .insert(name.clone(), ProviderConfig::new(legacy.api_key, legacy.model));

        if self.default_provider.is_empty() {
            self.default_provider = name;
        }
    }

    fn normalize_providers(&mut self) {
        let providers = std::mem::take(&mut self.providers);

        for (name, provider) in providers {
            let name = normalize_provider_name(&name);
            if name.is_empty() {
                continue;
            }

            match self.providers.get_mut(&name) {
                Some(existing) => existing.fill_missing(provider),
                None => {
                    self.providers.insert(name, provider);
                }
            }
        }

        for (name, provider) in self.providers.iter_mut() {
            if provider.model.is_empty() {
                provider.model = default_model_for_provider(name).to_string();
            }
        }

        self.default_provider = normalize_provider_name(&self.default_provider);
    }

    fn repair_default_provider(&mut self) {
        if self.default_provider.is_empty() || !self.providers.contains_key(&self.default_provider) {
            let repaired = self.first_provider_name().unwrap_or_default();
            if repaired != self.default_provider {
                debug!(
                    "Default provider {:?} is not configured, using {:?}",
                    self.default_provider, repaired
                );
            }
            self.default_provider = repaired;
        }
    }
}

fn env_value<'a>(env: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    env.get(key)
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
}

/// Environment variable names cannot carry `-`, so `GOOGLE_AI_STUDIO` is
/// matched against the registry with dashes before falling back to the
/// plain lower-cased name.
fn provider_from_env_name(name: &str) -> String {
    let dashed = normalize_provider_name(&name.replace('_', "-"));
    if provider_spec(&dashed).is_some() {
        return dashed;
    }
    normalize_provider_name(name)
}

fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .map_err(|e| Error::config_io(format!("create config dir {}", dir.display()), e))
}

fn write_private_file(dir: &Path, path: &Path, content: &[u8]) -> Result<()> {
    let write_err = |e: std::io::Error| Error::config_io(format!("write config {}", path.display()), e);

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(write_err)?;
    }
    file.write_all(content).map_err(write_err)?;
    file.as_file().sync_all().map_err(write_err)?;
    file.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
