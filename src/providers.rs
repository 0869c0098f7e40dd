//! Static registry of known LLM providers.
//!
//! Provider names arrive from config files, environment variables and CLI
//! flags in many spellings. Everything that stores or compares a provider
//! name goes through [`normalize_provider_name`] first, so the rest of the
//! crate only ever sees canonical keys.
//!
//! # Example
//!
//! ```
//! use aida::providers::{default_model_for_provider, normalize_provider_name};
//!
//! assert_eq!(normalize_provider_name("  Google-AI-Studio "), "aistudio");
//! assert_eq!(default_model_for_provider("openai"), "gpt-4o-mini");
//! assert_eq!(normalize_provider_name("Ollama"), "ollama");
//! ```

/// Canonical key of the Google AI Studio provider.
pub const PROVIDER_AISTUDIO: &str = "aistudio";

/// Canonical key of the OpenAI provider.
pub const PROVIDER_OPENAI: &str = "openai";

/// Provider used when credentials are supplied without naming a provider.
pub const FALLBACK_PROVIDER: &str = PROVIDER_AISTUDIO;

/// Registry entry for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSpec {
    pub key: &'static str,
    pub aliases: &'static [&'static str],
    pub default_model: &'static str,
    pub api_key_url: &'static str,
}

static REGISTRY: &[ProviderSpec] = &[
    ProviderSpec {
        key: PROVIDER_AISTUDIO,
        aliases: &["google", "googleai", "google-ai-studio", "gemini"],
        default_model: "gemini-2.5-flash",
        api_key_url: "https://aistudio.google.com/api-keys",
    },
    ProviderSpec {
        key: PROVIDER_OPENAI,
        aliases: &["open-ai"],
        default_model: "gpt-4o-mini",
        api_key_url: "https://platform.openai.com/api-keys",
    },
];

/// Looks up the registry entry for an already-normalized key.
pub fn provider_spec(key: &str) -> Option<&'static ProviderSpec> {
    REGISTRY.iter().find(|spec| spec.key == key)
}

/// Trims, lower-cases and resolves aliases.
///
/// Unknown names are returned lower-cased and trimmed; rejecting them is left
/// to whoever has to construct the provider.
pub fn normalize_provider_name(raw: &str) -> String {
    let normalized = raw.trim().to_lowercase();

    REGISTRY
        .iter()
        .find(|spec| spec.key == normalized || spec.aliases.contains(&normalized.as_str()))
        .map(|spec| spec.key.to_string())
        .unwrap_or(normalized)
}

/// Default model for a provider, or an empty string when the registry has
/// none and the caller must supply one explicitly.
pub fn default_model_for_provider(name: &str) -> &'static str {
    provider_spec(&normalize_provider_name(name))
        .map(|spec| spec.default_model)
        .unwrap_or("")
}

/// Console URL where an API key for the provider can be created.
pub fn api_key_hint(name: &str) -> Option<&'static str> {
    provider_spec(&normalize_provider_name(name)).map(|spec| spec.api_key_url)
}
