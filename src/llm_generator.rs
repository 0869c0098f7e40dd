//! Command generation through LLM provider APIs.
//!
//! Every generator implements [`CommandGenerator`]: given a prompt it returns
//! exactly one shell command, or [`REFUSAL_SENTINEL`] when the model declines.
//! Requests observe the run's [`CancellationToken`] and return as soon as it
//! fires.

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::http_client::{HttpClient, HttpResponse, ReqwestHttpClient};
use crate::providers::{PROVIDER_AISTUDIO, PROVIDER_OPENAI, normalize_provider_name};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Returned by a generator when the request cannot be served by a local
/// shell command.
pub const REFUSAL_SENTINEL: &str = "UNABLE_TO_RUN_LOCAL";

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const AISTUDIO_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const SYSTEM_INSTRUCTION: &str = "You are a shell command generator. \
Output ONLY the raw shell command, no markdown fences, no explanation. \
If you cannot fulfill the request, output UNABLE_TO_RUN_LOCAL.";

const MODELS_PAGE_SIZE: u32 = 100;

#[async_trait]
pub trait CommandGenerator: Send + Sync {
    /// Produces a single candidate shell command for `prompt`.
    async fn generate_command(&self, cancel: &CancellationToken, prompt: &str) -> anyhow::Result<String>;

    fn name(&self) -> &str;
}

/// Prefixes the request with the environment the command will run in.
pub fn format_prompt(request: &str, shell: &str) -> String {
    let shell = if shell.trim().is_empty() {
        crate::config::DEFAULT_SHELL
    } else {
        shell
    };
    let cwd = std::env::current_dir()
        .map(|dir| dir.display().to_string())
        .unwrap_or_default();

    format!(
        "OS: {}\nArch: {}\nPWD: {}\nShell: {}\nRequest: {}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        cwd,
        shell,
        request
    )
}

/// Trims model output and strips a surrounding Markdown code fence.
pub fn sanitize_command(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let Some((_, body)) = trimmed.split_once('\n') else {
        return trimmed.trim_matches('`').trim().to_string();
    };

    let body = match body.rfind("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim().to_string()
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    request: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(anyhow!("request canceled")),
        result = request => result,
    }
}

fn ensure_success(provider: &str, response: &HttpResponse) -> anyhow::Result<()> {
    if response.is_success() {
        return Ok(());
    }
    Err(anyhow!(
        "{} request failed with status {}: {}",
        provider,
        response.status,
        response.body.trim()
    ))
}

// =============================================================================
// OpenAI
// =============================================================================

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModelList {
    #[serde(default)]
    data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModel {
    id: String,
}

/// Generator backed by the OpenAI chat completions API.
pub struct OpenAiGenerator {
    http: Arc<dyn HttpClient>,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiGenerator {
    pub fn new(http: Arc<dyn HttpClient>, api_key: &str, model: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(missing(PROVIDER_OPENAI, "api_key"));
        }
        if model.trim().is_empty() {
            return Err(missing(PROVIDER_OPENAI, "model"));
        }

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: OPENAI_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request(&self, prompt: &str) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_INSTRUCTION },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0
        });
        let auth = format!("Bearer {}", self.api_key);
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post_json(&url, &[("Authorization", auth.as_str())], &body)
            .await
            .context("send openai request")?;
        ensure_success(PROVIDER_OPENAI, &response)?;

        let parsed: OpenAiChatResponse =
            serde_json::from_str(&response.body).context("parse openai response")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("openai response missing content"))?;

        Ok(sanitize_command(&content))
    }
}

#[async_trait]
impl CommandGenerator for OpenAiGenerator {
    async fn generate_command(&self, cancel: &CancellationToken, prompt: &str) -> anyhow::Result<String> {
        info!("Generating command with openai model {}", self.model);
        cancellable(cancel, self.request(prompt)).await
    }

    fn name(&self) -> &str {
        PROVIDER_OPENAI
    }
}

// =============================================================================
// Google AI Studio
// =============================================================================

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiStudioModelList {
    #[serde(default)]
    models: Vec<AiStudioModel>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiStudioModel {
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

/// Generator backed by the Gemini `generateContent` API of Google AI Studio.
pub struct AiStudioGenerator {
    http: Arc<dyn HttpClient>,
    api_key: String,
    model: String,
    base_url: String,
}

impl AiStudioGenerator {
    pub fn new(http: Arc<dyn HttpClient>, api_key: &str, model: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(missing(PROVIDER_AISTUDIO, "api_key"));
        }
        if model.trim().is_empty() {
            return Err(missing(PROVIDER_AISTUDIO, "model"));
        }

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: AISTUDIO_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request(&self, prompt: &str) -> anyhow::Result<String> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });
        let model = self.model.trim_start_matches("models/");
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );

        let response = self
            .http
            .post_json(&url, &[("x-goog-api-key", self.api_key.as_str())], &body)
            .await
            .context("send aistudio request")?;
        ensure_success(PROVIDER_AISTUDIO, &response)?;

        let parsed: GenerateContentResponse =
            serde_json::from_str(&response.body).context("parse aistudio response")?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(anyhow!("aistudio response missing content"));
        }
        Ok(sanitize_command(&text))
    }
}

#[async_trait]
impl CommandGenerator for AiStudioGenerator {
    async fn generate_command(&self, cancel: &CancellationToken, prompt: &str) -> anyhow::Result<String> {
        info!("Generating command with aistudio model {}", self.model);
        cancellable(cancel, self.request(prompt)).await
    }

    fn name(&self) -> &str {
        PROVIDER_AISTUDIO
    }
}

// =============================================================================
// Mock
// =============================================================================

/// Offline generator enabled with `AIDA_USE_MOCK`.
pub struct MockGenerator;

impl MockGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn mock_generate(&self, prompt: &str) -> String {
        let request = prompt
            .split_once("Request: ")
            .map(|(_, request)| request)
            .unwrap_or(prompt)
            .trim();
        let lower = request.to_lowercase();

        if lower.contains("impossible") {
            REFUSAL_SENTINEL.to_string()
        } else if lower.contains("list") && lower.contains("file") {
            "ls -la".to_string()
        } else if lower.contains("disk") {
            "df -h".to_string()
        } else if lower.contains("date") || lower.contains("time") {
            "date".to_string()
        } else {
            format!("echo '{}'", request.replace('\'', r"'\''"))
        }
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandGenerator for MockGenerator {
    async fn generate_command(&self, _cancel: &CancellationToken, prompt: &str) -> anyhow::Result<String> {
        Ok(self.mock_generate(prompt))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// =============================================================================
// Construction and model listing
// =============================================================================

fn missing(provider: &str, field: &'static str) -> Error {
    Error::MissingCredential {
        provider: provider.to_string(),
        field,
    }
}

/// Builds the generator for a resolved provider.
///
/// This is where unknown provider names are finally rejected.
pub fn build_generator(
    name: &str,
    provider: &ProviderConfig,
    use_mock: bool,
) -> Result<Box<dyn CommandGenerator>> {
    if use_mock {
        info!("Using mock generator (AIDA_USE_MOCK)");
        return Ok(Box::new(MockGenerator::new()));
    }

    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    match normalize_provider_name(name).as_str() {
        PROVIDER_AISTUDIO => Ok(Box::new(AiStudioGenerator::new(
            http,
            &provider.api_key,
            &provider.model,
        )?)),
        PROVIDER_OPENAI => Ok(Box::new(OpenAiGenerator::new(
            http,
            &provider.api_key,
            &provider.model,
        )?)),
        _ => Err(Error::UnsupportedProvider(name.to_string())),
    }
}

/// A model offered by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: String,
    pub supported_actions: Vec<String>,
}

/// Lists the models a provider offers.
pub async fn list_models(
    http: &dyn HttpClient,
    cancel: &CancellationToken,
    provider: &str,
    config: &ProviderConfig,
) -> Result<Vec<ModelInfo>> {
    let provider = normalize_provider_name(provider);
    if provider.is_empty() {
        return Err(Error::InvalidInput("provider name is required".to_string()));
    }

    match provider.as_str() {
        PROVIDER_OPENAI => {
            let api_key = required_key(&provider, config)?;
            cancellable(cancel, list_openai_models(http, OPENAI_BASE_URL, api_key))
                .await
                .map_err(Error::ModelListing)
        }
        PROVIDER_AISTUDIO => {
            let api_key = required_key(&provider, config)?;
            cancellable(cancel, list_aistudio_models(http, AISTUDIO_BASE_URL, api_key))
                .await
                .map_err(Error::ModelListing)
        }
        _ => Err(Error::UnsupportedProvider(provider)),
    }
}

fn required_key<'a>(provider: &str, config: &'a ProviderConfig) -> Result<&'a str> {
    let api_key = config.api_key.trim();
    if api_key.is_empty() {
        return Err(missing(provider, "api_key"));
    }
    Ok(api_key)
}

async fn list_openai_models(
    http: &dyn HttpClient,
    base_url: &str,
    api_key: &str,
) -> anyhow::Result<Vec<ModelInfo>> {
    let auth = format!("Bearer {api_key}");
    let url = format!("{}/models", base_url.trim_end_matches('/'));

    let response = http
        .get(&url, &[("Authorization", auth.as_str())])
        .await
        .context("send openai request")?;
    ensure_success(PROVIDER_OPENAI, &response)?;

    let list: OpenAiModelList =
        serde_json::from_str(&response.body).context("parse openai response")?;

    Ok(list
        .data
        .into_iter()
        .filter(|model| !model.id.trim().is_empty())
        .map(|model| ModelInfo {
            display_name: model.id.clone(),
            name: model.id,
            supported_actions: vec!["generateContent".to_string()],
        })
        .collect())
}

async fn list_aistudio_models(
    http: &dyn HttpClient,
    base_url: &str,
    api_key: &str,
) -> anyhow::Result<Vec<ModelInfo>> {
    let mut models = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut url = Url::parse(&format!("{}/v1beta/models", base_url.trim_end_matches('/')))
            .context("build aistudio models url")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pageSize", &MODELS_PAGE_SIZE.to_string());
            if let Some(token) = &page_token {
                query.append_pair("pageToken", token);
            }
        }

        let response = http
            .get(url.as_str(), &[("x-goog-api-key", api_key)])
            .await
            .context("send aistudio request")?;
        ensure_success(PROVIDER_AISTUDIO, &response)?;

        let page: AiStudioModelList =
            serde_json::from_str(&response.body).context("parse aistudio response")?;
        debug!("Fetched {} aistudio models", page.models.len());

        models.extend(page.models.into_iter().map(|model| ModelInfo {
            name: model.name,
            display_name: model.display_name,
            supported_actions: model.supported_generation_methods,
        }));

        match page.next_page_token.filter(|token| !token.is_empty()) {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(models)
}

/// Keeps models that can serve `generateContent` requests.
pub fn filter_generate_content(models: Vec<ModelInfo>) -> Vec<ModelInfo> {
    models
        .into_iter()
        .filter(|model| {
            model
                .supported_actions
                .iter()
                .any(|action| action.to_lowercase().contains("generatecontent"))
        })
        .collect()
}

pub fn display_model_name(name: &str) -> &str {
    name.strip_prefix("models/").unwrap_or(name)
}
