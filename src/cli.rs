//! Command line surface: the default generate-and-run action and the
//! `providers` management subcommands.

use crate::config::{Config, ConfigPaths, ProviderConfig};
use crate::error::{Error, Result};
use crate::executor::SystemShellExecutor;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::llm_generator::{
    build_generator, display_model_name, filter_generate_content, format_prompt, list_models,
};
use crate::prompt_ui::ProviderSetupUI;
use crate::providers::normalize_provider_name;
use crate::resolver::{Overrides, apply_overrides};
use crate::runner::{RunMode, RunOutcome, Runner, StdinInput};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Environment variable that swaps provider APIs for the offline generator.
pub const ENV_USE_MOCK: &str = "AIDA_USE_MOCK";

pub fn build_cli() -> Command {
    Command::new("aida")
        .about("Turns a natural-language request into a shell command")
        .long_about(
            "aida asks an LLM provider for a single shell command that fulfils the request, \
             then prints it, runs it, or asks before running it",
        )
        .version(env!("CARGO_PKG_VERSION"))
        .args_conflicts_with_subcommands(true)
        .arg(
            Arg::new("prompt")
                .help("What the command should do")
                .value_name("PROMPT")
                .num_args(1..),
        )
        .arg(
            Arg::new("dash_prompt")
                .help("Prompt words after `--`, taken literally")
                .value_name("PROMPT")
                .num_args(1..)
                .last(true),
        )
        .arg(
            Arg::new("provider")
                .long("provider")
                .help("Provider to use for this run")
                .value_name("PROVIDER"),
        )
        .arg(
            Arg::new("api-key")
                .long("api-key")
                .help("API key to use for this run")
                .value_name("API_KEY"),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .help("Model to use for this run")
                .value_name("MODEL"),
        )
        .arg(
            Arg::new("shell")
                .long("shell")
                .help("Shell used to run the command")
                .value_name("SHELL"),
        )
        .arg(
            Arg::new("yolo")
                .long("yolo")
                .help("Run without asking for confirmation")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Run without confirmation and discard the command's output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .short('n')
                .help("Print the command instead of running it")
                .action(ArgAction::SetTrue),
        )
        .subcommand(providers_command())
}

fn providers_command() -> Command {
    Command::new("providers")
        .about("Manage configured providers")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(Command::new("list").about("List configured providers"))
        .subcommand(
            Command::new("logout")
                .about("Remove a configured provider")
                .arg(Arg::new("provider").required(true)),
        )
        .subcommand(
            Command::new("default")
                .about("Get or set the default provider")
                .arg(Arg::new("provider")),
        )
        .subcommand(
            Command::new("set-model")
                .about("Set the default model for a provider")
                .arg(Arg::new("provider").required(true))
                .arg(Arg::new("model_arg").value_name("MODEL"))
                .arg(
                    Arg::new("model")
                        .long("model")
                        .help("Model to set (can also be given as the second argument)")
                        .value_name("MODEL"),
                ),
        )
        .subcommand(
            Command::new("configure")
                .about("Configure provider credentials and defaults")
                .arg(Arg::new("provider").required(true))
                .arg(
                    Arg::new("api-key")
                        .long("api-key")
                        .help("API key to store (skips prompt)")
                        .value_name("API_KEY"),
                )
                .arg(
                    Arg::new("model")
                        .long("model")
                        .help("Default model to use (skips prompt)")
                        .value_name("MODEL"),
                ),
        )
        .subcommand(
            Command::new("models")
                .about("List available models for a provider")
                .arg(Arg::new("provider"))
                .arg(
                    Arg::new("all")
                        .long("all")
                        .help("Show all models, not just generateContent-capable ones")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("api-key")
                        .long("api-key")
                        .help("API key to use for listing models")
                        .value_name("API_KEY"),
                ),
        )
}

/// Dispatches parsed arguments.
pub async fn run(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("providers", providers)) => run_providers(providers).await,
        _ => {
            let outcome = run_prompt(matches).await?;
            debug!("Run finished: {:?}", outcome);
            Ok(())
        }
    }
}

/// Fires the returned token on the first Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            trigger.cancel();
        }
    });
    cancel
}

fn use_mock() -> bool {
    std::env::var(ENV_USE_MOCK).is_ok_and(|value| !value.is_empty() && value != "0")
}

fn string_arg(matches: &ArgMatches, id: &str) -> Option<String> {
    matches.get_one::<String>(id).cloned()
}

/// Mode flags win over the configured mode, strongest first.
pub fn run_mode(matches: &ArgMatches, config: &Config) -> RunMode {
    if matches.get_flag("dry-run") {
        RunMode::Print
    } else if matches.get_flag("quiet") {
        RunMode::Quiet
    } else if matches.get_flag("yolo") {
        RunMode::Yolo
    } else {
        RunMode::from(config.mode.as_str())
    }
}

/// Joins the prompt words. Words after `--` replace everything before it.
pub fn prompt_from_matches(matches: &ArgMatches) -> String {
    let words = matches
        .get_many::<String>("dash_prompt")
        .or_else(|| matches.get_many::<String>("prompt"))
        .unwrap_or_default();
    words.map(String::as_str).collect::<Vec<_>>().join(" ")
}

async fn run_prompt(matches: &ArgMatches) -> Result<RunOutcome> {
    let request = prompt_from_matches(matches);
    if request.trim().is_empty() {
        return Err(Error::InvalidInput(
            "a prompt is required; see `aida --help`".to_string(),
        ));
    }

    let mut config = Config::load()?;
    let overrides = Overrides {
        provider: string_arg(matches, "provider"),
        api_key: string_arg(matches, "api-key"),
        model: string_arg(matches, "model"),
        shell: string_arg(matches, "shell"),
    };
    apply_overrides(&mut config, &overrides)?;

    let (name, provider) = config.active_provider()?;
    let generator = build_generator(&name, &provider, use_mock())?;
    let mode = run_mode(matches, &config);
    info!("Using provider {} in {:?} mode", name, mode);

    let mut runner = Runner::new(
        mode,
        io::stdout(),
        Arc::new(StdinInput),
        Arc::new(SystemShellExecutor::new(&config.shell)),
    );
    let prompt = format_prompt(&request, &config.shell);
    let cancel = cancel_on_interrupt();

    runner.run(&cancel, &prompt, generator.as_ref()).await
}

async fn run_providers(matches: &ArgMatches) -> Result<()> {
    let paths = ConfigPaths::from_home()?;
    let mut config = Config::load()?;
    let mut out = io::stdout();

    match matches.subcommand() {
        Some(("list", _)) => list_providers(&config, &mut out),
        Some(("logout", sub)) => {
            let name = string_arg(sub, "provider").unwrap_or_default();
            logout_provider(&mut config, &paths, &name, &mut out)
        }
        Some(("default", sub)) => {
            let name = string_arg(sub, "provider");
            default_provider(&mut config, &paths, name.as_deref(), &mut out)
        }
        Some(("set-model", sub)) => {
            let name = string_arg(sub, "provider").unwrap_or_default();
            let model = string_arg(sub, "model_arg").or_else(|| string_arg(sub, "model"));
            set_model(&mut config, &paths, &name, model.as_deref(), &mut out)
        }
        Some(("configure", sub)) => {
            let name = string_arg(sub, "provider").unwrap_or_default();
            let request = ConfigureRequest {
                name: &name,
                api_key: string_arg(sub, "api-key"),
                model: string_arg(sub, "model"),
            };
            configure_provider(&mut config, &paths, request, &mut io::stdin().lock(), &mut out)
        }
        Some(("models", sub)) => {
            let request = ModelsRequest {
                name: string_arg(sub, "provider"),
                api_key: string_arg(sub, "api-key"),
                all: sub.get_flag("all"),
            };
            let cancel = cancel_on_interrupt();
            list_provider_models(&config, request, &ReqwestHttpClient::new(), &cancel, &mut out).await
        }
        _ => Err(Error::InvalidInput("unknown providers subcommand".to_string())),
    }
}

fn require_name(raw: &str) -> Result<String> {
    let name = normalize_provider_name(raw);
    if name.is_empty() {
        return Err(Error::UnsupportedProvider(raw.to_string()));
    }
    Ok(name)
}

// =============================================================================
// providers subcommands
// =============================================================================

/// Prints configured providers in key order, marking the default.
pub fn list_providers<W: Write>(config: &Config, out: &mut W) -> Result<()> {
    if config.providers.is_empty() {
        writeln!(out, "No providers configured.")?;
        return Ok(());
    }

    for name in config.providers.keys() {
        if !name.is_empty() && *name == config.default_provider {
            writeln!(out, "{} (default)", name)?;
        } else {
            writeln!(out, "{}", name)?;
        }
    }
    Ok(())
}

pub fn logout_provider<W: Write>(config: &mut Config, paths: &ConfigPaths, name: &str, out: &mut W) -> Result<()> {
    let name = require_name(name)?;

    if !config.remove_provider(&name) {
        writeln!(out, "Provider {} not configured.", name)?;
        return Ok(());
    }

    let path = config.save_to(paths)?;
    writeln!(out, "Removed {} from {}", name, path.display())?;
    Ok(())
}

/// Prints the default provider, or sets it to an already configured one.
pub fn default_provider<W: Write>(
    config: &mut Config,
    paths: &ConfigPaths,
    name: Option<&str>,
    out: &mut W,
) -> Result<()> {
    let Some(name) = name else {
        if config.default_provider.is_empty() {
            writeln!(out, "No default provider set.")?;
        } else {
            writeln!(out, "{}", config.default_provider)?;
        }
        return Ok(());
    };

    let name = require_name(name)?;
    if config.find_provider(&name).is_none() {
        return Err(Error::ProviderNotConfigured(name));
    }

    config.default_provider = name.clone();
    let path = config.save_to(paths)?;
    writeln!(out, "Set default provider to {} in {}", name, path.display())?;
    Ok(())
}

pub fn set_model<W: Write>(
    config: &mut Config,
    paths: &ConfigPaths,
    name: &str,
    model: Option<&str>,
    out: &mut W,
) -> Result<()> {
    let name = require_name(name)?;
    let model = model.map(str::trim).unwrap_or_default();
    if model.is_empty() {
        return Err(Error::InvalidInput(
            "model is required (either as an argument or via --model flag)".to_string(),
        ));
    }

    if config.find_provider(&name).is_none() {
        return Err(Error::ProviderNotConfigured(name));
    }

    config.upsert_provider(&name, ProviderConfig::new("", model));
    let path = config.save_to(paths)?;
    writeln!(out, "Set {} model to {} in {}", name, model, path.display())?;
    Ok(())
}

/// Arguments of `providers configure`.
pub struct ConfigureRequest<'a> {
    pub name: &'a str,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

/// Stores credentials for a provider, prompting for whatever was not given.
pub fn configure_provider<R: BufRead, W: Write>(
    config: &mut Config,
    paths: &ConfigPaths,
    request: ConfigureRequest<'_>,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    let name = require_name(request.name)?;
    let ui = ProviderSetupUI::new();

    let api_key = match request.api_key.filter(|key| !key.is_empty()) {
        Some(key) => key,
        None => ui.prompt_for_api_key_with_io(&name, input, out)?,
    };
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(Error::MissingCredential {
            provider: name,
            field: "api_key",
        });
    }

    let model = match request.model.filter(|model| !model.is_empty()) {
        Some(model) => model,
        None => ui.prompt_for_model_with_io(&name, input, out)?,
    };

    config.upsert_provider(&name, ProviderConfig::new(api_key, model.trim()));
    let path = config.save_to(paths)?;
    writeln!(out, "Configured {} in {}", name, path.display())?;
    Ok(())
}

/// Arguments of `providers models`.
pub struct ModelsRequest {
    pub name: Option<String>,
    pub api_key: Option<String>,
    pub all: bool,
}

/// Lists a provider's models, by default only those that can generate
/// content. Without a name the active provider is used.
pub async fn list_provider_models<W: Write>(
    config: &Config,
    request: ModelsRequest,
    http: &dyn HttpClient,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<()> {
    let (name, mut provider) = match request.name.as_deref() {
        None => config.active_provider()?,
        Some(raw) => {
            let name = require_name(raw)?;
            let provider = config.find_provider(&name).cloned().unwrap_or_default();
            (name, provider)
        }
    };

    if let Some(api_key) = request.api_key.filter(|key| !key.is_empty()) {
        provider.api_key = api_key;
    }

    let mut models = list_models(http, cancel, &name, &provider).await?;
    if !request.all {
        models = filter_generate_content(models);
    }

    if models.is_empty() {
        writeln!(out, "No models found.")?;
        return Ok(());
    }

    for model in &models {
        writeln!(out, "{}", display_model_name(&model.name))?;
    }
    Ok(())
}
