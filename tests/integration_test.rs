use anyhow::Result;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Runs the aida binary against an isolated home directory.
///
/// The mock generator is enabled so no network access is needed.
fn run_aida(home: &Path, args: &[&str], env: &[(&str, &str)], stdin: Option<&str>) -> Result<Output> {
    run_aida_in(home, home, args, env, stdin)
}

/// Like [`run_aida`] but with an explicit working directory.
fn run_aida_in(
    home: &Path,
    cwd: &Path,
    args: &[&str],
    env: &[(&str, &str)],
    stdin: Option<&str>,
) -> Result<Output> {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_aida"));
    cmd.args(args);
    cmd.current_dir(cwd);
    cmd.env("HOME", home);
    cmd.env("AIDA_USE_MOCK", "1");
    for (key, _) in std::env::vars() {
        if key.starts_with("AIDA_") && key != "AIDA_USE_MOCK" {
            cmd.env_remove(key);
        }
    }
    cmd.envs(env.iter().copied());
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn()?;
    if let Some(mut pipe) = child.stdin.take() {
        if let Some(input) = stdin {
            pipe.write_all(input.as_bytes())?;
        }
    }
    Ok(child.wait_with_output()?)
}

fn config_dir(home: &Path) -> PathBuf {
    home.join(".config").join("aida")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

// =============================================================================
// Generate and run
// =============================================================================

#[test]
fn test_dry_run_prints_command_with_env_credentials() -> Result<()> {
    let home = TempDir::new()?;

    let output = run_aida(
        home.path(),
        &["--dry-run", "list", "all", "files"],
        &[("AIDA_LLM_API_KEY", "test-key")],
        None,
    )?;

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "ls -la\n");
    // Environment overrides are never persisted.
    assert!(!config_dir(home.path()).exists());
    Ok(())
}

#[test]
fn test_no_provider_configured_is_an_error() -> Result<()> {
    let home = TempDir::new()?;

    let output = run_aida(home.path(), &["-n", "list", "files"], &[], None)?;

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Error: no providers configured"));
    Ok(())
}

#[test]
fn test_unknown_provider_flag_is_an_error() -> Result<()> {
    let home = TempDir::new()?;

    let output = run_aida(
        home.path(),
        &["--provider", "Ollama", "-n", "list", "files"],
        &[("AIDA_PROVIDER_OPENAI_API_KEY", "sk")],
        None,
    )?;

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("provider \"ollama\" not configured"));
    Ok(())
}

#[test]
fn test_refusal_exits_cleanly() -> Result<()> {
    let home = TempDir::new()?;

    let output = run_aida(
        home.path(),
        &["--yolo", "do", "the", "impossible"],
        &[("AIDA_LLM_API_KEY", "k")],
        None,
    )?;

    assert!(output.status.success());
    assert!(stdout(&output).contains("Unable to process the request locally with shell scripting tools."));
    assert!(!stdout(&output).contains("Running:"));
    Ok(())
}

#[test]
fn test_yolo_runs_generated_command() -> Result<()> {
    let home = TempDir::new()?;

    let output = run_aida(
        home.path(),
        &["--yolo", "say", "hello"],
        &[("AIDA_LLM_API_KEY", "k")],
        None,
    )?;

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Running: \x1b[36m`echo 'say hello'`\x1b[0m"));
    assert!(out.lines().any(|line| line == "say hello"));
    Ok(())
}

#[test]
fn test_quiet_discards_command_output() -> Result<()> {
    let home = TempDir::new()?;

    let output = run_aida(
        home.path(),
        &["--quiet", "say", "hello"],
        &[("AIDA_LLM_API_KEY", "k")],
        None,
    )?;

    assert!(output.status.success());
    assert_eq!(stdout(&output), "");
    Ok(())
}

#[test]
fn test_confirm_declined_does_not_run() -> Result<()> {
    let home = TempDir::new()?;

    let output = run_aida(
        home.path(),
        &["say", "hello"],
        &[("AIDA_LLM_API_KEY", "k")],
        Some("n\n"),
    )?;

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("I would run \x1b[36m`echo 'say hello'`\x1b[0m, confirm? [y/N] "));
    assert!(out.contains("Canceled."));
    assert!(!out.contains("Running:"));
    Ok(())
}

#[test]
fn test_confirm_accepted_runs() -> Result<()> {
    let home = TempDir::new()?;

    let output = run_aida(
        home.path(),
        &["say", "hello"],
        &[("AIDA_LLM_API_KEY", "k"), ("AIDA_MODE", "confirm")],
        Some("yes\n"),
    )?;

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Running:"));
    assert!(out.lines().any(|line| line == "say hello"));
    Ok(())
}

#[test]
fn test_failing_command_exit_code_is_propagated() -> Result<()> {
    let home = TempDir::new()?;

    let output = run_aida(
        home.path(),
        &["--yolo", "--shell", "/bin/false", "say", "hello"],
        &[("AIDA_LLM_API_KEY", "k")],
        None,
    )?;

    assert_eq!(output.status.code(), Some(1));
    assert!(!stderr(&output).contains("Error:"));
    Ok(())
}

#[test]
fn test_dotenv_file_supplies_credentials() -> Result<()> {
    let home = TempDir::new()?;
    let work = TempDir::new()?;
    fs::write(work.path().join(".env"), "AIDA_LLM_API_KEY=dotenv-key\n")?;

    let output = run_aida_in(home.path(), work.path(), &["-n", "list", "files"], &[], None)?;

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "ls -la\n");
    Ok(())
}

#[test]
fn test_process_env_beats_dotenv_file() -> Result<()> {
    let home = TempDir::new()?;
    let work = TempDir::new()?;
    fs::write(
        work.path().join(".env"),
        "AIDA_LLM_API_KEY=dotenv-key\nAIDA_MODE=yolo\n",
    )?;

    let output = run_aida_in(
        home.path(),
        work.path(),
        &["say", "hello"],
        &[("AIDA_MODE", "print")],
        None,
    )?;

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "echo 'say hello'\n");
    Ok(())
}

// =============================================================================
// providers subcommands
// =============================================================================

#[test]
fn test_providers_lifecycle() -> Result<()> {
    let home = TempDir::new()?;
    let home = home.path();

    let output = run_aida(home, &["providers", "list"], &[], None)?;
    assert_eq!(stdout(&output), "No providers configured.\n");

    let output = run_aida(
        home,
        &["providers", "configure", "OpenAI", "--api-key", "sk-1", "--model", "gpt-4o"],
        &[],
        None,
    )?;
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).starts_with("Configured openai in "));

    let output = run_aida(home, &["providers", "configure", "gemini"], &[], Some("g-key\n\n"))?;
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let saved = fs::read_to_string(config_dir(home).join("config.toml"))?;
    assert!(saved.contains("sk-1"));
    assert!(saved.contains("gemini-2.5-flash"));

    let output = run_aida(home, &["providers", "list"], &[], None)?;
    assert_eq!(stdout(&output), "aistudio\nopenai (default)\n");

    let output = run_aida(home, &["providers", "default", "google"], &[], None)?;
    assert!(output.status.success());
    let output = run_aida(home, &["providers", "default"], &[], None)?;
    assert_eq!(stdout(&output), "aistudio\n");

    let output = run_aida(home, &["providers", "set-model", "aistudio", "gemini-2.5-pro"], &[], None)?;
    assert!(stdout(&output).starts_with("Set aistudio model to gemini-2.5-pro in "));

    let output = run_aida(home, &["providers", "logout", "aistudio"], &[], None)?;
    assert!(stdout(&output).starts_with("Removed aistudio from "));

    let output = run_aida(home, &["providers", "list"], &[], None)?;
    assert_eq!(stdout(&output), "openai (default)\n");

    let output = run_aida(home, &["providers", "logout", "aistudio"], &[], None)?;
    assert_eq!(stdout(&output), "Provider aistudio not configured.\n");

    // Configured credentials are enough to generate.
    let output = run_aida(home, &["-n", "show", "disk", "usage"], &[], None)?;
    assert_eq!(stdout(&output), "df -h\n");
    Ok(())
}

#[test]
fn test_default_requires_configured_provider() -> Result<()> {
    let home = TempDir::new()?;

    let output = run_aida(home.path(), &["providers", "default", "openai"], &[], None)?;

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("provider \"openai\" not configured"));
    Ok(())
}

#[test]
fn test_yaml_config_is_read_and_kept() -> Result<()> {
    let home = TempDir::new()?;
    let dir = config_dir(home.path());
    fs::create_dir_all(&dir)?;
    fs::write(
        dir.join("config.yaml"),
        "default_provider: open-ai\nprovider:\n  OpenAI:\n    api_key: sk-yaml\n",
    )?;

    let output = run_aida(home.path(), &["providers", "list"], &[], None)?;
    assert_eq!(stdout(&output), "openai (default)\n");

    let output = run_aida(home.path(), &["providers", "set-model", "openai", "--model", "gpt-4.1"], &[], None)?;
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    assert!(!dir.join("config.toml").exists());
    let saved = fs::read_to_string(dir.join("config.yaml"))?;
    assert!(saved.contains("gpt-4.1"));
    assert!(saved.contains("sk-yaml"));
    Ok(())
}
