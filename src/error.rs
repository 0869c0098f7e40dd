//! Error types shared by the configuration store, resolver and runner.

/// Library-level error type for aida operations.
///
/// A declined request or a user cancellation is not an error; see
/// [`crate::runner::RunOutcome::Cancelled`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Disk, permission or parse failure around the persisted configuration.
    #[error("{context}: {source}")]
    ConfigIo {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("unsupported provider {0:?}")]
    UnsupportedProvider(String),

    #[error("no providers configured; run `aida providers configure <provider>`")]
    NoProviderConfigured,

    #[error("provider {0:?} not configured")]
    ProviderNotConfigured(String),

    #[error("{field} is required for {provider} provider")]
    MissingCredential {
        provider: String,
        field: &'static str,
    },

    #[error("{0}")]
    InvalidInput(String),

    #[error("generate command: {0:#}")]
    Generation(anyhow::Error),

    #[error("list models: {0:#}")]
    ModelListing(anyhow::Error),

    #[error("empty command generated")]
    EmptyCommand,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The executed command finished with a non-zero status.
    #[error("command exited with status {code}")]
    CommandExited { code: i32 },
}

impl Error {
    pub(crate) fn config_io(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ConfigIo {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Process exit code the CLI should use for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CommandExited { code } => *code,
            _ => 1,
        }
    }
}

/// Result type alias for aida operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_io_message_includes_context_and_source() {
        let err = Error::config_io(
            "read /tmp/config.toml",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );

        assert_eq!(err.to_string(), "read /tmp/config.toml: denied");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_command_exited_propagates_exit_code() {
        let err = Error::CommandExited { code: 3 };
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_generation_error_wraps_upstream_chain() {
        let upstream = anyhow::anyhow!("connection refused").context("send openai request");
        let err = Error::Generation(upstream);
        assert_eq!(
            err.to_string(),
            "generate command: send openai request: connection refused"
        );
    }
}
