use antartida_core::{AggregationError, ConfigError, FetchError, ValidationError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) => 2,
            Self::Fetch(error) if error.is_invalid_request() => 2,
            Self::Fetch(_) => 3,
            Self::Aggregation(_) => 2,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }

    /// Stable machine-readable code of the underlying error.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "cli.validation",
            Self::Config(error) => error.code(),
            Self::Fetch(error) => error.code(),
            Self::Aggregation(error) => error.code(),
            Self::Serialization(_) => "cli.serialization",
            Self::Io(_) => "cli.io",
        }
    }
}
