//! Error types for the maskgate core library.

use thiserror::Error;

/// Result type alias using the maskgate Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for permission compilation and evaluation.
#[derive(Debug, Error)]
pub enum Error {
    /// Permission token does not split into 3 or 4 colon-separated parts.
    #[error("{0}")]
    MalformedPermission(String),

    /// Bundle/group/level combination is not registered.
    #[error("{0}")]
    UnknownPermission(String),

    /// Internal consistency failure (unresolvable bundle, unsupported level,
    /// missing factory, invalid definition table).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unrecognized combination mode.
    #[error("{0}")]
    InvalidMode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short machine-readable name of the error kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedPermission(_) => "malformed_permission",
            Self::UnknownPermission(_) => "unknown_permission",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::InvalidMode(_) => "invalid_mode",
            Self::Config(_) => "config",
            Self::Json(_) => "json",
            Self::Toml(_) => "toml",
            Self::Io(_) => "io",
        }
    }
}
