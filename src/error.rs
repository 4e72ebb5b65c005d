use thiserror::Error;

/// Configuration problems detected while resolving the run environment.
///
/// These are fatal: the run aborts before any browser is launched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {var}")]
    Missing { var: &'static str },

    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Outcome of a failed browser launch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// The browser executable is not installed; an install may fix it.
    #[error("browser executable is missing: {0}")]
    BinaryMissing(String),

    #[error("browser launch failed: {0}")]
    Other(String),
}
