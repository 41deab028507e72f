//! Error types for the Turnstile service.

use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// Exceeding a quota is not an error: it is an `AdmissionDecision` with
/// `allowed == false`.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// A resolved policy key has no registered policy
    #[error("Policy not found: {0}")]
    PolicyNotFound(String),

    /// A policy fails its own invariants at load time
    #[error("Invalid policy '{key}': {reason}")]
    InvalidPolicy { key: String, reason: String },

    /// The counter store failed or did not answer in time
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// An evaluation was requested with no policies
    #[error("No policies to evaluate")]
    NoPolicies,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TurnstileError {
    /// Stable machine-readable code used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PolicyNotFound(_) | Self::NoPolicies => "CONFIG_NOT_FOUND",
            Self::InvalidPolicy { .. } => "INVALID_POLICY",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Server(_) => "SERVER_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

impl From<config::ConfigError> for TurnstileError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
