//! Error types for the Recall service.

use thiserror::Error;

use crate::validation::ValidationError;

/// Unified error type for Recall services.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Auth(_) => 401,
            Self::InvalidInput(_) => 400,
            Self::Config(_) => 500,
        }
    }

    /// Message suitable for a client, without the variant prefix for
    /// caller-facing errors.
    pub fn client_message(&self) -> String {
        match self {
            Self::Auth(msg) | Self::InvalidInput(msg) => msg.clone(),
            Self::Config(_) => self.to_string(),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Self::Config(err.to_string())
    }
}
