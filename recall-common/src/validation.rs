//! Configuration validation for Recall services.
//!
//! Checks that every configured value is present and within a usable range
//! before the service starts.

use thiserror::Error;

use crate::config::{
    AuthConfig, Config, EmbeddingConfig, MemoryConfig, NetworkConfig, ObservabilityConfig,
    RetrievalConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 6] = [
            &self.network,
            &self.auth,
            &self.memory,
            &self.retrieval,
            &self.embedding,
            &self.observability,
        ];

        collect(sections.iter().filter_map(|s| s.validate().err()).collect())
    }
}

impl Validate for NetworkConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "network.port".into(),
            });
        }
        if self.bind.parse::<std::net::IpAddr>().is_err() {
            return Err(invalid("network.bind", format!("'{}' is not an IP address", self.bind)));
        }
        Ok(())
    }
}

impl Validate for AuthConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.header.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "auth.header".into(),
            });
        }
        let has_token = self.token.as_deref().is_some_and(|t| !t.is_empty());
        if !has_token && !self.allow_anonymous {
            return Err(ValidationError::MissingField {
                field: "auth.token".into(),
            });
        }
        Ok(())
    }
}

impl Validate for MemoryConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.dimension == 0 {
            errors.push(invalid("memory.dimension", "must be greater than 0"));
        }
        if self.short_term_capacity == 0 {
            errors.push(invalid("memory.short_term_capacity", "must be greater than 0"));
        }
        if self.flush_interval_secs == 0 {
            errors.push(invalid("memory.flush_interval_secs", "must be greater than 0"));
        }
        if self.index_file.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "memory.index_file".into(),
            });
        }
        if self.entries_file.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "memory.entries_file".into(),
            });
        }
        if !self.index_file.is_empty() && self.index_file == self.entries_file {
            errors.push(invalid(
                "memory.entries_file",
                "must differ from memory.index_file",
            ));
        }

        collect(errors)
    }
}

impl Validate for RetrievalConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        // Cosine distance lives in [0, 2].
        if !(self.base_threshold > 0.0 && self.base_threshold <= 2.0) {
            errors.push(invalid("retrieval.base_threshold", "must be in (0, 2]"));
        }
        if !(self.max_threshold > 0.0 && self.max_threshold <= 2.0) {
            errors.push(invalid("retrieval.max_threshold", "must be in (0, 2]"));
        }
        if self.max_threshold < self.base_threshold {
            errors.push(invalid(
                "retrieval.max_threshold",
                "must not be below retrieval.base_threshold",
            ));
        }
        if !(self.relax_factor >= 1.0) {
            errors.push(invalid("retrieval.relax_factor", "must be at least 1.0"));
        }
        if self.oversample_factor == 0 {
            errors.push(invalid("retrieval.oversample_factor", "must be greater than 0"));
        }
        if self.default_k == 0 {
            errors.push(invalid("retrieval.default_k", "must be greater than 0"));
        }

        collect(errors)
    }
}

impl Validate for EmbeddingConfig {
    fn validate(&self) -> ValidationResult<()> {
        match self.provider.as_str() {
            "noop" => Ok(()),
            "openai" => {
                if self.base_url.is_empty() {
                    return Err(ValidationError::MissingField {
                        field: "embedding.base_url".into(),
                    });
                }
                if self.model.is_empty() {
                    return Err(ValidationError::MissingField {
                        field: "embedding.model".into(),
                    });
                }
                if self.timeout_secs == 0 {
                    return Err(invalid("embedding.timeout_secs", "must be greater than 0"));
                }
                Ok(())
            }
            other => Err(invalid(
                "embedding.provider",
                format!("unknown provider '{other}' (expected openai or noop)"),
            )),
        }
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(invalid(
                "observability.log_level",
                format!("'{}' is not one of {LEVELS:?}", self.log_level),
            ));
        }
        if self.log_format != "json" && self.log_format != "pretty" {
            return Err(invalid(
                "observability.log_format",
                format!("'{}' is not json or pretty", self.log_format),
            ));
        }
        Ok(())
    }
}
