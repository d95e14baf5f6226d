//! Recall Common - Shared types, utilities, and configuration for the Recall memory service.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup and structured logging helpers
//! - Small string utilities used in log output

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    AuthConfig, Config, EmbeddingConfig, MemoryConfig, NetworkConfig, ObservabilityConfig,
    RetrievalConfig,
};
pub use error::Error;
pub use validation::{Validate, ValidationError, ValidationResult};
