//! Screener Common - shared configuration, errors and logging.
//!
//! This crate provides:
//! - Configuration types and loading (file + environment overrides)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    Config, DataConfig, IndexSourceConfig, IngestConfig, NetworkConfig, ObservabilityConfig,
    ScreenerConfig, SecretsConfig, StorageConfig,
};
pub use error::{Error, Result, ResultExt};
pub use validation::{Validate, ValidationError, ValidationResult};
