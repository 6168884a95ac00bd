//! Error types for the migration subsystem
//!
//! Provides error handling for:
//! - Step transforms failing on a single document
//! - Host persistence and settings failures
//! - Registry construction (duplicate versions)
//! - Configuration loading
//! - Run-level failures that stop a migration before finalizing

use sta_document::{DocumentError, SchemaVersion};

/// A single step failed while transforming a single document
///
/// Always recovered per document: the document is skipped for the phase.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// Document data had a shape the step cannot handle
    #[error("unexpected document shape at '{path}': {message}")]
    InvalidShape {
        /// Pointer to the offending field
        path: String,
        /// What was wrong
        message: String,
    },

    /// Snapshot edit failed
    #[error("document edit failed: {0}")]
    Document(#[from] DocumentError),

    /// Step-specific failure
    #[error("{0}")]
    Other(String),
}

impl StepError {
    /// Create shape error for pointer
    pub fn invalid_shape(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidShape {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Host-side failure (persistence, settings, enumeration)
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    /// Document update rejected
    #[error("persistence rejected: {0}")]
    Persistence(String),

    /// Settings read or write failed
    #[error("settings error for '{key}': {message}")]
    Settings {
        /// Fully qualified setting key
        key: String,
        /// Host message
        message: String,
    },

    /// Referenced document does not exist
    #[error("document not found: {0}")]
    NotFound(String),
}

/// Registry construction failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    /// Two steps claim the same version
    #[error("duplicate migration version {version}: '{first}' and '{second}'")]
    DuplicateVersion {
        /// Conflicting version
        version: SchemaVersion,
        /// Step already registered
        first: &'static str,
        /// Step being registered
        second: &'static str,
    },
}

/// Configuration could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid TOML
    #[error("invalid TOML: {0}")]
    InvalidToml(#[from] toml::de::Error),

    /// Invalid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Parsed but semantically invalid
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Run-level migration error
///
/// Any of these stops the run before the schema version is advanced, so the
/// whole run is retried on the next ready event.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Host call failed outside per-document isolation
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// Registry could not be built
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Stored setting holds an unusable value
    #[error("setting '{key}' holds an invalid value: {value}")]
    InvalidSetting {
        /// Fully qualified setting key
        key: String,
        /// Offending value
        value: serde_json::Value,
    },
}

impl MigrationError {
    /// Whether the failure came from the host
    #[inline]
    #[must_use]
    pub fn is_host_error(&self) -> bool {
        matches!(self, Self::Host(_))
    }
}
