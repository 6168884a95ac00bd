//! Migration configuration
//!
//! Defaults match the module's registered settings: namespace
//! `sta-enhanced`, world settings `worldSchemaVersion` and
//! `worldModuleVersion`, and bulk updates of 100 documents.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use sta_document::SchemaVersion;
use tracing_subscriber::EnvFilter;

/// Default module namespace
pub const DEFAULT_NAMESPACE: &str = "sta-enhanced";

/// Default bulk-update batch size
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Migration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Flag/settings namespace owned by the module
    pub namespace: String,
    /// World setting holding the schema version
    pub schema_version_key: String,
    /// World setting holding the last module version
    pub module_version_key: String,
    /// Documents per bulk update
    pub batch_size: usize,
    /// Worlds below this version get a "data too old" warning
    pub minimum_safe_version: SchemaVersion,
    /// Floor used when no schema version is stored
    pub recommended_safe_version: SchemaVersion,
    /// Actor type counted by the migration summary
    pub summary_document_type: String,
    /// Default tracing filter directive
    pub log_filter: String,
}

impl MigrationConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With namespace
    #[inline]
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// With batch size
    #[inline]
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// With minimum safe version
    #[inline]
    #[must_use]
    pub fn with_minimum_safe_version(mut self, version: SchemaVersion) -> Self {
        self.minimum_safe_version = version;
        self
    }

    /// With recommended safe version
    #[inline]
    #[must_use]
    pub fn with_recommended_safe_version(mut self, version: SchemaVersion) -> Self {
        self.recommended_safe_version = version;
        self
    }

    /// With summary document type
    #[inline]
    #[must_use]
    pub fn with_summary_document_type(mut self, kind: impl Into<String>) -> Self {
        self.summary_document_type = kind.into();
        self
    }

    /// With tracing filter directive
    #[inline]
    #[must_use]
    pub fn with_log_filter(mut self, directive: impl Into<String>) -> Self {
        self.log_filter = directive.into();
        self
    }

    /// Parse from TOML
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns error if the TOML is malformed or fails validation
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from JSON
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or fails validation
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Check semantic constraints
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` for an empty namespace or setting key,
    /// a zero batch size, a recommended floor below the minimum, or a
    /// malformed `log_filter`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".to_string()));
        }
        if self.schema_version_key.is_empty() || self.module_version_key.is_empty() {
            return Err(ConfigError::Invalid("setting keys must not be empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".to_string()));
        }
        if self.recommended_safe_version < self.minimum_safe_version {
            return Err(ConfigError::Invalid(format!(
                "recommended_safe_version {} is below minimum_safe_version {}",
                self.recommended_safe_version, self.minimum_safe_version
            )));
        }
        if let Err(err) = EnvFilter::try_new(&self.log_filter) {
            return Err(ConfigError::Invalid(format!(
                "log_filter '{}' is not a valid directive: {err}",
                self.log_filter
            )));
        }
        Ok(())
    }

    /// Fully qualified schema version setting key
    #[must_use]
    pub fn qualified_schema_key(&self) -> String {
        format!("{}.{}", self.namespace, self.schema_version_key)
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            schema_version_key: "worldSchemaVersion".to_string(),
            module_version_key: "worldModuleVersion".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            minimum_safe_version: SchemaVersion::ZERO,
            recommended_safe_version: SchemaVersion::ZERO,
            summary_document_type: "character".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_module_settings() {
        let config = MigrationConfig::new();
        assert_eq!(config.namespace, "sta-enhanced");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.qualified_schema_key(), "sta-enhanced.worldSchemaVersion");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_overrides_only_given_fields() {
        let config = MigrationConfig::from_toml_str(
            r#"
            batch_size = 25
            summary_document_type = "npc"
            "#,
        )
        .unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.summary_document_type, "npc");
        assert_eq!(config.namespace, "sta-enhanced");
    }

    #[test]
    fn json_versions_parse_as_numbers() {
        let config = MigrationConfig::from_json_str(
            r#"{"minimum_safe_version": 0.1, "recommended_safe_version": 0.2}"#,
        )
        .unwrap();
        assert_eq!(config.minimum_safe_version, SchemaVersion::new(0.1));
        assert_eq!(config.recommended_safe_version, SchemaVersion::new(0.2));
    }

    #[test]
    fn zero_batch_size_rejected() {
        let err = MigrationConfig::from_toml_str("batch_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn floor_below_minimum_rejected() {
        let config = MigrationConfig::new()
            .with_minimum_safe_version(SchemaVersion::new(0.2))
            .with_recommended_safe_version(SchemaVersion::new(0.1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn log_filter_is_loaded_and_checked() {
        let config =
            MigrationConfig::from_toml_str(r#"log_filter = "sta_migration=debug""#).unwrap();
        assert_eq!(config.log_filter, "sta_migration=debug");

        let err = MigrationConfig::from_toml_str(r#"log_filter = "sta_migration=loudest""#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("log_filter")));
    }

    #[test]
    fn malformed_toml_rejected() {
        assert!(matches!(
            MigrationConfig::from_toml_str("batch_size = ["),
            Err(ConfigError::InvalidToml(_))
        ));
    }
}
