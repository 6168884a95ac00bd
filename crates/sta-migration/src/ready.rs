//! World-ready orchestration
//!
//! Runs once the host has loaded the world:
//!
//! 1. A game master session records the initial world versions if the world
//!    has never stored them.
//! 2. Only the elected leader session continues.
//! 3. Pending migrations run, followed by a summary.
//! 4. The stored module version is advanced to the running one.

use crate::config::MigrationConfig;
use crate::error::MigrationError;
use crate::host::{Environment, Notice};
use crate::registry::MigrationRegistry;
use crate::report::RunReport;
use crate::runner::{read_schema_version, MigrationRunner};
use crate::summary::{MigrationSummary, SummaryReport};
use serde_json::Value;
use sta_document::SchemaVersion;
use std::cmp::Ordering;

/// Legacy per-actor schema version flag
pub const LEGACY_SCHEMA_FLAG: &str = "schemaVersion";

/// What the ready hook did
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyOutcome {
    /// Another session leads; nothing was run
    NotLeader,
    /// No migration was needed
    UpToDate,
    /// A migration ran
    Migrated {
        /// Run outcome
        run: RunReport,
        /// Post-run summary
        summary: SummaryReport,
    },
}

/// Ready-hook entry point
#[derive(Debug, Clone)]
pub struct ReadyHook {
    env: Environment,
    config: MigrationConfig,
    registry: MigrationRegistry,
}

impl ReadyHook {
    /// Create hook
    #[must_use]
    pub fn new(env: Environment, config: MigrationConfig, registry: MigrationRegistry) -> Self {
        Self {
            env,
            config,
            registry,
        }
    }

    /// Hook using the built-in registry
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or built-in steps collide
    pub fn with_builtin_steps(
        env: Environment,
        config: MigrationConfig,
    ) -> Result<Self, MigrationError> {
        config.validate()?;
        let registry = MigrationRegistry::builtin(&config)?;
        Ok(Self::new(env, config, registry))
    }

    /// Registered steps
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Handle the world becoming ready
    ///
    /// # Errors
    /// Returns error on host failures outside per-document isolation
    #[tracing::instrument(skip(self))]
    pub async fn on_ready(&self) -> Result<ReadyOutcome, MigrationError> {
        self.store_initial_world_versions().await?;

        if !self.env.session.is_leader() {
            tracing::debug!("Not the leader session, skipping migrations");
            return Ok(ReadyOutcome::NotLeader);
        }

        let current = read_schema_version(&self.env, &self.config).await?;
        let runner = MigrationRunner::from_registry(
            self.env.clone(),
            self.config.clone(),
            &self.registry,
            current,
        );

        let outcome = if runner.needs_migration().await? {
            let too_old = current
                .filter(|v| !v.is_zero() && *v < self.config.minimum_safe_version);
            if let Some(current) = too_old {
                tracing::warn!(
                    "World schema version {} is below the minimum safe version {}",
                    current,
                    self.config.minimum_safe_version
                );
                self.env.notifier.notify(Notice::DataTooOld {
                    current: current.value(),
                });
            }

            let run = runner.run_migration().await?;
            let summary = MigrationSummary::new(self.env.clone(), self.config.clone())
                .report_status(self.registry.latest())
                .await?;
            ReadyOutcome::Migrated { run, summary }
        } else {
            tracing::info!("World schema is up to date");
            ReadyOutcome::UpToDate
        };

        self.update_module_version().await?;
        Ok(outcome)
    }

    /// Record module and schema versions the first time a world is opened
    ///
    /// Game master sessions only. The initial schema version is the lowest
    /// legacy per-actor version, raised to the recommended safe version.
    ///
    /// # Errors
    /// Returns error if settings or actors cannot be accessed
    pub async fn store_initial_world_versions(&self) -> Result<(), MigrationError> {
        if !self.env.session.is_game_master() {
            return Ok(());
        }

        let ns = &self.config.namespace;
        let settings = &self.env.settings;

        if !settings.is_stored(ns, &self.config.module_version_key).await? {
            let version = self.env.host_info.module_version.clone();
            tracing::info!("Storing initial module version {}", version);
            settings
                .set(ns, &self.config.module_version_key, Value::String(version))
                .await?;
        }

        if settings.is_stored(ns, &self.config.schema_version_key).await? {
            return Ok(());
        }

        let floor = self.config.recommended_safe_version;
        let actors = self.env.actors.actors().await?;
        let initial = if actors.is_empty() {
            read_schema_version(&self.env, &self.config)
                .await?
                .unwrap_or(floor)
        } else {
            actors
                .iter()
                .map(|actor| {
                    actor
                        .source
                        .namespace_flags(ns)
                        .and_then(|flags| flags.get(LEGACY_SCHEMA_FLAG))
                        .and_then(SchemaVersion::from_value)
                        .unwrap_or(floor)
                })
                .min()
                .unwrap_or(floor)
                .max(floor)
        };

        tracing::info!("Storing initial world schema version {}", initial);
        settings
            .set(ns, &self.config.schema_version_key, initial.to_value())
            .await?;
        Ok(())
    }

    async fn update_module_version(&self) -> Result<(), MigrationError> {
        let key = &self.config.module_version_key;
        let previous = self.env.settings.get(&self.config.namespace, key).await?;
        let previous = previous.as_ref().map(value_as_version_string);
        let running = &self.env.host_info.module_version;

        let newer = previous
            .as_deref()
            .map_or(true, |previous| is_newer_version(running, previous));
        if newer {
            tracing::info!(
                "Updating module version {} -> {}",
                previous.as_deref().unwrap_or("none"),
                running
            );
            self.env
                .settings
                .set(&self.config.namespace, key, Value::String(running.clone()))
                .await?;
        }
        Ok(())
    }
}

fn value_as_version_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Whether dotted version `candidate` is newer than `baseline`
///
/// Components are compared left to right, numerically when both parse as
/// numbers and lexically otherwise. A candidate with more components than
/// an otherwise equal baseline is newer.
#[must_use]
pub fn is_newer_version(candidate: &str, baseline: &str) -> bool {
    let mut baseline_parts = baseline.split('.');

    for part in candidate.split('.') {
        let Some(base) = baseline_parts.next() else {
            return true;
        };

        let ordering = match (part.parse::<f64>(), base.parse::<f64>()) {
            (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => part.cmp(base),
        };
        match ordering {
            Ordering::Equal => {}
            Ordering::Greater => return true,
            Ordering::Less => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_by_component() {
        assert!(is_newer_version("1.2.0", "1.1.9"));
        assert!(is_newer_version("1.10.0", "1.9.0"));
        assert!(is_newer_version("2", "1.9.9"));
        assert!(!is_newer_version("1.1.9", "1.2.0"));
    }

    #[test]
    fn equal_is_not_newer() {
        assert!(!is_newer_version("1.2.3", "1.2.3"));
        assert!(!is_newer_version("1.2", "1.2.0"));
    }

    #[test]
    fn extra_components_are_newer() {
        assert!(is_newer_version("1.2.0", "1.2"));
    }

    #[test]
    fn non_numeric_components_compare_lexically() {
        assert!(is_newer_version("1.2.b", "1.2.a"));
        assert!(!is_newer_version("1.2.alpha", "1.2.beta"));
    }
}
