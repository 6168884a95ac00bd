//! Post-run migration summary
//!
//! Counts how many world actors of the summarized type carry a provenance
//! stamp at the target version. Read-only apart from the notice it sends.

use crate::config::MigrationConfig;
use crate::error::MigrationError;
use crate::host::{Environment, Notice};
use serde::Serialize;
use sta_document::{DocumentSnapshot, SchemaVersion};

/// A document not at the target version
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmigratedDocument {
    /// Document id
    pub id: String,
    /// Display name
    pub name: String,
    /// Stamped version, if any
    pub stamped: Option<SchemaVersion>,
}

/// Result of [`MigrationSummary::report_status`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    /// Version counted as migrated
    pub target: SchemaVersion,
    /// Documents stamped at `target`
    pub migrated: usize,
    /// Documents inspected
    pub total: usize,
    /// Documents not stamped at `target`
    pub unmigrated: Vec<UnmigratedDocument>,
}

impl SummaryReport {
    /// Whether every inspected document is at the target version
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.migrated == self.total
    }
}

/// Summarizes migration status across world actors
#[derive(Debug, Clone)]
pub struct MigrationSummary {
    env: Environment,
    config: MigrationConfig,
}

impl MigrationSummary {
    /// Create summary over `env`
    #[must_use]
    pub fn new(env: Environment, config: MigrationConfig) -> Self {
        Self { env, config }
    }

    /// Count documents at `target` and notify the user
    ///
    /// Mismatching documents are logged by id and name.
    ///
    /// # Errors
    /// Returns error if actors cannot be enumerated
    pub async fn report_status(
        &self,
        target: SchemaVersion,
    ) -> Result<SummaryReport, MigrationError> {
        let actors = self.env.actors.actors().await?;
        let mut migrated = 0;
        let mut unmigrated = Vec::new();

        let counted = actors
            .iter()
            .filter(|actor| actor.source.is_type(&self.config.summary_document_type));
        for actor in counted {
            let stamped = self.actor_schema_version(&actor.source);
            if stamped == Some(target) {
                migrated += 1;
            } else {
                unmigrated.push(UnmigratedDocument {
                    id: actor.source.id().unwrap_or_default().to_string(),
                    name: actor.source.name().unwrap_or_default().to_string(),
                    stamped,
                });
            }
        }

        let total = migrated + unmigrated.len();
        self.env
            .notifier
            .notify(Notice::MigrationSummary { migrated, total });

        if unmigrated.is_empty() {
            tracing::info!(
                "All {} {} documents are at version {}",
                total,
                self.config.summary_document_type,
                target
            );
        } else {
            tracing::warn!(
                "{} of {} {} documents are not at version {}",
                unmigrated.len(),
                total,
                self.config.summary_document_type,
                target
            );
            for doc in &unmigrated {
                tracing::warn!(
                    id = %doc.id,
                    name = %doc.name,
                    stamped = ?doc.stamped,
                    "Not migrated"
                );
            }
        }

        Ok(SummaryReport {
            target,
            migrated,
            total,
            unmigrated,
        })
    }

    /// Provenance version stamped on `source`
    #[inline]
    #[must_use]
    pub fn actor_schema_version(&self, source: &DocumentSnapshot) -> Option<SchemaVersion> {
        source.stamped_version(&self.config.namespace)
    }
}
