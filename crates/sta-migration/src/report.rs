//! Run reports
//!
//! What a migration run did, phase by phase. Document failures never abort
//! a run, so they are recorded here instead of being returned as errors.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sta_document::SchemaVersion;

/// Outcome of one phase
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseReport {
    /// Step versions applied in this phase
    pub versions: Vec<SchemaVersion>,
    /// World actors persisted with the phase applied
    pub actors_migrated: usize,
    /// World actors whose transform failed (uuids)
    pub actors_failed: Vec<String>,
    /// World actors dropped because their batch was rejected
    pub actors_rejected: usize,
    /// Bulk updates issued
    pub batches_submitted: usize,
    /// Bulk updates rejected by the host
    pub batches_rejected: usize,
    /// Tokens with a persisted diff
    pub tokens_updated: usize,
    /// Tokens whose transform or update failed (scene/token ids)
    pub tokens_failed: Vec<String>,
    /// Synthetic actors with a persisted diff
    pub synthetic_actors_updated: usize,
    /// Synthetic actors whose transform or update failed (uuids)
    pub synthetic_actors_failed: Vec<String>,
}

impl PhaseReport {
    /// Empty report for a phase applying `versions`
    #[must_use]
    pub fn new(versions: Vec<SchemaVersion>) -> Self {
        Self {
            versions,
            ..Self::default()
        }
    }

    /// Number of documents that did not make it through this phase
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.actors_failed.len()
            + self.actors_rejected
            + self.tokens_failed.len()
            + self.synthetic_actors_failed.len()
    }
}

/// Outcome of a full run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Stored version before the run
    pub from_version: Option<SchemaVersion>,
    /// Stored version after finalizing
    pub to_version: SchemaVersion,
    /// Per-phase outcomes, in order
    pub phases: Vec<PhaseReport>,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Whether every document made it through every phase
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.phases.iter().all(|phase| phase.failure_count() == 0)
    }

    /// Total world actor persists across phases
    #[must_use]
    pub fn actors_migrated(&self) -> usize {
        self.phases.iter().map(|phase| phase.actors_migrated).sum()
    }

    /// Every failed document reference, phase by phase
    pub fn failed_documents(&self) -> impl Iterator<Item = &str> {
        self.phases.iter().flat_map(|phase| {
            phase
                .actors_failed
                .iter()
                .chain(&phase.tokens_failed)
                .chain(&phase.synthetic_actors_failed)
                .map(String::as_str)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_aggregated() {
        let mut phase = PhaseReport::new(vec![SchemaVersion::new(0.1)]);
        phase.actors_failed.push("Actor.a".to_string());
        phase.tokens_failed.push("s/t".to_string());
        phase.actors_rejected = 2;

        let report = RunReport {
            from_version: None,
            to_version: SchemaVersion::new(0.1),
            phases: vec![phase, PhaseReport::default()],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        assert!(!report.is_clean());
        assert_eq!(report.phases[0].failure_count(), 4);
        assert_eq!(report.failed_documents().collect::<Vec<_>>(), vec!["Actor.a", "s/t"]);
    }
}
