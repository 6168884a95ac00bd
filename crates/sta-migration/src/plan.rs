//! Phase planning and run states
//!
//! A phase is a maximal run of consecutive steps with no flush boundary
//! inside it. A step with `requires_flush` is the last member of its phase.

use crate::step::{self, StepRef};
use serde::Serialize;
use sta_document::SchemaVersion;

/// Steps applied and persisted together
#[derive(Debug, Clone)]
pub struct MigrationPhase {
    steps: Vec<StepRef>,
}

impl MigrationPhase {
    /// Steps in application order
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[StepRef] {
        &self.steps
    }

    /// Step versions in application order
    #[inline]
    #[must_use]
    pub fn versions(&self) -> Vec<SchemaVersion> {
        step::versions(&self.steps)
    }

    /// Version stamped on documents after this phase
    #[must_use]
    pub fn last_version(&self) -> Option<SchemaVersion> {
        self.steps.last().map(|step| step.version())
    }

    /// Whether any step transforms tokens
    #[must_use]
    pub fn updates_tokens(&self) -> bool {
        self.steps.iter().any(|step| step.updates_tokens())
    }

    /// Number of steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the phase has no steps
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Split ordered steps into phases at every flush boundary
///
/// Empty phases are never produced.
#[must_use]
pub fn plan_phases(steps: impl IntoIterator<Item = StepRef>) -> Vec<MigrationPhase> {
    let mut phases = Vec::new();
    let mut current = Vec::new();

    for step in steps {
        let flush = step.requires_flush();
        current.push(step);
        if flush {
            phases.push(MigrationPhase {
                steps: std::mem::take(&mut current),
            });
        }
    }
    if !current.is_empty() {
        phases.push(MigrationPhase { steps: current });
    }

    phases
}

/// Runner lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// No run in progress
    Idle,
    /// Reading the stored version and computing phases
    Planning,
    /// Executing phase `index` of `total`
    Phase {
        /// Zero-based phase index
        index: usize,
        /// Number of planned phases
        total: usize,
    },
    /// Advancing the stored schema version
    Finalizing,
    /// Run completed
    Done,
}

impl RunState {
    /// Whether `next` is a legal successor of `self`
    ///
    /// Any state may fall back to `Idle` when a run aborts.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (_, Self::Idle) => true,
            (Self::Idle | Self::Done, Self::Planning) => true,
            (Self::Planning, Self::Phase { index: 0, .. }) => true,
            (Self::Planning, Self::Finalizing) => true,
            (
                Self::Phase { index, total },
                Self::Phase {
                    index: next_index,
                    total: next_total,
                },
            ) => total == next_total && next_index == index + 1,
            (Self::Phase { index, total }, Self::Finalizing) => index + 1 == total,
            (Self::Finalizing, Self::Done) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Planning => write!(f, "planning"),
            Self::Phase { index, total } => write!(f, "phase {}/{}", index + 1, total),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Done => write!(f, "done"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::MigrationStep;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Marker {
        version: f64,
        flush: bool,
    }

    #[async_trait]
    impl MigrationStep for Marker {
        fn version(&self) -> SchemaVersion {
            SchemaVersion::new(self.version)
        }

        fn name(&self) -> &'static str {
            "marker"
        }

        fn requires_flush(&self) -> bool {
            self.flush
        }
    }

    fn step(version: f64, flush: bool) -> StepRef {
        Arc::new(Marker { version, flush })
    }

    fn v(value: f64) -> SchemaVersion {
        SchemaVersion::new(value)
    }

    #[test]
    fn flush_step_closes_its_phase() {
        let phases = plan_phases(vec![step(1.0, false), step(2.0, true), step(3.0, false)]);
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].versions(), vec![v(1.0), v(2.0)]);
        assert_eq!(phases[1].versions(), vec![v(3.0)]);
        assert_eq!(phases[0].last_version(), Some(v(2.0)));
    }

    #[test]
    fn trailing_flush_leaves_no_empty_phase() {
        let phases = plan_phases(vec![step(1.0, false), step(2.0, true)]);
        assert_eq!(phases.len(), 1);
    }

    #[test]
    fn no_steps_no_phases() {
        assert!(plan_phases(Vec::new()).is_empty());
    }

    #[test]
    fn consecutive_flushes_give_singleton_phases() {
        let phases = plan_phases(vec![step(1.0, true), step(2.0, true), step(3.0, true)]);
        assert_eq!(phases.len(), 3);
        assert!(phases.iter().all(|p| p.len() == 1));
    }

    #[test]
    fn run_state_transitions() {
        assert!(RunState::Idle.can_transition_to(RunState::Planning));
        assert!(RunState::Planning.can_transition_to(RunState::Phase { index: 0, total: 2 }));
        let first = RunState::Phase { index: 0, total: 2 };
        assert!(first.can_transition_to(RunState::Phase { index: 1, total: 2 }));
        assert!(RunState::Phase { index: 1, total: 2 }.can_transition_to(RunState::Finalizing));
        assert!(RunState::Planning.can_transition_to(RunState::Finalizing));
        assert!(RunState::Finalizing.can_transition_to(RunState::Done));
        assert!(RunState::Phase { index: 0, total: 2 }.can_transition_to(RunState::Idle));

        assert!(!RunState::Idle.can_transition_to(RunState::Finalizing));
        assert!(!RunState::Phase { index: 0, total: 2 }.can_transition_to(RunState::Finalizing));
        let first = RunState::Phase { index: 0, total: 3 };
        assert!(!first.can_transition_to(RunState::Phase { index: 2, total: 3 }));
        assert!(!RunState::Done.can_transition_to(RunState::Finalizing));
    }

    #[test]
    fn run_state_display() {
        assert_eq!(RunState::Phase { index: 0, total: 3 }.to_string(), "phase 1/3");
    }

    proptest! {
        #[test]
        fn prop_phases_preserve_order_and_cut_after_flush(
            flags in proptest::collection::vec(any::<bool>(), 0..40)
        ) {
            let steps: Vec<StepRef> = flags
                .iter()
                .enumerate()
                .map(|(i, flush)| step(i as f64 + 1.0, *flush))
                .collect();
            let phases = plan_phases(steps.clone());

            let flattened: Vec<SchemaVersion> =
                phases.iter().flat_map(MigrationPhase::versions).collect();
            prop_assert_eq!(flattened, step::versions(&steps));
            prop_assert!(phases.iter().all(|p| !p.is_empty()));
            for phase in &phases {
                let (_, rest) = phase.steps().split_last().unwrap();
                prop_assert!(rest.iter().all(|s| !s.requires_flush()));
            }
            let expected = flags.iter().filter(|f| **f).count()
                + usize::from(flags.last().is_some_and(|f| !f));
            prop_assert_eq!(phases.len(), expected);
        }
    }
}
