//! Migration registry
//!
//! Provides [`MigrationRegistry`], the ordered list of every known step and
//! the only place that decides which steps a world still needs.

use crate::config::MigrationConfig;
use crate::error::RegistryError;
use crate::step::{self, StepRef};
use crate::steps::builtin_steps;
use sta_document::SchemaVersion;

/// Ordered set of known migration steps
///
/// Versions are unique and kept in ascending order.
#[derive(Debug, Clone)]
pub struct MigrationRegistry {
    steps: Vec<StepRef>,
    recommended_safe_version: SchemaVersion,
}

impl MigrationRegistry {
    /// Create from a list of steps
    ///
    /// # Errors
    /// Returns `RegistryError::DuplicateVersion` if two steps share a version
    pub fn new(
        steps: impl IntoIterator<Item = StepRef>,
        recommended_safe_version: SchemaVersion,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self {
            steps: Vec::new(),
            recommended_safe_version,
        };
        for step in steps {
            registry.register(step)?;
        }
        Ok(registry)
    }

    /// Registry holding every step shipped with the module
    ///
    /// # Errors
    /// Returns `RegistryError::DuplicateVersion` if built-in steps collide
    pub fn builtin(config: &MigrationConfig) -> Result<Self, RegistryError> {
        Self::new(builtin_steps(config), config.recommended_safe_version)
    }

    /// Insert a step at its version position
    ///
    /// # Errors
    /// Returns `RegistryError::DuplicateVersion` if the version is taken
    pub fn register(&mut self, step: StepRef) -> Result<(), RegistryError> {
        let version = step.version();
        match self.steps.binary_search_by(|s| s.version().cmp(&version)) {
            Ok(index) => Err(RegistryError::DuplicateVersion {
                version,
                first: self.steps[index].name(),
                second: step.name(),
            }),
            Err(index) => {
                self.steps.insert(index, step);
                Ok(())
            }
        }
    }

    /// Steps newer than `version`, ascending
    ///
    /// A missing or zero version falls back to the recommended safe version.
    #[must_use]
    pub fn steps_after(&self, version: Option<SchemaVersion>) -> Vec<StepRef> {
        let floor = self.floor(version);
        self.steps
            .iter()
            .filter(|step| step.version() > floor)
            .cloned()
            .collect()
    }

    /// Effective starting version for `version`
    #[inline]
    #[must_use]
    pub fn floor(&self, version: Option<SchemaVersion>) -> SchemaVersion {
        version
            .filter(|v| !v.is_zero())
            .unwrap_or(self.recommended_safe_version)
    }

    /// Highest known version
    #[must_use]
    pub fn latest(&self) -> SchemaVersion {
        self.steps
            .last()
            .map_or(self.recommended_safe_version, |step| step.version())
    }

    /// Versions of all registered steps
    #[inline]
    #[must_use]
    pub fn versions(&self) -> Vec<SchemaVersion> {
        step::versions(&self.steps)
    }

    /// Iterate over steps in version order
    pub fn iter(&self) -> impl Iterator<Item = &StepRef> {
        self.steps.iter()
    }

    /// Number of registered steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no steps are registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
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
    struct Noop(f64);

    #[async_trait]
    impl MigrationStep for Noop {
        fn version(&self) -> SchemaVersion {
            SchemaVersion::new(self.0)
        }

        fn name(&self) -> &'static str {
            "noop"
        }
    }

    fn steps(versions: &[f64]) -> Vec<StepRef> {
        versions.iter().map(|v| Arc::new(Noop(*v)) as StepRef).collect()
    }

    fn v(value: f64) -> SchemaVersion {
        SchemaVersion::new(value)
    }

    #[test]
    fn registry_sorts_on_insert() {
        let registry =
            MigrationRegistry::new(steps(&[0.3, 0.1, 0.2]), SchemaVersion::ZERO).unwrap();
        assert_eq!(registry.versions(), vec![v(0.1), v(0.2), v(0.3)]);
        assert_eq!(registry.latest(), v(0.3));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn steps_after_excludes_current_version() {
        let registry = MigrationRegistry::new(steps(&[0.1, 0.2]), SchemaVersion::ZERO).unwrap();
        assert_eq!(step::versions(&registry.steps_after(Some(v(0.1)))), vec![v(0.2)]);
    }

    #[test]
    fn steps_after_none_uses_recommended_floor() {
        let registry = MigrationRegistry::new(steps(&[0.1, 0.2, 0.3]), v(0.1)).unwrap();
        assert_eq!(step::versions(&registry.steps_after(None)), vec![v(0.2), v(0.3)]);
        assert_eq!(
            step::versions(&registry.steps_after(Some(SchemaVersion::ZERO))),
            vec![v(0.2), v(0.3)]
        );
    }

    #[test]
    fn steps_after_latest_is_empty() {
        let registry = MigrationRegistry::new(steps(&[0.1, 0.2]), SchemaVersion::ZERO).unwrap();
        assert!(registry.steps_after(Some(v(0.2))).is_empty());
    }

    #[test]
    fn duplicate_versions_rejected() {
        let err = MigrationRegistry::new(steps(&[0.1, 0.2, 0.1]), SchemaVersion::ZERO).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::DuplicateVersion { version, .. } if version == v(0.1)
        ));
    }

    #[test]
    fn empty_registry_latest_is_floor() {
        let registry = MigrationRegistry::new(Vec::new(), v(0.05)).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.latest(), v(0.05));
    }

    #[test]
    fn builtin_registry_contains_backstory_step() {
        let registry = MigrationRegistry::builtin(&MigrationConfig::default()).unwrap();
        assert_eq!(registry.versions(), vec![v(0.1)]);
        assert_eq!(registry.latest(), v(0.1));
    }

    proptest! {
        #[test]
        fn prop_steps_after_sorted_and_strictly_greater(
            raw in proptest::collection::hash_set(1u32..500, 0..30),
            floor in 0u32..500,
        ) {
            let versions: Vec<f64> = raw.iter().map(|n| f64::from(*n) / 100.0).collect();
            let registry = MigrationRegistry::new(steps(&versions), SchemaVersion::ZERO).unwrap();
            let floor = v(f64::from(floor) / 100.0);
            let after = step::versions(&registry.steps_after(Some(floor)));

            prop_assert!(after.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(after.iter().all(|version| *version > floor));
            let expected = versions.iter().filter(|x| v(**x) > floor).count();
            prop_assert_eq!(after.len(), expected);
        }
    }
}
