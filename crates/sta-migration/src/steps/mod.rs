//! Built-in migration steps
//!
//! Every step the module ships, in no particular order; the registry sorts
//! them. Add new steps here with a version above the current latest.

mod move_to_backstory;

pub use move_to_backstory::MoveBiographyToBackstory;

use crate::config::MigrationConfig;
use crate::step::StepRef;
use std::sync::Arc;

/// All known steps
#[must_use]
pub fn builtin_steps(config: &MigrationConfig) -> Vec<StepRef> {
    vec![Arc::new(MoveBiographyToBackstory::new(&config.namespace))]
}
