//! Migration step contract
//!
//! A step is any value implementing [`MigrationStep`]: a unique version, an
//! optional flush boundary and two in-place transforms. Transforms must be
//! safe to re-run on already migrated data: check the `type` discriminator
//! and the presence of the legacy field first, and return `Ok(())` untouched
//! when either does not apply.

use crate::error::StepError;
use crate::host::{ActorDocument, SceneDocument};
use async_trait::async_trait;
use sta_document::{DocumentSnapshot, SchemaVersion};
use std::fmt;
use std::sync::Arc;

/// One versioned, idempotent data transformation
#[async_trait]
pub trait MigrationStep: Send + Sync + fmt::Debug {
    /// Unique version; defines application order
    fn version(&self) -> SchemaVersion;

    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Persist everything before any later step runs
    ///
    /// Required when the step creates sub-entities (e.g. appends an item)
    /// that later steps must observe as persisted.
    fn requires_flush(&self) -> bool {
        false
    }

    /// Whether [`update_token`](Self::update_token) does anything
    fn updates_tokens(&self) -> bool {
        false
    }

    /// Transform an actor snapshot in place
    async fn update_actor(&self, source: &mut DocumentSnapshot) -> Result<(), StepError> {
        let _ = source;
        Ok(())
    }

    /// Transform a token snapshot in place
    ///
    /// `actor` and `scene` are read-only context.
    async fn update_token(
        &self,
        token: &mut DocumentSnapshot,
        actor: &ActorDocument,
        scene: &SceneDocument,
    ) -> Result<(), StepError> {
        let _ = (token, actor, scene);
        Ok(())
    }
}

/// Shared handle to a step
pub type StepRef = Arc<dyn MigrationStep>;

/// Versions of a step list, in order
#[must_use]
pub fn versions(steps: &[StepRef]) -> Vec<SchemaVersion> {
    steps.iter().map(|step| step.version()).collect()
}
