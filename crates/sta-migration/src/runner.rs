//! Migration runner
//!
//! Applies planned phases to every world actor and every token-attached
//! actor, persists in batches, and advances the stored schema version once
//! all phases have been issued.
//!
//! # Failure isolation
//!
//! - A step failing on one document skips that document for the phase
//! - A rejected bulk update drops that batch only
//! - A failing token update skips that token only
//!
//! None of these stop the run. Documents skipped in one phase are attempted
//! again by the next phase from their last persisted state, and by the next
//! run if the schema version was never advanced.

use crate::config::MigrationConfig;
use crate::error::{MigrationError, StepError};
use crate::host::{
    ActorDocument, Environment, Notice, SceneDocument, TokenDocument, UpdateOptions,
};
use crate::plan::{plan_phases, MigrationPhase, RunState};
use crate::registry::MigrationRegistry;
use crate::report::{PhaseReport, RunReport};
use crate::step::StepRef;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use sta_document::{DocumentSnapshot, RuntimeVersions, SchemaVersion};

/// Orchestrates one migration run
#[derive(Debug)]
pub struct MigrationRunner {
    env: Environment,
    config: MigrationConfig,
    steps: Vec<StepRef>,
    latest: SchemaVersion,
    options: UpdateOptions,
    state: Mutex<RunState>,
}

impl MigrationRunner {
    /// Create a runner for `steps`, finalizing at `latest`
    ///
    /// Steps are sorted by version.
    #[must_use]
    pub fn new(
        env: Environment,
        config: MigrationConfig,
        mut steps: Vec<StepRef>,
        latest: SchemaVersion,
    ) -> Self {
        steps.sort_by_key(|step| step.version());
        Self {
            env,
            config,
            steps,
            latest,
            options: UpdateOptions::default(),
            state: Mutex::new(RunState::Idle),
        }
    }

    /// Create a runner for the registry steps newer than `current`
    #[must_use]
    pub fn from_registry(
        env: Environment,
        config: MigrationConfig,
        registry: &MigrationRegistry,
        current: Option<SchemaVersion>,
    ) -> Self {
        Self::new(env, config, registry.steps_after(current), registry.latest())
    }

    /// With update options forwarded to the host
    #[inline]
    #[must_use]
    pub fn with_update_options(mut self, options: UpdateOptions) -> Self {
        self.options = options;
        self
    }

    /// Steps this runner may apply
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[StepRef] {
        &self.steps
    }

    /// Version written when the run finalizes
    #[inline]
    #[must_use]
    pub fn latest_version(&self) -> SchemaVersion {
        self.latest
    }

    /// Current lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Stored world schema version
    ///
    /// # Errors
    /// - `MigrationError::Host` if the setting cannot be read
    /// - `MigrationError::InvalidSetting` if it holds a non-numeric value
    pub async fn stored_version(&self) -> Result<Option<SchemaVersion>, MigrationError> {
        read_schema_version(&self.env, &self.config).await
    }

    /// Whether the stored version is behind the latest known version
    ///
    /// A world with no stored version is treated as being at the
    /// recommended safe version. A stored zero is compared as is.
    ///
    /// # Errors
    /// Returns error if the stored version cannot be read
    pub async fn needs_migration(&self) -> Result<bool, MigrationError> {
        let current = self
            .stored_version()
            .await?
            .unwrap_or(self.config.recommended_safe_version);
        Ok(current < self.latest)
    }

    /// Run every pending phase, then advance the stored version
    ///
    /// # Errors
    /// Returns error only for failures outside per-document isolation:
    /// reading the stored version, enumerating documents, or writing the
    /// new version. The stored version is left untouched in that case.
    #[tracing::instrument(skip(self), fields(latest = %self.latest))]
    pub async fn run_migration(&self) -> Result<RunReport, MigrationError> {
        let result = self.execute().await;
        if let Err(error) = &result {
            tracing::error!("Migration aborted before finalizing: {}", error);
            self.transition(RunState::Idle);
        }
        result
    }

    async fn execute(&self) -> Result<RunReport, MigrationError> {
        let started_at = Utc::now();
        self.transition(RunState::Planning);

        let current = self.stored_version().await?;
        self.env.notifier.notify(Notice::MigrationStarting {
            system_version: self.env.host_info.system_version.clone(),
        });

        let floor = self.floor(current);
        let pending = self
            .steps
            .iter()
            .filter(|step| step.version() > floor)
            .cloned();
        let phases = plan_phases(pending);
        tracing::info!(
            "Migrating from {} to {} in {} phase(s)",
            floor,
            self.latest,
            phases.len()
        );

        let mut reports = Vec::with_capacity(phases.len());
        for (index, phase) in phases.iter().enumerate() {
            self.transition(RunState::Phase {
                index,
                total: phases.len(),
            });
            reports.push(self.run_phase(phase).await?);
        }

        self.transition(RunState::Finalizing);
        let to_version = current.map_or(self.latest, |c| c.max(self.latest));
        self.env
            .settings
            .set(
                &self.config.namespace,
                &self.config.schema_version_key,
                to_version.to_value(),
            )
            .await?;
        self.transition(RunState::Done);
        tracing::info!("World schema version is now {}", to_version);

        Ok(RunReport {
            from_version: current,
            to_version,
            phases: reports,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Apply one phase to world actors, then to scene tokens
    async fn run_phase(&self, phase: &MigrationPhase) -> Result<PhaseReport, MigrationError> {
        let mut report = PhaseReport::new(phase.versions());
        tracing::info!("Running migration phase {:?}", report.versions);

        self.migrate_world_actors(phase.steps(), &mut report).await?;
        self.migrate_scene_tokens(phase, &mut report).await?;

        tracing::info!(
            migrated = report.actors_migrated,
            failed = report.failure_count(),
            "Phase complete"
        );
        Ok(report)
    }

    async fn migrate_world_actors(
        &self,
        steps: &[StepRef],
        report: &mut PhaseReport,
    ) -> Result<(), MigrationError> {
        let actors = self.env.actors.actors().await?;
        let batch_size = self.config.batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size.min(actors.len()));

        for actor in &actors {
            if batch.len() == batch_size {
                self.flush_batch(&mut batch, report).await;
            }

            match self.updated_actor(&actor.source, steps).await {
                Ok(updated) => batch.push(updated),
                Err(error) => {
                    tracing::error!("Error thrown while migrating {}: {}", actor.uuid, error);
                    report.actors_failed.push(actor.uuid.clone());
                }
            }
        }

        if !batch.is_empty() {
            self.flush_batch(&mut batch, report).await;
        }
        Ok(())
    }

    async fn flush_batch(&self, batch: &mut Vec<DocumentSnapshot>, report: &mut PhaseReport) {
        let updates = std::mem::take(batch);
        let count = updates.len();
        report.batches_submitted += 1;

        match self.env.actors.bulk_update(updates, &self.options).await {
            Ok(()) => {
                report.actors_migrated += count;
                tracing::debug!("Persisted batch of {} actors", count);
            }
            Err(error) => {
                report.batches_rejected += 1;
                report.actors_rejected += count;
                tracing::warn!("Bulk update of {} actors rejected: {}", count, error);
            }
        }
    }

    async fn migrate_scene_tokens(
        &self,
        phase: &MigrationPhase,
        report: &mut PhaseReport,
    ) -> Result<(), MigrationError> {
        let scenes = self.env.scenes.scenes().await?;
        let token_steps = phase.updates_tokens();

        for scene in &scenes {
            for token in &scene.tokens {
                let Some(actor) = &token.actor else {
                    continue;
                };

                let token_ok = !token_steps
                    || self
                        .migrate_scene_token(scene, token, actor, phase.steps(), report)
                        .await;
                if !token_ok || !actor.synthetic {
                    continue;
                }

                if token.has_migratable_delta(&self.config.namespace) {
                    self.migrate_synthetic_actor(scene, token, actor, phase.steps(), report)
                        .await;
                }
            }
        }
        Ok(())
    }

    /// Returns whether the token is now up to date
    async fn migrate_scene_token(
        &self,
        scene: &SceneDocument,
        token: &TokenDocument,
        actor: &ActorDocument,
        steps: &[StepRef],
        report: &mut PhaseReport,
    ) -> bool {
        let token_ref = format!("Scene.{}.Token.{}", scene.id, token.id);

        let updated = match self.updated_token(token, actor, scene, steps).await {
            Ok(updated) => updated,
            Err(error) => {
                tracing::error!("Error thrown while migrating {}: {}", token_ref, error);
                report.tokens_failed.push(token_ref);
                return false;
            }
        };

        let diff = token.source.diff(&updated);
        if diff.is_empty() {
            return true;
        }

        match self
            .env
            .scenes
            .update_token(&scene.id, &token.id, diff, &self.options)
            .await
        {
            Ok(()) => {
                report.tokens_updated += 1;
                true
            }
            Err(error) => {
                tracing::warn!("Update of {} rejected: {}", token_ref, error);
                report.tokens_failed.push(token_ref);
                false
            }
        }
    }

    async fn migrate_synthetic_actor(
        &self,
        scene: &SceneDocument,
        token: &TokenDocument,
        actor: &ActorDocument,
        steps: &[StepRef],
        report: &mut PhaseReport,
    ) {
        let updated = match self.updated_actor(&actor.source, steps).await {
            Ok(updated) => updated,
            Err(error) => {
                tracing::error!("Error thrown while migrating {}: {}", actor.uuid, error);
                report.synthetic_actors_failed.push(actor.uuid.clone());
                return;
            }
        };

        let diff = actor.source.diff(&updated);
        if diff.is_empty() {
            return;
        }

        match self
            .env
            .scenes
            .update_synthetic_actor(&scene.id, &token.id, diff, &self.options)
            .await
        {
            Ok(()) => report.synthetic_actors_updated += 1,
            Err(error) => {
                tracing::warn!("Update of {} rejected: {}", actor.uuid, error);
                report.synthetic_actors_failed.push(actor.uuid.clone());
            }
        }
    }

    /// Deep-clone `source`, apply every step's actor transform and stamp provenance
    ///
    /// # Errors
    /// Returns the first step error; the clone is discarded
    pub async fn updated_actor(
        &self,
        source: &DocumentSnapshot,
        steps: &[StepRef],
    ) -> Result<DocumentSnapshot, StepError> {
        let mut current = source.clone();
        for step in steps {
            step.update_actor(&mut current).await?;
        }

        if let Some(latest) = steps.last() {
            current.stamp_migration(
                &self.config.namespace,
                latest.version(),
                &self.runtime_versions(),
            );
        }
        Ok(current)
    }

    /// Deep-clone the token source and apply every step's token transform
    ///
    /// # Errors
    /// Returns the first step error; the clone is discarded
    pub async fn updated_token(
        &self,
        token: &TokenDocument,
        actor: &ActorDocument,
        scene: &SceneDocument,
        steps: &[StepRef],
    ) -> Result<DocumentSnapshot, StepError> {
        let mut current = token.to_snapshot();
        for step in steps {
            step.update_token(&mut current, actor, scene).await?;
        }
        Ok(current)
    }

    /// Version above which steps still apply
    fn floor(&self, current: Option<SchemaVersion>) -> SchemaVersion {
        current
            .filter(|version| !version.is_zero())
            .unwrap_or(self.config.recommended_safe_version)
    }

    fn runtime_versions(&self) -> RuntimeVersions {
        self.env.host_info.runtime_versions()
    }

    fn transition(&self, next: RunState) {
        let mut state = self.state.lock();
        debug_assert!(
            state.can_transition_to(next),
            "illegal run state transition {} -> {}",
            *state,
            next
        );
        tracing::debug!("Run state {} -> {}", *state, next);
        *state = next;
    }
}

/// Read the stored world schema version
///
/// Missing or null reads as `None`; numbers and numeric strings are accepted.
pub(crate) async fn read_schema_version(
    env: &Environment,
    config: &MigrationConfig,
) -> Result<Option<SchemaVersion>, MigrationError> {
    let stored = env
        .settings
        .get(&config.namespace, &config.schema_version_key)
        .await?;

    match stored {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64().map(SchemaVersion::new)),
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Some(SchemaVersion::new(n))),
            _ => Err(invalid_setting(config, Value::String(s))),
        },
        Some(other) => Err(invalid_setting(config, other)),
    }
}

fn invalid_setting(config: &MigrationConfig, value: Value) -> MigrationError {
    MigrationError::InvalidSetting {
        key: config.qualified_schema_key(),
        value,
    }
}
