//! STA Migration - versioned world-data migrations
//!
//! Brings every stored actor, item and token of a world up to the module's
//! current data schema:
//! - Orders registered steps by version and skips those already applied
//! - Splits steps into phases at flush boundaries
//! - Applies each phase to world actors in batched bulk updates
//! - Diffs scene tokens and their synthetic actors and persists the changes
//! - Stamps per-document provenance and advances the world schema version
//! - Summarizes how many documents reached the target version
//!
//! # Example
//!
//! ```rust,ignore
//! use sta_migration::prelude::*;
//!
//! # async fn example(env: Environment) -> Result<(), MigrationError> {
//! let hook = ReadyHook::with_builtin_steps(env, MigrationConfig::new())?;
//!
//! if let ReadyOutcome::Migrated { summary, .. } = hook.on_ready().await? {
//!     println!("{} of {} characters migrated", summary.migrated, summary.total);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod host;
pub mod plan;
pub mod ready;
pub mod registry;
pub mod report;
pub mod runner;
pub mod step;
pub mod steps;
pub mod summary;
pub mod telemetry;

pub use config::{MigrationConfig, DEFAULT_BATCH_SIZE, DEFAULT_NAMESPACE};
pub use error::{ConfigError, HostError, MigrationError, RegistryError, StepError};
pub use host::{
    ActorCollection, ActorDocument, Environment, HostInfo, Notice, NoticeLevel, Notifier,
    SceneDirectory, SceneDocument, SessionInfo, SettingsStore, TokenDocument, UpdateOptions,
};
pub use plan::{plan_phases, MigrationPhase, RunState};
pub use ready::{is_newer_version, ReadyHook, ReadyOutcome};
pub use registry::MigrationRegistry;
pub use report::{PhaseReport, RunReport};
pub use runner::MigrationRunner;
pub use step::{MigrationStep, StepRef};
pub use summary::{MigrationSummary, SummaryReport, UnmigratedDocument};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for hosting migrations
    pub use crate::{
        Environment, HostInfo, MigrationConfig, MigrationError, MigrationRegistry,
        MigrationRunner, MigrationStep, ReadyHook, ReadyOutcome, StepError, StepRef,
    };
    pub use sta_document::{DocumentSnapshot, SchemaVersion};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
