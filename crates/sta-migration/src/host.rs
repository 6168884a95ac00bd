//! Host application interfaces
//!
//! The host owns documents, settings, sessions and the notification surface.
//! The migration subsystem only sees them through the traits below, bundled
//! into an [`Environment`] that is passed explicitly to the runner, summary
//! and ready orchestration.

use crate::error::HostError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sta_document::{Diff, DocumentSnapshot, RuntimeVersions};
use std::fmt;
use std::sync::Arc;

/// A host actor as enumerated for migration
#[derive(Debug, Clone, PartialEq)]
pub struct ActorDocument {
    /// Host-unique reference used in logs (`Actor.<id>`)
    pub uuid: String,
    /// Plain-data source of the actor
    pub source: DocumentSnapshot,
    /// Token-local (unlinked) actor rather than a world actor
    pub synthetic: bool,
}

impl ActorDocument {
    /// World-level actor
    #[must_use]
    pub fn world(source: DocumentSnapshot) -> Self {
        let uuid = format!("Actor.{}", source.id().unwrap_or_default());
        Self {
            uuid,
            source,
            synthetic: false,
        }
    }

    /// Synthetic actor attached to a token
    #[must_use]
    pub fn synthetic(scene_id: &str, token_id: &str, source: DocumentSnapshot) -> Self {
        let uuid = format!(
            "Scene.{scene_id}.Token.{token_id}.Actor.{}",
            source.id().unwrap_or_default()
        );
        Self {
            uuid,
            source,
            synthetic: true,
        }
    }

    /// Deep copy of the actor data
    #[inline]
    #[must_use]
    pub fn to_snapshot(&self) -> DocumentSnapshot {
        self.source.clone()
    }
}

/// A token placed in a scene
#[derive(Debug, Clone, PartialEq)]
pub struct TokenDocument {
    /// Token id
    pub id: String,
    /// Plain-data source of the token, including its actor `delta`
    pub source: DocumentSnapshot,
    /// Actor the token represents, if it still resolves
    pub actor: Option<ActorDocument>,
}

impl TokenDocument {
    /// Deep copy of the token data
    #[inline]
    #[must_use]
    pub fn to_snapshot(&self) -> DocumentSnapshot {
        self.source.clone()
    }

    /// Actor delta stored on the token
    #[must_use]
    pub fn delta(&self) -> Option<&serde_json::Map<String, Value>> {
        self.source.get("/delta").and_then(Value::as_object)
    }

    /// Whether the delta carries anything a migration could act on
    ///
    /// True when it has flags for `namespace`, a non-empty item list or
    /// non-empty system data.
    #[must_use]
    pub fn has_migratable_delta(&self, namespace: &str) -> bool {
        let Some(delta) = self.delta() else {
            return false;
        };
        let has_flags = delta
            .get("flags")
            .and_then(Value::as_object)
            .and_then(|flags| flags.get(namespace))
            .is_some_and(|ns| !ns.is_null());
        let has_items = delta
            .get("items")
            .and_then(Value::as_array)
            .is_some_and(|items| !items.is_empty());
        let has_system = delta
            .get("system")
            .and_then(Value::as_object)
            .is_some_and(|system| !system.is_empty());
        has_flags || has_items || has_system
    }
}

/// A scene and the tokens placed on it
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDocument {
    /// Scene id
    pub id: String,
    /// Scene name
    pub name: String,
    /// Placed tokens
    pub tokens: Vec<TokenDocument>,
}

/// Options forwarded to host update calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOptions {
    /// Suppress host document hooks
    pub no_hook: bool,
    /// Compendium pack the documents live in
    pub pack: Option<String>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            no_hook: true,
            pack: None,
        }
    }
}

/// Severity of a user notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoticeLevel {
    /// Informational
    Info,
    /// Something the GM should look at
    Warning,
    /// Data may not migrate reliably
    Error,
}

/// User-facing, localizable notice
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Notice {
    /// A migration run is starting
    MigrationStarting {
        /// Game-system version being migrated to
        system_version: String,
    },
    /// Aggregate result of a run
    MigrationSummary {
        /// Documents at the target version
        migrated: usize,
        /// Documents inspected
        total: usize,
    },
    /// Stored data predates the minimum safe version
    DataTooOld {
        /// Stored world schema version
        current: f64,
    },
}

impl Notice {
    /// Localization key
    #[must_use]
    pub fn i18n_key(&self) -> &'static str {
        match self {
            Self::MigrationStarting { .. } => "sta-enhanced.Migrations.Starting",
            Self::MigrationSummary { .. } => "sta-enhanced.Migrations.Summary",
            Self::DataTooOld { .. } => "sta-enhanced.Migrations.DataTooOld",
        }
    }

    /// Severity
    #[must_use]
    pub fn level(&self) -> NoticeLevel {
        match self {
            Self::DataTooOld { .. } => NoticeLevel::Error,
            Self::MigrationSummary { migrated, total } if migrated != total => NoticeLevel::Warning,
            _ => NoticeLevel::Info,
        }
    }

    /// Whether the notice stays until dismissed
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::DataTooOld { .. })
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MigrationStarting { system_version } => {
                write!(
                    f,
                    "Applying STA Enhanced data migrations for system version {system_version}. \
                     Please be patient and do not close your game or shut down your server."
                )
            }
            Self::MigrationSummary { migrated, total } => {
                write!(f, "Migration finished: {migrated} of {total} characters migrated.")
            }
            Self::DataTooOld { .. } => write!(
                f,
                "Your STA Enhanced data is from too old a Foundry version and cannot be \
                 reliably migrated to the latest version. An attempt will be made, but errors \
                 may occur."
            ),
        }
    }
}

/// Versions of the running host, game system and module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostInfo {
    /// Host application version
    pub host_version: String,
    /// Game-system version
    pub system_version: String,
    /// This module's version
    pub module_version: String,
}

impl HostInfo {
    /// Create from version strings
    #[must_use]
    pub fn new(
        host_version: impl Into<String>,
        system_version: impl Into<String>,
        module_version: impl Into<String>,
    ) -> Self {
        Self {
            host_version: host_version.into(),
            system_version: system_version.into(),
            module_version: module_version.into(),
        }
    }

    /// Identifiers stamped into provenance records
    #[must_use]
    pub fn runtime_versions(&self) -> RuntimeVersions {
        RuntimeVersions::new(self.system_version.clone(), self.host_version.clone())
    }
}

/// Persisted world settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Current value (stored or registered default)
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, HostError>;

    /// Persist a value
    async fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), HostError>;

    /// Whether a value was ever explicitly stored
    async fn is_stored(&self, namespace: &str, key: &str) -> Result<bool, HostError>;
}

/// World-level actor collection
#[async_trait]
pub trait ActorCollection: Send + Sync {
    /// Enumerate every world actor
    async fn actors(&self) -> Result<Vec<ActorDocument>, HostError>;

    /// Replace many actors at once, matched by `_id`
    async fn bulk_update(
        &self,
        updates: Vec<DocumentSnapshot>,
        options: &UpdateOptions,
    ) -> Result<(), HostError>;
}

/// Scenes and their tokens
#[async_trait]
pub trait SceneDirectory: Send + Sync {
    /// Enumerate every scene
    async fn scenes(&self) -> Result<Vec<SceneDocument>, HostError>;

    /// Merge a partial update into a token
    async fn update_token(
        &self,
        scene_id: &str,
        token_id: &str,
        diff: Diff,
        options: &UpdateOptions,
    ) -> Result<(), HostError>;

    /// Merge a partial update into a token's synthetic actor
    async fn update_synthetic_actor(
        &self,
        scene_id: &str,
        token_id: &str,
        diff: Diff,
        options: &UpdateOptions,
    ) -> Result<(), HostError>;
}

/// Identity of connected sessions
pub trait SessionInfo: Send + Sync {
    /// Session elected to run world maintenance, if any
    fn current_leader_session_id(&self) -> Option<String>;

    /// This session
    fn my_session_id(&self) -> String;

    /// Whether this session belongs to a game master
    fn is_game_master(&self) -> bool;

    /// Whether this session is the elected leader
    fn is_leader(&self) -> bool {
        self.current_leader_session_id().as_deref() == Some(self.my_session_id().as_str())
    }
}

/// User notification surface
pub trait Notifier: Send + Sync {
    /// Show a notice
    fn notify(&self, notice: Notice);
}

/// Injected host context
#[derive(Clone)]
pub struct Environment {
    /// Settings storage
    pub settings: Arc<dyn SettingsStore>,
    /// World actors
    pub actors: Arc<dyn ActorCollection>,
    /// Scenes and tokens
    pub scenes: Arc<dyn SceneDirectory>,
    /// Session identity
    pub session: Arc<dyn SessionInfo>,
    /// Notifications
    pub notifier: Arc<dyn Notifier>,
    /// Running versions
    pub host_info: HostInfo,
}

impl Environment {
    /// Build from one object implementing every host interface
    #[must_use]
    pub fn from_host<H>(host: &Arc<H>, host_info: HostInfo) -> Self
    where
        H: SettingsStore + ActorCollection + SceneDirectory + SessionInfo + Notifier + 'static,
    {
        Self {
            settings: host.clone(),
            actors: host.clone(),
            scenes: host.clone(),
            session: host.clone(),
            notifier: host.clone(),
            host_info,
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("host_info", &self.host_info)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(delta: Value) -> TokenDocument {
        TokenDocument {
            id: "t1".to_string(),
            source: DocumentSnapshot::new(json!({"_id": "t1", "delta": delta})).unwrap(),
            actor: None,
        }
    }

    #[test]
    fn migratable_delta_detection() {
        assert!(!token(json!(null)).has_migratable_delta("ns"));
        assert!(!token(json!({"flags": {}, "items": [], "system": {}})).has_migratable_delta("ns"));
        assert!(token(json!({"flags": {"ns": {}}})).has_migratable_delta("ns"));
        assert!(token(json!({"items": [{"_id": "i"}]})).has_migratable_delta("ns"));
        assert!(token(json!({"system": {"stress": 2}})).has_migratable_delta("ns"));
        assert!(!token(json!({"flags": {"other": {}}})).has_migratable_delta("ns"));
    }

    #[test]
    fn actor_uuids() {
        let source = DocumentSnapshot::new(json!({"_id": "a1"})).unwrap();
        assert_eq!(ActorDocument::world(source.clone()).uuid, "Actor.a1");
        let synthetic = ActorDocument::synthetic("s1", "t1", source);
        assert_eq!(synthetic.uuid, "Scene.s1.Token.t1.Actor.a1");
        assert!(synthetic.synthetic);
    }

    #[test]
    fn notice_metadata() {
        let summary = Notice::MigrationSummary { migrated: 3, total: 5 };
        assert_eq!(summary.i18n_key(), "sta-enhanced.Migrations.Summary");
        assert_eq!(summary.level(), NoticeLevel::Warning);
        assert!(!summary.is_persistent());
        assert!(summary.to_string().contains("3 of 5"));

        let too_old = Notice::DataTooOld { current: 0.05 };
        assert!(too_old.is_persistent());
        assert_eq!(too_old.level(), NoticeLevel::Error);
    }

    #[test]
    fn update_options_suppress_hooks_by_default() {
        assert!(UpdateOptions::default().no_hook);
    }
}
