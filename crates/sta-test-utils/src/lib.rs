//! Testing utilities for the STA migration workspace
//!
//! Shared fakes, fixtures and scripted steps.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sta_document::{apply_diff, Diff, DocumentSnapshot, SchemaVersion};
use sta_migration::{
    ActorCollection, ActorDocument, Environment, HostError, HostInfo, MigrationStep, Notice,
    Notifier, SceneDirectory, SceneDocument, SessionInfo, SettingsStore, StepError,
    TokenDocument, UpdateOptions, DEFAULT_NAMESPACE,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const GM_SESSION: &str = "gm-1";

// ----------------------------------------------------------------------------
// In-memory host
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum TokenActor {
    Linked(String),
    Synthetic(DocumentSnapshot),
}

#[derive(Debug, Clone)]
struct TokenState {
    source: DocumentSnapshot,
    actor: Option<TokenActor>,
}

#[derive(Debug, Clone)]
struct SceneState {
    id: String,
    name: String,
    tokens: Vec<TokenState>,
}

#[derive(Debug, Default)]
struct WorldState {
    stored_settings: HashMap<(String, String), Value>,
    default_settings: HashMap<(String, String), Value>,
    actors: Vec<DocumentSnapshot>,
    scenes: Vec<SceneState>,
    notices: Vec<Notice>,
    bulk_calls: Vec<usize>,
    rejected_bulk_calls: HashSet<usize>,
    failing_tokens: HashSet<String>,
    fail_setting_writes: bool,
    token_updates: Vec<(String, String, Diff)>,
    synthetic_updates: Vec<(String, String, Diff)>,
    leader: Option<String>,
    me: String,
    game_master: bool,
}

/// Host fake holding a whole world in memory
#[derive(Debug)]
pub struct InMemoryWorld {
    state: Mutex<WorldState>,
}

impl Default for InMemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

fn setting_key(namespace: &str, key: &str) -> (String, String) {
    (namespace.to_string(), key.to_string())
}

impl InMemoryWorld {
    /// Empty world where this session is the leading game master
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WorldState {
                leader: Some(GM_SESSION.to_string()),
                me: GM_SESSION.to_string(),
                game_master: true,
                ..WorldState::default()
            }),
        }
    }

    pub fn with_actor(mut self, actor: DocumentSnapshot) -> Self {
        self.state.get_mut().actors.push(actor);
        self
    }

    pub fn with_actors(mut self, actors: impl IntoIterator<Item = DocumentSnapshot>) -> Self {
        self.state.get_mut().actors.extend(actors);
        self
    }

    pub fn with_scene(mut self, id: &str, name: &str) -> Self {
        self.state.get_mut().scenes.push(SceneState {
            id: id.to_string(),
            name: name.to_string(),
            tokens: Vec::new(),
        });
        self
    }

    /// Token linked to world actor `actor_id`
    pub fn with_linked_token(
        self,
        scene_id: &str,
        token: DocumentSnapshot,
        actor_id: &str,
    ) -> Self {
        self.push_token(scene_id, token, Some(TokenActor::Linked(actor_id.to_string())))
    }

    /// Token carrying its own synthetic actor
    pub fn with_synthetic_token(
        self,
        scene_id: &str,
        token: DocumentSnapshot,
        actor: DocumentSnapshot,
    ) -> Self {
        self.push_token(scene_id, token, Some(TokenActor::Synthetic(actor)))
    }

    /// Token whose actor no longer resolves
    pub fn with_orphan_token(self, scene_id: &str, token: DocumentSnapshot) -> Self {
        self.push_token(scene_id, token, None)
    }

    fn push_token(
        mut self,
        scene_id: &str,
        source: DocumentSnapshot,
        actor: Option<TokenActor>,
    ) -> Self {
        if let Some(scene) = self
            .state
            .get_mut()
            .scenes
            .iter_mut()
            .find(|scene| scene.id == scene_id)
        {
            scene.tokens.push(TokenState { source, actor });
        }
        self
    }

    /// Explicitly stored setting
    pub fn with_setting(mut self, namespace: &str, key: &str, value: Value) -> Self {
        self.state
            .get_mut()
            .stored_settings
            .insert(setting_key(namespace, key), value);
        self
    }

    /// Registered default, returned by `get` but not `is_stored`
    pub fn with_default_setting(mut self, namespace: &str, key: &str, value: Value) -> Self {
        self.state
            .get_mut()
            .default_settings
            .insert(setting_key(namespace, key), value);
        self
    }

    /// Stored schema version in the default namespace
    pub fn with_schema_version(self, version: f64) -> Self {
        self.with_setting(DEFAULT_NAMESPACE, "worldSchemaVersion", json!(version))
    }

    pub fn with_session(mut self, me: &str, leader: Option<&str>, game_master: bool) -> Self {
        let state = self.state.get_mut();
        state.me = me.to_string();
        state.leader = leader.map(str::to_string);
        state.game_master = game_master;
        self
    }

    /// Reject the bulk update with zero-based call index `call`
    pub fn reject_bulk_call(mut self, call: usize) -> Self {
        self.state.get_mut().rejected_bulk_calls.insert(call);
        self
    }

    /// Reject updates of token `token_id`
    pub fn fail_token_update(mut self, token_id: &str) -> Self {
        self.state.get_mut().failing_tokens.insert(token_id.to_string());
        self
    }

    pub fn fail_setting_writes(mut self) -> Self {
        self.state.get_mut().fail_setting_writes = true;
        self
    }

    /// Wrap into a shared handle and its environment
    pub fn into_env(self, host_info: HostInfo) -> (Arc<Self>, Environment) {
        let world = Arc::new(self);
        let env = Environment::from_host(&world, host_info);
        (world, env)
    }

    // Inspection

    pub fn actor(&self, id: &str) -> Option<DocumentSnapshot> {
        self.state
            .lock()
            .actors
            .iter()
            .find(|actor| actor.id() == Some(id))
            .cloned()
    }

    pub fn token(&self, scene_id: &str, token_id: &str) -> Option<DocumentSnapshot> {
        let state = self.state.lock();
        find_token(&state.scenes, scene_id, token_id).map(|token| token.source.clone())
    }

    pub fn synthetic_actor(&self, scene_id: &str, token_id: &str) -> Option<DocumentSnapshot> {
        let state = self.state.lock();
        match find_token(&state.scenes, scene_id, token_id).and_then(|token| token.actor.as_ref()) {
            Some(TokenActor::Synthetic(actor)) => Some(actor.clone()),
            _ => None,
        }
    }

    /// Explicitly stored setting value
    pub fn stored_setting(&self, namespace: &str, key: &str) -> Option<Value> {
        self.state
            .lock()
            .stored_settings
            .get(&setting_key(namespace, key))
            .cloned()
    }

    /// Stored schema version in the default namespace
    pub fn schema_version(&self) -> Option<Value> {
        self.stored_setting(DEFAULT_NAMESPACE, "worldSchemaVersion")
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.state.lock().notices.clone()
    }

    /// Size of every bulk update call, in call order
    pub fn bulk_call_sizes(&self) -> Vec<usize> {
        self.state.lock().bulk_calls.clone()
    }

    pub fn token_updates(&self) -> Vec<(String, String, Diff)> {
        self.state.lock().token_updates.clone()
    }

    pub fn synthetic_updates(&self) -> Vec<(String, String, Diff)> {
        self.state.lock().synthetic_updates.clone()
    }
}

fn find_token<'a>(
    scenes: &'a [SceneState],
    scene_id: &str,
    token_id: &str,
) -> Option<&'a TokenState> {
    scenes
        .iter()
        .find(|scene| scene.id == scene_id)?
        .tokens
        .iter()
        .find(|token| token.source.id() == Some(token_id))
}

fn find_token_mut<'a>(
    scenes: &'a mut [SceneState],
    scene_id: &str,
    token_id: &str,
) -> Result<&'a mut TokenState, HostError> {
    scenes
        .iter_mut()
        .find(|scene| scene.id == scene_id)
        .and_then(|scene| {
            scene
                .tokens
                .iter_mut()
                .find(|token| token.source.id() == Some(token_id))
        })
        .ok_or_else(|| HostError::NotFound(format!("Scene.{scene_id}.Token.{token_id}")))
}

#[async_trait]
impl SettingsStore for InMemoryWorld {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, HostError> {
        let state = self.state.lock();
        let key = setting_key(namespace, key);
        Ok(state
            .stored_settings
            .get(&key)
            .or_else(|| state.default_settings.get(&key))
            .cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if state.fail_setting_writes {
            return Err(HostError::Settings {
                key: format!("{namespace}.{key}"),
                message: "world is read-only".to_string(),
            });
        }
        state.stored_settings.insert(setting_key(namespace, key), value);
        Ok(())
    }

    async fn is_stored(&self, namespace: &str, key: &str) -> Result<bool, HostError> {
        Ok(self
            .state
            .lock()
            .stored_settings
            .contains_key(&setting_key(namespace, key)))
    }
}

#[async_trait]
impl ActorCollection for InMemoryWorld {
    async fn actors(&self) -> Result<Vec<ActorDocument>, HostError> {
        Ok(self
            .state
            .lock()
            .actors
            .iter()
            .cloned()
            .map(ActorDocument::world)
            .collect())
    }

    async fn bulk_update(
        &self,
        updates: Vec<DocumentSnapshot>,
        _options: &UpdateOptions,
    ) -> Result<(), HostError> {
        let mut state = self.state.lock();
        let call = state.bulk_calls.len();
        state.bulk_calls.push(updates.len());
        if state.rejected_bulk_calls.contains(&call) {
            return Err(HostError::Persistence(format!("bulk update {call} rejected")));
        }

        for update in updates {
            let slot = state
                .actors
                .iter_mut()
                .find(|actor| actor.id().is_some() && actor.id() == update.id())
                .ok_or_else(|| {
                    HostError::NotFound(format!("Actor.{}", update.id().unwrap_or_default()))
                })?;
            *slot = update;
        }
        Ok(())
    }
}

#[async_trait]
impl SceneDirectory for InMemoryWorld {
    async fn scenes(&self) -> Result<Vec<SceneDocument>, HostError> {
        let state = self.state.lock();
        let scenes = state
            .scenes
            .iter()
            .map(|scene| SceneDocument {
                id: scene.id.clone(),
                name: scene.name.clone(),
                tokens: scene
                    .tokens
                    .iter()
                    .map(|token| {
                        let id = token.source.id().unwrap_or_default().to_string();
                        let actor = match &token.actor {
                            Some(TokenActor::Linked(actor_id)) => state
                                .actors
                                .iter()
                                .find(|actor| actor.id() == Some(actor_id.as_str()))
                                .cloned()
                                .map(ActorDocument::world),
                            Some(TokenActor::Synthetic(actor)) => {
                                Some(ActorDocument::synthetic(&scene.id, &id, actor.clone()))
                            }
                            None => None,
                        };
                        TokenDocument {
                            id,
                            source: token.source.clone(),
                            actor,
                        }
                    })
                    .collect(),
            })
            .collect();
        Ok(scenes)
    }

    async fn update_token(
        &self,
        scene_id: &str,
        token_id: &str,
        diff: Diff,
        _options: &UpdateOptions,
    ) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if state.failing_tokens.contains(token_id) {
            return Err(HostError::Persistence(format!("token {token_id} rejected")));
        }
        let token = find_token_mut(&mut state.scenes, scene_id, token_id)?;
        token.source.apply(&diff);
        state
            .token_updates
            .push((scene_id.to_string(), token_id.to_string(), diff));
        Ok(())
    }

    async fn update_synthetic_actor(
        &self,
        scene_id: &str,
        token_id: &str,
        diff: Diff,
        _options: &UpdateOptions,
    ) -> Result<(), HostError> {
        let mut state = self.state.lock();
        let token = find_token_mut(&mut state.scenes, scene_id, token_id)?;
        match &mut token.actor {
            Some(TokenActor::Synthetic(actor)) => apply_diff(actor.as_map_mut(), &diff),
            _ => {
                return Err(HostError::NotFound(format!(
                    "Scene.{scene_id}.Token.{token_id}.Actor"
                )))
            }
        }
        state
            .synthetic_updates
            .push((scene_id.to_string(), token_id.to_string(), diff));
        Ok(())
    }
}

impl SessionInfo for InMemoryWorld {
    fn current_leader_session_id(&self) -> Option<String> {
        self.state.lock().leader.clone()
    }

    fn my_session_id(&self) -> String {
        self.state.lock().me.clone()
    }

    fn is_game_master(&self) -> bool {
        self.state.lock().game_master
    }
}

impl Notifier for InMemoryWorld {
    fn notify(&self, notice: Notice) {
        self.state.lock().notices.push(notice);
    }
}

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

pub fn host_info() -> HostInfo {
    HostInfo::new("12.331", "1.3.0", "0.2.0")
}

pub fn snapshot(value: Value) -> DocumentSnapshot {
    DocumentSnapshot::new(value).unwrap()
}

pub fn character(id: &str, name: &str) -> DocumentSnapshot {
    snapshot(json!({
        "_id": id,
        "name": name,
        "type": "character",
        "system": {},
        "flags": {},
        "items": []
    }))
}

pub fn character_with_biography(id: &str, name: &str, biography: &str) -> DocumentSnapshot {
    snapshot(json!({
        "_id": id,
        "name": name,
        "type": "character",
        "system": {},
        "flags": {"sta-enhanced": {"character": {"biography": biography}}},
        "items": [{"_id": format!("{id}-item"), "type": "value", "flags": {}}]
    }))
}

pub fn starship(id: &str, name: &str) -> DocumentSnapshot {
    snapshot(json!({
        "_id": id,
        "name": name,
        "type": "starship",
        "system": {},
        "flags": {},
        "items": []
    }))
}

pub fn token(id: &str, delta: Value) -> DocumentSnapshot {
    snapshot(json!({"_id": id, "name": id, "flags": {}, "delta": delta}))
}

/// Numeric version value, as stored in settings
pub fn version_value(version: f64) -> Value {
    SchemaVersion::new(version).to_value()
}

// ----------------------------------------------------------------------------
// Scripted steps
// ----------------------------------------------------------------------------

/// Step that appends its version to `flags.<ns>.applied`
///
/// Records every document it sees and fails on configured ids.
#[derive(Debug, Clone)]
pub struct ScriptedStep {
    version: SchemaVersion,
    flush: bool,
    tokens: bool,
    fail_on: HashSet<String>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedStep {
    pub fn new(version: f64) -> Self {
        Self {
            version: SchemaVersion::new(version),
            flush: false,
            tokens: false,
            fail_on: HashSet::new(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn flushing(mut self) -> Self {
        self.flush = true;
        self
    }

    pub fn with_tokens(mut self) -> Self {
        self.tokens = true;
        self
    }

    pub fn failing_on(mut self, id: &str) -> Self {
        self.fail_on.insert(id.to_string());
        self
    }

    /// Ids of every document passed to the step, in call order
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    pub fn into_ref(self) -> Arc<dyn MigrationStep> {
        Arc::new(self)
    }

    fn mark(&self, doc: &mut DocumentSnapshot) -> Result<(), StepError> {
        let id = doc.id().unwrap_or_default().to_string();
        self.seen.lock().push(id.clone());
        if self.fail_on.contains(&id) {
            return Err(StepError::Other(format!("scripted failure on {id}")));
        }

        let version = self.version.to_value();
        doc.update_namespace_flags(DEFAULT_NAMESPACE, |flags| {
            let applied = flags
                .entry("applied")
                .or_insert_with(|| Value::Array(Vec::new()));
            match applied {
                Value::Array(list) => {
                    list.push(version);
                    Ok(())
                }
                _ => Err(StepError::invalid_shape(
                    format!("/flags/{DEFAULT_NAMESPACE}/applied"),
                    "expected an array",
                )),
            }
        })
    }
}

#[async_trait]
impl MigrationStep for ScriptedStep {
    fn version(&self) -> SchemaVersion {
        self.version
    }

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn requires_flush(&self) -> bool {
        self.flush
    }

    fn updates_tokens(&self) -> bool {
        self.tokens
    }

    async fn update_actor(&self, source: &mut DocumentSnapshot) -> Result<(), StepError> {
        self.mark(source)
    }

    async fn update_token(
        &self,
        token: &mut DocumentSnapshot,
        _actor: &ActorDocument,
        _scene: &SceneDocument,
    ) -> Result<(), StepError> {
        if self.tokens {
            self.mark(token)?;
        }
        Ok(())
    }
}

/// Versions applied to `doc` by scripted steps, in order
pub fn applied_versions(doc: &DocumentSnapshot) -> Vec<f64> {
    doc.namespace_flags(DEFAULT_NAMESPACE)
        .and_then(|flags| flags.get("applied"))
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default()
}
