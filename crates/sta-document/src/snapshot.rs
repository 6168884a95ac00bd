//! Document snapshots
//!
//! A [`DocumentSnapshot`] is the plain-data form of one host document. The
//! host's document shape is schemaless from the module's point of view, so
//! the snapshot is a generic ordered key/value tree with guarded accessors
//! for the parts migrations touch: the `type` discriminator, the `system`
//! sub-tree, namespaced `flags` and embedded `items`.

use crate::diff::Diff;
use crate::error::DocumentError;
use crate::pointer;
use crate::provenance::{self, MigrationRecord, RuntimeVersions, MIGRATION_FLAG_KEY};
use crate::version::SchemaVersion;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Document identifier key
pub const ID_KEY: &str = "_id";
/// Document type discriminator key
pub const TYPE_KEY: &str = "type";
/// Display name key
pub const NAME_KEY: &str = "name";
/// Game-system data key
pub const SYSTEM_KEY: &str = "system";
/// Namespaced flags key
pub const FLAGS_KEY: &str = "flags";
/// Embedded items key
pub const ITEMS_KEY: &str = "items";

/// Owned, deep copy of a host document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentSnapshot {
    fields: Map<String, Value>,
}

impl DocumentSnapshot {
    /// Create from a JSON value
    ///
    /// # Errors
    /// Returns `DocumentError::NotADocument` if the value is not an object
    pub fn new(value: Value) -> Result<Self, DocumentError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            Value::Null => Err(DocumentError::NotADocument("null")),
            Value::Bool(_) => Err(DocumentError::NotADocument("bool")),
            Value::Number(_) => Err(DocumentError::NotADocument("number")),
            Value::String(_) => Err(DocumentError::NotADocument("string")),
            Value::Array(_) => Err(DocumentError::NotADocument("array")),
        }
    }

    /// Parse from JSON text
    ///
    /// # Errors
    /// Returns error if the text is not a JSON object
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Self::new(serde_json::from_str(json)?)
    }

    /// Wrap an existing field map
    #[inline]
    #[must_use]
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Borrow the root map
    #[inline]
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Mutably borrow the root map
    #[inline]
    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    /// Convert into a JSON value
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Document id (`_id`)
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.fields.get(ID_KEY).and_then(Value::as_str)
    }

    /// Type discriminator (`type`)
    #[inline]
    #[must_use]
    pub fn document_type(&self) -> Option<&str> {
        self.fields.get(TYPE_KEY).and_then(Value::as_str)
    }

    /// Whether the type discriminator equals `kind`
    #[inline]
    #[must_use]
    pub fn is_type(&self, kind: &str) -> bool {
        self.document_type() == Some(kind)
    }

    /// Display name
    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.fields.get(NAME_KEY).and_then(Value::as_str)
    }

    /// Game-system data
    #[inline]
    #[must_use]
    pub fn system(&self) -> Option<&Map<String, Value>> {
        self.fields.get(SYSTEM_KEY).and_then(Value::as_object)
    }

    /// All flags
    #[inline]
    #[must_use]
    pub fn flags(&self) -> Option<&Map<String, Value>> {
        self.fields.get(FLAGS_KEY).and_then(Value::as_object)
    }

    /// Flags owned by `namespace`
    #[inline]
    #[must_use]
    pub fn namespace_flags(&self, namespace: &str) -> Option<&Map<String, Value>> {
        self.flags()
            .and_then(|flags| flags.get(namespace))
            .and_then(Value::as_object)
    }

    /// Run `f` over the flags owned by `namespace`, created on demand
    pub fn update_namespace_flags<R>(
        &mut self,
        namespace: &str,
        f: impl FnOnce(&mut Map<String, Value>) -> R,
    ) -> R {
        provenance::with_namespace_flags(&mut self.fields, namespace, f)
    }

    /// Embedded item snapshots (empty if absent)
    #[must_use]
    pub fn items(&self) -> &[Value] {
        self.fields
            .get(ITEMS_KEY)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Mutable embedded items, if the document has an item list
    #[inline]
    pub fn items_mut(&mut self) -> Option<&mut Vec<Value>> {
        self.fields.get_mut(ITEMS_KEY).and_then(Value::as_array_mut)
    }

    /// Get a value by JSON pointer
    ///
    /// # Examples
    /// ```
    /// # use sta_document::DocumentSnapshot;
    /// # use serde_json::json;
    /// let doc = DocumentSnapshot::new(json!({"system": {"attributes": {"control": 9}}})).unwrap();
    /// assert_eq!(doc.get("/system/attributes/control"), Some(&json!(9)));
    /// ```
    #[inline]
    #[must_use]
    pub fn get(&self, pointer: &str) -> Option<&Value> {
        pointer::get(&self.fields, pointer)
    }

    /// Mutable value by JSON pointer
    #[inline]
    pub fn get_mut(&mut self, pointer: &str) -> Option<&mut Value> {
        pointer::get_mut(&mut self.fields, pointer)
    }

    /// Set a value by JSON pointer, creating missing objects along the way
    ///
    /// Returns the value previously stored there.
    ///
    /// # Errors
    /// - `DocumentError::InvalidPointer` for malformed or empty pointers
    /// - `DocumentError::NotAContainer` if a parent is a scalar or array
    pub fn set(&mut self, pointer: &str, value: Value) -> Result<Option<Value>, DocumentError> {
        pointer::set(&mut self.fields, pointer, value)
    }

    /// Remove a value by JSON pointer
    #[inline]
    pub fn remove(&mut self, pointer: &str) -> Option<Value> {
        pointer::remove(&mut self.fields, pointer)
    }

    /// Structural diff from `self` to `updated`
    #[inline]
    #[must_use]
    pub fn diff(&self, updated: &Self) -> Diff {
        Diff::between(&self.fields, &updated.fields)
    }

    /// Apply a partial update in the host's merge semantics
    #[inline]
    pub fn apply(&mut self, diff: &Diff) {
        crate::diff::apply_diff(&mut self.fields, diff);
    }

    /// Provenance record stored for `namespace`
    #[must_use]
    pub fn migration_record(&self, namespace: &str) -> Option<MigrationRecord> {
        self.namespace_flags(namespace)
            .and_then(|flags| flags.get(MIGRATION_FLAG_KEY))
            .and_then(MigrationRecord::from_value)
    }

    /// Last stamped migration version, read leniently
    #[must_use]
    pub fn stamped_version(&self, namespace: &str) -> Option<SchemaVersion> {
        self.namespace_flags(namespace)
            .and_then(|flags| flags.get(MIGRATION_FLAG_KEY))
            .and_then(|record| record.get("version"))
            .and_then(SchemaVersion::from_value)
    }

    /// Stamp provenance on this document and every embedded item
    pub fn stamp_migration(
        &mut self,
        namespace: &str,
        version: SchemaVersion,
        runtime: &RuntimeVersions,
    ) {
        provenance::stamp(&mut self.fields, namespace, version, runtime);
        if let Some(items) = self.items_mut() {
            for item in items.iter_mut().filter_map(Value::as_object_mut) {
                provenance::stamp(item, namespace, version, runtime);
            }
        }
    }
}

impl From<DocumentSnapshot> for Value {
    fn from(snapshot: DocumentSnapshot) -> Self {
        snapshot.into_value()
    }
}

impl TryFrom<Value> for DocumentSnapshot {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn actor() -> DocumentSnapshot {
        DocumentSnapshot::new(json!({
            "_id": "a1",
            "name": "Spock",
            "type": "character",
            "system": {"values": {"determination": 1}},
            "flags": {"sta-enhanced": {"character": {"biography": "Vulcan"}}},
            "items": [
                {"_id": "i1", "type": "talent", "flags": {}},
                {"_id": "i2", "type": "value"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn rejects_non_object_root() {
        assert!(matches!(
            DocumentSnapshot::new(json!([1])),
            Err(DocumentError::NotADocument("array"))
        ));
        assert!(DocumentSnapshot::from_json("nope").is_err());
    }

    #[test]
    fn accessors_read_known_fields() {
        let doc = actor();
        assert_eq!(doc.id(), Some("a1"));
        assert_eq!(doc.name(), Some("Spock"));
        assert!(doc.is_type("character"));
        assert_eq!(doc.items().len(), 2);
        assert!(doc.system().is_some());
        assert_eq!(
            doc.namespace_flags("sta-enhanced").and_then(|f| f.get("character")),
            Some(&json!({"biography": "Vulcan"}))
        );
        assert!(doc.namespace_flags("other").is_none());
    }

    #[test]
    fn items_default_to_empty() {
        let doc = DocumentSnapshot::new(json!({"type": "starship"})).unwrap();
        assert!(doc.items().is_empty());
    }

    #[test]
    fn update_namespace_flags_creates_missing_objects() {
        let mut doc = DocumentSnapshot::new(json!({"type": "npc"})).unwrap();
        doc.update_namespace_flags("sta-enhanced", |flags| {
            flags.insert("seen".to_string(), json!(true))
        });
        assert_eq!(doc.get("/flags/sta-enhanced/seen"), Some(&json!(true)));
    }

    #[test]
    fn stamp_covers_actor_and_items() {
        let mut doc = actor();
        doc.stamp_migration(
            "sta-enhanced",
            SchemaVersion::new(0.1),
            &RuntimeVersions::new("2.0", "13"),
        );

        assert_eq!(doc.stamped_version("sta-enhanced"), Some(SchemaVersion::new(0.1)));
        for item in doc.items() {
            assert_eq!(item["flags"]["sta-enhanced"]["_migration"]["version"], json!(0.1));
        }
        let record = doc.migration_record("sta-enhanced").unwrap();
        assert_eq!(record.previous.unwrap().system.as_deref(), Some("2.0"));
    }

    #[test]
    fn stamp_leaves_domain_fields_untouched() {
        let original = actor();
        let mut doc = original.clone();
        doc.stamp_migration("sta-enhanced", SchemaVersion::new(0.1), &RuntimeVersions::default());

        assert_eq!(doc.system(), original.system());
        assert_eq!(
            doc.get("/flags/sta-enhanced/character"),
            original.get("/flags/sta-enhanced/character")
        );
    }

    #[test]
    fn diff_then_apply_round_trips() {
        let original = actor();
        let mut updated = original.clone();
        updated.remove("/flags/sta-enhanced/character/biography");
        updated
            .set("/flags/sta-enhanced/character/backstory", json!("Vulcan"))
            .unwrap();

        let diff = original.diff(&updated);
        let mut patched = original.clone();
        patched.apply(&diff);
        assert_eq!(patched, updated);
    }
}
