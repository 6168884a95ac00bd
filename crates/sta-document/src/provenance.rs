//! Migration provenance records
//!
//! Every migrated document carries `flags.<namespace>._migration`:
//!
//! ```text
//! { "version": 0.1, "previous": { "schema": null, "system": "1.2.0", "host": "12.331" } }
//! ```
//!
//! The record is a write-only audit trail. Migration steps never read it.

use crate::version::SchemaVersion;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flag key holding the provenance record inside the namespace flags
pub const MIGRATION_FLAG_KEY: &str = "_migration";

/// Last migration applied to a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Last applied migration version
    #[serde(default)]
    pub version: Option<SchemaVersion>,
    /// State the document was in before that migration
    #[serde(default)]
    pub previous: Option<PreviousState>,
}

/// Prior state captured when a record is stamped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviousState {
    /// Previously stamped migration version
    pub schema: Option<SchemaVersion>,
    /// Game-system version at stamping time
    pub system: Option<String>,
    /// Host application version at stamping time
    pub host: Option<String>,
}

/// Runtime identifiers written into `previous`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeVersions {
    /// Game-system version
    pub system: Option<String>,
    /// Host application version
    pub host: Option<String>,
}

impl RuntimeVersions {
    /// Create from system and host version strings
    #[must_use]
    pub fn new(system: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            host: Some(host.into()),
        }
    }
}

impl MigrationRecord {
    /// Parse a record from its stored value
    ///
    /// Malformed fields are dropped rather than rejected.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let record = value.as_object()?;
        let previous = record.get("previous").and_then(Value::as_object).map(|p| PreviousState {
            schema: p.get("schema").and_then(SchemaVersion::from_value),
            system: p.get("system").and_then(Value::as_str).map(str::to_string),
            host: p.get("host").and_then(Value::as_str).map(str::to_string),
        });
        Some(Self {
            version: record.get("version").and_then(SchemaVersion::from_value),
            previous,
        })
    }
}

/// Run `f` over the flags owned by `namespace`, creating them on demand
pub(crate) fn with_namespace_flags<R>(
    fields: &mut Map<String, Value>,
    namespace: &str,
    f: impl FnOnce(&mut Map<String, Value>) -> R,
) -> R {
    with_object(fields, crate::snapshot::FLAGS_KEY, |flags| {
        with_object(flags, namespace, f)
    })
}

/// Run `f` over the object at `key`; a missing or non-object value is
/// replaced by an empty object. The key keeps its position.
fn with_object<R>(
    map: &mut Map<String, Value>,
    key: &str,
    f: impl FnOnce(&mut Map<String, Value>) -> R,
) -> R {
    let mut object = match map.get_mut(key).map(std::mem::take) {
        Some(Value::Object(object)) => object,
        _ => Map::new(),
    };
    let result = f(&mut object);
    map.insert(key.to_string(), Value::Object(object));
    result
}

/// Stamp `version` onto the provenance record held in `fields`
///
/// Unknown keys already present in the record are preserved.
pub(crate) fn stamp(
    fields: &mut Map<String, Value>,
    namespace: &str,
    version: SchemaVersion,
    runtime: &RuntimeVersions,
) {
    with_namespace_flags(fields, namespace, |flags| {
        with_object(flags, MIGRATION_FLAG_KEY, |record| {
            let from_version = record
                .get("version")
                .and_then(Value::as_f64)
                .map_or(Value::Null, |v| SchemaVersion::new(v).to_value());

            record.insert("version".to_string(), version.to_value());
            let mut previous = Map::new();
            previous.insert("schema".to_string(), from_version);
            previous.insert("system".to_string(), optional_string(runtime.system.as_deref()));
            previous.insert("host".to_string(), optional_string(runtime.host.as_deref()));
            record.insert("previous".to_string(), Value::Object(previous));
        });
    });
}

fn optional_string(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::String(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn first_stamp_has_null_previous_schema() {
        let mut doc = fields(json!({"type": "character"}));
        stamp(&mut doc, "ns", SchemaVersion::new(0.1), &RuntimeVersions::new("1.0.0", "12"));

        assert_eq!(
            Value::Object(doc),
            json!({
                "type": "character",
                "flags": {"ns": {"_migration": {
                    "version": 0.1,
                    "previous": {"schema": null, "system": "1.0.0", "host": "12"}
                }}}
            })
        );
    }

    #[test]
    fn restamp_moves_version_into_previous() {
        let mut doc =
            fields(json!({"flags": {"ns": {"_migration": {"version": 0.1, "previous": null}}}}));
        stamp(&mut doc, "ns", SchemaVersion::new(0.2), &RuntimeVersions::default());

        let record = MigrationRecord::from_value(&doc["flags"]["ns"]["_migration"]).unwrap();
        assert_eq!(record.version, Some(SchemaVersion::new(0.2)));
        assert_eq!(
            record.previous,
            Some(PreviousState {
                schema: Some(SchemaVersion::new(0.1)),
                system: None,
                host: None,
            })
        );
    }

    #[test]
    fn non_numeric_prior_version_becomes_null() {
        let mut doc = fields(json!({"flags": {"ns": {"_migration": {"version": "garbage"}}}}));
        stamp(&mut doc, "ns", SchemaVersion::new(0.1), &RuntimeVersions::default());
        assert_eq!(doc["flags"]["ns"]["_migration"]["previous"]["schema"], Value::Null);
    }

    #[test]
    fn stamp_repairs_non_object_flags() {
        let mut doc = fields(json!({"flags": null}));
        stamp(&mut doc, "ns", SchemaVersion::new(0.1), &RuntimeVersions::default());
        assert_eq!(doc["flags"]["ns"]["_migration"]["version"], json!(0.1));
    }

    #[test]
    fn stamp_replaces_scalar_namespace_and_record() {
        let mut doc = fields(json!({"flags": {"ns": 7, "core": {"a": 1}}}));
        stamp(&mut doc, "ns", SchemaVersion::new(0.1), &RuntimeVersions::default());
        assert_eq!(doc["flags"]["ns"]["_migration"]["version"], json!(0.1));

        let mut doc = fields(json!({"flags": {"ns": {"_migration": "stale"}}}));
        stamp(&mut doc, "ns", SchemaVersion::new(0.2), &RuntimeVersions::default());
        assert_eq!(doc["flags"]["ns"]["_migration"]["version"], json!(0.2));
        assert_eq!(doc["flags"]["ns"]["_migration"]["previous"]["schema"], Value::Null);
    }

    #[test]
    fn stamp_keeps_key_order() {
        let mut doc =
            fields(json!({"type": "npc", "flags": {"a": 1, "ns": {}, "z": 2}, "items": []}));
        stamp(&mut doc, "ns", SchemaVersion::new(0.1), &RuntimeVersions::default());
        let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["type", "flags", "items"]);
        let flag_keys: Vec<&str> = doc["flags"]
            .as_object()
            .map(|flags| flags.keys().map(String::as_str).collect())
            .unwrap_or_default();
        assert_eq!(flag_keys, vec!["a", "ns", "z"]);
    }

    #[test]
    fn stamp_keeps_sibling_namespace_flags() {
        let mut doc = fields(json!({
            "flags": {"ns": {"character": {"backstory": "x"}}, "core": {"a": 1}}
        }));
        stamp(&mut doc, "ns", SchemaVersion::new(0.1), &RuntimeVersions::default());
        assert_eq!(doc["flags"]["core"], json!({"a": 1}));
        assert_eq!(doc["flags"]["ns"]["character"], json!({"backstory": "x"}));
    }
}
