//! Structural diff between snapshots
//!
//! Produces changes in the host's partial-update format: nested objects are
//! diffed recursively, everything else is replaced wholesale, and keys that
//! disappeared are emitted as `-=key: null`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key prefix the host interprets as "delete this key"
pub const DELETION_PREFIX: &str = "-=";

/// Partial update describing how one snapshot differs from another
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diff {
    changes: Map<String, Value>,
}

impl Diff {
    /// Compute the changes that turn `original` into `updated`
    #[must_use]
    pub fn between(original: &Map<String, Value>, updated: &Map<String, Value>) -> Self {
        Self {
            changes: diff_maps(original, updated),
        }
    }

    /// Whether the two snapshots were identical
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of top-level keys touched
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Top-level change for `key`
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.changes.get(key)
    }

    /// Borrow the raw change map
    #[inline]
    #[must_use]
    pub fn changes(&self) -> &Map<String, Value> {
        &self.changes
    }

    /// Take the raw change map
    #[inline]
    #[must_use]
    pub fn into_changes(self) -> Map<String, Value> {
        self.changes
    }
}

impl From<Map<String, Value>> for Diff {
    fn from(changes: Map<String, Value>) -> Self {
        Self { changes }
    }
}

fn diff_maps(original: &Map<String, Value>, updated: &Map<String, Value>) -> Map<String, Value> {
    let mut changes = Map::new();

    for (key, new_value) in updated {
        match (original.get(key), new_value) {
            (Some(old_value), new_value) if old_value == new_value => {}
            (Some(Value::Object(old_map)), Value::Object(new_map)) => {
                let nested = diff_maps(old_map, new_map);
                if !nested.is_empty() {
                    changes.insert(key.clone(), Value::Object(nested));
                }
            }
            _ => {
                changes.insert(key.clone(), new_value.clone());
            }
        }
    }

    for key in original.keys() {
        if !updated.contains_key(key) {
            changes.insert(format!("{DELETION_PREFIX}{key}"), Value::Null);
        }
    }

    changes
}

/// Merge a partial update into `target` the way the host does
///
/// Objects merge recursively, `-=key` entries delete, anything else replaces.
pub fn apply_diff(target: &mut Map<String, Value>, diff: &Diff) {
    merge_changes(target, &diff.changes);
}

fn merge_changes(target: &mut Map<String, Value>, changes: &Map<String, Value>) {
    for (key, change) in changes {
        if let Some(deleted) = key.strip_prefix(DELETION_PREFIX) {
            target.remove(deleted);
            continue;
        }
        match (target.get_mut(key), change) {
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                merge_changes(existing, nested);
            }
            _ => {
                target.insert(key.clone(), change.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn identical_maps_have_empty_diff() {
        let a = map(json!({"type": "character", "system": {"x": 1}}));
        assert!(Diff::between(&a, &a.clone()).is_empty());
    }

    #[test]
    fn nested_change_only_reports_changed_leaf() {
        let a = map(json!({"system": {"x": 1, "y": 2}, "name": "Kirk"}));
        let b = map(json!({"system": {"x": 1, "y": 3}, "name": "Kirk"}));
        let diff = Diff::between(&a, &b);
        assert_eq!(diff.changes(), &map(json!({"system": {"y": 3}})));
    }

    #[test]
    fn removed_key_uses_deletion_prefix() {
        let a = map(json!({"flags": {"ns": {"biography": "Hi"}}}));
        let b = map(json!({"flags": {"ns": {"backstory": "Hi"}}}));
        let diff = Diff::between(&a, &b);
        assert_eq!(
            diff.changes(),
            &map(json!({"flags": {"ns": {"backstory": "Hi", "-=biography": null}}}))
        );
    }

    #[test]
    fn arrays_are_replaced_wholesale() {
        let a = map(json!({"items": [1, 2]}));
        let b = map(json!({"items": [1, 2, 3]}));
        assert_eq!(Diff::between(&a, &b).get("items"), Some(&json!([1, 2, 3])));
    }

    #[test]
    fn apply_diff_reproduces_updated_map() {
        let a = map(json!({"flags": {"ns": {"biography": "Hi", "keep": true}}, "items": [1]}));
        let b = map(json!({"flags": {"ns": {"backstory": "Hi", "keep": true}}, "items": [2]}));
        let diff = Diff::between(&a, &b);

        let mut target = a.clone();
        apply_diff(&mut target, &diff);
        assert_eq!(target, b);
    }

    #[test]
    fn raw_changes_apply_as_partial_update() {
        let diff = Diff::from(map(json!({"system": {"stress": 3}, "-=name": null})));
        let mut target = map(json!({"name": "Kirk", "system": {"stress": 1, "max": 5}}));
        apply_diff(&mut target, &diff);
        assert_eq!(target, map(json!({"system": {"stress": 3, "max": 5}})));
    }
}
