//! 0.1: move the character biography flag to the backstory flag

use crate::error::StepError;
use crate::step::MigrationStep;
use async_trait::async_trait;
use serde_json::Value;
use sta_document::{DocumentSnapshot, SchemaVersion};

/// Rename `flags.<ns>.character.biography` to `flags.<ns>.character.backstory`
///
/// Characters only. A missing or empty biography is left alone.
#[derive(Debug, Clone)]
pub struct MoveBiographyToBackstory {
    namespace: String,
}

impl MoveBiographyToBackstory {
    /// Step version
    pub const VERSION: SchemaVersion = SchemaVersion::new(0.1);

    /// Create for the module namespace
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl MigrationStep for MoveBiographyToBackstory {
    fn version(&self) -> SchemaVersion {
        Self::VERSION
    }

    fn name(&self) -> &'static str {
        "move-biography-to-backstory"
    }

    async fn update_actor(&self, source: &mut DocumentSnapshot) -> Result<(), StepError> {
        if !source.is_type("character") {
            return Ok(());
        }

        let Some(Value::Object(character)) = source
            .as_map_mut()
            .get_mut("flags")
            .and_then(|flags| flags.get_mut(self.namespace.as_str()))
            .and_then(|ns| ns.get_mut("character"))
        else {
            return Ok(());
        };

        let has_biography = character.get("biography").is_some_and(is_truthy);
        if !has_biography {
            return Ok(());
        }

        if let Some(biography) = character.remove("biography") {
            character.insert("backstory".to_string(), biography);
        }
        Ok(())
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn snapshot(value: Value) -> DocumentSnapshot {
        DocumentSnapshot::new(value).unwrap()
    }

    fn step() -> MoveBiographyToBackstory {
        MoveBiographyToBackstory::new("ns")
    }

    fn with_character_flag(kind: &str, key: &str, text: &str) -> DocumentSnapshot {
        let mut character = serde_json::Map::new();
        character.insert(key.to_string(), json!(text));
        snapshot(json!({"type": kind, "flags": {"ns": {"character": character}}}))
    }

    #[tokio::test]
    async fn moves_biography_to_backstory() {
        let mut doc = with_character_flag("character", "biography", "Hello");
        step().update_actor(&mut doc).await.unwrap();
        assert_eq!(
            doc,
            with_character_flag("character", "backstory", "Hello")
        );
    }

    #[tokio::test]
    async fn second_application_is_noop() {
        let mut doc = with_character_flag("character", "biography", "Hello");
        step().update_actor(&mut doc).await.unwrap();
        let once = doc.clone();
        step().update_actor(&mut doc).await.unwrap();
        assert_eq!(doc, once);
    }

    #[tokio::test]
    async fn non_character_untouched() {
        let original = snapshot(json!({"type": "starship", "flags": {}}));
        let mut doc = original.clone();
        step().update_actor(&mut doc).await.unwrap();
        assert_eq!(doc, original);
    }

    #[tokio::test]
    async fn starship_with_biography_untouched() {
        let original = with_character_flag("starship", "biography", "x");
        let mut doc = original.clone();
        step().update_actor(&mut doc).await.unwrap();
        assert_eq!(doc, original);
    }

    #[tokio::test]
    async fn empty_biography_untouched() {
        let original = with_character_flag("character", "biography", "");
        let mut doc = original.clone();
        step().update_actor(&mut doc).await.unwrap();
        assert_eq!(doc, original);
    }

    #[tokio::test]
    async fn missing_namespace_untouched() {
        let original = snapshot(json!({"type": "character", "flags": {"core": {}}}));
        let mut doc = original.clone();
        step().update_actor(&mut doc).await.unwrap();
        assert_eq!(doc, original);
    }

    #[tokio::test]
    async fn sibling_character_flags_preserved() {
        let mut doc = snapshot(json!({
            "type": "character",
            "flags": {"ns": {"character": {"biography": "Hi", "pronouns": "she/her"}}}
        }));
        step().update_actor(&mut doc).await.unwrap();
        assert_eq!(doc.get("/flags/ns/character/pronouns"), Some(&json!("she/her")));
        assert_eq!(doc.get("/flags/ns/character/backstory"), Some(&json!("Hi")));
        assert_eq!(doc.get("/flags/ns/character/biography"), None);
    }

    #[test]
    fn contract_defaults() {
        let step = step();
        assert_eq!(step.version(), SchemaVersion::new(0.1));
        assert!(!step.requires_flush());
        assert!(!step.updates_tokens());
    }
}
