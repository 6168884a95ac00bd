//! JSON pointer helpers over a document root map

use crate::error::DocumentError;
use serde_json::{Map, Value};

/// Split a pointer (`/flags/ns/key`) into unescaped reference tokens
pub(crate) fn tokens(pointer: &str) -> Result<Vec<String>, DocumentError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let rest = pointer
        .strip_prefix('/')
        .ok_or_else(|| DocumentError::InvalidPointer(pointer.to_string()))?;
    Ok(rest
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn child<'a>(value: &'a Value, token: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(token),
        Value::Array(items) => token.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn child_mut<'a>(value: &'a mut Value, token: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(token),
        Value::Array(items) => token.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    }
}

pub(crate) fn get<'a>(root: &'a Map<String, Value>, pointer: &str) -> Option<&'a Value> {
    let tokens = tokens(pointer).ok()?;
    let (first, rest) = tokens.split_first()?;
    rest.iter()
        .try_fold(root.get(first.as_str())?, |value, token| child(value, token))
}

pub(crate) fn get_mut<'a>(
    root: &'a mut Map<String, Value>,
    pointer: &str,
) -> Option<&'a mut Value> {
    let tokens = tokens(pointer).ok()?;
    let (first, rest) = tokens.split_first()?;
    let mut current = root.get_mut(first.as_str())?;
    for token in rest {
        current = child_mut(current, token)?;
    }
    Some(current)
}

/// Set a value, creating missing intermediate objects
pub(crate) fn set(
    root: &mut Map<String, Value>,
    pointer: &str,
    value: Value,
) -> Result<Option<Value>, DocumentError> {
    let tokens = tokens(pointer)?;
    let Some((last, parents)) = tokens.split_last() else {
        return Err(DocumentError::InvalidPointer(pointer.to_string()));
    };

    let mut map = root;
    let mut walked = String::new();
    for token in parents {
        walked.push('/');
        walked.push_str(token);
        let entry = map
            .entry(token.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        map = entry
            .as_object_mut()
            .ok_or_else(|| DocumentError::not_a_container(walked.clone()))?;
    }
    Ok(map.insert(last.clone(), value))
}

pub(crate) fn remove(root: &mut Map<String, Value>, pointer: &str) -> Option<Value> {
    let tokens = tokens(pointer).ok()?;
    let (last, parents) = tokens.split_last()?;
    if parents.is_empty() {
        return root.remove(last.as_str());
    }
    let parent_pointer: String = parents.iter().map(|t| format!("/{}", escape(t))).collect();
    match get_mut(root, &parent_pointer)? {
        Value::Object(map) => map.remove(last.as_str()),
        Value::Array(items) => {
            let index = last.parse::<usize>().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}

fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
