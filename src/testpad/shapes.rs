//! Compatibility shims for Testpad's inconsistent response envelopes.
//!
//! The same endpoint may answer with a bare value or with the value wrapped
//! under a named key, depending on API version and query flags. Each shim is
//! an ordered list of extraction strategies; the first one that matches wins.

use serde_json::Value;

use super::model::FolderNode;

type IdStrategy = fn(&Value) -> Option<&Value>;

/// A whole response body is only taken as an id when it looks like one, so a
/// bare status string such as `"Created"` is not mistaken for it.
fn bare_id(value: &Value) -> Option<&Value> {
    match value {
        Value::Number(_) => Some(value),
        Value::String(s) if s.trim().parse::<u64>().is_ok() => Some(value),
        _ => None,
    }
}

/// Where a creation endpoint may have put the new object's id.
const CREATED_ID_STRATEGIES: &[(&str, IdStrategy)] = &[
    ("bare", bare_id),
    ("id", |v| v.get("id")),
    ("script", |v| v.get("script")?.get("id")),
    ("folder", |v| v.get("folder")?.get("id")),
    ("data", |v| v.get("data")?.get("id")),
];

fn id_value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Pull the id of a newly created resource out of a creation response.
pub fn extract_created_id(response: &Value) -> Option<String> {
    CREATED_ID_STRATEGIES
        .iter()
        .find_map(|(_, strategy)| strategy(response).and_then(id_value_to_string))
}

/// Unwrap a list endpoint that returns either `[...]` or `{ "<key>": [...] }`.
pub fn extract_list<'a>(response: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    response
        .as_array()
        .or_else(|| response.get(key).and_then(Value::as_array))
}

/// Unwrap a single-object endpoint that returns either the object itself or
/// `{ "<key>": {...} }`.
pub fn extract_object<'a>(response: &'a Value, key: &str) -> &'a Value {
    match response.get(key) {
        Some(inner) if inner.is_object() => inner,
        _ => response,
    }
}

/// Folder endpoints answer with `{ "folder": { ..., "contents": [...] } }`
/// or, for the project root, `{ "folders": [...] }`.
pub fn extract_folder(response: &Value) -> Option<Result<FolderNode, serde_json::Error>> {
    if let Some(folder) = response.get("folder") {
        if folder.get("contents").is_some_and(Value::is_array) {
            return Some(serde_json::from_value(folder.clone()));
        }
    }
    if let Some(items) = response.get("folders").and_then(Value::as_array) {
        let children = items
            .iter()
            .map(|item| serde_json::from_value(item.clone()))
            .collect::<Result<Vec<FolderNode>, _>>();
        return Some(children.map(FolderNode::root));
    }
    None
}
