//! Dot-delimited path access over nested JSON mappings
//!
//! `get` never fails: any missing or non-object intermediate yields `None`.
//! `set` never mutates its input. The returned root shares nothing with the
//! original, and intermediates that are missing (or are not objects) along
//! the path become empty mappings.

use serde_json::{Map, Value};

/// Split a dotted path into its segments. The empty path addresses the root.
fn segments(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

/// Look up the value addressed by `path`.
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path)
        .into_iter()
        .try_fold(root, |node, key| node.as_object()?.get(key))
}

/// Return a copy of `root` with the leaf at `path` replaced by `value`.
pub fn set(root: &Value, path: &str, value: Value) -> Value {
    let mut updated = root.clone();
    set_in_place(&mut updated, &segments(path), value);
    updated
}

/// Owned variant of [`set`] for callers that are about to drop `root` anyway.
pub fn set_owned(mut root: Value, path: &str, value: Value) -> Value {
    set_in_place(&mut root, &segments(path), value);
    root
}

fn set_in_place(node: &mut Value, path: &[&str], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(head.to_string()).or_insert(Value::Null);
        set_in_place(child, rest, value);
    }
}
