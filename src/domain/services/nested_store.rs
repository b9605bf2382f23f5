//! Nested store - path-addressed access over JSON-like trees
//!
//! Almost every configuration layer is optional, so reads here are total:
//! a missing key, or an intermediate value that is not a mapping, simply
//! yields `None` and the caller supplies its own default. Writes come in two
//! flavours, one that builds the path and one that only touches keys that
//! already exist (used on workflow instances, where inventing inputs would
//! produce a graph the server rejects).

use serde_json::{Map, Value};

/// Look up `path` under `root`.
///
/// Returns `None` unless every segment but the last resolves to a mapping and
/// the final key exists on it. An empty path is never found.
pub fn get<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let (last, parents) = path.split_last()?;
    let mut current = root;
    for key in parents {
        current = current.as_object()?.get(*key)?;
    }
    current.as_object()?.get(*last)
}

/// [`get`] with a caller supplied default
pub fn get_or<'a>(root: &'a Value, path: &[&str], default: &'a Value) -> &'a Value {
    get(root, path).unwrap_or(default)
}

/// Mutable counterpart of [`get`]
pub fn get_mut<'a>(root: &'a mut Value, path: &[&str]) -> Option<&'a mut Value> {
    let (last, parents) = path.split_last()?;
    let mut current = root;
    for key in parents {
        current = current.as_object_mut()?.get_mut(*key)?;
    }
    current.as_object_mut()?.get_mut(*last)
}

/// Set `value` at `path`, creating intermediate mappings as needed.
///
/// Non-mapping values found on the way (including a non-mapping root) are
/// replaced by mappings. An empty path leaves `root` untouched.
pub fn set_create(root: &mut Value, value: Value, path: &[&str]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for key in parents {
        current = ensure_object(current)
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(current).insert(last.to_string(), value);
}

/// Set `value` at `path` only if the full path already exists.
///
/// Never creates keys. Returns whether the tree was modified.
pub fn set_if_exists(root: &mut Value, value: Value, path: &[&str]) -> bool {
    match get_mut(root, path) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}

/// Remove the final key of `path`, returning its value when it was present
pub fn remove(root: &mut Value, path: &[&str]) -> Option<Value> {
    let (last, parents) = path.split_last()?;
    let parent = if parents.is_empty() {
        root
    } else {
        get_mut(root, parents)?
    };
    parent.as_object_mut()?.shift_remove(*last)
}

/// Recursively merge `overlay` into `target`.
///
/// Mappings merge key by key; any other overlay value replaces what the
/// target held at that position (last writer wins at the leaves). A `null`
/// overlay leaves the target untouched.
pub fn deep_merge(target: &mut Value, overlay: &Value) {
    match overlay {
        Value::Null => {}
        Value::Object(entries) => {
            let target_map = ensure_object(target);
            for (key, value) in entries {
                match value {
                    Value::Object(_) => {
                        let slot = target_map
                            .entry(key.clone())
                            .or_insert_with(|| Value::Object(Map::new()));
                        deep_merge(slot, value);
                    }
                    _ => {
                        target_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

/// Deep-merge `source[key]` into `target[key]`, inserting it when absent.
///
/// Does nothing when `source` has no such key.
pub fn merge_key(target: &mut Value, source: &Value, key: &str) {
    let Some(incoming) = get(source, &[key]) else {
        return;
    };

    let target_map = ensure_object(target);
    match target_map.get_mut(key) {
        Some(existing) => deep_merge(existing, incoming),
        None => {
            target_map.insert(key.to_string(), incoming.clone());
        }
    }
}

/// Loose truthiness used by optional configuration switches: `null`,
/// `false`, zero and empty strings/collections are all "unset"
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    }
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced by an object"),
    }
}
