//! Recursive plain-object merge over JSON documents

use serde_json::{Map, Value};

/// Key that is never merged
const PROTO_KEY: &str = "__proto__";

/// Merge `source` into `target`.
///
/// Objects merge key by key, recursively; arrays and scalars in `source`
/// replace the value in `target` wholesale. A non-object `target` is
/// replaced by an empty object first, a non-object `source` is ignored.
pub fn deep_assign(target: &mut Value, source: &Value) {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        deep_assign_map(map, source);
    }
}

/// [`deep_assign`] into an object that is already known to be one
pub fn deep_assign_map(target: &mut Map<String, Value>, source: &Value) {
    let Value::Object(source) = source else {
        return;
    };
    for (key, value) in source {
        if key == PROTO_KEY {
            continue;
        }
        if value.is_object() {
            let slot = target.entry(key.clone()).or_insert(Value::Null);
            deep_assign(slot, value);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}
