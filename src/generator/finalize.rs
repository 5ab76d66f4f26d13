use log::warn;
use serde_json::{Map, Value};

/// Cache file location every compiled configuration uses
pub const CACHE_FILE_PATH: &str = "cache.db";

/// Log levels passed through to the kernel, anything else becomes `info`
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

const DEFAULT_LOG_LEVEL: &str = "info";

/// Post-conditions of every compilation, whatever the earlier stages did:
/// logging enabled on the default output with a known level, and the cache
/// file at [`CACHE_FILE_PATH`].
pub fn enforce_invariants(config: &mut Value) {
    if !config.is_object() {
        *config = Value::Object(Map::new());
    }
    let Value::Object(root) = config else {
        return;
    };

    let mut log = take_object(root, "log");
    log.insert("disabled".to_string(), Value::Bool(false));
    log.insert("output".to_string(), Value::String(String::new()));
    let level = log.get("level").and_then(Value::as_str).unwrap_or_default();
    if !LOG_LEVELS.contains(&level) {
        if !level.is_empty() {
            warn!("Unsupported log level `{}`, using {}", level, DEFAULT_LOG_LEVEL);
        }
        log.insert("level".to_string(), DEFAULT_LOG_LEVEL.into());
    }
    root.insert("log".to_string(), Value::Object(log));

    let mut experimental = take_object(root, "experimental");
    let mut cache_file = take_object(&mut experimental, "cache_file");
    cache_file.insert("path".to_string(), CACHE_FILE_PATH.into());
    experimental.insert("cache_file".to_string(), Value::Object(cache_file));
    root.insert("experimental".to_string(), Value::Object(experimental));
}

/// Moves the object under `key` out of `map`; a missing key or a non-object
/// value yields an empty object. The key keeps its position when re-inserted.
fn take_object(map: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match map.get_mut(key).map(Value::take) {
        Some(Value::Object(inner)) => inner,
        _ => Map::new(),
    }
}
