use serde_json::{Map, Value};

use super::resolve::Resolver;
use crate::error::Result;
use crate::models::Experimental;

/// Copies the runtime settings, resolving the UI download detour
pub fn generate_experimental(experimental: &Experimental, resolver: &Resolver<'_>) -> Result<Value> {
    let mut clash_api = experimental.clash_api.extra.clone();
    if let Some(tag) = resolver.outbound(&experimental.clash_api.external_ui_download_detour)? {
        clash_api.insert("external_ui_download_detour".to_string(), tag.into());
    }

    let mut encoded = Map::new();
    encoded.insert("clash_api".to_string(), Value::Object(clash_api));
    encoded.insert(
        "cache_file".to_string(),
        Value::Object(experimental.cache_file.clone()),
    );
    Ok(Value::Object(encoded))
}
