use serde_json::{Map, Value};

use crate::models::{Inbound, InboundType};

/// Encodes the enabled inbounds, in declaration order
pub fn generate_inbounds(inbounds: &[Inbound]) -> Vec<Value> {
    inbounds
        .iter()
        .filter(|inbound| inbound.enabled)
        .map(encode_inbound)
        .collect()
}

fn encode_inbound(inbound: &Inbound) -> Value {
    let mut encoded = Map::new();
    encoded.insert("type".to_string(), inbound.inbound_type.as_str().into());
    encoded.insert("tag".to_string(), inbound.tag.clone().into());

    if inbound.inbound_type == InboundType::Tun {
        if let Some(tun) = &inbound.tun {
            encoded.extend(tun.clone());
        }
        return Value::Object(encoded);
    }

    let mut users = Vec::new();
    if let Some(settings) = inbound.listen_settings() {
        encoded.extend(settings.listen.clone());
        users = settings.users.iter().map(|user| encode_user(user)).collect();
    }
    encoded.insert("users".to_string(), Value::Array(users));
    Value::Object(encoded)
}

/// `user:password`, split at the first colon
fn encode_user(user: &str) -> Value {
    let mut encoded = Map::new();
    match user.split_once(':') {
        Some((username, password)) => {
            encoded.insert("username".to_string(), username.into());
            encoded.insert("password".to_string(), password.into());
        }
        None => {
            encoded.insert("username".to_string(), user.into());
        }
    }
    Value::Object(encoded)
}
