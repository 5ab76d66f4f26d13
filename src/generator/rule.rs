//! Rule encoding
//!
//! Turns one profile [`Rule`] into the flat object the kernel expects. The
//! emitted key order is: `action`, the match field(s), the action fields,
//! anything merged in from a raw JSON option blob, and finally `invert`.

use log::debug;
use serde_json::{Map, Value};

use super::resolve::Resolver;
use crate::error::{Error, Result};
use crate::models::{Rule, RuleAction, RuleType};
use crate::utils::deep_assign_map;

/// Marker key an inline DNS rule carries when it only applies with fake-ip
pub const FAKE_IP_MARKER: &str = "__is_fake_ip";

/// Encodes a routing rule. Returns `Ok(None)` when the rule must be dropped.
pub fn encode_route_rule(rule: &Rule, resolver: &Resolver<'_>) -> Result<Option<Map<String, Value>>> {
    let mut encoded = Map::new();
    encoded.insert("action".to_string(), rule.action.as_str().into());
    if !encode_match(rule, resolver, &mut encoded)? {
        return Ok(None);
    }

    match rule.action {
        RuleAction::Route => {
            if let Some(tag) = resolver.outbound(&rule.outbound)? {
                encoded.insert("outbound".to_string(), tag.into());
            }
        }
        RuleAction::RouteOptions => {
            merge_json(&mut encoded, &rule.outbound, &rule.id)?;
        }
        RuleAction::Reject => {
            if is_reject_method(&rule.outbound) {
                encoded.insert("method".to_string(), rule.outbound.clone().into());
            }
        }
        RuleAction::Sniff => {
            if !rule.sniffer.is_empty() {
                encoded.insert("sniffer".to_string(), rule.sniffer.clone().into());
            }
        }
        RuleAction::Resolve => {
            if !rule.strategy.is_default() {
                encoded.insert("strategy".to_string(), rule.strategy.as_str().into());
            }
            if let Some(tag) = resolver.dns_server(&rule.server)? {
                encoded.insert("server".to_string(), tag.into());
            }
        }
        RuleAction::HijackDns | RuleAction::Predefined => {}
    }

    if rule.invert {
        encoded.insert("invert".to_string(), Value::Bool(true));
    }
    Ok(Some(encoded))
}

/// Encodes a DNS rule. `has_fakeip` tells whether the profile declares a
/// fake-ip server; inline rules tagged with [`FAKE_IP_MARKER`] are dropped
/// without one.
pub fn encode_dns_rule(
    rule: &Rule,
    resolver: &Resolver<'_>,
    has_fakeip: bool,
) -> Result<Option<Map<String, Value>>> {
    let mut encoded = Map::new();
    encoded.insert("action".to_string(), rule.action.as_str().into());
    if !encode_match(rule, resolver, &mut encoded)? {
        return Ok(None);
    }
    let fake_ip_only =
        rule.rule_type == RuleType::Inline && encoded.shift_remove(FAKE_IP_MARKER).is_some();
    if fake_ip_only && !has_fakeip {
        debug!("Dropping fake-ip DNS rule {}: no fakeip server", rule.id);
        return Ok(None);
    }

    match rule.action {
        RuleAction::Route => {
            if let Some(tag) = resolver.dns_server(&rule.server)? {
                encoded.insert("server".to_string(), tag.into());
            }
            if !rule.strategy.is_default() {
                encoded.insert("strategy".to_string(), rule.strategy.as_str().into());
            }
            if rule.disable_cache {
                encoded.insert("disable_cache".to_string(), Value::Bool(true));
            }
            if !rule.client_subnet.is_empty() {
                encoded.insert("client_subnet".to_string(), rule.client_subnet.clone().into());
            }
        }
        RuleAction::RouteOptions | RuleAction::Predefined => {
            merge_json(&mut encoded, &rule.server, &rule.id)?;
        }
        RuleAction::Reject => {
            if !rule.server.is_empty() {
                encoded.insert("method".to_string(), rule.server.clone().into());
            }
        }
        RuleAction::HijackDns | RuleAction::Sniff | RuleAction::Resolve => {}
    }

    if rule.invert {
        encoded.insert("invert".to_string(), Value::Bool(true));
    }
    Ok(Some(encoded))
}

/// Writes the match field(s) of `rule` into `out`. Returns `false` when the
/// rule references an inbound that is disabled or does not exist.
fn encode_match(rule: &Rule, resolver: &Resolver<'_>, out: &mut Map<String, Value>) -> Result<bool> {
    let field = rule.rule_type.as_str().to_string();
    match &rule.rule_type {
        RuleType::Inline => {
            merge_json(out, &rule.payload, &rule.id)?;
        }
        RuleType::RuleSet => {
            if let Some(value) = encode_rule_sets(&rule.payload, resolver)? {
                out.insert(field, value);
            }
        }
        RuleType::Inbound => match resolver.inbound(rule.payload.trim()) {
            Some(tag) => {
                out.insert(field, tag.into());
            }
            None => return Ok(false),
        },
        kind if kind.is_boolean() => {
            out.insert(field, Value::Bool(rule.payload == "true"));
        }
        kind if kind.is_enum() => {
            out.insert(field, rule.payload.clone().into());
        }
        kind if kind.is_numeric() => {
            let ports = rule
                .payload
                .split(',')
                .map(|port| {
                    port.trim()
                        .parse::<u16>()
                        .map(Value::from)
                        .map_err(|_| Error::InvalidNumber {
                            context: format!("{} of rule {}", field, rule.id),
                            value: port.to_string(),
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            out.insert(field, collapse(ports));
        }
        _ => {
            let values = rule.payload.split(',').map(Value::from).collect();
            out.insert(field, collapse(values));
        }
    }
    Ok(true)
}

/// A single id becomes a scalar tag; in a list every id keeps its position
/// and a miss becomes `null`.
fn encode_rule_sets(payload: &str, resolver: &Resolver<'_>) -> Result<Option<Value>> {
    let ids: Vec<&str> = payload
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect();
    match ids.as_slice() {
        [] => Ok(None),
        [id] => Ok(resolver.rule_set(id)?.map(Value::from)),
        _ => {
            let tags = ids
                .iter()
                .map(|id| Ok(resolver.rule_set(id)?.map_or(Value::Null, Value::from)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(Value::Array(tags)))
        }
    }
}

fn collapse(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

fn is_reject_method(method: &str) -> bool {
    matches!(method, "default" | "drop")
}

/// Parses `text` as JSON and merges it over `out`. Blank text is a no-op.
fn merge_json(out: &mut Map<String, Value>, text: &str, rule_id: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Ok(());
    }
    let value: Value =
        serde_json::from_str(text).map_err(|e| Error::json(format!("rule {}", rule_id), e))?;
    deep_assign_map(out, &value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::resolve::ReferencePolicy;
    use crate::models::{Inbound, Outbound, Profile, RuleSet, Strategy};
    use serde_json::json;

    fn profile() -> Profile {
        let mut profile = Profile::default();
        for (id, tag) in [("rs-cn", "geosite-cn"), ("rs-ads", "geosite-ads")] {
            profile.route.rule_set.push(RuleSet {
                id: id.to_string(),
                tag: tag.to_string(),
                ..Default::default()
            });
        }
        profile.outbounds.push(Outbound {
            id: "o-proxy".to_string(),
            tag: "Proxy".to_string(),
            ..Default::default()
        });
        profile.inbounds.push(Inbound {
            id: "in-tun".to_string(),
            tag: "tun-in".to_string(),
            enabled: false,
            ..Default::default()
        });
        profile.inbounds.push(Inbound {
            id: "in-mixed".to_string(),
            tag: "mixed-in".to_string(),
            ..Default::default()
        });
        profile
    }

    fn rule(rule_type: &str, payload: &str) -> Rule {
        Rule {
            id: "r".to_string(),
            rule_type: RuleType::from(rule_type.to_string()),
            payload: payload.to_string(),
            ..Default::default()
        }
    }

    fn encode(rule: &Rule, profile: &Profile) -> Value {
        let resolver = Resolver::new(profile, ReferencePolicy::Lenient);
        Value::Object(encode_route_rule(rule, &resolver).unwrap().unwrap())
    }

    #[test]
    fn test_rule_set_list_keeps_order_and_misses() {
        let profile = profile();
        let encoded = encode(&rule("rule_set", "rs-ads, missing ,rs-cn"), &profile);
        assert_eq!(encoded["rule_set"], json!(["geosite-ads", null, "geosite-cn"]));

        let encoded = encode(&rule("rule_set", "rs-cn"), &profile);
        assert_eq!(encoded["rule_set"], json!("geosite-cn"));

        let encoded = encode(&rule("rule_set", "missing"), &profile);
        assert!(encoded.get("rule_set").is_none());
    }

    #[test]
    fn test_rule_set_strict_miss_fails() {
        let profile = profile();
        let resolver = Resolver::new(&profile, ReferencePolicy::Strict);
        let result = encode_route_rule(&rule("rule_set", "rs-cn,missing"), &resolver);
        assert!(matches!(result, Err(Error::Unresolved(_))));
    }

    #[test]
    fn test_scalar_types() {
        let profile = profile();
        assert_eq!(encode(&rule("port", "80,443"), &profile)["port"], json!([80, 443]));
        assert_eq!(encode(&rule("source_port", "53"), &profile)["source_port"], json!(53));
        assert_eq!(
            encode(&rule("domain_suffix", "a.com,b.com"), &profile)["domain_suffix"],
            json!(["a.com", "b.com"])
        );
        assert_eq!(encode(&rule("domain", "a.com"), &profile)["domain"], json!("a.com"));
        assert_eq!(encode(&rule("ip_is_private", "true"), &profile)["ip_is_private"], json!(true));
        assert_eq!(encode(&rule("ip_is_private", "yes"), &profile)["ip_is_private"], json!(false));
        assert_eq!(encode(&rule("clash_mode", "Global"), &profile)["clash_mode"], json!("Global"));
    }

    #[test]
    fn test_bad_port_is_fatal() {
        let profile = profile();
        let resolver = Resolver::new(&profile, ReferencePolicy::Lenient);
        let result = encode_route_rule(&rule("port", "80,http"), &resolver);
        assert!(matches!(result, Err(Error::InvalidNumber { ref value, .. }) if value == "http"));
    }

    #[test]
    fn test_inbound_rule_dropped_when_disabled() {
        let profile = profile();
        let resolver = Resolver::new(&profile, ReferencePolicy::Strict);
        assert!(encode_route_rule(&rule("inbound", "in-tun"), &resolver)
            .unwrap()
            .is_none());
        assert!(encode_route_rule(&rule("inbound", "in-gone"), &resolver)
            .unwrap()
            .is_none());
        let kept = encode_route_rule(&rule("inbound", "in-mixed"), &resolver)
            .unwrap()
            .unwrap();
        assert_eq!(kept["inbound"], json!("mixed-in"));
    }

    #[test]
    fn test_route_action_and_invert() {
        let profile = profile();
        let mut r = rule("domain", "a.com");
        r.outbound = "o-proxy".to_string();
        r.invert = true;
        let encoded = encode(&r, &profile);
        assert_eq!(
            encoded,
            json!({"action": "route", "domain": "a.com", "outbound": "Proxy", "invert": true})
        );
        let keys: Vec<_> = encoded.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.first().map(String::as_str), Some("action"));

        r.invert = false;
        assert!(encode(&r, &profile).get("invert").is_none());
    }

    #[test]
    fn test_route_options_override_type_fields() {
        let profile = profile();
        let mut r = rule("domain", "a.com");
        r.action = RuleAction::RouteOptions;
        r.outbound = r#"{"domain": "override.com", "udp_timeout": "5m"}"#.to_string();
        let encoded = encode(&r, &profile);
        assert_eq!(encoded["domain"], json!("override.com"));
        assert_eq!(encoded["udp_timeout"], json!("5m"));
        assert_eq!(encoded["action"], json!("route-options"));
    }

    #[test]
    fn test_malformed_json_is_fatal() {
        let profile = profile();
        let resolver = Resolver::new(&profile, ReferencePolicy::Lenient);
        let mut r = rule("inline", "{not json");
        assert!(matches!(encode_route_rule(&r, &resolver), Err(Error::Json { .. })));

        r = rule("domain", "a.com");
        r.action = RuleAction::RouteOptions;
        r.outbound = "[".to_string();
        assert!(matches!(encode_route_rule(&r, &resolver), Err(Error::Json { .. })));
    }

    #[test]
    fn test_other_actions() {
        let profile = profile();
        let mut r = rule("network", "udp");
        r.action = RuleAction::Reject;
        r.outbound = "drop".to_string();
        assert_eq!(encode(&r, &profile)["method"], json!("drop"));
        r.outbound = "o-proxy".to_string();
        assert!(encode(&r, &profile).get("method").is_none());

        r.action = RuleAction::Sniff;
        r.sniffer = vec!["http".to_string(), "tls".to_string()];
        assert_eq!(encode(&r, &profile)["sniffer"], json!(["http", "tls"]));

        r.action = RuleAction::Resolve;
        r.strategy = Strategy::Ipv4Only;
        let encoded = encode(&r, &profile);
        assert_eq!(encoded["strategy"], json!("ipv4_only"));
        assert!(encoded.get("server").is_none());

        r.action = RuleAction::HijackDns;
        assert_eq!(encode(&r, &profile), json!({"action": "hijack-dns", "network": "udp"}));
    }

    #[test]
    fn test_dns_fake_ip_marker() {
        let profile = profile();
        let resolver = Resolver::new(&profile, ReferencePolicy::Lenient);
        let r = rule("inline", r#"{"__is_fake_ip": true, "query_type": ["A", "AAAA"]}"#);
        assert!(encode_dns_rule(&r, &resolver, false).unwrap().is_none());

        let encoded = encode_dns_rule(&r, &resolver, true).unwrap().unwrap();
        assert!(encoded.get(FAKE_IP_MARKER).is_none());
        assert_eq!(encoded["query_type"], json!(["A", "AAAA"]));
    }

    #[test]
    fn test_dns_actions() {
        let mut profile = profile();
        profile.dns.servers.push(crate::models::DnsServer {
            id: "dns-remote".to_string(),
            tag: "remote".to_string(),
            ..Default::default()
        });
        let resolver = Resolver::new(&profile, ReferencePolicy::Lenient);

        let mut r = rule("rule_set", "rs-cn");
        r.server = "dns-remote".to_string();
        r.disable_cache = true;
        r.client_subnet = "1.2.3.0/24".to_string();
        let encoded = encode_dns_rule(&r, &resolver, false).unwrap().unwrap();
        assert_eq!(
            Value::Object(encoded),
            json!({
                "action": "route",
                "rule_set": "geosite-cn",
                "server": "remote",
                "disable_cache": true,
                "client_subnet": "1.2.3.0/24"
            })
        );

        r.action = RuleAction::Predefined;
        r.server = r#"{"rcode": "NXDOMAIN"}"#.to_string();
        let encoded = encode_dns_rule(&r, &resolver, false).unwrap().unwrap();
        assert_eq!(encoded["rcode"], json!("NXDOMAIN"));

        r.action = RuleAction::Reject;
        r.server = "drop".to_string();
        let encoded = encode_dns_rule(&r, &resolver, false).unwrap().unwrap();
        assert_eq!(encoded["method"], json!("drop"));
    }
}
