use log::warn;
use serde_json::{Map, Value};

use super::resolve::Resolver;
use super::rule::encode_route_rule;
use crate::error::{Error, Result};
use crate::models::{Route, RuleSet, RuleSetType, RulesetFile};

/// Rewrites a data-relative rule-set path so it is relative to the kernel
/// working directory
fn kernel_relative(path: &str) -> String {
    path.replacen("data/", "../", 1)
}

/// Encodes the route block.
///
/// `rulesets` is the rule-set store index used to locate `local` rule-sets.
pub fn generate_route(
    route: &Route,
    resolver: &Resolver<'_>,
    rulesets: &[RulesetFile],
) -> Result<Value> {
    let mut rules = Vec::with_capacity(route.rules.len());
    for rule in &route.rules {
        if let Some(encoded) = encode_route_rule(rule, resolver)? {
            rules.push(Value::Object(encoded));
        }
    }

    let rule_set = route
        .rule_set
        .iter()
        .map(|ruleset| encode_rule_set(ruleset, resolver, rulesets))
        .collect::<Result<Vec<_>>>()?;

    let mut encoded = Map::new();
    encoded.insert("rules".to_string(), Value::Array(rules));
    encoded.insert("rule_set".to_string(), Value::Array(rule_set));
    encoded.insert(
        "auto_detect_interface".to_string(),
        route.auto_detect_interface.into(),
    );
    if let Some(tag) = resolver.outbound(&route.final_outbound)? {
        encoded.insert("final".to_string(), tag.into());
    }
    if !route.auto_detect_interface {
        encoded.insert(
            "default_interface".to_string(),
            route.default_interface.clone().into(),
        );
    }
    if route.find_process {
        encoded.insert("find_process".to_string(), Value::Bool(true));
    }
    let domain_resolver = &route.default_domain_resolver;
    if let Some(server) = resolver.dns_server(&domain_resolver.server)? {
        let mut default_resolver = Map::new();
        default_resolver.insert("server".to_string(), server.into());
        if !domain_resolver.client_subnet.is_empty() {
            default_resolver.insert(
                "client_subnet".to_string(),
                domain_resolver.client_subnet.clone().into(),
            );
        }
        encoded.insert(
            "default_domain_resolver".to_string(),
            Value::Object(default_resolver),
        );
    }
    Ok(Value::Object(encoded))
}

fn encode_rule_set(
    ruleset: &RuleSet,
    resolver: &Resolver<'_>,
    rulesets: &[RulesetFile],
) -> Result<Value> {
    let mut encoded = Map::new();
    encoded.insert("tag".to_string(), ruleset.tag.clone().into());
    encoded.insert("type".to_string(), ruleset.ruleset_type.as_str().into());

    match ruleset.ruleset_type {
        RuleSetType::Inline => {
            let rules: Value = serde_json::from_str(&ruleset.rules)
                .map_err(|e| Error::json(format!("inline rule-set {}", ruleset.tag), e))?;
            encoded.insert("rules".to_string(), rules);
        }
        RuleSetType::Local => {
            match rulesets.iter().find(|file| file.id == ruleset.path) {
                Some(file) => {
                    encoded.insert("path".to_string(), kernel_relative(&file.path).into());
                }
                None => warn!(
                    "Rule-set [{}] points at unknown local rule-set `{}`",
                    ruleset.tag, ruleset.path
                ),
            }
            encoded.insert("format".to_string(), ruleset.format.clone().into());
        }
        RuleSetType::Remote => {
            encoded.insert("url".to_string(), ruleset.url.clone().into());
            encoded.insert("format".to_string(), ruleset.format.clone().into());
            if let Some(tag) = resolver.outbound(&ruleset.download_detour)? {
                encoded.insert("download_detour".to_string(), tag.into());
            }
            if !ruleset.update_interval.is_empty() {
                encoded.insert(
                    "update_interval".to_string(),
                    ruleset.update_interval.clone().into(),
                );
            }
        }
    }
    Ok(Value::Object(encoded))
}
