//! Subscription ingestion
//!
//! Turns a fetched subscription body into the proxy array stored at the
//! subscription's `path`, running the `on::subscribe` plugins and the
//! subscription's own script on the way.

use std::collections::HashSet;
use std::time::Duration;

use log::{debug, info};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::{ProxyIndex, Subscription, SubscriptionKind};
use crate::plugins::{Invocation, PluginHost, ScriptEngine, ScriptError};
use crate::utils::base64::is_valid_base64;
use crate::utils::TagMatcher;
use crate::vfs::VirtualFileSystem;

/// Function a subscription script must define
pub const SUBSCRIBE_HANDLER: &str = "onSubscribe";

const NOT_SUBSCRIPTION: &str = "Not a valid subscription data";
const NEEDS_CONVERSION: &str =
    "Proxies still need converting to kernel outbounds, install a conversion plugin first";

/// Detects the body format and extracts the proxy entries.
///
/// Tried in order: a JSON object with an `outbounds` array, a YAML mapping
/// with a `proxies` sequence, Base64 text (kept whole as a single
/// `{"base64": body}` entry for a conversion plugin), and finally, for
/// manual subscriptions only, a bare JSON array.
pub fn parse_subscription_body(body: &str, kind: SubscriptionKind) -> Result<Vec<Value>> {
    if let Ok(Value::Object(mut document)) = serde_json::from_str::<Value>(body) {
        if let Some(Value::Array(outbounds)) = document.remove("outbounds") {
            debug!("Detected kernel JSON subscription");
            return Ok(outbounds);
        }
    }
    if let Ok(Value::Object(mut document)) = serde_yaml::from_str::<Value>(body) {
        if let Some(Value::Array(proxies)) = document.remove("proxies") {
            debug!("Detected YAML subscription");
            return Ok(proxies);
        }
    }
    if is_valid_base64(body) {
        debug!("Detected Base64 subscription");
        return Ok(vec![serde_json::json!({ "base64": body })]);
    }
    if kind == SubscriptionKind::Manual {
        return serde_json::from_str(body).map_err(|e| Error::json("manual subscription", e));
    }
    Err(Error::InvalidSubscription(NOT_SUBSCRIPTION.to_string()))
}

/// Fails while entries are not yet kernel outbounds
pub fn ensure_converted(proxies: &[Value]) -> Result<()> {
    let unconverted = proxies
        .iter()
        .any(|proxy| proxy.get("name").is_some() && proxy.get("tag").is_none());
    let encoded = proxies
        .first()
        .is_some_and(|proxy| proxy.get("base64").is_some());
    if unconverted || encoded {
        return Err(Error::InvalidSubscription(NEEDS_CONVERSION.to_string()));
    }
    Ok(())
}

/// Applies the tag/type filters and the tag prefix of a non-manual
/// subscription
pub fn filter_proxies(proxies: Vec<Value>, subscription: &Subscription) -> Result<Vec<Value>> {
    let filter_error = |(field, source): (&'static str, regex::Error)| Error::Filter {
        owner: subscription.name.clone(),
        field,
        source,
    };
    let tags = TagMatcher::smart(&subscription.include, &subscription.exclude)
        .map_err(filter_error)?;
    let types = TagMatcher::smart(&subscription.include_protocol, &subscription.exclude_protocol)
        .map_err(|(field, source)| Error::Filter {
            owner: subscription.name.clone(),
            field: if field == "include" {
                "include_protocol"
            } else {
                "exclude_protocol"
            },
            source,
        })?;

    let prefix = subscription.proxy_prefix.as_str();
    let kept = proxies
        .into_iter()
        .filter(|proxy| tags.is_match(field(proxy, "tag")) && types.is_match(field(proxy, "type")))
        .map(|mut proxy| {
            if !prefix.is_empty() {
                let tag = field(&proxy, "tag");
                if !tag.starts_with(prefix) {
                    proxy["tag"] = Value::String(format!("{}{}", prefix, tag));
                }
            }
            proxy
        })
        .collect();
    Ok(kept)
}

fn field<'v>(proxy: &'v Value, key: &str) -> &'v str {
    proxy.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Rebuilds the `{id, tag, type}` index, keeping the id of every tag that
/// was already known
pub fn refresh_index(subscription: &mut Subscription, proxies: &[Value]) {
    let mut used: HashSet<String> = subscription.proxies.iter().map(|p| p.id.clone()).collect();
    let mut counter = 0usize;
    let mut index = Vec::with_capacity(proxies.len());

    for proxy in proxies {
        let tag = field(proxy, "tag");
        let id = match subscription.proxy_index_id(tag) {
            Some(id) => id.to_string(),
            None => loop {
                counter += 1;
                let candidate = format!("{}-{}", subscription.id, counter);
                if used.insert(candidate.clone()) {
                    break candidate;
                }
            },
        };
        index.push(ProxyIndex {
            id,
            tag: tag.to_string(),
            proxy_type: field(proxy, "type").to_string(),
        });
    }
    subscription.proxies = index;
}

/// Runs the subscription script's `onSubscribe(proxies, subscription)`.
///
/// The script answers with `{proxies, subscription}`. The returned
/// subscription is merged key by key over the current one and the returned
/// proxies replace the list. Blank script text leaves both untouched.
pub async fn run_subscription_script<E: ScriptEngine>(
    engine: &E,
    subscription: &mut Subscription,
    proxies: Vec<Value>,
    deadline: Duration,
) -> Result<Vec<Value>> {
    if subscription.script.trim().is_empty() {
        return Ok(proxies);
    }
    debug!("Running script of subscription [{}]", subscription.name);
    let current = match serde_json::to_value(&*subscription) {
        Ok(Value::Object(map)) => map,
        Ok(_) => Map::new(),
        Err(e) => return Err(Error::json("subscription", e)),
    };
    let invocation = Invocation {
        owner: &subscription.id,
        name: &subscription.name,
        code: &subscription.script,
        handler: SUBSCRIBE_HANDLER,
        plugin: None,
        args: vec![Value::Array(proxies), Value::Object(current.clone())],
    };
    let result = tokio::time::timeout(deadline, engine.invoke(invocation))
        .await
        .map_err(|_| ScriptError::Timeout(deadline))??;

    let Value::Object(mut result) = result else {
        return Err(Error::WrongResult);
    };
    let (Some(Value::Array(proxies)), Some(Value::Object(returned))) =
        (result.remove("proxies"), result.remove("subscription"))
    else {
        return Err(Error::WrongResult);
    };
    let mut merged = current;
    merged.extend(returned);
    let updated: Subscription = serde_json::from_value(Value::Object(merged)).map_err(|e| {
        Error::json(format!("subscription returned by {}", subscription.name), e)
    })?;
    *subscription = updated;
    Ok(proxies)
}

/// Full ingestion of one fetched body: detection, `on::subscribe`
/// plugins, filters, the subscription script, storage and index refresh
pub async fn ingest_subscription<E, F>(
    host: &PluginHost<E>,
    vfs: &F,
    subscription: &mut Subscription,
    body: &str,
) -> Result<Vec<Value>>
where
    E: ScriptEngine,
    F: VirtualFileSystem,
{
    let proxies = parse_subscription_body(body, subscription.kind)?;
    let proxies = host.on_subscribe(proxies, subscription).await?;
    ensure_converted(&proxies)?;

    let proxies = if subscription.kind == SubscriptionKind::Manual {
        proxies
    } else {
        filter_proxies(proxies, subscription)?
    };

    // the script sees an index that already matches the filtered list
    refresh_index(subscription, &proxies);
    let proxies =
        run_subscription_script(host.engine(), subscription, proxies, host.deadline()).await?;
    refresh_index(subscription, &proxies);

    let text = serde_json::to_string_pretty(&proxies)
        .map_err(|e| Error::json(format!("proxies of {}", subscription.name), e))?;
    vfs.write_file(&subscription.path, text.into_bytes()).await?;
    info!(
        "Subscription [{}] updated with {} proxies",
        subscription.name,
        proxies.len()
    );
    Ok(proxies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{NativeEngine, PluginRegistry};
    use crate::vfs::MemoryFs;
    use base64::{engine::general_purpose, Engine as _};
    use serde_json::json;

    #[test]
    fn test_detection_order() {
        let json_body = r#"{"outbounds": [{"tag": "a", "type": "vmess"}]}"#;
        assert_eq!(
            parse_subscription_body(json_body, SubscriptionKind::Http).unwrap(),
            vec![json!({"tag": "a", "type": "vmess"})]
        );

        let yaml_body = "proxies:\n  - name: a\n    type: ss\n";
        assert_eq!(
            parse_subscription_body(yaml_body, SubscriptionKind::Http).unwrap(),
            vec![json!({"name": "a", "type": "ss"})]
        );

        let encoded = general_purpose::STANDARD.encode("ss://abc");
        assert_eq!(
            parse_subscription_body(&encoded, SubscriptionKind::Http).unwrap(),
            vec![json!({ "base64": encoded })]
        );

        let manual = r#"[{"tag": "m", "type": "direct"}]"#;
        assert_eq!(
            parse_subscription_body(manual, SubscriptionKind::Manual).unwrap(),
            vec![json!({"tag": "m", "type": "direct"})]
        );
        let err = parse_subscription_body(manual, SubscriptionKind::Http).unwrap_err();
        assert_eq!(err.to_string(), NOT_SUBSCRIPTION);
    }

    #[test]
    fn test_ensure_converted() {
        assert!(ensure_converted(&[json!({"tag": "a"})]).is_ok());
        assert!(ensure_converted(&[]).is_ok());
        assert!(ensure_converted(&[json!({"name": "a"})]).is_err());
        assert!(ensure_converted(&[json!({"base64": "YQ=="})]).is_err());
    }

    #[test]
    fn test_filter_proxies() {
        let subscription = Subscription {
            name: "Provider".to_string(),
            include: "HK|JP".to_string(),
            exclude: "/iplc/i".to_string(),
            exclude_protocol: "^http$".to_string(),
            proxy_prefix: "P-".to_string(),
            ..Default::default()
        };
        let proxies = vec![
            json!({"tag": "HK 01", "type": "vmess"}),
            json!({"tag": "HK IPLC", "type": "vmess"}),
            json!({"tag": "JP 01", "type": "http"}),
            json!({"tag": "P-JP 02", "type": "trojan"}),
            json!({"tag": "US 01", "type": "vmess"}),
        ];
        let kept = filter_proxies(proxies, &subscription).unwrap();
        assert_eq!(
            kept,
            vec![
                json!({"tag": "P-HK 01", "type": "vmess"}),
                json!({"tag": "P-JP 02", "type": "trojan"}),
            ]
        );

        let bad = Subscription {
            include_protocol: "(".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            filter_proxies(Vec::new(), &bad),
            Err(Error::Filter { field: "include_protocol", .. })
        ));
    }

    fn scripted(script: &str) -> Subscription {
        Subscription {
            id: "sub".to_string(),
            name: "Provider".to_string(),
            kind: SubscriptionKind::Manual,
            path: "data/subscribes/sub.json".to_string(),
            script: script.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ingest_runs_subscription_script() {
        let engine = NativeEngine::new().with_fn("sub", SUBSCRIBE_HANDLER, |call| {
            let mut proxies = call.args[0].as_array().cloned().unwrap_or_default();
            // the index is already in place when the script runs
            assert_eq!(call.args[1]["proxies"][0]["tag"], json!("a"));
            proxies.push(json!({"tag": "extra", "type": "direct"}));
            Ok(json!({
                "proxies": proxies,
                "subscription": {"name": "Renamed", "proxyPrefix": "X-"}
            }))
        });
        let host = PluginHost::new(PluginRegistry::default(), engine);
        let vfs = MemoryFs::new();
        let mut subscription = scripted("const onSubscribe = async (p, s) => ({ proxies: p, subscription: s })");

        let proxies = ingest_subscription(
            &host,
            &vfs,
            &mut subscription,
            r#"[{"tag": "a", "type": "vmess"}]"#,
        )
        .await
        .unwrap();

        assert_eq!(proxies.len(), 2);
        assert_eq!(subscription.name, "Renamed");
        assert_eq!(subscription.proxy_prefix, "X-");
        assert_eq!(subscription.path, "data/subscribes/sub.json");
        let tags: Vec<&str> = subscription.proxies.iter().map(|p| p.tag.as_str()).collect();
        assert_eq!(tags, vec!["a", "extra"]);
        let stored: Vec<Value> =
            serde_json::from_str(&vfs.read_text("data/subscribes/sub.json").await.unwrap())
                .unwrap();
        assert_eq!(stored, proxies);
    }

    #[tokio::test]
    async fn test_subscription_script_result_shape() {
        let engine = NativeEngine::new()
            .with_fn("sub", SUBSCRIBE_HANDLER, |call| Ok(call.args[0].clone()));
        let mut subscription = scripted("const onSubscribe = (p) => p");
        let err = run_subscription_script(
            &engine,
            &mut subscription,
            vec![json!({"tag": "a"})],
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Wrong result");

        // blank script is never invoked
        let mut plain = scripted("  ");
        let kept = run_subscription_script(
            &NativeEngine::new(),
            &mut plain,
            vec![json!({"tag": "a"})],
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(kept, vec![json!({"tag": "a"})]);
    }

    #[test]
    fn test_refresh_index_keeps_ids() {
        let mut subscription = Subscription {
            id: "sub".to_string(),
            proxies: vec![
                ProxyIndex {
                    id: "keep-me".to_string(),
                    tag: "A".to_string(),
                    proxy_type: "vmess".to_string(),
                },
                ProxyIndex {
                    id: "sub-1".to_string(),
                    tag: "gone".to_string(),
                    proxy_type: "ss".to_string(),
                },
            ],
            ..Default::default()
        };
        refresh_index(
            &mut subscription,
            &[json!({"tag": "B", "type": "ss"}), json!({"tag": "A", "type": "trojan"})],
        );
        assert_eq!(
            subscription.proxies,
            vec![
                ProxyIndex {
                    id: "sub-2".to_string(),
                    tag: "B".to_string(),
                    proxy_type: "ss".to_string(),
                },
                ProxyIndex {
                    id: "keep-me".to_string(),
                    tag: "A".to_string(),
                    proxy_type: "trojan".to_string(),
                },
            ]
        );
    }
}
