//! Outbound set compilation
//!
//! Expands group membership into tag lists and collects every proxy a group
//! picked out of a subscription, so the kernel receives each proxy exactly
//! once after the declared outbounds.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use futures::future::try_join_all;
use log::{debug, warn};
use serde_json::{json, Map, Value};

use super::resolve::Resolver;
use crate::error::{Error, Result};
use crate::models::{MemberSource, Outbound, OutboundType};
use crate::utils::TagMatcher;

/// Source of materialized subscription proxy lists
pub trait ProxyProvider {
    /// The proxy objects of a subscription, in stored order
    fn load_proxies(&self, subscription_id: &str) -> impl Future<Output = Result<Vec<Value>>>;

    /// Tag of one proxy of a subscription, looked up by its index id
    fn proxy_tag(&self, subscription_id: &str, proxy_id: &str) -> Option<String>;
}

/// Proxy lists loaded for one compilation, keyed by subscription id
type ProxyCache<'a> = HashMap<&'a str, Vec<Value>>;

/// Compiles the declared outbounds followed by the referenced proxies.
///
/// Synthetic built-ins are only recorded on `resolver`; the caller appends
/// them once every stage-1 generator had a chance to reference them.
pub async fn generate_outbounds<P: ProxyProvider>(
    outbounds: &[Outbound],
    resolver: &Resolver<'_>,
    provider: &P,
) -> Result<Vec<Value>> {
    let cache = prefetch(outbounds, provider).await?;
    let mut referenced = ReferencedProxies::default();
    let mut result = Vec::with_capacity(outbounds.len());

    for outbound in outbounds {
        let mut encoded = Map::new();
        encoded.insert("type".to_string(), outbound.outbound_type.as_str().into());
        encoded.insert("tag".to_string(), outbound.tag.clone().into());
        if outbound.outbound_type == OutboundType::Urltest {
            encoded.insert("url".to_string(), outbound.url.clone().into());
            encoded.insert("interval".to_string(), outbound.interval.clone().into());
            encoded.insert("tolerance".to_string(), outbound.tolerance.into());
        }
        if outbound.outbound_type.is_group() {
            encoded.insert(
                "interrupt_exist_connections".to_string(),
                outbound.interrupt_exist_connections.into(),
            );
            let members = expand_members(outbound, resolver, provider, &cache, &mut referenced)?;
            encoded.insert("outbounds".to_string(), members.into());
        }
        result.push(Value::Object(encoded));
    }

    debug!(
        "Compiled {} outbounds and {} referenced proxies",
        result.len(),
        referenced.order.len()
    );
    for (subscription, index) in referenced.order {
        if let Some(proxy) = cache.get(subscription).and_then(|proxies| proxies.get(index)) {
            result.push(proxy.clone());
        }
    }
    Ok(result)
}

/// Proxies referenced so far, deduplicated by position in their subscription
#[derive(Default)]
struct ReferencedProxies<'a> {
    seen: HashSet<(&'a str, usize)>,
    order: Vec<(&'a str, usize)>,
}

impl<'a> ReferencedProxies<'a> {
    fn add(&mut self, subscription: &'a str, index: usize) {
        if self.seen.insert((subscription, index)) {
            self.order.push((subscription, index));
        }
    }
}

/// Loads every distinct subscription referenced by a group member, once
async fn prefetch<'a, P: ProxyProvider>(
    outbounds: &'a [Outbound],
    provider: &P,
) -> Result<ProxyCache<'a>> {
    let mut ids: Vec<&'a str> = Vec::new();
    for outbound in outbounds.iter().filter(|o| o.outbound_type.is_group()) {
        for id in outbound.members.iter().filter_map(|m| m.subscription_id()) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    let loaded = try_join_all(ids.into_iter().map(|id| async move {
        let proxies = provider.load_proxies(id).await?;
        debug!("Loaded {} proxies of subscription {}", proxies.len(), id);
        Ok::<_, Error>((id, proxies))
    }))
    .await?;
    Ok(loaded.into_iter().collect())
}

fn expand_members<'a, P: ProxyProvider>(
    outbound: &'a Outbound,
    resolver: &Resolver<'_>,
    provider: &P,
    cache: &ProxyCache<'a>,
    referenced: &mut ReferencedProxies<'a>,
) -> Result<Vec<String>> {
    let matcher = TagMatcher::new(&outbound.include, &outbound.exclude).map_err(|(field, source)| {
        Error::Filter {
            owner: outbound.tag.clone(),
            field,
            source,
        }
    })?;
    let mut members = Vec::new();

    for member in &outbound.members {
        match member.source() {
            MemberSource::BuiltIn => match resolver.outbound(&member.id)? {
                Some(tag) => members.push(tag.to_string()),
                None if !member.tag.is_empty() => {
                    warn!(
                        "Group [{}] keeps stale member tag `{}`",
                        outbound.tag, member.tag
                    );
                    members.push(member.tag.clone());
                }
                None => {}
            },
            MemberSource::Subscription => {
                let subscription = member.id.as_str();
                for (index, proxy) in proxies(cache, subscription)?.iter().enumerate() {
                    if let Some(tag) = proxy_tag(proxy).filter(|tag| matcher.is_match(tag)) {
                        members.push(tag.to_string());
                        referenced.add(subscription, index);
                    }
                }
            }
            MemberSource::Proxy { subscription } => {
                let wanted = provider
                    .proxy_tag(subscription, &member.id)
                    .unwrap_or_else(|| member.tag.clone());
                let found = proxies(cache, subscription)?
                    .iter()
                    .position(|proxy| proxy_tag(proxy) == Some(wanted.as_str()));
                match found {
                    Some(index) if matcher.is_match(&wanted) => {
                        members.push(wanted);
                        referenced.add(subscription, index);
                    }
                    Some(_) => {}
                    None => warn!(
                        "Proxy `{}` is gone from subscription {}, group [{}] skips it",
                        wanted, subscription, outbound.tag
                    ),
                }
            }
        }
    }
    Ok(members)
}

fn proxies<'c>(cache: &'c ProxyCache<'_>, subscription: &str) -> Result<&'c [Value]> {
    cache
        .get(subscription)
        .map(Vec::as_slice)
        .ok_or_else(|| Error::SubscriptionNotFound(subscription.to_string()))
}

fn proxy_tag(proxy: &Value) -> Option<&str> {
    proxy.get("tag").and_then(Value::as_str)
}

/// Kernel object of a synthetic built-in outbound
pub fn builtin_outbound(tag: &str) -> Value {
    json!({ "type": tag, "tag": tag })
}
