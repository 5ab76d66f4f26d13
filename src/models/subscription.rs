//! Subscription and rule-set store records
//!
//! Both are owned by external stores; the compiler only reads them to find
//! materialized proxy lists and local rule-set files.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionKind {
    #[default]
    Http,
    File,
    Manual,
}

/// Index entry of one proxy inside a subscription
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyIndex {
    pub id: String,
    pub tag: String,
    #[serde(rename = "type")]
    pub proxy_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SubscriptionKind,
    pub url: String,
    /// Where the materialized proxy list (a JSON array) is stored
    pub path: String,
    pub include: String,
    pub exclude: String,
    pub include_protocol: String,
    pub exclude_protocol: String,
    pub proxy_prefix: String,
    /// Code defining `onSubscribe(proxies, subscription)`, run last on
    /// every update
    pub script: String,
    pub disabled: bool,
    pub proxies: Vec<ProxyIndex>,
}

impl Subscription {
    /// Tag of the proxy with the given index id
    pub fn proxy_tag(&self, proxy_id: &str) -> Option<&str> {
        self.proxies
            .iter()
            .find(|proxy| proxy.id == proxy_id)
            .map(|proxy| proxy.tag.as_str())
    }

    /// Index id of the proxy with the given tag
    pub fn proxy_index_id(&self, tag: &str) -> Option<&str> {
        self.proxies
            .iter()
            .find(|proxy| proxy.tag == tag)
            .map(|proxy| proxy.id.as_str())
    }
}

/// A locally stored rule-set file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesetFile {
    pub id: String,
    pub name: String,
    pub path: String,
    pub format: String,
}
