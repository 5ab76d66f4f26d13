//! Profile model definitions
//!
//! A profile is the user-authored, id-referenced description of a kernel
//! configuration. Every cross reference inside a profile goes through the
//! entity `id`; the kernel only ever sees `tag` strings.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::rule::{Rule, Strategy};

/// Root aggregate of one user profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub log: Log,
    pub experimental: Experimental,
    pub inbounds: Vec<Inbound>,
    pub outbounds: Vec<Outbound>,
    pub route: Route,
    pub dns: Dns,
    pub mixin: Mixin,
    pub script: Script,
}

/// Kernel log settings as stored in the profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Log {
    pub disabled: bool,
    pub level: String,
    pub output: String,
    pub timestamp: bool,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            disabled: false,
            level: "info".to_string(),
            output: String::new(),
            timestamp: false,
        }
    }
}

/// Experimental (runtime) settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Experimental {
    pub clash_api: ClashApi,
    pub cache_file: Map<String, Value>,
}

/// Clash API settings. Only the download detour is an id reference, the
/// remaining keys are copied to the kernel unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClashApi {
    pub external_ui_download_detour: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Type of an inbound listener
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundType {
    #[default]
    Mixed,
    Socks,
    Http,
    Tun,
}

impl InboundType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboundType::Mixed => "mixed",
            InboundType::Socks => "socks",
            InboundType::Http => "http",
            InboundType::Tun => "tun",
        }
    }
}

/// Listen settings shared by the `mixed`, `socks` and `http` inbounds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenInbound {
    pub listen: Map<String, Value>,
    /// Credentials in `user:password` form
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Inbound {
    pub id: String,
    #[serde(rename = "type")]
    pub inbound_type: InboundType,
    pub tag: String,
    #[serde(alias = "enable")]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mixed: Option<ListenInbound>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socks: Option<ListenInbound>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<ListenInbound>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tun: Option<Map<String, Value>>,
}

impl Default for Inbound {
    fn default() -> Self {
        Self {
            id: String::new(),
            inbound_type: InboundType::Mixed,
            tag: String::new(),
            enabled: true,
            mixed: None,
            socks: None,
            http: None,
            tun: None,
        }
    }
}

impl Inbound {
    /// Listen block matching the inbound type, `None` for `tun`
    pub fn listen_settings(&self) -> Option<&ListenInbound> {
        match self.inbound_type {
            InboundType::Mixed => self.mixed.as_ref(),
            InboundType::Socks => self.socks.as_ref(),
            InboundType::Http => self.http.as_ref(),
            InboundType::Tun => None,
        }
    }
}

/// Type of a locally declared outbound
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundType {
    Direct,
    #[default]
    Selector,
    Urltest,
}

impl OutboundType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundType::Direct => "direct",
            OutboundType::Selector => "selector",
            OutboundType::Urltest => "urltest",
        }
    }

    /// Whether this outbound carries a member list
    pub fn is_group(&self) -> bool {
        matches!(self, OutboundType::Selector | OutboundType::Urltest)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Outbound {
    pub id: String,
    pub tag: String,
    #[serde(rename = "type")]
    pub outbound_type: OutboundType,
    #[serde(rename = "outbounds", alias = "members")]
    pub members: Vec<Member>,
    pub url: String,
    pub interval: String,
    pub tolerance: u32,
    pub interrupt_exist_connections: bool,
    /// Regex a member tag must match to be kept (empty keeps everything)
    pub include: String,
    /// Regex a member tag must not match to be kept (empty drops nothing)
    pub exclude: String,
}

impl Default for Outbound {
    fn default() -> Self {
        Self {
            id: String::new(),
            tag: String::new(),
            outbound_type: OutboundType::Selector,
            members: Vec::new(),
            url: String::new(),
            interval: "3m".to_string(),
            tolerance: 150,
            interrupt_exist_connections: true,
            include: String::new(),
            exclude: String::new(),
        }
    }
}

pub const MEMBER_BUILT_IN: &str = "Built-in";
pub const MEMBER_SUBSCRIPTION: &str = "Subscription";

/// Member of a selector/urltest group.
///
/// The `type` field is either `Built-in`, `Subscription`, or the id of the
/// subscription a single proxy is picked from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Member {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub tag: String,
}

/// Where a member's tags come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberSource<'a> {
    /// A locally declared outbound or a synthetic kernel outbound, by id
    BuiltIn,
    /// Every proxy of the subscription whose id is the member id
    Subscription,
    /// The single proxy with the member id inside the given subscription
    Proxy { subscription: &'a str },
}

impl Member {
    pub fn source(&self) -> MemberSource<'_> {
        match self.kind.as_str() {
            MEMBER_BUILT_IN => MemberSource::BuiltIn,
            MEMBER_SUBSCRIPTION => MemberSource::Subscription,
            other => MemberSource::Proxy {
                subscription: other,
            },
        }
    }

    /// Id of the subscription this member draws from, if any
    pub fn subscription_id(&self) -> Option<&str> {
        match self.source() {
            MemberSource::BuiltIn => None,
            MemberSource::Subscription => Some(&self.id),
            MemberSource::Proxy { subscription } => Some(subscription),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSetType {
    Inline,
    #[default]
    Local,
    Remote,
}

impl RuleSetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSetType::Inline => "inline",
            RuleSetType::Local => "local",
            RuleSetType::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub id: String,
    #[serde(rename = "type")]
    pub ruleset_type: RuleSetType,
    pub tag: String,
    pub format: String,
    /// JSON rule array for `inline` rule-sets
    pub rules: String,
    /// Id of a locally stored rule-set for `local` rule-sets
    pub path: String,
    pub url: String,
    pub download_detour: String,
    pub update_interval: String,
}

/// Default resolver for domains found in outbound/server addresses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainResolver {
    pub server: String,
    pub client_subnet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Route {
    pub rules: Vec<Rule>,
    pub rule_set: Vec<RuleSet>,
    #[serde(rename = "final")]
    pub final_outbound: String,
    pub auto_detect_interface: bool,
    pub default_interface: String,
    pub find_process: bool,
    pub default_domain_resolver: DomainResolver,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            rule_set: Vec::new(),
            final_outbound: String::new(),
            auto_detect_interface: true,
            default_interface: String::new(),
            find_process: false,
            default_domain_resolver: DomainResolver::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsServerType {
    #[default]
    Local,
    Hosts,
    Tcp,
    Udp,
    Tls,
    Quic,
    Https,
    H3,
    Dhcp,
    Fakeip,
}

impl DnsServerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsServerType::Local => "local",
            DnsServerType::Hosts => "hosts",
            DnsServerType::Tcp => "tcp",
            DnsServerType::Udp => "udp",
            DnsServerType::Tls => "tls",
            DnsServerType::Quic => "quic",
            DnsServerType::Https => "https",
            DnsServerType::H3 => "h3",
            DnsServerType::Dhcp => "dhcp",
            DnsServerType::Fakeip => "fakeip",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsServer {
    pub id: String,
    pub tag: String,
    #[serde(rename = "type")]
    pub server_type: DnsServerType,
    pub detour: String,
    pub domain_resolver: String,
    pub server: String,
    #[serde(deserialize_with = "string_or_number")]
    pub server_port: String,
    pub path: String,
    pub interface: String,
    pub inet4_range: String,
    pub inet6_range: String,
    pub hosts_path: Vec<String>,
    pub predefined: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dns {
    pub servers: Vec<DnsServer>,
    pub rules: Vec<Rule>,
    pub disable_cache: bool,
    pub disable_expire: bool,
    pub independent_cache: bool,
    pub client_subnet: String,
    #[serde(rename = "final")]
    pub final_server: String,
    pub strategy: Strategy,
}

impl Dns {
    /// Fake-IP rules only make sense when a fakeip server is declared
    pub fn has_fakeip(&self) -> bool {
        self.servers
            .iter()
            .any(|server| server.server_type == DnsServerType::Fakeip)
    }
}

/// Which side wins when the mixin overlaps the generated document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixinPriority {
    #[default]
    Mixin,
    Gui,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Mixin {
    pub priority: MixinPriority,
    /// YAML or JSON override document
    pub config: String,
}

impl Default for Mixin {
    fn default() -> Self {
        Self {
            priority: MixinPriority::Mixin,
            config: "{}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Script {
    pub code: String,
}

/// Accepts `443` as well as `"443"` for fields the editor stores as text
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_source() {
        let member = |kind: &str| Member {
            id: "m".to_string(),
            kind: kind.to_string(),
            tag: String::new(),
        };
        assert_eq!(member("Built-in").source(), MemberSource::BuiltIn);
        assert_eq!(member("Subscription").source(), MemberSource::Subscription);
        assert_eq!(
            member("sub-1").source(),
            MemberSource::Proxy {
                subscription: "sub-1"
            }
        );
        assert_eq!(member("Subscription").subscription_id(), Some("m"));
        assert_eq!(member("sub-1").subscription_id(), Some("sub-1"));
        assert_eq!(member("Built-in").subscription_id(), None);
    }

    #[test]
    fn test_profile_yaml_defaults() {
        let yaml = r#"
id: p1
name: Default
inbounds:
  - id: mixed-in
    type: mixed
    tag: mixed-in
    enable: true
    mixed:
      listen:
        listen: 127.0.0.1
        listen_port: 20122
      users: []
dns:
  servers:
    - id: local
      tag: local
      type: udp
      server: 223.5.5.5
      server_port: 53
"#;
        let profile: Profile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(profile.inbounds.len(), 1);
        assert!(profile.inbounds[0].enabled);
        assert_eq!(profile.log.level, "info");
        assert!(profile.route.auto_detect_interface);
        assert_eq!(profile.mixin.priority, MixinPriority::Mixin);
        assert_eq!(profile.dns.servers[0].server_port, "53");
        assert_eq!(profile.dns.servers[0].server_type, DnsServerType::Udp);
    }
}
