//! Routing and DNS rule model
//!
//! Both rule flavours share one record. `rule_type` picks the kernel field
//! the payload is written into, `action` picks which of the remaining fields
//! are read.

use serde::{Deserialize, Serialize};

/// Kernel match field a rule payload is written into
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleType {
    Inbound,
    Network,
    Protocol,
    Domain,
    DomainSuffix,
    DomainKeyword,
    DomainRegex,
    SourceIpCidr,
    IpCidr,
    IpIsPrivate,
    SourcePort,
    SourcePortRange,
    Port,
    PortRange,
    ProcessName,
    ProcessPath,
    ProcessPathRegex,
    ClashMode,
    #[default]
    RuleSet,
    /// DNS only: match on the outbound that issued the query
    Outbound,
    /// Raw JSON object merged into the encoded rule
    Inline,
    /// Any other kernel field, encoded as a plain string list
    Other(String),
}

impl RuleType {
    pub fn as_str(&self) -> &str {
        match self {
            RuleType::Inbound => "inbound",
            RuleType::Network => "network",
            RuleType::Protocol => "protocol",
            RuleType::Domain => "domain",
            RuleType::DomainSuffix => "domain_suffix",
            RuleType::DomainKeyword => "domain_keyword",
            RuleType::DomainRegex => "domain_regex",
            RuleType::SourceIpCidr => "source_ip_cidr",
            RuleType::IpCidr => "ip_cidr",
            RuleType::IpIsPrivate => "ip_is_private",
            RuleType::SourcePort => "source_port",
            RuleType::SourcePortRange => "source_port_range",
            RuleType::Port => "port",
            RuleType::PortRange => "port_range",
            RuleType::ProcessName => "process_name",
            RuleType::ProcessPath => "process_path",
            RuleType::ProcessPathRegex => "process_path_regex",
            RuleType::ClashMode => "clash_mode",
            RuleType::RuleSet => "rule_set",
            RuleType::Outbound => "outbound",
            RuleType::Inline => "inline",
            RuleType::Other(name) => name,
        }
    }

    /// Payload elements are port numbers
    pub fn is_numeric(&self) -> bool {
        matches!(self, RuleType::Port | RuleType::SourcePort)
    }

    /// Payload is the literal `true` or `false`
    pub fn is_boolean(&self) -> bool {
        matches!(self, RuleType::IpIsPrivate)
    }

    /// Payload is a single enum value passed through verbatim
    pub fn is_enum(&self) -> bool {
        matches!(self, RuleType::ClashMode)
    }
}

impl From<String> for RuleType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "inbound" => RuleType::Inbound,
            "network" => RuleType::Network,
            "protocol" => RuleType::Protocol,
            "domain" => RuleType::Domain,
            "domain_suffix" => RuleType::DomainSuffix,
            "domain_keyword" => RuleType::DomainKeyword,
            "domain_regex" => RuleType::DomainRegex,
            "source_ip_cidr" => RuleType::SourceIpCidr,
            "ip_cidr" => RuleType::IpCidr,
            "ip_is_private" => RuleType::IpIsPrivate,
            "source_port" => RuleType::SourcePort,
            "source_port_range" => RuleType::SourcePortRange,
            "port" => RuleType::Port,
            "port_range" => RuleType::PortRange,
            "process_name" => RuleType::ProcessName,
            "process_path" => RuleType::ProcessPath,
            "process_path_regex" => RuleType::ProcessPathRegex,
            "clash_mode" => RuleType::ClashMode,
            "rule_set" => RuleType::RuleSet,
            "outbound" => RuleType::Outbound,
            "inline" => RuleType::Inline,
            _ => RuleType::Other(value),
        }
    }
}

impl From<RuleType> for String {
    fn from(value: RuleType) -> Self {
        match value {
            RuleType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleAction {
    #[default]
    Route,
    RouteOptions,
    Reject,
    HijackDns,
    Sniff,
    Resolve,
    /// DNS only: answer with a predefined response
    Predefined,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Route => "route",
            RuleAction::RouteOptions => "route-options",
            RuleAction::Reject => "reject",
            RuleAction::HijackDns => "hijack-dns",
            RuleAction::Sniff => "sniff",
            RuleAction::Resolve => "resolve",
            RuleAction::Predefined => "predefined",
        }
    }
}

/// Domain resolution strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Default,
    PreferIpv4,
    PreferIpv6,
    Ipv4Only,
    Ipv6Only,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Default => "default",
            Strategy::PreferIpv4 => "prefer_ipv4",
            Strategy::PreferIpv6 => "prefer_ipv6",
            Strategy::Ipv4Only => "ipv4_only",
            Strategy::Ipv6Only => "ipv6_only",
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Strategy::Default
    }
}

/// A routing or DNS rule.
///
/// `outbound` and `server` are overloaded by action: for routing rules
/// `outbound` holds the outbound id (`route`), the option JSON
/// (`route-options`) or the reject method; for DNS rules `server` plays the
/// same role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    pub id: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub payload: String,
    pub invert: bool,
    pub action: RuleAction,
    pub outbound: String,
    pub sniffer: Vec<String>,
    pub strategy: Strategy,
    pub server: String,
    pub disable_cache: bool,
    pub client_subnet: String,
}
