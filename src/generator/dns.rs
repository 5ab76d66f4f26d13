use serde_json::{Map, Value};

use super::resolve::Resolver;
use super::rule::encode_dns_rule;
use crate::error::{Error, Result};
use crate::models::{Dns, DnsServer, DnsServerType};

/// Encodes the DNS block
pub fn generate_dns(dns: &Dns, resolver: &Resolver<'_>) -> Result<Value> {
    let servers = dns
        .servers
        .iter()
        .map(|server| encode_server(server, resolver))
        .collect::<Result<Vec<_>>>()?;

    let has_fakeip = dns.has_fakeip();
    let mut rules = Vec::with_capacity(dns.rules.len());
    for rule in &dns.rules {
        if let Some(encoded) = encode_dns_rule(rule, resolver, has_fakeip)? {
            rules.push(Value::Object(encoded));
        }
    }

    let mut encoded = Map::new();
    encoded.insert("servers".to_string(), Value::Array(servers));
    encoded.insert("rules".to_string(), Value::Array(rules));
    encoded.insert("disable_cache".to_string(), dns.disable_cache.into());
    encoded.insert("disable_expire".to_string(), dns.disable_expire.into());
    encoded.insert("independent_cache".to_string(), dns.independent_cache.into());
    if let Some(tag) = resolver.dns_server(&dns.final_server)? {
        encoded.insert("final".to_string(), tag.into());
    }
    if !dns.strategy.is_default() {
        encoded.insert("strategy".to_string(), dns.strategy.as_str().into());
    }
    if !dns.client_subnet.is_empty() {
        encoded.insert("client_subnet".to_string(), dns.client_subnet.clone().into());
    }
    Ok(Value::Object(encoded))
}

fn encode_server(server: &DnsServer, resolver: &Resolver<'_>) -> Result<Value> {
    let mut encoded = Map::new();
    encoded.insert("tag".to_string(), server.tag.clone().into());
    encoded.insert("type".to_string(), server.server_type.as_str().into());
    if let Some(tag) = resolver.outbound(&server.detour)? {
        encoded.insert("detour".to_string(), tag.into());
    }
    if let Some(tag) = resolver.dns_server(&server.domain_resolver)? {
        encoded.insert("domain_resolver".to_string(), tag.into());
    }

    match server.server_type {
        DnsServerType::Local => {}
        DnsServerType::Hosts => {
            if !server.hosts_path.is_empty() {
                encoded.insert("path".to_string(), server.hosts_path.clone().into());
            }
            if !server.predefined.is_empty() {
                encoded.insert(
                    "predefined".to_string(),
                    Value::Object(server.predefined.clone()),
                );
            }
        }
        DnsServerType::Tcp | DnsServerType::Udp | DnsServerType::Tls | DnsServerType::Quic => {
            insert_address(&mut encoded, server)?;
        }
        DnsServerType::Https | DnsServerType::H3 => {
            insert_address(&mut encoded, server)?;
            if !server.path.is_empty() {
                encoded.insert("path".to_string(), server.path.clone().into());
            }
        }
        DnsServerType::Dhcp => {
            if !server.interface.is_empty() {
                encoded.insert("interface".to_string(), server.interface.clone().into());
            }
        }
        DnsServerType::Fakeip => {
            if !server.inet4_range.is_empty() {
                encoded.insert("inet4_range".to_string(), server.inet4_range.clone().into());
            }
            if !server.inet6_range.is_empty() {
                encoded.insert("inet6_range".to_string(), server.inet6_range.clone().into());
            }
        }
    }
    Ok(Value::Object(encoded))
}

fn insert_address(encoded: &mut Map<String, Value>, server: &DnsServer) -> Result<()> {
    encoded.insert("server".to_string(), server.server.clone().into());
    let port = server.server_port.trim();
    if !port.is_empty() {
        let port: u16 = port.parse().map_err(|_| Error::InvalidNumber {
            context: format!("server_port of dns server {}", server.tag),
            value: server.server_port.clone(),
        })?;
        encoded.insert("server_port".to_string(), port.into());
    }
    Ok(())
}
