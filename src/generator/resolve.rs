//! Id to tag resolution
//!
//! Profiles reference entities by id, the kernel addresses them by tag.
//! [`resolve`] is the pure lookup; [`Resolver`] layers the configured
//! [`ReferencePolicy`] and the synthetic built-in outbounds on top of it.

use std::cell::RefCell;
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{DnsServer, Inbound, Outbound, Profile, RuleSet};

/// Synthetic kernel outbound that connects directly
pub const BUILTIN_DIRECT: &str = "direct";
/// Synthetic kernel outbound that drops traffic
pub const BUILTIN_BLOCK: &str = "block";

/// Namespace an id is looked up in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Inbound,
    Outbound,
    DnsServer,
    RuleSet,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefKind::Inbound => "inbound",
            RefKind::Outbound => "outbound",
            RefKind::DnsServer => "dns server",
            RefKind::RuleSet => "rule-set",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unresolved {kind} reference `{id}`")]
pub struct UnresolvedReference {
    pub kind: RefKind,
    pub id: String,
}

/// What happens when an id does not resolve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferencePolicy {
    /// Log and leave the field out (`null` inside arrays)
    #[default]
    Lenient,
    /// Abort the compilation
    Strict,
}

/// Entity addressable by id that contributes a tag to the kernel namespace
pub trait Tagged {
    fn id(&self) -> &str;
    fn tag(&self) -> &str;
}

macro_rules! impl_tagged {
    ($($ty:ty),*) => {
        $(impl Tagged for $ty {
            fn id(&self) -> &str {
                &self.id
            }

            fn tag(&self) -> &str {
                &self.tag
            }
        })*
    };
}

impl_tagged!(Inbound, Outbound, DnsServer, RuleSet);

/// Finds the tag of the entity with `id` in `items`
pub fn resolve<'a, T: Tagged>(
    kind: RefKind,
    items: &'a [T],
    id: &str,
) -> Result<&'a str, UnresolvedReference> {
    items
        .iter()
        .find(|item| item.id() == id)
        .map(|item| item.tag())
        .ok_or_else(|| UnresolvedReference {
            kind,
            id: id.to_string(),
        })
}

/// Per-compilation resolver over one profile snapshot
pub struct Resolver<'a> {
    profile: &'a Profile,
    policy: ReferencePolicy,
    builtins: RefCell<Vec<&'static str>>,
}

impl<'a> Resolver<'a> {
    pub fn new(profile: &'a Profile, policy: ReferencePolicy) -> Self {
        Self {
            profile,
            policy,
            builtins: RefCell::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> ReferencePolicy {
        self.policy
    }

    /// Tag of an enabled inbound. Rules pointing at a disabled or unknown
    /// inbound are dropped by the caller, so this never fails.
    pub fn inbound(&self, id: &str) -> Option<&'a str> {
        let found = self
            .profile
            .inbounds
            .iter()
            .find(|inbound| inbound.id == id);
        match found {
            Some(inbound) if inbound.enabled => Some(&inbound.tag),
            Some(_) => None,
            None => {
                warn!("Rule references unknown inbound `{}`, dropping it", id);
                None
            }
        }
    }

    /// Tag of a declared outbound, or of a synthetic built-in. Synthetic
    /// outbounds are recorded so they can be emitted once at the end.
    pub fn outbound(&self, id: &str) -> Result<Option<&'a str>, UnresolvedReference> {
        if id.is_empty() {
            return Ok(None);
        }
        match resolve(RefKind::Outbound, &self.profile.outbounds, id) {
            Ok(tag) => Ok(Some(tag)),
            Err(miss) => match builtin(id) {
                Some(tag) => {
                    self.record_builtin(tag);
                    Ok(Some(tag))
                }
                None => self.miss(miss),
            },
        }
    }

    pub fn dns_server(&self, id: &str) -> Result<Option<&'a str>, UnresolvedReference> {
        if id.is_empty() {
            return Ok(None);
        }
        match resolve(RefKind::DnsServer, &self.profile.dns.servers, id) {
            Ok(tag) => Ok(Some(tag)),
            Err(miss) => self.miss(miss),
        }
    }

    pub fn rule_set(&self, id: &str) -> Result<Option<&'a str>, UnresolvedReference> {
        if id.is_empty() {
            return Ok(None);
        }
        match resolve(RefKind::RuleSet, &self.profile.route.rule_set, id) {
            Ok(tag) => Ok(Some(tag)),
            Err(miss) => self.miss(miss),
        }
    }

    /// Synthetic built-ins referenced so far, in first-reference order
    pub fn builtins(&self) -> Vec<&'static str> {
        self.builtins.borrow().clone()
    }

    fn record_builtin(&self, tag: &'static str) {
        let mut builtins = self.builtins.borrow_mut();
        if !builtins.contains(&tag) {
            builtins.push(tag);
        }
    }

    fn miss<T>(&self, miss: UnresolvedReference) -> Result<Option<T>, UnresolvedReference> {
        match self.policy {
            ReferencePolicy::Lenient => {
                warn!("{}, leaving it out", miss);
                Ok(None)
            }
            ReferencePolicy::Strict => Err(miss),
        }
    }
}

fn builtin(id: &str) -> Option<&'static str> {
    match id {
        BUILTIN_DIRECT => Some(BUILTIN_DIRECT),
        BUILTIN_BLOCK => Some(BUILTIN_BLOCK),
        _ => None,
    }
}
