//! Core data models for the application
//!
//! This module contains the user-facing, id-referenced documents the
//! compiler consumes, separated from the logic that operates on them.
//!
//! # Usage
//!
//! Profiles are usually read from the profile store, but they can be built
//! by hand as well:
//!
//! ```rust
//! use boxforge::models::{Inbound, InboundType, Profile};
//!
//! let mut profile = Profile::default();
//! profile.inbounds.push(Inbound {
//!     id: "mixed-in".to_string(),
//!     inbound_type: InboundType::Mixed,
//!     tag: "mixed-in".to_string(),
//!     ..Default::default()
//! });
//! assert!(profile.inbounds[0].enabled);
//! ```

pub mod plugin;
pub mod profile;
pub mod rule;
pub mod subscription;

pub use plugin::{Plugin, PluginConfiguration, PluginSource, PluginTrigger, TriggerName};
pub use profile::*;
pub use rule::{Rule, RuleAction, RuleType, Strategy};
pub use subscription::{ProxyIndex, RulesetFile, Subscription, SubscriptionKind};
