//! Plugin definitions and trigger kinds

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Extension point a plugin can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PluginTrigger {
    #[serde(rename = "on::manual")]
    OnManual,
    #[serde(rename = "on::subscribe")]
    OnSubscribe,
    #[serde(rename = "on::generate")]
    OnGenerate,
    #[serde(rename = "on::startup")]
    OnStartup,
    #[serde(rename = "on::shutdown")]
    OnShutdown,
    #[serde(rename = "on::ready")]
    OnReady,
    #[serde(rename = "on::core::started")]
    OnCoreStarted,
    #[serde(rename = "on::core::stopped")]
    OnCoreStopped,
    #[serde(rename = "on::before::core::start")]
    OnBeforeCoreStart,
    #[serde(rename = "on::before::core::stop")]
    OnBeforeCoreStop,
}

impl PluginTrigger {
    pub const ALL: [PluginTrigger; 10] = [
        PluginTrigger::OnManual,
        PluginTrigger::OnSubscribe,
        PluginTrigger::OnGenerate,
        PluginTrigger::OnStartup,
        PluginTrigger::OnShutdown,
        PluginTrigger::OnReady,
        PluginTrigger::OnCoreStarted,
        PluginTrigger::OnCoreStopped,
        PluginTrigger::OnBeforeCoreStart,
        PluginTrigger::OnBeforeCoreStop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginTrigger::OnManual => "on::manual",
            PluginTrigger::OnSubscribe => "on::subscribe",
            PluginTrigger::OnGenerate => "on::generate",
            PluginTrigger::OnStartup => "on::startup",
            PluginTrigger::OnShutdown => "on::shutdown",
            PluginTrigger::OnReady => "on::ready",
            PluginTrigger::OnCoreStarted => "on::core::started",
            PluginTrigger::OnCoreStopped => "on::core::stopped",
            PluginTrigger::OnBeforeCoreStart => "on::before::core::start",
            PluginTrigger::OnBeforeCoreStop => "on::before::core::stop",
        }
    }

    /// Name of the function a plugin exports for this trigger
    pub fn handler(&self) -> &'static str {
        match self {
            PluginTrigger::OnManual => "onRun",
            PluginTrigger::OnSubscribe => "onSubscribe",
            PluginTrigger::OnGenerate => "onGenerate",
            PluginTrigger::OnStartup => "onStartup",
            PluginTrigger::OnShutdown => "onShutdown",
            PluginTrigger::OnReady => "onReady",
            PluginTrigger::OnCoreStarted => "onCoreStarted",
            PluginTrigger::OnCoreStopped => "onCoreStopped",
            PluginTrigger::OnBeforeCoreStart => "onBeforeCoreStart",
            PluginTrigger::OnBeforeCoreStop => "onBeforeCoreStop",
        }
    }
}

/// A trigger name as stored in a plugin definition.
///
/// Names this build does not know are kept as written so saving the plugin
/// list never drops them; such triggers simply never fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerName {
    Known(PluginTrigger),
    Other(String),
}

impl From<PluginTrigger> for TriggerName {
    fn from(trigger: PluginTrigger) -> Self {
        TriggerName::Known(trigger)
    }
}

/// Where the plugin source comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginSource {
    Http,
    #[default]
    File,
}

/// A user-tunable plugin option with its default value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfiguration {
    pub key: String,
    pub value: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Plugin {
    pub id: String,
    pub version: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub source: PluginSource,
    pub url: String,
    /// Location of the plugin code inside the data directory
    pub path: String,
    pub triggers: Vec<TriggerName>,
    pub configuration: Vec<PluginConfiguration>,
    pub disabled: bool,
    /// The plugin has an install step that must run before it is usable
    pub install: bool,
    pub installed: bool,
    /// Last numeric value returned by a lifecycle handler
    pub status: i64,
}

impl Plugin {
    pub fn enabled(&self) -> bool {
        !self.disabled
    }

    /// Declares an install step that has not completed yet
    pub fn pending_install(&self) -> bool {
        self.install && !self.installed
    }

    pub fn subscribes_to(&self, trigger: PluginTrigger) -> bool {
        self.triggers.contains(&TriggerName::Known(trigger))
    }

    /// Trigger names this build cannot dispatch
    pub fn unknown_triggers(&self) -> impl Iterator<Item = &str> {
        self.triggers.iter().filter_map(|trigger| match trigger {
            TriggerName::Other(name) => Some(name.as_str()),
            TriggerName::Known(_) => None,
        })
    }
}
