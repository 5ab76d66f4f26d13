//! Settings module
//!
//! Where the stores live, where the compiled configuration goes, and how
//! plugins are run. Every field has a default, so an empty file (or no
//! file at all) is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generator::resolve::ReferencePolicy;
use crate::plugins::PluginSettings;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML settings: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid TOML settings: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Unsupported settings format: {0}")]
    UnsupportedFormat(String),
}

/// How plugin code is executed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginRunnerSettings {
    /// Interpreter executable the harness is run with
    pub interpreter: String,
    /// Extra interpreter arguments placed before the script path
    pub args: Vec<String>,
    /// Deadline of a single handler call
    pub timeout_secs: u64,
}

impl Default for PluginRunnerSettings {
    fn default() -> Self {
        Self {
            interpreter: "node".to_string(),
            args: Vec::new(),
            timeout_secs: 30,
        }
    }
}

impl PluginRunnerSettings {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Settings structure to hold global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root every store path is relative to
    pub data_dir: String,
    pub profiles_path: String,
    pub subscriptions_path: String,
    pub plugins_path: String,
    pub rulesets_path: String,
    /// Where the compiled kernel configuration is written
    pub output_path: String,
    pub reference_policy: ReferencePolicy,
    pub plugin: PluginRunnerSettings,
    /// User overrides of plugin configuration values, keyed by plugin id
    pub plugin_settings: PluginSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: ".".to_string(),
            profiles_path: "data/profiles.yaml".to_string(),
            subscriptions_path: "data/subscribes.yaml".to_string(),
            plugins_path: "data/plugins.yaml".to_string(),
            rulesets_path: "data/rulesets.yaml".to_string(),
            output_path: "data/sing-box/config.json".to_string(),
            reference_policy: ReferencePolicy::default(),
            plugin: PluginRunnerSettings::default(),
            plugin_settings: PluginSettings::new(),
        }
    }
}

impl Settings {
    /// Loads settings, picking the format from the file extension
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        Self::parse(&content, extension)
    }

    /// Parses settings text; `format` is a file extension
    pub fn parse(content: &str, format: &str) -> Result<Self, SettingsError> {
        match format.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => {
                if content.trim().is_empty() {
                    return Ok(Self::default());
                }
                Ok(serde_yaml::from_str(content)?)
            }
            "toml" => Ok(toml::from_str(content)?),
            other => Err(SettingsError::UnsupportedFormat(other.to_string())),
        }
    }
}
