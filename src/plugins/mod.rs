//! Plugin registry and trigger dispatch
//!
//! [`PluginRegistry`] owns the plugin definitions, their cached code and the
//! per-plugin user settings. Observer lists are never stored: they are
//! projected from the definitions, in declaration order, every time a
//! trigger fires.
//!
//! [`PluginHost`] runs the triggers through a [`ScriptEngine`]. Every call
//! is bounded by a deadline; a timeout counts as a plugin error.

pub mod engine;
pub mod process;

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::{Map, Value};

pub use engine::{Invocation, NativeCall, NativeEngine, ScriptEngine, ScriptError};
pub use process::ProcessEngine;

use crate::error::{Error, Result};
use crate::models::{Plugin, PluginTrigger, Profile, Subscription};
use crate::parser::subscription::parse_subscription_body;
use crate::vfs::VirtualFileSystem;

/// Default upper bound for a single handler call
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// User overrides of plugin configuration values, keyed by plugin id
pub type PluginSettings = HashMap<String, Map<String, Value>>;

#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<Plugin>,
    code: HashMap<String, String>,
    settings: PluginSettings,
}

impl PluginRegistry {
    pub fn new(plugins: Vec<Plugin>, settings: PluginSettings) -> Self {
        Self {
            plugins,
            code: HashMap::new(),
            settings,
        }
    }

    /// Reads the code of every plugin into the cache. Plugins whose code
    /// cannot be read stay uncached and are skipped by every trigger.
    pub async fn load<F: VirtualFileSystem>(&mut self, vfs: &F) {
        for plugin in &self.plugins {
            for name in plugin.unknown_triggers() {
                warn!("Plugin [{}] uses unsupported trigger {}, ignoring it", plugin.name, name);
            }
            match vfs.read_text(&plugin.path).await {
                Ok(code) => {
                    debug!("Loaded code of plugin [{}]", plugin.name);
                    self.code.insert(plugin.id.clone(), code);
                }
                Err(e) => warn!("Plugin [{}] has no usable code: {}", plugin.name, e),
            }
        }
    }

    /// Replaces (or adds) a plugin definition together with its code
    pub fn reload_plugin(&mut self, plugin: Plugin, code: String) {
        self.code.insert(plugin.id.clone(), code);
        match self.plugins.iter_mut().find(|p| p.id == plugin.id) {
            Some(existing) => *existing = plugin,
            None => self.plugins.push(plugin),
        }
    }

    pub fn remove_plugin(&mut self, id: &str) -> Option<Plugin> {
        self.code.remove(id);
        let index = self.plugins.iter().position(|p| p.id == id)?;
        Some(self.plugins.remove(index))
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn get(&self, id: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.id == id)
    }

    pub fn code(&self, id: &str) -> Option<&str> {
        self.code.get(id).map(String::as_str)
    }

    /// Plugins subscribed to `trigger`, in declaration order
    pub fn observers(&self, trigger: PluginTrigger) -> impl Iterator<Item = &Plugin> {
        self.plugins.iter().filter(move |p| p.subscribes_to(trigger))
    }

    /// Observers that can run right now, with their code
    pub fn eligible(&self, trigger: PluginTrigger) -> impl Iterator<Item = (&Plugin, &str)> {
        self.observers(trigger).filter_map(|plugin| {
            if !plugin.enabled() || plugin.pending_install() {
                return None;
            }
            self.code(&plugin.id).map(|code| (plugin, code))
        })
    }

    /// The `Plugin` object handed to handlers: the definition with every
    /// configuration value at top level, user settings taking precedence
    pub fn metadata(&self, plugin: &Plugin) -> Value {
        let mut metadata = match serde_json::to_value(plugin) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        for option in &plugin.configuration {
            metadata.insert(option.key.clone(), option.value.clone());
        }
        if let Some(overrides) = self.settings.get(&plugin.id) {
            metadata.extend(overrides.clone());
        }
        Value::Object(metadata)
    }

    /// Records a numeric handler result. Returns whether it changed.
    pub fn set_status(&mut self, id: &str, status: i64) -> bool {
        match self.plugins.iter_mut().find(|p| p.id == id) {
            Some(plugin) if plugin.status != status => {
                plugin.status = status;
                true
            }
            _ => false,
        }
    }
}

/// Runs plugin triggers against a registry
pub struct PluginHost<E> {
    registry: PluginRegistry,
    engine: E,
    deadline: Duration,
}

impl<E: ScriptEngine> PluginHost<E> {
    pub fn new(registry: PluginRegistry, engine: E) -> Self {
        Self {
            registry,
            engine,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PluginRegistry {
        &mut self.registry
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// `on::generate`: each plugin rewrites the document in turn
    pub async fn on_generate(&self, config: Value, profile: &Profile) -> Result<Value> {
        self.config_chain(PluginTrigger::OnGenerate, config, profile)
            .await
    }

    /// `on::before::core::start`: last rewrite before the kernel launches
    pub async fn on_before_core_start(&self, config: Value, profile: &Profile) -> Result<Value> {
        self.config_chain(PluginTrigger::OnBeforeCoreStart, config, profile)
            .await
    }

    async fn config_chain(
        &self,
        trigger: PluginTrigger,
        mut config: Value,
        profile: &Profile,
    ) -> Result<Value> {
        let profile = serde_json::to_value(profile).map_err(|e| Error::json("profile", e))?;
        for (plugin, code) in self.registry.eligible(trigger) {
            let args = vec![config, profile.clone()];
            config = self.call(plugin, code, trigger.handler(), args).await?;
            if !config.is_object() {
                return Err(wrong_result(plugin));
            }
        }
        Ok(config)
    }

    /// `on::subscribe`: rewrites the proxy array of a subscription.
    ///
    /// A handler may answer with raw subscription text instead of an array;
    /// it is parsed with the same detection rules as a fetched body.
    pub async fn on_subscribe(
        &self,
        mut proxies: Vec<Value>,
        subscription: &Subscription,
    ) -> Result<Vec<Value>> {
        let trigger = PluginTrigger::OnSubscribe;
        let subscription_value =
            serde_json::to_value(subscription).map_err(|e| Error::json("subscription", e))?;
        for (plugin, code) in self.registry.eligible(trigger) {
            let args = vec![Value::Array(proxies), subscription_value.clone()];
            proxies = match self.call(plugin, code, trigger.handler(), args).await? {
                Value::Array(list) => list,
                Value::String(body) => parse_subscription_body(&body, subscription.kind)
                    .map_err(|e| Error::Plugin {
                        plugin: plugin.name.clone(),
                        reason: format!("{}: {}", Error::WrongResult, e),
                    })?,
                _ => return Err(wrong_result(plugin)),
            };
        }
        Ok(proxies)
    }

    /// Lifecycle triggers without arguments.
    ///
    /// Failures of `on::shutdown` and `on::before::core::stop` abort; every
    /// other trigger logs the failure and moves on to the next plugin.
    pub async fn no_params_trigger(&mut self, trigger: PluginTrigger) -> Result<()> {
        let interrupt = matches!(
            trigger,
            PluginTrigger::OnShutdown | PluginTrigger::OnBeforeCoreStop
        );
        let mut statuses = Vec::new();
        for (plugin, code) in self.registry.eligible(trigger) {
            match self.call(plugin, code, trigger.handler(), Vec::new()).await {
                Ok(value) => {
                    if let Some(status) = value.as_i64() {
                        statuses.push((plugin.id.clone(), status));
                    }
                }
                Err(e) if interrupt => return Err(e),
                Err(e) => error!("{}", e),
            }
        }
        for (id, status) in statuses {
            self.registry.set_status(&id, status);
        }
        Ok(())
    }

    /// Runs one named handler of one plugin on demand
    pub async fn manual_trigger(&mut self, id: &str, event: &str, args: Vec<Value>) -> Result<Value> {
        let plugin = self
            .registry
            .get(id)
            .ok_or_else(|| Error::PluginNotFound(id.to_string()))?;
        let code = self
            .registry
            .code(id)
            .ok_or_else(|| Error::MissingCode(plugin.name.clone()))?;
        if !plugin.enabled() {
            return Err(Error::PluginDisabled(plugin.name.clone()));
        }
        let result = self.call(plugin, code, event, args).await?;
        if let Some(status) = result.as_i64() {
            self.registry.set_status(id, status);
        }
        Ok(result)
    }

    async fn call(&self, plugin: &Plugin, code: &str, handler: &str, args: Vec<Value>) -> Result<Value> {
        info!("Running {} of plugin [{}]", handler, plugin.name);
        let invocation = Invocation {
            owner: &plugin.id,
            name: &plugin.name,
            code,
            handler,
            plugin: Some(self.registry.metadata(plugin)),
            args,
        };
        let outcome = match tokio::time::timeout(self.deadline, self.engine.invoke(invocation)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ScriptError::Timeout(self.deadline)),
        };
        outcome.map_err(|e| Error::Plugin {
            plugin: plugin.name.clone(),
            reason: e.to_string(),
        })
    }
}

fn wrong_result(plugin: &Plugin) -> Error {
    Error::Plugin {
        plugin: plugin.name.clone(),
        reason: Error::WrongResult.to_string(),
    }
}
