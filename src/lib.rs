pub mod error;
pub mod generator;
pub mod models;
pub mod parser;
pub mod plugins;
pub mod settings;
pub mod store;
pub mod utils;
pub mod vfs;

pub use error::{Error, Result};
pub use generator::{Compiler, ProxyProvider, ReferencePolicy};
pub use models::{Plugin, PluginTrigger, Profile, Subscription};
pub use plugins::{PluginHost, PluginRegistry, ScriptEngine};
pub use settings::Settings;
