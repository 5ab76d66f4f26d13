//! Profile to kernel configuration compiler
//!
//! The pipeline runs strictly in order, each stage consuming the previous
//! stage's document:
//!
//! 1. generation of `log`, `experimental`, `inbounds`, `outbounds`, `route`
//!    and `dns` from the profile snapshot
//! 2. the `on::generate` plugin chain
//! 3. the mixin overlay
//! 4. the profile script's `onGenerate(config)`
//!
//! followed by [`finalize::enforce_invariants`]. Any failing stage aborts
//! the whole compilation.

pub mod dns;
pub mod experimental;
pub mod finalize;
pub mod inbounds;
pub mod mixin;
pub mod outbounds;
pub mod resolve;
pub mod route;
pub mod rule;
pub mod script;

use log::{debug, info};
use serde_json::{Map, Value};

pub use outbounds::ProxyProvider;
pub use resolve::{ReferencePolicy, Resolver, UnresolvedReference};

use dns::generate_dns;
use experimental::generate_experimental;
use inbounds::generate_inbounds;
use outbounds::{builtin_outbound, generate_outbounds};
use route::generate_route;

use crate::error::{Error, Result};
use crate::models::{Profile, RulesetFile};
use crate::plugins::{PluginHost, ScriptEngine};
use crate::vfs::VirtualFileSystem;

/// Default location of the compiled configuration
pub const DEFAULT_OUTPUT_PATH: &str = "data/sing-box/config.json";

/// One configured compiler. Cheap to build; every call to
/// [`Compiler::generate_config`] uses its own resolver and proxy cache.
pub struct Compiler<'a, E, P> {
    host: &'a PluginHost<E>,
    provider: &'a P,
    rulesets: &'a [RulesetFile],
    policy: ReferencePolicy,
}

impl<'a, E: ScriptEngine, P: ProxyProvider> Compiler<'a, E, P> {
    pub fn new(host: &'a PluginHost<E>, provider: &'a P) -> Self {
        Self {
            host,
            provider,
            rulesets: &[],
            policy: ReferencePolicy::default(),
        }
    }

    /// Rule-set store index used to locate `local` rule-sets
    pub fn with_rulesets(mut self, rulesets: &'a [RulesetFile]) -> Self {
        self.rulesets = rulesets;
        self
    }

    pub fn with_policy(mut self, policy: ReferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stage 1 only: the document generated straight from the profile
    pub async fn generate_base(&self, profile: &Profile) -> Result<Value> {
        debug!("Generating base configuration of profile [{}]", profile.name);
        let resolver = Resolver::new(profile, self.policy);

        let log = serde_json::to_value(&profile.log).map_err(|e| Error::json("log", e))?;
        let experimental = generate_experimental(&profile.experimental, &resolver)?;
        let inbounds = generate_inbounds(&profile.inbounds);
        let mut outbounds =
            generate_outbounds(&profile.outbounds, &resolver, self.provider).await?;
        let route = generate_route(&profile.route, &resolver, self.rulesets)?;
        let dns = generate_dns(&profile.dns, &resolver)?;
        // built-ins go last, once every block had a chance to reference them
        outbounds.extend(resolver.builtins().into_iter().map(builtin_outbound));

        let mut config = Map::new();
        config.insert("log".to_string(), log);
        config.insert("experimental".to_string(), experimental);
        config.insert("inbounds".to_string(), Value::Array(inbounds));
        config.insert("outbounds".to_string(), Value::Array(outbounds));
        config.insert("route".to_string(), route);
        config.insert("dns".to_string(), dns);
        Ok(Value::Object(config))
    }

    /// Runs the complete pipeline
    pub async fn generate_config(&self, profile: &Profile) -> Result<Value> {
        let config = self.generate_base(profile).await?;

        debug!("Running on::generate plugins");
        let config = self.host.on_generate(config, profile).await?;

        let config = mixin::apply_mixin(config, &profile.mixin)?;

        let mut config =
            script::run_script(self.host.engine(), profile, config, self.host.deadline()).await?;

        finalize::enforce_invariants(&mut config);
        Ok(config)
    }

    /// Compiles and writes pretty JSON to `output_path`
    pub async fn generate_config_file<F: VirtualFileSystem>(
        &self,
        profile: &Profile,
        vfs: &F,
        output_path: &str,
    ) -> Result<Value> {
        let config = self.generate_config(profile).await?;
        let text =
            serde_json::to_string_pretty(&config).map_err(|e| Error::json("configuration", e))?;
        vfs.write_file(output_path, text.into_bytes()).await?;
        info!(
            "Wrote configuration of profile [{}] to {}",
            profile.name, output_path
        );
        Ok(config)
    }
}
