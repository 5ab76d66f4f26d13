use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::info;
use serde_json::Value;

use boxforge::models::{Plugin, PluginTrigger, Profile, RulesetFile, Subscription};
use boxforge::parser::ingest_subscription;
use boxforge::plugins::{PluginHost, PluginRegistry, ProcessEngine};
use boxforge::store::{load_list, save_list, SubscriptionStore};
use boxforge::vfs::{LocalFs, VirtualFileSystem};
use boxforge::{Compiler, Settings};

/// Compile routing profiles into sing-box configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the settings file (YAML or TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile one profile, selected by id or name
    Generate {
        profile: String,

        /// Output path inside the data directory
        #[arg(short, long, value_name = "OUTPUT_FILE")]
        output: Option<String>,

        /// Also run the on::before::core::start plugins
        #[arg(long)]
        before_core_start: bool,
    },

    /// Fire a lifecycle trigger
    Trigger { event: Lifecycle },

    /// Run one handler of one plugin
    RunPlugin {
        id: String,

        #[arg(long, default_value = "onRun")]
        event: String,

        /// Handler arguments, parsed as JSON when possible
        args: Vec<String>,
    },

    /// Ingest a fetched subscription body from a file
    Subscription { id: String, body: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Lifecycle {
    Startup,
    Shutdown,
    Ready,
    CoreStarted,
    CoreStopped,
    BeforeCoreStop,
}

impl From<Lifecycle> for PluginTrigger {
    fn from(value: Lifecycle) -> Self {
        match value {
            Lifecycle::Startup => PluginTrigger::OnStartup,
            Lifecycle::Shutdown => PluginTrigger::OnShutdown,
            Lifecycle::Ready => PluginTrigger::OnReady,
            Lifecycle::CoreStarted => PluginTrigger::OnCoreStarted,
            Lifecycle::CoreStopped => PluginTrigger::OnCoreStopped,
            Lifecycle::BeforeCoreStop => PluginTrigger::OnBeforeCoreStop,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    let vfs = LocalFs::new(&settings.data_dir);

    let plugins: Vec<Plugin> = load_list(&vfs, &settings.plugins_path)
        .await
        .context("Failed to load plugins")?;
    let mut registry = PluginRegistry::new(plugins, settings.plugin_settings.clone());
    registry.load(&vfs).await;
    let engine = ProcessEngine::new(
        settings.plugin.interpreter.clone(),
        settings.plugin.args.clone(),
    );
    let mut host = PluginHost::new(registry, engine).with_deadline(settings.plugin.deadline());

    match args.command {
        Command::Generate {
            profile,
            output,
            before_core_start,
        } => {
            let profiles: Vec<Profile> = load_list(&vfs, &settings.profiles_path)
                .await
                .context("Failed to load profiles")?;
            let profile = profiles
                .iter()
                .find(|p| p.id == profile || p.name == profile)
                .ok_or_else(|| anyhow!("Profile {} not found", profile))?;
            let subscriptions: Vec<Subscription> =
                load_list(&vfs, &settings.subscriptions_path).await?;
            let rulesets: Vec<RulesetFile> = load_list(&vfs, &settings.rulesets_path).await?;
            let store = SubscriptionStore::new(&vfs, subscriptions);
            let output = output.unwrap_or_else(|| settings.output_path.clone());

            let compiler = Compiler::new(&host, &store)
                .with_rulesets(&rulesets)
                .with_policy(settings.reference_policy);
            if before_core_start {
                let config = compiler.generate_config(profile).await?;
                let config = host.on_before_core_start(config, profile).await?;
                let text = serde_json::to_string_pretty(&config)?;
                vfs.write_file(&output, text.into_bytes()).await?;
                info!("Wrote configuration to {}", output);
            } else {
                compiler
                    .generate_config_file(profile, &vfs, &output)
                    .await?;
            }
        }
        Command::Trigger { event } => {
            let trigger = PluginTrigger::from(event);
            host.no_params_trigger(trigger)
                .await
                .with_context(|| format!("{} aborted", trigger.as_str()))?;
            save_list(&vfs, &settings.plugins_path, host.registry().plugins()).await?;
        }
        Command::RunPlugin { id, event, args } => {
            let args = args
                .iter()
                .map(|arg| serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.clone())))
                .collect();
            let result = host.manual_trigger(&id, &event, args).await?;
            save_list(&vfs, &settings.plugins_path, host.registry().plugins()).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Subscription { id, body } => {
            let text = tokio::fs::read_to_string(&body)
                .await
                .with_context(|| format!("Failed to read {}", body.display()))?;
            let subscriptions: Vec<Subscription> =
                load_list(&vfs, &settings.subscriptions_path).await?;
            let mut store = SubscriptionStore::new(&vfs, subscriptions);
            let subscription = store
                .get_mut(&id)
                .ok_or_else(|| anyhow!("Subscription {} not found", id))?;
            ingest_subscription(&host, &vfs, subscription, &text).await?;
            save_list(&vfs, &settings.subscriptions_path, store.subscriptions()).await?;
        }
    }
    Ok(())
}
