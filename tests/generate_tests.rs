use boxforge::generator::script::SCRIPT_HANDLER;
use boxforge::models::{PluginTrigger, Profile, Subscription};
use boxforge::plugins::{NativeEngine, PluginHost, PluginRegistry};
use boxforge::store::SubscriptionStore;
use boxforge::vfs::{MemoryFs, VirtualFileSystem};
use boxforge::{Compiler, Error, Plugin, ReferencePolicy};
use serde_json::{json, Value};

#[cfg(test)]
mod generate_tests {
    use super::*;

    const MINIMAL_PROFILE: &str = r#"
id: profile-min
name: Minimal
inbounds:
  - id: in-1
    type: mixed
    tag: mixed-in
    mixed:
      listen:
        listen: 127.0.0.1
        listen_port: 20122
outbounds:
  - id: out-direct
    tag: Direct
    type: direct
script:
  code: "const onGenerate = async (config) => config"
"#;

    const FULL_PROFILE: &str = r#"
id: profile-1
name: Default
inbounds:
  - id: in-1
    type: mixed
    tag: mixed-in
  - id: in-2
    type: http
    tag: http-in
    enable: false
outbounds:
  - id: out-direct
    tag: Direct
    type: direct
  - id: out-select
    tag: Proxy
    type: selector
    outbounds:
      - { id: out-direct, type: Built-in, tag: Direct }
      - { id: sub-1, type: Subscription, tag: Provider }
route:
  final: out-select
  rules:
    - id: r1
      type: domain_suffix
      payload: ads.example,tracker.example
      action: route
      outbound: block
mixin:
  priority: mixin
  config: '{"log": {"level": "debug"}, "mixin_applied": true}'
script:
  code: "const onGenerate = async (config) => config"
"#;

    fn profile(text: &str) -> Profile {
        serde_yaml::from_str(text).unwrap()
    }

    fn identity_script(engine: NativeEngine, profile_id: &str) -> NativeEngine {
        engine.with_fn(profile_id, SCRIPT_HANDLER, |call| Ok(call.args[0].clone()))
    }

    fn subscriptions() -> (MemoryFs, Vec<Subscription>) {
        let vfs = MemoryFs::new().with_file(
            "data/subscribes/sub-1.json",
            r#"[{"type": "vmess", "tag": "A-01", "server": "a.example", "server_port": 443}]"#,
        );
        let subscription = Subscription {
            id: "sub-1".to_string(),
            name: "Provider".to_string(),
            path: "data/subscribes/sub-1.json".to_string(),
            ..Default::default()
        };
        (vfs, vec![subscription])
    }

    fn tags(outbounds: &Value) -> Vec<&str> {
        outbounds
            .as_array()
            .unwrap()
            .iter()
            .map(|outbound| outbound["tag"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_minimal_profile() {
        let profile = profile(MINIMAL_PROFILE);
        let engine = identity_script(NativeEngine::new(), &profile.id);
        let host = PluginHost::new(PluginRegistry::default(), engine);
        let vfs = MemoryFs::new();
        let store = SubscriptionStore::new(&vfs, Vec::new());

        let config = Compiler::new(&host, &store)
            .generate_config(&profile)
            .await
            .unwrap();

        let inbounds = config["inbounds"].as_array().unwrap();
        assert_eq!(inbounds.len(), 1);
        assert_eq!(inbounds[0]["tag"], json!("mixed-in"));
        assert_eq!(inbounds[0]["listen_port"], json!(20122));
        assert_eq!(config["outbounds"], json!([{"type": "direct", "tag": "Direct"}]));
        assert_eq!(config["log"]["level"], json!("info"));
        assert_eq!(config["log"]["disabled"], json!(false));
        assert_eq!(config["experimental"]["cache_file"]["path"], json!("cache.db"));
        assert_eq!(config["route"]["rules"], json!([]));
        assert!(config["route"].get("final").is_none());
        assert_eq!(config["dns"]["servers"], json!([]));
    }

    #[tokio::test]
    async fn test_top_level_key_order() {
        let profile = profile(MINIMAL_PROFILE);
        let engine = identity_script(NativeEngine::new(), &profile.id);
        let host = PluginHost::new(PluginRegistry::default(), engine);
        let vfs = MemoryFs::new();
        let store = SubscriptionStore::new(&vfs, Vec::new());

        let config = Compiler::new(&host, &store)
            .generate_base(&profile)
            .await
            .unwrap();
        let keys: Vec<&str> = config.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["log", "experimental", "inbounds", "outbounds", "route", "dns"]
        );
    }

    #[tokio::test]
    async fn test_full_pipeline_order() {
        let profile = profile(FULL_PROFILE);
        let (vfs, subscriptions) = subscriptions();
        let store = SubscriptionStore::new(&vfs, subscriptions);

        // the plugin runs before the mixin, the script after it
        let engine = NativeEngine::new()
            .with_fn("plugin-1", "onGenerate", |call| {
                let mut config = call.args[0].clone();
                config["plugin_saw_mixin"] = json!(config.get("mixin_applied").is_some());
                config["profile_name"] = call.args[1]["name"].clone();
                Ok(config)
            })
            .with_fn("profile-1", SCRIPT_HANDLER, |call| {
                let mut config = call.args[0].clone();
                config["script_saw_mixin"] = json!(config.get("mixin_applied").is_some());
                config["log"]["level"] = json!("loud");
                Ok(config)
            });
        let mut registry = PluginRegistry::default();
        registry.reload_plugin(
            Plugin {
                id: "plugin-1".to_string(),
                name: "Tagger".to_string(),
                triggers: vec![PluginTrigger::OnGenerate.into()],
                ..Default::default()
            },
            "const onGenerate = async (config) => config".to_string(),
        );
        let host = PluginHost::new(registry, engine);

        let config = Compiler::new(&host, &store)
            .generate_config(&profile)
            .await
            .unwrap();

        assert_eq!(config["plugin_saw_mixin"], json!(false));
        assert_eq!(config["profile_name"], json!("Default"));
        assert_eq!(config["script_saw_mixin"], json!(true));
        // script tampering with the level is undone by the final pass
        assert_eq!(config["log"]["level"], json!("info"));

        assert_eq!(tags(&config["inbounds"]), vec!["mixed-in"]);
        assert_eq!(tags(&config["outbounds"]), vec!["Direct", "Proxy", "A-01", "block"]);
        assert_eq!(config["outbounds"][1]["outbounds"], json!(["Direct", "A-01"]));
        assert_eq!(config["outbounds"][3], json!({"type": "block", "tag": "block"}));
        assert_eq!(config["route"]["final"], json!("Proxy"));
        assert_eq!(
            config["route"]["rules"][0],
            json!({
                "action": "route",
                "domain_suffix": ["ads.example", "tracker.example"],
                "outbound": "block"
            })
        );
    }

    #[tokio::test]
    async fn test_generate_config_file() {
        let profile = profile(MINIMAL_PROFILE);
        let engine = identity_script(NativeEngine::new(), &profile.id);
        let host = PluginHost::new(PluginRegistry::default(), engine);
        let vfs = MemoryFs::new();
        let store = SubscriptionStore::new(&vfs, Vec::new());

        let config = Compiler::new(&host, &store)
            .generate_config_file(&profile, &vfs, "data/sing-box/config.json")
            .await
            .unwrap();
        let written: Value =
            serde_json::from_str(&vfs.read_text("data/sing-box/config.json").await.unwrap())
                .unwrap();
        assert_eq!(written, config);
    }

    #[tokio::test]
    async fn test_reference_policy() {
        let mut profile = profile(MINIMAL_PROFILE);
        profile.route.final_outbound = "out-gone".to_string();
        let engine = identity_script(NativeEngine::new(), &profile.id);
        let host = PluginHost::new(PluginRegistry::default(), engine);
        let vfs = MemoryFs::new();
        let store = SubscriptionStore::new(&vfs, Vec::new());

        let config = Compiler::new(&host, &store)
            .generate_config(&profile)
            .await
            .unwrap();
        assert!(config["route"].get("final").is_none());

        let result = Compiler::new(&host, &store)
            .with_policy(ReferencePolicy::Strict)
            .generate_config(&profile)
            .await;
        match result {
            Err(Error::Unresolved(miss)) => assert_eq!(miss.id, "out-gone"),
            other => panic!("expected an unresolved reference, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failing_script_aborts() {
        let profile = profile(MINIMAL_PROFILE);
        let host = PluginHost::new(PluginRegistry::default(), NativeEngine::new());
        let vfs = MemoryFs::new();
        let store = SubscriptionStore::new(&vfs, Vec::new());

        let err = Compiler::new(&host, &store)
            .generate_config_file(&profile, &vfs, "data/sing-box/config.json")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("onGenerate is not defined"));
        assert!(!vfs.exists("data/sing-box/config.json").await.unwrap());
    }
}
