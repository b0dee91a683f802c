use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use crate::configuration::Config;

#[test]
fn defaults() {
    let config: Config = serde_json::from_value(json!({})).unwrap();

    assert_eq!(config, Config::default());
    assert!(config.compile_on_change);
    assert!(config.compile_on_save);
    assert!(!config.cache_workspace);
    assert_eq!(config.debounce(), Duration::from_millis(300));
}

#[test]
fn camel_case_keys() {
    let config: Config = serde_json::from_value(json!({
        "compileOnChange": false,
        "debounceMs": 50,
        "cacheWorkspace": true,
        "compilerPath": "/opt/yara/bin/yarac",
        "someOtherSetting": 1,
    }))
    .unwrap();

    assert_eq!(
        config,
        Config {
            compile_on_change: false,
            compile_on_save: true,
            debounce_ms: 50,
            cache_workspace: true,
            compiler_path: "/opt/yara/bin/yarac".to_string(),
        }
    );
}

#[test]
fn wrong_types_are_rejected() {
    assert!(serde_json::from_value::<Config>(json!({"debounceMs": "fast"})).is_err());
}
