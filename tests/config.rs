use std::fs;

use cardsync::config::{Config, CONFIG_FILE};
use cardsync::engine::EngineSettings;
use cardsync::watch::WatchOptions;
use cardsync::Error;

#[test]
fn load_from_vault_rejects_invalid_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join(CONFIG_FILE), "[vault]\ntag = \"two words\"").expect("write config");

    let err = Config::load_from_vault(dir.path()).expect_err("invalid tag");
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn load_from_vault_reports_malformed_toml() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join(CONFIG_FILE), "[sync\nenabled = true").expect("write config");

    let err = Config::load_from_vault(dir.path()).expect_err("malformed");
    assert!(matches!(err, Error::TomlParse(_)));
}

#[test]
fn partial_sections_keep_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let content = r#"
[sync]
reorder_on_write = true
watch_debounce_ms = 500
"#;
    fs::write(dir.path().join(CONFIG_FILE), content.trim()).expect("write config");

    let cfg = Config::load_from_vault(dir.path()).expect("load config");
    assert!(cfg.sync.reorder_on_write);
    assert_eq!(cfg.sync.fetch_interval_ms, 60_000);
    assert_eq!(cfg.vault.tag, "kanban_card");
    assert_eq!(cfg.remote.max_calls_per_sec, 4);

    let settings = EngineSettings::from_config(&cfg);
    assert!(settings.reorder_on_write);
    assert_eq!(settings.time_zone, "UTC");

    let watch = WatchOptions::from_config(&cfg);
    assert_eq!(watch.debounce.as_millis(), 500);
    assert_eq!(watch.fetch_interval.as_secs(), 60);
    assert!(watch.sync_enabled);
}
