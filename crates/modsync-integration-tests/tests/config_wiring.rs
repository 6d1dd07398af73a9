//! Configuration flowing into the poller, watcher and logging setup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use modsync_config::{ConfigError, loader};
use modsync_devwatch::WatchSettings;
use modsync_poller::PollingScheduler;
use modsync_telemetry::{LogConfig, LogFormat};
use modsync_test::{MockFetcher, MockLoader, TEST_ROOT};

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[test]
fn env_bounds_reach_the_scheduler() {
    let config = loader::load(
        None,
        &env(&[
            ("ONE_CLIENT_ROOT_MODULE_NAME", TEST_ROOT),
            ("HOLOCRON_MODULE_MAP_URL", "https://holocron.example.com/module-map.json"),
            ("ONE_MAP_POLLING_MIN", "2.5"),
            ("ONE_MAP_POLLING_MAX", "60"),
        ]),
    )
    .unwrap();

    let scheduler = PollingScheduler::from_config(
        &config,
        Arc::new(MockFetcher::new()),
        Arc::new(MockLoader::new()),
    )
    .unwrap()
    .build();

    assert_eq!(scheduler.bounds().min(), Duration::from_millis(2500));
    assert_eq!(scheduler.bounds().max(), Duration::from_secs(60));
    assert_eq!(scheduler.poll_state().current_interval, Duration::from_millis(2500));
    assert_eq!(scheduler.synchronizer().root_module_name(), TEST_ROOT);
}

#[test]
fn inverted_bounds_fail_at_startup() {
    let err = loader::load(
        None,
        &env(&[
            ("ONE_CLIENT_ROOT_MODULE_NAME", TEST_ROOT),
            ("HOLOCRON_MODULE_MAP_URL", "https://holocron.example.com/module-map.json"),
            ("ONE_MAP_POLLING_MIN", "600"),
            ("ONE_MAP_POLLING_MAX", "60"),
        ]),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError { .. }));
}

#[test]
fn dev_watch_config_builds_watch_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("modsync.toml");
    std::fs::write(
        &path,
        r#"
[dev_watch]
enabled = true
module_dir = "build/modules"
change_interval_ms = 500
settle_interval_ms = 200

[logging]
format = "json"
directives = ["modsync_devwatch=debug"]
"#,
    )
    .unwrap();

    let config = loader::load(
        Some(&path),
        &env(&[("ONE_CLIENT_ROOT_MODULE_NAME", TEST_ROOT)]),
    )
    .unwrap();

    let settings = WatchSettings::from_config(&config.dev_watch).unwrap();
    assert_eq!(settings.change_interval(), Duration::from_millis(500));
    assert_eq!(settings.settle_interval(), Duration::from_millis(200));

    let log = LogConfig::try_from(&config.logging).unwrap();
    assert_eq!(log.format, LogFormat::Json);
    assert_eq!(log.directives, ["modsync_devwatch=debug"]);
}
