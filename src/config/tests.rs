use std::fs;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use super::load_config_from;
use super::settings::Settings;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.broker.url(), "ws://127.0.0.1:8080");
    assert_eq!(settings.broker.pool_size, 10);
    assert_eq!(settings.broker.min_idle, 2);
    assert_eq!(settings.broker.dial_timeout(), Duration::from_secs(5));
    assert_eq!(settings.broker.read_timeout(), Duration::from_secs(3));
    assert_eq!(settings.queue.buffer_capacity, 100);
    assert_eq!(settings.queue.delivery_timeout(), Duration::from_secs(1));
    assert_eq!(settings.queue.idle_timeout(), None);
    assert_eq!(settings.producer.topic, "scraper_events");
    assert_eq!(settings.producer.interval(), Duration::from_secs(3600));
}

#[test]
#[serial]
fn test_missing_file_yields_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let cfg = load_config_from(tmp.path().join("absent.toml")).expect("load_config failed");
    assert_eq!(cfg, Settings::default());
}

#[test]
#[serial]
fn test_load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("popqueue.toml");
    let toml = r#"
        [broker]
        host = "redis.internal"
        port = 9000
        pool_size = 4

        [queue]
        buffer_capacity = 8
        idle_timeout_secs = 600

        [log]
        level = "debug"
    "#;
    fs::write(&path, toml).expect("write config file");

    let cfg = load_config_from(&path).expect("load_config failed");
    assert_eq!(cfg.broker.host, "redis.internal");
    assert_eq!(cfg.broker.port, 9000);
    assert_eq!(cfg.broker.pool_size, 4);
    assert_eq!(cfg.broker.min_idle, 2);
    assert_eq!(cfg.queue.buffer_capacity, 8);
    assert_eq!(cfg.queue.idle_timeout(), Some(Duration::from_secs(600)));
    assert_eq!(cfg.queue.max_lifetime(), None);
    assert_eq!(cfg.log.level, "debug");
    assert_eq!(cfg.server, Settings::default().server);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("popqueue.toml");
    fs::write(&path, "[broker]\nport = 9000\n").expect("write config file");

    temp_env::with_vars(
        [
            ("POPQUEUE_BROKER__PORT", Some("6390")),
            ("POPQUEUE_QUEUE__DELIVERY_TIMEOUT_MS", Some("250")),
            ("POPQUEUE_PRODUCER__TOPIC", Some("snb_rates")),
        ],
        || {
            let cfg = load_config_from(&path).expect("load_config failed");
            assert_eq!(cfg.broker.port, 6390);
            assert_eq!(cfg.queue.delivery_timeout(), Duration::from_millis(250));
            assert_eq!(cfg.producer.topic, "snb_rates");
        },
    );
}
