use std::collections::HashMap;

use super::*;

fn config_from(pairs: &[(&str, &str)]) -> Result<TrackerConfig, ConfigError> {
    let env: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
    TrackerConfig::from_lookup(|key| env.get(key).cloned())
}

#[test]
fn defaults_apply_when_unset() {
    let cfg = config_from(&[]).expect("defaults");
    assert_eq!(cfg.port, DEFAULT_PORT);
    assert_eq!(cfg.api_url, DEFAULT_API_URL);
    assert_eq!(cfg.feed_url, DEFAULT_FEED_URL);
    assert_eq!(cfg.cfauth, None);
    assert_eq!(cfg.http_timeout, Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
    assert_eq!(cfg.reconnect_backoff, Duration::from_millis(DEFAULT_RECONNECT_BACKOFF_MS));
    assert_eq!(cfg.pause_queue_capacity, DEFAULT_PAUSE_QUEUE_CAPACITY);
    assert_eq!(cfg.canvas_refresh, Duration::from_secs(DEFAULT_CANVAS_REFRESH_SECS));
    assert_eq!(cfg.archive_dir, PathBuf::from(DEFAULT_ARCHIVE_DIR));
    assert_eq!(cfg.cooldown, CooldownParams::default());
}

#[test]
fn explicit_values_override_defaults() {
    let cfg = config_from(&[
        ("PORT", "8080"),
        ("PXLS_API_URL", "https://canvas.example/"),
        ("PXLS_CFAUTH", "token"),
        ("FEED_RECONNECT_BACKOFF_MS", "250"),
        ("ARCHIVE_DIR", "/srv/archives"),
        ("COOLDOWN_USER_OFFSET", "12"),
        ("COOLDOWN_STACK_MULTIPLIER", "2.5"),
    ])
    .expect("config");

    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.api_url, "https://canvas.example");
    assert_eq!(cfg.cfauth.as_deref(), Some("token"));
    assert_eq!(cfg.reconnect_backoff, Duration::from_millis(250));
    assert_eq!(cfg.archive_dir, PathBuf::from("/srv/archives"));
    assert!((cfg.cooldown.user_offset - 12.0).abs() < f64::EPSILON);
    assert!((cfg.cooldown.stack_multiplier - 2.5).abs() < f64::EPSILON);
}

#[test]
fn unparseable_numbers_fall_back_to_defaults() {
    let cfg = config_from(&[("PORT", "eighty"), ("FEED_PAUSE_QUEUE_CAPACITY", "-3"), ("COOLDOWN_STEEPNESS", "")]).expect("config");
    assert_eq!(cfg.port, DEFAULT_PORT);
    assert_eq!(cfg.pause_queue_capacity, DEFAULT_PAUSE_QUEUE_CAPACITY);
    assert!((cfg.cooldown.steepness - 2.5).abs() < f64::EPSILON);
}

#[test]
fn malformed_url_is_rejected() {
    let err = config_from(&[("PXLS_FEED_URL", "not a url")]).expect_err("bad url");
    assert!(matches!(err, ConfigError::InvalidUrl { key: "PXLS_FEED_URL", .. }));
    assert_eq!(err.kind(), ErrorKind::Fatal);
}

#[test]
fn blank_cfauth_is_treated_as_unset() {
    let cfg = config_from(&[("PXLS_CFAUTH", "  ")]).expect("config");
    assert_eq!(cfg.cfauth, None);
}

#[test]
fn canvas_refresh_interval_is_at_least_one_second() {
    assert_eq!(config_from(&[("CANVAS_REFRESH_SECS", "300")]).expect("config").canvas_refresh, Duration::from_secs(300));
    assert_eq!(config_from(&[("CANVAS_REFRESH_SECS", "0")]).expect("config").canvas_refresh, Duration::from_secs(1));
}
