use std::collections::HashMap;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn empty_environment_yields_defaults() {
    let config = ServerConfig::from_lookup(lookup_from(&[])).expect("defaults should parse");
    assert_eq!(config, ServerConfig::default());
    assert_eq!(config.max_history_per_room, 500);
    assert_eq!(config.max_rooms, 1000);
    assert!(config.shared_secret.is_none());
    assert!(config.idle_timeout.is_none());
}

#[test]
fn numeric_overrides_are_applied() {
    let config = ServerConfig::from_lookup(lookup_from(&[
        ("PORT", "8080"),
        ("MAX_HISTORY_PER_ROOM", "2"),
        ("MAX_ROOMS", "1"),
        ("IDLE_TIMEOUT_SECS", "45"),
        ("BROADCAST_SEND_TIMEOUT_MS", "150"),
        ("ROOM_IDLE_TTL_SECS", "0"),
    ]))
    .expect("overrides should parse");

    assert_eq!(config.port, 8080);
    assert_eq!(config.max_history_per_room, 2);
    assert_eq!(config.max_rooms, 1);
    assert_eq!(config.idle_timeout, Some(Duration::from_secs(45)));
    assert_eq!(config.broadcast_send_timeout, Duration::from_millis(150));
    assert_eq!(config.room_idle_ttl, Duration::ZERO);
}

#[test]
fn zero_idle_timeout_disables_it() {
    let config = ServerConfig::from_lookup(lookup_from(&[("IDLE_TIMEOUT_SECS", "0")])).expect("parse");
    assert!(config.idle_timeout.is_none());
}

#[test]
fn invalid_number_is_rejected_with_key() {
    let err = ServerConfig::from_lookup(lookup_from(&[("MAX_ROOMS", "lots")])).expect_err("should fail");
    assert_eq!(err, ConfigError::Invalid { key: "MAX_ROOMS", value: "lots".into() });
}

#[test]
fn zero_queue_capacity_is_rejected() {
    let err = ServerConfig::from_lookup(lookup_from(&[("OUTBOUND_QUEUE_CAPACITY", "0")])).expect_err("should fail");
    assert_eq!(err, ConfigError::Zero { key: "OUTBOUND_QUEUE_CAPACITY" });
}

#[test]
fn blank_shared_secret_counts_as_unset() {
    let config = ServerConfig::from_lookup(lookup_from(&[("SHARED_SECRET", "   ")])).expect("parse");
    assert!(config.shared_secret.is_none());

    let config = ServerConfig::from_lookup(lookup_from(&[("SHARED_SECRET", " s3cret ")])).expect("parse");
    assert_eq!(config.shared_secret.as_deref(), Some("s3cret"));
}

#[test]
fn allow_missing_origin_accepts_bool_spellings() {
    for (raw, expected) in [("yes", true), ("OFF", false), ("1", true), ("false", false)] {
        let config = ServerConfig::from_lookup(lookup_from(&[("ALLOW_MISSING_ORIGIN", raw)])).expect("parse");
        assert_eq!(config.allow_missing_origin, expected, "for {raw:?}");
    }
    assert!(ServerConfig::from_lookup(lookup_from(&[("ALLOW_MISSING_ORIGIN", "maybe")])).is_err());
}

#[test]
fn allowed_origins_are_trimmed_and_split() {
    let config = ServerConfig::from_lookup(lookup_from(&[(
        "ALLOWED_ORIGINS",
        " http://a.test , ,https://b.test",
    )]))
    .expect("parse");
    assert_eq!(config.allowed_origins, vec!["http://a.test".to_owned(), "https://b.test".to_owned()]);
}

#[test]
fn origin_matching_rules() {
    let config = ServerConfig {
        allowed_origins: vec!["http://localhost:5173".into(), "https://*.onrender.com".into()],
        ..ServerConfig::default()
    };
    assert!(config.origin_allowed("http://localhost:5173"));
    assert!(config.origin_allowed("https://board.onrender.com"));
    assert!(!config.origin_allowed("https://onrender.com"));
    assert!(!config.origin_allowed("https://evilonrender.com"));
    assert!(!config.origin_allowed("http://board.onrender.com"));
    assert!(!config.origin_allowed("http://localhost:9999"));
}

#[test]
fn wildcard_or_empty_list_allows_any_origin() {
    let star = ServerConfig { allowed_origins: vec!["*".into()], ..ServerConfig::default() };
    assert!(star.origin_allowed("https://anything.example"));

    let empty = ServerConfig { allowed_origins: Vec::new(), ..ServerConfig::default() };
    assert!(empty.origin_allowed("https://anything.example"));
}
