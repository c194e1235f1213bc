//! Settings files, environment overrides and mode selection, end to end.

use barreplay_core::calendar::CalendarError;
use barreplay_core::config::{load_settings_with_env, ConfigError};
use barreplay_core::data::sample::{synthetic_session, write_json};
use barreplay_core::{
    feed_for_mode, OpsCode, ReplayError, ReplayMode, ReplayState, SessionCalendar,
};
use chrono::NaiveDate;
use std::fs;
use std::path::Path;

fn session() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
}

fn write_fixtures(dir: &Path, symbols: &[&str]) {
    let calendar = SessionCalendar::default();
    for symbol in symbols {
        let rows = synthetic_session(&calendar, session(), symbol, 9);
        write_json(&dir.join(format!("{}.json", symbol.to_lowercase())), &rows).unwrap();
    }
}

fn toml_settings(dir: &Path) -> String {
    let path = |name: &str| format!("{:?}", dir.join(name).display().to_string());
    format!(
        r#"
symbols = ["SPY"]
context_symbols = ["QQQ"]

[paths]
spy = {}
QQQ = {}

[live]
enabled = false
provider = "polygon"
env_keys = ["POLYGON_KEY"]
"#,
        path("spy.json"),
        path("qqq.json"),
    )
}

fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn toml_settings_drive_a_historical_replay() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), &["SPY", "QQQ"]);
    let settings = dir.path().join("feed.toml");
    fs::write(&settings, toml_settings(dir.path())).unwrap();

    let config = load_settings_with_env(&settings, vars(&[])).unwrap();
    let mode: ReplayMode = "historical".parse().unwrap();
    let mut feed = feed_for_mode(config, mode).unwrap();
    let summary = feed.start(session(), mode).unwrap();

    assert_eq!(summary.state, ReplayState::Completed);
    assert_eq!(summary.dispatched["SPY"], 78);
    assert_eq!(summary.dispatched["QQQ"], 78);
    assert_eq!(feed.last_bar("SPY").map(|b| b.seq), Some(78));
}

#[test]
fn env_overrides_reach_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), &["SPY", "QQQ"]);
    let settings = dir.path().join("feed.toml");
    fs::write(&settings, toml_settings(dir.path())).unwrap();

    let config = load_settings_with_env(
        &settings,
        vars(&[("TS_HEARTBEAT_SECS", "3600"), ("UNRELATED", "1")]),
    )
    .unwrap();
    assert_eq!(config.heartbeat_secs, 3600);

    let mut feed = feed_for_mode(config, ReplayMode::Historical).unwrap();
    let summary = feed.start(session(), ReplayMode::Historical).unwrap();
    // 6.5 hours of buckets, one heartbeat per hour
    assert_eq!(summary.heartbeats, 7);
}

#[test]
fn paper_mode_reports_disabled_provider() {
    let dir = tempfile::tempdir().unwrap();
    let settings = dir.path().join("feed.toml");
    fs::write(&settings, toml_settings(dir.path())).unwrap();

    let config = load_settings_with_env(&settings, vars(&[])).unwrap();
    let mut feed = feed_for_mode(config, ReplayMode::Paper).unwrap();
    let summary = feed.start(session(), ReplayMode::Paper).unwrap();

    assert_eq!(summary.state, ReplayState::Stopped);
    let event = feed.bus().ops_events().next().unwrap();
    assert_eq!(event.code, OpsCode::ProviderError);
    assert_eq!(event.message, "Live provider disabled");
    assert_eq!(feed.bus().bars().count(), 0);
}

#[test]
fn enabling_live_by_env_then_missing_key_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let settings = dir.path().join("feed.toml");
    fs::write(&settings, toml_settings(dir.path())).unwrap();

    let config = load_settings_with_env(&settings, vars(&[("TS_LIVE__ENABLED", "true")])).unwrap();
    assert!(config.live.enabled);
    let live = barreplay_core::LiveFeed::new(&config, ReplayMode::Live)
        .unwrap()
        .with_env(|_| None);
    let mut feed: Box<dyn barreplay_core::Feed> = Box::new(live);
    feed.start(session(), ReplayMode::Live).unwrap();

    let event = feed.bus().ops_events().next().unwrap();
    assert_eq!(event.message, "Live provider credentials missing");
    assert_eq!(event.meta("missing"), Some(&serde_json::json!(["POLYGON_KEY"])));
}

#[test]
fn json_settings_are_supported() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), &["SPY"]);
    let settings = dir.path().join("feed.json");
    let doc = serde_json::json!({
        "symbols": ["SPY"],
        "context_symbols": [],
        "paths": { "SPY": dir.path().join("spy.json") },
        "session": { "bucket_minutes": 15 },
    });
    fs::write(&settings, doc.to_string()).unwrap();

    let config = load_settings_with_env(&settings, vars(&[])).unwrap();
    let mut feed = feed_for_mode(config, ReplayMode::Historical).unwrap();
    let summary = feed.start(session(), ReplayMode::Historical).unwrap();
    // five-minute rows collapse three to a bucket, last write wins
    assert_eq!(summary.dispatched["SPY"], 26);
    assert!(feed
        .bus()
        .ops_events()
        .any(|e| e.code == OpsCode::Duplicate));
}

#[test]
fn missing_settings_file_and_bad_mode_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_settings_with_env(&dir.path().join("absent.toml"), vars(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));

    let err = "replay".parse::<ReplayMode>().unwrap_err();
    assert!(matches!(err, ReplayError::UnsupportedMode(_)));
}

#[test]
fn invalid_session_window_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let settings = dir.path().join("feed.toml");
    fs::write(
        &settings,
        "symbols = [\"SPY\"]\n[session]\nrth_open = \"16:00\"\nrth_close = \"09:30\"\n",
    )
    .unwrap();
    let config = load_settings_with_env(&settings, vars(&[])).unwrap();
    let Err(err) = feed_for_mode(config, ReplayMode::Historical) else {
        panic!("inverted session window accepted");
    };
    assert!(matches!(err, ReplayError::Config(ConfigError::Calendar(_))));
}

#[test]
fn oversized_overrides_fail_before_replay() {
    let dir = tempfile::tempdir().unwrap();
    let settings = dir.path().join("feed.toml");
    fs::write(&settings, toml_settings(dir.path())).unwrap();

    let config = load_settings_with_env(
        &settings,
        vars(&[("TS_SESSION__BUCKET_MINUTES", "1000000000000")]),
    )
    .unwrap();
    let Err(err) = feed_for_mode(config, ReplayMode::Historical) else {
        panic!("bucket wider than the session accepted");
    };
    assert!(matches!(
        err,
        ReplayError::Config(ConfigError::Calendar(CalendarError::BucketWiderThanSession { .. }))
    ));

    let config = load_settings_with_env(
        &settings,
        vars(&[("TS_HEARTBEAT_SECS", i64::MAX.to_string().as_str())]),
    )
    .unwrap();
    let Err(err) = feed_for_mode(config, ReplayMode::Historical) else {
        panic!("unbounded heartbeat spacing accepted");
    };
    assert!(matches!(err, ReplayError::Config(ConfigError::InvalidHeartbeat(_))));
}
