//! Serializable feed configuration.
//!
//! Settings files are TOML (or JSON when the extension is `.json`). After
//! parsing, environment variables named `TS_<a>__<b>...` override the nested
//! key `a.b...`; values are coerced to bool, integer or float when they look
//! like one.

use crate::calendar::{CalendarError, SessionCalendar};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "TS_";

/// Upper bound on `heartbeat_secs`: one week of session time.
pub const MAX_HEARTBEAT_SECS: i64 = 7 * 24 * 60 * 60;

/// Errors from reading or interpreting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no symbols configured")]
    NoSymbols,

    #[error("no path configured for symbol {symbol}")]
    MissingPath { symbol: String },

    #[error("failed to read settings {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(String),

    #[error("heartbeat spacing must be between 0 and {max} seconds (got {0})", max = MAX_HEARTBEAT_SECS)]
    InvalidHeartbeat(i64),

    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

/// Everything the replay core consumes from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Ordered symbols; the first is the primary instrument.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Auxiliary instruments aligned onto the primary.
    #[serde(default = "default_context_symbols")]
    pub context_symbols: Vec<String>,

    /// Symbol → record file. Lookup is case-insensitive.
    #[serde(default)]
    pub paths: BTreeMap<String, PathBuf>,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub live: LiveConfig,

    /// Minimum session time between heartbeats.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: i64,
}

/// Exchange session window and bucket grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub timezone: String,
    pub rth_open: String,
    pub rth_close: String,
    pub bucket_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".into(),
            rth_open: "09:30".into(),
            rth_close: "16:00".into(),
            bucket_minutes: crate::calendar::DEFAULT_BUCKET_MINUTES,
        }
    }
}

/// Paper/live provider settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub enabled: bool,
    pub provider: String,
    /// Environment variables that must be set for the provider to start.
    pub env_keys: Vec<String>,
}

fn default_symbols() -> Vec<String> {
    vec!["SPY".into()]
}

fn default_context_symbols() -> Vec<String> {
    ["QQQ", "IWM", "DIA", "VIX"].into_iter().map(String::from).collect()
}

fn default_heartbeat_secs() -> i64 {
    60
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            context_symbols: default_context_symbols(),
            paths: BTreeMap::new(),
            session: SessionConfig::default(),
            live: LiveConfig::default(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl FeedConfig {
    /// Parse a TOML settings document (no environment overrides).
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Builder-style path registration.
    pub fn with_path(mut self, symbol: &str, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(symbol.to_string(), path.into());
        self
    }

    pub fn primary_symbol(&self) -> Result<&str, ConfigError> {
        self.symbols
            .first()
            .map(String::as_str)
            .ok_or(ConfigError::NoSymbols)
    }

    /// Configured symbols followed by any context symbols not already listed.
    pub fn instrument_set(&self) -> Result<Vec<String>, ConfigError> {
        self.primary_symbol()?;
        let mut all = self.symbols.clone();
        for symbol in &self.context_symbols {
            if !all.contains(symbol) {
                all.push(symbol.clone());
            }
        }
        Ok(all)
    }

    /// Path for `symbol`: exact key, then lowercase key, then any case-insensitive match.
    pub fn resolve_path(&self, symbol: &str) -> Result<&Path, ConfigError> {
        self.paths
            .get(symbol)
            .or_else(|| self.paths.get(&symbol.to_lowercase()))
            .or_else(|| {
                self.paths
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(symbol))
                    .map(|(_, path)| path)
            })
            .map(PathBuf::as_path)
            .ok_or_else(|| ConfigError::MissingPath {
                symbol: symbol.to_string(),
            })
    }

    /// `heartbeat_secs` as a duration, rejecting negative or absurd spacings.
    pub fn heartbeat_interval(&self) -> Result<Duration, ConfigError> {
        let secs = self.heartbeat_secs;
        if !(0..=MAX_HEARTBEAT_SECS).contains(&secs) {
            return Err(ConfigError::InvalidHeartbeat(secs));
        }
        Duration::try_seconds(secs).ok_or(ConfigError::InvalidHeartbeat(secs))
    }

    pub fn calendar(&self) -> Result<SessionCalendar, ConfigError> {
        Ok(SessionCalendar::from_settings(
            &self.session.timezone,
            &self.session.rth_open,
            &self.session.rth_close,
            self.session.bucket_minutes,
        )?)
    }
}

/// Load settings from `path` and apply `TS_*` overrides from the process environment.
pub fn load_settings(path: &Path) -> Result<FeedConfig, ConfigError> {
    load_settings_with_env(path, std::env::vars())
}

/// Load settings from `path` and apply `TS_*` overrides from `vars`.
pub fn load_settings_with_env<I>(path: &Path, vars: I) -> Result<FeedConfig, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let mut tree: serde_json::Value = if is_json {
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
    } else {
        let parsed: toml::Value =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        serde_json::to_value(parsed).map_err(|e| ConfigError::Parse(e.to_string()))?
    };
    if tree.is_null() {
        tree = serde_json::Value::Object(serde_json::Map::new());
    }
    apply_env_overrides(&mut tree, vars);
    serde_json::from_value(tree).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Apply every `TS_a__b=value` pair in `vars` onto the settings tree.
pub fn apply_env_overrides<I>(tree: &mut serde_json::Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let Some(rest) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let keys: Vec<String> = rest
            .split("__")
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase)
            .collect();
        if keys.is_empty() {
            continue;
        }
        if !tree.is_object() {
            *tree = serde_json::Value::Object(serde_json::Map::new());
        }
        if let serde_json::Value::Object(map) = tree {
            apply_override(map, &keys, coerce_env_value(&value));
        }
    }
}

fn apply_override(
    map: &mut serde_json::Map<String, serde_json::Value>,
    keys: &[String],
    value: serde_json::Value,
) {
    let Some((first, rest)) = keys.split_first() else {
        return;
    };
    let slot = matching_key(map, first).unwrap_or_else(|| first.clone());
    if rest.is_empty() {
        map.insert(slot, value);
        return;
    }
    let child = map
        .entry(slot)
        .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    if !child.is_object() {
        *child = serde_json::Value::Object(serde_json::Map::new());
    }
    if let serde_json::Value::Object(child_map) = child {
        apply_override(child_map, rest, value);
    }
}

/// Existing key equal to `key` ignoring ASCII case, so overrides replace rather than shadow.
fn matching_key(map: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<String> {
    map.keys().find(|k| k.eq_ignore_ascii_case(key)).cloned()
}

fn coerce_env_value(value: &str) -> serde_json::Value {
    let lowered = value.to_ascii_lowercase();
    if lowered == "true" || lowered == "false" {
        return serde_json::Value::Bool(lowered == "true");
    }
    if value.contains('.') {
        if let Ok(float) = value.parse::<f64>() {
            return serde_json::json!(float);
        }
    } else if let Ok(int) = value.parse::<i64>() {
        return serde_json::json!(int);
    }
    serde_json::Value::String(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_match_reference_basket() {
        let config = FeedConfig::default();
        assert_eq!(config.symbols, vec!["SPY"]);
        assert_eq!(config.context_symbols, vec!["QQQ", "IWM", "DIA", "VIX"]);
        assert_eq!(config.heartbeat_secs, 60);
        assert!(!config.live.enabled);
        assert_eq!(config.session.bucket_minutes, 5);
    }

    #[test]
    fn parses_toml() {
        let config = FeedConfig::from_toml(
            r#"
            symbols = ["SPY"]
            context_symbols = ["QQQ"]

            [paths]
            spy = "data/spy.json"
            QQQ = "data/qqq.csv"

            [live]
            enabled = true
            provider = "alpaca"
            env_keys = ["ALPACA_KEY"]
            "#,
        )
        .unwrap();
        assert_eq!(config.context_symbols, vec!["QQQ"]);
        assert_eq!(config.live.provider, "alpaca");
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn instrument_set_appends_unlisted_context_symbols() {
        let config = FeedConfig {
            symbols: vec!["SPY".into(), "QQQ".into()],
            ..FeedConfig::default()
        };
        assert_eq!(
            config.instrument_set().unwrap(),
            vec!["SPY", "QQQ", "IWM", "DIA", "VIX"]
        );
    }

    #[test]
    fn heartbeat_spacing_is_bounded() {
        let mut config = FeedConfig::default();
        assert_eq!(config.heartbeat_interval().unwrap(), Duration::seconds(60));

        config.heartbeat_secs = 0;
        assert_eq!(config.heartbeat_interval().unwrap(), Duration::zero());

        for bad in [-1, MAX_HEARTBEAT_SECS + 1, i64::MAX] {
            config.heartbeat_secs = bad;
            assert!(matches!(
                config.heartbeat_interval(),
                Err(ConfigError::InvalidHeartbeat(secs)) if secs == bad
            ));
        }
    }

    #[test]
    fn empty_symbol_list_is_an_error() {
        let config = FeedConfig {
            symbols: vec![],
            ..FeedConfig::default()
        };
        assert!(matches!(config.primary_symbol(), Err(ConfigError::NoSymbols)));
        assert!(matches!(config.instrument_set(), Err(ConfigError::NoSymbols)));
    }

    #[test]
    fn path_lookup_is_case_insensitive() {
        let config = FeedConfig::default()
            .with_path("spy", "a.json")
            .with_path("Qqq", "b.json")
            .with_path("IWM", "c.json");
        assert_eq!(config.resolve_path("SPY").unwrap(), Path::new("a.json"));
        assert_eq!(config.resolve_path("QQQ").unwrap(), Path::new("b.json"));
        assert_eq!(config.resolve_path("iwm").unwrap(), Path::new("c.json"));
        assert!(matches!(
            config.resolve_path("DIA"),
            Err(ConfigError::MissingPath { .. })
        ));
    }

    #[test]
    fn env_overrides_nest_and_coerce() {
        let mut tree = serde_json::json!({"live": {"enabled": false}, "paths": {"SPY": "old.json"}});
        apply_env_overrides(
            &mut tree,
            vars(&[
                ("TS_LIVE__ENABLED", "TRUE"),
                ("TS_LIVE__PROVIDER", "alpaca"),
                ("TS_HEARTBEAT_SECS", "120"),
                ("TS_SESSION__RATIO", "0.5"),
                ("TS_PATHS__SPY", "new.json"),
                ("OTHER_VAR", "ignored"),
            ]),
        );
        assert_eq!(tree["live"]["enabled"], true);
        assert_eq!(tree["live"]["provider"], "alpaca");
        assert_eq!(tree["heartbeat_secs"], 120);
        assert_eq!(tree["session"]["ratio"], 0.5);
        assert_eq!(tree["paths"]["SPY"], "new.json");
        assert!(tree.get("other_var").is_none());
    }

    #[test]
    fn load_settings_reads_file_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "symbols = [\"SPY\"]\n[live]\nenabled = false\n").unwrap();

        let config =
            load_settings_with_env(&path, vars(&[("TS_LIVE__ENABLED", "true")])).unwrap();
        assert!(config.live.enabled);
        assert_eq!(config.symbols, vec!["SPY"]);
    }

    #[test]
    fn load_settings_accepts_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"symbols": ["QQQ"], "paths": {"qqq": "q.json"}}"#).unwrap();
        let config = load_settings_with_env(&path, Vec::new()).unwrap();
        assert_eq!(config.primary_symbol().unwrap(), "QQQ");
        assert_eq!(config.resolve_path("QQQ").unwrap(), Path::new("q.json"));
    }

    #[test]
    fn missing_settings_file_is_an_error() {
        let err = load_settings_with_env(Path::new("/no/such/settings.toml"), Vec::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn invalid_session_settings_surface_as_calendar_errors() {
        let mut config = FeedConfig::default();
        config.session.bucket_minutes = 0;
        assert!(matches!(config.calendar(), Err(ConfigError::Calendar(_))));
    }
}
