use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub cluster: ClusterConfig,
    pub guardrails: GuardrailConfig,
    pub monitor: MonitorConfig,
}

/// Well-known env keys that identify a profile when prefixed.
const PROFILE_MARKER_KEYS: &[&str] = &["ES_URL", "KIBANA_URL"];

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `L2M_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("L2M_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            store: StoreConfig::from_env_profiled(p),
            cluster: ClusterConfig::from_env_profiled(p),
            guardrails: GuardrailConfig::from_env_profiled(p),
            monitor: MonitorConfig::from_env_profiled(p),
        }
    }

    /// Discover available profiles by scanning env vars for `{PREFIX}_{MARKER_KEY}`.
    /// Always includes "default" (the unprefixed config).
    pub fn available_profiles() -> Vec<String> {
        let mut profiles = std::collections::BTreeSet::new();
        profiles.insert("default".to_string());

        for (key, _) in env::vars() {
            for marker in PROFILE_MARKER_KEYS {
                if let Some(prefix) = key.strip_suffix(&format!("_{}", marker)) {
                    if !prefix.is_empty()
                        && prefix.chars().all(|c| c.is_ascii_uppercase() || c == '_')
                    {
                        profiles.insert(prefix.to_string());
                    }
                }
            }
        }

        profiles.into_iter().collect()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() {
            "default"
        } else {
            &self.profile
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:     port={}", self.server.port);
        tracing::info!("  store:      data_dir={}", self.store.data_dir.display());
        tracing::info!(
            "  cluster:    es={}, kibana={}, auth={}",
            self.cluster.es_url,
            self.cluster.kibana_url,
            if self.cluster.is_authenticated() { "basic" } else { "none" }
        );
        tracing::info!(
            "  guardrails: max_dimensions={}, max_series={}",
            self.guardrails.max_dimensions,
            self.guardrails.max_series
        );
        tracing::info!(
            "  monitor:    interval={}s",
            self.monitor.health_check_interval_secs
        );
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port },
            "store": { "data_dir": self.store.data_dir },
            "cluster": {
                "es_url": self.cluster.es_url,
                "kibana_url": self.cluster.kibana_url,
                "authenticated": self.cluster.is_authenticated(),
            },
            "guardrails": {
                "max_dimensions": self.guardrails.max_dimensions,
                "max_series": self.guardrails.max_series,
                "denylist_extra": self.guardrails.denylist_extra,
            },
            "monitor": {
                "health_check_interval_secs": self.monitor.health_check_interval_secs,
            },
        })
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 3001),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Store ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

impl StoreConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "DATA_DIR", "data")),
        }
    }

    pub fn rules_path(&self) -> PathBuf {
        self.data_dir.join("rules.json")
    }
}

// ── Cluster (log store + dashboard system) ────────────────────

/// One backend cluster: the log/metric store and its dashboard system,
/// configured together. A single entry type keeps the two endpoints and
/// their shared credentials in lockstep; there are no parallel per-concern
/// maps that could drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub es_url: String,
    pub kibana_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ClusterConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            es_url: profiled_env_or(p, "ES_URL", "http://elasticsearch:9200"),
            kibana_url: profiled_env_or(p, "KIBANA_URL", "http://kibana:5601"),
            username: profiled_env_opt(p, "ES_USERNAME"),
            password: profiled_env_opt(p, "ES_PASSWORD"),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Basic-auth pair when both parts are configured.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(u), Some(pw)) => Some((u, pw)),
            _ => None,
        }
    }
}

// ── Guardrails ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    pub max_dimensions: usize,
    pub max_series: u64,
    /// Extra denylisted dimension names on top of the built-in list,
    /// comma-separated in `DIMENSION_DENYLIST`.
    pub denylist_extra: Vec<String>,
}

impl GuardrailConfig {
    fn from_env_profiled(p: &str) -> Self {
        let denylist_extra = profiled_env_opt(p, "DIMENSION_DENYLIST")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            max_dimensions: profiled_env_usize(p, "MAX_DIMENSIONS", 5),
            max_series: profiled_env_u64(p, "MAX_SERIES", 100_000),
            denylist_extra,
        }
    }
}

// ── Health monitor ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub health_check_interval_secs: u64,
}

impl MonitorConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            health_check_interval_secs: profiled_env_u64(p, "HEALTH_CHECK_INTERVAL", 60),
        }
    }
}
