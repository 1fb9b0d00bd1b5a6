use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observation::Taxonomy;

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

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_list(profile: &str, key: &str) -> Option<Vec<String>> {
    profiled_env_opt(profile, key).map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub taxonomy: Taxonomy,
    pub detection: DetectionConfig,
    pub alerting: AlertConfig,
}

impl PulseConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `PULSE_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("PULSE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let defaults = Taxonomy::default();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            taxonomy: Taxonomy {
                regions: profiled_env_list(p, "PULSE_REGIONS").unwrap_or(defaults.regions),
                sectors: profiled_env_list(p, "PULSE_SECTORS").unwrap_or(defaults.sectors),
            },
            detection: DetectionConfig::from_env_profiled(p),
            alerting: AlertConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:     {}:{}", self.server.host, self.server.port);
        tracing::info!("  storage:    data_file={}", self.storage.data_file.display());
        tracing::info!(
            "  taxonomy:   {} regions, {} sectors",
            self.taxonomy.regions.len(),
            self.taxonomy.sectors.len()
        );
        tracing::info!(
            "  detection:  contamination={}, estimators={}, min_observations={}, seed={}",
            self.detection.contamination,
            self.detection.n_estimators,
            self.detection.min_observations,
            self.detection
                .random_seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "(entropy)".to_string())
        );
        tracing::info!(
            "  alerting:   smtp={}, recipient={}, timeout={}s",
            self.alerting.smtp_host.as_deref().unwrap_or("(disabled)"),
            self.alerting.recipient,
            self.alerting.timeout_secs
        );
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port },
            "storage": { "data_file": self.storage.data_file },
            "taxonomy": self.taxonomy,
            "detection": self.detection,
            "alerting": {
                "smtp_host": self.alerting.smtp_host,
                "smtp_port": self.alerting.smtp_port,
                "sender": self.alerting.sender,
                "recipient": self.alerting.recipient,
                "timeout_secs": self.alerting.timeout_secs,
                "configured": self.alerting.is_configured(),
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
            port: profiled_env_parse(p, "PORT", 3001),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_file: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_file: PathBuf::from(profiled_env_or(p, "PULSE_DATA_FILE", "pulse_data.csv")),
        }
    }
}

// ── Anomaly detection ─────────────────────────────────────────

/// Isolation forest parameters plus the minimum batch size for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Expected outlier fraction. A prior, not a quota.
    pub contamination: f64,
    pub n_estimators: usize,
    /// Per-tree sample size, clamped to the batch size.
    pub max_samples: usize,
    /// Below this many observations the detector is not run.
    pub min_observations: usize,
    /// Fixed seed for reproducible runs; `None` draws from OS entropy.
    pub random_seed: Option<u64>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            n_estimators: 100,
            max_samples: 256,
            min_observations: 10,
            random_seed: None,
        }
    }
}

impl DetectionConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            contamination: profiled_env_parse(p, "ANOMALY_CONTAMINATION", d.contamination),
            n_estimators: profiled_env_parse(p, "ANOMALY_ESTIMATORS", d.n_estimators),
            max_samples: profiled_env_parse(p, "ANOMALY_MAX_SAMPLES", d.max_samples),
            min_observations: profiled_env_parse(p, "ANOMALY_MIN_OBSERVATIONS", d.min_observations),
            random_seed: profiled_env_opt(p, "ANOMALY_SEED").and_then(|v| v.parse().ok()),
        }
    }

    /// Same parameters with a pinned seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }
}

// ── Alerting (SMTP) ───────────────────────────────────────────

pub const DEFAULT_SUBJECT_TEMPLATE: &str = "Alert: {{ sector }} anomaly in {{ region }}";
pub const DEFAULT_BODY_TEMPLATE: &str = "Alert: Unusual activity in {{ region }} ({{ sector }}) - \
Crowd Index {{ crowd_index }}, Queue Time {{ queue_time | minutes }} mins";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// SMTP relay host. `None` leaves alerting without a channel.
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_tls: bool,
    pub smtp_username: Option<String>,
    #[serde(skip_serializing)]
    pub smtp_password: Option<String>,
    pub sender: String,
    /// Single fixed recipient for every alert.
    pub recipient: String,
    /// Upper bound on one delivery attempt.
    pub timeout_secs: u64,
    pub subject_template: String,
    pub body_template: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: 465,
            smtp_tls: true,
            smtp_username: None,
            smtp_password: None,
            sender: "pulse-alerts@example.com".to_string(),
            recipient: "pulse-oncall@example.com".to_string(),
            timeout_secs: 5,
            subject_template: DEFAULT_SUBJECT_TEMPLATE.to_string(),
            body_template: DEFAULT_BODY_TEMPLATE.to_string(),
        }
    }
}

impl AlertConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            smtp_host: profiled_env_opt(p, "SMTP_HOST"),
            smtp_port: profiled_env_parse(p, "SMTP_PORT", d.smtp_port),
            smtp_tls: profiled_env_or(p, "SMTP_TLS", "true") != "false",
            smtp_username: profiled_env_opt(p, "SMTP_USERNAME"),
            smtp_password: profiled_env_opt(p, "SMTP_PASSWORD"),
            sender: profiled_env_or(p, "ALERT_SENDER", &d.sender),
            recipient: profiled_env_or(p, "ALERT_RECIPIENT", &d.recipient),
            timeout_secs: profiled_env_parse(p, "ALERT_TIMEOUT_SECS", d.timeout_secs),
            subject_template: profiled_env_or(p, "ALERT_SUBJECT_TEMPLATE", &d.subject_template),
            body_template: profiled_env_or(p, "ALERT_BODY_TEMPLATE", &d.body_template),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some()
    }
}
