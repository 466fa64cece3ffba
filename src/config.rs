//! Dashboard configuration.
//!
//! Resolution order: built-in defaults, then an optional JSON file named by
//! `PATROL_CONFIG`, then individual `PATROL_*` environment overrides.
//! Durations are configured in milliseconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::backoff::ExponentialBackoff;
use crate::error::{SyncError, SyncResult};
use crate::feeds::{AggregatorConfig, PollScheduler};
use crate::state::StatsProjector;

pub const CONFIG_PATH_ENV: &str = "PATROL_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub api_url: String,
    pub push_url: String,
    pub push_namespace: String,
    /// Credential used at startup; the session can replace it later.
    pub token: Option<String>,
    pub positions_interval_ms: u64,
    pub incident_feed_interval_ms: u64,
    pub fetch_timeout_ms: u64,
    pub max_poll_backoff_ms: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub check_in_limit: usize,
    pub incident_feed_limit: usize,
    /// A patrol silent for longer than this counts as offline.
    pub patrol_silence_ms: u64,
    pub geocoder_url: String,
    pub geocoder_country_codes: Option<String>,
    pub geocoder_interval_ms: u64,
    pub bind_addr: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:4000/api".to_string(),
            push_url: "http://localhost:4000/events".to_string(),
            push_namespace: "patrol".to_string(),
            token: None,
            positions_interval_ms: 30_000,
            incident_feed_interval_ms: 10_000,
            fetch_timeout_ms: 8_000,
            max_poll_backoff_ms: 300_000,
            reconnect_initial_ms: 1_000,
            reconnect_max_ms: 30_000,
            check_in_limit: 20,
            incident_feed_limit: 50,
            patrol_silence_ms: 15 * 60 * 1_000,
            geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
            geocoder_country_codes: None,
            geocoder_interval_ms: 1_000,
            bind_addr: "127.0.0.1:8088".to_string(),
            log_dir: None,
        }
    }
}

impl DashboardConfig {
    /// Load from the process environment.
    pub async fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = Self::load_from(path.as_deref()).await?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the JSON file at `path`, if given.
    pub async fn load_from(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        info!(path = %path.display(), "Loaded dashboard config");
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Apply `PATROL_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let millis = |key: &str| -> Result<Option<u64>> {
            text(key)
                .map(|v| v.parse::<u64>().with_context(|| format!("{key} must be milliseconds, got '{v}'")))
                .transpose()
        };

        if let Some(v) = text("PATROL_API_URL") {
            self.api_url = v;
        }
        if let Some(v) = text("PATROL_PUSH_URL") {
            self.push_url = v;
        }
        if let Some(v) = text("PATROL_PUSH_NAMESPACE") {
            self.push_namespace = v;
        }
        if let Some(v) = text("PATROL_TOKEN") {
            self.token = Some(v);
        }
        if let Some(v) = text("PATROL_GEOCODER_URL") {
            self.geocoder_url = v;
        }
        if let Some(v) = text("PATROL_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = text("PATROL_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = millis("PATROL_POSITIONS_INTERVAL_MS")? {
            self.positions_interval_ms = v;
        }
        if let Some(v) = millis("PATROL_INCIDENT_INTERVAL_MS")? {
            self.incident_feed_interval_ms = v;
        }
        if let Some(v) = millis("PATROL_FETCH_TIMEOUT_MS")? {
            self.fetch_timeout_ms = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> SyncResult<()> {
        let non_zero = [
            ("positions_interval_ms", self.positions_interval_ms),
            ("incident_feed_interval_ms", self.incident_feed_interval_ms),
            ("fetch_timeout_ms", self.fetch_timeout_ms),
            ("reconnect_initial_ms", self.reconnect_initial_ms),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, v)| *v == 0) {
            return Err(SyncError::Config(format!("{name} must be greater than zero")));
        }
        if self.api_url.trim().is_empty() {
            return Err(SyncError::Config("api_url is empty".into()));
        }
        if self.incident_feed_limit == 0 {
            return Err(SyncError::Config("incident_feed_limit must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig {
            fetch_timeout: self.fetch_timeout(),
            max_backoff: Duration::from_millis(self.max_poll_backoff_ms),
            incident_feed_limit: self.incident_feed_limit,
        }
    }

    pub fn scheduler(&self) -> PollScheduler {
        PollScheduler::with_intervals(
            Duration::from_millis(self.positions_interval_ms),
            Duration::from_millis(self.incident_feed_interval_ms),
        )
    }

    pub fn reconnect_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.reconnect_initial_ms),
            Duration::from_millis(self.reconnect_max_ms),
        )
    }

    pub fn stats_projector(&self) -> StatsProjector {
        StatsProjector::new(chrono::Duration::milliseconds(
            i64::try_from(self.patrol_silence_ms).unwrap_or(i64::MAX),
        ))
    }
}
