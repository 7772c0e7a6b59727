use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;

/// Environment variable that overrides `gateway.secret_key`
pub const SECRET_KEY_ENV: &str = "SETTLEMENT_SECRET_KEY";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL for the ledger store
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default = "default_cache_ttl")]
    pub balance_cache_ttl_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_cache_ttl() -> u64 {
    5
}

/// Settlement provider endpoint
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Reconciliation worker settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkerSettings {
    pub scan_interval_secs: u64,
    pub stale_threshold_secs: u64,
    pub batch_size: usize,
    pub alert_after_retries: i32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30,
            stale_threshold_secs: 60,
            batch_size: 100,
            alert_after_retries: 10,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config yaml: {}", config_path))?;
        if let Ok(secret) = std::env::var(SECRET_KEY_ENV)
            && !secret.is_empty()
        {
            config.gateway.secret_key = secret;
        }
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        if config.gateway.timeout_ms == 0 {
            anyhow::bail!("gateway.timeout_ms must be greater than zero");
        }
        if config.worker.batch_size == 0 {
            anyhow::bail!("worker.batch_size must be greater than zero");
        }
        Ok(config)
    }
}
