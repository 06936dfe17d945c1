use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Product catalog API base URL
    #[serde(default = "default_catalog_api_url")]
    pub catalog_api_url: String,

    /// Product catalog API key
    #[serde(default)]
    pub catalog_api_key: Option<String>,

    /// Managed recommendation service base URL; unset disables it
    #[serde(default)]
    pub recommendation_api_url: Option<String>,

    /// Directory holding `<MARKET>.toml` overrides
    #[serde(default)]
    pub market_config_dir: Option<PathBuf>,

    /// Upper bound for a single cache store call
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Upper bound for catalog, recommendation and generator calls
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,

    #[serde(default = "default_warm_batch_size")]
    pub warm_batch_size: usize,

    #[serde(default = "default_warm_batch_delay_ms")]
    pub warm_batch_delay_ms: u64,

    /// Log level used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_catalog_api_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_store_timeout_ms() -> u64 {
    250
}

fn default_source_timeout_ms() -> u64 {
    2000
}

fn default_warm_batch_size() -> usize {
    50
}

fn default_warm_batch_delay_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            host: default_host(),
            port: default_port(),
            catalog_api_url: default_catalog_api_url(),
            catalog_api_key: None,
            recommendation_api_url: None,
            market_config_dir: None,
            store_timeout_ms: default_store_timeout_ms(),
            source_timeout_ms: default_source_timeout_ms(),
            warm_batch_size: default_warm_batch_size(),
            warm_batch_delay_ms: default_warm_batch_delay_ms(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn warm_batch_delay(&self) -> Duration {
        Duration::from_millis(self.warm_batch_delay_ms)
    }

    /// Initialize the tracing subscriber; RUST_LOG wins over `log_level`
    pub fn init_logging(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));

        match self.log_format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_environment() {
        let config: Config = envy::from_iter(Vec::<(String, String)>::new()).unwrap();

        assert_eq!(config.redis_url, "redis://localhost:6379");
        assert_eq!(config.port, 3000);
        assert_eq!(config.store_timeout(), Duration::from_millis(250));
        assert_eq!(config.source_timeout(), Duration::from_secs(2));
        assert_eq!(config.warm_batch_size, 50);
        assert_eq!(config.catalog_api_key, None);
        assert_eq!(config.log_format, "pretty");
    }

    #[test]
    fn test_overrides() {
        let vars = vec![
            ("PORT".to_string(), "8081".to_string()),
            ("MARKET_CONFIG_DIR".to_string(), "/etc/mercado/markets".to_string()),
            ("WARM_BATCH_SIZE".to_string(), "10".to_string()),
            ("LOG_FORMAT".to_string(), "json".to_string()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();

        assert_eq!(config.port, 8081);
        assert_eq!(config.market_config_dir, Some(PathBuf::from("/etc/mercado/markets")));
        assert_eq!(config.warm_batch_size, 10);
        assert_eq!(config.log_format, "json");
    }
}
