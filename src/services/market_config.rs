use std::path::PathBuf;
use std::time::Duration;

use crate::{
    db::{normalize_market_id, Cache},
    models::{
        LocalizationPreferences, Market, MarketConfiguration, PriceRounding, RequestContext,
        ScoringWeights, TtlOverrides,
    },
};

/// Configuration changes rarely, so it is cached for a day
pub const CONFIG_TTL: u64 = 86_400;

const SUPPORTED_MARKETS_KEY: &str = "supported_markets";

#[derive(thiserror::Error, Debug)]
pub enum ConfigLoadError {
    #[error("Failed to read market config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse market config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Reading market config timed out")]
    Timeout,
}

/// Built-in configuration for a known market
pub fn static_market_config(market: Market) -> MarketConfiguration {
    let (currency, language, timezone, tax_rate, weights, date_format, size_system, categories) =
        match market {
            Market::Us => (
                "USD",
                "en",
                "America/New_York",
                0.0,
                ScoringWeights { relevance: 0.5, popularity: 0.3, profit_margin: 0.2 },
                "%m/%d/%Y",
                "US",
                vec!["electronics", "home", "sports"],
            ),
            Market::Es => (
                "EUR",
                "es",
                "Europe/Madrid",
                0.21,
                ScoringWeights { relevance: 0.6, popularity: 0.3, profit_margin: 0.1 },
                "%d/%m/%Y",
                "EU",
                vec!["fashion", "home", "beauty"],
            ),
            Market::Mx => (
                "MXN",
                "es",
                "America/Mexico_City",
                0.16,
                ScoringWeights { relevance: 0.5, popularity: 0.4, profit_margin: 0.1 },
                "%d/%m/%Y",
                "MX",
                vec!["electronics", "fashion", "toys"],
            ),
            Market::Cl => (
                "CLP",
                "es",
                "America/Santiago",
                0.19,
                ScoringWeights { relevance: 0.55, popularity: 0.35, profit_margin: 0.1 },
                "%d-%m-%Y",
                "EU",
                vec!["home", "outdoor"],
            ),
            Market::Default => (
                "USD",
                "en",
                "UTC",
                0.0,
                ScoringWeights::default(),
                "%Y-%m-%d",
                "US",
                vec![],
            ),
        };

    MarketConfiguration {
        market_id: market.id().to_string(),
        currency: currency.to_string(),
        language: language.to_string(),
        timezone: timezone.to_string(),
        tax_rate,
        scoring_weights: weights,
        rounding: PriceRounding::for_currency(currency),
        localization: LocalizationPreferences {
            date_format: date_format.to_string(),
            size_system: size_system.to_string(),
            preferred_categories: categories.into_iter().map(String::from).collect(),
        },
        cache_ttl: TtlOverrides::default(),
    }
}

/// Resolves market ids to their configuration
///
/// Lookup order: cache (`market_config:{id}`), a `<ID>.toml` file in the
/// configured directory, the built-in table, and finally the default market.
/// Every step degrades to the next one, so a lookup never fails.
pub struct MarketConfigurationProvider {
    cache: Cache,
    config_dir: Option<PathBuf>,
    load_timeout: Duration,
}

impl MarketConfigurationProvider {
    pub fn new(cache: Cache, config_dir: Option<PathBuf>, load_timeout: Duration) -> Self {
        Self {
            cache,
            config_dir,
            load_timeout,
        }
    }

    fn config_key(market_id: &str) -> String {
        format!("market_config:{}", market_id)
    }

    fn user_prefs_key(user_id: &str) -> String {
        format!("user_prefs:{}", user_id)
    }

    pub async fn get_market_config(&self, market_id: &str) -> MarketConfiguration {
        let market_id = normalize_market_id(market_id);
        let key = Self::config_key(&market_id);

        if let Some(config) = self.cache.get::<MarketConfiguration>(&key).await {
            tracing::debug!(market_id = %market_id, "Market config cache hit");
            return config;
        }

        let config = match self.load_from_resource(&market_id).await {
            Ok(Some(config)) => {
                tracing::info!(market_id = %market_id, "Loaded market config from file");
                config
            }
            Ok(None) => Self::builtin(&market_id),
            Err(e) => {
                tracing::warn!(market_id = %market_id, error = %e, "Market config file unusable, using built-in");
                Self::builtin(&market_id)
            }
        };

        self.cache.set(&key, &config, CONFIG_TTL).await;
        config
    }

    fn builtin(market_id: &str) -> MarketConfiguration {
        match Market::lookup(market_id) {
            Some(market) => static_market_config(market),
            None => {
                tracing::debug!(market_id = %market_id, "Unknown market, using default config");
                static_market_config(Market::Default)
            }
        }
    }

    /// Reads `<config_dir>/<MARKET_ID>.toml`; `Ok(None)` when there is no such file
    async fn load_from_resource(
        &self,
        market_id: &str,
    ) -> Result<Option<MarketConfiguration>, ConfigLoadError> {
        let Some(dir) = &self.config_dir else {
            return Ok(None);
        };

        // Ids become file names; anything path-like is not a market
        if market_id.is_empty()
            || !market_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Ok(None);
        }

        let path = dir.join(format!("{}.toml", market_id));
        let raw = match tokio::time::timeout(self.load_timeout, tokio::fs::read_to_string(&path)).await
        {
            Err(_) => return Err(ConfigLoadError::Timeout),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(raw)) => raw,
        };

        let mut config: MarketConfiguration = toml::from_str(&raw)?;
        config.market_id = market_id.to_string();
        Ok(Some(config))
    }

    /// Every built-in market, always including the default entry
    pub async fn get_supported_markets(&self) -> Vec<MarketConfiguration> {
        if let Some(mut markets) = self
            .cache
            .get::<Vec<MarketConfiguration>>(SUPPORTED_MARKETS_KEY)
            .await
        {
            if !markets.iter().any(|m| m.market_id == Market::Default.id()) {
                markets.push(static_market_config(Market::Default));
            }
            return markets;
        }

        let markets: Vec<MarketConfiguration> =
            Market::ALL.into_iter().map(static_market_config).collect();
        self.cache
            .set(SUPPORTED_MARKETS_KEY, &markets, CONFIG_TTL)
            .await;
        markets
    }

    /// Works out the market for a request
    ///
    /// Precedence: explicit market id, geolocated country code, the user's
    /// stored preference, then the default market.
    pub async fn detect_market(&self, context: &RequestContext) -> String {
        if let Some(market_id) = context
            .market_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            return normalize_market_id(market_id);
        }

        if let Some(market) = context
            .country_code
            .as_deref()
            .and_then(Market::from_country_code)
        {
            return market.id().to_string();
        }

        if let Some(user_id) = context.user_id.as_deref().filter(|id| !id.is_empty()) {
            if let Some(preferred) = self
                .cache
                .hget(&Self::user_prefs_key(user_id), "market")
                .await
                .filter(|m| !m.trim().is_empty())
            {
                return normalize_market_id(&preferred);
            }
        }

        Market::Default.id().to_string()
    }

    /// Stores a user's preferred market for later detection
    pub async fn set_user_market(&self, user_id: &str, market_id: &str) -> bool {
        self.cache
            .hset(
                &Self::user_prefs_key(user_id),
                "market",
                &normalize_market_id(market_id),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::cache::tests::FailingStore;
    use crate::db::MemoryStore;
    use std::sync::Arc;

    fn provider_with_dir(dir: Option<PathBuf>) -> MarketConfigurationProvider {
        let cache = Cache::new(Arc::new(MemoryStore::new()), Duration::from_millis(250));
        MarketConfigurationProvider::new(cache, dir, Duration::from_secs(1))
    }

    #[test]
    fn test_static_weights_sum_to_one() {
        for market in Market::ALL {
            let total = static_market_config(market).scoring_weights.total();
            assert!((total - 1.0).abs() < 1e-9, "{} weights sum to {}", market, total);
        }
    }

    #[test]
    fn test_static_rounding_follows_currency() {
        assert_eq!(static_market_config(Market::Es).rounding, PriceRounding::Eur);
        assert_eq!(static_market_config(Market::Mx).rounding, PriceRounding::Mxn);
        assert_eq!(static_market_config(Market::Cl).rounding, PriceRounding::Clp);
        assert_eq!(static_market_config(Market::Us).rounding, PriceRounding::Standard);
    }

    #[tokio::test]
    async fn test_known_market_config() {
        let provider = provider_with_dir(None);
        let config = provider.get_market_config("mx").await;
        assert_eq!(config.market_id, "MX");
        assert_eq!(config.currency, "MXN");
        assert_eq!(config.tax_rate, 0.16);
    }

    #[tokio::test]
    async fn test_unknown_market_gets_default_config() {
        let provider = provider_with_dir(None);
        for id in ["BR", "", "zz-top", "../etc/passwd"] {
            let config = provider.get_market_config(id).await;
            assert_eq!(config, static_market_config(Market::Default));
        }
    }

    #[tokio::test]
    async fn test_config_is_cached_after_first_lookup() {
        let provider = provider_with_dir(None);
        provider.get_market_config("ES").await;

        let cached: Option<MarketConfiguration> = provider.cache.get("market_config:ES").await;
        assert_eq!(cached.map(|c| c.currency), Some("EUR".to_string()));
        assert_eq!(provider.cache.ttl("market_config:ES").await, Some(CONFIG_TTL as i64));
    }

    #[tokio::test]
    async fn test_config_file_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("BR.toml"),
            r#"
                market_id = "ignored"
                currency = "BRL"
                language = "pt"
                timezone = "America/Sao_Paulo"
                tax_rate = 0.17
                rounding = "standard"
            "#,
        )
        .unwrap();

        let provider = provider_with_dir(Some(dir.path().to_path_buf()));
        let config = provider.get_market_config("br").await;
        assert_eq!(config.market_id, "BR");
        assert_eq!(config.currency, "BRL");
    }

    #[tokio::test]
    async fn test_broken_config_file_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("MX.toml"), "currency = ").unwrap();

        let provider = provider_with_dir(Some(dir.path().to_path_buf()));
        let config = provider.get_market_config("MX").await;
        assert_eq!(config, static_market_config(Market::Mx));
    }

    #[tokio::test]
    async fn test_store_outage_still_resolves_config() {
        let cache = Cache::new(Arc::new(FailingStore), Duration::from_millis(250));
        let provider = MarketConfigurationProvider::new(cache, None, Duration::from_secs(1));

        assert_eq!(provider.get_market_config("ES").await.currency, "EUR");
        assert_eq!(provider.get_supported_markets().await.len(), Market::ALL.len());
    }

    #[tokio::test]
    async fn test_supported_markets_include_default() {
        let provider = provider_with_dir(None);
        let markets = provider.get_supported_markets().await;
        assert!(markets.iter().any(|m| m.market_id == "default"));

        // Second call is served from cache and still includes it
        let markets = provider.get_supported_markets().await;
        assert_eq!(markets.len(), Market::ALL.len());
    }

    #[tokio::test]
    async fn test_detect_market_precedence() {
        let provider = provider_with_dir(None);
        provider.set_user_market("u1", "cl").await;

        let explicit = RequestContext {
            market_id: Some("es".to_string()),
            country_code: Some("MX".to_string()),
            user_id: Some("u1".to_string()),
        };
        assert_eq!(provider.detect_market(&explicit).await, "ES");

        let geo = RequestContext {
            market_id: Some("  ".to_string()),
            country_code: Some("MX".to_string()),
            user_id: Some("u1".to_string()),
        };
        assert_eq!(provider.detect_market(&geo).await, "MX");

        let preference = RequestContext {
            market_id: None,
            country_code: Some("FR".to_string()),
            user_id: Some("u1".to_string()),
        };
        assert_eq!(provider.detect_market(&preference).await, "CL");

        let nothing = RequestContext {
            market_id: None,
            country_code: None,
            user_id: Some("unknown-user".to_string()),
        };
        assert_eq!(provider.detect_market(&nothing).await, "default");
    }
}
