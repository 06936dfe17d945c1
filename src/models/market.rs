use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Markets the service ships configuration for
///
/// Anything else resolves to [`Market::Default`] through [`Market::resolve`];
/// callers that need to know whether an id was recognized use
/// [`Market::lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    #[serde(rename = "US")]
    Us,
    #[serde(rename = "ES")]
    Es,
    #[serde(rename = "MX")]
    Mx,
    #[serde(rename = "CL")]
    Cl,
    #[serde(rename = "default")]
    Default,
}

impl Market {
    /// Every configured market, the default entry last
    pub const ALL: [Market; 5] = [Market::Us, Market::Es, Market::Mx, Market::Cl, Market::Default];

    pub fn id(&self) -> &'static str {
        match self {
            Market::Us => "US",
            Market::Es => "ES",
            Market::Mx => "MX",
            Market::Cl => "CL",
            Market::Default => "default",
        }
    }

    /// Case-insensitive lookup of a market id
    pub fn lookup(market_id: &str) -> Option<Market> {
        let id = market_id.trim();
        Market::ALL
            .into_iter()
            .find(|market| market.id().eq_ignore_ascii_case(id))
    }

    /// Like [`Market::lookup`] but unknown ids fall back to the default market
    pub fn resolve(market_id: &str) -> Market {
        Market::lookup(market_id).unwrap_or(Market::Default)
    }

    /// Geolocation mapping from an ISO country code
    pub fn from_country_code(country_code: &str) -> Option<Market> {
        match country_code.trim().to_ascii_uppercase().as_str() {
            "US" | "PR" => Some(Market::Us),
            "ES" | "AD" => Some(Market::Es),
            "MX" => Some(Market::Mx),
            "CL" => Some(Market::Cl),
            _ => None,
        }
    }
}

impl Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Psychological price rounding convention of a market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceRounding {
    /// `.95` below half a unit, `.99` above
    Eur,
    /// `.99` just below the integer for small fractions, `.90` above
    Mxn,
    /// Thousands ending in 990
    Clp,
    /// Plain two-decimal rounding
    Standard,
}

impl PriceRounding {
    pub fn for_currency(currency: &str) -> Self {
        match currency.to_ascii_uppercase().as_str() {
            "EUR" => PriceRounding::Eur,
            "MXN" => PriceRounding::Mxn,
            "CLP" => PriceRounding::Clp,
            _ => PriceRounding::Standard,
        }
    }
}

/// Blend weights used to compute a market score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub relevance: f64,
    pub popularity: f64,
    pub profit_margin: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            relevance: 0.6,
            popularity: 0.3,
            profit_margin: 0.1,
        }
    }
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.relevance + self.popularity + self.profit_margin
    }
}

/// Display preferences for a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizationPreferences {
    pub date_format: String,
    pub size_system: String,
    #[serde(default)]
    pub preferred_categories: Vec<String>,
}

impl Default for LocalizationPreferences {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d".to_string(),
            size_system: "US".to_string(),
            preferred_categories: Vec::new(),
        }
    }
}

/// Per-market cache TTL overrides in seconds
///
/// Unset fields fall back to the built-in TTL table. Configuration entries are
/// not overridable; they always live for a day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlOverrides {
    pub products: Option<u64>,
    pub recommendations: Option<u64>,
    pub trending: Option<u64>,
    pub availability: Option<u64>,
}

/// Policy for a single market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfiguration {
    pub market_id: String,
    pub currency: String,
    pub language: String,
    pub timezone: String,
    pub tax_rate: f64,
    #[serde(default)]
    pub scoring_weights: ScoringWeights,
    pub rounding: PriceRounding,
    #[serde(default)]
    pub localization: LocalizationPreferences,
    #[serde(default)]
    pub cache_ttl: TtlOverrides,
}

/// Signals available when working out which market a request belongs to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub market_id: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}
