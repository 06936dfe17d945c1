use serde::{Deserialize, Serialize};

fn default_currency() -> String {
    "USD".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_available() -> bool {
    true
}

/// Product as returned by the upstream catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Price in `currency`, before tax
    pub price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u32>,
    /// Language the title and description are written in
    #[serde(default = "default_language")]
    pub language: String,
    /// Gross margin as a fraction of price, when the catalog exposes it
    #[serde(default)]
    pub margin: Option<f64>,
}

/// A product's localized view for one market
///
/// `market_price` is always derived from `base_price` by the adaptation engine
/// (conversion, tax, rounding); nothing upstream supplies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketProduct {
    pub id: String,
    pub title: String,
    pub localized_title: Option<String>,
    pub description: String,
    pub localized_description: Option<String>,
    pub base_price: f64,
    pub base_currency: String,
    pub market_price: f64,
    pub currency: String,
    pub availability: bool,
    pub category: String,
    pub images: Vec<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    /// Source language of `title` and `description`
    pub language: String,
    #[serde(default)]
    pub margin: Option<f64>,
}

impl From<&MarketProduct> for ProductRecord {
    /// Recovers the market-agnostic record, e.g. to re-adapt a global entry
    fn from(product: &MarketProduct) -> Self {
        Self {
            id: product.id.clone(),
            title: product.title.clone(),
            description: product.description.clone(),
            price: product.base_price,
            currency: product.base_currency.clone(),
            available: product.availability,
            category: product.category.clone(),
            images: product.images.clone(),
            rating: product.rating,
            review_count: product.review_count,
            language: product.language.clone(),
            margin: product.margin,
        }
    }
}
