//! Pluggable signals consumed by the adaptation engine
//!
//! Defaults are deterministic so rankings are reproducible; production
//! deployments can swap in sales-velocity or translation services behind the
//! same traits.

use crate::models::ProductRecord;

/// Popularity of a product in [0, 1]
#[async_trait::async_trait]
pub trait PopularitySource: Send + Sync {
    async fn popularity(&self, product: &ProductRecord, market_id: &str) -> f64;
}

/// Popularity from rating and review volume
///
/// The rating is shrunk toward a neutral prior until enough reviews back it,
/// so a single five-star review does not outrank a well-reviewed 4.5.
#[derive(Debug, Clone)]
pub struct RatingPopularity {
    /// Reviews needed before the rating carries half the weight
    pub prior_weight: f64,
    pub prior: f64,
}

impl Default for RatingPopularity {
    fn default() -> Self {
        Self {
            prior_weight: 20.0,
            prior: 0.5,
        }
    }
}

#[async_trait::async_trait]
impl PopularitySource for RatingPopularity {
    async fn popularity(&self, product: &ProductRecord, _market_id: &str) -> f64 {
        let Some(rating) = product.rating.filter(|r| r.is_finite()) else {
            return self.prior;
        };

        let normalized = (rating / 5.0).clamp(0.0, 1.0);
        let reviews = f64::from(product.review_count.unwrap_or(0));
        let confidence = reviews / (reviews + self.prior_weight);

        (normalized * confidence + self.prior * (1.0 - confidence)).clamp(0.0, 1.0)
    }
}

/// Translates short catalog text between languages
#[async_trait::async_trait]
pub trait TextLocalizer: Send + Sync {
    /// Returns `None` when the language pair is not supported
    async fn localize(&self, text: &str, from: &str, to: &str) -> Option<String>;
}

/// English/Spanish retail vocabulary
const GLOSSARY: &[(&str, &str)] = &[
    ("shirt", "camisa"),
    ("shoes", "zapatos"),
    ("dress", "vestido"),
    ("jacket", "chaqueta"),
    ("bag", "bolso"),
    ("watch", "reloj"),
    ("headphones", "auriculares"),
    ("chair", "silla"),
    ("table", "mesa"),
    ("lamp", "lámpara"),
    ("black", "negro"),
    ("white", "blanco"),
    ("red", "rojo"),
    ("blue", "azul"),
    ("leather", "cuero"),
    ("cotton", "algodón"),
    ("wireless", "inalámbricos"),
    ("with", "con"),
    ("and", "y"),
    ("for", "para"),
];

/// Word-by-word glossary translation between English and Spanish
///
/// Words outside the glossary are kept as-is, so the result is always
/// readable even when only partly translated.
#[derive(Debug, Default, Clone)]
pub struct GlossaryLocalizer;

impl GlossaryLocalizer {
    fn translate_word(word: &str, english_to_spanish: bool) -> String {
        let lower = word.to_lowercase();
        let found = GLOSSARY.iter().find_map(|(en, es)| {
            let (src, dst) = if english_to_spanish { (en, es) } else { (es, en) };
            (*src == lower).then_some(*dst)
        });

        match found {
            Some(translated) if word.chars().next().is_some_and(char::is_uppercase) => {
                let mut chars = translated.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
            Some(translated) => translated.to_string(),
            None => word.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl TextLocalizer for GlossaryLocalizer {
    async fn localize(&self, text: &str, from: &str, to: &str) -> Option<String> {
        let english_to_spanish = match (from, to) {
            ("en", "es") => true,
            ("es", "en") => false,
            _ => return None,
        };

        let translated = text
            .split(' ')
            .map(|word| Self::translate_word(word, english_to_spanish))
            .collect::<Vec<_>>()
            .join(" ");
        Some(translated)
    }
}
