use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Display;

use super::store::escape_pattern;

/// Market id used for the cross-market fallback slot
pub const GLOBAL_MARKET: &str = "global";

/// Kind of entity a cache key refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Product,
    Recommendations,
    Trending,
    Availability,
    Configuration,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Product,
        EntityKind::Recommendations,
        EntityKind::Trending,
        EntityKind::Availability,
        EntityKind::Configuration,
    ];

    /// Key prefix for this kind
    pub fn prefix(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Recommendations => "recs",
            EntityKind::Trending => "trending",
            EntityKind::Availability => "availability",
            EntityKind::Configuration => "configuration",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Normalizes a market id for use in keys ("us" and "US" share a slot)
pub fn normalize_market_id(market_id: &str) -> String {
    let trimmed = market_id.trim();
    if trimmed.eq_ignore_ascii_case(GLOBAL_MARKET) || trimmed.eq_ignore_ascii_case("default") {
        trimmed.to_ascii_lowercase()
    } else {
        trimmed.to_ascii_uppercase()
    }
}

/// Market-segmented cache key
///
/// Renders as `prefix:market_id:entity_id[:context_hash]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: EntityKind,
    pub market_id: String,
    pub entity_id: String,
    pub context_hash: Option<ContextHash>,
}

impl CacheKey {
    pub fn product(market_id: &str, product_id: &str) -> Self {
        Self {
            kind: EntityKind::Product,
            market_id: normalize_market_id(market_id),
            entity_id: product_id.to_string(),
            context_hash: None,
        }
    }

    /// The cross-market fallback slot for a product
    pub fn global_product(product_id: &str) -> Self {
        Self::product(GLOBAL_MARKET, product_id)
    }

    pub fn recommendations(market_id: &str, user_id: &str, context_hash: ContextHash) -> Self {
        Self {
            kind: EntityKind::Recommendations,
            market_id: normalize_market_id(market_id),
            entity_id: user_id.to_string(),
            context_hash: Some(context_hash),
        }
    }

    /// Scan pattern for one entity kind of a market
    pub fn market_pattern(market_id: &str, kind: EntityKind) -> String {
        format!(
            "{}:{}:*",
            kind.prefix(),
            escape_pattern(&normalize_market_id(market_id))
        )
    }

    /// Scan patterns covering a market, one per kind unless narrowed
    ///
    /// The prefix is always spelled out: entity ids may contain `:` and a
    /// market code, so a `*:US:*` wildcard would reach into other markets.
    pub fn market_patterns(market_id: &str, kind: Option<EntityKind>) -> Vec<String> {
        match kind {
            Some(kind) => vec![Self::market_pattern(market_id, kind)],
            None => EntityKind::ALL
                .iter()
                .map(|kind| Self::market_pattern(market_id, *kind))
                .collect(),
        }
    }

    /// Scan pattern for a product across every market, global slot included
    pub fn product_pattern(product_id: &str) -> String {
        format!(
            "{}:*:{}",
            EntityKind::Product.prefix(),
            escape_pattern(product_id)
        )
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.kind.prefix(),
            self.market_id,
            self.entity_id
        )?;
        if let Some(hash) = &self.context_hash {
            write!(f, ":{}", hash)?;
        }
        Ok(())
    }
}

/// Deterministic digest of every parameter that shapes a cached result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextHash(String);

impl ContextHash {
    const LEN: usize = 16;

    /// Hashes the canonical JSON form of `params`
    ///
    /// Going through `serde_json::Value` sorts object keys, so two requests
    /// that differ only in field or map ordering hash identically.
    pub fn of<T: Serialize>(params: &T) -> Result<Self, serde_json::Error> {
        let canonical = serde_json::to_value(params)?;
        let bytes = serde_json::to_vec(&canonical)?;
        let digest = hex::encode(Sha256::digest(&bytes));
        Ok(Self(digest[..Self::LEN].to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContextHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
