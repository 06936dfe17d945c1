use crate::{
    db::EntityKind,
    models::{Market, TtlOverrides},
    services::market_config::CONFIG_TTL,
};

/// Base TTL in seconds for a market and entity kind
///
/// Faster-moving catalogs get shorter product and recommendation TTLs.
/// Configuration entries live a day everywhere.
pub fn base_ttl(market: Market, kind: EntityKind) -> u64 {
    let (products, recommendations, trending, availability) = match market {
        Market::Us => (3600, 1800, 900, 300),
        Market::Es => (7200, 3600, 1800, 600),
        Market::Mx => (5400, 2700, 1350, 450),
        Market::Cl | Market::Default => (3600, 1800, 900, 300),
    };

    match kind {
        EntityKind::Product => products,
        EntityKind::Recommendations => recommendations,
        EntityKind::Trending => trending,
        EntityKind::Availability => availability,
        EntityKind::Configuration => CONFIG_TTL,
    }
}

fn override_for(overrides: &TtlOverrides, kind: EntityKind) -> Option<u64> {
    match kind {
        EntityKind::Product => overrides.products,
        EntityKind::Recommendations => overrides.recommendations,
        EntityKind::Trending => overrides.trending,
        EntityKind::Availability => overrides.availability,
        EntityKind::Configuration => None,
    }
}

/// Effective TTL: explicit value, then market config override, then the base table
pub fn resolve_ttl(
    market_id: &str,
    kind: EntityKind,
    overrides: &TtlOverrides,
    explicit: Option<u64>,
) -> u64 {
    if kind == EntityKind::Configuration {
        return CONFIG_TTL;
    }

    explicit
        .filter(|ttl| *ttl > 0)
        .or_else(|| override_for(overrides, kind).filter(|ttl| *ttl > 0))
        .unwrap_or_else(|| base_ttl(Market::resolve(market_id), kind))
}
