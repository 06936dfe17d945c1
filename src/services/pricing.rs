use std::collections::HashMap;

use crate::models::{MarketConfiguration, PriceRounding};

use super::adaptation::AdaptationError;

/// Rate used when no path between two currencies is known
const DEFAULT_RATE: f64 = 1.0;

/// Pivot currency for cross rates
const PIVOT: &str = "USD";

/// Currency conversion lookup
///
/// Resolution order for `(from, to)`: same currency, direct pair, inverse of the
/// reverse pair, cross rate through USD, then [`DEFAULT_RATE`].
#[derive(Debug, Clone)]
pub struct ConversionTable {
    rates: HashMap<(String, String), f64>,
}

impl Default for ConversionTable {
    fn default() -> Self {
        Self::empty()
            .with_rate("USD", "EUR", 0.92)
            .with_rate("USD", "MXN", 18.0)
            .with_rate("USD", "CLP", 950.0)
    }
}

impl ConversionTable {
    pub fn empty() -> Self {
        Self {
            rates: HashMap::new(),
        }
    }

    /// Adds or replaces the rate for one direction of a pair
    pub fn with_rate(mut self, from: &str, to: &str, rate: f64) -> Self {
        self.rates
            .insert((from.to_ascii_uppercase(), to.to_ascii_uppercase()), rate);
        self
    }

    fn known(&self, from: &str, to: &str) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        if let Some(rate) = self.rates.get(&(from.to_string(), to.to_string())) {
            return Some(*rate);
        }
        self.rates
            .get(&(to.to_string(), from.to_string()))
            .filter(|rate| **rate > 0.0)
            .map(|rate| 1.0 / rate)
    }

    pub fn rate(&self, from: &str, to: &str) -> f64 {
        let from = from.to_ascii_uppercase();
        let to = to.to_ascii_uppercase();

        if let Some(rate) = self.known(&from, &to) {
            return rate;
        }
        if let (Some(a), Some(b)) = (self.known(&from, PIVOT), self.known(PIVOT, &to)) {
            return a * b;
        }

        tracing::warn!(from = %from, to = %to, "No conversion rate, using default");
        DEFAULT_RATE
    }
}

fn to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Applies a market's psychological rounding convention
pub fn round_price(rule: PriceRounding, price: f64) -> f64 {
    match rule {
        PriceRounding::Standard => to_cents(price),
        PriceRounding::Eur => {
            let price = to_cents(price);
            let base = price.floor();
            let ending = if price - base < 0.5 { 0.95 } else { 0.99 };
            to_cents(base + ending)
        }
        PriceRounding::Mxn => {
            let price = to_cents(price);
            let base = price.floor();
            let rounded = if price - base >= 0.5 {
                base + 0.90
            } else if base >= 1.0 {
                // .99 just below the integer base
                base - 0.01
            } else {
                0.99
            };
            to_cents(rounded)
        }
        PriceRounding::Clp => {
            let price = price.round();
            let thousands = (price / 1000.0).floor() * 1000.0;
            if price - thousands < 500.0 {
                (thousands - 10.0).max(990.0)
            } else {
                thousands + 990.0
            }
        }
    }
}

/// Final consumer price in the market's currency: conversion, tax, rounding
pub fn landed_price(
    base_price: f64,
    base_currency: &str,
    config: &MarketConfiguration,
    rates: &ConversionTable,
) -> Result<f64, AdaptationError> {
    if !base_price.is_finite() || base_price <= 0.0 {
        return Err(AdaptationError::InvalidPrice(base_price));
    }

    let rate = rates.rate(base_currency, &config.currency);
    if !rate.is_finite() || rate <= 0.0 {
        return Err(AdaptationError::Conversion {
            from: base_currency.to_string(),
            to: config.currency.clone(),
        });
    }

    let landed = to_cents(base_price * rate * (1.0 + config.tax_rate));
    Ok(round_price(config.rounding, landed))
}
