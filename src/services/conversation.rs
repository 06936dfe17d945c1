use std::time::Duration;

use crate::{
    models::{MarketAwareRecommendation, MarketConfiguration},
    services::providers::SourceError,
};

/// How many recommendations a generated message mentions
const MENTIONED: usize = 3;

/// What a response generator gets to work with
pub struct ResponseContext<'a> {
    pub query: Option<&'a str>,
    pub market: &'a MarketConfiguration,
    pub recommendations: &'a [MarketAwareRecommendation],
}

/// Produces the conversational message sent alongside recommendations
#[async_trait::async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, context: &ResponseContext<'_>) -> Result<String, SourceError>;
}

/// Message used whenever generation fails or there is nothing to describe
pub fn canned_response(language: &str) -> &'static str {
    if language.eq_ignore_ascii_case("es") {
        "Aquí tienes algunos productos que podrían interesarte."
    } else {
        "Here are some products you might like."
    }
}

/// Runs a generator under a timeout, falling back to the canned message
pub async fn respond(
    generator: &dyn ResponseGenerator,
    context: &ResponseContext<'_>,
    timeout: Duration,
) -> String {
    match tokio::time::timeout(timeout, generator.generate(context)).await {
        Ok(Ok(message)) if !message.trim().is_empty() => message,
        Ok(Ok(_)) => canned_response(&context.market.language).to_string(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Response generation failed, using canned message");
            canned_response(&context.market.language).to_string()
        }
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Response generation timed out");
            canned_response(&context.market.language).to_string()
        }
    }
}

fn format_price(price: f64, currency: &str) -> String {
    if currency.eq_ignore_ascii_case("CLP") {
        format!("{:.0} {}", price, currency)
    } else {
        format!("{:.2} {}", price, currency)
    }
}

/// Builds a short message from the top recommendations in the market language
pub struct TemplateResponseGenerator;

#[async_trait::async_trait]
impl ResponseGenerator for TemplateResponseGenerator {
    async fn generate(&self, context: &ResponseContext<'_>) -> Result<String, SourceError> {
        if context.recommendations.is_empty() {
            return Ok(canned_response(&context.market.language).to_string());
        }

        let picks: Vec<String> = context
            .recommendations
            .iter()
            .take(MENTIONED)
            .map(|r| {
                let title = r
                    .product
                    .localized_title
                    .as_deref()
                    .unwrap_or(&r.product.title);
                format!("{} ({})", title, format_price(r.product.market_price, &r.product.currency))
            })
            .collect();

        let spanish = context.market.language.eq_ignore_ascii_case("es");
        let message = match (context.query.filter(|q| !q.trim().is_empty()), spanish) {
            (Some(query), true) => format!("Para \"{}\" te recomendamos: {}.", query.trim(), picks.join(", ")),
            (None, true) => format!("Te recomendamos: {}.", picks.join(", ")),
            (Some(query), false) => format!("For \"{}\" we recommend: {}.", query.trim(), picks.join(", ")),
            (None, false) => format!("We recommend: {}.", picks.join(", ")),
        };

        Ok(message)
    }
}
