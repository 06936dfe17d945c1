use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::{
    models::RecommendationRecord,
    services::providers::{RecommendationSource, SourceError},
};

/// Managed recommendation service over HTTP
///
/// `GET {api_url}/recommendations?user_id=..&limit=..` returning
/// `{ "recommendations": [...] }`.
#[derive(Clone)]
pub struct HttpRecommendationSource {
    http_client: HttpClient,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct RecommendationsResponse {
    #[serde(default)]
    recommendations: Vec<RecommendationRecord>,
}

impl HttpRecommendationSource {
    pub fn new(api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn recommendations_url(&self) -> String {
        format!("{}/recommendations", self.api_url)
    }
}

#[async_trait::async_trait]
impl RecommendationSource for HttpRecommendationSource {
    async fn recommend(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RecommendationRecord>, SourceError> {
        let response = self
            .http_client
            .get(self.recommendations_url())
            .query(&[("user_id", user_id.to_string()), ("limit", limit.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, user_id = %user_id, "Recommendation service request failed");
            return Err(SourceError::Upstream(format!(
                "Recommendation service returned status {}",
                status
            )));
        }

        let payload: RecommendationsResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        Ok(payload.recommendations)
    }

    fn name(&self) -> &'static str {
        "recommendations-http"
    }
}
