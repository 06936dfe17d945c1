/// HTTP catalog provider
///
/// Fetches product records from the e-commerce catalog API:
/// `GET {api_url}/products?ids=a,b,c` returning `{ "products": [...] }`.
use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::{
    models::ProductRecord,
    services::providers::{ProductSource, SourceError},
};

const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Clone)]
pub struct HttpProductSource {
    http_client: HttpClient,
    api_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductsResponse {
    products: Vec<ProductRecord>,
}

impl HttpProductSource {
    pub fn new(api_url: String, api_key: Option<String>) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn products_url(&self) -> String {
        format!("{}/products", self.api_url)
    }
}

#[async_trait::async_trait]
impl ProductSource for HttpProductSource {
    async fn get_products(&self, ids: &[String]) -> Result<Vec<ProductRecord>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(count = ids.len(), "Fetching products from catalog");

        let mut request = self
            .http_client
            .get(self.products_url())
            .query(&[("ids", ids.join(","))]);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Catalog request failed");
            return Err(SourceError::Upstream(format!(
                "Catalog returned status {}: {}",
                status, body
            )));
        }

        let payload: ProductsResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        tracing::debug!(
            requested = ids.len(),
            returned = payload.products.len(),
            "Catalog products fetched"
        );

        Ok(payload.products)
    }

    fn name(&self) -> &'static str {
        "catalog-http"
    }
}
