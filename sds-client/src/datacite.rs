//! DataCite REST API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use sds_core::config::DataciteConfig;
use sds_core::{AppError, Health};
use tracing::{debug, info};
use url::Url;

use crate::client::ServiceClient;
use crate::doi::DoiRegistry;

/// DataCite bulk operations are slow; allow well past the default timeout.
const DATACITE_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Surface the `errors[].title` list of a JSON:API error body instead of the
/// raw payload.
fn format_datacite_error(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|content| {
            let errors = content.get("errors")?.as_array()?;
            let titles: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("title")?.as_str())
                .collect();
            if titles.is_empty() {
                None
            } else {
                Some(titles.join("; "))
            }
        })
        .unwrap_or_else(|| body.to_string())
}

pub struct DataciteClient {
    client: ServiceClient,
    doi_prefix: String,
}

impl DataciteClient {
    pub fn new(config: &DataciteConfig) -> Result<Self, AppError> {
        let base_url = Url::parse(&config.api_url)
            .map_err(|e| AppError::Config(format!("Invalid DATACITE_API: {e}")))?;
        let health_url = crate::client::join_url(&base_url, "heartbeat");

        let client = ServiceClient::builder("datacite", base_url)
            .basic_auth(config.user.clone(), config.key.clone())
            .header("Content-Type", "application/vnd.api+json")
            .timeout(DATACITE_TIMEOUT)
            .health_url(health_url)
            .error_formatter(format_datacite_error)
            .build();
        Ok(Self {
            client,
            doi_prefix: config.doi_prefix.clone(),
        })
    }

    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    pub async fn health(&self) -> Health {
        self.client.health().await
    }

    /// Fetch the full DOI record.
    pub async fn get(&self, doi: &str) -> Result<serde_json::Value, AppError> {
        self.client
            .request(Method::GET, &format!("/dois/{doi}"))
            .query("publisher", "true")
            .query("affiliation", "true")
            .send()
            .await?
            .into_json()
    }

    /// Delete a draft DOI.
    pub async fn delete(&self, doi: &str) -> Result<(), AppError> {
        self.client
            .request(Method::DELETE, &format!("/dois/{doi}"))
            .send()
            .await?;
        info!(%doi, "deleted DataCite DOI");
        Ok(())
    }
}

#[async_trait]
impl DoiRegistry for DataciteClient {
    fn name(&self) -> &str {
        "datacite"
    }

    async fn create_draft_doi(&self) -> Result<String, AppError> {
        let body = serde_json::json!({
            "data": {"type": "dois", "attributes": {"prefix": self.doi_prefix}},
        });
        let response = self
            .client
            .request(Method::POST, "/dois")
            .json(body)
            .send()
            .await?
            .into_json()?;
        let doi = response
            .pointer("/data/attributes/doi")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AppError::System(format!("Invalid DataCite response: {response}"))
            })?
            .to_string();
        debug!(%doi, "created DataCite DOI");
        Ok(doi)
    }

    async fn publish_doi(&self, doi: &str, body: &serde_json::Value) -> Result<(), AppError> {
        self.client
            .request(Method::PUT, &format!("/dois/{doi}"))
            .json(body.clone())
            .send()
            .await?;
        info!(%doi, "published DataCite DOI");
        Ok(())
    }
}


impl sds_core::health::HealthProbe for DataciteClient {
    fn name(&self) -> &str {
        "datacite"
    }
    fn health(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Health> + Send + '_>> {
        Box::pin(DataciteClient::health(self))
    }
}
