//! CSC PID proxy client.

use async_trait::async_trait;
use reqwest::Method;
use sds_core::config::PidConfig;
use sds_core::{AppError, Health};
use tracing::{debug, info};
use url::Url;

use crate::client::{Payload, ServiceClient};
use crate::doi::DoiRegistry;

pub struct PidClient {
    client: ServiceClient,
}

impl PidClient {
    pub fn new(config: &PidConfig) -> Result<Self, AppError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| AppError::Config(format!("Invalid CSC_PID_URL: {e}")))?;
        let health_url = crate::client::join_url(&base_url, "q/health/live");

        let client = ServiceClient::builder("pid", base_url)
            .header("apikey", config.key.clone())
            .health_url(health_url)
            .health_callback(|body| {
                serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|content| Some(content.get("status")?.as_str()? == "UP"))
                    .unwrap_or(false)
            })
            .build();
        Ok(Self { client })
    }

    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    pub async fn health(&self) -> Health {
        self.client.health().await
    }

    /// Resolve the discovery URL currently registered for a DOI.
    pub async fn get(&self, doi: &str) -> Result<String, AppError> {
        let payload = self
            .client
            .request(Method::GET, &format!("/get/v1/pid/{doi}"))
            .send()
            .await?;
        match payload {
            Payload::Json(serde_json::Value::String(url)) => Ok(url),
            Payload::Text(url) => Ok(url),
            other => Err(AppError::System(format!(
                "Invalid DOI response: {}",
                other.into_text()
            ))),
        }
    }
}

#[async_trait]
impl DoiRegistry for PidClient {
    fn name(&self) -> &str {
        "pid"
    }

    /// The proxy mints under its own prefix; the requested DOI is blank.
    async fn create_draft_doi(&self) -> Result<String, AppError> {
        let body = serde_json::json!({"data": {"type": "dois", "attributes": {"doi": ""}}});
        let payload = self
            .client
            .request(Method::POST, "v1/pid/doi")
            .json(body)
            .send()
            .await?;
        let doi = match payload {
            Payload::Json(serde_json::Value::String(doi)) => doi,
            other => {
                return Err(AppError::System(format!(
                    "Invalid DOI response: {}",
                    other.into_text()
                )))
            }
        };
        debug!(%doi, "created PID DOI");
        Ok(doi)
    }

    async fn publish_doi(&self, doi: &str, body: &serde_json::Value) -> Result<(), AppError> {
        self.client
            .request(Method::PUT, &format!("v1/pid/doi/{doi}"))
            .json(body.clone())
            .send()
            .await?;
        info!(%doi, "PID DOI updated");
        Ok(())
    }
}

impl sds_core::health::HealthProbe for PidClient {
    fn name(&self) -> &str {
        "pid"
    }
    fn health(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Health> + Send + '_>> {
        Box::pin(PidClient::health(self))
    }
}
