//! NeIC SDA admin API client.
//!
//! The admin API authenticates the end user, not this service: handlers
//! forward the caller's `X-Authorization` header value with every call.

use reqwest::Method;
use sds_core::config::AdminConfig;
use sds_core::{AppError, Health};
use tracing::info;
use url::Url;

use crate::client::ServiceClient;

pub struct AdminClient {
    client: ServiceClient,
}

impl AdminClient {
    pub fn new(config: &AdminConfig) -> Result<Self, AppError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| AppError::Config(format!("Invalid ADMIN_URL: {e}")))?;
        let health_url = crate::client::join_url(&base_url, "ready");

        let client = ServiceClient::builder("admin", base_url)
            .health_url(health_url)
            .build();
        Ok(Self { client })
    }

    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    pub async fn health(&self) -> Health {
        self.client.health().await
    }

    /// Start ingestion of an inbox file.
    pub async fn ingest_file(
        &self,
        auth_header: &str,
        user: &str,
        filepath: &str,
    ) -> Result<(), AppError> {
        self.client
            .request(Method::POST, "/file/ingest")
            .header("Authorization", auth_header)
            .json(serde_json::json!({"user": user, "filepath": filepath}))
            .send()
            .await?;
        info!(%user, %filepath, "file ingestion started");
        Ok(())
    }

    /// All of the user's inbox files.
    pub async fn get_user_files(
        &self,
        auth_header: &str,
        username: &str,
    ) -> Result<serde_json::Value, AppError> {
        self.client
            .request(Method::GET, &format!("/users/{username}/files"))
            .header("Authorization", auth_header)
            .send()
            .await?
            .into_json()
    }

    /// Assign an accession id to an ingested file.
    pub async fn post_accession_id(
        &self,
        auth_header: &str,
        user: &str,
        filepath: &str,
        accession_id: &str,
    ) -> Result<(), AppError> {
        self.client
            .request(Method::POST, "/file/accession")
            .header("Authorization", auth_header)
            .json(serde_json::json!({
                "user": user,
                "filepath": filepath,
                "accession_id": accession_id,
            }))
            .send()
            .await?;
        info!(%filepath, %accession_id, "accession id assigned");
        Ok(())
    }

    /// Group accessioned files into a dataset.
    pub async fn create_dataset(
        &self,
        auth_header: &str,
        user: &str,
        dataset_id: &str,
        accession_ids: &[String],
    ) -> Result<(), AppError> {
        self.client
            .request(Method::POST, "/dataset/create")
            .header("Authorization", auth_header)
            .json(serde_json::json!({
                "user": user,
                "dataset_id": dataset_id,
                "accession_ids": accession_ids,
            }))
            .send()
            .await?;
        info!(%dataset_id, "dataset created in admin API");
        Ok(())
    }

    /// Release a dataset for download.
    pub async fn release_dataset(
        &self,
        auth_header: &str,
        dataset_id: &str,
    ) -> Result<(), AppError> {
        self.client
            .request(Method::POST, &format!("/dataset/release/{dataset_id}"))
            .header("Authorization", auth_header)
            .send()
            .await?;
        info!(%dataset_id, "dataset released");
        Ok(())
    }
}

impl sds_core::health::HealthProbe for AdminClient {
    fn name(&self) -> &str {
        "admin"
    }
    fn health(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Health> + Send + '_>> {
        Box::pin(AdminClient::health(self))
    }
}
