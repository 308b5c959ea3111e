//! Metax dataset catalogue client.

use std::time::Duration;

use reqwest::Method;
use sds_core::config::MetaxConfig;
use sds_core::{AppError, Health};
use tracing::{debug, info};
use url::Url;

use crate::cache::TtlCache;
use crate::client::ServiceClient;
use crate::models::metax::{DraftMetax, FieldOfScience, MetaxFields};

const FIELDS_OF_SCIENCE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub struct MetaxClient {
    client: ServiceClient,
    fields_of_science: TtlCache<(), Vec<FieldOfScience>>,
}

/// Case- and punctuation-insensitive comparison key.
fn normalize(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

impl MetaxClient {
    pub fn new(config: &MetaxConfig) -> Result<Self, AppError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| AppError::Config(format!("Invalid METAX_URL: {e}")))?;
        let mut health_url = crate::client::join_url(&base_url, "datasets");
        health_url.set_query(Some("limit=1&fields=id"));

        let client = ServiceClient::builder("metax", base_url)
            .header("Authorization", format!("Token {}", config.token))
            .health_url(health_url)
            .health_callback(|body| {
                serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|content| {
                        let results = content.get("results")?.as_array()?.clone();
                        Some(results.len() == 1 && results[0].get("id").is_some())
                    })
                    .unwrap_or(false)
            })
            .build();
        Ok(Self {
            client,
            fields_of_science: TtlCache::new(FIELDS_OF_SCIENCE_TTL),
        })
    }

    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    pub async fn health(&self) -> Health {
        self.client.health().await
    }

    /// The fields-of-science reference vocabulary, cached for a week.
    pub async fn get_fields_of_science(&self) -> Result<Vec<FieldOfScience>, AppError> {
        self.fields_of_science
            .get_or_load((), || async {
                let resp = self
                    .client
                    .request(Method::GET, "reference-data/fields-of-science")
                    .query("limit", "1000")
                    .send()
                    .await?
                    .into_json()?;
                let results = resp
                    .get("results")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!([]));
                serde_json::from_value(results).map_err(|e| {
                    AppError::UpstreamServer(format!("Invalid fields-of-science response: {e}"))
                })
            })
            .await
    }

    /// Resolve free text to a field of science.
    ///
    /// Matches the code exactly (`ta111`), a bare numeric tail (`111`), or
    /// any language label, all case- and punctuation-insensitively.
    pub async fn get_field_of_science(
        &self,
        text: &str,
    ) -> Result<Option<FieldOfScience>, AppError> {
        if text.is_empty() {
            return Ok(None);
        }
        let fields = self.get_fields_of_science().await?;
        let norm_text = normalize(text);

        for field in &fields {
            let norm_code = normalize(&field.code);
            if norm_code == norm_text {
                return Ok(Some(field.clone()));
            }
            if !norm_text.is_empty()
                && norm_text.chars().all(|c| c.is_ascii_digit())
                && norm_code.ends_with(&norm_text)
            {
                return Ok(Some(field.clone()));
            }
        }

        for field in &fields {
            if field
                .pref_label
                .values()
                .any(|label| normalize(label) == norm_text)
            {
                return Ok(Some(field.clone()));
            }
        }

        Ok(None)
    }

    /// Create a draft dataset and return its Metax id.
    pub async fn create_draft_dataset(
        &self,
        doi: &str,
        title: &str,
        description: &str,
    ) -> Result<String, AppError> {
        debug!(%doi, "creating draft dataset in Metax");
        let draft = DraftMetax::new(doi, title, description);
        let body = serde_json::to_value(&draft)
            .map_err(|e| AppError::System(format!("Failed to serialize Metax draft: {e}")))?;
        let dataset = self
            .client
            .request(Method::POST, "/datasets")
            .json(body)
            .send()
            .await?
            .into_json()?;
        let metax_id = dataset
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AppError::UpstreamServer(format!("Invalid Metax dataset response: {dataset}"))
            })?
            .to_string();
        debug!(%metax_id, "created draft dataset");
        Ok(metax_id)
    }

    pub async fn get_dataset(&self, metax_id: &str) -> Result<serde_json::Value, AppError> {
        self.client
            .request(Method::GET, &format!("/datasets/{metax_id}"))
            .send()
            .await?
            .into_json()
    }

    /// Patch the managed fields of a draft dataset.
    pub async fn patch_dataset(
        &self,
        metax_id: &str,
        fields: &MetaxFields,
    ) -> Result<serde_json::Value, AppError> {
        let body = serde_json::to_value(fields)
            .map_err(|e| AppError::System(format!("Failed to serialize Metax fields: {e}")))?;
        let resp = self
            .client
            .request(Method::PATCH, &format!("/datasets/{metax_id}"))
            .json(body)
            .send()
            .await?
            .into_json()?;
        info!(%metax_id, "updated Metax dataset metadata");
        Ok(resp)
    }

    /// Replace the draft dataset's description.
    pub async fn update_dataset_description(
        &self,
        metax_id: &str,
        description: &str,
    ) -> Result<(), AppError> {
        self.client
            .request(Method::PATCH, &format!("/datasets/{metax_id}"))
            .json(serde_json::json!({"description": {"en": description}}))
            .send()
            .await?;
        debug!(%metax_id, "updated dataset description");
        Ok(())
    }

    /// Publish the draft dataset; the returned record carries
    /// `"state": "published"`.
    pub async fn publish_dataset(
        &self,
        metax_id: &str,
        doi: &str,
    ) -> Result<serde_json::Value, AppError> {
        let record = self
            .client
            .request(Method::POST, &format!("/datasets/{metax_id}/publish"))
            .send()
            .await?
            .into_json()?;
        info!(%metax_id, %doi, "published dataset to Metax");
        Ok(record)
    }

    /// Delete a dataset. Removes drafts permanently; hides published
    /// datasets from listings.
    pub async fn delete_dataset(&self, metax_id: &str) -> Result<(), AppError> {
        self.client
            .request(Method::DELETE, &format!("/datasets/{metax_id}"))
            .send()
            .await?;
        debug!(%metax_id, "deleted dataset from Metax");
        Ok(())
    }
}


impl sds_core::health::HealthProbe for MetaxClient {
    fn name(&self) -> &str {
        "metax"
    }
    fn health(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Health> + Send + '_>> {
        Box::pin(MetaxClient::health(self))
    }
}
