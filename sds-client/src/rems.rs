//! REMS entitlement service client.

use reqwest::{Method, StatusCode};
use sds_core::config::RemsConfig;
use sds_core::{AppError, Health};
use tracing::info;
use url::Url;

use crate::client::ServiceClient;
use crate::models::rems::{
    RemsCatalogueItem, RemsLicense, RemsResource, RemsWorkflow,
};

pub struct RemsClient {
    client: ServiceClient,
    rems_url: String,
    discovery_url: String,
}

/// Convert a REMS 404 into the user error a bad reference deserves.
fn not_found_to_user_error(err: AppError, message: String) -> AppError {
    match err {
        AppError::UpstreamClient { status, .. } if status == StatusCode::NOT_FOUND => {
            AppError::User(message)
        }
        other => other,
    }
}

fn parse_list<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
    what: &str,
) -> Result<Vec<T>, AppError> {
    serde_json::from_value(value)
        .map_err(|e| AppError::UpstreamServer(format!("Invalid REMS {what} response: {e}")))
}

impl RemsClient {
    pub fn new(config: &RemsConfig) -> Result<Self, AppError> {
        let rems_url = config.url.trim_end_matches('/').to_string();
        let base_url = Url::parse(&format!("{rems_url}/api"))
            .map_err(|e| AppError::Config(format!("Invalid REMS_URL: {e}")))?;
        let health_url = Url::parse(&format!("{rems_url}/api/health"))
            .map_err(|e| AppError::Config(format!("Invalid REMS_URL: {e}")))?;

        let client = ServiceClient::builder("rems", base_url)
            .header("x-rems-api-key", config.key.clone())
            .header("x-rems-user-id", config.user.clone())
            .header("accept", "application/json")
            .health_url(health_url)
            .build();
        Ok(Self {
            client,
            rems_url,
            discovery_url: config.discovery_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    pub async fn health(&self) -> Health {
        self.client.health().await
    }

    /// Data discovery URL for a published identifier.
    pub fn get_discovery_url(&self, id: &str) -> String {
        format!("{}/{id}", self.discovery_url)
    }

    /// Data access application URL for a catalogue item.
    pub fn get_application_url(&self, catalogue_id: i64) -> String {
        format!("{}/application?items={catalogue_id}", self.rems_url)
    }

    /// Active REMS workflows.
    pub async fn get_workflows(&self) -> Result<Vec<RemsWorkflow>, AppError> {
        let response = self
            .client
            .request(Method::GET, "/workflows")
            .query("disabled", "false")
            .query("archived", "false")
            .send()
            .await?
            .into_json()?;
        parse_list(response, "workflow")
    }

    /// One active workflow; unknown ids and cross-organisation references
    /// are user errors.
    pub async fn get_workflow(
        &self,
        organization_id: Option<&str>,
        workflow_id: i64,
    ) -> Result<RemsWorkflow, AppError> {
        let response = self
            .client
            .request(Method::GET, &format!("/workflows/{workflow_id}"))
            .query("disabled", "false")
            .query("archived", "false")
            .send()
            .await
            .map_err(|e| {
                not_found_to_user_error(e, format!("Unknown REMS workflow '{workflow_id}'"))
            })?
            .into_json()?;
        let workflow: RemsWorkflow = serde_json::from_value(response)
            .map_err(|e| AppError::UpstreamServer(format!("Invalid REMS workflow response: {e}")))?;

        if let Some(organization_id) = organization_id {
            if workflow.organization.id != organization_id {
                return Err(AppError::User(format!(
                    "REMS workflow '{workflow_id}' does not belong to REMS organization '{organization_id}'"
                )));
            }
        }
        Ok(workflow)
    }

    /// Active REMS licenses.
    pub async fn get_licenses(&self) -> Result<Vec<RemsLicense>, AppError> {
        let response = self
            .client
            .request(Method::GET, "/licenses")
            .query("disabled", "false")
            .query("archived", "false")
            .send()
            .await?
            .into_json()?;
        parse_list(response, "license")
    }

    /// One active license; unknown ids and cross-organisation references are
    /// user errors.
    pub async fn get_license(
        &self,
        organization_id: Option<&str>,
        license_id: i64,
    ) -> Result<RemsLicense, AppError> {
        let response = self
            .client
            .request(Method::GET, &format!("/licenses/{license_id}"))
            .query("disabled", "false")
            .query("archived", "false")
            .send()
            .await
            .map_err(|e| {
                not_found_to_user_error(e, format!("Unknown REMS license '{license_id}'"))
            })?
            .into_json()?;
        let license: RemsLicense = serde_json::from_value(response)
            .map_err(|e| AppError::UpstreamServer(format!("Invalid REMS license response: {e}")))?;

        if let Some(organization_id) = organization_id {
            if license.organization.id != organization_id {
                return Err(AppError::User(format!(
                    "REMS license '{license_id}' does not belong to REMS organization '{organization_id}'"
                )));
            }
        }
        Ok(license)
    }

    /// Active REMS resources, optionally restricted to one DOI.
    pub async fn get_resources(&self, doi: Option<&str>) -> Result<Vec<RemsResource>, AppError> {
        let mut request = self
            .client
            .request(Method::GET, "/resources")
            .query("disabled", "false")
            .query("archived", "false");
        if let Some(doi) = doi {
            request = request.query("resid", doi);
        }
        let response = request.send().await?.into_json()?;
        parse_list(response, "resource")
    }

    pub async fn get_catalogue_item(
        &self,
        catalogue_id: i64,
    ) -> Result<RemsCatalogueItem, AppError> {
        let response = self
            .client
            .request(Method::GET, &format!("/catalogue-items/{catalogue_id}"))
            .send()
            .await?
            .into_json()?;
        serde_json::from_value(response).map_err(|e| {
            AppError::UpstreamServer(format!("Invalid REMS catalogue item response: {e}"))
        })
    }

    /// Create a resource for a DOI under the workflow's organisation.
    ///
    /// The workflow is fetched first so that a missing workflow or an
    /// organisation mismatch fails before anything is created.
    pub async fn create_resource(
        &self,
        organization_id: Option<&str>,
        workflow_id: i64,
        license_ids: &[i64],
        doi: &str,
    ) -> Result<i64, AppError> {
        let workflow = self.get_workflow(organization_id, workflow_id).await?;

        let body = serde_json::json!({
            "resid": doi,
            "organization": {"organization/id": workflow.organization.id},
            "licenses": license_ids,
        });
        let response = self
            .client
            .request(Method::POST, "/resources/create")
            .json(body)
            .send()
            .await?
            .into_json()?;
        let id = response
            .get("id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| {
                AppError::UpstreamServer(format!("Invalid REMS resource response: {response}"))
            })?;
        info!(resource_id = id, %doi, "created REMS resource");
        Ok(id)
    }

    /// Create a catalogue item pointing applicants at the discovery URL.
    pub async fn create_catalogue_item(
        &self,
        organization_id: &str,
        workflow_id: i64,
        resource_id: i64,
        title: &str,
        discovery_url: &str,
    ) -> Result<i64, AppError> {
        let body = serde_json::json!({
            "resid": resource_id,
            "wfid": workflow_id,
            "organization": {"organization/id": organization_id},
            "localizations": {
                "en": {
                    "title": title,
                    "infourl": discovery_url,
                },
            },
        });
        let response = self
            .client
            .request(Method::POST, "/catalogue-items/create")
            .json(body)
            .send()
            .await?
            .into_json()?;
        let id = response
            .get("id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| {
                AppError::UpstreamServer(format!(
                    "Invalid REMS catalogue item response: {response}"
                ))
            })?;
        info!(catalogue_id = id, resource_id, "created REMS catalogue item");
        Ok(id)
    }
}

impl sds_core::health::HealthProbe for RemsClient {
    fn name(&self) -> &str {
        "rems"
    }
    fn health(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Health> + Send + '_>> {
        Box::pin(RemsClient::health(self))
    }
}
