//! OpenStack Keystone client.
//!
//! Source of project membership and of the per-project EC2 credentials the
//! bucket policy operations run under.

use reqwest::Method;
use sds_core::config::KeystoneConfig;
use sds_core::{AppError, Health};
use serde::Deserialize;
use url::Url;

use crate::client::ServiceClient;

/// EC2-style credentials scoped to one project.
#[derive(Debug, Clone, Deserialize)]
pub struct Ec2Credentials {
    pub access: String,
    pub secret: String,
}

pub struct KeystoneClient {
    client: ServiceClient,
}

impl KeystoneClient {
    pub fn new(config: &KeystoneConfig) -> Result<Self, AppError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| AppError::Config(format!("Invalid KEYSTONE_URL: {e}")))?;
        let health_url = crate::client::join_url(&base_url, "v3");

        let client = ServiceClient::builder("keystone", base_url)
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

    /// Ids of the projects the user belongs to.
    pub async fn get_user_projects(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        let response = self
            .client
            .request(Method::GET, &format!("/v3/users/{user_id}/projects"))
            .send()
            .await?
            .into_json()?;
        let projects = response
            .get("projects")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                AppError::UpstreamServer(format!("Invalid Keystone projects response: {response}"))
            })?;
        Ok(projects
            .iter()
            .filter_map(|p| p.get("id")?.as_str().map(str::to_string))
            .collect())
    }

    /// EC2 credentials of a project, for signing object storage requests.
    pub async fn get_ec2_credentials(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<Ec2Credentials, AppError> {
        let response = self
            .client
            .request(
                Method::GET,
                &format!("/v3/users/{user_id}/credentials/OS-EC2"),
            )
            .send()
            .await?
            .into_json()?;
        let credentials = response
            .get("credentials")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                AppError::UpstreamServer(format!(
                    "Invalid Keystone credentials response: {response}"
                ))
            })?;
        credentials
            .iter()
            .find(|c| c.get("tenant_id").and_then(|t| t.as_str()) == Some(project_id))
            .and_then(|c| serde_json::from_value(c.clone()).ok())
            .ok_or_else(|| {
                AppError::User(format!(
                    "No object storage credentials found for project '{project_id}'"
                ))
            })
    }
}

impl sds_core::health::HealthProbe for KeystoneClient {
    fn name(&self) -> &str {
        "keystone"
    }
    fn health(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Health> + Send + '_>> {
        Box::pin(KeystoneClient::health(self))
    }
}
