//! Application state: the pool and every integration, wired once at
//! startup and shared behind `Arc`s.

use std::sync::Arc;

use sds_auth::oidc::OidcClient;
use sds_auth::AuthService;
use sds_client::admin::AdminClient;
use sds_client::datacite::DataciteClient;
use sds_client::file::{FileProvider, S3FileProvider};
use sds_client::keystone::KeystoneClient;
use sds_client::mapper::MetaxMapper;
use sds_client::metax::MetaxClient;
use sds_client::pid::PidClient;
use sds_client::reference::ReferenceData;
use sds_client::rems::RemsClient;
use sds_client::ror::RorClient;
use sds_core::{AppError, Config};
use sds_data::entity::Workflow;
use sqlx::SqlitePool;

use crate::project::{
    CachedProjectService, DisabledProjectService, KeystoneProjectService, ProjectService,
};
use crate::xml::{WellFormedXmlProcessor, XmlProcessor};

/// Default discovery prefix when REMS does not supply one.
const DEFAULT_DISCOVERY_URL: &str = "https://etsin.fairdata.fi/dataset";

/// Metadata object types accepted per workflow.
pub fn workflow_object_types(workflow: Workflow) -> &'static [&'static str] {
    match workflow {
        Workflow::Sd => &["study", "dataset"],
        Workflow::Fega => &[
            "study",
            "sample",
            "experiment",
            "run",
            "analysis",
            "dac",
            "policy",
            "dataset",
        ],
        Workflow::Bp => &["dataset", "image", "annotation", "observation"],
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub auth: Arc<AuthService>,
    pub oidc: Option<Arc<OidcClient>>,
    pub redirect_url: String,
    pub base_url: String,
    pub secure_cookie: bool,
    pub pid: Option<Arc<PidClient>>,
    pub datacite: Option<Arc<DataciteClient>>,
    pub metax: Option<Arc<MetaxClient>>,
    pub rems: Option<Arc<RemsClient>>,
    pub ror: Option<Arc<RorClient>>,
    pub admin: Option<Arc<AdminClient>>,
    pub keystone: Option<Arc<KeystoneClient>>,
    pub file_provider: Option<Arc<dyn FileProvider>>,
    pub projects: Arc<dyn ProjectService>,
    pub xml: Arc<dyn XmlProcessor>,
    pub reference: Arc<ReferenceData>,
    pub discovery_url: String,
}

impl AppState {
    /// Wire the state from configuration; optional integrations stay `None`.
    pub fn from_config(config: &Config, pool: SqlitePool) -> Result<Self, AppError> {
        let auth = Arc::new(AuthService::new(config.oidc.jwt_secret.clone()));
        let oidc = Some(Arc::new(OidcClient::new(
            config.oidc.clone(),
            &config.server,
        )?));

        let keystone = config
            .keystone
            .as_ref()
            .map(KeystoneClient::new)
            .transpose()?
            .map(Arc::new);
        let projects: Arc<dyn ProjectService> = match &keystone {
            Some(keystone) => Arc::new(CachedProjectService::new(Arc::new(
                KeystoneProjectService::new(keystone.clone()),
            ))),
            None => Arc::new(DisabledProjectService),
        };

        let rems = config
            .rems
            .as_ref()
            .map(RemsClient::new)
            .transpose()?
            .map(Arc::new);
        let discovery_url = config
            .rems
            .as_ref()
            .map(|rems| rems.discovery_url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_DISCOVERY_URL.to_string());

        Ok(Self {
            pool,
            auth,
            oidc,
            redirect_url: config.server.redirect_url.clone(),
            base_url: config.server.base_url.clone(),
            secure_cookie: config.oidc.secure_cookie,
            pid: config.pid.as_ref().map(PidClient::new).transpose()?.map(Arc::new),
            datacite: config
                .datacite
                .as_ref()
                .map(DataciteClient::new)
                .transpose()?
                .map(Arc::new),
            metax: config
                .metax
                .as_ref()
                .map(MetaxClient::new)
                .transpose()?
                .map(Arc::new),
            rems,
            ror: config.ror.as_ref().map(RorClient::new).transpose()?.map(Arc::new),
            admin: config
                .admin
                .as_ref()
                .map(AdminClient::new)
                .transpose()?
                .map(Arc::new),
            keystone,
            file_provider: config
                .s3
                .as_ref()
                .map(|s3| Arc::new(S3FileProvider::new(s3.clone())) as Arc<dyn FileProvider>),
            projects,
            xml: Arc::new(WellFormedXmlProcessor),
            reference: Arc::new(ReferenceData::load()?),
            discovery_url,
        })
    }

    /// Data discovery URL for an identifier (Metax id on SD, DOI on BP).
    pub fn discovery_url_for(&self, id: &str) -> String {
        format!("{}/{id}", self.discovery_url)
    }

    pub fn pid(&self) -> Result<&Arc<PidClient>, AppError> {
        self.pid
            .as_ref()
            .ok_or_else(|| AppError::Config("PID service is not configured".into()))
    }

    pub fn datacite(&self) -> Result<&Arc<DataciteClient>, AppError> {
        self.datacite
            .as_ref()
            .ok_or_else(|| AppError::Config("DataCite service is not configured".into()))
    }

    pub fn metax(&self) -> Result<&Arc<MetaxClient>, AppError> {
        self.metax
            .as_ref()
            .ok_or_else(|| AppError::Config("Metax service is not configured".into()))
    }

    pub fn rems(&self) -> Result<&Arc<RemsClient>, AppError> {
        self.rems
            .as_ref()
            .ok_or_else(|| AppError::Config("REMS service is not configured".into()))
    }

    pub fn ror(&self) -> Result<&Arc<RorClient>, AppError> {
        self.ror
            .as_ref()
            .ok_or_else(|| AppError::Config("ROR service is not configured".into()))
    }

    pub fn keystone(&self) -> Result<&Arc<KeystoneClient>, AppError> {
        self.keystone
            .as_ref()
            .ok_or_else(|| AppError::Config("Keystone service is not configured".into()))
    }

    pub fn file_provider(&self) -> Result<&Arc<dyn FileProvider>, AppError> {
        self.file_provider
            .as_ref()
            .ok_or_else(|| AppError::Config("File provider is not configured".into()))
    }

    pub fn oidc(&self) -> Result<&Arc<OidcClient>, AppError> {
        self.oidc
            .as_ref()
            .ok_or_else(|| AppError::Config("OIDC is not configured".into()))
    }

    /// Mapper over the live Metax/ROR clients.
    pub fn metax_mapper(&self) -> Result<MetaxMapper, AppError> {
        Ok(MetaxMapper::new(
            self.metax()?.clone(),
            self.ror()?.clone(),
            self.reference.clone(),
        ))
    }

    /// Check that the user is a member of the project.
    pub async fn authorize_project(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<(), AppError> {
        let projects = self.projects.get_user_projects(user_id).await?;
        if projects.iter().any(|p| p.project_id == project_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "User is not a member of project {project_id}"
            )))
        }
    }
}
