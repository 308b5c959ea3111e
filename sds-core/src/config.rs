//! Environment-driven configuration.
//!
//! Every external service has its own config struct with a `from_env`
//! constructor. Configs are built once at startup and handed to the services
//! that own them; nothing reads the environment after boot. Optional
//! integrations resolve to `None` when none of their variables are set and
//! fail loudly when only some are.

use std::env;

use crate::error::AppError;

fn required(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Config(format!("Missing environment variable: {name}")))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Resolve an optional service config: `None` when no variable of the group
/// is present, error when the group is only partially configured.
fn group<T>(
    service: &str,
    names: &[&str],
    build: impl FnOnce() -> Result<T, AppError>,
) -> Result<Option<T>, AppError> {
    let present = names.iter().filter(|n| optional(n).is_some()).count();
    if present == 0 {
        return Ok(None);
    }
    if present < names.len() {
        return Err(AppError::Config(format!(
            "{service} is partially configured; expected all of {names:?}"
        )));
    }
    build().map(Some)
}

/// Application server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub base_url: String,
    pub redirect_url: String,
    pub database_url: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let base_url = required("BASE_URL")?;
        let redirect_url = optional("REDIRECT_URL").unwrap_or_else(|| base_url.clone());
        Ok(Self {
            base_url,
            redirect_url,
            database_url: required("DATABASE_URL")?,
        })
    }

    /// OIDC callback URL derived from the base URL.
    pub fn callback_url(&self) -> String {
        format!("{}/callback", self.base_url.trim_end_matches('/'))
    }
}

/// OIDC provider configuration.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    pub oidc_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub secure_cookie: bool,
    pub jwt_secret: String,
}

impl OidcConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            oidc_url: required("OIDC_URL")?,
            client_id: required("AAI_CLIENT_ID")?,
            client_secret: required("AAI_CLIENT_SECRET")?,
            scope: optional("OIDC_SCOPE").unwrap_or_else(|| "openid profile email".into()),
            secure_cookie: optional("OIDC_SECURE_COOKIE")
                .map(|v| v.to_uppercase() != "FALSE")
                .unwrap_or(true),
            jwt_secret: required("JWT_SECRET")?,
        })
    }
}

/// DataCite DOI registry configuration.
#[derive(Debug, Clone)]
pub struct DataciteConfig {
    pub api_url: String,
    pub user: String,
    pub key: String,
    pub doi_prefix: String,
}

impl DataciteConfig {
    pub fn from_env() -> Result<Option<Self>, AppError> {
        group(
            "DataCite",
            &["DATACITE_API", "DATACITE_USER", "DATACITE_KEY", "DATACITE_DOI_PREFIX"],
            || {
                Ok(Self {
                    api_url: required("DATACITE_API")?,
                    user: required("DATACITE_USER")?,
                    key: required("DATACITE_KEY")?,
                    doi_prefix: required("DATACITE_DOI_PREFIX")?,
                })
            },
        )
    }
}

/// CSC PID proxy configuration.
#[derive(Debug, Clone)]
pub struct PidConfig {
    pub url: String,
    pub key: String,
}

impl PidConfig {
    pub fn from_env() -> Result<Option<Self>, AppError> {
        group("CSC PID", &["CSC_PID_URL", "CSC_PID_KEY"], || {
            Ok(Self {
                url: required("CSC_PID_URL")?,
                key: required("CSC_PID_KEY")?,
            })
        })
    }
}

/// Metax dataset catalogue configuration.
#[derive(Debug, Clone)]
pub struct MetaxConfig {
    pub url: String,
    pub token: String,
}

impl MetaxConfig {
    pub fn from_env() -> Result<Option<Self>, AppError> {
        group("Metax", &["METAX_URL", "METAX_TOKEN"], || {
            Ok(Self {
                url: required("METAX_URL")?,
                token: required("METAX_TOKEN")?,
            })
        })
    }
}

/// REMS entitlement service configuration.
#[derive(Debug, Clone)]
pub struct RemsConfig {
    pub url: String,
    pub user: String,
    pub key: String,
    pub discovery_url: String,
}

impl RemsConfig {
    pub fn from_env() -> Result<Option<Self>, AppError> {
        group(
            "REMS",
            &["REMS_URL", "REMS_USER", "REMS_KEY", "REMS_DISCOVERY_URL"],
            || {
                Ok(Self {
                    url: required("REMS_URL")?,
                    user: required("REMS_USER")?,
                    key: required("REMS_KEY")?,
                    discovery_url: required("REMS_DISCOVERY_URL")?,
                })
            },
        )
    }
}

/// ROR organisation registry configuration.
#[derive(Debug, Clone)]
pub struct RorConfig {
    pub url: String,
}

impl RorConfig {
    pub fn from_env() -> Result<Option<Self>, AppError> {
        group("ROR", &["ROR_URL"], || {
            Ok(Self {
                url: required("ROR_URL")?,
            })
        })
    }
}

/// NeIC SDA admin API configuration.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub url: String,
}

impl AdminConfig {
    pub fn from_env() -> Result<Option<Self>, AppError> {
        group("Admin", &["ADMIN_URL"], || {
            Ok(Self {
                url: required("ADMIN_URL")?,
            })
        })
    }
}

/// OpenStack Keystone configuration; backs the project service.
#[derive(Debug, Clone)]
pub struct KeystoneConfig {
    pub url: String,
}

impl KeystoneConfig {
    pub fn from_env() -> Result<Option<Self>, AppError> {
        group("Keystone", &["KEYSTONE_URL"], || {
            Ok(Self {
                url: required("KEYSTONE_URL")?,
            })
        })
    }
}

/// S3 object storage configuration for the file provider.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub endpoint: String,
    pub project_id: String,
}

impl S3Config {
    pub fn from_env() -> Result<Option<Self>, AppError> {
        group(
            "S3",
            &[
                "STATIC_S3_ACCESS_KEY_ID",
                "STATIC_S3_SECRET_ACCESS_KEY",
                "S3_REGION",
                "S3_ENDPOINT",
                "SD_SUBMIT_PROJECT_ID",
            ],
            || {
                Ok(Self {
                    access_key_id: required("STATIC_S3_ACCESS_KEY_ID")?,
                    secret_access_key: required("STATIC_S3_SECRET_ACCESS_KEY")?,
                    region: required("S3_REGION")?,
                    endpoint: required("S3_ENDPOINT")?,
                    project_id: required("SD_SUBMIT_PROJECT_ID")?,
                })
            },
        )
    }
}

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub oidc: OidcConfig,
    pub datacite: Option<DataciteConfig>,
    pub pid: Option<PidConfig>,
    pub metax: Option<MetaxConfig>,
    pub rems: Option<RemsConfig>,
    pub ror: Option<RorConfig>,
    pub admin: Option<AdminConfig>,
    pub keystone: Option<KeystoneConfig>,
    pub s3: Option<S3Config>,
}

impl Config {
    /// Read the full configuration from the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            oidc: OidcConfig::from_env()?,
            datacite: DataciteConfig::from_env()?,
            pid: PidConfig::from_env()?,
            metax: MetaxConfig::from_env()?,
            rems: RemsConfig::from_env()?,
            ror: RorConfig::from_env()?,
            admin: AdminConfig::from_env()?,
            keystone: KeystoneConfig::from_env()?,
            s3: S3Config::from_env()?,
        })
    }
}
