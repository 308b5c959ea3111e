//! Shared harness for API tests: an in-memory database, a static project
//! service, a canned file provider and a router wired like production.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sds_api::project::{Project, ProjectService};
use sds_api::state::AppState;
use sds_api::xml::WellFormedXmlProcessor;
use sds_auth::AuthService;
use sds_client::datacite::DataciteClient;
use sds_client::file::{BucketFile, FileProvider};
use sds_client::keystone::Ec2Credentials;
use sds_client::metax::MetaxClient;
use sds_client::pid::PidClient;
use sds_client::reference::ReferenceData;
use sds_client::rems::RemsClient;
use sds_client::ror::RorClient;
use sds_core::config::{DataciteConfig, MetaxConfig, PidConfig, RemsConfig, RorConfig};
use sds_core::AppError;
use sqlx::SqlitePool;
use tower::ServiceExt;

pub const PROJECT_ID: &str = "project-1";
pub const USER_ID: &str = "mock-user";

pub struct StaticProjects;

#[async_trait]
impl ProjectService for StaticProjects {
    async fn get_user_projects(&self, _user_id: &str) -> Result<Vec<Project>, AppError> {
        Ok(vec![Project {
            project_id: PROJECT_ID.to_string(),
        }])
    }
}

/// File provider backed by a fixed listing.
pub struct StaticFiles(pub Vec<BucketFile>);

#[async_trait]
impl FileProvider for StaticFiles {
    async fn list_buckets(&self, _credentials: &Ec2Credentials) -> Result<Vec<String>, AppError> {
        Ok(vec!["bucket".into()])
    }

    async fn list_files(&self, bucket: &str) -> Result<Vec<BucketFile>, AppError> {
        if self.0.is_empty() {
            return Err(AppError::NotFound(format!("No files found in '{bucket}'.")));
        }
        Ok(self.0.clone())
    }

    async fn verify_file(&self, _bucket: &str, path: &str) -> Result<Option<i64>, AppError> {
        Ok(self.0.iter().find(|f| f.path == path).map(|f| f.bytes))
    }

    async fn grant_read_policy(
        &self,
        _bucket: &str,
        _credentials: &Ec2Credentials,
    ) -> Result<(), AppError> {
        Ok(())
    }

    async fn verify_read_policy(&self, _bucket: &str) -> Result<bool, AppError> {
        Ok(true)
    }
}

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    pub jwt: String,
}

/// Mock endpoints of the external services, by base URL.
#[derive(Default)]
pub struct Upstreams {
    pub pid: Option<String>,
    pub datacite: Option<String>,
    pub metax: Option<String>,
    pub rems: Option<String>,
    pub ror: Option<String>,
    pub files: Vec<BucketFile>,
}

pub async fn spawn(upstreams: Upstreams) -> TestApp {
    let pool = sds_data::connect("sqlite::memory:").await.unwrap();
    let auth = Arc::new(AuthService::new("test-secret"));
    let jwt = auth.create_jwt_token(USER_ID, "Mock User").unwrap();

    let state = AppState {
        pool: pool.clone(),
        auth,
        oidc: None,
        redirect_url: "https://submit.example".into(),
        base_url: "https://submit.example".into(),
        secure_cookie: true,
        pid: upstreams.pid.map(|url| {
            Arc::new(PidClient::new(&PidConfig { url, key: "key".into() }).unwrap())
        }),
        datacite: upstreams.datacite.map(|api_url| {
            Arc::new(
                DataciteClient::new(&DataciteConfig {
                    api_url,
                    user: "user".into(),
                    key: "key".into(),
                    doi_prefix: "10.80869".into(),
                })
                .unwrap(),
            )
        }),
        metax: upstreams.metax.map(|url| {
            Arc::new(MetaxClient::new(&MetaxConfig { url, token: "token".into() }).unwrap())
        }),
        rems: upstreams.rems.map(|url| {
            Arc::new(
                RemsClient::new(&RemsConfig {
                    url,
                    user: "owner".into(),
                    key: "key".into(),
                    discovery_url: "https://etsin.example/dataset".into(),
                })
                .unwrap(),
            )
        }),
        ror: upstreams
            .ror
            .map(|url| Arc::new(RorClient::new(&RorConfig { url }).unwrap())),
        admin: None,
        keystone: None,
        file_provider: Some(Arc::new(StaticFiles(upstreams.files))),
        projects: Arc::new(StaticProjects),
        xml: Arc::new(WellFormedXmlProcessor),
        reference: Arc::new(ReferenceData::load().unwrap()),
        discovery_url: "https://etsin.example/dataset".into(),
    };

    TestApp {
        router: sds_api::build_router(state),
        pool,
        jwt,
    }
}

impl TestApp {
    pub fn request(&self, method: &str, path: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.jwt))
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn send_json(
        &self,
        method: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Response<Body> {
        let request = self
            .request(method, path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Create a submission through the API and return its id.
    pub async fn create_submission(&self, body: serde_json::Value) -> String {
        let resp = self.send_json("POST", "/v1/submissions", body).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp).await;
        json["submissionId"].as_str().unwrap().to_string()
    }
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}

pub async fn body_text(resp: Response<Body>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).to_string()
}
