//! OIDC authorization-code client.
//!
//! Owns the browser-facing flow: building the authorize URL (with PKCE and
//! server-side state/nonce), exchanging the code for DPoP-bound tokens, and
//! fetching userinfo with the Bearer→DPoP upgrade. Proof signing itself
//! lives in [`crate::dpop`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::header::HeaderMap;
use sds_client::client::{join_url, ServiceClient};
use sds_core::config::{OidcConfig, ServerConfig};
use sds_core::{AppError, Health};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use url::Url;

use crate::dpop::DpopKey;
use crate::service::AuthService;

const CODE_VERIFIER_LENGTH: usize = 64;
/// Pending logins are dropped if the user never comes back.
const LOGIN_SESSION_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, serde::Deserialize)]
struct Discovery {
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
}

struct LoginSession {
    nonce: String,
    code_verifier: String,
    started: Instant,
}

pub struct OidcClient {
    http: reqwest::Client,
    health_client: ServiceClient,
    config: OidcConfig,
    callback_url: String,
    discovery_url: Url,
    discovery: Mutex<Option<Discovery>>,
    sessions: Mutex<HashMap<String, LoginSession>>,
    dpop: DpopKey,
    dpop_nonce: Mutex<Option<String>>,
}

fn random_token(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

impl OidcClient {
    pub fn new(config: OidcConfig, server: &ServerConfig) -> Result<Self, AppError> {
        let base = Url::parse(config.oidc_url.trim_end_matches('/'))
            .map_err(|e| AppError::Config(format!("Invalid OIDC_URL: {e}")))?;
        let discovery_url = join_url(&base, ".well-known/openid-configuration");

        let health_client = ServiceClient::builder("auth", base)
            .health_url(discovery_url.clone())
            .health_callback(|body| body.contains("userinfo_endpoint"))
            .build();

        Ok(Self {
            http: reqwest::Client::new(),
            health_client,
            config,
            callback_url: server.callback_url(),
            discovery_url,
            discovery: Mutex::new(None),
            sessions: Mutex::new(HashMap::new()),
            dpop: DpopKey::generate(),
            dpop_nonce: Mutex::new(None),
        })
    }

    pub fn client(&self) -> &ServiceClient {
        &self.health_client
    }

    pub async fn health(&self) -> Health {
        self.health_client.health().await
    }

    async fn discovery(&self) -> Result<Discovery, AppError> {
        let mut cached = self.discovery.lock().await;
        if let Some(discovery) = cached.as_ref() {
            return Ok(discovery.clone());
        }
        let response = self
            .http
            .get(self.discovery_url.clone())
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "OIDC discovery failed");
                AppError::System("OIDC authorization request failed.".into())
            })?;
        let discovery: Discovery = response.json().await.map_err(|e| {
            error!(error = %e, "invalid OIDC discovery document");
            AppError::System("OIDC authorization request failed.".into())
        })?;
        *cached = Some(discovery.clone());
        Ok(discovery)
    }

    /// Build the authorization URL and remember the login session.
    pub async fn login_url(&self) -> Result<String, AppError> {
        let discovery = self.discovery().await?;

        let state = random_token(32);
        let nonce = random_token(32);
        let code_verifier = random_token(CODE_VERIFIER_LENGTH);
        let code_challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()));

        let mut url = Url::parse(&discovery.authorization_endpoint)
            .map_err(|e| AppError::System(format!("Invalid authorization endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.callback_url)
            .append_pair("scope", &self.config.scope)
            .append_pair("state", &state)
            .append_pair("nonce", &nonce)
            .append_pair("code_challenge", &code_challenge)
            .append_pair("code_challenge_method", "S256");

        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, session| session.started.elapsed() < LOGIN_SESSION_TTL);
        sessions.insert(
            state,
            LoginSession {
                nonce,
                code_verifier,
                started: Instant::now(),
            },
        );

        debug!("OIDC login started");
        Ok(url.into())
    }

    fn capture_dpop_nonce(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get("DPoP-Nonce")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    async fn token_request(
        &self,
        discovery: &Discovery,
        code: &str,
        code_verifier: &str,
        nonce: Option<&str>,
    ) -> Result<reqwest::Response, AppError> {
        let token_endpoint = Url::parse(&discovery.token_endpoint)
            .map_err(|e| AppError::System(format!("Invalid token endpoint: {e}")))?;
        let proof = self.dpop.proof("POST", &token_endpoint, None, nonce)?;
        self.http
            .post(token_endpoint)
            .header("DPoP", proof)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.callback_url),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("code_verifier", code_verifier),
            ])
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "token request failed");
                AppError::Unauthorized("Invalid OIDC callback.".into())
            })
    }

    /// Finish the flow: verify the state, exchange the code, fetch userinfo
    /// and mint the application JWT.
    pub async fn callback(
        &self,
        auth: &AuthService,
        state: &str,
        code: &str,
    ) -> Result<(String, serde_json::Value), AppError> {
        let session = self.sessions.lock().await.remove(state).ok_or_else(|| {
            warn!("OIDC callback with unknown state");
            AppError::Unauthorized("Bad user session.".into())
        })?;
        if session.started.elapsed() >= LOGIN_SESSION_TTL {
            return Err(AppError::Unauthorized("Bad user session.".into()));
        }

        let discovery = self.discovery().await?;

        // First exchange attempt; servers requiring a DPoP nonce answer 400
        // with use_dpop_nonce and hand the nonce out in a header.
        let stored_nonce = self.dpop_nonce.lock().await.clone();
        let mut response = self
            .token_request(&discovery, code, &session.code_verifier, stored_nonce.as_deref())
            .await?;
        if let Some(nonce) = self.capture_dpop_nonce(response.headers()) {
            if !response.status().is_success() {
                response = self
                    .token_request(&discovery, code, &session.code_verifier, Some(&nonce))
                    .await?;
            }
            *self.dpop_nonce.lock().await = Some(nonce);
        }
        if !response.status().is_success() {
            warn!(status = %response.status(), "token exchange rejected");
            return Err(AppError::Unauthorized("Invalid OIDC callback.".into()));
        }
        if let Some(nonce) = self.capture_dpop_nonce(response.headers()) {
            *self.dpop_nonce.lock().await = Some(nonce);
        }

        let tokens: serde_json::Value = response
            .json()
            .await
            .map_err(|_| AppError::Unauthorized("Invalid OIDC callback.".into()))?;
        let access_token = tokens
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::Unauthorized("Invalid OIDC callback.".into()))?;

        // Verify the id token nonce when the provider echoes one.
        if let Some(id_token) = tokens.get("id_token").and_then(|v| v.as_str()) {
            if let Some(id_nonce) = unverified_claim(id_token, "nonce") {
                if id_nonce != session.nonce {
                    warn!("id token nonce mismatch");
                    return Err(AppError::Unauthorized("Invalid OIDC callback.".into()));
                }
            }
        }

        let userinfo = self.fetch_userinfo(&discovery, access_token).await?;
        let jwt = auth.create_jwt_token_from_userinfo(&userinfo)?;
        Ok((jwt, userinfo))
    }

    /// Userinfo with the Bearer→DPoP upgrade: the access token moves to an
    /// `Authorization: DPoP` header and the proof carries `ath` plus the
    /// nonce captured from the token endpoint.
    async fn fetch_userinfo(
        &self,
        discovery: &Discovery,
        access_token: &str,
    ) -> Result<serde_json::Value, AppError> {
        let userinfo_endpoint = Url::parse(&discovery.userinfo_endpoint)
            .map_err(|e| AppError::System(format!("Invalid userinfo endpoint: {e}")))?;
        let nonce = self.dpop_nonce.lock().await.clone();
        let proof = self
            .dpop
            .proof("GET", &userinfo_endpoint, Some(access_token), nonce.as_deref())?;

        let response = self
            .http
            .get(userinfo_endpoint)
            .header("Authorization", format!("DPoP {access_token}"))
            .header("DPoP", proof)
            .send()
            .await
            .map_err(|_| AppError::Unauthorized("Invalid OIDC callback.".into()))?;
        if let Some(nonce) = self.capture_dpop_nonce(response.headers()) {
            *self.dpop_nonce.lock().await = Some(nonce);
        }
        if !response.status().is_success() {
            warn!(status = %response.status(), "userinfo request rejected");
            return Err(AppError::Unauthorized("Invalid OIDC callback.".into()));
        }
        response
            .json()
            .await
            .map_err(|_| AppError::Unauthorized("Invalid OIDC callback.".into()))
    }
}

impl sds_core::health::HealthProbe for OidcClient {
    fn name(&self) -> &str {
        "auth"
    }
    fn health(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Health> + Send + '_>> {
        Box::pin(OidcClient::health(self))
    }
}

/// Read one claim out of a JWT without verifying it; the id token signature
/// is the provider's concern, we only cross-check our own nonce.
fn unverified_claim(token: &str, claim: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value.get(claim)?.as_str().map(str::to_string)
}
