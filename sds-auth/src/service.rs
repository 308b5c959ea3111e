//! Application JWTs and API keys.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sds_core::AppError;
use sds_data::entity::ApiKeyEntity;
use sds_data::repository::ApiKeyRepository;
use sds_data::session::Session;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

pub const JWT_ISSUER: &str = "SD Submit";
/// Application tokens live for one week.
pub const JWT_EXPIRATION_DAYS: i64 = 7;

const API_KEY_ID_LENGTH: usize = 12;
const API_KEY_LENGTH: usize = 32;
const SALT_BYTES: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    user_name: String,
    iat: i64,
    exp: i64,
    iss: String,
}

/// An API key as listed to its owner; the secret is never stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub key_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Timing-independent byte comparison for hash checks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub struct AuthService {
    jwt_secret: String,
    repository: ApiKeyRepository,
}

impl AuthService {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            repository: ApiKeyRepository,
        }
    }

    // JWT tokens
    //

    /// Sign an application JWT for the user.
    pub fn create_jwt_token(&self, user_id: &str, user_name: &str) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            user_name: user_name.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::days(JWT_EXPIRATION_DAYS)).timestamp(),
            iss: JWT_ISSUER.to_string(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::System(format!("Failed to sign JWT: {e}")))
    }

    /// Sign an application JWT from an OIDC userinfo response.
    ///
    /// The user id comes from `CSCUserName`, `remoteUserIdentifier` or `sub`
    /// in that order; the display name from the given and family names with
    /// the user id as fallback.
    pub fn create_jwt_token_from_userinfo(
        &self,
        userinfo: &serde_json::Value,
    ) -> Result<String, AppError> {
        let user_id = ["CSCUserName", "remoteUserIdentifier", "sub"]
            .iter()
            .find_map(|claim| userinfo.get(*claim)?.as_str())
            .ok_or_else(|| {
                AppError::Unauthorized("Authenticated user is missing required claims.".into())
            })?;

        let given_name = userinfo
            .get("given_name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        let family_name = userinfo
            .get("family_name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        let user_name = if given_name.is_empty() && family_name.is_empty() {
            user_id.to_string()
        } else {
            format!("{given_name} {family_name}").trim().to_string()
        };

        self.create_jwt_token(user_id, &user_name)
    }

    /// Verify signature, issuer and expiry; returns the user id and name.
    pub fn validate_jwt_token(&self, token: &str) -> Result<(String, String), AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[JWT_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| AppError::Unauthorized(format!("Invalid token: {e}")))?;
        Ok((data.claims.sub, data.claims.user_name))
    }

    // API keys
    //

    fn hash_api_key(api_key: &str, salt: &str) -> String {
        hex::encode(Sha256::digest(format!("{api_key}{salt}").as_bytes()))
    }

    /// Create an API key for the user under a user-chosen key id.
    ///
    /// Returns the plain-text secret prefixed with the generated key id —
    /// the only time it is ever visible. The store keeps the salted hash.
    pub async fn create_api_key(
        &self,
        session: &Session,
        user_id: &str,
        key_id: &str,
    ) -> Result<String, AppError> {
        let (generated_key_id, api_key, salt) = {
            let mut rng = rand::thread_rng();
            let generated_key_id = hex::encode(rng.gen::<[u8; API_KEY_ID_LENGTH / 2]>());
            let api_key: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(API_KEY_LENGTH)
                .map(char::from)
                .collect();
            let salt = hex::encode(rng.gen::<[u8; SALT_BYTES]>());
            (generated_key_id, api_key, salt)
        };

        self.repository
            .add(
                session,
                ApiKeyEntity {
                    key_id: generated_key_id.clone(),
                    user_id: user_id.to_string(),
                    user_key_id: key_id.to_string(),
                    api_key: Self::hash_api_key(&api_key, &salt),
                    salt,
                    created_at: Utc::now(),
                },
            )
            .await?;

        Ok(format!("{generated_key_id}.{api_key}"))
    }

    /// Validate `"{generatedKeyId}.{secret}"`; any failure is `None`.
    pub async fn validate_api_key(
        &self,
        session: &Session,
        api_key: &str,
    ) -> Result<Option<String>, AppError> {
        let Some((key_id, secret)) = api_key.split_once('.') else {
            return Ok(None);
        };

        let Some(stored) = self.repository.get(session, key_id).await? else {
            return Ok(None);
        };

        let hashed = Self::hash_api_key(secret, &stored.salt);
        if constant_time_eq(stored.api_key.as_bytes(), hashed.as_bytes()) {
            Ok(Some(stored.user_id))
        } else {
            warn!(%key_id, "API key hash mismatch");
            Ok(None)
        }
    }

    pub async fn revoke_api_key(
        &self,
        session: &Session,
        user_id: &str,
        key_id: &str,
    ) -> Result<(), AppError> {
        self.repository.delete(session, user_id, key_id).await
    }

    pub async fn list_api_keys(
        &self,
        session: &Session,
        user_id: &str,
    ) -> Result<Vec<ApiKey>, AppError> {
        Ok(self
            .repository
            .list(session, user_id)
            .await?
            .into_iter()
            .map(|entity| ApiKey {
                key_id: entity.user_key_id,
                created_at: Some(entity.created_at),
            })
            .collect())
    }
}
