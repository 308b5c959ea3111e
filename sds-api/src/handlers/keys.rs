//! API key handlers.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sds_auth::service::ApiKey;
use sds_auth::AuthenticatedUser;
use sds_core::AppError;
use sds_data::session::Session;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ApiKeyRequest {
    pub key_id: String,
}

/// POST /v1/api/keys — the plain-text key is returned exactly once.
pub async fn create(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
    Json(body): Json<ApiKeyRequest>,
) -> Result<Response, AppError> {
    let api_key = state
        .auth
        .create_api_key(&session, &user.user_id, &body.key_id)
        .await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("\n{api_key}\n\n"),
    )
        .into_response())
}

/// GET /v1/api/keys
pub async fn list(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
) -> Result<Json<Vec<ApiKey>>, AppError> {
    Ok(Json(state.auth.list_api_keys(&session, &user.user_id).await?))
}

/// DELETE /v1/api/keys
pub async fn revoke(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
    Json(body): Json<ApiKeyRequest>,
) -> Result<StatusCode, AppError> {
    state
        .auth
        .revoke_api_key(&session, &user.user_id, &body.key_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
