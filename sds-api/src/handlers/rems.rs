//! REMS read API: organisations with their workflows and licenses.

use axum::extract::{Query, State};
use axum::Json;
use sds_auth::AuthenticatedUser;
use sds_client::models::rems::{group_organisations, Organization};
use sds_core::AppError;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RemsQuery {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub organisation: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

/// GET /v1/rems?language=…&organisation=…
pub async fn organisations(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<RemsQuery>,
) -> Result<Json<Vec<Organization>>, AppError> {
    let rems = state.rems()?;
    let workflows = rems.get_workflows().await?;
    let licenses = rems.get_licenses().await?;
    Ok(Json(group_organisations(
        &workflows,
        &licenses,
        &query.language,
        query.organisation.as_deref(),
    )))
}
