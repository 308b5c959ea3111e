//! User handler.

use axum::extract::State;
use axum::Json;
use sds_auth::AuthenticatedUser;
use sds_core::AppError;
use serde::Serialize;

use crate::project::Project;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub user_id: String,
    pub user_name: String,
    pub projects: Vec<Project>,
}

/// GET /v1/users — the authenticated user and their projects.
pub async fn get(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserResponse>, AppError> {
    let projects = state.projects.get_user_projects(&user.user_id).await?;
    Ok(Json(UserResponse {
        user_id: user.user_id,
        user_name: user.user_name,
        projects,
    }))
}
