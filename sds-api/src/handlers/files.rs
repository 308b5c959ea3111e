//! Bucket handlers (object storage) and submission file registration.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sds_auth::AuthenticatedUser;
use sds_core::AppError;
use sds_data::entity::FileEntity;
use sds_data::repository::{FileRepository, SubmissionRepository};
use sds_data::session::Session;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProjectQuery {
    #[serde(rename = "projectId")]
    pub project_id: String,
}

/// GET /v1/buckets?projectId=…
pub async fn list_buckets(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    state.authorize_project(&user.user_id, &query.project_id).await?;
    let credentials = state
        .keystone()?
        .get_ec2_credentials(&user.user_id, &query.project_id)
        .await?;
    let buckets = state.file_provider()?.list_buckets(&credentials).await?;
    Ok(Json(buckets))
}

/// GET /v1/buckets/{bucket}/files?projectId=…
pub async fn list_bucket_files(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(bucket): Path<String>,
    Query(query): Query<ProjectQuery>,
) -> Result<Response, AppError> {
    state.authorize_project(&user.user_id, &query.project_id).await?;
    let files = state.file_provider()?.list_files(&bucket).await?;
    Ok(Json(files).into_response())
}

/// PUT /v1/buckets/{bucket}?projectId=… — grant the read policy.
pub async fn grant_bucket_policy(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(bucket): Path<String>,
    Query(query): Query<ProjectQuery>,
) -> Result<StatusCode, AppError> {
    state.authorize_project(&user.user_id, &query.project_id).await?;
    let credentials = state
        .keystone()?
        .get_ec2_credentials(&user.user_id, &query.project_id)
        .await?;
    state
        .file_provider()?
        .grant_read_policy(&bucket, &credentials)
        .await?;
    Ok(StatusCode::OK)
}

/// HEAD /v1/buckets/{bucket} — is the read policy present?
pub async fn check_bucket_policy(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(bucket): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.file_provider()?.verify_read_policy(&bucket).await? {
        Ok(StatusCode::OK)
    } else {
        Ok(StatusCode::BAD_REQUEST)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AddFileRequest {
    pub path: String,
    #[serde(default)]
    pub bytes: Option<i64>,
    #[serde(default)]
    pub object_id: Option<String>,
}

/// POST /v1/submissions/{submissionId}/files
pub async fn add_files(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
    Path(submission_id): Path<String>,
    Json(body): Json<Vec<AddFileRequest>>,
) -> Result<Response, AppError> {
    let submission = SubmissionRepository.get_required(&session, &submission_id).await?;
    state.authorize_project(&user.user_id, &submission.project_id).await?;
    if submission.published {
        return Err(AppError::User("Published submission cannot be modified".into()));
    }
    if body.is_empty() {
        return Err(AppError::User("No files provided".into()));
    }

    let mut created = Vec::with_capacity(body.len());
    for file in body {
        // When the bucket is known, the file must exist there and be
        // non-empty.
        let bytes = match (&submission.bucket, &state.file_provider, file.bytes) {
            (Some(bucket), Some(provider), _) => {
                let size = provider.verify_file(bucket, &file.path).await?.ok_or_else(|| {
                    AppError::User(format!(
                        "File '{}' does not exist in '{bucket}'.",
                        file.path
                    ))
                })?;
                if size == 0 {
                    return Err(AppError::User(format!("File '{}' is empty.", file.path)));
                }
                size
            }
            (_, _, Some(bytes)) => bytes,
            _ => 0,
        };
        created.push(
            FileRepository
                .add(&session, &submission_id, file.object_id, &file.path, bytes)
                .await?,
        );
    }
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

/// GET /v1/submissions/{submissionId}/files
pub async fn list_files(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
    Path(submission_id): Path<String>,
) -> Result<Json<Vec<FileEntity>>, AppError> {
    let submission = SubmissionRepository.get_required(&session, &submission_id).await?;
    state.authorize_project(&user.user_id, &submission.project_id).await?;
    Ok(Json(FileRepository.list(&session, &submission_id).await?))
}

/// DELETE /v1/files/{fileId}
pub async fn delete_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
    Path(file_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let file = FileRepository
        .get(&session, &file_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File '{file_id}' was not found")))?;
    let submission = SubmissionRepository
        .get_required(&session, &file.submission_id)
        .await?;
    state.authorize_project(&user.user_id, &submission.project_id).await?;
    if submission.published {
        return Err(AppError::User("Published submission cannot be modified".into()));
    }
    FileRepository.delete(&session, &file_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
