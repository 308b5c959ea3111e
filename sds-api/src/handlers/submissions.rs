//! Submission CRUD and registration reads.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use sds_auth::AuthenticatedUser;
use sds_client::models::datacite::DataCiteMetadata;
use sds_client::models::rems::RemsSpec;
use sds_core::AppError;
use sds_data::entity::{SubmissionEntity, Workflow};
use sds_data::page::{Page, Pageable};
use sds_data::repository::{
    NewSubmission, RegistrationRepository, SubmissionFilter, SubmissionPatch, SubmissionRepository,
};
use sds_data::session::Session;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateSubmissionRequest {
    pub name: String,
    pub project_id: String,
    pub workflow: Workflow,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub rems: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PatchSubmissionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub rems: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "projectId")]
    pub project_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub published: Option<bool>,
    #[serde(default)]
    pub date_created_start: Option<String>,
    #[serde(default)]
    pub date_created_end: Option<String>,
    #[serde(default)]
    pub date_modified_start: Option<String>,
    #[serde(default)]
    pub date_modified_end: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

/// Parse a `YYYY-MM-DD` filter boundary; `end_of_day` makes the bound
/// inclusive.
fn parse_date(value: &str, end_of_day: bool) -> Result<DateTime<Utc>, AppError> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::User(format!("Invalid date parameter: {value}")))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| AppError::User(format!("Invalid date parameter: {value}")))
}

/// Validate the JSON documents a submission carries.
fn validate_documents(
    metadata: Option<&serde_json::Value>,
    rems: Option<&serde_json::Value>,
) -> Result<(), AppError> {
    if let Some(metadata) = metadata {
        DataCiteMetadata::parse(metadata)?;
    }
    if let Some(rems) = rems {
        RemsSpec::parse(rems)?;
    }
    Ok(())
}

fn reject_published(submission: &SubmissionEntity, action: &str) -> Result<(), AppError> {
    if submission.published {
        return Err(AppError::User(format!(
            "Published submission cannot be {action}"
        )));
    }
    Ok(())
}

/// POST /v1/submissions
pub async fn create(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
    Json(body): Json<CreateSubmissionRequest>,
) -> Result<Response, AppError> {
    state.authorize_project(&user.user_id, &body.project_id).await?;
    if body.name.trim().is_empty() {
        return Err(AppError::User("Submission name must not be empty".into()));
    }
    validate_documents(body.metadata.as_ref(), body.rems.as_ref())?;

    let submission = SubmissionRepository
        .create(
            &session,
            NewSubmission {
                project_id: body.project_id,
                name: body.name,
                title: body.title.unwrap_or_default(),
                description: body.description.unwrap_or_default(),
                workflow: body.workflow,
                bucket: body.bucket,
                metadata: body.metadata,
                rems: body.rems,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(submission)).into_response())
}

/// GET /v1/submissions
pub async fn list(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    state.authorize_project(&user.user_id, &query.project_id).await?;

    let pageable = Pageable {
        page: query.page,
        per_page: query.per_page,
    };
    pageable.validate()?;

    let filter = SubmissionFilter {
        project_id: query.project_id.clone(),
        name: query.name,
        published: query.published,
        date_created_start: query
            .date_created_start
            .as_deref()
            .map(|d| parse_date(d, false))
            .transpose()?,
        date_created_end: query
            .date_created_end
            .as_deref()
            .map(|d| parse_date(d, true))
            .transpose()?,
        date_modified_start: query
            .date_modified_start
            .as_deref()
            .map(|d| parse_date(d, false))
            .transpose()?,
        date_modified_end: query
            .date_modified_end
            .as_deref()
            .map(|d| parse_date(d, true))
            .transpose()?,
    };

    let (submissions, total) = SubmissionRepository.list(&session, &filter, &pageable).await?;
    let page = Page::new(submissions, &pageable, total);

    let mut headers = HeaderMap::new();
    let extra_query = format!("projectId={}", query.project_id);
    if let Some(link) = page.link_header("/v1/submissions", &extra_query) {
        if let Ok(value) = link.parse() {
            headers.insert(header::LINK, value);
        }
    }

    let body = serde_json::json!({
        "page": page.page,
        "per_page": page.per_page,
        "total": page.total,
        "total_pages": page.total_pages,
        "submissions": page.items,
    });
    Ok((headers, Json(body)).into_response())
}

/// GET /v1/submissions/{submissionId}
pub async fn get(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
    Path(submission_id): Path<String>,
) -> Result<Json<SubmissionEntity>, AppError> {
    let submission = SubmissionRepository.get_required(&session, &submission_id).await?;
    state.authorize_project(&user.user_id, &submission.project_id).await?;
    Ok(Json(submission))
}

/// PATCH /v1/submissions/{submissionId}
pub async fn patch(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
    Path(submission_id): Path<String>,
    Json(body): Json<PatchSubmissionRequest>,
) -> Result<Json<SubmissionEntity>, AppError> {
    let submission = SubmissionRepository.get_required(&session, &submission_id).await?;
    state.authorize_project(&user.user_id, &submission.project_id).await?;
    reject_published(&submission, "modified")?;
    validate_documents(body.metadata.as_ref(), body.rems.as_ref())?;

    let updated = SubmissionRepository
        .update(
            &session,
            &submission_id,
            SubmissionPatch {
                name: body.name,
                title: body.title,
                description: body.description,
                bucket: body.bucket,
                metadata: body.metadata,
                rems: body.rems,
            },
        )
        .await?;
    Ok(Json(updated))
}

/// DELETE /v1/submissions/{submissionId}
pub async fn delete(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
    Path(submission_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let submission = SubmissionRepository.get_required(&session, &submission_id).await?;
    state.authorize_project(&user.user_id, &submission.project_id).await?;
    reject_published(&submission, "deleted")?;
    SubmissionRepository.delete(&session, &submission_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/submissions/{submissionId}/registrations
pub async fn registrations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
    Path(submission_id): Path<String>,
) -> Result<Response, AppError> {
    let submission = SubmissionRepository.get_required(&session, &submission_id).await?;
    state.authorize_project(&user.user_id, &submission.project_id).await?;
    let registrations = RegistrationRepository.list(&session, &submission_id).await?;
    Ok(Json(registrations).into_response())
}
