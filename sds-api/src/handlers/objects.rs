//! Metadata object handlers: JSON and XML ingestion, reads, deletion and
//! standalone XML validation.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sds_auth::AuthenticatedUser;
use sds_core::error::FieldError;
use sds_core::AppError;
use sds_data::entity::ObjectEntity;
use sds_data::repository::{ObjectRepository, SubmissionRepository};
use sds_data::session::Session;
use serde::Deserialize;

use crate::state::{workflow_object_types, AppState};
use crate::xml::XmlError;

#[derive(Debug, Deserialize)]
pub struct ObjectQuery {
    #[serde(rename = "submissionId")]
    pub submission_id: String,
}

fn is_xml(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim())
        .is_some_and(|v| v.ends_with("xml"))
}

fn xml_errors_to_validation(errors: Vec<XmlError>) -> AppError {
    AppError::Validation(
        errors
            .into_iter()
            .map(|e| FieldError {
                field: e.pointer,
                message: format!("{} (at {})", e.reason, e.position),
            })
            .collect(),
    )
}

async fn writable_submission(
    state: &AppState,
    session: &Session,
    user: &AuthenticatedUser,
    submission_id: &str,
) -> Result<sds_data::entity::SubmissionEntity, AppError> {
    let submission = SubmissionRepository.get_required(session, submission_id).await?;
    state
        .authorize_project(&user.user_id, &submission.project_id)
        .await?;
    if submission.published {
        return Err(AppError::User("Published submission cannot be modified".into()));
    }
    Ok(submission)
}

/// POST /v1/objects/{schema}?submissionId=…
///
/// Accepts a JSON document directly, or XML which goes through the XML
/// processor first.
pub async fn create(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
    Path(schema): Path<String>,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, AppError> {
    let submission = writable_submission(&state, &session, &user, &query.submission_id).await?;

    let schema = schema.to_lowercase();
    let allowed = workflow_object_types(submission.workflow);
    if !allowed.contains(&schema.as_str()) {
        return Err(AppError::User(format!(
            "Object type '{schema}' is not valid for workflow {}",
            submission.workflow
        )));
    }

    let (title, description, document) = if is_xml(&headers) {
        let xml = std::str::from_utf8(&body)
            .map_err(|_| AppError::User("XML body is not valid UTF-8".into()))?;
        let doc = state
            .xml
            .parse_and_validate(&schema, xml)
            .map_err(xml_errors_to_validation)?;
        (doc.title, doc.description, doc.document)
    } else {
        let document: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| AppError::User(format!("Invalid JSON document: {e}")))?;
        let title = document
            .get("title")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let description = document
            .get("description")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        (title, description, document)
    };

    let object = ObjectRepository
        .add(
            &session,
            &query.submission_id,
            &schema,
            title,
            description,
            document,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(object)).into_response())
}

/// GET /v1/objects/{schema}/{objectId}
pub async fn get(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
    Path((_schema, object_id)): Path<(String, String)>,
) -> Result<Json<ObjectEntity>, AppError> {
    let object = ObjectRepository
        .get(&session, &object_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Metadata object '{object_id}' was not found")))?;
    let submission = SubmissionRepository
        .get_required(&session, &object.submission_id)
        .await?;
    state
        .authorize_project(&user.user_id, &submission.project_id)
        .await?;
    Ok(Json(object))
}

/// DELETE /v1/objects/{schema}/{objectId}
pub async fn delete(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    session: Session,
    Path((_schema, object_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let object = ObjectRepository
        .get(&session, &object_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Metadata object '{object_id}' was not found")))?;
    writable_submission(&state, &session, &user, &object.submission_id).await?;
    ObjectRepository.delete(&session, &object_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    pub schema: String,
}

/// POST /v1/validate — XML validation without persisting anything.
pub async fn validate(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<ValidateQuery>,
    body: String,
) -> Result<Response, AppError> {
    match state.xml.parse_and_validate(&query.schema, &body) {
        Ok(_) => Ok(Json(serde_json::json!({"isValid": true})).into_response()),
        Err(errors) => Ok((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"isValid": false, "errors": errors})),
        )
            .into_response()),
    }
}
