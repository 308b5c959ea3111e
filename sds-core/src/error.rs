use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// A single field-level validation failure, reported inside the problem body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Application-wide error taxonomy.
///
/// Every fallible path in the system terminates in one of these variants;
/// the HTTP edge renders them as RFC 7807 problem documents. Upstream
/// variants originate in the service client layer, the rest are produced
/// locally.
pub enum AppError {
    /// Bad payload, missing required data or a violated domain rule (400).
    User(String),
    /// Payload validation failures with per-field details (400).
    Validation(Vec<FieldError>),
    /// Missing or invalid JWT / API key (401).
    Unauthorized(String),
    /// Authenticated but not a member of the owning project (403).
    Forbidden(String),
    /// Unknown submission, object or key (404).
    NotFound(String),
    /// A dependent service rejected the request with 4xx; carries the
    /// original status code.
    UpstreamClient { status: StatusCode, message: String },
    /// A dependent service answered 5xx or with a malformed body (502).
    UpstreamServer(String),
    /// A dependent service timed out after retries (504).
    UpstreamTimeout(String),
    /// A disabled or misconfigured service was invoked (500).
    Config(String),
    /// Internal invariant violation (500).
    System(String),
}

impl AppError {
    /// The HTTP status this error renders as.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::User(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UpstreamClient { status, .. } => *status,
            AppError::UpstreamServer(_) => StatusCode::BAD_GATEWAY,
            AppError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Config(_) | AppError::System(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            AppError::User(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::UpstreamServer(msg)
            | AppError::UpstreamTimeout(msg)
            | AppError::Config(msg)
            | AppError::System(msg) => msg.clone(),
            AppError::UpstreamClient { message, .. } => message.clone(),
            AppError::Validation(errors) => format!("{} validation error(s)", errors.len()),
        }
    }
}

/// RFC 7807 problem document.
#[derive(Debug, Serialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub type_: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

/// Render a problem document with the given status and detail.
///
/// `instance` is the request path when the caller (a middleware) has one.
pub fn problem_response(
    status: StatusCode,
    detail: impl Into<String>,
    instance: Option<&str>,
    errors: Option<Vec<FieldError>>,
) -> Response {
    let problem = Problem {
        type_: "about:blank".into(),
        title: status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string(),
        status: status.as_u16(),
        detail: detail.into(),
        instance: instance.map(str::to_string),
        errors,
    };
    let body = serde_json::to_string(&problem).unwrap_or_else(|_| "{}".into());
    Response::builder()
        .status(status)
        .header("content-type", "application/problem+json")
        .body(body.into())
        .unwrap_or_else(|_| status.into_response())
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        let errors = match self {
            AppError::Validation(errors) => Some(errors),
            _ => None,
        };
        problem_response(status, detail, None, errors)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::User(msg) => write!(f, "Bad Request: {msg}"),
            AppError::Validation(errors) => write!(f, "Validation failed: {} error(s)", errors.len()),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            AppError::NotFound(msg) => write!(f, "Not Found: {msg}"),
            AppError::UpstreamClient { status, message } => {
                write!(f, "Upstream client error ({status}): {message}")
            }
            AppError::UpstreamServer(msg) => write!(f, "Upstream server error: {msg}"),
            AppError::UpstreamTimeout(msg) => write!(f, "Upstream timeout: {msg}"),
            AppError::Config(msg) => write!(f, "Configuration error: {msg}"),
            AppError::System(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn problem_parts(err: AppError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn user_error_renders_400_problem() {
        let (status, body) = problem_parts(AppError::User("duplicate name".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["title"], "Bad Request");
        assert_eq!(body["status"], 400);
        assert_eq!(body["detail"], "duplicate name");
    }

    #[tokio::test]
    async fn upstream_client_error_keeps_original_status() {
        let (status, body) = problem_parts(AppError::UpstreamClient {
            status: StatusCode::CONFLICT,
            message: "rems error: already exists".into(),
        })
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], 409);
    }

    #[tokio::test]
    async fn upstream_server_error_is_bad_gateway() {
        let (status, _) = problem_parts(AppError::UpstreamServer("datacite 500".into())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn upstream_timeout_is_gateway_timeout() {
        let (status, _) = problem_parts(AppError::UpstreamTimeout("metax".into())).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn validation_error_lists_fields() {
        let (status, body) = problem_parts(AppError::Validation(vec![FieldError {
            field: "name".into(),
            message: "must not be empty".into(),
        }]))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["field"], "name");
        assert_eq!(body["errors"][0]["message"], "must not be empty");
    }

    #[test]
    fn display_formatting() {
        assert_eq!(
            AppError::NotFound("submission".into()).to_string(),
            "Not Found: submission"
        );
        assert_eq!(
            AppError::Config("METAX_URL unset".into()).to_string(),
            "Configuration error: METAX_URL unset"
        );
    }
}
