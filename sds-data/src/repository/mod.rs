//! Repositories over the per-request [`Session`](crate::session::Session).
//!
//! All statements are plain runtime-bound queries; transaction control
//! belongs to the session middleware alone.

mod api_key;
mod file;
mod object;
mod registration;
mod submission;

pub use api_key::ApiKeyRepository;
pub use file::FileRepository;
pub use object::ObjectRepository;
pub use registration::{NewRegistration, RegistrationRepository};
pub use submission::{NewSubmission, SubmissionFilter, SubmissionPatch, SubmissionRepository};

use sds_core::AppError;

pub(crate) fn db_error(err: sqlx::Error) -> AppError {
    AppError::System(format!("Database error: {err}"))
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|d| d.kind() == sqlx::error::ErrorKind::UniqueViolation)
        .unwrap_or(false)
}
