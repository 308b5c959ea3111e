//! Per-request database session.
//!
//! The middleware assigns one transaction to every API request and parks it
//! in the request extensions — the request-scoped context slot repositories
//! read it from. The transaction begins before the handler runs and ends
//! after it returns: committed when the response is a success, rolled back
//! when the handler answered with an error status. Repositories must not
//! begin, commit or roll back on their own.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use sds_core::error::problem_response;
use sds_core::{AppError, API_PREFIX};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error};

type Tx = Transaction<'static, Sqlite>;

/// Handle to the request's transaction. Cloning is cheap; all clones refer
/// to the same underlying transaction.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<Option<Tx>>>,
}

/// Exclusive access to the session's connection for one database call.
pub struct SessionGuard<'a>(MutexGuard<'a, Option<Tx>>);

impl SessionGuard<'_> {
    /// The connection of the open transaction.
    pub fn conn(&mut self) -> Result<&mut sqlx::SqliteConnection, AppError> {
        match self.0.as_mut() {
            Some(tx) => Ok(&mut *tx),
            None => Err(AppError::System("Session is already closed".into())),
        }
    }
}

impl Session {
    pub(crate) fn new(tx: Tx) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Acquire the session for a database operation.
    pub async fn guard(&self) -> SessionGuard<'_> {
        SessionGuard(self.inner.lock().await)
    }

    /// Standalone session outside the middleware, for test setups.
    #[doc(hidden)]
    pub async fn for_tests(pool: &SqlitePool) -> Session {
        Session::new(pool.begin().await.expect("failed to begin test transaction"))
    }

    async fn commit(&self) -> Result<(), AppError> {
        match self.inner.lock().await.take() {
            Some(tx) => tx
                .commit()
                .await
                .map_err(|e| AppError::System(format!("Transaction commit failed: {e}"))),
            None => Err(AppError::System("Session is already closed".into())),
        }
    }

    async fn rollback(&self) -> Result<(), AppError> {
        match self.inner.lock().await.take() {
            Some(tx) => tx
                .rollback()
                .await
                .map_err(|e| AppError::System(format!("Transaction rollback failed: {e}"))),
            None => Err(AppError::System("Session is already closed".into())),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            problem_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Missing database session",
                Some(parts.uri.path()),
                None,
            )
        })
    }
}

/// Session middleware: one transaction per API request.
///
/// Requests outside the API prefix pass through untouched. A request that
/// already carries a session means the middleware was activated twice, which
/// is an internal invariant violation.
pub async fn session_middleware(
    State(pool): State<SqlitePool>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if !path.starts_with(API_PREFIX) {
        return next.run(req).await;
    }

    let method = req.method().clone();
    if req.extensions().get::<Session>().is_some() {
        error!(%method, %path, "session middleware context already set");
        return problem_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Session context is already set",
            Some(&path),
            None,
        );
    }

    let tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(e) => {
            error!(%method, %path, error = %e, "failed to begin transaction");
            return problem_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database unavailable",
                Some(&path),
                None,
            );
        }
    };

    let session = Session::new(tx);
    req.extensions_mut().insert(session.clone());

    let response = next.run(req).await;

    let outcome = if response.status().as_u16() < 400 {
        debug!(%method, %path, status = %response.status(), "committing request transaction");
        session.commit().await
    } else {
        debug!(%method, %path, status = %response.status(), "rolling back request transaction");
        session.rollback().await
    };

    match outcome {
        Ok(()) => response,
        Err(e) => {
            error!(%method, %path, error = %e, "transaction finalisation failed");
            problem_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Transaction finalisation failed",
                Some(&path),
                None,
            )
        }
    }
}
