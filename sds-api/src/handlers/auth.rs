//! OIDC login, callback and logout. These live outside the API prefix; the
//! callback is what turns an external login into the application cookie.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use sds_auth::service::JWT_EXPIRATION_DAYS;
use sds_auth::AUTH_COOKIE;
use sds_core::AppError;
use serde::Deserialize;
use tracing::info;

use crate::state::AppState;

fn see_other(location: &str, cookies: Vec<String>) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(header::LOCATION, location)
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0");
    for cookie in cookies {
        builder = builder.header(header::SET_COOKIE, cookie);
    }
    builder
        .body(axum::body::Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn access_token_cookie(value: &str, secure: bool, max_age: i64) -> String {
    let mut cookie = format!(
        "{AUTH_COOKIE}={value}; HttpOnly; SameSite=Strict; Path=/; Max-Age={max_age}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// GET /login — redirect the user to the identity provider.
pub async fn login(State(state): State<AppState>) -> Result<Response, AppError> {
    let url = state.oidc()?.login_url().await?;
    Ok(see_other(&url, Vec::new()))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

/// GET /callback — finish the flow and set the application cookie.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, AppError> {
    let (Some(oidc_state), Some(code)) = (query.state, query.code) else {
        return Err(AppError::Unauthorized(
            "AAI response is missing mandatory params.".into(),
        ));
    };

    let (jwt, _userinfo) = state
        .oidc()?
        .callback(&state.auth, &oidc_state, &code)
        .await?;

    let location = format!("{}/home", state.redirect_url.trim_end_matches('/'));
    info!("OIDC login finished, redirecting to home");
    let max_age = JWT_EXPIRATION_DAYS * 24 * 60 * 60;
    Ok(see_other(
        &location,
        vec![access_token_cookie(&jwt, state.secure_cookie, max_age)],
    ))
}

/// GET /logout — clear the cookie and return to the front page.
pub async fn logout(State(state): State<AppState>) -> Response {
    let location = format!("{}/", state.redirect_url.trim_end_matches('/'));
    see_other(
        &location,
        vec![access_token_cookie("", state.secure_cookie, 0)],
    )
}
