//! Router assembly and middleware layering.
//!
//! Order matters: the session middleware is outermost so the transaction is
//! open before authentication (API key validation reads the database), and
//! commits or rolls back after the response is decided.

use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{auth, files, health, keys, objects, rems, submissions, users};
use crate::publish;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/v1/submissions",
            post(submissions::create).get(submissions::list),
        )
        .route(
            "/v1/submissions/{submissionId}",
            get(submissions::get)
                .patch(submissions::patch)
                .delete(submissions::delete),
        )
        .route(
            "/v1/submissions/{submissionId}/registrations",
            get(submissions::registrations),
        )
        .route(
            "/v1/submissions/{submissionId}/files",
            post(files::add_files).get(files::list_files),
        )
        .route("/v1/files/{fileId}", delete(files::delete_file))
        .route("/v1/objects/{schema}", post(objects::create))
        .route(
            "/v1/objects/{schema}/{objectId}",
            get(objects::get).delete(objects::delete),
        )
        .route("/v1/validate", post(objects::validate))
        .route("/v1/publish/{submissionId}", patch(publish::publish))
        .route(
            "/v1/api/keys",
            post(keys::create).get(keys::list).delete(keys::revoke),
        )
        .route("/v1/buckets", get(files::list_buckets))
        .route(
            "/v1/buckets/{bucket}",
            put(files::grant_bucket_policy).head(files::check_bucket_policy),
        )
        .route("/v1/buckets/{bucket}/files", get(files::list_bucket_files))
        .route("/v1/rems", get(rems::organisations))
        .route("/v1/users", get(users::get));

    Router::new()
        .merge(api)
        .route("/login", get(auth::login))
        .route("/callback", get(auth::callback))
        .route("/logout", get(auth::logout))
        .route("/health", get(health::health))
        .layer(from_fn_with_state(
            state.auth.clone(),
            sds_auth::auth_middleware,
        ))
        .layer(from_fn_with_state(
            state.pool.clone(),
            sds_data::session::session_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
