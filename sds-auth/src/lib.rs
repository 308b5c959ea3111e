//! Authentication: application JWTs, hashed API keys, the OIDC
//! authorization-code flow with DPoP, and the request auth middleware.

pub mod dpop;
pub mod middleware;
pub mod oidc;
pub mod service;

pub use middleware::{auth_middleware, AuthenticatedUser, AUTH_COOKIE};
pub use service::AuthService;
