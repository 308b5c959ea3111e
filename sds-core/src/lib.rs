//! Core types shared by every SD Submit crate.
//!
//! Holds the error taxonomy with its `application/problem+json` rendering,
//! the environment-driven configuration, and the service health model with
//! its concurrent aggregator.

pub mod config;
pub mod error;
pub mod health;

pub use config::Config;
pub use error::AppError;
pub use health::{Health, ServiceHealth};

/// URL prefix under which the authenticated API is mounted. Requests outside
/// this prefix bypass the session and auth middlewares.
pub const API_PREFIX: &str = "/v1";
