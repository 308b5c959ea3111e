//! Aggregated health endpoint.

use std::pin::Pin;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use sds_core::health::{aggregate, HealthProbe};
use sds_core::{Health, ServiceHealth};
use sqlx::SqlitePool;

use crate::state::AppState;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

struct DatabaseProbe {
    pool: SqlitePool,
}

impl HealthProbe for DatabaseProbe {
    fn name(&self) -> &str {
        "database"
    }
    fn health(&self) -> Pin<Box<dyn std::future::Future<Output = Health> + Send + '_>> {
        Box::pin(async move {
            if sds_data::is_healthy(&self.pool).await {
                Health::Up
            } else {
                Health::Down
            }
        })
    }
}

/// GET /health — probe every enabled integration concurrently and reduce.
pub async fn health(State(state): State<AppState>) -> Json<ServiceHealth> {
    let mut probes: Vec<Box<dyn HealthProbe>> = vec![Box::new(DatabaseProbe {
        pool: state.pool.clone(),
    })];

    if let Some(datacite) = &state.datacite {
        probes.push(Box::new(datacite.clone()));
    }
    if let Some(pid) = &state.pid {
        probes.push(Box::new(pid.clone()));
    }
    if let Some(metax) = &state.metax {
        probes.push(Box::new(metax.clone()));
    }
    if let Some(ror) = &state.ror {
        probes.push(Box::new(ror.clone()));
    }
    if let Some(rems) = &state.rems {
        probes.push(Box::new(rems.clone()));
    }
    if let Some(oidc) = &state.oidc {
        probes.push(Box::new(oidc.clone()));
    }
    if let Some(keystone) = &state.keystone {
        probes.push(Box::new(keystone.clone()));
    }
    if let Some(admin) = &state.admin {
        probes.push(Box::new(admin.clone()));
    }

    Json(aggregate(&probes, PROBE_TIMEOUT).await)
}
