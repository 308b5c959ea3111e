//! Service health model and aggregation.
//!
//! Every enabled integration exposes a probe; `aggregate` fans the probes
//! out concurrently with a bounded timeout and reduces the results to one
//! overall status. `Down` dominates `Error`, which dominates `Degraded`,
//! which dominates `Up`.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::error;

/// Health of a single service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Health {
    Up,
    Down,
    Degraded,
    Error,
}

impl Health {
    /// Dominance rank used by the reduction; higher wins.
    fn severity(self) -> u8 {
        match self {
            Health::Up => 0,
            Health::Degraded => 1,
            Health::Error => 2,
            Health::Down => 3,
        }
    }
}

/// Aggregated health of the whole service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub status: Health,
    pub services: BTreeMap<String, Health>,
}

/// Reduce individual statuses to the overall status.
pub fn reduce(statuses: impl IntoIterator<Item = Health>) -> Health {
    statuses
        .into_iter()
        .max_by_key(|s| s.severity())
        .unwrap_or(Health::Up)
}

/// A named health probe. Object-safe so probes of different integrations can
/// be aggregated behind one list.
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;
    fn health(&self) -> Pin<Box<dyn std::future::Future<Output = Health> + Send + '_>>;
}

impl<T: HealthProbe + ?Sized> HealthProbe for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn health(&self) -> Pin<Box<dyn std::future::Future<Output = Health> + Send + '_>> {
        (**self).health()
    }
}

/// Probe every service concurrently and reduce to a [`ServiceHealth`].
///
/// A probe that does not answer within `timeout` reports `Error`; the probes
/// themselves are expected to map their own transport failures to `Down`.
pub async fn aggregate(probes: &[Box<dyn HealthProbe>], timeout: Duration) -> ServiceHealth {
    let checks = probes.iter().map(|probe| async move {
        let health = match tokio::time::timeout(timeout, probe.health()).await {
            Ok(health) => health,
            Err(_) => {
                error!(service = probe.name(), "health probe did not answer in time");
                Health::Error
            }
        };
        (probe.name().to_string(), health)
    });

    let services: BTreeMap<String, Health> = join_all(checks).await.into_iter().collect();
    let status = reduce(services.values().copied());
    ServiceHealth { status, services }
}
