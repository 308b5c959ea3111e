//! Project membership.
//!
//! Membership is authoritative in the external identity provider and cached
//! for up to an hour per user. The provider is a port; the production
//! implementation reads the project catalogue from Keystone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sds_client::cache::TtlCache;
use sds_client::keystone::KeystoneClient;
use sds_core::AppError;
use serde::Serialize;

const PROJECT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// A project the user belongs to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_id: String,
}

#[async_trait]
pub trait ProjectService: Send + Sync {
    async fn get_user_projects(&self, user_id: &str) -> Result<Vec<Project>, AppError>;
}

/// One-hour TTL cache in front of any project service.
pub struct CachedProjectService {
    inner: Arc<dyn ProjectService>,
    cache: TtlCache<String, Vec<Project>>,
}

impl CachedProjectService {
    pub fn new(inner: Arc<dyn ProjectService>) -> Self {
        Self {
            inner,
            cache: TtlCache::new(PROJECT_CACHE_TTL),
        }
    }
}

#[async_trait]
impl ProjectService for CachedProjectService {
    async fn get_user_projects(&self, user_id: &str) -> Result<Vec<Project>, AppError> {
        let key = user_id.to_string();
        self.cache
            .get_or_load(key, || async {
                self.inner.get_user_projects(user_id).await
            })
            .await
    }
}

/// Keystone-backed membership.
pub struct KeystoneProjectService {
    keystone: Arc<KeystoneClient>,
}

impl KeystoneProjectService {
    pub fn new(keystone: Arc<KeystoneClient>) -> Self {
        Self { keystone }
    }
}

#[async_trait]
impl ProjectService for KeystoneProjectService {
    async fn get_user_projects(&self, user_id: &str) -> Result<Vec<Project>, AppError> {
        Ok(self
            .keystone
            .get_user_projects(user_id)
            .await?
            .into_iter()
            .map(|project_id| Project { project_id })
            .collect())
    }
}

/// Placeholder used when no membership backend is configured; every
/// membership check fails loudly instead of silently passing.
pub struct DisabledProjectService;

#[async_trait]
impl ProjectService for DisabledProjectService {
    async fn get_user_projects(&self, _user_id: &str) -> Result<Vec<Project>, AppError> {
        Err(AppError::Config("Project service is not configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    #[async_trait]
    impl ProjectService for Counting {
        async fn get_user_projects(&self, _user_id: &str) -> Result<Vec<Project>, AppError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Project {
                project_id: "p1".into(),
            }])
        }
    }

    #[tokio::test]
    async fn membership_lookups_are_cached_per_user() {
        let inner = Arc::new(Counting(AtomicUsize::new(0)));
        let cached = CachedProjectService::new(inner.clone());
        for _ in 0..3 {
            let projects = cached.get_user_projects("user-1").await.unwrap();
            assert_eq!(projects[0].project_id, "p1");
        }
        cached.get_user_projects("user-2").await.unwrap();
        assert_eq!(inner.0.load(Ordering::SeqCst), 2);
    }
}
