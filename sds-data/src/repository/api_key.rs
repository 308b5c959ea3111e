use sds_core::AppError;

use super::{db_error, is_unique_violation};
use crate::entity::ApiKeyEntity;
use crate::session::Session;

pub struct ApiKeyRepository;

impl ApiKeyRepository {
    /// Store a new hashed key. Reusing a user-chosen key id is a user error.
    pub async fn add(&self, session: &Session, entity: ApiKeyEntity) -> Result<(), AppError> {
        let mut guard = session.guard().await;
        sqlx::query(
            "INSERT INTO api_keys (key_id, user_id, user_key_id, api_key, salt, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entity.key_id)
        .bind(&entity.user_id)
        .bind(&entity.user_key_id)
        .bind(&entity.api_key)
        .bind(&entity.salt)
        .bind(entity.created_at)
        .execute(guard.conn()?)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::User("API key already exists with this key id.".into())
            } else {
                db_error(e)
            }
        })?;
        Ok(())
    }

    /// Look a key up by its generated (12-hex) id.
    pub async fn get(
        &self,
        session: &Session,
        key_id: &str,
    ) -> Result<Option<ApiKeyEntity>, AppError> {
        let mut guard = session.guard().await;
        sqlx::query_as::<_, ApiKeyEntity>("SELECT * FROM api_keys WHERE key_id = ?")
            .bind(key_id)
            .fetch_optional(guard.conn()?)
            .await
            .map_err(db_error)
    }

    /// Remove a key by its user-chosen id. Removing an unknown key is a
    /// no-op, matching the idempotent DELETE contract.
    pub async fn delete(
        &self,
        session: &Session,
        user_id: &str,
        user_key_id: &str,
    ) -> Result<(), AppError> {
        let mut guard = session.guard().await;
        sqlx::query("DELETE FROM api_keys WHERE user_id = ? AND user_key_id = ?")
            .bind(user_id)
            .bind(user_key_id)
            .execute(guard.conn()?)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    pub async fn list(
        &self,
        session: &Session,
        user_id: &str,
    ) -> Result<Vec<ApiKeyEntity>, AppError> {
        let mut guard = session.guard().await;
        sqlx::query_as::<_, ApiKeyEntity>(
            "SELECT * FROM api_keys WHERE user_id = ? ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(guard.conn()?)
        .await
        .map_err(db_error)
    }
}
