use chrono::Utc;
use sds_core::AppError;
use tracing::debug;
use uuid::Uuid;

use super::db_error;
use crate::entity::ObjectEntity;
use crate::session::Session;

pub struct ObjectRepository;

impl ObjectRepository {
    pub async fn add(
        &self,
        session: &Session,
        submission_id: &str,
        object_type: &str,
        title: Option<String>,
        description: Option<String>,
        document: serde_json::Value,
    ) -> Result<ObjectEntity, AppError> {
        let now = Utc::now();
        let entity = ObjectEntity {
            object_id: Uuid::new_v4().simple().to_string(),
            submission_id: submission_id.to_string(),
            object_type: object_type.to_string(),
            title,
            description,
            document,
            created: now,
            modified: now,
        };

        let mut guard = session.guard().await;
        sqlx::query(
            "INSERT INTO objects \
             (object_id, submission_id, object_type, title, description, document, created, modified) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entity.object_id)
        .bind(&entity.submission_id)
        .bind(&entity.object_type)
        .bind(&entity.title)
        .bind(&entity.description)
        .bind(entity.document.to_string())
        .bind(entity.created)
        .bind(entity.modified)
        .execute(guard.conn()?)
        .await
        .map_err(db_error)?;

        debug!(object_id = %entity.object_id, object_type, "added metadata object");
        Ok(entity)
    }

    pub async fn get(
        &self,
        session: &Session,
        object_id: &str,
    ) -> Result<Option<ObjectEntity>, AppError> {
        let mut guard = session.guard().await;
        sqlx::query_as::<_, ObjectEntity>("SELECT * FROM objects WHERE object_id = ?")
            .bind(object_id)
            .fetch_optional(guard.conn()?)
            .await
            .map_err(db_error)
    }

    /// Objects of a submission, optionally restricted to one type, in
    /// insertion order.
    pub async fn list(
        &self,
        session: &Session,
        submission_id: &str,
        object_type: Option<&str>,
    ) -> Result<Vec<ObjectEntity>, AppError> {
        let mut guard = session.guard().await;
        match object_type {
            Some(object_type) => sqlx::query_as::<_, ObjectEntity>(
                "SELECT * FROM objects WHERE submission_id = ? AND object_type = ? ORDER BY created",
            )
            .bind(submission_id)
            .bind(object_type)
            .fetch_all(guard.conn()?)
            .await
            .map_err(db_error),
            None => sqlx::query_as::<_, ObjectEntity>(
                "SELECT * FROM objects WHERE submission_id = ? ORDER BY created",
            )
            .bind(submission_id)
            .fetch_all(guard.conn()?)
            .await
            .map_err(db_error),
        }
    }

    pub async fn update_document(
        &self,
        session: &Session,
        object_id: &str,
        document: serde_json::Value,
        title: Option<String>,
        description: Option<String>,
    ) -> Result<(), AppError> {
        let mut guard = session.guard().await;
        let result = sqlx::query(
            "UPDATE objects SET document = ?, title = COALESCE(?, title), \
             description = COALESCE(?, description), modified = ? WHERE object_id = ?",
        )
        .bind(document.to_string())
        .bind(title)
        .bind(description)
        .bind(Utc::now())
        .bind(object_id)
        .execute(guard.conn()?)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Metadata object '{object_id}' was not found"
            )));
        }
        Ok(())
    }

    pub async fn delete(&self, session: &Session, object_id: &str) -> Result<(), AppError> {
        let mut guard = session.guard().await;
        let conn = guard.conn()?;
        sqlx::query("UPDATE files SET object_id = NULL WHERE object_id = ?")
            .bind(object_id)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        let result = sqlx::query("DELETE FROM objects WHERE object_id = ?")
            .bind(object_id)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Metadata object '{object_id}' was not found"
            )));
        }
        Ok(())
    }
}
