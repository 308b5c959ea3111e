use sds_core::AppError;
use uuid::Uuid;

use super::{db_error, is_unique_violation};
use crate::entity::FileEntity;
use crate::session::Session;

pub struct FileRepository;

impl FileRepository {
    pub async fn add(
        &self,
        session: &Session,
        submission_id: &str,
        object_id: Option<String>,
        path: &str,
        bytes: i64,
    ) -> Result<FileEntity, AppError> {
        let entity = FileEntity {
            file_id: Uuid::new_v4().simple().to_string(),
            submission_id: submission_id.to_string(),
            object_id,
            path: path.to_string(),
            bytes,
            checksum_method: None,
            unencrypted_checksum: None,
            encrypted_checksum: None,
            status: "added".into(),
        };

        let mut guard = session.guard().await;
        sqlx::query(
            "INSERT INTO files (file_id, submission_id, object_id, path, bytes, status) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entity.file_id)
        .bind(&entity.submission_id)
        .bind(&entity.object_id)
        .bind(&entity.path)
        .bind(entity.bytes)
        .bind(&entity.status)
        .execute(guard.conn()?)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::User(format!(
                    "File '{}' is already part of the submission",
                    entity.path
                ))
            } else {
                db_error(e)
            }
        })?;
        Ok(entity)
    }

    pub async fn get(
        &self,
        session: &Session,
        file_id: &str,
    ) -> Result<Option<FileEntity>, AppError> {
        let mut guard = session.guard().await;
        sqlx::query_as::<_, FileEntity>("SELECT * FROM files WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(guard.conn()?)
            .await
            .map_err(db_error)
    }

    pub async fn list(
        &self,
        session: &Session,
        submission_id: &str,
    ) -> Result<Vec<FileEntity>, AppError> {
        let mut guard = session.guard().await;
        sqlx::query_as::<_, FileEntity>(
            "SELECT * FROM files WHERE submission_id = ? ORDER BY path",
        )
        .bind(submission_id)
        .fetch_all(guard.conn()?)
        .await
        .map_err(db_error)
    }

    pub async fn list_by_object(
        &self,
        session: &Session,
        object_id: &str,
    ) -> Result<Vec<FileEntity>, AppError> {
        let mut guard = session.guard().await;
        sqlx::query_as::<_, FileEntity>("SELECT * FROM files WHERE object_id = ? ORDER BY path")
            .bind(object_id)
            .fetch_all(guard.conn()?)
            .await
            .map_err(db_error)
    }

    pub async fn delete(&self, session: &Session, file_id: &str) -> Result<(), AppError> {
        let mut guard = session.guard().await;
        let result = sqlx::query("DELETE FROM files WHERE file_id = ?")
            .bind(file_id)
            .execute(guard.conn()?)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("File '{file_id}' was not found")));
        }
        Ok(())
    }
}
