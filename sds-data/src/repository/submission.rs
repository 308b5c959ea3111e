use chrono::{DateTime, Utc};
use sds_core::AppError;
use sqlx::QueryBuilder;
use tracing::debug;
use uuid::Uuid;

use super::{db_error, is_unique_violation};
use crate::entity::{SubmissionEntity, Workflow};
use crate::page::Pageable;
use crate::session::Session;

/// Fields required to create a submission.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub project_id: String,
    pub name: String,
    pub title: String,
    pub description: String,
    pub workflow: Workflow,
    pub bucket: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub rems: Option<serde_json::Value>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct SubmissionPatch {
    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub bucket: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub rems: Option<serde_json::Value>,
}

/// List filters; `project_id` is always required.
#[derive(Debug, Clone)]
pub struct SubmissionFilter {
    pub project_id: String,
    pub name: Option<String>,
    pub published: Option<bool>,
    pub date_created_start: Option<DateTime<Utc>>,
    pub date_created_end: Option<DateTime<Utc>>,
    pub date_modified_start: Option<DateTime<Utc>>,
    pub date_modified_end: Option<DateTime<Utc>>,
}

pub struct SubmissionRepository;

impl SubmissionRepository {
    /// Insert a new submission. A duplicate name within the project is a
    /// user error.
    pub async fn create(
        &self,
        session: &Session,
        new: NewSubmission,
    ) -> Result<SubmissionEntity, AppError> {
        let now = Utc::now();
        let entity = SubmissionEntity {
            submission_id: Uuid::new_v4().simple().to_string(),
            project_id: new.project_id,
            name: new.name,
            title: new.title,
            description: new.description,
            workflow: new.workflow,
            bucket: new.bucket,
            published: false,
            metadata: new.metadata,
            rems: new.rems,
            date_created: now,
            last_modified: now,
        };

        let mut guard = session.guard().await;
        sqlx::query(
            "INSERT INTO submissions \
             (submission_id, project_id, name, title, description, workflow, bucket, published, \
              metadata, rems, date_created, last_modified) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)",
        )
        .bind(&entity.submission_id)
        .bind(&entity.project_id)
        .bind(&entity.name)
        .bind(&entity.title)
        .bind(&entity.description)
        .bind(entity.workflow)
        .bind(&entity.bucket)
        .bind(entity.metadata.as_ref().map(|v| v.to_string()))
        .bind(entity.rems.as_ref().map(|v| v.to_string()))
        .bind(entity.date_created)
        .bind(entity.last_modified)
        .execute(guard.conn()?)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::User(format!(
                    "Submission with name '{}' already exists in project {}",
                    entity.name, entity.project_id
                ))
            } else {
                db_error(e)
            }
        })?;

        debug!(submission_id = %entity.submission_id, "created submission");
        Ok(entity)
    }

    pub async fn get(
        &self,
        session: &Session,
        submission_id: &str,
    ) -> Result<Option<SubmissionEntity>, AppError> {
        let mut guard = session.guard().await;
        sqlx::query_as::<_, SubmissionEntity>(
            "SELECT * FROM submissions WHERE submission_id = ?",
        )
        .bind(submission_id)
        .fetch_optional(guard.conn()?)
        .await
        .map_err(db_error)
    }

    /// Fetch a submission, converting absence to NotFound.
    pub async fn get_required(
        &self,
        session: &Session,
        submission_id: &str,
    ) -> Result<SubmissionEntity, AppError> {
        self.get(session, submission_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Submission '{submission_id}' was not found"))
        })
    }

    fn push_filters(builder: &mut QueryBuilder<'_, sqlx::Sqlite>, filter: &SubmissionFilter) {
        builder.push(" WHERE project_id = ").push_bind(filter.project_id.clone());
        if let Some(name) = &filter.name {
            builder
                .push(" AND name LIKE ")
                .push_bind(format!("%{name}%"));
        }
        if let Some(published) = filter.published {
            builder.push(" AND published = ").push_bind(published);
        }
        if let Some(start) = filter.date_created_start {
            builder.push(" AND date_created >= ").push_bind(start);
        }
        if let Some(end) = filter.date_created_end {
            builder.push(" AND date_created <= ").push_bind(end);
        }
        if let Some(start) = filter.date_modified_start {
            builder.push(" AND last_modified >= ").push_bind(start);
        }
        if let Some(end) = filter.date_modified_end {
            builder.push(" AND last_modified <= ").push_bind(end);
        }
    }

    /// List submissions matching the filter, newest first, one page at a
    /// time. Returns the page rows and the total match count.
    pub async fn list(
        &self,
        session: &Session,
        filter: &SubmissionFilter,
        pageable: &Pageable,
    ) -> Result<(Vec<SubmissionEntity>, u64), AppError> {
        let mut guard = session.guard().await;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM submissions");
        Self::push_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(guard.conn()?)
            .await
            .map_err(db_error)?;

        let mut query = QueryBuilder::new("SELECT * FROM submissions");
        Self::push_filters(&mut query, filter);
        query
            .push(" ORDER BY date_created DESC LIMIT ")
            .push_bind(pageable.per_page as i64)
            .push(" OFFSET ")
            .push_bind(pageable.offset() as i64);
        let rows = query
            .build_query_as::<SubmissionEntity>()
            .fetch_all(guard.conn()?)
            .await
            .map_err(db_error)?;

        Ok((rows, total as u64))
    }

    /// Apply a partial update and bump `last_modified`.
    pub async fn update(
        &self,
        session: &Session,
        submission_id: &str,
        patch: SubmissionPatch,
    ) -> Result<SubmissionEntity, AppError> {
        {
            let mut guard = session.guard().await;
            let mut builder = QueryBuilder::new("UPDATE submissions SET last_modified = ");
            builder.push_bind(Utc::now());
            if let Some(name) = patch.name {
                builder.push(", name = ").push_bind(name);
            }
            if let Some(title) = patch.title {
                builder.push(", title = ").push_bind(title);
            }
            if let Some(description) = patch.description {
                builder.push(", description = ").push_bind(description);
            }
            if let Some(bucket) = patch.bucket {
                builder.push(", bucket = ").push_bind(bucket);
            }
            if let Some(metadata) = patch.metadata {
                builder.push(", metadata = ").push_bind(metadata.to_string());
            }
            if let Some(rems) = patch.rems {
                builder.push(", rems = ").push_bind(rems.to_string());
            }
            builder.push(" WHERE submission_id = ").push_bind(submission_id);

            let result = builder
                .build()
                .execute(guard.conn()?)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        AppError::User("Submission name is already in use".into())
                    } else {
                        db_error(e)
                    }
                })?;
            if result.rows_affected() == 0 {
                return Err(AppError::NotFound(format!(
                    "Submission '{submission_id}' was not found"
                )));
            }
        }
        self.get_required(session, submission_id).await
    }

    /// Flip the submission to published iff it is still a draft.
    ///
    /// Returns `false` when another request already published it; the
    /// conditional update is the guard against concurrent publication.
    pub async fn set_published(
        &self,
        session: &Session,
        submission_id: &str,
    ) -> Result<bool, AppError> {
        let mut guard = session.guard().await;
        let result = sqlx::query(
            "UPDATE submissions SET published = 1, last_modified = ? \
             WHERE submission_id = ? AND published = 0",
        )
        .bind(Utc::now())
        .bind(submission_id)
        .execute(guard.conn()?)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() == 1)
    }

    /// Delete the submission and everything it owns.
    pub async fn delete(&self, session: &Session, submission_id: &str) -> Result<(), AppError> {
        let mut guard = session.guard().await;
        let conn = guard.conn()?;
        sqlx::query("DELETE FROM registrations WHERE submission_id = ?")
            .bind(submission_id)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        sqlx::query("DELETE FROM files WHERE submission_id = ?")
            .bind(submission_id)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        sqlx::query("DELETE FROM objects WHERE submission_id = ?")
            .bind(submission_id)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        let result = sqlx::query("DELETE FROM submissions WHERE submission_id = ?")
            .bind(submission_id)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Submission '{submission_id}' was not found"
            )));
        }
        debug!(%submission_id, "deleted submission cascade");
        Ok(())
    }
}
