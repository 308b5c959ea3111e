use sds_core::AppError;
use tracing::info;

use super::db_error;
use crate::entity::RegistrationEntity;
use crate::session::Session;

/// A registration about to be persisted; identifiers are filled in by the
/// publication orchestrator as the external calls succeed.
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub submission_id: String,
    pub object_id: Option<String>,
    pub object_type: Option<String>,
    pub title: String,
    pub description: String,
    pub doi: String,
    pub metax_id: Option<String>,
    pub datacite_url: Option<String>,
    pub rems_url: Option<String>,
    pub rems_resource_id: Option<String>,
    pub rems_catalogue_id: Option<String>,
}

pub struct RegistrationRepository;

impl RegistrationRepository {
    pub async fn add(
        &self,
        session: &Session,
        new: NewRegistration,
    ) -> Result<RegistrationEntity, AppError> {
        let mut guard = session.guard().await;
        let result = sqlx::query(
            "INSERT INTO registrations \
             (submission_id, object_id, object_type, title, description, doi, metax_id, \
              datacite_url, rems_url, rems_resource_id, rems_catalogue_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.submission_id)
        .bind(&new.object_id)
        .bind(&new.object_type)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.doi)
        .bind(&new.metax_id)
        .bind(&new.datacite_url)
        .bind(&new.rems_url)
        .bind(&new.rems_resource_id)
        .bind(&new.rems_catalogue_id)
        .execute(guard.conn()?)
        .await
        .map_err(db_error)?;

        info!(submission_id = %new.submission_id, doi = %new.doi, "persisted registration");
        Ok(RegistrationEntity {
            registration_id: result.last_insert_rowid(),
            submission_id: new.submission_id,
            object_id: new.object_id,
            object_type: new.object_type,
            title: new.title,
            description: new.description,
            doi: new.doi,
            metax_id: new.metax_id,
            datacite_url: new.datacite_url,
            rems_url: new.rems_url,
            rems_resource_id: new.rems_resource_id,
            rems_catalogue_id: new.rems_catalogue_id,
        })
    }

    pub async fn list(
        &self,
        session: &Session,
        submission_id: &str,
    ) -> Result<Vec<RegistrationEntity>, AppError> {
        let mut guard = session.guard().await;
        sqlx::query_as::<_, RegistrationEntity>(
            "SELECT * FROM registrations WHERE submission_id = ? ORDER BY registration_id",
        )
        .bind(submission_id)
        .fetch_all(guard.conn()?)
        .await
        .map_err(db_error)
    }
}
