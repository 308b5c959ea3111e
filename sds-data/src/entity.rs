//! Database entities. JSON documents (DataCite metadata, object documents,
//! the REMS spec) are stored as serialized TEXT columns and surfaced as
//! `serde_json::Value`; the owning services parse them into their strict
//! models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// Publication workflow of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum Workflow {
    #[serde(rename = "SD")]
    #[sqlx(rename = "SD")]
    Sd,
    #[serde(rename = "FEGA")]
    #[sqlx(rename = "FEGA")]
    Fega,
    #[serde(rename = "BP")]
    #[sqlx(rename = "BP")]
    Bp,
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Workflow::Sd => write!(f, "SD"),
            Workflow::Fega => write!(f, "FEGA"),
            Workflow::Bp => write!(f, "BP"),
        }
    }
}

/// A user-owned aggregate of metadata and files awaiting publication.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionEntity {
    pub submission_id: String,
    pub project_id: String,
    pub name: String,
    pub title: String,
    pub description: String,
    pub workflow: Workflow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    pub published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rems: Option<serde_json::Value>,
    pub date_created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

fn json_column(row: &SqliteRow, index: &str) -> Result<Option<serde_json::Value>, sqlx::Error> {
    let raw: Option<String> = row.try_get(index)?;
    match raw {
        None => Ok(None),
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: index.into(),
                source: Box::new(e),
            }),
    }
}

impl FromRow<'_, SqliteRow> for SubmissionEntity {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            submission_id: row.try_get("submission_id")?,
            project_id: row.try_get("project_id")?,
            name: row.try_get("name")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            workflow: row.try_get("workflow")?,
            bucket: row.try_get("bucket")?,
            published: row.try_get("published")?,
            metadata: json_column(row, "metadata")?,
            rems: json_column(row, "rems")?,
            date_created: row.try_get("date_created")?,
            last_modified: row.try_get("last_modified")?,
        })
    }
}

/// A typed metadata document inside a submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntity {
    pub object_id: String,
    pub submission_id: String,
    pub object_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub document: serde_json::Value,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for ObjectEntity {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let document: String = row.try_get("document")?;
        Ok(Self {
            object_id: row.try_get("object_id")?,
            submission_id: row.try_get("submission_id")?,
            object_type: row.try_get("object_type")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            document: serde_json::from_str(&document).map_err(|e| sqlx::Error::ColumnDecode {
                index: "document".into(),
                source: Box::new(e),
            })?,
            created: row.try_get("created")?,
            modified: row.try_get("modified")?,
        })
    }
}

/// A file associated with a submission, optionally attached to one object.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FileEntity {
    pub file_id: String,
    pub submission_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    pub path: String,
    pub bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unencrypted_checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_checksum: Option<String>,
    pub status: String,
}

/// The persisted record of identifiers minted for a published unit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationEntity {
    #[serde(skip_serializing)]
    pub registration_id: i64,
    pub submission_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    pub title: String,
    pub description: String,
    pub doi: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metax_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datacite_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rems_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rems_resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rems_catalogue_id: Option<String>,
}

/// A stored API key. Only the salted hash of the secret is kept.
#[derive(Debug, Clone, FromRow)]
pub struct ApiKeyEntity {
    pub key_id: String,
    pub user_id: String,
    pub user_key_id: String,
    pub api_key: String,
    pub salt: String,
    pub created_at: DateTime<Utc>,
}
