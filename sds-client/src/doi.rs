//! DOI registry seam shared by the DataCite client and the CSC PID proxy.
//!
//! The request body follows JSON:API: `{"data": {"type": "dois",
//! "attributes": {...}}}` with `"event": "publish"` included only when the
//! DOI should transition to findable.

use async_trait::async_trait;
use sds_core::AppError;
use tracing::info;

use crate::metax::MetaxClient;
use crate::models::datacite::{
    AlternateIdentifier, DataCiteMetadata, Description, Subject, Title,
};

pub const FIELD_OF_SCIENCE_SCHEME: &str =
    "Korkeakoulujen tutkimustiedonkeruussa käytettävä tieteenalaluokitus";
pub const FIELD_OF_SCIENCE_SCHEME_URI: &str =
    "http://www.yso.fi/onto/okm-tieteenala/conceptscheme";

/// Minting and publishing of persistent identifiers.
#[async_trait]
pub trait DoiRegistry: Send + Sync {
    fn name(&self) -> &str;

    /// Mint a draft DOI.
    async fn create_draft_doi(&self) -> Result<String, AppError>;

    /// Push the prepared JSON:API body for a DOI.
    async fn publish_doi(&self, doi: &str, body: &serde_json::Value) -> Result<(), AppError>;
}

/// The per-unit context of one DOI publication.
pub struct DoiPublication<'a> {
    pub doi: &'a str,
    pub submission_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub discovery_url: &'a str,
    /// Reject metadata without subjects and enrich them with a
    /// field-of-science classification.
    pub require_field_of_science: bool,
    /// Transition the DOI to findable; a draft stays a draft otherwise.
    pub publish: bool,
}

/// Record DataCite metadata for a DOI.
///
/// Injects the submission's accession number, title and description into the
/// metadata, optionally enriches the subjects through Metax, and hands the
/// assembled body to the registry. Returns the body that was sent.
pub async fn publish(
    registry: &dyn DoiRegistry,
    metax: Option<&MetaxClient>,
    mut datacite: DataCiteMetadata,
    publication: DoiPublication<'_>,
) -> Result<serde_json::Value, AppError> {
    datacite
        .alternateIdentifiers
        .get_or_insert_with(Vec::new)
        .push(AlternateIdentifier {
            alternateIdentifier: publication.submission_id.to_string(),
            alternateIdentifierType: "Local accession number".to_string(),
        });

    datacite.titles = Some(vec![Title {
        title: publication.title.to_string(),
        titleType: None,
    }]);
    datacite.descriptions = Some(vec![Description {
        description: publication.description.to_string(),
        descriptionType: None,
        lang: None,
    }]);

    if publication.require_field_of_science {
        match datacite.subjects.as_mut() {
            Some(subjects) if !subjects.is_empty() => {
                if let Some(metax) = metax {
                    map_field_of_science(metax, subjects).await?;
                }
            }
            _ => return Err(AppError::User("Missing DataCite subjects.".into())),
        }
    }

    let mut attributes = match serde_json::to_value(&datacite) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            return Err(AppError::System("Failed to serialize DataCite metadata".into()))
        }
    };
    attributes.insert("doi".into(), publication.doi.into());
    attributes.insert("url".into(), publication.discovery_url.into());
    if publication.publish {
        attributes.insert("event".into(), "publish".into());
    }

    let body = serde_json::json!({
        "data": {
            "type": "dois",
            "attributes": attributes,
        },
    });

    registry.publish_doi(publication.doi, &body).await?;
    info!(registry = registry.name(), doi = publication.doi, "recorded DOI metadata");
    Ok(body)
}

/// Attach the field-of-science classification to each resolvable subject.
///
/// A subject in the UI `"code - label"` format is looked up by its code;
/// anything else by the full text.
pub async fn map_field_of_science(
    metax: &MetaxClient,
    subjects: &mut [Subject],
) -> Result<(), AppError> {
    for subject in subjects {
        let text = crate::mapper::check_subject_format(&subject.subject)
            .unwrap_or(subject.subject.as_str());
        if let Some(field) = metax.get_field_of_science(text).await? {
            subject.subjectScheme = Some(FIELD_OF_SCIENCE_SCHEME.to_string());
            subject.schemeUri = Some(FIELD_OF_SCIENCE_SCHEME_URI.to_string());
            subject.valueUri = Some(field.url.clone());
            subject.classificationCode = Some(field.code.clone());
        }
    }
    Ok(())
}
