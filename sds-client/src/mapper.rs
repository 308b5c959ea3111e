//! DataCite → Metax field mapping.
//!
//! Translations are deterministic and total: invalid input is a user error,
//! never silently dropped. Organisation names pass through ROR validation;
//! subjects resolve against the cached Metax fields of science.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use sds_core::AppError;
use tracing::debug;

use crate::metax::MetaxClient;
use crate::models::datacite::{
    Affiliation, DataCiteMetadata, Date, DateType, FundingReference, GeoLocation, NameIdentifier,
    Publisher, Subject,
};
use crate::models::metax::{
    AccessRights, Actor, Funder, Funding, MetaxFields, Organization, Person, Project, Role,
    Spatial, Temporal, Url,
};
use crate::reference::ReferenceData;
use crate::ror::RorClient;

/// Detect the UI subject format `"code - label"`, e.g. `111 - Mathematics`.
/// Returns the code part.
pub fn check_subject_format(subject: &str) -> Option<&str> {
    let (code, label) = subject.split_once(" - ")?;
    if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) && !label.trim().is_empty() {
        Some(code)
    } else {
        None
    }
}

/// Normalise a DataCite date token to the `YYYY-MM-DD` Metax accepts.
///
/// `YYYY` becomes `YYYY-01-01`, `YYYY-MM` becomes `YYYY-MM-01`, a full date
/// is kept, and an ISO-8601 timestamp is reduced to its date component.
pub fn to_valid_date(date: &str) -> Result<String, AppError> {
    let value = date.trim();

    if value.len() == 4 && value.chars().all(|c| c.is_ascii_digit()) {
        return Ok(format!("{value}-01-01"));
    }
    if NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").is_ok() {
        return Ok(format!("{value}-01"));
    }
    if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() {
        return Ok(value.to_string());
    }

    let iso = value.replace('Z', "+00:00");
    if let Ok(datetime) = chrono::DateTime::parse_from_rfc3339(&iso) {
        return Ok(datetime.date_naive().to_string());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(datetime.date().to_string());
        }
    }

    Err(AppError::User(format!("Invalid date value: {value}")))
}

pub struct MetaxMapper {
    metax: Arc<MetaxClient>,
    ror: Arc<RorClient>,
    reference: Arc<ReferenceData>,
}

impl MetaxMapper {
    pub fn new(metax: Arc<MetaxClient>, ror: Arc<RorClient>, reference: Arc<ReferenceData>) -> Self {
        Self {
            metax,
            ror,
            reference,
        }
    }

    /// Map the submission's DataCite metadata onto the current Metax draft
    /// fields.
    pub async fn map(
        &self,
        metax_data: &serde_json::Value,
        metadata: &DataCiteMetadata,
    ) -> Result<MetaxFields, AppError> {
        debug!("mapping DataCite metadata to Metax fields");
        let mut fields = MetaxFields::from_dataset(metax_data)?;
        if fields.access_rights.is_none() {
            fields.access_rights = Some(AccessRights::default());
        }

        for creator in &metadata.creators {
            self.map_actor(
                &creator.name,
                creator.affiliation.as_deref(),
                creator.nameIdentifiers.as_deref(),
                Role::Creator,
                &mut fields,
            )
            .await?;
        }
        self.map_publisher(&metadata.publisher, &mut fields).await?;
        self.map_issued(&mut fields);
        self.map_projects(
            &metadata.publisher,
            metadata.fundingReferences.as_deref().unwrap_or_default(),
            &mut fields,
        )
        .await?;

        if let Some(contributors) = &metadata.contributors {
            for contributor in contributors {
                self.map_actor(
                    &contributor.name,
                    contributor.affiliation.as_deref(),
                    contributor.nameIdentifiers.as_deref(),
                    Role::Contributor,
                    &mut fields,
                )
                .await?;
            }
        }

        if let Some(dates) = &metadata.dates {
            map_temporal(dates, &mut fields)?;
        }
        if let Some(locations) = &metadata.geoLocations {
            self.map_spatial(locations, &mut fields)?;
        }
        if let Some(language) = &metadata.language {
            self.map_language(language, &mut fields)?;
        }
        if let Some(subjects) = &metadata.subjects {
            self.map_field_of_science_and_keyword(subjects, &mut fields)
                .await?;
        }

        Ok(fields)
    }

    /// One actor per creator/contributor: exactly one person whose
    /// organisation is the first affiliation, ROR-validated.
    async fn map_actor(
        &self,
        name: &str,
        affiliation: Option<&[Affiliation]>,
        name_identifiers: Option<&[NameIdentifier]>,
        role: Role,
        fields: &mut MetaxFields,
    ) -> Result<(), AppError> {
        let affiliation = affiliation
            .and_then(|a| a.first())
            .ok_or_else(|| AppError::User("Affiliation is required to map an actor.".into()))?;
        let preferred_name = self.validate_organization(&affiliation.name).await?;

        let organization =
            Organization::named(&preferred_name, affiliation.affiliationIdentifier.clone());
        let person = Person {
            name: name.to_string(),
            external_identifier: name_identifiers
                .and_then(|ids| ids.first())
                .map(|id| id.nameIdentifier.clone()),
        };
        fields.actors.push(Actor {
            organization,
            roles: vec![role],
            person: Some(person),
        });
        Ok(())
    }

    async fn map_publisher(
        &self,
        publisher: &Publisher,
        fields: &mut MetaxFields,
    ) -> Result<(), AppError> {
        let preferred_name = self.validate_organization(&publisher.name).await?;
        fields.actors.push(Actor {
            organization: Organization::named(&preferred_name, publisher.publisherIdentifier.clone()),
            roles: vec![Role::Publisher],
            person: None,
        });
        Ok(())
    }

    /// `issued` is the publication date.
    fn map_issued(&self, fields: &mut MetaxFields) {
        fields.issued = Some(Utc::now().format("%Y-%m-%d").to_string());
    }

    async fn map_projects(
        &self,
        publisher: &Publisher,
        funding_references: &[FundingReference],
        fields: &mut MetaxFields,
    ) -> Result<(), AppError> {
        // One participating organisation, as DataCite has one publisher.
        let publisher_name = self.validate_organization(&publisher.name).await?;
        let participating_organizations = vec![Organization::named(
            &publisher_name,
            publisher.publisherIdentifier.clone(),
        )];

        let mut funding = Vec::new();
        for reference in funding_references {
            let funder_name = self.validate_organization(&reference.funderName).await?;
            funding.push(Funding {
                funder: Some(Funder {
                    organization: Organization::named(
                        &funder_name,
                        reference.funderIdentifier.clone(),
                    ),
                }),
                funding_identifier: reference.awardNumber.clone(),
            });
        }

        fields.projects.push(Project {
            participating_organizations,
            funding,
        });
        Ok(())
    }

    async fn map_field_of_science_and_keyword(
        &self,
        subjects: &[Subject],
        fields: &mut MetaxFields,
    ) -> Result<(), AppError> {
        for subject in subjects {
            let mut field_of_science = None;

            // UI input carries the resolved URI in `valueUri`.
            if check_subject_format(&subject.subject).is_some() {
                if let Some(value_uri) = &subject.valueUri {
                    field_of_science = Some(Url::new(value_uri.clone()));
                }
            }
            // API input is a bare code or label.
            if let Some(field) = self.metax.get_field_of_science(&subject.subject).await? {
                field_of_science = Some(Url::new(field.url));
            }

            if let Some(field_of_science) = field_of_science {
                fields.field_of_science.push(field_of_science);
            }
            fields.keyword.push(subject.subject.clone());
        }
        Ok(())
    }

    fn map_language(&self, language: &str, fields: &mut MetaxFields) -> Result<(), AppError> {
        let uri = self
            .reference
            .language_uri(language)
            .ok_or_else(|| AppError::User(format!("Invalid language: {language}")))?;
        fields.language = vec![Url::new(uri)];
        Ok(())
    }

    fn map_spatial(
        &self,
        locations: &[GeoLocation],
        fields: &mut MetaxFields,
    ) -> Result<(), AppError> {
        for location in locations {
            let geographic_name = location.geoLocationPlace.clone();
            let reference = geographic_name
                .as_deref()
                .and_then(|name| self.reference.geo_location_uri(name))
                .map(Url::new);

            let mut custom_wkt = Vec::new();
            if let Some(point) = location.geoLocationPoint {
                custom_wkt.push(format!(
                    "POINT ({} {})",
                    point.pointLongitude, point.pointLatitude
                ));
            }
            if let Some(bounds) = location.geoLocationBox {
                let (west, east) = (bounds.westBoundLongitude, bounds.eastBoundLongitude);
                let (south, north) = (bounds.southBoundLatitude, bounds.northBoundLatitude);
                custom_wkt.push(format!(
                    "POLYGON(({west} {south}, {east} {south}, {east} {north}, \
                     {west} {north}, {west} {south}))"
                ));
            }
            if let Some(polygon) = &location.geoLocationPolygon {
                for point in polygon {
                    point.validate().map_err(AppError::User)?;
                }
                let mut outer: Vec<(f64, f64)> = polygon
                    .iter()
                    .filter_map(|p| p.polygonPoint)
                    .map(|p| (p.pointLongitude, p.pointLatitude))
                    .collect();
                let inner: Vec<(f64, f64)> = polygon
                    .iter()
                    .filter_map(|p| p.inPolygonPoint)
                    .map(|p| (p.pointLongitude, p.pointLatitude))
                    .collect();

                if !outer.is_empty() {
                    if outer.first() != outer.last() {
                        outer.push(outer[0]);
                    }
                    let ring = outer
                        .iter()
                        .map(|(lon, lat)| format!("{lon} {lat}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    custom_wkt.push(format!("POLYGON(({ring}))"));
                }
                if !inner.is_empty() {
                    let points = inner
                        .iter()
                        .map(|(lon, lat)| format!("{lon} {lat}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    custom_wkt.push(format!("POINT({points})"));
                }
            }

            fields.spatial.push(Spatial {
                geographic_name,
                reference,
                custom_wkt,
            });
        }
        Ok(())
    }

    /// ROR-validate an organisation name; the preferred name replaces the
    /// submitted one.
    async fn validate_organization(&self, name: &str) -> Result<String, AppError> {
        self.ror
            .is_ror_organisation(name.trim())
            .await?
            .ok_or_else(|| AppError::User(format!("Invalid organization name: {name}")))
    }
}

/// Each DataCite date of type `Other` contributes one temporal period.
fn map_temporal(dates: &[Date], fields: &mut MetaxFields) -> Result<(), AppError> {
    for date in dates {
        if date.dateType != DateType::Other {
            continue;
        }
        let tokens: Vec<&str> = date
            .date
            .split('/')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        match tokens.as_slice() {
            [start] => fields.temporal.push(Temporal {
                start_date: Some(to_valid_date(start)?),
                end_date: None,
            }),
            [start, end] => fields.temporal.push(Temporal {
                start_date: Some(to_valid_date(start)?),
                end_date: Some(to_valid_date(end)?),
            }),
            _ => {
                return Err(AppError::User(format!(
                    "Invalid date format for temporal: {}",
                    date.date
                )))
            }
        }
    }
    Ok(())
}
