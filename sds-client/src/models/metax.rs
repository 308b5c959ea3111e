//! Metax V3 dataset models.
//!
//! Metax V3 API: <https://metax.fairdata.fi/v3/swagger/>

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DATA_CATALOG: &str = "urn:nbn:fi:att:data-catalog-sd";
pub const ACCESS_TYPE_URL: &str =
    "http://uri.suomi.fi/codelist/fairdata/access_type/code/restricted";
pub const LICENSE_URL: &str = "http://uri.suomi.fi/codelist/fairdata/license/code/notspecified";
pub const RESTRICTION_GROUND_URL: &str =
    "http://uri.suomi.fi/codelist/fairdata/restriction_grounds/code/personal_data";

/// A localised string map, `language → text`.
pub type LangString = BTreeMap<String, String>;

/// Wrap a plain string as `{"en": ...}`.
pub fn lang_string(text: &str) -> LangString {
    BTreeMap::from([("en".to_string(), text.to_string())])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Url {
    pub url: String,
}

impl Url {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// At least one of `pref_label` / `external_identifier` must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pref_label: Option<LangString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_identifier: Option<String>,
}

impl Organization {
    pub fn named(name: &str, external_identifier: Option<String>) -> Self {
        Self {
            pref_label: Some(lang_string(name)),
            external_identifier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_identifier: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Creator,
    Publisher,
    Contributor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub organization: Organization,
    pub roles: Vec<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person: Option<Person>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRights {
    pub access_type: Url,
    pub license: Vec<Url>,
    pub restriction_grounds: Vec<Url>,
}

impl Default for AccessRights {
    fn default() -> Self {
        Self {
            access_type: Url::new(ACCESS_TYPE_URL),
            license: vec![Url::new(LICENSE_URL)],
            restriction_grounds: vec![Url::new(RESTRICTION_GROUND_URL)],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Funder {
    pub organization: Organization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Funding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funder: Option<Funder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_identifier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub participating_organizations: Vec<Organization>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub funding: Vec<Funding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spatial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geographic_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<Url>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub custom_wkt: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temporal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

/// Required fields for a Metax draft dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftMetax {
    pub data_catalog: String,
    pub title: LangString,
    pub description: LangString,
    pub persistent_identifier: String,
}

impl DraftMetax {
    pub fn new(doi: &str, title: &str, description: &str) -> Self {
        Self {
            data_catalog: DATA_CATALOG.into(),
            title: lang_string(title),
            description: lang_string(description),
            persistent_identifier: doi.to_string(),
        }
    }
}

/// The Metax fields this service writes. The Metax response carries more;
/// unknown fields are ignored on the way in and absent on the way out, so a
/// PATCH touches only what is listed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaxFields {
    #[serde(default)]
    pub data_catalog: Option<String>,
    #[serde(default)]
    pub title: Option<LangString>,
    #[serde(default)]
    pub description: Option<LangString>,
    #[serde(default)]
    pub persistent_identifier: Option<String>,
    #[serde(default)]
    pub access_rights: Option<AccessRights>,
    #[serde(default)]
    pub actors: Vec<Actor>,
    #[serde(default)]
    pub keyword: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_of_science: Vec<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub language: Vec<Url>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<Project>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spatial: Vec<Spatial>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub temporal: Vec<Temporal>,
}

impl MetaxFields {
    /// Parse the fields out of a Metax dataset response, dropping whatever
    /// this service does not manage.
    pub fn from_dataset(value: &serde_json::Value) -> Result<Self, sds_core::AppError> {
        serde_json::from_value(value.clone()).map_err(|e| {
            sds_core::AppError::UpstreamServer(format!("Invalid Metax dataset response: {e}"))
        })
    }
}

/// One entry of the Metax fields-of-science reference vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldOfScience {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub pref_label: LangString,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_uses_sd_catalog_and_keeps_the_doi() {
        let draft = DraftMetax::new("10.80869/sd-1", "T", "D");
        assert_eq!(draft.data_catalog, DATA_CATALOG);
        assert_eq!(draft.persistent_identifier, "10.80869/sd-1");
        assert_eq!(draft.title["en"], "T");
    }

    #[test]
    fn access_rights_default_is_restricted() {
        let rights = AccessRights::default();
        assert_eq!(rights.access_type.url, ACCESS_TYPE_URL);
        assert_eq!(rights.license[0].url, LICENSE_URL);
        assert_eq!(rights.restriction_grounds[0].url, RESTRICTION_GROUND_URL);
    }

    #[test]
    fn fields_parse_ignores_unmanaged_metax_fields() {
        let value = serde_json::json!({
            "id": "metax-id",
            "state": "draft",
            "title": {"en": "T"},
            "actors": [],
            "keyword": ["k"],
            "created": "2026-01-01",
        });
        let fields = MetaxFields::from_dataset(&value).unwrap();
        assert_eq!(fields.keyword, vec!["k"]);
        assert_eq!(fields.title.unwrap()["en"], "T");
    }

    #[test]
    fn role_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Publisher).unwrap(), "\"publisher\"");
    }
}
