//! Pre-built reference data for the Metax mapping.
//!
//! The tables are generated offline (language codes against Lexvo, place
//! names against the YSO places vocabulary) and shipped as JSON resources;
//! refreshing them is an admin task, never done inside a request.

use std::collections::BTreeMap;

use sds_core::AppError;
use serde::Deserialize;

const LANGUAGES_JSON: &str = include_str!("resources/languages.json");
const GEO_LOCATIONS_JSON: &str = include_str!("resources/geo_locations.json");

#[derive(Debug, Clone, Deserialize)]
pub struct LanguageRef {
    pub label: String,
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeoLocationRef {
    pub pref_label: BTreeMap<String, String>,
    pub uri: String,
}

/// The loaded lookup tables, built once at startup.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    languages: BTreeMap<String, LanguageRef>,
    geo_locations: Vec<GeoLocationRef>,
}

impl ReferenceData {
    pub fn load() -> Result<Self, AppError> {
        let languages: BTreeMap<String, LanguageRef> = serde_json::from_str(LANGUAGES_JSON)
            .map_err(|e| AppError::Config(format!("Invalid languages resource: {e}")))?;
        let geo_locations: Vec<GeoLocationRef> = serde_json::from_str(GEO_LOCATIONS_JSON)
            .map_err(|e| AppError::Config(format!("Invalid geo locations resource: {e}")))?;
        Ok(Self {
            languages,
            geo_locations,
        })
    }

    /// Lexvo URI for an ISO language code, if the code is known.
    pub fn language_uri(&self, code: &str) -> Option<&str> {
        self.languages.get(code).map(|l| l.uri.as_str())
    }

    /// YSO place URI whose English label matches the geographic name.
    pub fn geo_location_uri(&self, name: &str) -> Option<&str> {
        self.geo_locations
            .iter()
            .find(|loc| loc.pref_label.get("en").is_some_and(|label| label == name))
            .map(|loc| loc.uri.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resources_parse_and_resolve() {
        let reference = ReferenceData::load().unwrap();
        assert_eq!(
            reference.language_uri("en"),
            Some("http://lexvo.org/id/iso639-3/eng")
        );
        assert_eq!(
            reference.language_uri("fin"),
            Some("http://lexvo.org/id/iso639-3/fin")
        );
        assert!(reference.language_uri("xx").is_none());

        assert!(reference.geo_location_uri("Helsinki").is_some());
        assert!(reference.geo_location_uri("Atlantis").is_none());
    }
}
