//! REMS wire models and the organisation view served to the UI.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// Models used against the REMS API. REMS namespaces several keys with an
// `organization/` or `license/` prefix.
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemsLicenseLocalization {
    pub title: String,
    pub textcontent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemsCatalogueItemLocalization {
    pub title: String,
    #[serde(rename = "infourl")]
    pub discovery_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemsOrganization {
    #[serde(rename = "organization/id")]
    pub id: String,
    #[serde(rename = "organization/name", default)]
    pub name: BTreeMap<String, String>,
    #[serde(rename = "organization/short-name", default)]
    pub short_name: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemsLicense {
    #[serde(alias = "license/id")]
    pub id: i64,
    pub licensetype: String,
    pub localizations: BTreeMap<String, RemsLicenseLocalization>,
    pub organization: RemsOrganization,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemsWorkflowDetails {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub licenses: Vec<RemsLicense>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemsWorkflow {
    pub id: i64,
    pub title: String,
    pub organization: RemsOrganization,
    pub workflow: RemsWorkflowDetails,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemsResource {
    pub id: i64,
    pub resid: String,
    pub organization: RemsOrganization,
    #[serde(default)]
    pub licenses: Vec<RemsLicense>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemsCatalogueItem {
    pub id: i64,
    #[serde(rename = "resource-id")]
    pub resource_id: i64,
    pub resid: String,
    pub organization: RemsOrganization,
    pub localizations: BTreeMap<String, RemsCatalogueItemLocalization>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub expired: bool,
}

// Models served by this API.
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: i64,
    pub title: String,
    pub textcontent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: i64,
    pub title: String,
    pub licenses: Vec<License>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub workflows: Vec<Workflow>,
    pub licenses: Vec<License>,
}

/// The REMS spec attached to a submission; referenced objects must exist and
/// be enabled in REMS at publication time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemsSpec {
    #[serde(rename = "organizationId")]
    pub organization_id: String,
    #[serde(rename = "workflowId")]
    pub workflow_id: i64,
    #[serde(default)]
    pub licenses: Vec<i64>,
}

impl RemsSpec {
    pub fn parse(value: &serde_json::Value) -> Result<Self, sds_core::AppError> {
        serde_json::from_value(value.clone())
            .map_err(|e| sds_core::AppError::User(format!("Invalid REMS specification: {e}")))
    }
}

/// Group REMS workflows and licenses by organisation, localised to one
/// language with fallback to the first available localisation.
pub fn group_organisations(
    workflows: &[RemsWorkflow],
    licenses: &[RemsLicense],
    language: &str,
    filter_organisation_id: Option<&str>,
) -> Vec<Organization> {
    fn organisation_name(org: &RemsOrganization, language: &str) -> String {
        org.name
            .get(language)
            .or_else(|| org.name.values().next())
            .cloned()
            .unwrap_or_default()
    }

    fn localized(license: &RemsLicense, language: &str) -> License {
        let localization = license
            .localizations
            .get(language)
            .or_else(|| license.localizations.values().next());
        License {
            id: license.id,
            title: localization.map(|l| l.title.clone()).unwrap_or_default(),
            textcontent: localization
                .map(|l| l.textcontent.clone())
                .unwrap_or_default(),
        }
    }

    fn entry<'a>(
        organizations: &'a mut BTreeMap<String, Organization>,
        org: &RemsOrganization,
        language: &str,
        filter_organisation_id: Option<&str>,
    ) -> Option<&'a mut Organization> {
        if let Some(filter) = filter_organisation_id {
            if org.id != filter {
                return None;
            }
        }
        Some(
            organizations
                .entry(org.id.clone())
                .or_insert_with(|| Organization {
                    id: org.id.clone(),
                    name: organisation_name(org, language),
                    workflows: Vec::new(),
                    licenses: Vec::new(),
                }),
        )
    }

    let mut organizations: BTreeMap<String, Organization> = BTreeMap::new();

    for license in licenses {
        if let Some(org) = entry(
            &mut organizations,
            &license.organization,
            language,
            filter_organisation_id,
        ) {
            org.licenses.push(localized(license, language));
        }
    }

    for workflow in workflows {
        if let Some(org) = entry(
            &mut organizations,
            &workflow.organization,
            language,
            filter_organisation_id,
        ) {
            org.workflows.push(Workflow {
                id: workflow.id,
                title: workflow.title.clone(),
                licenses: workflow
                    .workflow
                    .licenses
                    .iter()
                    .map(|l| localized(l, language))
                    .collect(),
            });
        }
    }

    organizations.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn organisation(id: &str) -> RemsOrganization {
        RemsOrganization {
            id: id.into(),
            name: BTreeMap::from([
                ("en".into(), format!("{id} en")),
                ("fi".into(), format!("{id} fi")),
            ]),
            short_name: BTreeMap::new(),
        }
    }

    fn license(id: i64, org: &str) -> RemsLicense {
        RemsLicense {
            id,
            licensetype: "link".into(),
            localizations: BTreeMap::from([(
                "fi".into(),
                RemsLicenseLocalization {
                    title: format!("lisenssi {id}"),
                    textcontent: "teksti".into(),
                },
            )]),
            organization: organisation(org),
            archived: false,
            enabled: true,
        }
    }

    #[test]
    fn rems_wire_aliases_parse() {
        let value = json!({
            "license/id": 5,
            "licensetype": "link",
            "localizations": {"en": {"title": "L", "textcontent": "T"}},
            "organization": {
                "organization/id": "csc",
                "organization/name": {"en": "CSC"},
                "organization/short-name": {"en": "CSC"},
            },
            "archived": false,
            "enabled": true,
        });
        let license: RemsLicense = serde_json::from_value(value).unwrap();
        assert_eq!(license.id, 5);
        assert_eq!(license.organization.id, "csc");
    }

    #[test]
    fn grouping_localises_with_fallback() {
        let workflows = vec![RemsWorkflow {
            id: 1,
            title: "default workflow".into(),
            organization: organisation("csc"),
            workflow: RemsWorkflowDetails {
                type_: "workflow/default".into(),
                licenses: vec![license(2, "csc")],
            },
            archived: false,
            enabled: true,
        }];
        let licenses = vec![license(3, "csc"), license(4, "other")];

        let organisations = group_organisations(&workflows, &licenses, "en", None);
        assert_eq!(organisations.len(), 2);
        let csc = organisations.iter().find(|o| o.id == "csc").unwrap();
        assert_eq!(csc.name, "csc en");
        assert_eq!(csc.workflows.len(), 1);
        assert_eq!(csc.licenses.len(), 1);
        // No English localisation on the license; falls back to Finnish.
        assert_eq!(csc.licenses[0].title, "lisenssi 3");
    }

    #[test]
    fn grouping_filters_by_organisation() {
        let licenses = vec![license(3, "csc"), license(4, "other")];
        let organisations = group_organisations(&[], &licenses, "en", Some("other"));
        assert_eq!(organisations.len(), 1);
        assert_eq!(organisations[0].id, "other");
    }

    #[test]
    fn rems_spec_rejects_unknown_fields() {
        let err = RemsSpec::parse(&json!({"organizationId": "1", "workflowId": 1, "magic": true}))
            .unwrap_err();
        assert!(matches!(err, sds_core::AppError::User(_)));
        let spec =
            RemsSpec::parse(&json!({"organizationId": "1", "workflowId": 1, "licenses": [1]}))
                .unwrap();
        assert_eq!(spec.licenses, vec![1]);
    }
}
