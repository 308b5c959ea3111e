//! DataCite 4.5 metadata model.
//!
//! The model is strict: unknown fields are rejected at deserialisation so a
//! submission cannot smuggle properties the registry would ignore.
//! <https://datacite-metadata-schema.readthedocs.io/en/4.5/properties/>

// Field names mirror the DataCite JSON properties.
#![allow(non_snake_case)]

use serde::{Deserialize, Serialize};

// Controlled vocabularies
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationType {
    IsCitedBy,
    Cites,
    IsSupplementTo,
    IsSupplementedBy,
    IsContinuedBy,
    Continues,
    IsNewVersionOf,
    IsPreviousVersionOf,
    IsPartOf,
    HasPart,
    IsPublishedIn,
    HasPublication,
    IsReferencedBy,
    References,
    IsDocumentedBy,
    Documents,
    IsCompiledBy,
    Compiles,
    IsVariantFormOf,
    IsOriginalFormOf,
    IsIdenticalTo,
    IsReviewedBy,
    Reviews,
    IsDerivedFrom,
    IsSourceOf,
    IsRequiredBy,
    Requires,
    IsObsoletedBy,
    Obsoletes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContributorType {
    ContactPerson,
    DataCollector,
    DataCurator,
    DataManager,
    Distributor,
    Editor,
    HostingInstitution,
    Other,
    Producer,
    ProjectLeader,
    ProjectManager,
    ProjectMember,
    RegistrationAgency,
    RegistrationAuthority,
    RelatedPerson,
    Researcher,
    ResearchGroup,
    RightsHolder,
    Supervisor,
    Sponsor,
    WorkPackageLeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameType {
    Personal,
    Organizational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentifierType {
    #[serde(rename = "DOI")]
    Doi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelatedIdentifierType {
    #[serde(rename = "ARK")]
    Ark,
    #[serde(rename = "arXiv")]
    Arxiv,
    #[serde(rename = "bibcode")]
    Bibcode,
    #[serde(rename = "DOI")]
    Doi,
    #[serde(rename = "EAN13")]
    Ean13,
    #[serde(rename = "EISSN")]
    Eissn,
    Handle,
    #[serde(rename = "IGSN")]
    Igsn,
    #[serde(rename = "ISBN")]
    Isbn,
    #[serde(rename = "ISSN")]
    Issn,
    #[serde(rename = "ISTC")]
    Istc,
    #[serde(rename = "LISSN")]
    Lissn,
    #[serde(rename = "LSID")]
    Lsid,
    #[serde(rename = "PMID")]
    Pmid,
    #[serde(rename = "PURL")]
    Purl,
    #[serde(rename = "UPC")]
    Upc,
    #[serde(rename = "URL")]
    Url,
    #[serde(rename = "URN")]
    Urn,
    #[serde(rename = "w3id")]
    W3id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DescriptionType {
    Abstract,
    Methods,
    SeriesInformation,
    TableOfContents,
    TechnicalInfo,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceTypeGeneral {
    Audiovisual,
    Book,
    BookChapter,
    Collection,
    ComputationalNotebook,
    ConferencePaper,
    ConferenceProceeding,
    DataPaper,
    Dataset,
    Dissertation,
    Event,
    Image,
    InteractiveResource,
    Instrument,
    Journal,
    JournalArticle,
    Model,
    OutputManagementPlan,
    PeerReview,
    PhysicalObject,
    Preprint,
    Report,
    Service,
    Software,
    Sound,
    Standard,
    StudyRegistration,
    Text,
    Workflow,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunderIdentifierType {
    #[serde(rename = "Crossref Funder ID")]
    CrossrefFunderId,
    #[serde(rename = "GRID")]
    Grid,
    #[serde(rename = "ISNI")]
    Isni,
    #[serde(rename = "ROR")]
    Ror,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateType {
    Accepted,
    Available,
    Copyrighted,
    Collected,
    Created,
    Issued,
    Submitted,
    Updated,
    Valid,
    Withdrawn,
    Other,
}

// Models
//

/// Unique identifier for a creator or contributor in a standard scheme,
/// e.g. `https://orcid.org/0000-0002-1825-0097`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NameIdentifier {
    pub nameIdentifier: String,
    pub nameIdentifierScheme: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemeUri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Affiliation {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliationIdentifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliationIdentifierScheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemeUri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Creator {
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nameType: Option<NameType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub givenName: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub familyName: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nameIdentifiers: Option<Vec<NameIdentifier>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<Vec<Affiliation>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Publisher {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisherIdentifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisherIdentifierScheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemeUri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contributor {
    #[serde(default)]
    pub name: String,
    pub contributorType: ContributorType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nameType: Option<NameType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub givenName: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub familyName: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nameIdentifiers: Option<Vec<NameIdentifier>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<Vec<Affiliation>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Title {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub titleType: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Subject {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjectScheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemeUri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valueUri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classificationCode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Date {
    pub date: String,
    pub dateType: DateType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dateInformation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Identifier {
    pub identifier: String,
    pub identifierType: IdentifierType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelatedIdentifier {
    pub relatedIdentifier: String,
    pub relatedIdentifierType: RelatedIdentifierType,
    pub relationType: RelationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relatedMetadataScheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemeUri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemeType: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resourceTypeGeneral: Option<ResourceTypeGeneral>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlternateIdentifier {
    pub alternateIdentifier: String,
    pub alternateIdentifierType: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rights {
    pub rights: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rightsUri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rightsIdentifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rightsIdentifierScheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemeUri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Description {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptionType: Option<DescriptionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoLocationPoint {
    pub pointLatitude: f64,
    pub pointLongitude: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoLocationBox {
    pub westBoundLongitude: f64,
    pub eastBoundLongitude: f64,
    pub southBoundLatitude: f64,
    pub northBoundLatitude: f64,
}

/// Exactly one of `polygonPoint` / `inPolygonPoint` per entry; checked by
/// [`validate`](Self::validate) since serde cannot express the exclusivity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoLocationPolygonPoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polygonPoint: Option<GeoLocationPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inPolygonPoint: Option<GeoLocationPoint>,
}

impl GeoLocationPolygonPoint {
    pub fn validate(&self) -> Result<(), String> {
        match (self.polygonPoint, self.inPolygonPoint) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err("Exactly one of 'polygonPoint' or 'inPolygonPoint' must be provided".into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geoLocationPlace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geoLocationPoint: Option<GeoLocationPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geoLocationBox: Option<GeoLocationBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geoLocationPolygon: Option<Vec<GeoLocationPolygonPoint>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FundingReference {
    pub funderName: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funderIdentifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funderIdentifierType: Option<FunderIdentifierType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemeUri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awardNumber: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awardUri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awardTitle: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceType {
    #[serde(default = "default_resource_type_general")]
    pub resourceTypeGeneral: ResourceTypeGeneral,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resourceType: Option<String>,
}

fn default_resource_type_general() -> ResourceTypeGeneral {
    ResourceTypeGeneral::Dataset
}

impl Default for ResourceType {
    fn default() -> Self {
        Self {
            resourceTypeGeneral: ResourceTypeGeneral::Dataset,
            resourceType: None,
        }
    }
}

/// The DataCite metadata of one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataCiteMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifiers: Option<Vec<Identifier>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub titles: Option<Vec<Title>>,
    pub creators: Vec<Creator>,
    pub publisher: Publisher,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publicationYear: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rightsList: Option<Vec<Rights>>,
    #[serde(default)]
    pub types: ResourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributors: Option<Vec<Contributor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjects: Option<Vec<Subject>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dates: Option<Vec<Date>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relatedIdentifiers: Option<Vec<RelatedIdentifier>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternateIdentifiers: Option<Vec<AlternateIdentifier>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptions: Option<Vec<Description>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geoLocations: Option<Vec<GeoLocation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fundingReferences: Option<Vec<FundingReference>>,
}

impl DataCiteMetadata {
    /// Parse and normalise a stored metadata document.
    pub fn parse(value: &serde_json::Value) -> Result<Self, sds_core::AppError> {
        let metadata: DataCiteMetadata = serde_json::from_value(value.clone())
            .map_err(|e| sds_core::AppError::User(format!("Invalid DataCite metadata: {e}")))?;
        Ok(metadata.normalized())
    }

    /// Derive `name` ("family, given") and `nameType` for people whose given
    /// and family names are provided, and default empty resource types.
    pub fn normalized(mut self) -> Self {
        for creator in &mut self.creators {
            if let (Some(given), Some(family)) = (&creator.givenName, &creator.familyName) {
                if !given.is_empty() && !family.is_empty() {
                    creator.name = format!("{family}, {given}");
                    creator.nameType = Some(NameType::Personal);
                }
            }
        }
        if let Some(contributors) = &mut self.contributors {
            for contributor in contributors {
                if let (Some(given), Some(family)) =
                    (&contributor.givenName, &contributor.familyName)
                {
                    if !given.is_empty() && !family.is_empty() {
                        contributor.name = format!("{family}, {given}");
                        contributor.nameType = Some(NameType::Personal);
                    }
                }
            }
        }
        if self.types.resourceType.is_none() {
            self.types.resourceType = Some(format!("{:?}", self.types.resourceTypeGeneral));
        }
        self
    }
}
