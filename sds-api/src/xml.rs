//! XML processor port.
//!
//! Schema-aware validation is an external collaborator; the core consumes
//! two operations: parse-and-validate into a metadata object document, and
//! reference extraction for the FEGA action ordering. The built-in
//! implementation checks well-formedness and lifts the common envelope
//! fields; XSD semantics stay outside.

use serde::Serialize;

/// One validation failure, positioned for the client.
#[derive(Debug, Clone, Serialize)]
pub struct XmlError {
    pub reason: String,
    pub position: String,
    pub pointer: String,
}

/// A parsed metadata object document.
#[derive(Debug, Clone)]
pub struct ObjectDoc {
    pub object_type: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub document: serde_json::Value,
}

/// A reference from one object to another, e.g. a run's `STUDY_REF`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectRef {
    pub object_type: String,
    pub accession: Option<String>,
}

pub trait XmlProcessor: Send + Sync {
    /// Parse and validate a document of the given schema type.
    fn parse_and_validate(&self, schema_type: &str, xml: &str) -> Result<ObjectDoc, Vec<XmlError>>;

    /// References this document makes to other objects.
    fn extract_references(&self, doc: &ObjectDoc) -> Vec<ObjectRef>;
}

/// Well-formedness processor over roxmltree.
pub struct WellFormedXmlProcessor;

fn first_text(node: roxmltree::Node<'_, '_>, tag: &str) -> Option<String> {
    node.descendants()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

impl XmlProcessor for WellFormedXmlProcessor {
    fn parse_and_validate(&self, schema_type: &str, xml: &str) -> Result<ObjectDoc, Vec<XmlError>> {
        let doc = roxmltree::Document::parse(xml).map_err(|e| {
            let pos = e.pos();
            vec![XmlError {
                reason: e.to_string(),
                position: format!("{}:{}", pos.row, pos.col),
                pointer: format!("/{schema_type}"),
            }]
        })?;

        let root = doc.root_element();
        let root_tag = root.tag_name().name().to_lowercase();
        // The root element is expected to name the schema, possibly as a
        // SET wrapper (e.g. STUDY_SET for study).
        let expected = schema_type.to_lowercase();
        if root_tag != expected && root_tag != format!("{expected}_set") {
            return Err(vec![XmlError {
                reason: format!(
                    "Unexpected root element '{}' for schema '{schema_type}'",
                    root.tag_name().name()
                ),
                position: "1:1".into(),
                pointer: format!("/{schema_type}"),
            }]);
        }

        let alias = root
            .descendants()
            .find_map(|n| n.attribute("alias"))
            .map(str::to_string);
        let mut document = serde_json::Map::new();
        document.insert("schema".into(), expected.clone().into());
        if let Some(alias) = &alias {
            document.insert("alias".into(), alias.clone().into());
        }
        document.insert("xml".into(), xml.into());

        Ok(ObjectDoc {
            object_type: expected,
            title: first_text(root, "TITLE"),
            description: first_text(root, "DESCRIPTION").or_else(|| first_text(root, "ABSTRACT")),
            document: serde_json::Value::Object(document),
        })
    }

    fn extract_references(&self, doc: &ObjectDoc) -> Vec<ObjectRef> {
        let Some(xml) = doc.document.get("xml").and_then(|v| v.as_str()) else {
            return Vec::new();
        };
        let Ok(parsed) = roxmltree::Document::parse(xml) else {
            return Vec::new();
        };
        parsed
            .descendants()
            .filter(|node| node.tag_name().name().ends_with("_REF"))
            .map(|node| ObjectRef {
                object_type: node
                    .tag_name()
                    .name()
                    .trim_end_matches("_REF")
                    .to_lowercase(),
                accession: node
                    .attribute("accession")
                    .or_else(|| node.attribute("refname"))
                    .map(str::to_string),
            })
            .collect()
    }
}
