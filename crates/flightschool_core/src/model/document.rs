//! External ACS document shape.
//!
//! # Responsibility
//! - Decode the nested JSON document that describes one full standard.
//! - Reject structurally unusable input before any store access.
//!
//! # Invariants
//! - Order of every list is significant: it becomes the stored `sort_order`
//!   for areas, references and sub-elements.
//! - An element carries at most `MAX_SUB_ELEMENTS` sub-elements so each one
//!   keeps a letter address.

use crate::model::acs::ElementKind;
use crate::model::address::{element_address, task_address, MAX_SUB_ELEMENTS};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Read;

pub type DocumentResult<T> = Result<T, DocumentError>;

/// Decode failures for external ACS documents.
#[derive(Debug)]
pub enum DocumentError {
    /// Input is not valid JSON or does not match the document shape.
    Json(serde_json::Error),
    /// One element lists more sub-elements than there are letters.
    TooManySubElements { element: String, count: usize },
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "failed to decode ACS document: {err}"),
            Self::TooManySubElements { element, count } => write!(
                f,
                "element {element} has {count} sub-elements; at most {MAX_SUB_ELEMENTS} are addressable"
            ),
        }
    }
}

impl Error for DocumentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::TooManySubElements { .. } => None,
        }
    }
}

impl From<serde_json::Error> for DocumentError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Root of one standard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcsDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub areas: Vec<AreaDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<TaskDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub knowledge: Vec<ElementDocument>,
    #[serde(default)]
    pub risk_management: Vec<ElementDocument>,
    #[serde(default)]
    pub skills: Vec<ElementDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDocument {
    pub id: u32,
    pub content: String,
    #[serde(default)]
    pub sub_elements: Vec<SubElementDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubElementDocument {
    pub content: String,
}

impl AcsDocument {
    /// Decodes and checks a document from a JSON string.
    pub fn from_json_str(input: &str) -> DocumentResult<Self> {
        let document: Self = serde_json::from_str(input)?;
        document.check_structure()?;
        Ok(document)
    }

    /// Decodes and checks a document from a JSON reader.
    pub fn from_reader(reader: impl Read) -> DocumentResult<Self> {
        let document: Self = serde_json::from_reader(reader)?;
        document.check_structure()?;
        Ok(document)
    }

    fn check_structure(&self) -> DocumentResult<()> {
        for area in &self.areas {
            for task in &area.tasks {
                for (kind, element) in task.elements() {
                    if element.sub_elements.len() > MAX_SUB_ELEMENTS {
                        let task = task_address(&self.id, &area.id, &task.id);
                        return Err(DocumentError::TooManySubElements {
                            element: element_address(&task, kind, element.id),
                            count: element.sub_elements.len(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl TaskDocument {
    /// All elements of the task tagged with their kind, knowledge first.
    pub fn elements(&self) -> impl Iterator<Item = (ElementKind, &ElementDocument)> + '_ {
        ElementKind::ALL
            .into_iter()
            .flat_map(move |kind| self.elements_of(kind).iter().map(move |e| (kind, e)))
    }

    pub fn elements_of(&self, kind: ElementKind) -> &[ElementDocument] {
        match kind {
            ElementKind::Knowledge => &self.knowledge,
            ElementKind::RiskManagement => &self.risk_management,
            ElementKind::Skill => &self.skills,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AcsDocument, DocumentError};
    use crate::model::acs::ElementKind;

    #[test]
    fn decodes_nested_document_with_defaults() {
        let document = AcsDocument::from_json_str(
            r#"{
                "id": "PA",
                "name": "Private Pilot",
                "areas": [{
                    "id": "I",
                    "name": "Preflight Preparation",
                    "tasks": [{
                        "id": "A",
                        "name": "Pilot Qualifications",
                        "objective": "Know the rules.",
                        "references": ["14 CFR part 61", "AC 68-1"],
                        "knowledge": [{"id": 1, "content": "Certification", "subElements": [{"content": "one"}]}],
                        "riskManagement": [{"id": 1, "content": "Proficiency"}],
                        "skills": []
                    }]
                }]
            }"#,
        )
        .unwrap();

        let task = &document.areas[0].tasks[0];
        assert_eq!(task.note, "");
        assert_eq!(task.references.len(), 2);
        assert_eq!(task.knowledge[0].sub_elements[0].content, "one");
        assert!(task.risk_management[0].sub_elements.is_empty());

        let kinds: Vec<_> = task.elements().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, vec![ElementKind::Knowledge, ElementKind::RiskManagement]);
    }

    #[test]
    fn missing_areas_decode_as_empty() {
        let document = AcsDocument::from_json_str(r#"{"id": "PA", "name": "Private"}"#).unwrap();
        assert!(document.areas.is_empty());
    }

    #[test]
    fn malformed_structure_is_a_json_error() {
        let err = AcsDocument::from_json_str(r#"{"id": "PA", "areas": "nope"}"#).unwrap_err();
        assert!(matches!(err, DocumentError::Json(_)));
    }

    #[test]
    fn rejects_sub_elements_past_the_alphabet() {
        let sub_elements = vec![r#"{"content": "x"}"#; 27].join(",");
        let input = format!(
            r#"{{"id": "PA", "name": "P", "areas": [{{"id": "I", "name": "A", "tasks": [{{
                "id": "A", "name": "T", "skills": [{{"id": 4, "content": "c", "subElements": [{sub_elements}]}}]
            }}]}}]}}"#
        );

        let err = AcsDocument::from_json_str(&input).unwrap_err();
        match err {
            DocumentError::TooManySubElements { element, count } => {
                assert_eq!(element, "PA.I.A.S4");
                assert_eq!(count, 27);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
