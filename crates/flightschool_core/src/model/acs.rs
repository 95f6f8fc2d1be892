//! Stored ACS read models.
//!
//! # Invariants
//! - `RowId` values are assigned by the store and never reused.
//! - Element kinds are a closed set; the store encodes them as `K`, `R`, `S`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Store-internal surrogate identifier.
pub type RowId = i64;

/// Classification of a task element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Knowledge,
    RiskManagement,
    Skill,
}

impl ElementKind {
    pub const ALL: [ElementKind; 3] = [Self::Knowledge, Self::RiskManagement, Self::Skill];

    /// Single-letter code used in public ids and the `acs_elements.kind` column.
    pub fn code(self) -> char {
        match self {
            Self::Knowledge => 'K',
            Self::RiskManagement => 'R',
            Self::Skill => 'S',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'K' => Some(Self::Knowledge),
            'R' => Some(Self::RiskManagement),
            'S' => Some(Self::Skill),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::RiskManagement => "risk_management",
            Self::Skill => "skill",
        }
    }
}

/// Entity levels of the stored hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Standard,
    Area,
    Task,
    TaskReference,
    Element,
    SubElement,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "acs",
            Self::Area => "area",
            Self::Task => "task",
            Self::TaskReference => "task_reference",
            Self::Element => "element",
            Self::SubElement => "sub_element",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-assessed confidence against one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// Highest vote a single element can contribute.
    pub const MAX_VOTE: i64 = 3;

    pub fn vote(self) -> i64 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub fn from_vote(vote: i64) -> Option<Self> {
        match vote {
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parses `low|medium|high` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Aggregated confidence over a set of elements.
///
/// `possible` is the vote total if every element were rated `High`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Confidence {
    pub votes: i64,
    pub possible: i64,
}

impl Confidence {
    pub fn from_counts(votes: i64, element_count: i64) -> Self {
        Self {
            votes,
            possible: element_count * ConfidenceLevel::MAX_VOTE,
        }
    }
}

/// Area of operation read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AreaOfOperation {
    pub id: RowId,
    pub acs: String,
    pub public_id: String,
    pub name: String,
    pub sort_order: i64,
    pub task_count: i64,
    pub confidence: Confidence,
}

impl AreaOfOperation {
    pub fn full_public_id(&self) -> String {
        crate::model::address::area_address(&self.acs, &self.public_id)
    }
}

/// Task list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub id: RowId,
    pub area_id: RowId,
    pub public_id: String,
    pub name: String,
    pub objective: String,
    pub full_public_id: String,
    pub confidence: Confidence,
    pub knowledge_count: i64,
    pub risk_management_count: i64,
    pub skill_count: i64,
}

/// Full task with references, elements and sub-elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: RowId,
    pub public_id: String,
    pub name: String,
    pub objective: String,
    pub note: String,
    pub area: AreaOfOperation,
    pub confidence: Confidence,
    /// Citations in document order.
    pub references: Vec<String>,
    pub knowledge: Vec<TaskElement>,
    pub risk_management: Vec<TaskElement>,
    pub skills: Vec<TaskElement>,
}

impl Task {
    pub fn full_public_id(&self) -> String {
        crate::model::address::task_address(&self.area.acs, &self.area.public_id, &self.public_id)
    }

    pub fn elements(&self, kind: ElementKind) -> &[TaskElement] {
        match kind {
            ElementKind::Knowledge => &self.knowledge,
            ElementKind::RiskManagement => &self.risk_management,
            ElementKind::Skill => &self.skills,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskElement {
    pub id: RowId,
    pub task_id: RowId,
    pub kind: ElementKind,
    pub public_id: u32,
    pub content: String,
    pub full_public_id: String,
    pub confidence_level: Option<ConfidenceLevel>,
    pub sub_elements: Vec<SubElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubElement {
    pub id: RowId,
    pub element_id: RowId,
    pub sort_order: u32,
    pub content: String,
}

impl SubElement {
    /// Letter addressing this sub-element under its element (`a` for order 0).
    pub fn public_id(&self) -> Option<char> {
        crate::model::address::sub_element_letter(self.sort_order as usize)
    }
}
