//! Public addressing of stored ACS nodes.
//!
//! Addresses are dot-separated public ids: `PA.I` (area), `PA.I.A` (task),
//! `PA.I.A.K1` (element), `PA.I.A.K1a` (sub-element). Sub-elements have no
//! stored public id; their letter is derived from document position.

use crate::model::acs::ElementKind;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

const SUB_ELEMENT_ALPHABET: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";

/// Number of sub-elements one element can address.
pub const MAX_SUB_ELEMENTS: usize = SUB_ELEMENT_ALPHABET.len();

static TASK_ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^.\s]+)\.([^.\s]+)\.([^.\s]+)$").expect("valid task address regex")
});
static ELEMENT_ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^.\s]+)\.([^.\s]+)\.([^.\s]+)\.([KRS])(\d+)([a-z])?$")
        .expect("valid element address regex")
});

/// Letter for the sub-element at `order`, or `None` past `z`.
pub fn sub_element_letter(order: usize) -> Option<char> {
    SUB_ELEMENT_ALPHABET.get(order).map(|byte| char::from(*byte))
}

/// Appends one dot-separated public id to a parent address.
pub fn join_address(parent: &str, child: &str) -> String {
    format!("{parent}.{child}")
}

pub fn area_address(acs: &str, area: &str) -> String {
    join_address(acs, area)
}

pub fn task_address(acs: &str, area: &str, task: &str) -> String {
    join_address(&area_address(acs, area), task)
}

pub fn element_address(task_address: &str, kind: ElementKind, public_id: u32) -> String {
    format!("{task_address}.{}{public_id}", kind.code())
}

pub fn sub_element_address(element_address: &str, order: usize) -> String {
    match sub_element_letter(order) {
        Some(letter) => format!("{element_address}{letter}"),
        None => format!("{element_address}[{order}]"),
    }
}

/// References have no public id; they are addressed by position.
pub fn reference_address(task_address: &str, order: usize) -> String {
    format!("{task_address}#{order}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    Malformed(String),
    PublicIdOutOfRange(String),
}

impl Display for AddressError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(value) => write!(f, "malformed ACS address `{value}`"),
            Self::PublicIdOutOfRange(value) => {
                write!(f, "element public id out of range in `{value}`")
            }
        }
    }
}

impl Error for AddressError {}

/// Parsed `ACS.AREA.TASK` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAddress {
    pub acs: String,
    pub area: String,
    pub task: String,
}

impl FromStr for TaskAddress {
    type Err = AddressError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let captures = TASK_ADDRESS_RE
            .captures(value.trim())
            .ok_or_else(|| AddressError::Malformed(value.to_string()))?;
        Ok(Self {
            acs: captures[1].to_string(),
            area: captures[2].to_string(),
            task: captures[3].to_string(),
        })
    }
}

impl Display for TaskAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&task_address(&self.acs, &self.area, &self.task))
    }
}

/// Parsed `ACS.AREA.TASK.<K|R|S><n>[letter]` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementAddress {
    pub task: TaskAddress,
    pub kind: ElementKind,
    pub public_id: u32,
    /// Zero-based sub-element position when the address names one.
    pub sub_element: Option<usize>,
}

impl FromStr for ElementAddress {
    type Err = AddressError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let captures = ELEMENT_ADDRESS_RE
            .captures(value.trim())
            .ok_or_else(|| AddressError::Malformed(value.to_string()))?;

        let kind = captures[4]
            .chars()
            .next()
            .and_then(ElementKind::from_code)
            .ok_or_else(|| AddressError::Malformed(value.to_string()))?;
        let public_id = captures[5]
            .parse::<u32>()
            .map_err(|_| AddressError::PublicIdOutOfRange(value.to_string()))?;
        let sub_element = captures.get(6).and_then(|letter| {
            let byte = letter.as_str().bytes().next()?;
            SUB_ELEMENT_ALPHABET.iter().position(|candidate| *candidate == byte)
        });

        Ok(Self {
            task: TaskAddress {
                acs: captures[1].to_string(),
                area: captures[2].to_string(),
                task: captures[3].to_string(),
            },
            kind,
            public_id,
            sub_element,
        })
    }
}

impl Display for ElementAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let element = element_address(&self.task.to_string(), self.kind, self.public_id);
        match self.sub_element {
            Some(order) => f.write_str(&sub_element_address(&element, order)),
            None => f.write_str(&element),
        }
    }
}
