//! ACS read and confidence use-case service.
//!
//! # Responsibility
//! - Resolve public addresses (`PA.I.A`, `PA.I.A.K1`) into stored rows.
//! - Record confidence changes through the repository and log them.
//!
//! # Invariants
//! - Service layer remains storage-agnostic.
//! - Confidence is only ever attached to an existing element.

use crate::model::acs::{
    AreaOfOperation, Confidence, ConfidenceLevel, RowId, Task, TaskElement, TaskSummary,
};
use crate::model::address::{AddressError, ElementAddress, TaskAddress};
use crate::repo::acs_store::{RepoError, RepoResult};
use crate::repo::acs_repo::AcsRepository;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from address-based lookups.
#[derive(Debug)]
pub enum AcsServiceError {
    InvalidAddress(AddressError),
    Repo(RepoError),
}

impl Display for AcsServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AcsServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidAddress(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<AddressError> for AcsServiceError {
    fn from(value: AddressError) -> Self {
        Self::InvalidAddress(value)
    }
}

impl From<RepoError> for AcsServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Use-case service wrapper for ACS reads and confidence tracking.
pub struct AcsService<R: AcsRepository> {
    repo: R,
}

impl<R: AcsRepository> AcsService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn list_areas(&self, acs_id: &str) -> RepoResult<Vec<AreaOfOperation>> {
        self.repo.list_areas(acs_id)
    }

    pub fn get_area(&self, acs_id: &str, area_public_id: &str) -> RepoResult<Option<AreaOfOperation>> {
        self.repo.get_area(acs_id, area_public_id)
    }

    pub fn list_tasks(&self, area_id: RowId) -> RepoResult<Vec<TaskSummary>> {
        self.repo.list_tasks(area_id)
    }

    pub fn get_task(
        &self,
        acs_id: &str,
        area_public_id: &str,
        task_public_id: &str,
    ) -> RepoResult<Option<Task>> {
        self.repo.get_task(acs_id, area_public_id, task_public_id)
    }

    /// Loads a task from its `ACS.AREA.TASK` address.
    pub fn get_task_by_address(&self, address: &str) -> Result<Option<Task>, AcsServiceError> {
        let address: TaskAddress = address.parse()?;
        Ok(self
            .repo
            .get_task(&address.acs, &address.area, &address.task)?)
    }

    pub fn get_task_by_element(&self, element_id: RowId) -> RepoResult<Option<Task>> {
        self.repo.get_task_by_element(element_id)
    }

    /// Loads one element from its `ACS.AREA.TASK.<K|R|S><n>` address.
    ///
    /// A trailing sub-element letter resolves to the owning element, but only
    /// when the element has a sub-element at that letter.
    pub fn find_element(&self, address: &str) -> Result<Option<TaskElement>, AcsServiceError> {
        let address: ElementAddress = address.parse()?;
        let task = self
            .repo
            .get_task(&address.task.acs, &address.task.area, &address.task.task)?;
        Ok(task.and_then(|task| {
            task.elements(address.kind)
                .iter()
                .find(|element| element.public_id == address.public_id)
                .filter(|element| {
                    address
                        .sub_element
                        .map_or(true, |order| order < element.sub_elements.len())
                })
                .cloned()
        }))
    }

    pub fn element_public_id(&self, element_id: RowId) -> RepoResult<Option<String>> {
        self.repo.element_public_id(element_id)
    }

    /// Sets (`Some`) or clears (`None`) the confidence vote of one element.
    pub fn set_element_confidence(
        &self,
        element_id: RowId,
        level: Option<ConfidenceLevel>,
    ) -> RepoResult<()> {
        match level {
            Some(level) => {
                self.repo.set_element_confidence(element_id, level)?;
                info!(
                    "event=element_confidence module=service status=ok action=set element_id={} vote={}",
                    element_id,
                    level.vote()
                );
            }
            None => {
                let cleared = self.repo.clear_element_confidence(element_id)?;
                info!(
                    "event=element_confidence module=service status=ok action=clear element_id={} cleared={}",
                    element_id, cleared
                );
            }
        }
        Ok(())
    }

    pub fn task_confidence(&self, task_id: RowId) -> RepoResult<Confidence> {
        self.repo.task_confidence(task_id)
    }
}
