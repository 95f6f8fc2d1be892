//! Core domain logic for the Flight School ACS store.
//! This crate owns the stored ACS hierarchy and its reconciliation rules.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::acs::{
    AreaOfOperation, Confidence, ConfidenceLevel, ElementKind, EntityKind, RowId, SubElement, Task,
    TaskElement, TaskSummary,
};
pub use model::address::{AddressError, ElementAddress, TaskAddress};
pub use model::document::{
    AcsDocument, AreaDocument, DocumentError, ElementDocument, SubElementDocument, TaskDocument,
};
pub use repo::acs_repo::{AcsRepository, SqliteAcsRepository};
pub use repo::acs_store::{AcsStore, RepoError, RepoResult, SqliteAcsStore};
pub use service::acs_service::{AcsService, AcsServiceError};
pub use service::sync_service::{
    populate_acs, populate_acs_from_json, LevelCounts, SyncError, SyncReport, SyncResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
