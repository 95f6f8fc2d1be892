//! Core use-case services.
//!
//! # Responsibility
//! - `sync_service`: reconcile an external ACS document into the store.
//! - `acs_service`: address-based reads and confidence tracking.
//! - Keep CLI callers decoupled from storage details.

pub mod acs_service;
mod reconcile;
pub mod sync_service;
