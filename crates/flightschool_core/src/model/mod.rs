//! Domain model for ACS documents and their stored projection.
//!
//! # Responsibility
//! - Define the external document shape consumed by reconciliation.
//! - Define read models returned by repository queries.
//! - Own public addressing (`PA.I.A.K1a`) of stored nodes.
//!
//! # Invariants
//! - Surrogate ids (`RowId`) never leave the store boundary as addresses;
//!   external references always use public ids.

pub mod acs;
pub mod address;
pub mod document;
