//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - `acs_store`: write primitives used by reconciliation (natural-key upsert
//!   and orphan pruning per hierarchy level).
//! - `acs_repo`: read queries and confidence tracking over the same tables.
//!
//! # Invariants
//! - Repositories refuse connections that are not at the latest schema.
//! - SQL stays inside this module; services only see typed results.

pub mod acs_repo;
pub mod acs_store;
