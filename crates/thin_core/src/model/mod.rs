//! Domain model for form submissions.
//!
//! # Responsibility
//! - Describe persisted tables ([`table`]).
//! - Define the submission entity and its structured payload.
//!
//! # Invariants
//! - Table descriptors are immutable and process-wide.
//! - Derived payload data is always recomputed from the raw column.

pub mod payload;
pub mod submission;
pub mod table;
