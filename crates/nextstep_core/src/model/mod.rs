//! Step domain model.
//!
//! # Responsibility
//! - Define the step node stored by the repository.
//! - Provide an arena view for walking and checking one owner's sequence.
//!
//! # Invariants
//! - Every step is identified by a store-assigned `StepId`.
//! - Ordering lives only in `left`/`right` neighbor references.
//!
//! # See also
//! - `db/migrations/0001_steps.sql`

pub mod chain;
pub mod step;
