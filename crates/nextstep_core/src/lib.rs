//! Core domain logic for NextStep.
//! This crate is the single source of truth for step sequence invariants.

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use bootstrap::{open_store, seed_default_steps, BootstrapError, SeededSteps, Store};
pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::chain::{verify_all, ChainViolation, StepChain};
pub use model::step::{NewStep, OwnerId, Step, StepId, StepValidationError, NO_NEIGHBOR};
pub use repo::step_repo::{RepoError, RepoResult, SqliteStepRepository, StepRepository};
pub use service::step_service::StepService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
