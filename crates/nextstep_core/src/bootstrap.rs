//! Startup sequence for the step store.
//!
//! # Responsibility
//! - Open the configured database and apply migrations before any
//!   repository call.
//! - Seed a minimal two-step sequence into a newly created store.
//!
//! # Invariants
//! - Seeding runs only when the database file did not exist before open.
//! - A store whose seeding failed is removed, so the next start seeds again.
//! - Seeded steps go through `StepRepository::create_step` like any caller.

use crate::config::CoreConfig;
use crate::db::{open_db, DbError};
use crate::model::step::{NewStep, OwnerId, Step};
use crate::repo::step_repo::{RepoError, RepoResult, SqliteStepRepository, StepRepository};
use log::{error, info};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub type BootstrapResult<T> = Result<T, BootstrapError>;

#[derive(Debug)]
pub enum BootstrapError {
    /// Opening or migrating the database failed. Fatal to startup.
    Db(DbError),
    /// Repository setup or seeding failed.
    Repo(RepoError),
}

impl Display for BootstrapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "store bootstrap failed: {err}"),
            Self::Repo(err) => write!(f, "store seeding failed: {err}"),
        }
    }
}

impl Error for BootstrapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<DbError> for BootstrapError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for BootstrapError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// The two steps written into a fresh store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededSteps {
    pub first: Step,
    pub second: Step,
}

/// Migrated store connection plus what startup did to it.
pub struct Store {
    pub conn: Connection,
    /// `Some` when this startup created and seeded the database.
    pub seeded: Option<SeededSteps>,
}

impl Store {
    /// Returns a repository bound to this store's connection.
    pub fn repository(&self) -> RepoResult<SqliteStepRepository<'_>> {
        SqliteStepRepository::try_new(&self.conn)
    }
}

/// Opens the configured store, migrating it and seeding it when new.
pub fn open_store(config: &CoreConfig) -> BootstrapResult<Store> {
    open_store_with(config, |repo, owner| seed_default_steps(repo, owner))
}

fn open_store_with<F>(config: &CoreConfig, seed: F) -> BootstrapResult<Store>
where
    F: FnOnce(&SqliteStepRepository<'_>, OwnerId) -> RepoResult<SeededSteps>,
{
    let existed = config.db_path.exists();
    let conn = open_db(&config.db_path)?;
    if existed {
        return Ok(Store { conn, seeded: None });
    }

    let seeded = SqliteStepRepository::try_new(&conn)
        .and_then(|repo| seed(&repo, config.default_owner));
    match seeded {
        Ok(seeded) => Ok(Store {
            conn,
            seeded: Some(seeded),
        }),
        Err(err) => {
            error!(
                "event=store_seed module=bootstrap status=error owner={} error={}",
                config.default_owner, err
            );
            drop(conn);
            discard_unseeded_store(&config.db_path);
            Err(err.into())
        }
    }
}

fn discard_unseeded_store(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => info!(
            "event=store_discard module=bootstrap status=ok path={}",
            path.display()
        ),
        Err(err) => error!(
            "event=store_discard module=bootstrap status=error path={} error={}",
            path.display(),
            err
        ),
    }
}

/// Creates "Step One" -> "Step Two" for `owner`.
///
/// The second create names the first as its left neighbor; the repository
/// relinks the first step's right side in the same transaction.
pub fn seed_default_steps<R>(repo: &R, owner: OwnerId) -> RepoResult<SeededSteps>
where
    R: StepRepository + ?Sized,
{
    let first = repo.create_step(&NewStep::new(owner, "Step One", "The first step."))?;
    let second =
        repo.create_step(&NewStep::new(owner, "Step Two", "The second step.").after(first.id))?;
    let first = repo
        .get_step(first.id)?
        .ok_or(RepoError::NotFound(first.id))?;

    info!(
        "event=store_seed module=bootstrap status=ok owner={} first={} second={}",
        owner, first.id, second.id
    );
    Ok(SeededSteps { first, second })
}
