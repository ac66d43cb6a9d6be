//! Step repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Own every read and write against the `steps` table.
//! - Keep per-owner sequences a single doubly-linked list across mutations.
//!
//! # Invariants
//! - Every mutation runs inside one `BEGIN IMMEDIATE` transaction, so
//!   competing writers are serialized and a failed step leaves no partial write.
//! - Neighbor columns are only written through `link`/`unlink`, which always
//!   update both rows of an edge.
//! - A create/move must target a gap that is an edge of the owner's current
//!   list; otherwise the caller's view is stale and `Conflict` is returned.
//!
//! # See also
//! - `crate::model::chain::verify_all` for the invariants checked in tests

use crate::db::migrations::{apply_migrations, latest_version};
use crate::db::DbError;
use crate::model::chain::ChainViolation;
use crate::model::step::{NewStep, OwnerId, Step, StepId, StepValidationError};
use log::{debug, info};
use rusqlite::{
    ffi, params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::error::Error;
use std::fmt::{Display, Formatter};

const STEP_SELECT_SQL: &str = "SELECT
    id,
    name,
    description,
    \"left\",
    \"right\",
    owner
FROM steps";

const STEP_COLUMNS: [&str; 6] = ["id", "name", "description", "left", "right", "owner"];

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from step repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// Malformed, missing or cross-owner neighbor reference.
    Validation(StepValidationError),
    /// Target step does not exist.
    NotFound(StepId),
    /// Requested position is no longer free, or the store is locked by
    /// another writer. Safe to retry after re-reading the sequence.
    Conflict(String),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Persisted row cannot be converted to a valid step.
    InvalidData(String),
    /// Persisted neighbor references violate list invariants.
    BrokenChain(ChainViolation),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl RepoError {
    /// Returns whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "step not found: {id}"),
            Self::Conflict(message) => write!(f, "step conflict: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted step data: {message}"),
            Self::BrokenChain(violation) => write!(f, "broken step sequence: {violation}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "step repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "step repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "step repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::BrokenChain(violation) => Some(violation),
            _ => None,
        }
    }
}

impl From<StepValidationError> for RepoError {
    fn from(value: StepValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ChainViolation> for RepoError {
    fn from(value: ChainViolation) -> Self {
        Self::BrokenChain(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, _) = &value {
            match failure.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    return Self::Conflict(format!("store is locked by another writer: {value}"));
                }
                // Two writers claiming the same neighbor trip the partial unique indexes.
                ErrorCode::ConstraintViolation
                    if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    return Self::Conflict(format!("neighbor already claimed: {value}"));
                }
                _ => {}
            }
        }
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for step sequence operations.
pub trait StepRepository {
    /// Ensures the `steps` schema exists. Idempotent.
    fn migrate(&self) -> RepoResult<()>;
    /// Inserts a step between its requested neighbors and returns it with
    /// its store-assigned id.
    fn create_step(&self, step: &NewStep) -> RepoResult<Step>;
    fn get_step(&self, id: StepId) -> RepoResult<Option<Step>>;
    /// Lists every step across all owners, ordered by id.
    fn list_steps(&self) -> RepoResult<Vec<Step>>;
    /// Lists one owner's steps, ordered by id (not sequence order).
    fn list_owner_steps(&self, owner: OwnerId) -> RepoResult<Vec<Step>>;
    /// Updates text fields and, when they changed, moves the step to the
    /// requested neighbors.
    fn update_step(&self, step: &Step) -> RepoResult<()>;
    /// Removes a step and joins its former neighbors.
    fn delete_step(&self, id: StepId) -> RepoResult<()>;
}

/// SQLite-backed step repository.
pub struct SqliteStepRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStepRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_step_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl StepRepository for SqliteStepRepository<'_> {
    fn migrate(&self) -> RepoResult<()> {
        apply_migrations(self.conn)?;
        Ok(())
    }

    fn create_step(&self, step: &NewStep) -> RepoResult<Step> {
        step.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_open_slot(&tx, step.owner, step.left, step.right, None)?;

        tx.execute(
            "INSERT INTO steps (name, description, \"left\", \"right\", owner)
             VALUES (?1, ?2, NULL, NULL, ?3);",
            params![step.name.as_str(), step.description.as_str(), step.owner],
        )?;
        let id = tx.last_insert_rowid();
        attach(&tx, id, step.left, step.right)?;

        let created = load_required_step(&tx, id)?;
        tx.commit()?;

        info!(
            "event=step_create module=repo status=ok step_id={} owner={}",
            id, step.owner
        );
        Ok(created)
    }

    fn get_step(&self, id: StepId) -> RepoResult<Option<Step>> {
        load_step(self.conn, id)
    }

    fn list_steps(&self) -> RepoResult<Vec<Step>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{STEP_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut steps = Vec::new();
        while let Some(row) = rows.next()? {
            steps.push(parse_step_row(row)?);
        }
        Ok(steps)
    }

    fn list_owner_steps(&self, owner: OwnerId) -> RepoResult<Vec<Step>> {
        let mut stmt = self.conn.prepare(&format!(
            "{STEP_SELECT_SQL}
             WHERE owner = ?1
             ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([owner])?;
        let mut steps = Vec::new();
        while let Some(row) = rows.next()? {
            steps.push(parse_step_row(row)?);
        }
        Ok(steps)
    }

    fn update_step(&self, step: &Step) -> RepoResult<()> {
        step.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let current = load_step(&tx, step.id)?.ok_or(RepoError::NotFound(step.id))?;
        let moved = current.left != step.left
            || current.right != step.right
            || current.owner != step.owner;

        if moved {
            detach(&tx, &current)?;
        }
        tx.execute(
            "UPDATE steps
             SET name = ?2,
                 description = ?3,
                 owner = ?4
             WHERE id = ?1;",
            params![
                step.id,
                step.name.as_str(),
                step.description.as_str(),
                step.owner
            ],
        )?;
        if moved {
            ensure_open_slot(&tx, step.owner, step.left, step.right, Some(step.id))?;
            attach(&tx, step.id, step.left, step.right)?;
        }
        tx.commit()?;

        info!(
            "event=step_update module=repo status=ok step_id={} owner={} moved={}",
            step.id, step.owner, moved
        );
        Ok(())
    }

    fn delete_step(&self, id: StepId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let current = load_step(&tx, id)?.ok_or(RepoError::NotFound(id))?;

        detach(&tx, &current)?;
        tx.execute("DELETE FROM steps WHERE id = ?1;", [id])?;
        tx.commit()?;

        info!(
            "event=step_delete module=repo status=ok step_id={} owner={}",
            id, current.owner
        );
        Ok(())
    }
}

/// Checks that `left`/`right` name an existing gap in `owner`'s sequence.
///
/// `moving` is the step being relinked by an update; it is detached already
/// and must not count as an existing member of the sequence.
fn ensure_open_slot(
    conn: &Connection,
    owner: OwnerId,
    left: Option<StepId>,
    right: Option<StepId>,
    moving: Option<StepId>,
) -> RepoResult<()> {
    let left_step = left
        .map(|id| load_neighbor(conn, id, owner))
        .transpose()?;
    let right_step = right
        .map(|id| load_neighbor(conn, id, owner))
        .transpose()?;

    if left_step.is_none() && right_step.is_none() {
        let others: i64 = conn.query_row(
            "SELECT COUNT(*)
             FROM steps
             WHERE owner = ?1
               AND id IS NOT ?2;",
            params![owner, moving],
            |row| row.get(0),
        )?;
        if others > 0 {
            debug!("event=step_slot module=repo status=conflict owner={owner} reason=not_empty");
            return Err(RepoError::Conflict(format!(
                "owner {owner} already has {others} step(s); a detached step needs a neighbor"
            )));
        }
    }

    if let Some(left_step) = &left_step {
        if left_step.right != right {
            debug!(
                "event=step_slot module=repo status=conflict owner={owner} neighbor={}",
                left_step.id
            );
            return Err(RepoError::Conflict(format!(
                "step {} is followed by {}, not {}",
                left_step.id,
                describe_neighbor(left_step.right),
                describe_neighbor(right)
            )));
        }
    }
    if let Some(right_step) = &right_step {
        if right_step.left != left {
            debug!(
                "event=step_slot module=repo status=conflict owner={owner} neighbor={}",
                right_step.id
            );
            return Err(RepoError::Conflict(format!(
                "step {} is preceded by {}, not {}",
                right_step.id,
                describe_neighbor(right_step.left),
                describe_neighbor(left)
            )));
        }
    }
    Ok(())
}

fn load_neighbor(conn: &Connection, id: StepId, owner: OwnerId) -> RepoResult<Step> {
    let neighbor = load_step(conn, id)?.ok_or(StepValidationError::NeighborNotFound(id))?;
    if neighbor.owner != owner {
        return Err(StepValidationError::CrossOwner {
            neighbor: id,
            expected: owner,
            actual: neighbor.owner,
        }
        .into());
    }
    Ok(neighbor)
}

/// Splices a detached step `id` between `left` and `right`.
fn attach(
    conn: &Connection,
    id: StepId,
    left: Option<StepId>,
    right: Option<StepId>,
) -> RepoResult<()> {
    if let (Some(left), Some(right)) = (left, right) {
        unlink(conn, left, right)?;
    }
    if let Some(left) = left {
        link(conn, left, id)?;
    }
    if let Some(right) = right {
        link(conn, id, right)?;
    }
    Ok(())
}

/// Removes `step` from its sequence and joins its former neighbors.
fn detach(conn: &Connection, step: &Step) -> RepoResult<()> {
    if let Some(left) = step.left {
        unlink(conn, left, step.id)?;
    }
    if let Some(right) = step.right {
        unlink(conn, step.id, right)?;
    }
    if let (Some(left), Some(right)) = (step.left, step.right) {
        link(conn, left, right)?;
    }
    Ok(())
}

/// Makes `right` follow `left`. Both endpoints must be unlinked on that side.
fn link(conn: &Connection, left: StepId, right: StepId) -> RepoResult<()> {
    let changed = conn.execute(
        "UPDATE steps SET \"right\" = ?2 WHERE id = ?1 AND \"right\" IS NULL;",
        [left, right],
    )?;
    if changed == 0 {
        return Err(ChainViolation::AsymmetricLink {
            step: left,
            neighbor: right,
        }
        .into());
    }
    let changed = conn.execute(
        "UPDATE steps SET \"left\" = ?1 WHERE id = ?2 AND \"left\" IS NULL;",
        [left, right],
    )?;
    if changed == 0 {
        return Err(ChainViolation::AsymmetricLink {
            step: right,
            neighbor: left,
        }
        .into());
    }
    Ok(())
}

/// Breaks the edge `left -> right`. The edge must be stored on both rows.
fn unlink(conn: &Connection, left: StepId, right: StepId) -> RepoResult<()> {
    let changed = conn.execute(
        "UPDATE steps SET \"right\" = NULL WHERE id = ?1 AND \"right\" = ?2;",
        [left, right],
    )?;
    if changed == 0 {
        return Err(ChainViolation::AsymmetricLink {
            step: right,
            neighbor: left,
        }
        .into());
    }
    let changed = conn.execute(
        "UPDATE steps SET \"left\" = NULL WHERE id = ?2 AND \"left\" = ?1;",
        [left, right],
    )?;
    if changed == 0 {
        return Err(ChainViolation::AsymmetricLink {
            step: left,
            neighbor: right,
        }
        .into());
    }
    Ok(())
}

fn describe_neighbor(value: Option<StepId>) -> String {
    value.map_or_else(|| "nothing".to_string(), |id| id.to_string())
}

fn load_step(conn: &Connection, id: StepId) -> RepoResult<Option<Step>> {
    conn.query_row(
        &format!("{STEP_SELECT_SQL} WHERE id = ?1;"),
        [id],
        |row| Ok(parse_step_row(row)),
    )
    .optional()?
    .transpose()
}

fn load_required_step(conn: &Connection, id: StepId) -> RepoResult<Step> {
    load_step(conn, id)?.ok_or(RepoError::NotFound(id))
}

fn parse_step_row(row: &Row<'_>) -> RepoResult<Step> {
    let id: StepId = row.get("id")?;
    let left = parse_neighbor(row.get("left")?, "steps.left")?;
    let right = parse_neighbor(row.get("right")?, "steps.right")?;

    let step = Step {
        id,
        name: row.get("name")?,
        description: row.get("description")?,
        left,
        right,
        owner: row.get("owner")?,
    };
    step.validate().map_err(|err| {
        RepoError::InvalidData(format!("step {id} has invalid neighbors: {err}"))
    })?;
    Ok(step)
}

fn parse_neighbor(value: Option<i64>, column: &'static str) -> RepoResult<Option<StepId>> {
    match value {
        Some(id) if id <= 0 => Err(RepoError::InvalidData(format!(
            "invalid neighbor id `{id}` in {column}"
        ))),
        other => Ok(other),
    }
}

fn ensure_step_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "steps")? {
        return Err(RepoError::MissingRequiredTable("steps"));
    }

    let columns = table_columns(conn, "steps")?;
    for column in STEP_COLUMNS {
        if !columns.iter().any(|current| current == column) {
            return Err(RepoError::MissingRequiredColumn {
                table: "steps",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}
