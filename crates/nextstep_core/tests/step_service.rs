use nextstep_core::db::open_db_in_memory;
use nextstep_core::{
    ChainViolation, NewStep, OwnerId, RepoError, RepoResult, SqliteStepRepository, Step, StepId,
    StepRepository, StepService,
};
use std::cell::Cell;

/// Repository whose `create_step` loses the slot race a fixed number of times.
struct ContendedRepository {
    conflicts_left: Cell<usize>,
    create_calls: Cell<usize>,
}

impl ContendedRepository {
    fn new(conflicts: usize) -> Self {
        Self {
            conflicts_left: Cell::new(conflicts),
            create_calls: Cell::new(0),
        }
    }
}

impl StepRepository for &ContendedRepository {
    fn migrate(&self) -> RepoResult<()> {
        Ok(())
    }

    fn create_step(&self, step: &NewStep) -> RepoResult<Step> {
        self.create_calls.set(self.create_calls.get() + 1);
        if self.conflicts_left.get() > 0 {
            self.conflicts_left.set(self.conflicts_left.get() - 1);
            return Err(RepoError::Conflict("tail slot taken".to_string()));
        }
        Ok(Step {
            id: 1,
            name: step.name.clone(),
            description: step.description.clone(),
            left: step.left,
            right: step.right,
            owner: step.owner,
        })
    }

    fn get_step(&self, _id: StepId) -> RepoResult<Option<Step>> {
        Ok(None)
    }

    fn list_steps(&self) -> RepoResult<Vec<Step>> {
        Ok(Vec::new())
    }

    fn list_owner_steps(&self, _owner: OwnerId) -> RepoResult<Vec<Step>> {
        Ok(Vec::new())
    }

    fn update_step(&self, _step: &Step) -> RepoResult<()> {
        Ok(())
    }

    fn delete_step(&self, id: StepId) -> RepoResult<()> {
        Err(RepoError::NotFound(id))
    }
}

fn names(steps: &[nextstep_core::Step]) -> Vec<&str> {
    steps.iter().map(|step| step.name.as_str()).collect()
}

#[test]
fn append_builds_sequence_in_call_order() {
    let conn = open_db_in_memory().unwrap();
    let service = StepService::new(SqliteStepRepository::try_new(&conn).unwrap());

    let first = service.append_step(1, "wake up", "").unwrap();
    service.append_step(1, "stretch", "").unwrap();
    service.append_step(1, "coffee", "").unwrap();
    service.append_step(2, "other", "").unwrap();

    assert!(first.is_head());
    let sequence = service.sequence(1).unwrap();
    assert_eq!(names(&sequence), vec!["wake up", "stretch", "coffee"]);
    assert!(sequence.last().unwrap().is_tail());
    assert_eq!(names(&service.sequence(2).unwrap()), vec!["other"]);
}

#[test]
fn insert_after_splices_behind_anchor() {
    let conn = open_db_in_memory().unwrap();
    let service = StepService::new(SqliteStepRepository::try_new(&conn).unwrap());

    let a = service.append_step(1, "A", "").unwrap();
    service.append_step(1, "C", "").unwrap();
    let b = service.insert_after(a.id, "B", "").unwrap();

    assert_eq!(b.left, Some(a.id));
    assert_eq!(names(&service.sequence(1).unwrap()), vec!["A", "B", "C"]);

    let tail = service.sequence(1).unwrap().last().unwrap().id;
    service.insert_after(tail, "D", "").unwrap();
    assert_eq!(
        names(&service.sequence(1).unwrap()),
        vec!["A", "B", "C", "D"]
    );
}

#[test]
fn insert_after_missing_anchor_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = StepService::new(SqliteStepRepository::try_new(&conn).unwrap());

    let err = service.insert_after(5, "lost", "").unwrap_err();
    assert!(matches!(err, RepoError::NotFound(5)));
}

#[test]
fn sequence_of_unknown_owner_is_empty() {
    let conn = open_db_in_memory().unwrap();
    let service = StepService::new(SqliteStepRepository::try_new(&conn).unwrap());

    assert!(service.sequence(77).unwrap().is_empty());
}

#[test]
fn delete_through_service_keeps_sequence_connected() {
    let conn = open_db_in_memory().unwrap();
    let service = StepService::new(SqliteStepRepository::try_new(&conn).unwrap());

    service.append_step(1, "A", "").unwrap();
    let b = service.append_step(1, "B", "").unwrap();
    service.append_step(1, "C", "").unwrap();

    service.delete_step(b.id).unwrap();
    assert_eq!(names(&service.sequence(1).unwrap()), vec!["A", "C"]);
    assert!(service.get_step(b.id).unwrap().is_none());
}

#[test]
fn create_step_passes_explicit_neighbors_through() {
    let conn = open_db_in_memory().unwrap();
    let service = StepService::new(SqliteStepRepository::try_new(&conn).unwrap());

    let a = service.create_step(&NewStep::new(1, "A", "")).unwrap();
    let z = service
        .create_step(&NewStep::new(1, "Z", "").before(a.id))
        .unwrap();

    let mut renamed = z.clone();
    renamed.name = "Zero".to_string();
    service.update_step(&renamed).unwrap();
    assert_eq!(names(&service.sequence(1).unwrap()), vec!["Zero", "A"]);
    assert_eq!(service.list_steps().unwrap().len(), 2);
}

#[test]
fn broken_persisted_links_are_reported() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStepRepository::try_new(&conn).unwrap();
    let a = repo.create_step(&NewStep::new(1, "A", "")).unwrap();
    repo.create_step(&NewStep::new(1, "B", "").after(a.id))
        .unwrap();
    conn.execute("UPDATE steps SET \"right\" = NULL WHERE id = ?1;", [a.id])
        .unwrap();

    let service = StepService::new(repo);
    let err = service.sequence(1).unwrap_err();
    assert!(matches!(err, RepoError::BrokenChain(_)));

    let err = service.append_step(1, "C", "").unwrap_err();
    assert!(matches!(
        err,
        RepoError::BrokenChain(ChainViolation::MultipleTails { owner: 1, .. })
    ));
}

#[test]
fn append_retries_after_losing_the_tail_slot() {
    let repo = ContendedRepository::new(2);
    let service = StepService::new(&repo);

    let step = service.append_step(1, "retried", "").unwrap();

    assert_eq!(step.name, "retried");
    assert_eq!(repo.create_calls.get(), 3);
}

#[test]
fn append_gives_up_after_bounded_attempts() {
    let repo = ContendedRepository::new(3);
    let service = StepService::new(&repo);

    let err = service.append_step(1, "starved", "").unwrap_err();

    assert!(matches!(err, RepoError::Conflict(_)));
    assert_eq!(repo.create_calls.get(), 3);
}
