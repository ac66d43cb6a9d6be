use nextstep_core::db::open_db_in_memory;
use nextstep_core::{
    open_store, seed_default_steps, verify_all, CoreConfig, SqliteStepRepository, StepRepository,
};

fn temp_config(dir: &tempfile::TempDir) -> CoreConfig {
    CoreConfig::with_base_dir(dir.path())
}

#[test]
fn new_store_is_seeded_with_linked_pair() {
    let dir = tempfile::tempdir().unwrap();
    let config = temp_config(&dir);

    let store = open_store(&config).unwrap();
    let seeded = store.seeded.clone().unwrap();
    let (a, b) = (seeded.first, seeded.second);

    assert_eq!(a.name, "Step One");
    assert_eq!(a.description, "The first step.");
    assert_eq!(a.left, None);
    assert_eq!(a.right, Some(b.id));
    assert_eq!(b.name, "Step Two");
    assert_eq!(b.left, Some(a.id));
    assert_eq!(b.right, None);
    assert_eq!(a.owner, 1);
    assert_eq!(b.owner, 1);

    let repo = store.repository().unwrap();
    let all = repo.list_steps().unwrap();
    assert_eq!(all, vec![a.clone(), b.clone()]);
    verify_all(&all).unwrap();

    let mut cursor = repo.get_step(a.id).unwrap();
    let mut visited = Vec::new();
    while let Some(step) = cursor {
        visited.push(step.id);
        cursor = match step.right {
            Some(next) => repo.get_step(next).unwrap(),
            None => None,
        };
    }
    assert_eq!(visited, vec![a.id, b.id]);
}

#[test]
fn existing_store_is_not_reseeded() {
    let dir = tempfile::tempdir().unwrap();
    let config = temp_config(&dir);

    let first_start = open_store(&config).unwrap();
    assert!(first_start.seeded.is_some());
    drop(first_start);

    let second_start = open_store(&config).unwrap();
    assert!(second_start.seeded.is_none());
    let repo = second_start.repository().unwrap();
    assert_eq!(repo.list_steps().unwrap().len(), 2);
}

#[test]
fn seed_uses_configured_owner() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = temp_config(&dir);
    config.default_owner = 9;

    let store = open_store(&config).unwrap();
    let seeded = store.seeded.unwrap();
    assert_eq!(seeded.first.owner, 9);
    assert_eq!(seeded.second.owner, 9);
}

#[test]
fn seeding_into_non_empty_owner_fails_instead_of_forking_list() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStepRepository::try_new(&conn).unwrap();

    seed_default_steps(&repo, 1).unwrap();
    let err = seed_default_steps(&repo, 1).unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(repo.list_steps().unwrap().len(), 2);
    verify_all(&repo.list_steps().unwrap()).unwrap();
}
