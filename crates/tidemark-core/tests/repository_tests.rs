//! Repository behavior against the unit of work and the store.

mod common;

use std::sync::Arc;

use uuid::Uuid;

use common::{BoardCreated, BoardState, board_id, create_board};
use tidemark_core::error::RepositoryError;
use tidemark_core::event::TypedEvent;
use tidemark_core::identifier::AggregateId;
use tidemark_core::repository::Repository;
use tidemark_core::store::{EventStore, RecordedEvent};
use tidemark_core::unit_of_work::UnitOfWork;
use tidemark_test_support::{CallLog, RecordingEventStore};

fn created_record(id: &AggregateId, name: &str) -> RecordedEvent {
    RecordedEvent {
        event_id: Uuid::new_v4(),
        aggregate_id: id.clone(),
        event_type: BoardCreated::EVENT_TYPE.to_owned(),
        payload: serde_json::json!({ "id": id.to_string(), "name": name }),
        sequence_number: 1,
        correlation_id: None,
        causation_id: None,
        recorded_at: chrono::Utc::now(),
    }
}

fn repository(store: &RecordingEventStore) -> (Repository<BoardState>, Arc<UnitOfWork>) {
    let unit_of_work = Arc::new(UnitOfWork::new());
    let store: Arc<dyn EventStore> = Arc::new(store.clone());
    (
        Repository::new(Arc::clone(&unit_of_work), store),
        unit_of_work,
    )
}

#[tokio::test]
async fn get_on_an_empty_stream_is_not_found() {
    let store = RecordingEventStore::new(CallLog::new());
    let (repository, _uow) = repository(&store);

    let err = repository.get(&board_id()).await.unwrap_err();
    assert!(matches!(err, RepositoryError::AggregateRootNotFound { .. }));
}

#[tokio::test]
async fn get_loads_initializes_and_attaches() {
    let store = RecordingEventStore::new(CallLog::new());
    let id = board_id();
    store.seed(&id, vec![created_record(&id, "Sprint")]);
    let (repository, uow) = repository(&store);

    let board = repository.get(&id).await.unwrap();
    {
        let board = board.lock().unwrap();
        assert_eq!(board.state().name, "Sprint");
        assert_eq!(board.expected_version(), 1);
        assert!(!board.has_changes());
    }
    assert!(uow.contains(&id));
}

#[tokio::test]
async fn cached_get_returns_the_same_instance_without_a_store_read() {
    let store = RecordingEventStore::new(CallLog::new());
    let id = board_id();
    store.seed(&id, vec![created_record(&id, "Sprint")]);
    let (repository, _uow) = repository(&store);

    let first = repository.get(&id).await.unwrap();
    let reads_after_first = store
        .log()
        .entries()
        .iter()
        .filter(|entry| entry.starts_with("events_since"))
        .count();

    let second = repository.get(&id).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let reads_after_second = store
        .log()
        .entries()
        .iter()
        .filter(|entry| entry.starts_with("events_since"))
        .count();
    assert_eq!(reads_after_first, 1);
    assert_eq!(reads_after_second, 1);
}

#[tokio::test]
async fn contains_checks_the_unit_of_work_before_the_store() {
    let store = RecordingEventStore::new(CallLog::new());
    let id = board_id();
    let (repository, _uow) = repository(&store);

    assert!(!repository.contains(&id).await.unwrap());

    repository
        .add(&id, create_board(id.clone(), "Sprint").unwrap())
        .await
        .unwrap();
    let store_checks = store
        .log()
        .entries()
        .iter()
        .filter(|entry| entry.starts_with("contains"))
        .count();

    assert!(repository.contains(&id).await.unwrap());
    // The cached hit performed no further store existence check.
    let store_checks_after = store
        .log()
        .entries()
        .iter()
        .filter(|entry| entry.starts_with("contains"))
        .count();
    assert_eq!(store_checks, store_checks_after);
}

#[tokio::test]
async fn add_on_a_stored_identifier_fails() {
    let store = RecordingEventStore::new(CallLog::new());
    let id = board_id();
    store.seed(&id, vec![created_record(&id, "Sprint")]);
    let (repository, _uow) = repository(&store);

    let err = repository
        .add(&id, create_board(id.clone(), "Sprint").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::AggregateRootAlreadyExists { .. }
    ));
}

#[tokio::test]
async fn add_on_a_cached_identifier_fails() {
    let store = RecordingEventStore::new(CallLog::new());
    let id = board_id();
    let (repository, _uow) = repository(&store);

    repository
        .add(&id, create_board(id.clone(), "Sprint").unwrap())
        .await
        .unwrap();
    let err = repository
        .add(&id, create_board(id.clone(), "Sprint").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::AggregateRootAlreadyExists { .. }
    ));
}

#[tokio::test]
async fn add_then_get_returns_the_added_instance() {
    let store = RecordingEventStore::new(CallLog::new());
    let id = board_id();
    let (repository, _uow) = repository(&store);

    let added = repository
        .add(&id, create_board(id.clone(), "Sprint").unwrap())
        .await
        .unwrap();
    let fetched = repository.get(&id).await.unwrap();
    assert!(Arc::ptr_eq(&added, &fetched));
}
