use sentinel_state::storage_traits::RelationalStore;
use sentinel_state::{
    ProceduralRecord, SqliteRelationalStore, StorageError, CREATE_KNOWN_EXPLOITS,
    INSERT_KNOWN_EXPLOIT, KNOWN_EXPLOITS_TABLE, SELECT_KNOWN_EXPLOIT, SELECT_KNOWN_EXPLOITS,
};
use serde_json::json;

async fn seeded(store: &SqliteRelationalStore, ids: &[&str]) {
    store.execute(CREATE_KNOWN_EXPLOITS, &[]).await.unwrap();
    for id in ids {
        let record = ProceduralRecord::new(id, &format!("pattern-{id}"));
        store
            .execute(INSERT_KNOWN_EXPLOIT, &record.to_params())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_sqlite_duplicate_id_is_constraint_violation() {
    let store = SqliteRelationalStore::open_in_memory().unwrap();
    seeded(&store, &["e1"]).await;

    let second = ProceduralRecord::new("e1", "flash-loan");
    match store.execute(INSERT_KNOWN_EXPLOIT, &second.to_params()).await {
        Err(StorageError::ConstraintViolation { table, id }) => {
            assert_eq!(table, KNOWN_EXPLOITS_TABLE);
            assert_eq!(id, "e1");
        }
        other => panic!("expected ConstraintViolation, got {other:?}"),
    }

    let rows = store.query(SELECT_KNOWN_EXPLOITS, &[]).await.unwrap();
    assert_eq!(rows.len(), 1);
    let stored = ProceduralRecord::from_row(&rows[0]).unwrap();
    assert_eq!(stored.pattern, "pattern-e1");
}

#[tokio::test]
async fn test_sqlite_rows_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("procedural").join("sentinel.sqlite");

    {
        let store = SqliteRelationalStore::open(&path).unwrap();
        seeded(&store, &["e1", "e2"]).await;
    }

    let reopened = SqliteRelationalStore::open(&path).unwrap();
    // Re-running the DDL is harmless.
    reopened.execute(CREATE_KNOWN_EXPLOITS, &[]).await.unwrap();
    let rows = reopened
        .query(SELECT_KNOWN_EXPLOIT, &[json!("e2")])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(ProceduralRecord::from_row(&rows[0]).unwrap().id, "e2");

    let dup = ProceduralRecord::new("e1", "again");
    assert!(matches!(
        reopened.execute(INSERT_KNOWN_EXPLOIT, &dup.to_params()).await,
        Err(StorageError::ConstraintViolation { .. })
    ));
}

#[tokio::test]
async fn test_sqlite_scan_is_insertion_ordered() {
    let store = SqliteRelationalStore::open_in_memory().unwrap();
    seeded(&store, &["z9", "a1", "m5"]).await;

    let ids: Vec<String> = store
        .query(SELECT_KNOWN_EXPLOITS, &[])
        .await
        .unwrap()
        .iter()
        .map(|row| ProceduralRecord::from_row(row).unwrap().id)
        .collect();
    assert_eq!(ids, vec!["z9", "a1", "m5"]);
}

#[tokio::test]
async fn test_sqlite_missing_table() {
    let store = SqliteRelationalStore::open_in_memory().unwrap();
    let record = ProceduralRecord::new("e1", "reentrancy");

    match store.execute(INSERT_KNOWN_EXPLOIT, &record.to_params()).await {
        Err(StorageError::UnknownTable { table }) => assert_eq!(table, KNOWN_EXPLOITS_TABLE),
        other => panic!("expected UnknownTable, got {other:?}"),
    }
    assert!(matches!(
        store.query(SELECT_KNOWN_EXPLOITS, &[]).await,
        Err(StorageError::UnknownTable { .. })
    ));
}

#[tokio::test]
async fn test_sqlite_execute_rejects_select() {
    let store = SqliteRelationalStore::open_in_memory().unwrap();
    seeded(&store, &["e1"]).await;
    assert!(matches!(
        store.execute(SELECT_KNOWN_EXPLOITS, &[]).await,
        Err(StorageError::InvalidStatement(_))
    ));
}
