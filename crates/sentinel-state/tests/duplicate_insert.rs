use sentinel_state::fakes::MemoryRelationalStore;
use sentinel_state::storage_traits::RelationalStore;
use sentinel_state::{
    ProceduralRecord, StorageError, CREATE_KNOWN_EXPLOITS, INSERT_KNOWN_EXPLOIT,
    KNOWN_EXPLOITS_TABLE, SELECT_KNOWN_EXPLOIT,
};

#[tokio::test]
async fn test_duplicate_procedural_id_fails() {
    let store = MemoryRelationalStore::new();
    store.execute(CREATE_KNOWN_EXPLOITS, &[]).await.unwrap();

    let first = ProceduralRecord::new("e1", "reentrancy");
    store
        .execute(INSERT_KNOWN_EXPLOIT, &first.to_params())
        .await
        .unwrap();

    // Same id, different pattern
    let second = ProceduralRecord::new("e1", "flash-loan");
    let result = store
        .execute(INSERT_KNOWN_EXPLOIT, &second.to_params())
        .await;

    match result {
        Err(StorageError::ConstraintViolation { table, id }) => {
            assert_eq!(table, KNOWN_EXPLOITS_TABLE);
            assert_eq!(id, "e1");
        }
        other => panic!("expected ConstraintViolation, got {other:?}"),
    }

    // The original row is untouched.
    assert_eq!(store.row_count(KNOWN_EXPLOITS_TABLE), Some(1));
    let rows = store
        .query(SELECT_KNOWN_EXPLOIT, &[serde_json::json!("e1")])
        .await
        .unwrap();
    let stored = ProceduralRecord::from_row(&rows[0]).unwrap();
    assert_eq!(stored.pattern, "reentrancy");
}
