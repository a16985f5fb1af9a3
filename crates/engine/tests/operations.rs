use engine::{Engine, EngineError, Entry, Operation, OperationMetadata};
use migration::MigratorTrait;
use rust_decimal::Decimal;
use sea_orm::{Database, DatabaseConnection};
use serde_json::json;

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder().database(db.clone()).build();
    (engine, db)
}

fn block_operation(memo: &str) -> Operation {
    Operation {
        op_type: "transfer".to_string(),
        memo: memo.to_string(),
        metadata: Some(OperationMetadata::new("BLOCK")),
        entries: vec![Entry::new("3", "btc", "-1"), Entry::new("4", "btc", "1")],
    }
}

#[tokio::test]
async fn post_operation_persists_and_applies_balances() {
    let (engine, _db) = engine_with_db().await;

    let stored = engine.post_operation(&block_operation("block-1")).await.unwrap();
    assert!(!stored.id.is_empty());
    assert_eq!(stored.memo, "block-1");

    let found = engine.get_operation("block-1", None).await.unwrap().unwrap();
    assert_eq!(found.id, stored.id);
    assert_eq!(found.op_type, "transfer");
    assert_eq!(found.entries.len(), 2);
    assert_eq!(found.metadata.unwrap().operation, "BLOCK");

    let rows = engine
        .get_balance("3", Some("btc"), Some("BLOCK"), None)
        .await
        .unwrap();
    assert_eq!(rows[0].balance, Decimal::from(-1));
    let overall = engine.get_balance("4", Some("btc"), None, None).await.unwrap();
    assert_eq!(overall[0].balance, Decimal::from(1));
}

#[tokio::test]
async fn duplicate_memo_replays_without_touching_balances() {
    let (engine, _db) = engine_with_db().await;

    let first = engine.post_operation(&block_operation("block-1")).await.unwrap();
    let second = engine.post_operation(&block_operation("block-1")).await.unwrap();

    assert_eq!(first.id, second.id);

    let rows = engine
        .get_balance("3", Some("btc"), Some("BLOCK"), None)
        .await
        .unwrap();
    assert_eq!(rows[0].balance, Decimal::from(-1));
}

#[tokio::test]
async fn post_operation_without_metadata_stores_nothing() {
    let (engine, _db) = engine_with_db().await;
    let mut op = block_operation("block-1");
    op.metadata = None;

    let err = engine.post_operation(&op).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    assert!(engine.get_operation("block-1", None).await.unwrap().is_none());
    assert!(
        engine
            .get_balance("3", Some("btc"), Some("BLOCK"), None)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn post_operation_with_bad_value_rolls_back_the_row() {
    let (engine, _db) = engine_with_db().await;
    let mut op = block_operation("block-1");
    op.entries[1].value = "not-a-number".to_string();

    let err = engine.post_operation(&op).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // The operation row was inserted inside the transaction and must not
    // survive the rollback.
    assert!(engine.get_operation("block-1", None).await.unwrap().is_none());
}

#[tokio::test]
async fn get_operation_requires_a_memo() {
    let (engine, _db) = engine_with_db().await;

    let err = engine.get_operation("", None).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn get_operation_returns_none_for_unknown_memo() {
    let (engine, _db) = engine_with_db().await;

    assert!(engine.get_operation("missing", None).await.unwrap().is_none());
}

#[tokio::test]
async fn create_or_update_book_reports_which_write_happened() {
    let (engine, _db) = engine_with_db().await;

    let (book, write) = engine
        .create_or_update_book("assets:hot", Some(json!({"custodian": "warm"})))
        .await
        .unwrap();
    assert_eq!(write, engine::BookWrite::Created);
    assert_eq!(book.name, "assets:hot");

    let (updated, write) = engine
        .create_or_update_book("assets:hot", Some(json!({"custodian": "cold"})))
        .await
        .unwrap();
    assert_eq!(write, engine::BookWrite::Updated);
    assert_eq!(updated.id, book.id);
    assert_eq!(updated.metadata, Some(json!({"custodian": "cold"})));
}

#[tokio::test]
async fn get_book_returns_none_for_unknown_or_non_numeric_ids() {
    let (engine, _db) = engine_with_db().await;

    assert!(engine.get_book("999", false).await.unwrap().is_none());
    assert!(engine.get_book("not-an-id", false).await.unwrap().is_none());
}

#[tokio::test]
async fn get_book_with_balance_serves_the_overall_bucket() {
    let (engine, _db) = engine_with_db().await;

    let (book, _) = engine.create_or_update_book("assets:hot", None).await.unwrap();
    let book_id = book.id.to_string();

    let op = Operation {
        op_type: "transfer".to_string(),
        memo: "fund-1".to_string(),
        metadata: Some(OperationMetadata::new("DEPOSIT")),
        entries: vec![Entry::new(book_id.clone(), "btc", "2.5")],
    };
    engine.post_operation(&op).await.unwrap();

    let (_, balances) = engine.get_book(&book_id, true).await.unwrap().unwrap();
    let balances = balances.unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].operation_type, engine::OVERALL_OPERATION);
    assert_eq!(balances[0].balance, "2.5".parse::<Decimal>().unwrap());

    let (_, no_balances) = engine.get_book(&book_id, false).await.unwrap().unwrap();
    assert!(no_balances.is_none());
}
