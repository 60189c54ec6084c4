use std::sync::Arc;
use std::time::Duration;

use sql_bridge::prelude::*;
use sql_bridge::test_utils::StubFactory;

async fn bridge(factory: &StubFactory) -> SqlBridge {
    SqlBridge::connect(
        Arc::new(factory.clone()),
        BridgeConfig::default()
            .with_pool(PoolSettings::default().with_min(1).with_max(4)),
    )
    .await
    .expect("bridge init")
}

fn insert_binds(id: i64) -> BindMap {
    let mut binds = BindMap::new();
    binds.insert("id".into(), SqlValue::Int(id));
    binds
}

/// A successful unit of work commits exactly once.
#[tokio::test]
async fn commits_successful_callback() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    let bridge = bridge(&factory).await;

    let inserted = bridge
        .execute_transaction(TransactionContext::default(), |tx| {
            Box::pin(async move {
                tx.execute("INSERT INTO users (id) VALUES (:id)", &insert_binds(1))
                    .await?;
                tx.execute("INSERT INTO users (id) VALUES (:id)", &insert_binds(2))
                    .await?;
                Ok(2)
            })
        })
        .await?;
    assert_eq!(inserted, 2);

    let sql = factory.executed_sql();
    assert_eq!(
        sql.first().map(String::as_str),
        Some("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
    );
    assert_eq!(sql.last().map(String::as_str), Some("COMMIT"));
    assert_eq!(sql.iter().filter(|s| *s == "ROLLBACK").count(), 0);
    Ok(())
}

/// A callback that fails after a successful statement rolls the whole
/// transaction back; nothing is committed.
#[tokio::test]
async fn rolls_back_failed_callback() {
    let factory = StubFactory::new();
    let bridge = bridge(&factory).await;

    let err = bridge
        .execute_transaction(TransactionContext::default(), |tx| {
            Box::pin(async move {
                tx.execute("INSERT INTO users (id) VALUES (:id)", &insert_binds(1))
                    .await?;
                Err::<(), _>(SqlBridgeError::ExecutionError("domain validation failed".into()))
            })
        })
        .await
        .expect_err("callback failed");
    assert!(matches!(err, SqlBridgeError::ExecutionError(_)));

    let sql = factory.executed_sql();
    assert_eq!(sql.last().map(String::as_str), Some("ROLLBACK"));
    assert!(!sql.iter().any(|s| s == "COMMIT"));
}

/// Context is applied once, before any statement, and read-only wins.
#[tokio::test]
async fn applies_context_before_statements() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    let bridge = bridge(&factory).await;

    bridge
        .execute_transaction(
            TransactionContext::default()
                .with_isolation(IsolationLevel::Serializable)
                .read_only(),
            |tx| {
                Box::pin(async move {
                    tx.execute("SELECT id FROM users", &BindMap::new()).await?;
                    Ok(())
                })
            },
        )
        .await?;

    assert_eq!(
        factory.executed_sql().first().map(String::as_str),
        Some("SET TRANSACTION READ ONLY")
    );
    Ok(())
}

/// Savepoints roll back only the statements issued after their creation, and
/// later savepoints become invalid after rolling back past them.
#[tokio::test]
async fn savepoint_lifecycle() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    let bridge = bridge(&factory).await;

    let mut tx = bridge.begin_transaction(TransactionContext::default()).await?;
    tx.execute("INSERT INTO users (id) VALUES (:id)", &insert_binds(1))
        .await?;

    let keep = tx.savepoint("after_first").await?;
    tx.execute("INSERT INTO users (id) VALUES (:id)", &insert_binds(2))
        .await?;
    let later = tx.savepoint("after_second").await?;

    tx.rollback_to_savepoint(&keep).await?;

    // `later` was created after `keep`, so it is gone now.
    let err = tx
        .rollback_to_savepoint(&later)
        .await
        .expect_err("stale savepoint");
    assert!(matches!(err, SqlBridgeError::TransactionError(_)));

    tx.commit().await?;

    let sql = factory.executed_sql();
    assert!(sql.iter().any(|s| s == "SAVEPOINT after_first"));
    assert!(sql.iter().any(|s| s == "ROLLBACK TO SAVEPOINT after_first"));
    assert_eq!(sql.last().map(String::as_str), Some("COMMIT"));
    Ok(())
}

#[tokio::test]
async fn release_savepoint_is_advisory() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    let bridge = bridge(&factory).await;

    let mut tx = bridge.begin_transaction(TransactionContext::default()).await?;
    let sp = tx.savepoint("mark").await?;
    let statements_before = factory.executed_sql().len();

    tx.release_savepoint(&sp)?;
    // No round trip for release.
    assert_eq!(factory.executed_sql().len(), statements_before);

    let err = tx
        .rollback_to_savepoint(&sp)
        .await
        .expect_err("released savepoint");
    assert!(matches!(err, SqlBridgeError::TransactionError(_)));
    tx.rollback().await?;
    Ok(())
}

#[tokio::test]
async fn rejects_invalid_savepoint_names() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    let bridge = bridge(&factory).await;

    let mut tx = bridge.begin_transaction(TransactionContext::default()).await?;
    let err = tx
        .savepoint("sp1; DROP TABLE users")
        .await
        .expect_err("invalid identifier");
    assert!(matches!(err, SqlBridgeError::TransactionError(_)));
    tx.rollback().await?;
    Ok(())
}

/// Dropping an unfinished transaction rolls it back instead of leaking the
/// session with an open transaction.
#[tokio::test]
async fn drop_without_commit_rolls_back() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    let bridge = bridge(&factory).await;

    {
        let mut tx = bridge.begin_transaction(TransactionContext::default()).await?;
        tx.execute("INSERT INTO users (id) VALUES (:id)", &insert_binds(1))
            .await?;
        // Dropped here without commit or rollback.
    }

    // The rollback runs on a spawned task; give it a moment.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sql = factory.executed_sql();
    assert_eq!(sql.last().map(String::as_str), Some("ROLLBACK"));

    // The session went back to the pool and is reusable.
    bridge
        .execute("SELECT 1 FROM dual", &BindMap::new(), &ExecOptions::default())
        .await?;
    Ok(())
}
