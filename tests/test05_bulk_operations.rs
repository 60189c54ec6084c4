use std::sync::Arc;

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

fn photo_rows(count: usize) -> Vec<BindMap> {
    (0..count)
        .map(|i| {
            let mut row = BindMap::new();
            row.insert("id".into(), SqlValue::Int(i as i64));
            row.insert("size".into(), SqlValue::Int(1024));
            row
        })
        .collect()
}

/// 2,500 rows at batch size 1,000 issue exactly 3 array-bound chunks, and
/// every input row is accounted for.
#[tokio::test]
async fn chunking_is_exact() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    let bridge = bridge(&factory).await;

    let result = bridge
        .execute_bulk_insert(
            "photos",
            &photo_rows(2500),
            &BulkOptions::default(),
            &ExecOptions::default(),
        )
        .await?;

    assert_eq!(result.batch_count, 3);
    assert_eq!(result.total_processed, 2500);
    assert_eq!(result.successful_rows, 2500);
    assert_eq!(result.failed_rows, 0);
    assert!(result.success);

    let executed = factory.executed();
    let batch_sizes: Vec<Option<usize>> = executed.iter().map(|e| e.batch_len).collect();
    assert_eq!(batch_sizes, vec![Some(1000), Some(1000), Some(500)]);
    assert_eq!(
        executed[0].sql,
        "INSERT INTO photos (id, size) VALUES (:id, :size)"
    );
    Ok(())
}

/// With continue-on-error, a failed chunk is recorded and later chunks still
/// run. Counts reflect the true split.
#[tokio::test]
async fn continue_on_error_records_chunk_failures() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    factory.push_affected(1000);
    factory.push_failure(DriverError::with_code(
        1,
        "unique constraint (APP.PK_PHOTOS) violated",
    ));
    factory.push_affected(500);
    let bridge = bridge(&factory).await;

    let result = bridge
        .execute_bulk_insert(
            "photos",
            &photo_rows(2500),
            &BulkOptions::default().continue_on_error(),
            &ExecOptions::default(),
        )
        .await?;

    assert_eq!(result.batch_count, 3);
    assert_eq!(result.total_processed, 2500);
    assert_eq!(result.successful_rows, 1500);
    assert_eq!(result.failed_rows, 1000);
    assert!(!result.success);

    assert_eq!(result.errors.len(), 1);
    let chunk_err = &result.errors[0];
    assert_eq!(chunk_err.batch_index, 1);
    assert_eq!(chunk_err.row_offset, 1000);
    assert_eq!(chunk_err.row_count, 1000);
    assert_eq!(chunk_err.failure.kind, QueryErrorKind::ConstraintViolation);
    Ok(())
}

/// Without continue-on-error, processing stops at the first failed chunk and
/// the rows in unexecuted chunks are reported as failed.
#[tokio::test]
async fn stop_on_error_counts_unexecuted_rows_as_failed() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    factory.push_affected(1000);
    factory.push_failure(DriverError::with_code(2290, "check constraint violated"));
    let bridge = bridge(&factory).await;

    let result = bridge
        .execute_bulk_insert(
            "photos",
            &photo_rows(2500),
            &BulkOptions::default(),
            &ExecOptions::default(),
        )
        .await?;

    // Two chunks issued, the third never ran.
    assert_eq!(result.batch_count, 2);
    assert_eq!(result.total_processed, 2500);
    assert_eq!(result.successful_rows, 1000);
    assert_eq!(result.failed_rows, 1500);
    assert!(!result.success);
    assert_eq!(factory.executed().len(), 2);
    Ok(())
}

/// Parallel chunks all run, each on its own pooled session.
#[tokio::test]
async fn parallel_chunks_all_attempted() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    let bridge = bridge(&factory).await;

    let result = bridge
        .execute_bulk_insert(
            "photos",
            &photo_rows(250),
            &BulkOptions::default().with_batch_size(100).parallel(),
            &ExecOptions::default(),
        )
        .await?;

    assert_eq!(result.batch_count, 3);
    assert_eq!(result.total_processed, 250);
    assert!(result.success);
    Ok(())
}

#[tokio::test]
async fn bulk_update_builds_keyed_statement() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    let bridge = bridge(&factory).await;

    let result = bridge
        .execute_bulk_update(
            "photos",
            &photo_rows(3),
            &["id".to_string()],
            None,
            &BulkOptions::default(),
            &ExecOptions::default(),
        )
        .await?;
    assert!(result.success);

    assert_eq!(
        factory.executed()[0].sql,
        "UPDATE photos SET size = :size WHERE id = :id"
    );
    Ok(())
}

#[tokio::test]
async fn merge_builds_upsert_statement() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    let bridge = bridge(&factory).await;

    let result = bridge
        .execute_merge(
            "photos",
            &photo_rows(3),
            &["id".to_string()],
            None,
            &BulkOptions::default(),
            &ExecOptions::default(),
        )
        .await?;
    assert!(result.success);

    let sql = &factory.executed()[0].sql;
    assert!(sql.starts_with("MERGE INTO photos USING"));
    assert!(sql.contains("WHEN MATCHED THEN UPDATE SET photos.size = src.size"));
    assert!(sql.contains("WHEN NOT MATCHED THEN INSERT (id, size)"));
    Ok(())
}

/// executeBatch: caller-provided statement, array-bound per chunk.
#[tokio::test]
async fn execute_batch_uses_caller_statement() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    let bridge = bridge(&factory).await;

    let result = bridge
        .execute_batch(
            "DELETE FROM photos WHERE id = :id",
            &photo_rows(150),
            &BulkOptions::default().with_batch_size(100),
            &ExecOptions::default(),
        )
        .await?;

    assert_eq!(result.batch_count, 2);
    assert_eq!(result.total_processed, 150);
    assert_eq!(
        factory.executed()[0].sql,
        "DELETE FROM photos WHERE id = :id"
    );
    Ok(())
}

/// Empty input is a successful no-op.
#[tokio::test]
async fn empty_bulk_input_is_noop() {
    let factory = StubFactory::new();
    let bridge = bridge(&factory).await;

    let err = bridge
        .execute_bulk_insert("photos", &[], &BulkOptions::default(), &ExecOptions::default())
        .await
        .expect_err("no rows means no column set");
    assert!(matches!(err, SqlBridgeError::ParameterError(_)));

    let result = bridge
        .execute_batch(
            "DELETE FROM photos WHERE id = :id",
            &[],
            &BulkOptions::default(),
            &ExecOptions::default(),
        )
        .await
        .expect("empty batch");
    assert_eq!(result.total_processed, 0);
    assert!(result.success);
}
