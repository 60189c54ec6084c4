use std::sync::Arc;

use sql_bridge::prelude::*;
use sql_bridge::test_utils::StubFactory;

fn quick_pool() -> PoolSettings {
    PoolSettings::default().with_min(1).with_max(4)
}

async fn bridge_with(factory: &StubFactory, config: BridgeConfig) -> SqlBridge {
    SqlBridge::connect(Arc::new(factory.clone()), config)
        .await
        .expect("bridge init")
}

/// Postgres-dialect statements are rewritten before they reach the driver,
/// and the recorded SQL shows the target dialect only.
#[tokio::test]
async fn translates_statements_by_default() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    let bridge = bridge_with(
        &factory,
        BridgeConfig::default().with_pool(quick_pool()),
    )
    .await;

    let outcome = bridge
        .execute(
            "SELECT * FROM users ORDER BY id LIMIT 10 OFFSET 20",
            &BindMap::new(),
            &ExecOptions::default(),
        )
        .await?;
    assert_eq!(outcome.rules_applied, 1);

    let sql = factory.executed_sql();
    assert_eq!(
        sql.last().map(String::as_str),
        Some("SELECT * FROM users ORDER BY id OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY")
    );
    Ok(())
}

#[tokio::test]
async fn syntax_conversion_can_be_disabled_per_call() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    let bridge = bridge_with(
        &factory,
        BridgeConfig::default().with_pool(quick_pool()),
    )
    .await;

    bridge
        .execute(
            "SELECT * FROM users LIMIT 5",
            &BindMap::new(),
            &ExecOptions::default().with_syntax_conversion(false),
        )
        .await?;

    assert_eq!(
        factory.executed_sql().last().map(String::as_str),
        Some("SELECT * FROM users LIMIT 5")
    );
    Ok(())
}

/// Boolean binds reach the driver as 0/1 integers; timestamps pass through.
#[tokio::test]
async fn coerces_binds_by_default() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    let bridge = bridge_with(
        &factory,
        BridgeConfig::default().with_pool(quick_pool()),
    )
    .await;

    let mut binds = BindMap::new();
    binds.insert("is_active".into(), SqlValue::Bool(true));
    binds.insert("payload".into(), SqlValue::Json(serde_json::json!({"k": 1})));
    bridge
        .execute(
            "UPDATE users SET payload = :payload WHERE is_active = :is_active",
            &binds,
            &ExecOptions::default(),
        )
        .await?;

    let executed = factory.executed();
    let last = executed.last().expect("recorded statement");
    assert_eq!(last.binds.get("is_active"), Some(&SqlValue::Int(1)));
    assert_eq!(
        last.binds.get("payload"),
        Some(&SqlValue::Text(r#"{"k":1}"#.into()))
    );
    Ok(())
}

/// Rows scripted in the stub come back through the executor unchanged.
#[tokio::test]
async fn returns_scripted_rows() -> Result<(), SqlBridgeError> {
    let factory = StubFactory::new();
    factory.push_rows(
        &["id", "name"],
        vec![
            vec![SqlValue::Int(1), SqlValue::Text("alice".into())],
            vec![SqlValue::Int(2), SqlValue::Text("bob".into())],
        ],
    );
    let bridge = bridge_with(
        &factory,
        BridgeConfig::default().with_pool(quick_pool()),
    )
    .await;

    let outcome = bridge
        .execute("SELECT id, name FROM users", &BindMap::new(), &ExecOptions::default())
        .await?;
    assert_eq!(outcome.rows.len(), 2);
    assert_eq!(
        outcome.rows.rows[0].get("name").and_then(SqlValue::as_text),
        Some("alice")
    );
    Ok(())
}

/// A failed statement comes back as a taxonomy-mapped error with a localized
/// suggested action.
#[tokio::test]
async fn maps_statement_failures_through_taxonomy() {
    let factory = StubFactory::new();
    factory.push_failure(DriverError::with_code(
        1,
        "unique constraint (APP.UK_USERS_EMAIL) violated",
    ));
    let bridge = bridge_with(
        &factory,
        BridgeConfig::default().with_pool(quick_pool()),
    )
    .await;

    let err = bridge
        .execute("INSERT INTO users (id) VALUES (:id)", &BindMap::new(), &ExecOptions::default())
        .await
        .expect_err("scripted failure");

    let failure = err.query_failure().expect("taxonomy failure");
    assert_eq!(failure.code, "ORA-00001");
    assert_eq!(failure.kind, QueryErrorKind::ConstraintViolation);
    let constraint = failure.constraint.as_ref().expect("constraint info");
    assert_eq!(constraint.kind, ConstraintKind::Unique);
    assert_eq!(constraint.columns, vec!["email".to_string()]);
}

#[tokio::test]
async fn locale_selects_localized_action() {
    let factory = StubFactory::new();
    factory.push_failure(DriverError::with_code(1403, "no data found"));
    factory.push_failure(DriverError::with_code(1403, "no data found"));
    let bridge = bridge_with(
        &factory,
        BridgeConfig::default().with_pool(quick_pool()),
    )
    .await;

    let english = bridge
        .execute("SELECT 1 FROM dual", &BindMap::new(), &ExecOptions::default())
        .await
        .expect_err("scripted failure");
    let german = bridge
        .execute(
            "SELECT 1 FROM dual",
            &BindMap::new(),
            &ExecOptions::default().with_locale("de"),
        )
        .await
        .expect_err("scripted failure");

    let english = english.query_failure().expect("failure").suggested_action.clone();
    let german = german.query_failure().expect("failure").suggested_action.clone();
    assert_ne!(english, german);
}

/// Statement timeout surfaces as a typed error, not a hang.
#[tokio::test]
async fn statement_timeout_is_typed() {
    let factory = StubFactory::new();
    factory.set_execute_delay(Some(std::time::Duration::from_millis(200)));
    let bridge = bridge_with(
        &factory,
        BridgeConfig::default().with_pool(quick_pool()),
    )
    .await;

    let err = bridge
        .execute(
            "SELECT 1 FROM dual",
            &BindMap::new(),
            &ExecOptions::default().with_timeout(std::time::Duration::from_millis(20)),
        )
        .await
        .expect_err("should time out");
    assert!(matches!(err, SqlBridgeError::Timeout { .. }));
    factory.set_execute_delay(None);
}
