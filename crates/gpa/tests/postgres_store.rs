//! Compile-only checks for the PostgreSQL store wiring.
#![cfg(all(feature = "postgres", feature = "derive"))]
#![allow(dead_code)]

use gpa::prelude::*;
use gpa::{IsolationLevel, create_pool_with_tls};
use std::sync::Arc;
use tokio_postgres::NoTls;

#[derive(Debug, Clone, Default, Entity)]
#[orm(table = "events")]
struct Event {
    id: i64,
    #[orm(db_type = "JSONB")]
    payload: serde_json::Value,
    occurred_at: chrono::DateTime<chrono::Utc>,
    trace_id: Option<uuid::Uuid>,
    #[orm(precision = 12, scale = 4)]
    amount: f64,
}

async fn _repository_over_pg_store_compiles(config: &Config) -> OrmResult<()> {
    let store = Arc::new(PgStore::connect(config)?.max_sql_length(500));
    store.health().await?;

    let events: Repository<Event> = Repository::new(store);
    events.migrate_table().await?;
    events.create_index(&["occurred_at"], false).await?;

    let recent = events
        .query([order_by("occurred_at", Direction::Desc), limit(20)])
        .await?;

    let options = TxOptions::new().isolation(IsolationLevel::RepeatableRead);
    events
        .transaction_with(options, |tx| async move {
            for mut event in recent {
                event.amount += 1.0;
                tx.update(&mut event).await?;
            }
            Ok::<_, OrmError>(())
        })
        .await?;
    Ok(())
}

fn _pool_with_custom_tls_compiles(config: &Config) -> OrmResult<PgStore> {
    let pool = create_pool_with_tls(config, NoTls)?;
    Ok(PgStore::new(pool).no_truncate())
}

#[tokio::test]
async fn store_builds_from_config_without_connecting() {
    let config = Config::from_toml_str(
        r#"
        driver = "postgres"
        host = "127.0.0.1"
        database = "gpa_test"
        username = "gpa"
        max_open_conns = 2
        "#,
    )
    .unwrap();
    let store = PgStore::connect(&config).unwrap();
    assert_eq!(store.pool().status().max_size, 2);
}
