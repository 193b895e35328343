use super::*;
use crate::compile::compile;
use crate::condition::Operator;
use crate::entity::FieldInfo;
use crate::query::{Direction, distinct, filter, group_by, limit, order_by, select};

fn people() -> TableSchema {
    TableSchema {
        name: "people".into(),
        fields: vec![
            FieldInfo::of::<i64>("id").primary_key().auto_increment(),
            FieldInfo::of::<String>("email").unique(),
            FieldInfo::of::<Option<i64>>("age"),
        ],
    }
}

fn person(email: &str, age: Option<i64>) -> Record {
    Record::new().with("email", email).with("age", age)
}

async fn seeded() -> MemoryStore {
    let store = MemoryStore::new();
    store.create_table(&people()).await.unwrap();
    store
        .insert(
            "people",
            &[
                person("a@x", Some(35)),
                person("b@x", Some(25)),
                person("c@x", Some(30)),
                person("d@x", None),
            ],
            &["id".into()],
        )
        .await
        .unwrap();
    store
}

fn ages(rows: &[Record]) -> Vec<Value> {
    rows.iter().map(|r| r.get("age").cloned().unwrap_or_default()).collect()
}

#[tokio::test]
async fn insert_assigns_ids_in_one_call() {
    let store = MemoryStore::new();
    store.create_table(&people()).await.unwrap();
    let ids = store
        .insert("people", &[person("a@x", None), person("b@x", None)], &["id".into()])
        .await
        .unwrap();
    assert_eq!(ids, vec![Record::new().with("id", 1), Record::new().with("id", 2)]);
    assert_eq!(store.insert_calls(), 1);
}

#[tokio::test]
async fn unique_violation_rejects_whole_batch() {
    let store = seeded().await;
    let err = store
        .insert("people", &[person("new@x", None), person("a@x", None)], &[])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(_)));
    assert_eq!(store.rows("people").unwrap().len(), 4);
}

#[tokio::test]
async fn filter_order_limit() {
    let store = seeded().await;
    let q = compile([
        filter("age", Operator::GreaterThan, 25),
        order_by("age", Direction::Asc),
        limit(2),
    ])
    .unwrap();
    let rows = store.select("people", &q).await.unwrap();
    assert_eq!(ages(&rows), [Value::Int(30), Value::Int(35)]);
}

#[tokio::test]
async fn nulls_sort_last_ascending() {
    let store = seeded().await;
    let q = compile([order_by("age", Direction::Asc)]).unwrap();
    let rows = store.select("people", &q).await.unwrap();
    assert_eq!(rows.last().unwrap().get("age"), Some(&Value::Null));
}

#[tokio::test]
async fn projection_and_distinct() {
    let store = seeded().await;
    store
        .insert("people", &[person("e@x", Some(25))], &[])
        .await
        .unwrap();
    let q = compile([select(["age"]), distinct(), filter("age", Operator::IsNotNull, Value::Null)]).unwrap();
    let rows = store.select("people", &q).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].columns(), &["age".to_string()]);
    assert_eq!(store.count("people", &q).await.unwrap(), 3);
}

#[tokio::test]
async fn aggregates_without_group() {
    let store = seeded().await;
    let q = compile([select(["COUNT(*)", "SUM(age)", "MAX(age)"])]).unwrap();
    let rows = store.select("people", &q).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("count"), Some(&Value::Int(4)));
    assert_eq!(rows[0].get("sum"), Some(&Value::Int(90)));
    assert_eq!(rows[0].get("max"), Some(&Value::Int(35)));
}

#[tokio::test]
async fn group_by_is_unsupported() {
    let store = seeded().await;
    let q = compile([group_by("age")]).unwrap();
    let err = store.select("people", &q).await.unwrap_err();
    assert!(matches!(err, StoreError::Unsupported(_)));
}

#[tokio::test]
async fn missing_table() {
    let store = MemoryStore::new();
    let err = store.select("nope", &CompiledQuery::default()).await.unwrap_err();
    assert!(matches!(err, StoreError::MissingTable(_)));
}

#[tokio::test]
async fn update_and_delete_report_rows_affected() {
    let store = seeded().await;
    let young = compile([filter("age", Operator::LessThan, 31)]).unwrap();
    let n = store
        .update("people", &Record::new().with("age", 40), &young.filters)
        .await
        .unwrap();
    assert_eq!(n, 2);
    let n = store.delete("people", &young.filters).await.unwrap();
    assert_eq!(n, 0);
    let everyone = compile([filter("age", Operator::IsNotNull, Value::Null)]).unwrap();
    assert_eq!(store.delete("people", &everyone.filters).await.unwrap(), 3);
}

#[tokio::test]
async fn failed_delete_keeps_every_row() {
    let store = seeded().await;
    let bad = compile([filter("nope", Operator::Equal, 1)]).unwrap();
    let err = store.delete("people", &bad.filters).await.unwrap_err();
    assert!(err.to_string().contains("\"nope\" does not exist"));
    assert_eq!(store.rows("people").unwrap().len(), 4);
}

#[tokio::test]
async fn transaction_commit_and_rollback() {
    let store = seeded().await;

    let tx = store.begin(TxOptions::default()).await.unwrap();
    tx.insert("people", &[person("tx@x", None)], &[]).await.unwrap();
    assert_eq!(store.rows("people").unwrap().len(), 4);
    tx.rollback().await.unwrap();
    assert_eq!(store.rows("people").unwrap().len(), 4);

    let err = tx.ping().await.unwrap_err();
    assert!(matches!(err, StoreError::TransactionClosed));

    let tx = store.begin(TxOptions::default()).await.unwrap();
    tx.insert("people", &[person("tx@x", None)], &[]).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(store.rows("people").unwrap().len(), 5);
    assert_eq!(store.transactions_begun(), 2);
}

#[tokio::test]
async fn savepoints_restore_state() {
    let store = seeded().await;
    let tx = store.begin(TxOptions::default()).await.unwrap();
    tx.savepoint("sp1").await.unwrap();
    tx.insert("people", &[person("sp@x", None)], &[]).await.unwrap();
    tx.rollback_to_savepoint("sp1").await.unwrap();
    assert_eq!(tx.count("people", &CompiledQuery::default()).await.unwrap(), 4);
    tx.release_savepoint("sp1").await.unwrap();
    assert!(tx.release_savepoint("sp1").await.is_err());
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn raw_statements_use_scripted_responses() {
    let store = MemoryStore::new();
    let err = store.raw_exec("VACUUM", &[]).await.unwrap_err();
    assert!(matches!(err, StoreError::Unsupported(_)));

    store
        .expect_raw_exec(Ok(ExecResult {
            rows_affected: 3,
            last_insert_id: None,
        }))
        .unwrap();
    let result = store.raw_exec("UPDATE people SET age = $1", &[Value::Int(1)]).await.unwrap();
    assert_eq!(result.rows_affected, 3);
    let log = store.raw_log().unwrap();
    assert_eq!(log[1].args, vec![Value::Int(1)]);
}

#[tokio::test]
async fn migrate_adds_missing_columns() {
    let store = seeded().await;
    let mut schema = people();
    schema.fields.push(FieldInfo::of::<Option<String>>("nickname"));
    store.migrate_table(&schema).await.unwrap();
    let columns = store.table_columns("people").await.unwrap();
    assert_eq!(columns, ["id", "email", "age", "nickname"]);
    assert_eq!(store.rows("people").unwrap()[0].get("nickname"), Some(&Value::Null));
}

#[tokio::test]
async fn unique_index_is_enforced() {
    let store = seeded().await;
    let index = IndexDef {
        name: "idx_people_age".into(),
        table: "people".into(),
        columns: vec!["age".into()],
        unique: true,
    };
    store.create_index(&index).await.unwrap();
    assert!(store.has_index("people", "idx_people_age").await.unwrap());
    let err = store.insert("people", &[person("z@x", Some(25))], &[]).await.unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(_)));
}
