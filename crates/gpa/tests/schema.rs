//! Table, index and migration management.
#![cfg(feature = "derive")]

use gpa::prelude::*;
use gpa::{ColumnInfo, ConstraintKind, TableInfo};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[orm(table = "customers")]
struct Customer {
    id: i64,
    #[orm(size = 255, unique)]
    email: String,
    #[orm(column = "display_name")]
    name: String,
    #[orm(precision = 10, scale = 2)]
    credit: f64,
    #[orm(default = "true")]
    active: bool,
    nickname: Option<String>,
    #[orm(skip)]
    cached_score: u32,
}

/// An older shape of the same table.
#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[orm(table = "customers")]
struct CustomerV1 {
    id: i64,
    #[orm(size = 255, unique)]
    email: String,
}

#[derive(Debug, Clone, Default, Entity)]
struct OrderLine {
    #[orm(id)]
    sku: String,
    quantity: i32,
}

fn repo<T: gpa::Entity>(store: &MemoryStore) -> Repository<T> {
    Repository::new(Arc::new(store.clone()))
}

fn column<'a>(info: &'a TableInfo, name: &str) -> &'a ColumnInfo {
    info.columns.iter().find(|c| c.name == name).unwrap()
}

#[tokio::test]
async fn create_table_twice_is_duplicate() {
    let store = MemoryStore::new();
    let customers = repo::<Customer>(&store);
    customers.create_table().await.unwrap();

    let err = customers.create_table().await.unwrap_err();
    assert!(err.is_duplicate());
    assert_eq!(err.message(), "table already exists: customers");
}

#[tokio::test]
async fn drop_table_then_status_reports_missing() {
    let store = MemoryStore::new();
    let customers = repo::<Customer>(&store);
    customers.create_table().await.unwrap();
    customers.drop_table().await.unwrap();

    let status = customers.migration_status().await.unwrap();
    assert!(!status.table_exists);
    assert!(status.needs_migration);
    assert_eq!(status.pending_changes, ["create table customers"]);
    assert_eq!(status.current_version, "outdated");
}

#[tokio::test]
async fn migration_adds_missing_columns() {
    let store = MemoryStore::new();
    repo::<CustomerV1>(&store).create_table().await.unwrap();
    let old = repo::<CustomerV1>(&store);
    old.create(&mut CustomerV1 {
        id: 0,
        email: "early@example.com".into(),
    })
    .await
    .unwrap();

    let customers = repo::<Customer>(&store);
    let status = customers.migration_status().await.unwrap();
    assert!(status.table_exists);
    assert!(status.needs_migration);
    assert_eq!(
        status.pending_changes,
        [
            "add column customers.display_name",
            "add column customers.credit",
            "add column customers.active",
            "add column customers.nickname",
        ]
    );

    customers.migrate_table().await.unwrap();
    let status = customers.migration_status().await.unwrap();
    assert!(!status.needs_migration);
    assert!(status.pending_changes.is_empty());
    assert_eq!(status.current_version, status.required_version);

    // Pre-existing rows survive the migration.
    assert_eq!(old.count([]).await.unwrap(), 1);
}

#[tokio::test]
async fn migrate_creates_a_missing_table() {
    let store = MemoryStore::new();
    let customers = repo::<Customer>(&store);
    customers.migrate_table().await.unwrap();
    assert!(customers.migration_status().await.unwrap().table_exists);
}

#[tokio::test]
async fn indexes_are_named_and_enforced() {
    let store = MemoryStore::new();
    let customers = repo::<Customer>(&store);
    customers.create_table().await.unwrap();

    // Field names resolve to their columns.
    customers.create_index(&["name"], true).await.unwrap();
    let err = customers.create_index(&["display_name"], false).await.unwrap_err();
    assert!(err.is_duplicate());
    assert_eq!(err.message(), "index already exists: idx_customers_display_name");

    let customer = |email: &str| Customer {
        email: email.into(),
        name: "Same Name".into(),
        active: true,
        ..Customer::default()
    };
    customers.create(&mut customer("a@example.com")).await.unwrap();
    let err = customers.create(&mut customer("b@example.com")).await.unwrap_err();
    assert!(err.is_duplicate());

    customers.drop_index("idx_customers_display_name").await.unwrap();
    customers.create(&mut customer("b@example.com")).await.unwrap();
    assert!(customers.drop_index("bad-name").await.unwrap_err().is_validation());
}

#[test]
fn table_info_describes_columns_and_constraints() {
    let store = MemoryStore::new();
    let info = repo::<Customer>(&store).table_info();
    assert_eq!(info.name, "customers");

    let names: Vec<&str> = info.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "email", "display_name", "credit", "active", "nickname"]);

    assert_eq!(column(&info, "id").data_type, "BIGSERIAL");
    assert!(column(&info, "id").primary_key && column(&info, "id").auto_increment);
    assert_eq!(column(&info, "email").data_type, "VARCHAR(255)");
    assert_eq!(column(&info, "credit").data_type, "NUMERIC(10,2)");
    assert_eq!(column(&info, "active").default.as_deref(), Some("true"));
    assert!(column(&info, "nickname").nullable);
    assert!(!column(&info, "display_name").nullable);

    let kinds: Vec<(ConstraintKind, &str)> = info
        .constraints
        .iter()
        .map(|c| (c.kind, c.name.as_str()))
        .collect();
    assert_eq!(
        kinds,
        [
            (ConstraintKind::PrimaryKey, "customers_pkey"),
            (ConstraintKind::Unique, "customers_email_key"),
        ]
    );
}

#[tokio::test]
async fn text_primary_keys_are_not_generated() {
    let store = MemoryStore::new();
    let lines = repo::<OrderLine>(&store);
    let pk = lines.entity_info().primary_key().cloned().unwrap();
    assert_eq!(pk.column, "sku");
    assert!(!pk.auto_increment);

    lines.create_table().await.unwrap();
    lines
        .create(&mut OrderLine {
            sku: "A-1".into(),
            quantity: 2,
        })
        .await
        .unwrap();
    assert_eq!(lines.find_by_id("A-1").await.unwrap().quantity, 2);
}
