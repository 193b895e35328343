//! # gpa
//!
//! A generic repository over relational stores.
//!
//! ## Features
//!
//! - **Typed repositories**: `Repository<T>` for any `T: Entity`, with CRUD, batch
//!   inserts, counting, relations and schema management
//! - **Query options**: `filter`, `order_by`, `limit`, `join`, `group_by`, ... compiled
//!   into validated, parameterized SQL
//! - **Classified errors**: every failure is `NotFound`, `Duplicate`, `Validation` or
//!   `Database`
//! - **Lifecycle hooks**: validate and before/after hooks for create, update, delete
//!   and find
//! - **Transactions**: commit on `Ok`, roll back on `Err`, savepoints when nested
//! - **Pluggable stores**: PostgreSQL via `deadpool-postgres`, and an in-memory store
//!   for tests
//!
//! ```ignore
//! use gpa::prelude::*;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Default, Entity)]
//! #[orm(table = "users")]
//! struct User {
//!     #[orm(id)]
//!     id: i64,
//!     #[orm(size = 255, unique)]
//!     email: String,
//!     age: i32,
//! }
//!
//! let store = Arc::new(PgStore::connect(&Config::load("gpa.toml")?)?);
//! let users: Repository<User> = Repository::new(store);
//! users.migrate_table().await?;
//!
//! let adults = users
//!     .query([
//!         filter("age", Operator::GreaterThanOrEqual, 18),
//!         order_by("age", Direction::Desc),
//!         limit(10),
//!     ])
//!     .await?;
//! ```

extern crate self as gpa;

pub mod compile;
pub mod condition;
pub mod config;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod ident;
pub mod memory;
pub mod prelude;
pub mod query;
pub mod record;
pub mod repository;
pub mod sql;
pub mod store;
pub mod transaction;
pub mod value;

#[cfg(feature = "postgres")]
pub mod pool;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use compile::{CompiledJoin, CompiledOrder, CompiledQuery, Predicate, compile, compile_query};
pub use condition::{BasicCondition, Condition, Operator};
pub use config::{Config, SslConfig};
pub use entity::{
    ColumnInfo, ColumnType, ConstraintInfo, ConstraintKind, Entity, EntityInfo, FieldInfo, FieldType,
    IndexInfo, MigrationStatus, Relation, RelationKind, TableInfo,
};
pub use error::{BoxError, ErrorKind, OrmError, OrmResult, StoreError, classify, classify_result};
pub use hooks::{
    AfterCreate, AfterDelete, AfterFind, AfterUpdate, BeforeCreate, BeforeDelete, BeforeUpdate, HookError,
    HookObserver, HookPoint, NoopHookObserver, TracingHookObserver, Validate,
};
pub use ident::{ColumnExpr, Ident};
pub use memory::MemoryStore;
pub use query::{
    Direction, Join, JoinType, Order, Query, QueryOption, distinct, filter, filter_condition, group_by,
    having, inner_join, join, left_join, limit, offset, order_by, preload, select,
};
pub use record::Record;
pub use repository::{BATCH_SIZE, Repository};
pub use sql::{Placeholder, Sql, sql};
pub use store::{
    ExecResult, Executor, IndexDef, IsolationLevel, Store, StoreResult, StoreTransaction, TableSchema, TxOptions,
};
pub use transaction::Transaction;
pub use value::{FromValue, Value};

#[cfg(feature = "postgres")]
pub use pool::{create_pool, create_pool_with_tls};
#[cfg(feature = "postgres")]
pub use postgres::{PgStore, PgTransaction};

#[cfg(feature = "derive")]
pub use gpa_derive::Entity;
