//! The store abstraction the repository executes against.
//!
//! [`Executor`] is the statement surface shared by a store and an open
//! transaction. Everything structured arrives as a [`CompiledQuery`] or as
//! validated predicates, so implementations never see caller-built SQL except
//! through `raw_query` / `raw_exec`.

use crate::compile::{CompiledQuery, Predicate};
use crate::entity::FieldInfo;
use crate::error::StoreError;
use crate::record::Record;
use crate::value::Value;
use async_trait::async_trait;
use std::sync::Arc;

pub type StoreResult<T> = Result<T, StoreError>;

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    /// Whatever the server is configured with.
    #[default]
    Default,
}

impl IsolationLevel {
    /// SQL keyword form, `None` for [`IsolationLevel::Default`].
    pub fn as_sql(self) -> Option<&'static str> {
        match self {
            IsolationLevel::ReadUncommitted => Some("READ UNCOMMITTED"),
            IsolationLevel::ReadCommitted => Some("READ COMMITTED"),
            IsolationLevel::RepeatableRead => Some("REPEATABLE READ"),
            IsolationLevel::Serializable => Some("SERIALIZABLE"),
            IsolationLevel::Default => None,
        }
    }
}

/// Options for starting a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: IsolationLevel,
    pub read_only: bool,
}

impl TxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = level;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// `BEGIN ...` statement for these options.
    pub fn begin_sql(&self) -> String {
        let mut sql = String::from("BEGIN");
        if let Some(level) = self.isolation.as_sql() {
            sql.push_str(" ISOLATION LEVEL ");
            sql.push_str(level);
        }
        if self.read_only {
            sql.push_str(" READ ONLY");
        }
        sql
    }
}

/// A table definition handed to DDL calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub fields: Vec<FieldInfo>,
}

/// An index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Result of a raw statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Last generated id, when the backend reports one.
    pub last_insert_id: Option<i64>,
}

/// Statements runnable on a store or inside a transaction.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn select(&self, table: &str, query: &CompiledQuery) -> StoreResult<Vec<Record>>;

    /// Rows the query filters, ignoring order and paging.
    async fn count(&self, table: &str, query: &CompiledQuery) -> StoreResult<u64>;

    /// Insert `rows` in one physical write and return, per row, the
    /// `returning` columns the store generated or stored.
    async fn insert(&self, table: &str, rows: &[Record], returning: &[String]) -> StoreResult<Vec<Record>>;

    /// Set `changes` on every row matching `filters`; returns rows affected.
    async fn update(&self, table: &str, changes: &Record, filters: &[Predicate]) -> StoreResult<u64>;

    /// Delete every row matching `filters`; returns rows affected.
    async fn delete(&self, table: &str, filters: &[Predicate]) -> StoreResult<u64>;

    async fn raw_query(&self, sql: &str, args: &[Value]) -> StoreResult<Vec<Record>>;

    async fn raw_exec(&self, sql: &str, args: &[Value]) -> StoreResult<ExecResult>;

    async fn has_table(&self, table: &str) -> StoreResult<bool>;

    async fn create_table(&self, schema: &TableSchema) -> StoreResult<()>;

    async fn drop_table(&self, table: &str) -> StoreResult<()>;

    /// Create the table or add its missing columns.
    async fn migrate_table(&self, schema: &TableSchema) -> StoreResult<()>;

    /// Column names of the live table.
    async fn table_columns(&self, table: &str) -> StoreResult<Vec<String>>;

    async fn has_index(&self, table: &str, name: &str) -> StoreResult<bool>;

    async fn create_index(&self, index: &IndexDef) -> StoreResult<()>;

    async fn drop_index(&self, table: &str, name: &str) -> StoreResult<()>;

    async fn ping(&self) -> StoreResult<()>;

    /// First row of `select`, or [`StoreError::NoRows`].
    async fn fetch_one(&self, table: &str, query: &CompiledQuery) -> StoreResult<Record> {
        let mut limited = query.clone();
        limited.limit = Some(1);
        self.select(table, &limited)
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NoRows)
    }
}

/// A store that can open transactions.
#[async_trait]
pub trait Store: Executor {
    async fn begin(&self, options: TxOptions) -> StoreResult<Arc<dyn StoreTransaction>>;
}

/// An open transaction.
///
/// Once committed or rolled back every further call fails with
/// [`StoreError::TransactionClosed`].
#[async_trait]
pub trait StoreTransaction: Executor {
    async fn commit(&self) -> StoreResult<()>;

    async fn rollback(&self) -> StoreResult<()>;

    async fn savepoint(&self, name: &str) -> StoreResult<()>;

    async fn rollback_to_savepoint(&self, name: &str) -> StoreResult<()>;

    async fn release_savepoint(&self, name: &str) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_sql_renders_options() {
        assert_eq!(TxOptions::new().begin_sql(), "BEGIN");
        assert_eq!(
            TxOptions::new()
                .isolation(IsolationLevel::Serializable)
                .read_only(true)
                .begin_sql(),
            "BEGIN ISOLATION LEVEL SERIALIZABLE READ ONLY"
        );
    }
}
