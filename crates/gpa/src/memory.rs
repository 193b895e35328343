//! In-memory [`Store`] for tests and prototyping.
//!
//! `MemoryStore` keeps tables as vectors of [`Record`]s behind a mutex and
//! evaluates [`CompiledQuery`] values directly. It enforces primary-key and
//! unique constraints, fills auto-increment keys, and supports transactions
//! with savepoints.
//!
//! Limits:
//! - joins, GROUP BY and HAVING return [`StoreError::Unsupported`];
//! - raw SQL is not interpreted: each `raw_query` / `raw_exec` call consumes a
//!   response scripted with [`MemoryStore::expect_raw_query`] /
//!   [`MemoryStore::expect_raw_exec`] and is recorded in
//!   [`MemoryStore::raw_log`];
//! - a transaction works on a snapshot taken at `begin` and replaces the
//!   committed state wholesale on `commit` (last writer wins).
//!
//! ```ignore
//! let store = Arc::new(MemoryStore::new());
//! let users: Repository<User> = Repository::new(store.clone());
//! users.create_table().await?;
//! ```

mod eval;

use crate::compile::{CompiledQuery, Predicate};
use crate::entity::FieldInfo;
use crate::error::StoreError;
use crate::record::Record;
use crate::store::{
    ExecResult, Executor, IndexDef, Store, StoreResult, StoreTransaction, TableSchema, TxOptions,
};
use crate::value::Value;
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
struct Table {
    fields: Vec<FieldInfo>,
    rows: Vec<Record>,
    next_id: i64,
    indexes: Vec<IndexDef>,
}

type Tables = BTreeMap<String, Table>;

/// A raw statement the store received.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCall {
    pub sql: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Default)]
struct Scripts {
    queries: VecDeque<StoreResult<Vec<Record>>>,
    execs: VecDeque<StoreResult<ExecResult>>,
    log: Vec<RawCall>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    scripts: Mutex<Scripts>,
    insert_calls: AtomicUsize,
    transactions: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StoreError::Other("memory store lock poisoned".into()))
}

/// In-memory store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Physical insert calls made so far, transactions included.
    pub fn insert_calls(&self) -> usize {
        self.shared.insert_calls.load(Ordering::SeqCst)
    }

    /// Transactions begun so far.
    pub fn transactions_begun(&self) -> usize {
        self.shared.transactions.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.shared.insert_calls.store(0, Ordering::SeqCst);
        self.shared.transactions.store(0, Ordering::SeqCst);
    }

    /// Committed rows of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> StoreResult<Vec<Record>> {
        let tables = lock(&self.shared.tables)?;
        tables
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| StoreError::MissingTable(table.to_string()))
    }

    /// Queue the result of the next `raw_query` call.
    pub fn expect_raw_query(&self, result: StoreResult<Vec<Record>>) -> StoreResult<()> {
        lock(&self.shared.scripts)?.queries.push_back(result);
        Ok(())
    }

    /// Queue the result of the next `raw_exec` call.
    pub fn expect_raw_exec(&self, result: StoreResult<ExecResult>) -> StoreResult<()> {
        lock(&self.shared.scripts)?.execs.push_back(result);
        Ok(())
    }

    /// Raw statements received so far.
    pub fn raw_log(&self) -> StoreResult<Vec<RawCall>> {
        Ok(lock(&self.shared.scripts)?.log.clone())
    }

    fn with_tables<R>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<R>) -> StoreResult<R> {
        let mut tables = lock(&self.shared.tables)?;
        f(&mut tables)
    }
}

#[derive(Debug)]
struct TxState {
    working: Tables,
    savepoints: Vec<(String, Tables)>,
    closed: bool,
}

/// A transaction opened by [`MemoryStore::begin`].
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    state: Mutex<TxState>,
}

impl MemoryTransaction {
    fn with_tables<R>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<R>) -> StoreResult<R> {
        let mut state = lock(&self.state)?;
        if state.closed {
            return Err(StoreError::TransactionClosed);
        }
        f(&mut state.working)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut TxState) -> StoreResult<R>) -> StoreResult<R> {
        let mut state = lock(&self.state)?;
        if state.closed {
            return Err(StoreError::TransactionClosed);
        }
        f(&mut state)
    }
}

fn table_ref<'t>(tables: &'t Tables, name: &str) -> StoreResult<&'t Table> {
    tables.get(name).ok_or_else(|| StoreError::MissingTable(name.to_string()))
}

fn table_mut<'t>(tables: &'t mut Tables, name: &str) -> StoreResult<&'t mut Table> {
    tables
        .get_mut(name)
        .ok_or_else(|| StoreError::MissingTable(name.to_string()))
}

fn check_supported(query: &CompiledQuery) -> StoreResult<()> {
    if !query.joins.is_empty() {
        return Err(StoreError::Unsupported("joins".into()));
    }
    if !query.groups.is_empty() || !query.having.is_empty() {
        return Err(StoreError::Unsupported("GROUP BY / HAVING".into()));
    }
    Ok(())
}

fn select_rows(tables: &Tables, name: &str, query: &CompiledQuery) -> StoreResult<Vec<Record>> {
    check_supported(query)?;
    let table = table_ref(tables, name)?;

    let mut rows = Vec::new();
    for row in &table.rows {
        if eval::matches_all(&query.filters, row)? {
            rows.push(row.clone());
        }
    }
    eval::sort(&mut rows, &query.orders)?;
    let mut rows = eval::project(rows, query)?;
    if query.distinct {
        rows = eval::dedup(rows);
    }
    Ok(eval::page(rows, query.offset, query.limit))
}

fn count_rows(tables: &Tables, name: &str, query: &CompiledQuery) -> StoreResult<u64> {
    let mut unpaged = query.clone();
    unpaged.orders.clear();
    unpaged.limit = None;
    unpaged.offset = None;
    Ok(select_rows(tables, name, &unpaged)?.len() as u64)
}

/// Column sets that must be unique, with a label for the violation message.
fn unique_keys(table: &Table) -> Vec<Vec<String>> {
    let mut keys: Vec<Vec<String>> = Vec::new();
    let pk: Vec<String> = table
        .fields
        .iter()
        .filter(|f| f.primary_key)
        .map(|f| f.column.clone())
        .collect();
    if !pk.is_empty() {
        keys.push(pk);
    }
    for field in table.fields.iter().filter(|f| f.unique && !f.primary_key) {
        keys.push(vec![field.column.clone()]);
    }
    for index in table.indexes.iter().filter(|i| i.unique) {
        keys.push(index.columns.clone());
    }
    keys
}

fn check_unique(table_name: &str, rows: &[Record], keys: &[Vec<String>]) -> StoreResult<()> {
    for key in keys {
        let mut seen: Vec<Vec<&Value>> = Vec::with_capacity(rows.len());
        for row in rows {
            let values: Vec<&Value> = key.iter().map(|c| row.get(c).unwrap_or(&Value::Null)).collect();
            if values.iter().any(|v| v.is_null()) {
                continue;
            }
            if seen.contains(&values) {
                return Err(StoreError::UniqueViolation(format!("{table_name}.{}", key.join(","))));
            }
            seen.push(values);
        }
    }
    Ok(())
}

fn check_columns<'a>(table: &Table, columns: impl IntoIterator<Item = &'a str>) -> StoreResult<()> {
    if table.fields.is_empty() {
        return Ok(());
    }
    for column in columns {
        if !table.fields.iter().any(|f| f.column == column) {
            return Err(StoreError::Other(format!("column \"{column}\" does not exist")));
        }
    }
    Ok(())
}

fn insert_rows(tables: &mut Tables, name: &str, rows: &[Record], returning: &[String]) -> StoreResult<Vec<Record>> {
    let table = table_mut(tables, name)?;
    let mut staged = table.rows.clone();
    let mut next_id = table.next_id;
    let mut inserted = Vec::with_capacity(rows.len());

    for row in rows {
        check_columns(table, row.columns().iter().map(String::as_str))?;
        let mut full = Record::with_capacity(table.fields.len().max(row.len()));
        for field in &table.fields {
            let mut value = row.get(&field.column).cloned().unwrap_or_default();
            if field.auto_increment && value.is_unset_key() {
                next_id += 1;
                value = Value::Int(next_id);
            } else if field.auto_increment {
                if let Value::Int(explicit) = value {
                    next_id = next_id.max(explicit);
                }
            }
            if value.is_null() && !field.nullable {
                return Err(StoreError::Other(format!(
                    "null value in column \"{}\" violates not-null constraint",
                    field.column
                )));
            }
            full.set(field.column.clone(), value);
        }
        for (column, value) in row.iter() {
            if !full.contains(column) {
                full.set(column, value.clone());
            }
        }
        inserted.push(full.clone());
        staged.push(full);
    }

    check_unique(name, &staged, &unique_keys(table))?;
    table.rows = staged;
    table.next_id = next_id;

    let returning: Vec<&str> = returning.iter().map(String::as_str).collect();
    Ok(inserted.iter().map(|r| r.project(&returning)).collect())
}

fn update_rows(tables: &mut Tables, name: &str, changes: &Record, filters: &[Predicate]) -> StoreResult<u64> {
    let table = table_mut(tables, name)?;
    check_columns(table, changes.columns().iter().map(String::as_str))?;
    let mut staged = table.rows.clone();
    let mut affected = 0;
    for row in staged.iter_mut() {
        if eval::matches_all(filters, row)? {
            for (column, value) in changes.iter() {
                row.set(column, value.clone());
            }
            affected += 1;
        }
    }
    check_unique(name, &staged, &unique_keys(table))?;
    table.rows = staged;
    Ok(affected)
}

fn delete_rows(tables: &mut Tables, name: &str, filters: &[Predicate]) -> StoreResult<u64> {
    let table = table_mut(tables, name)?;
    // A filter error must leave the table untouched.
    let doomed = table
        .rows
        .iter()
        .map(|row| eval::matches_all(filters, row))
        .collect::<StoreResult<Vec<bool>>>()?;
    let affected = doomed.iter().filter(|d| **d).count() as u64;
    let mut doomed = doomed.into_iter();
    table.rows.retain(|_| !doomed.next().unwrap_or(false));
    Ok(affected)
}

fn create_table(tables: &mut Tables, schema: &TableSchema) -> StoreResult<()> {
    if tables.contains_key(&schema.name) {
        return Err(StoreError::Other(format!("relation \"{}\" already exists", schema.name)));
    }
    tables.insert(
        schema.name.clone(),
        Table {
            fields: schema.fields.clone(),
            ..Table::default()
        },
    );
    Ok(())
}

fn migrate_table(tables: &mut Tables, schema: &TableSchema) -> StoreResult<()> {
    if !tables.contains_key(&schema.name) {
        return create_table(tables, schema);
    }
    let table = table_mut(tables, &schema.name)?;
    for field in &schema.fields {
        if table.fields.iter().any(|f| f.column == field.column) {
            continue;
        }
        for row in table.rows.iter_mut() {
            row.set(field.column.clone(), Value::Null);
        }
        table.fields.push(field.clone());
    }
    Ok(())
}

fn create_index(tables: &mut Tables, index: &IndexDef) -> StoreResult<()> {
    let table = table_mut(tables, &index.table)?;
    if table.indexes.iter().any(|i| i.name == index.name) {
        return Err(StoreError::Other(format!("relation \"{}\" already exists", index.name)));
    }
    check_columns(table, index.columns.iter().map(String::as_str))?;
    if index.unique {
        check_unique(&index.table, &table.rows, std::slice::from_ref(&index.columns))?;
    }
    table.indexes.push(index.clone());
    Ok(())
}

fn take_script<T>(
    shared: &Shared,
    sql: &str,
    args: &[Value],
    pick: impl FnOnce(&mut Scripts) -> Option<StoreResult<T>>,
) -> StoreResult<T> {
    let mut scripts = lock(&shared.scripts)?;
    scripts.log.push(RawCall {
        sql: sql.to_string(),
        args: args.to_vec(),
    });
    pick(&mut scripts).unwrap_or_else(|| {
        Err(StoreError::Unsupported(format!(
            "raw SQL without a scripted response: {sql}"
        )))
    })
}

/// Implements [`Executor`] for a type exposing `with_tables` and `shared`.
macro_rules! memory_executor {
    ($ty:ty) => {
        #[async_trait]
        impl Executor for $ty {
            async fn select(&self, table: &str, query: &CompiledQuery) -> StoreResult<Vec<Record>> {
                self.with_tables(|t| select_rows(t, table, query))
            }

            async fn count(&self, table: &str, query: &CompiledQuery) -> StoreResult<u64> {
                self.with_tables(|t| count_rows(t, table, query))
            }

            async fn insert(&self, table: &str, rows: &[Record], returning: &[String]) -> StoreResult<Vec<Record>> {
                self.shared.insert_calls.fetch_add(1, Ordering::SeqCst);
                self.with_tables(|t| insert_rows(t, table, rows, returning))
            }

            async fn update(&self, table: &str, changes: &Record, filters: &[Predicate]) -> StoreResult<u64> {
                self.with_tables(|t| update_rows(t, table, changes, filters))
            }

            async fn delete(&self, table: &str, filters: &[Predicate]) -> StoreResult<u64> {
                self.with_tables(|t| delete_rows(t, table, filters))
            }

            async fn raw_query(&self, sql: &str, args: &[Value]) -> StoreResult<Vec<Record>> {
                self.with_tables(|_| Ok(()))?;
                take_script(&self.shared, sql, args, |s| s.queries.pop_front())
            }

            async fn raw_exec(&self, sql: &str, args: &[Value]) -> StoreResult<ExecResult> {
                self.with_tables(|_| Ok(()))?;
                take_script(&self.shared, sql, args, |s| s.execs.pop_front())
            }

            async fn has_table(&self, table: &str) -> StoreResult<bool> {
                self.with_tables(|t| Ok(t.contains_key(table)))
            }

            async fn create_table(&self, schema: &TableSchema) -> StoreResult<()> {
                self.with_tables(|t| create_table(t, schema))
            }

            async fn drop_table(&self, table: &str) -> StoreResult<()> {
                self.with_tables(|t| {
                    t.remove(table);
                    Ok(())
                })
            }

            async fn migrate_table(&self, schema: &TableSchema) -> StoreResult<()> {
                self.with_tables(|t| migrate_table(t, schema))
            }

            async fn table_columns(&self, table: &str) -> StoreResult<Vec<String>> {
                self.with_tables(|t| {
                    Ok(table_ref(t, table)?.fields.iter().map(|f| f.column.clone()).collect())
                })
            }

            async fn has_index(&self, table: &str, name: &str) -> StoreResult<bool> {
                self.with_tables(|t| Ok(t.get(table).is_some_and(|tb| tb.indexes.iter().any(|i| i.name == name))))
            }

            async fn create_index(&self, index: &IndexDef) -> StoreResult<()> {
                self.with_tables(|t| create_index(t, index))
            }

            async fn drop_index(&self, table: &str, name: &str) -> StoreResult<()> {
                self.with_tables(|t| {
                    if let Some(tb) = t.get_mut(table) {
                        tb.indexes.retain(|i| i.name != name);
                    }
                    Ok(())
                })
            }

            async fn ping(&self) -> StoreResult<()> {
                self.with_tables(|_| Ok(()))
            }
        }
    };
}

memory_executor!(MemoryStore);
memory_executor!(MemoryTransaction);

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self, _options: TxOptions) -> StoreResult<Arc<dyn StoreTransaction>> {
        let snapshot = lock(&self.shared.tables)?.clone();
        self.shared.transactions.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            state: Mutex::new(TxState {
                working: snapshot,
                savepoints: Vec::new(),
                closed: false,
            }),
        }))
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn commit(&self) -> StoreResult<()> {
        self.with_state(|state| {
            let mut committed = lock(&self.shared.tables)?;
            *committed = std::mem::take(&mut state.working);
            state.savepoints.clear();
            state.closed = true;
            Ok(())
        })
    }

    async fn rollback(&self) -> StoreResult<()> {
        self.with_state(|state| {
            state.working.clear();
            state.savepoints.clear();
            state.closed = true;
            Ok(())
        })
    }

    async fn savepoint(&self, name: &str) -> StoreResult<()> {
        self.with_state(|state| {
            let snapshot = state.working.clone();
            state.savepoints.push((name.to_string(), snapshot));
            Ok(())
        })
    }

    async fn rollback_to_savepoint(&self, name: &str) -> StoreResult<()> {
        self.with_state(|state| {
            let idx = find_savepoint(&state.savepoints, name)?;
            state.savepoints.truncate(idx + 1);
            state.working = state.savepoints[idx].1.clone();
            Ok(())
        })
    }

    async fn release_savepoint(&self, name: &str) -> StoreResult<()> {
        self.with_state(|state| {
            let idx = find_savepoint(&state.savepoints, name)?;
            state.savepoints.truncate(idx);
            Ok(())
        })
    }
}

fn find_savepoint(savepoints: &[(String, Tables)], name: &str) -> StoreResult<usize> {
    savepoints
        .iter()
        .rposition(|(n, _)| n == name)
        .ok_or_else(|| StoreError::Other(format!("savepoint \"{name}\" does not exist")))
}

#[cfg(test)]
mod tests;
