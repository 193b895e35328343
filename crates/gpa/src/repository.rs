//! The generic repository.
//!
//! [`Repository<T>`] compiles query options, runs them on a [`Store`] (or on an
//! open transaction), classifies every store error and drives the entity's
//! lifecycle hooks.
//!
//! ```ignore
//! use gpa::prelude::*;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let users: Repository<User> = Repository::new(store);
//! users.create_table().await?;
//!
//! let mut alice = User { id: 0, name: "alice".into(), age: 30 };
//! users.create(&mut alice).await?;          // alice.id is now set
//!
//! let adults = users
//!     .query([filter("age", Operator::GreaterThanOrEqual, 18), order_by("age", Direction::Asc)])
//!     .await?;
//! ```

use crate::compile::{CompiledQuery, Predicate, compile, lower_where};
use crate::condition::{Condition, Operator};
use crate::entity::{Entity, EntityInfo, MigrationStatus, TableInfo};
use crate::error::{ErrorKind, OrmError, OrmResult, classify};
use crate::hooks::{HookError, HookObserver, HookPoint, TracingHookObserver};
use crate::ident::Ident;
use crate::query::{QueryOption, preload};
use crate::record::Record;
use crate::store::{ExecResult, Executor, IndexDef, Store, StoreTransaction, TableSchema};
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Rows per physical write in [`Repository::create_batch`].
pub const BATCH_SIZE: usize = 100;

#[derive(Clone)]
pub(crate) enum Conn {
    Store(Arc<dyn Store>),
    Tx(Arc<dyn StoreTransaction>),
}

impl Conn {
    pub(crate) fn executor(&self) -> &dyn Executor {
        match self {
            Conn::Store(store) => store.as_ref(),
            Conn::Tx(tx) => tx.as_ref(),
        }
    }
}

/// Data access for one entity type.
///
/// Holds only shared handles; clone it freely.
pub struct Repository<T: Entity> {
    pub(crate) conn: Conn,
    pub(crate) observer: Arc<dyn HookObserver>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            observer: Arc::clone(&self.observer),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match self.conn {
            Conn::Store(_) => "store",
            Conn::Tx(_) => "transaction",
        };
        f.debug_struct("Repository")
            .field("entity", &std::any::type_name::<T>())
            .field("scope", &scope)
            .finish()
    }
}

impl<T: Entity> Repository<T> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            conn: Conn::Store(store),
            observer: Arc::new(TracingHookObserver),
            _entity: PhantomData,
        }
    }

    pub(crate) fn from_conn(conn: Conn, observer: Arc<dyn HookObserver>) -> Self {
        Self {
            conn,
            observer,
            _entity: PhantomData,
        }
    }

    /// Replace the observer that receives swallowed after-hook failures.
    pub fn with_observer(mut self, observer: Arc<dyn HookObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// A repository for another entity on the same store or transaction.
    pub fn for_entity<U: Entity>(&self) -> Repository<U> {
        Repository::from_conn(self.conn.clone(), Arc::clone(&self.observer))
    }

    /// Whether this repository is bound to an open transaction.
    pub fn in_transaction(&self) -> bool {
        matches!(self.conn, Conn::Tx(_))
    }

    fn exec(&self) -> &dyn Executor {
        self.conn.executor()
    }

    // ==================== Hooks ====================

    fn abort(point: HookPoint, error: HookError) -> OrmError {
        OrmError::with_cause(ErrorKind::Validation, format!("{point} hook failed: {error}"), error)
    }

    fn observe(&self, info: &EntityInfo, point: HookPoint, result: Result<(), HookError>) {
        if let Err(error) = result {
            self.observer.hook_failed(&info.name, point, &error);
        }
    }

    fn validate(entity: &T) -> OrmResult<()> {
        match entity.validate_hook() {
            Some(hook) => hook.validate().map_err(|e| Self::abort(HookPoint::Validate, e)),
            None => Ok(()),
        }
    }

    fn before_create(entity: &mut T) -> OrmResult<()> {
        match entity.before_create_hook() {
            Some(hook) => hook.before_create().map_err(|e| Self::abort(HookPoint::BeforeCreate, e)),
            None => Ok(()),
        }
    }

    fn after_create(&self, info: &EntityInfo, entity: &mut T) {
        if let Some(hook) = entity.after_create_hook() {
            self.observe(info, HookPoint::AfterCreate, hook.after_create());
        }
    }

    fn after_find(&self, info: &EntityInfo, entity: &mut T) {
        if let Some(hook) = entity.after_find_hook() {
            self.observe(info, HookPoint::AfterFind, hook.after_find());
        }
    }

    // ==================== Helpers ====================

    fn pk_filter(info: &EntityInfo, id: Value) -> OrmResult<Vec<Predicate>> {
        let pk = info.require_primary_key()?;
        if id.is_null() {
            return Err(OrmError::validation("primary key value is null"));
        }
        Ok(vec![Predicate::compare(Ident::parse(&pk.column)?, Operator::Equal, id)])
    }

    /// Drop auto-increment columns that still hold an unset key so the store
    /// generates them.
    fn insertable(info: &EntityInfo, entity: &T) -> Record {
        let mut record = entity.to_record();
        for field in info.fields.iter().filter(|f| f.auto_increment) {
            if record.get(&field.column).is_some_and(Value::is_unset_key) {
                record.remove(&field.column);
            }
        }
        record
    }

    fn decode(rows: Vec<Record>) -> OrmResult<Vec<T>> {
        rows.iter()
            .map(|row| T::from_record(row).map_err(classify))
            .collect()
    }

    fn schema(info: &EntityInfo) -> TableSchema {
        TableSchema {
            name: info.table.clone(),
            fields: info.fields.clone(),
        }
    }

    // ==================== CRUD ====================

    /// Insert one entity. Generated columns are written back onto it.
    pub async fn create(&self, entity: &mut T) -> OrmResult<()> {
        let info = T::entity_info();
        Self::validate(entity)?;
        Self::before_create(entity)?;

        let record = Self::insertable(&info, entity);
        let returning = info.generated_columns();
        debug!(target: "gpa.repository", entity = %info.name, op = "create", "insert");
        let rows = self
            .exec()
            .insert(&info.table, std::slice::from_ref(&record), &returning)
            .await
            .map_err(classify)?;
        if let Some(row) = rows.first() {
            entity.apply_record(row).map_err(classify)?;
        }

        self.after_create(&info, entity);
        Ok(())
    }

    /// Insert many entities, [`BATCH_SIZE`] rows per physical write.
    ///
    /// Every entity is validated, then every `BeforeCreate` hook runs, before
    /// anything is written. When more than one write is needed and the
    /// repository is not already in a transaction, the writes share one.
    pub async fn create_batch(&self, entities: &mut [T]) -> OrmResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let info = T::entity_info();
        for entity in entities.iter() {
            Self::validate(entity)?;
        }
        for entity in entities.iter_mut() {
            Self::before_create(entity)?;
        }

        debug!(
            target: "gpa.repository",
            entity = %info.name,
            op = "create_batch",
            rows = entities.len(),
            writes = entities.len().div_ceil(BATCH_SIZE),
            "insert batch"
        );

        match &self.conn {
            Conn::Store(store) if entities.len() > BATCH_SIZE => {
                let tx = store.begin(Default::default()).await.map_err(classify)?;
                let result = Self::write_batches(tx.as_ref(), &info, entities).await;
                match result {
                    Ok(()) => tx.commit().await.map_err(classify)?,
                    Err(error) => {
                        if let Err(rollback) = tx.rollback().await {
                            tracing::warn!(target: "gpa.repository", error = %rollback, "batch rollback failed");
                        }
                        return Err(error);
                    }
                }
            }
            conn => Self::write_batches(conn.executor(), &info, entities).await?,
        }

        for entity in entities.iter_mut() {
            self.after_create(&info, entity);
        }
        Ok(())
    }

    async fn write_batches(exec: &dyn Executor, info: &EntityInfo, entities: &mut [T]) -> OrmResult<()> {
        let returning = info.generated_columns();
        for chunk in entities.chunks_mut(BATCH_SIZE) {
            let records: Vec<Record> = chunk.iter().map(|e| Self::insertable(info, e)).collect();
            let rows = exec
                .insert(&info.table, &records, &returning)
                .await
                .map_err(classify)?;
            for (entity, row) in chunk.iter_mut().zip(&rows) {
                entity.apply_record(row).map_err(classify)?;
            }
        }
        Ok(())
    }

    pub async fn find_by_id(&self, id: impl Into<Value>) -> OrmResult<T> {
        let info = T::entity_info();
        let query = CompiledQuery::filtered(Self::pk_filter(&info, id.into())?);
        debug!(target: "gpa.repository", entity = %info.name, op = "find_by_id", "select");
        let row = self
            .exec()
            .fetch_one(&info.table, &query)
            .await
            .map_err(classify)?;
        let mut entity = T::from_record(&row).map_err(classify)?;
        self.after_find(&info, &mut entity);
        Ok(entity)
    }

    /// Every row, shaped by `options` (ordering, paging, preloads, ...).
    pub async fn find_all(&self, options: impl IntoIterator<Item = QueryOption>) -> OrmResult<Vec<T>> {
        self.query(options).await
    }

    /// Save every column of `entity`, matched by primary key.
    pub async fn update(&self, entity: &mut T) -> OrmResult<()> {
        let info = T::entity_info();
        Self::validate(entity)?;
        if let Some(hook) = entity.before_update_hook() {
            hook.before_update()
                .map_err(|e| Self::abort(HookPoint::BeforeUpdate, e))?;
        }

        let pk = info.require_primary_key()?;
        let filters = Self::pk_filter(&info, entity.primary_key_value())?;
        let mut changes = entity.to_record();
        changes.remove(&pk.column);

        debug!(target: "gpa.repository", entity = %info.name, op = "update", "update");
        let affected = self
            .exec()
            .update(&info.table, &changes, &filters)
            .await
            .map_err(classify)?;
        if affected == 0 {
            return Err(OrmError::not_found(format!("{} not found", info.name)));
        }

        if let Some(hook) = entity.after_update_hook() {
            self.observe(&info, HookPoint::AfterUpdate, hook.after_update());
        }
        Ok(())
    }

    /// Set only the given fields on the row with primary key `id`.
    ///
    /// Keys may be field or column names. No hooks run.
    pub async fn update_partial(&self, id: impl Into<Value>, changes: Record) -> OrmResult<()> {
        let info = T::entity_info();
        if changes.is_empty() {
            return Err(OrmError::validation("no fields to update"));
        }
        let mut resolved = Record::with_capacity(changes.len());
        for (name, value) in changes {
            let field = info
                .resolve(&name)
                .ok_or_else(|| OrmError::validation(format!("unknown field: {name}")))?;
            resolved.set(field.column.clone(), value);
        }

        let filters = Self::pk_filter(&info, id.into())?;
        debug!(target: "gpa.repository", entity = %info.name, op = "update_partial", fields = resolved.len(), "update");
        let affected = self
            .exec()
            .update(&info.table, &resolved, &filters)
            .await
            .map_err(classify)?;
        if affected == 0 {
            return Err(OrmError::not_found(format!("{} not found", info.name)));
        }
        Ok(())
    }

    /// Delete the row with primary key `id`.
    pub async fn delete(&self, id: impl Into<Value>) -> OrmResult<()> {
        let info = T::entity_info();
        let filters = Self::pk_filter(&info, id.into())?;
        let query = CompiledQuery::filtered(filters.clone());
        let row = self
            .exec()
            .fetch_one(&info.table, &query)
            .await
            .map_err(classify)?;
        let entity = T::from_record(&row).map_err(classify)?;

        if let Some(hook) = entity.before_delete_hook() {
            hook.before_delete()
                .map_err(|e| Self::abort(HookPoint::BeforeDelete, e))?;
        }

        debug!(target: "gpa.repository", entity = %info.name, op = "delete", "delete");
        let affected = self
            .exec()
            .delete(&info.table, &filters)
            .await
            .map_err(classify)?;
        if affected == 0 {
            return Err(OrmError::not_found(format!("{} not found", info.name)));
        }

        if let Some(hook) = entity.after_delete_hook() {
            self.observe(&info, HookPoint::AfterDelete, hook.after_delete());
        }
        Ok(())
    }

    /// Delete every row matching `condition`. No hooks run.
    ///
    /// A condition that places no restriction, such as `Condition::and([])`,
    /// is rejected rather than emptying the table.
    pub async fn delete_by_condition(&self, condition: Condition) -> OrmResult<u64> {
        let info = T::entity_info();
        let predicate = lower_where(&condition)?;
        if predicate.is_unconditional() {
            return Err(OrmError::validation("delete without a restricting condition"));
        }
        debug!(target: "gpa.repository", entity = %info.name, op = "delete_by_condition", "delete");
        self.exec()
            .delete(&info.table, std::slice::from_ref(&predicate))
            .await
            .map_err(classify)
    }

    // ==================== Queries ====================

    pub async fn query(&self, options: impl IntoIterator<Item = QueryOption>) -> OrmResult<Vec<T>> {
        let info = T::entity_info();
        let compiled = compile(options)?;
        debug!(target: "gpa.repository", entity = %info.name, op = "query", filters = compiled.filters.len(), "select");
        let rows = self
            .exec()
            .select(&info.table, &compiled)
            .await
            .map_err(classify)?;
        let mut entities = Self::decode(rows)?;
        self.load_relations(&mut entities, &compiled.preloads).await?;
        for entity in entities.iter_mut() {
            self.after_find(&info, entity);
        }
        Ok(entities)
    }

    /// First row of the query, or `NotFound`.
    pub async fn query_one(&self, options: impl IntoIterator<Item = QueryOption>) -> OrmResult<T> {
        let info = T::entity_info();
        let compiled = compile(options)?;
        debug!(target: "gpa.repository", entity = %info.name, op = "query_one", "select");
        let row = self
            .exec()
            .fetch_one(&info.table, &compiled)
            .await
            .map_err(classify)?;
        let mut entities = vec![T::from_record(&row).map_err(classify)?];
        self.load_relations(&mut entities, &compiled.preloads).await?;
        let mut entity = entities.remove(0);
        self.after_find(&info, &mut entity);
        Ok(entity)
    }

    pub async fn count(&self, options: impl IntoIterator<Item = QueryOption>) -> OrmResult<u64> {
        let info = T::entity_info();
        let compiled = compile(options)?;
        self.exec()
            .count(&info.table, &compiled)
            .await
            .map_err(classify)
    }

    /// `count(options) > 0`.
    pub async fn exists(&self, options: impl IntoIterator<Item = QueryOption>) -> OrmResult<bool> {
        Ok(self.count(options).await? > 0)
    }

    /// Query with the named relations eager-loaded.
    pub async fn find_with_relations(
        &self,
        relations: &[&str],
        options: impl IntoIterator<Item = QueryOption>,
    ) -> OrmResult<Vec<T>> {
        let mut all: Vec<QueryOption> = relations.iter().map(|r| preload(*r)).collect();
        all.extend(options);
        self.query(all).await
    }

    pub async fn find_by_id_with_relations(&self, id: impl Into<Value>, relations: &[&str]) -> OrmResult<T> {
        let info = T::entity_info();
        let query = CompiledQuery::filtered(Self::pk_filter(&info, id.into())?);
        let row = self
            .exec()
            .fetch_one(&info.table, &query)
            .await
            .map_err(classify)?;
        let mut entities = vec![T::from_record(&row).map_err(classify)?];
        let names: Vec<String> = relations.iter().map(|r| r.to_string()).collect();
        self.load_relations(&mut entities, &names).await?;
        let mut entity = entities.remove(0);
        self.after_find(&info, &mut entity);
        Ok(entity)
    }

    /// One select per relation, matched back onto each entity.
    async fn load_relations(&self, entities: &mut [T], names: &[String]) -> OrmResult<()> {
        if names.is_empty() {
            return Ok(());
        }
        let relations = T::relations();
        for name in names {
            let relation = relations
                .iter()
                .find(|r| r.name == *name)
                .ok_or_else(|| OrmError::validation(format!("unknown relation: {name}")))?;
            if entities.is_empty() {
                continue;
            }

            let keys: Vec<Value> = entities
                .iter()
                .map(|e| e.to_record().get(relation.parent_column()).cloned().unwrap_or_default())
                .collect();
            let mut wanted: Vec<Value> = Vec::new();
            for key in keys.iter().filter(|k| !k.is_null()) {
                if !wanted.contains(key) {
                    wanted.push(key.clone());
                }
            }

            let rows = if wanted.is_empty() {
                Vec::new()
            } else {
                let related = Ident::parse(relation.related_column())?;
                let query = CompiledQuery::filtered(vec![Predicate::compare(related, Operator::In, wanted)]);
                self.exec()
                    .select(&relation.table, &query)
                    .await
                    .map_err(classify)?
            };

            for (entity, key) in entities.iter_mut().zip(&keys) {
                let matched: Vec<Record> = rows
                    .iter()
                    .filter(|row| {
                        row.get(relation.related_column())
                            .is_some_and(|v| v.sql_cmp(key) == Some(Ordering::Equal))
                    })
                    .cloned()
                    .collect();
                entity.attach(&relation.name, matched)?;
            }
        }
        Ok(())
    }

    // ==================== Raw SQL ====================

    /// Run a raw query and decode the rows. No hooks run.
    pub async fn raw_query(&self, sql: &str, args: &[Value]) -> OrmResult<Vec<T>> {
        let info = T::entity_info();
        debug!(target: "gpa.repository", entity = %info.name, op = "raw_query", "raw");
        let rows = self.exec().raw_query(sql, args).await.map_err(classify)?;
        Self::decode(rows)
    }

    pub async fn raw_exec(&self, sql: &str, args: &[Value]) -> OrmResult<ExecResult> {
        debug!(target: "gpa.repository", op = "raw_exec", "raw");
        self.exec().raw_exec(sql, args).await.map_err(classify)
    }

    // ==================== Schema ====================

    pub fn entity_info(&self) -> EntityInfo {
        T::entity_info()
    }

    /// Create the entity's table; `Duplicate` if it already exists.
    pub async fn create_table(&self) -> OrmResult<()> {
        let info = T::entity_info();
        if self.exec().has_table(&info.table).await.map_err(classify)? {
            return Err(OrmError::duplicate(format!("table already exists: {}", info.table)));
        }
        self.exec()
            .create_table(&Self::schema(&info))
            .await
            .map_err(classify)
    }

    pub async fn drop_table(&self) -> OrmResult<()> {
        let info = T::entity_info();
        self.exec().drop_table(&info.table).await.map_err(classify)
    }

    /// Create the table, or add the columns it is missing.
    pub async fn migrate_table(&self) -> OrmResult<()> {
        let info = T::entity_info();
        self.exec()
            .migrate_table(&Self::schema(&info))
            .await
            .map_err(classify)
    }

    /// Create an index named `idx_<table>_<col>_<col>...`.
    pub async fn create_index(&self, fields: &[&str], unique: bool) -> OrmResult<()> {
        let info = T::entity_info();
        if fields.is_empty() {
            return Err(OrmError::validation("index needs at least one field"));
        }
        let columns = fields
            .iter()
            .map(|f| {
                info.resolve(f)
                    .map(|field| field.column.clone())
                    .ok_or_else(|| OrmError::validation(format!("unknown field: {f}")))
            })
            .collect::<OrmResult<Vec<_>>>()?;
        let name = format!("idx_{}_{}", info.table, columns.join("_"));

        if self.exec().has_index(&info.table, &name).await.map_err(classify)? {
            return Err(OrmError::duplicate(format!("index already exists: {name}")));
        }
        let index = IndexDef {
            name,
            table: info.table.clone(),
            columns,
            unique,
        };
        self.exec().create_index(&index).await.map_err(classify)
    }

    pub async fn drop_index(&self, name: &str) -> OrmResult<()> {
        let info = T::entity_info();
        Ident::parse(name)?;
        self.exec()
            .drop_index(&info.table, name)
            .await
            .map_err(classify)
    }

    /// Table layout derived from the entity metadata.
    pub fn table_info(&self) -> TableInfo {
        T::entity_info().to_table_info()
    }

    /// Compare the entity with the live table.
    pub async fn migration_status(&self) -> OrmResult<MigrationStatus> {
        let info = T::entity_info();
        let exists = self.exec().has_table(&info.table).await.map_err(classify)?;
        let pending_changes = if exists {
            let live = self
                .exec()
                .table_columns(&info.table)
                .await
                .map_err(classify)?;
            info.fields
                .iter()
                .filter(|f| !live.contains(&f.column))
                .map(|f| format!("add column {}.{}", info.table, f.column))
                .collect()
        } else {
            vec![format!("create table {}", info.table)]
        };
        let needs_migration = !pending_changes.is_empty();
        Ok(MigrationStatus {
            table_exists: exists,
            current_version: if needs_migration { "outdated".into() } else { "current".into() },
            required_version: "current".into(),
            needs_migration,
            pending_changes,
        })
    }

    // ==================== Lifecycle ====================

    pub async fn health(&self) -> OrmResult<()> {
        self.exec().ping().await.map_err(classify)
    }

    /// No-op: the store's lifetime belongs to its owner.
    pub fn close(&self) -> OrmResult<()> {
        Ok(())
    }
}
