//! PostgreSQL store over a `deadpool-postgres` pool.
//!
//! Every statement is built from a [`CompiledQuery`] or validated predicates
//! and sent with `$n` placeholders. Rendered SQL is logged at `debug` under
//! the `gpa.sql` target, truncated to `max_sql_length` bytes.

use crate::compile::{CompiledQuery, Predicate};
use crate::config::Config;
use crate::error::{OrmError, OrmResult, StoreError, classify};
use crate::ident::Ident;
use crate::pool::create_pool;
use crate::record::Record;
use crate::sql::{Placeholder, Sql};
use crate::store::{ExecResult, Executor, IndexDef, Store, StoreResult, StoreTransaction, TableSchema, TxOptions};
use crate::value::Value;
use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDateTime, Utc};
use deadpool_postgres::{Object, Pool};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_postgres::{Client, Row};
use tracing::{debug, warn};
use uuid::Uuid;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

// ==================== Binding ====================

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*i).to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*f)?.to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            Value::Text(s) => match *ty {
                Type::UUID => s.parse::<Uuid>()?.to_sql(ty, out),
                Type::NUMERIC => s.parse::<Decimal>()?.to_sql(ty, out),
                _ => s.to_sql(ty, out),
            },
            Value::Bytes(b) => b.to_sql(ty, out),
            Value::Json(j) => j.to_sql(ty, out),
            Value::Timestamp(t) => match *ty {
                Type::TIMESTAMP => t.naive_utc().to_sql(ty, out),
                _ => t.to_sql(ty, out),
            },
            Value::Uuid(u) => u.to_sql(ty, out),
            Value::List(_) => Err("list values must be expanded before binding".into()),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn param_refs(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

// ==================== Decoding ====================

fn decode_column(row: &Row, idx: usize) -> StoreResult<Value> {
    let column = &row.columns()[idx];
    let fail = |e: tokio_postgres::Error| StoreError::decode(column.name(), e.to_string());

    let value: Value = match *column.type_() {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx).map_err(fail)?.into(),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx).map_err(fail)?.map(i64::from).into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx).map_err(fail)?.map(i64::from).into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx).map_err(fail)?.into(),
        Type::OID => row.try_get::<_, Option<u32>>(idx).map_err(fail)?.map(i64::from).into(),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx).map_err(fail)?.map(f64::from).into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx).map_err(fail)?.into(),
        Type::NUMERIC => match row.try_get::<_, Option<Decimal>>(idx).map_err(fail)? {
            Some(d) => Value::Float(
                d.to_f64()
                    .ok_or_else(|| StoreError::decode(column.name(), format!("numeric {d} out of range")))?,
            ),
            None => Value::Null,
        },
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            row.try_get::<_, Option<String>>(idx).map_err(fail)?.into()
        }
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .map_err(fail)?
            .map_or(Value::Null, Value::Bytes),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<serde_json::Value>>(idx).map_err(fail)?.into(),
        Type::TIMESTAMPTZ => row.try_get::<_, Option<DateTime<Utc>>>(idx).map_err(fail)?.into(),
        Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(idx).map_err(fail)?.into(),
        Type::UUID => row.try_get::<_, Option<Uuid>>(idx).map_err(fail)?.into(),
        ref other => {
            return Err(StoreError::decode(
                column.name(),
                format!("unsupported column type {other}; cast it in SQL"),
            ));
        }
    };
    Ok(value)
}

fn row_to_record(row: &Row) -> StoreResult<Record> {
    let mut record = Record::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        record.set(column.name(), decode_column(row, idx)?);
    }
    Ok(record)
}

// ==================== Statements ====================

/// SQL logging settings shared by a store and its transactions.
#[derive(Debug, Clone, Copy)]
struct SqlLog {
    max_sql_length: Option<usize>,
}

impl SqlLog {
    fn statement(&self, op: &'static str, sql: &str, param_count: usize) {
        let shown = match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        };
        debug!(target: "gpa.sql", op, param_count, sql = %shown);
    }
}

fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

fn ident(name: &str) -> StoreResult<String> {
    Ok(Ident::parse(name)?.to_sql())
}

async fn fetch(client: &Client, log: SqlLog, op: &'static str, sql: Sql) -> StoreResult<Vec<Record>> {
    let (text, params) = sql.build(Placeholder::Dollar);
    log.statement(op, &text, params.len());
    let rows = client.query(text.as_str(), &param_refs(&params)).await?;
    rows.iter().map(row_to_record).collect()
}

async fn execute(client: &Client, log: SqlLog, op: &'static str, sql: Sql) -> StoreResult<u64> {
    let (text, params) = sql.build(Placeholder::Dollar);
    log.statement(op, &text, params.len());
    Ok(client.execute(text.as_str(), &param_refs(&params)).await?)
}

async fn ddl(client: &Client, log: SqlLog, text: &str) -> StoreResult<()> {
    log.statement("ddl", text, 0);
    Ok(client.batch_execute(text).await?)
}

async fn select(client: &Client, log: SqlLog, table: &str, query: &CompiledQuery) -> StoreResult<Vec<Record>> {
    fetch(client, log, "select", query.to_select_sql(table)?).await
}

async fn count(client: &Client, log: SqlLog, table: &str, query: &CompiledQuery) -> StoreResult<u64> {
    let (text, params) = query.to_count_sql(table)?.build(Placeholder::Dollar);
    log.statement("count", &text, params.len());
    let row = client.query_one(text.as_str(), &param_refs(&params)).await?;
    let n: i64 = row.try_get(0)?;
    Ok(u64::try_from(n).unwrap_or(0))
}

fn insert_sql(table: &str, rows: &[Record], returning: &[String]) -> StoreResult<Sql> {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for name in row.columns() {
            if !columns.contains(&name.as_str()) {
                columns.push(name);
            }
        }
    }

    let mut sql = Sql::new("INSERT INTO ");
    sql.push(&ident(table)?);
    if columns.is_empty() {
        if rows.len() == 1 {
            sql.push(" DEFAULT VALUES");
        } else {
            sql.push(&format!(" SELECT FROM generate_series(1, {})", rows.len()));
        }
    } else {
        sql.push(" (");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.push(&ident(column)?);
        }
        sql.push(") VALUES ");
        for (r, row) in rows.iter().enumerate() {
            if r > 0 {
                sql.push(", ");
            }
            sql.push("(");
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    sql.push(", ");
                }
                match row.get(column) {
                    Some(value) => sql.push_bind(value.clone()),
                    None => sql.push("DEFAULT"),
                };
            }
            sql.push(")");
        }
    }

    if !returning.is_empty() {
        sql.push(" RETURNING ");
        for (i, column) in returning.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.push(&ident(column)?);
        }
    }
    Ok(sql)
}

async fn insert(
    client: &Client,
    log: SqlLog,
    table: &str,
    rows: &[Record],
    returning: &[String],
) -> StoreResult<Vec<Record>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let sql = insert_sql(table, rows, returning)?;
    if returning.is_empty() {
        execute(client, log, "insert", sql).await?;
        return Ok(vec![Record::new(); rows.len()]);
    }
    fetch(client, log, "insert", sql).await
}

fn update_sql(table: &str, changes: &Record, filters: &[Predicate]) -> StoreResult<Sql> {
    if changes.is_empty() {
        return Err(OrmError::validation("no columns to update").into());
    }
    let mut sql = Sql::new("UPDATE ");
    sql.push(&ident(table)?).push(" SET ");
    for (i, (column, value)) in changes.iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        sql.push(&ident(column)?).push(" = ").push_bind(value.clone());
    }
    CompiledQuery::push_where(&mut sql, filters);
    Ok(sql)
}

fn delete_sql(table: &str, filters: &[Predicate]) -> StoreResult<Sql> {
    let mut sql = Sql::new("DELETE FROM ");
    sql.push(&ident(table)?);
    CompiledQuery::push_where(&mut sql, filters);
    Ok(sql)
}

fn column_ddl(field: &crate::entity::FieldInfo, inline_pk: bool) -> StoreResult<String> {
    let mut out = format!("{} {}", ident(&field.column)?, field.sql_type());
    if field.primary_key && inline_pk {
        out.push_str(" PRIMARY KEY");
    } else if !field.nullable {
        out.push_str(" NOT NULL");
    }
    if field.unique && !field.primary_key {
        out.push_str(" UNIQUE");
    }
    if let Some(default) = &field.default {
        out.push_str(" DEFAULT ");
        out.push_str(default);
    }
    Ok(out)
}

fn create_table_sql(schema: &TableSchema) -> StoreResult<String> {
    let pk: Vec<&str> = schema
        .fields
        .iter()
        .filter(|f| f.primary_key)
        .map(|f| f.column.as_str())
        .collect();
    let inline_pk = pk.len() == 1;

    let mut parts = schema
        .fields
        .iter()
        .map(|f| column_ddl(f, inline_pk))
        .collect::<StoreResult<Vec<_>>>()?;
    if pk.len() > 1 {
        let cols = pk.iter().map(|c| ident(c)).collect::<StoreResult<Vec<_>>>()?;
        parts.push(format!("PRIMARY KEY ({})", cols.join(", ")));
    }
    Ok(format!("CREATE TABLE {} ({})", ident(&schema.name)?, parts.join(", ")))
}

async fn has_table(client: &Client, log: SqlLog, table: &str) -> StoreResult<bool> {
    let text = "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                WHERE table_schema = current_schema() AND table_name::text = $1)";
    log.statement("has_table", text, 1);
    let row = client.query_one(text, &[&table]).await?;
    Ok(row.try_get(0)?)
}

async fn table_columns(client: &Client, log: SqlLog, table: &str) -> StoreResult<Vec<String>> {
    let text = "SELECT column_name::text FROM information_schema.columns \
                WHERE table_schema = current_schema() AND table_name::text = $1 \
                ORDER BY ordinal_position";
    log.statement("table_columns", text, 1);
    let rows = client.query(text, &[&table]).await?;
    rows.iter()
        .map(|r| r.try_get::<_, String>(0).map_err(StoreError::from))
        .collect()
}

async fn migrate_table(client: &Client, log: SqlLog, schema: &TableSchema) -> StoreResult<()> {
    if !has_table(client, log, &schema.name).await? {
        return ddl(client, log, &create_table_sql(schema)?).await;
    }
    let live = table_columns(client, log, &schema.name).await?;
    let table = ident(&schema.name)?;
    for field in schema.fields.iter().filter(|f| !live.contains(&f.column)) {
        // A new column cannot be NOT NULL without a default on a populated table.
        let mut added = field.clone();
        if added.default.is_none() {
            added.nullable = true;
        }
        let text = format!("ALTER TABLE {table} ADD COLUMN IF NOT EXISTS {}", column_ddl(&added, false)?);
        ddl(client, log, &text).await?;
    }
    Ok(())
}

async fn has_index(client: &Client, log: SqlLog, table: &str, name: &str) -> StoreResult<bool> {
    let text = "SELECT EXISTS (SELECT 1 FROM pg_indexes \
                WHERE schemaname = current_schema() AND tablename::text = $1 AND indexname::text = $2)";
    log.statement("has_index", text, 2);
    let row = client.query_one(text, &[&table, &name]).await?;
    Ok(row.try_get(0)?)
}

fn create_index_sql(index: &IndexDef) -> StoreResult<String> {
    let cols = index
        .columns
        .iter()
        .map(|c| ident(c))
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        ident(&index.name)?,
        ident(&index.table)?,
        cols.join(", ")
    ))
}

async fn raw_query(client: &Client, log: SqlLog, sql: &str, args: &[Value]) -> StoreResult<Vec<Record>> {
    log.statement("raw_query", sql, args.len());
    let rows = client.query(sql, &param_refs(args)).await?;
    rows.iter().map(row_to_record).collect()
}

async fn raw_exec(client: &Client, log: SqlLog, sql: &str, args: &[Value]) -> StoreResult<ExecResult> {
    log.statement("raw_exec", sql, args.len());
    let rows_affected = client.execute(sql, &param_refs(args)).await?;
    Ok(ExecResult {
        rows_affected,
        last_insert_id: None,
    })
}

/// Implements [`Executor`] for a type with `async fn client(&self)` and a
/// `log: SqlLog` field.
macro_rules! pg_executor {
    ($ty:ty) => {
        #[async_trait]
        impl Executor for $ty {
            async fn select(&self, table: &str, query: &CompiledQuery) -> StoreResult<Vec<Record>> {
                let client = self.client().await?;
                select(&client, self.log, table, query).await
            }

            async fn count(&self, table: &str, query: &CompiledQuery) -> StoreResult<u64> {
                let client = self.client().await?;
                count(&client, self.log, table, query).await
            }

            async fn insert(&self, table: &str, rows: &[Record], returning: &[String]) -> StoreResult<Vec<Record>> {
                let client = self.client().await?;
                insert(&client, self.log, table, rows, returning).await
            }

            async fn update(&self, table: &str, changes: &Record, filters: &[Predicate]) -> StoreResult<u64> {
                let sql = update_sql(table, changes, filters)?;
                let client = self.client().await?;
                execute(&client, self.log, "update", sql).await
            }

            async fn delete(&self, table: &str, filters: &[Predicate]) -> StoreResult<u64> {
                let sql = delete_sql(table, filters)?;
                let client = self.client().await?;
                execute(&client, self.log, "delete", sql).await
            }

            async fn raw_query(&self, sql: &str, args: &[Value]) -> StoreResult<Vec<Record>> {
                let client = self.client().await?;
                raw_query(&client, self.log, sql, args).await
            }

            async fn raw_exec(&self, sql: &str, args: &[Value]) -> StoreResult<ExecResult> {
                let client = self.client().await?;
                raw_exec(&client, self.log, sql, args).await
            }

            async fn has_table(&self, table: &str) -> StoreResult<bool> {
                let client = self.client().await?;
                has_table(&client, self.log, table).await
            }

            async fn create_table(&self, schema: &TableSchema) -> StoreResult<()> {
                let text = create_table_sql(schema)?;
                let client = self.client().await?;
                ddl(&client, self.log, &text).await
            }

            async fn drop_table(&self, table: &str) -> StoreResult<()> {
                let text = format!("DROP TABLE IF EXISTS {}", ident(table)?);
                let client = self.client().await?;
                ddl(&client, self.log, &text).await
            }

            async fn migrate_table(&self, schema: &TableSchema) -> StoreResult<()> {
                let client = self.client().await?;
                migrate_table(&client, self.log, schema).await
            }

            async fn table_columns(&self, table: &str) -> StoreResult<Vec<String>> {
                let client = self.client().await?;
                table_columns(&client, self.log, table).await
            }

            async fn has_index(&self, table: &str, name: &str) -> StoreResult<bool> {
                let client = self.client().await?;
                has_index(&client, self.log, table, name).await
            }

            async fn create_index(&self, index: &IndexDef) -> StoreResult<()> {
                let text = create_index_sql(index)?;
                let client = self.client().await?;
                ddl(&client, self.log, &text).await
            }

            async fn drop_index(&self, _table: &str, name: &str) -> StoreResult<()> {
                let text = format!("DROP INDEX IF EXISTS {}", ident(name)?);
                let client = self.client().await?;
                ddl(&client, self.log, &text).await
            }

            async fn ping(&self) -> StoreResult<()> {
                let client = self.client().await?;
                ddl(&client, self.log, "SELECT 1").await
            }
        }
    };
}

// ==================== Store ====================

/// A [`Store`] backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
    log: SqlLog,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("pool", &self.pool.status())
            .field("max_sql_length", &self.log.max_sql_length)
            .finish()
    }
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            log: SqlLog {
                max_sql_length: Some(200),
            },
        }
    }

    /// Build a pool from `config` and wrap it.
    pub fn connect(config: &Config) -> OrmResult<Self> {
        Ok(Self::new(create_pool(config)?))
    }

    /// Truncate logged SQL to `len` bytes.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.log.max_sql_length = Some(len);
        self
    }

    /// Log SQL in full.
    pub fn no_truncate(mut self) -> Self {
        self.log.max_sql_length = None;
        self
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Ping the database, failing after five seconds.
    pub async fn health(&self) -> OrmResult<()> {
        match tokio::time::timeout(HEALTH_TIMEOUT, self.ping()).await {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(OrmError::database("health check timed out")),
        }
    }

    async fn client(&self) -> StoreResult<Object> {
        Ok(self.pool.get().await?)
    }
}

pg_executor!(PgStore);

#[async_trait]
impl Store for PgStore {
    async fn begin(&self, options: TxOptions) -> StoreResult<Arc<dyn StoreTransaction>> {
        let client = self.client().await?;
        let begin = options.begin_sql();
        ddl(&client, self.log, &begin).await?;
        Ok(Arc::new(PgTransaction {
            client: Mutex::new(Some(client)),
            log: self.log,
        }))
    }
}

// ==================== Transaction ====================

/// An open transaction pinned to one pooled connection.
///
/// Dropped without commit or rollback, the connection is detached from the
/// pool and closed so the server discards the transaction.
pub struct PgTransaction {
    client: Mutex<Option<Object>>,
    log: SqlLog,
}

impl PgTransaction {
    async fn client(&self) -> StoreResult<MappedMutexGuard<'_, Object>> {
        MutexGuard::try_map(self.client.lock().await, Option::as_mut).map_err(|_| StoreError::TransactionClosed)
    }

    async fn finish(&self, statement: &str) -> StoreResult<()> {
        let client = self.client.lock().await.take().ok_or(StoreError::TransactionClosed)?;
        ddl(&client, self.log, statement).await
    }
}

pg_executor!(PgTransaction);

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn commit(&self) -> StoreResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(&self) -> StoreResult<()> {
        self.finish("ROLLBACK").await
    }

    async fn savepoint(&self, name: &str) -> StoreResult<()> {
        let text = format!("SAVEPOINT {}", ident(name)?);
        let client = self.client().await?;
        ddl(&client, self.log, &text).await
    }

    async fn rollback_to_savepoint(&self, name: &str) -> StoreResult<()> {
        let text = format!("ROLLBACK TO SAVEPOINT {}", ident(name)?);
        let client = self.client().await?;
        ddl(&client, self.log, &text).await
    }

    async fn release_savepoint(&self, name: &str) -> StoreResult<()> {
        let text = format!("RELEASE SAVEPOINT {}", ident(name)?);
        let client = self.client().await?;
        ddl(&client, self.log, &text).await
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if let Some(client) = self.client.get_mut().take() {
            warn!(target: "gpa.sql", "transaction dropped while open; closing its connection");
            drop(Object::take(client));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::condition::Operator;
    use crate::entity::FieldInfo;
    use crate::query::filter;

    #[test]
    fn insert_renders_one_multi_row_statement() {
        let rows = [
            Record::new().with("name", "a").with("age", 1),
            Record::new().with("name", "b"),
        ];
        let (sql, params) = insert_sql("users", &rows, &["id".into()])
            .unwrap()
            .build(Placeholder::Dollar);
        assert_eq!(
            sql,
            "INSERT INTO users (name, age) VALUES ($1, $2), ($3, DEFAULT) RETURNING id"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn insert_without_columns_uses_defaults() {
        let (sql, _) = insert_sql("t", &[Record::new()], &[]).unwrap().build(Placeholder::Dollar);
        assert_eq!(sql, "INSERT INTO t DEFAULT VALUES");
        let (sql, _) = insert_sql("t", &[Record::new(), Record::new()], &["id".into()])
            .unwrap()
            .build(Placeholder::Dollar);
        assert_eq!(sql, "INSERT INTO t SELECT FROM generate_series(1, 2) RETURNING id");
    }

    #[test]
    fn update_and_delete_reuse_where_rendering() {
        let q = compile([filter("id", Operator::Equal, 7)]).unwrap();
        let (sql, params) = update_sql("users", &Record::new().with("age", 31), &q.filters)
            .unwrap()
            .build(Placeholder::Dollar);
        assert_eq!(sql, "UPDATE users SET age = $1 WHERE id = $2");
        assert_eq!(params, vec![Value::Int(31), Value::Int(7)]);

        let (sql, _) = delete_sql("users", &q.filters).unwrap().build(Placeholder::Dollar);
        assert_eq!(sql, "DELETE FROM users WHERE id = $1");

        assert!(update_sql("users", &Record::new(), &q.filters).is_err());
    }

    #[test]
    fn create_table_ddl() {
        let schema = TableSchema {
            name: "users".into(),
            fields: vec![
                FieldInfo::of::<i64>("id").primary_key().auto_increment(),
                FieldInfo::of::<String>("email").unique().max_length(255),
                FieldInfo::of::<Option<i32>>("age"),
                FieldInfo::of::<bool>("active").default_value("true"),
            ],
        };
        assert_eq!(
            create_table_sql(&schema).unwrap(),
            "CREATE TABLE users (id BIGSERIAL PRIMARY KEY, email VARCHAR(255) NOT NULL UNIQUE, \
             age INTEGER, active BOOLEAN NOT NULL DEFAULT true)"
        );
    }

    #[test]
    fn index_ddl() {
        let index = IndexDef {
            name: "idx_users_email".into(),
            table: "users".into(),
            columns: vec!["email".into()],
            unique: true,
        };
        assert_eq!(
            create_index_sql(&index).unwrap(),
            "CREATE UNIQUE INDEX idx_users_email ON users (email)"
        );
    }

    #[test]
    fn invalid_table_is_rejected_as_validation() {
        let err = classify(delete_sql("users; DROP", &[]).unwrap_err());
        assert!(err.is_validation());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_sql_bytes("SELECT 'é'", 9), "SELECT '");
        assert_eq!(truncate_sql_bytes("SELECT 1", 50), "SELECT 1");
    }
}
