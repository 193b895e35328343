//! Entity reflection: the [`Entity`] trait and its metadata snapshots.
//!
//! `#[derive(Entity)]` implements the trait from struct attributes; it can
//! also be written by hand.

use crate::error::{OrmError, OrmResult, StoreError};
use crate::hooks::{
    AfterCreate, AfterDelete, AfterFind, AfterUpdate, BeforeCreate, BeforeDelete, BeforeUpdate, Validate,
};
use crate::record::Record;
use crate::value::Value;
use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

/// A persistable type bound to one table.
pub trait Entity: Sized + Send + Sync + 'static {
    /// Metadata describing the entity. Built fresh on every call.
    fn entity_info() -> EntityInfo;

    /// Every persisted column with its current value.
    fn to_record(&self) -> Record;

    /// Build an entity from a row. Columns missing from the row take their
    /// type's default.
    fn from_record(record: &Record) -> Result<Self, StoreError>;

    /// Copy store-generated columns (such as an auto-increment key) back
    /// onto the entity. Columns not present in `record` are left alone.
    fn apply_record(&mut self, record: &Record) -> Result<(), StoreError>;

    /// Value of the primary-key column, `Null` without one.
    fn primary_key_value(&self) -> Value {
        let info = Self::entity_info();
        info.primary_key()
            .and_then(|pk| self.to_record().get(&pk.column).cloned())
            .unwrap_or_default()
    }

    /// Relations available to `find_with_relations` and `preload`.
    fn relations() -> Vec<Relation> {
        Vec::new()
    }

    /// Store the rows loaded for `relation` on this entity.
    fn attach(&mut self, relation: &str, rows: Vec<Record>) -> OrmResult<()> {
        let _ = rows;
        Err(OrmError::validation(format!("unknown relation: {relation}")))
    }

    fn validate_hook(&self) -> Option<&dyn Validate> {
        None
    }

    fn before_create_hook(&mut self) -> Option<&mut dyn BeforeCreate> {
        None
    }

    fn after_create_hook(&mut self) -> Option<&mut dyn AfterCreate> {
        None
    }

    fn before_update_hook(&mut self) -> Option<&mut dyn BeforeUpdate> {
        None
    }

    fn after_update_hook(&mut self) -> Option<&mut dyn AfterUpdate> {
        None
    }

    fn before_delete_hook(&self) -> Option<&dyn BeforeDelete> {
        None
    }

    fn after_delete_hook(&self) -> Option<&dyn AfterDelete> {
        None
    }

    fn after_find_hook(&mut self) -> Option<&mut dyn AfterFind> {
        None
    }
}

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bool,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Text,
    Bytes,
    Json,
    Timestamp,
    Uuid,
}

impl FieldType {
    pub fn is_integer(self) -> bool {
        matches!(self, FieldType::SmallInt | FieldType::Int | FieldType::BigInt)
    }

    /// PostgreSQL column type for this field type.
    pub fn sql_type(self, max_length: Option<u32>, precision: Option<u32>, scale: Option<u32>) -> String {
        match self {
            FieldType::Bool => "BOOLEAN".into(),
            FieldType::SmallInt => "SMALLINT".into(),
            FieldType::Int => "INTEGER".into(),
            FieldType::BigInt => "BIGINT".into(),
            FieldType::Float | FieldType::Double => match (precision, scale) {
                (Some(p), Some(s)) => format!("NUMERIC({p},{s})"),
                (Some(p), None) => format!("NUMERIC({p})"),
                _ if self == FieldType::Float => "REAL".into(),
                _ => "DOUBLE PRECISION".into(),
            },
            FieldType::Text => match max_length {
                Some(n) => format!("VARCHAR({n})"),
                None => "TEXT".into(),
            },
            FieldType::Bytes => "BYTEA".into(),
            FieldType::Json => "JSONB".into(),
            FieldType::Timestamp => "TIMESTAMPTZ".into(),
            FieldType::Uuid => "UUID".into(),
        }
    }
}

/// Maps a Rust field type onto a column.
pub trait ColumnType {
    const FIELD_TYPE: FieldType;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;
}

macro_rules! column_type {
    ($($t:ty => $ft:ident),* $(,)?) => {
        $(
            impl ColumnType for $t {
                const FIELD_TYPE: FieldType = FieldType::$ft;

                fn to_value(&self) -> Value {
                    Value::from(self.clone())
                }
            }
        )*
    };
}

column_type!(
    bool => Bool,
    i8 => SmallInt,
    i16 => SmallInt,
    u8 => SmallInt,
    i32 => Int,
    u16 => Int,
    i64 => BigInt,
    u32 => BigInt,
    f32 => Float,
    f64 => Double,
    String => Text,
    serde_json::Value => Json,
    DateTime<Utc> => Timestamp,
    NaiveDateTime => Timestamp,
    Uuid => Uuid,
);

impl ColumnType for Vec<u8> {
    const FIELD_TYPE: FieldType = FieldType::Bytes;

    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl<T: ColumnType> ColumnType for Option<T> {
    const FIELD_TYPE: FieldType = T::FIELD_TYPE;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, ColumnType::to_value)
    }
}

/// Descriptor of one entity field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Rust field name.
    pub name: String,
    /// Column name.
    pub column: String,
    pub field_type: FieldType,
    /// Explicit column type; derived from `field_type` when `None`.
    pub db_type: Option<String>,
    pub primary_key: bool,
    pub nullable: bool,
    pub auto_increment: bool,
    pub unique: bool,
    pub default: Option<String>,
    pub max_length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            field_type,
            db_type: None,
            primary_key: false,
            nullable: false,
            auto_increment: false,
            unique: false,
            default: None,
            max_length: None,
            precision: None,
            scale: None,
        }
    }

    /// Shorthand for `FieldInfo::new(name, T::FIELD_TYPE)` with `T`'s nullability.
    pub fn of<T: ColumnType>(name: impl Into<String>) -> Self {
        Self::new(name, T::FIELD_TYPE).nullable(T::NULLABLE)
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn max_length(mut self, n: u32) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn precision(mut self, precision: u32, scale: Option<u32>) -> Self {
        self.precision = Some(precision);
        self.scale = scale;
        self
    }

    pub fn db_type(mut self, db_type: impl Into<String>) -> Self {
        self.db_type = Some(db_type.into());
        self
    }

    /// The column type used in DDL.
    pub fn sql_type(&self) -> String {
        match &self.db_type {
            Some(t) => t.clone(),
            None if self.auto_increment && self.field_type.is_integer() => match self.field_type {
                FieldType::BigInt => "BIGSERIAL".into(),
                FieldType::SmallInt => "SMALLSERIAL".into(),
                _ => "SERIAL".into(),
            },
            None => self.field_type.sql_type(self.max_length, self.precision, self.scale),
        }
    }

    pub fn to_column_info(&self) -> ColumnInfo {
        ColumnInfo {
            name: self.column.clone(),
            data_type: self.sql_type(),
            nullable: self.nullable,
            primary_key: self.primary_key,
            unique: self.unique,
            auto_increment: self.auto_increment,
            default: self.default.clone(),
            max_length: self.max_length,
            precision: self.precision,
            scale: self.scale,
        }
    }
}

/// Snapshot of an entity's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityInfo {
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldInfo>,
    /// Names of the primary-key fields, in declaration order.
    pub primary_keys: Vec<String>,
}

impl EntityInfo {
    pub fn new(name: impl Into<String>, table: impl Into<String>, fields: Vec<FieldInfo>) -> Self {
        let primary_keys = fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name.clone())
            .collect();
        Self {
            name: name.into(),
            table: table.into(),
            fields,
            primary_keys,
        }
    }

    /// The first primary-key field.
    pub fn primary_key(&self) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// The single primary-key field, or a validation error.
    pub fn require_primary_key(&self) -> OrmResult<&FieldInfo> {
        self.primary_key()
            .ok_or_else(|| OrmError::validation(format!("entity {} has no primary key", self.name)))
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look a field up by Rust name or column name.
    pub fn resolve(&self, name: &str) -> Option<&FieldInfo> {
        self.field(name)
            .or_else(|| self.fields.iter().find(|f| f.column == name))
    }

    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.column.as_str()).collect()
    }

    /// Columns the store fills in on insert.
    pub fn generated_columns(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.auto_increment)
            .map(|f| f.column.clone())
            .collect()
    }

    pub fn to_table_info(&self) -> TableInfo {
        let columns = self.fields.iter().map(FieldInfo::to_column_info).collect();
        let mut constraints = Vec::new();
        let pk: Vec<String> = self
            .fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.column.clone())
            .collect();
        if !pk.is_empty() {
            constraints.push(ConstraintInfo {
                name: format!("{}_pkey", self.table),
                kind: ConstraintKind::PrimaryKey,
                columns: pk,
            });
        }
        for field in self.fields.iter().filter(|f| f.unique && !f.primary_key) {
            constraints.push(ConstraintInfo {
                name: format!("{}_{}_key", self.table, field.column),
                kind: ConstraintKind::Unique,
                columns: vec![field.column.clone()],
            });
        }
        TableInfo {
            name: self.table.clone(),
            columns,
            indexes: Vec::new(),
            constraints,
        }
    }
}

/// Table-level view of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub auto_increment: bool,
    pub default: Option<String>,
    pub max_length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintInfo {
    pub name: String,
    pub kind: ConstraintKind,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    pub constraints: Vec<ConstraintInfo>,
}

/// Whether the live table matches the entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub table_exists: bool,
    pub current_version: String,
    pub required_version: String,
    pub needs_migration: bool,
    /// Human-readable changes `migrate_table` would apply.
    pub pending_changes: Vec<String>,
}

/// Relation kind, seen from the declaring entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Related rows carry a foreign key to this entity.
    HasMany,
    /// As `HasMany`, at most one row.
    HasOne,
    /// This entity carries a foreign key to the related row.
    BelongsTo,
}

/// A named relation to rows of another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    pub table: String,
    /// The foreign-key column (on the related table for `HasMany`/`HasOne`,
    /// on this entity for `BelongsTo`).
    pub foreign_key: String,
    /// The referenced key column (on this entity for `HasMany`/`HasOne`, on
    /// the related table for `BelongsTo`).
    pub references: String,
}

impl Relation {
    pub fn has_many(name: &str, table: &str, foreign_key: &str, references: &str) -> Self {
        Self::new(RelationKind::HasMany, name, table, foreign_key, references)
    }

    pub fn has_one(name: &str, table: &str, foreign_key: &str, references: &str) -> Self {
        Self::new(RelationKind::HasOne, name, table, foreign_key, references)
    }

    pub fn belongs_to(name: &str, table: &str, foreign_key: &str, references: &str) -> Self {
        Self::new(RelationKind::BelongsTo, name, table, foreign_key, references)
    }

    fn new(kind: RelationKind, name: &str, table: &str, foreign_key: &str, references: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            table: table.to_string(),
            foreign_key: foreign_key.to_string(),
            references: references.to_string(),
        }
    }

    /// Column read from the parent entity's record.
    pub fn parent_column(&self) -> &str {
        match self.kind {
            RelationKind::BelongsTo => &self.foreign_key,
            RelationKind::HasMany | RelationKind::HasOne => &self.references,
        }
    }

    /// Column matched on the related table.
    pub fn related_column(&self) -> &str {
        match self.kind {
            RelationKind::BelongsTo => &self.references,
            RelationKind::HasMany | RelationKind::HasOne => &self.foreign_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_info() -> EntityInfo {
        EntityInfo::new(
            "User",
            "users",
            vec![
                FieldInfo::of::<i64>("id").primary_key().auto_increment(),
                FieldInfo::of::<String>("email").unique().max_length(255),
                FieldInfo::of::<Option<i32>>("age"),
                FieldInfo::of::<f64>("balance").precision(10, Some(2)),
            ],
        )
    }

    #[test]
    fn primary_key_list_is_derived() {
        let info = user_info();
        assert_eq!(info.primary_keys, ["id"]);
        assert_eq!(info.generated_columns(), ["id"]);
    }

    #[test]
    fn sql_types() {
        let info = user_info();
        let types: Vec<_> = info.fields.iter().map(FieldInfo::sql_type).collect();
        assert_eq!(types, ["BIGSERIAL", "VARCHAR(255)", "INTEGER", "NUMERIC(10,2)"]);
        assert!(info.field("age").unwrap().nullable);
    }

    #[test]
    fn table_info_lists_constraints() {
        let table = user_info().to_table_info();
        assert_eq!(table.columns.len(), 4);
        assert_eq!(table.constraints[0].kind, ConstraintKind::PrimaryKey);
        assert_eq!(table.constraints[1].name, "users_email_key");
    }

    #[test]
    fn relation_columns() {
        let posts = Relation::has_many("posts", "posts", "user_id", "id");
        assert_eq!((posts.parent_column(), posts.related_column()), ("id", "user_id"));
        let author = Relation::belongs_to("author", "users", "user_id", "id");
        assert_eq!((author.parent_column(), author.related_column()), ("user_id", "id"));
    }
}
