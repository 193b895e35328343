//! Query options and the accumulator they populate.
//!
//! Callers describe a query as a sequence of [`QueryOption`] values built with
//! the constructor functions in this module:
//!
//! ```ignore
//! use gpa::query::{filter, order_by, limit};
//! use gpa::{Direction, Operator};
//!
//! let adults = repo
//!     .query([
//!         filter("age", Operator::GreaterThanOrEqual, 18),
//!         order_by("age", Direction::Asc),
//!         limit(10),
//!     ])
//!     .await?;
//! ```
//!
//! Each option is applied to an empty [`Query`] in caller order. Options that
//! set a scalar (`limit`, `offset`, `distinct`) overwrite earlier ones; the
//! rest append.

use crate::condition::{Condition, Operator};
use crate::value::Value;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinType {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }
}

/// One join clause.
///
/// `on` is emitted verbatim; it must come from trusted code, never from user
/// input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinType,
    pub table: String,
    pub alias: Option<String>,
    pub on: Option<String>,
}

impl Join {
    pub fn new(kind: JoinType, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            alias: None,
            on: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn on(mut self, on: impl Into<String>) -> Self {
        self.on = Some(on.into());
        self
    }
}

/// The query accumulator.
///
/// Built fresh for one compilation and consumed by it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub conditions: Vec<Condition>,
    pub fields: Vec<String>,
    pub orders: Vec<Order>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub joins: Vec<Join>,
    pub preloads: Vec<String>,
    pub groups: Vec<String>,
    pub having: Vec<Condition>,
    pub distinct: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `options` in order to an empty accumulator.
    pub fn from_options(options: impl IntoIterator<Item = QueryOption>) -> Self {
        let mut query = Query::new();
        for option in options {
            option.apply(&mut query);
        }
        query
    }
}

/// One instruction for the accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOption {
    Where(Condition),
    OrderBy(Order),
    Limit(u64),
    Offset(u64),
    Select(Vec<String>),
    Preload(String),
    Join(Join),
    GroupBy(String),
    Having(Condition),
    Distinct,
}

impl QueryOption {
    /// Mutate only the accumulator field(s) this option owns.
    pub fn apply(self, query: &mut Query) {
        match self {
            QueryOption::Where(condition) => query.conditions.push(condition),
            QueryOption::OrderBy(order) => query.orders.push(order),
            QueryOption::Limit(n) => query.limit = Some(n),
            QueryOption::Offset(n) => query.offset = Some(n),
            QueryOption::Select(fields) => query.fields.extend(fields),
            QueryOption::Preload(relation) => query.preloads.push(relation),
            QueryOption::Join(join) => query.joins.push(join),
            QueryOption::GroupBy(field) => query.groups.push(field),
            QueryOption::Having(condition) => query.having.push(condition),
            QueryOption::Distinct => query.distinct = true,
        }
    }
}

/// `WHERE field op value`.
pub fn filter(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> QueryOption {
    QueryOption::Where(Condition::new(field, operator, value))
}

/// `WHERE <condition>` for a prebuilt (possibly composite) condition.
pub fn filter_condition(condition: Condition) -> QueryOption {
    QueryOption::Where(condition)
}

pub fn order_by(field: impl Into<String>, direction: Direction) -> QueryOption {
    QueryOption::OrderBy(Order {
        field: field.into(),
        direction,
    })
}

pub fn limit(n: u64) -> QueryOption {
    QueryOption::Limit(n)
}

pub fn offset(n: u64) -> QueryOption {
    QueryOption::Offset(n)
}

/// Restrict the projection to `fields`.
pub fn select<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> QueryOption {
    QueryOption::Select(fields.into_iter().map(Into::into).collect())
}

/// Eager-load the named relation.
pub fn preload(relation: impl Into<String>) -> QueryOption {
    QueryOption::Preload(relation.into())
}

pub fn join(join: Join) -> QueryOption {
    QueryOption::Join(join)
}

pub fn inner_join(table: impl Into<String>, on: impl Into<String>) -> QueryOption {
    QueryOption::Join(Join::new(JoinType::Inner, table).on(on))
}

pub fn left_join(table: impl Into<String>, on: impl Into<String>) -> QueryOption {
    QueryOption::Join(Join::new(JoinType::Left, table).on(on))
}

pub fn group_by(field: impl Into<String>) -> QueryOption {
    QueryOption::GroupBy(field.into())
}

/// `HAVING field op value`. Only comparison operators compile.
pub fn having(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> QueryOption {
    QueryOption::Having(Condition::new(field, operator, value))
}

pub fn distinct() -> QueryOption {
    QueryOption::Distinct
}
