//! Option set → compiled query.
//!
//! [`compile`] applies the options to a fresh [`Query`], validates every
//! identifier and lowers conditions into [`Predicate`]s. The result is
//! store-neutral: the in-memory store evaluates it directly, the Postgres
//! store renders it through [`CompiledQuery::to_select_sql`].
//!
//! Only identifiers and operator keywords are ever written into SQL text;
//! every value is a bound parameter.

use crate::condition::{Condition, Operator};
use crate::error::{OrmError, OrmResult};
use crate::ident::{ColumnExpr, Ident};
use crate::query::{Direction, JoinType, Query, QueryOption};
use crate::sql::{Placeholder, Sql};
use crate::value::Value;

/// A lowered, validated condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: ColumnExpr,
        op: Operator,
        value: Value,
    },
    /// Conjunction. Empty is true.
    All(Vec<Predicate>),
    /// Disjunction. Empty is false.
    Any(Vec<Predicate>),
}

impl Predicate {
    /// `column op value` over a plain column.
    pub fn compare(column: Ident, op: Operator, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            column: ColumnExpr::Column(column),
            op,
            value: value.into(),
        }
    }

    /// The predicate with `?` standing for each bound parameter, before list
    /// expansion: `age > ?`, `id IN ?`, `deleted_at IS NULL`.
    pub fn template(&self) -> String {
        match self {
            Predicate::Compare { column, op, .. } => {
                if op.takes_value() {
                    format!("{column} {op} ?")
                } else {
                    format!("{column} {op}")
                }
            }
            Predicate::All(children) => join_templates(children, " AND ", "1=1"),
            Predicate::Any(children) => join_templates(children, " OR ", "1=0"),
        }
    }

    /// Whether the predicate holds for every row without looking at one,
    /// e.g. an empty conjunction.
    pub fn is_unconditional(&self) -> bool {
        match self {
            Predicate::Compare { .. } => false,
            Predicate::All(children) => children.iter().all(Predicate::is_unconditional),
            Predicate::Any(children) => children.iter().any(Predicate::is_unconditional),
        }
    }

    /// Bound values in template order.
    pub fn params(&self) -> Vec<&Value> {
        let mut out = Vec::new();
        self.collect_params(&mut out);
        out
    }

    fn collect_params<'a>(&'a self, out: &mut Vec<&'a Value>) {
        match self {
            Predicate::Compare { op, value, .. } => {
                if op.takes_value() {
                    out.push(value);
                }
            }
            Predicate::All(children) | Predicate::Any(children) => {
                for child in children {
                    child.collect_params(out);
                }
            }
        }
    }

    /// Append the predicate to `sql`, expanding list parameters.
    pub(crate) fn write(&self, sql: &mut Sql) {
        match self {
            Predicate::Compare { column, op, value } if op.takes_list() => {
                let items = match value {
                    Value::List(items) => items.clone(),
                    single => vec![single.clone()],
                };
                if items.is_empty() {
                    sql.push(if *op == Operator::In { "1=0" } else { "1=1" });
                    return;
                }
                sql.push_column(column).push(" ").push(op.as_sql()).push(" (");
                sql.push_bind_list(items).push(")");
            }
            Predicate::Compare { column, op, value } => {
                sql.push_column(column).push(" ").push(op.as_sql());
                if op.takes_value() {
                    sql.push(" ").push_bind(value.clone());
                }
            }
            Predicate::All(children) => write_group(sql, children, " AND ", "1=1"),
            Predicate::Any(children) => write_group(sql, children, " OR ", "1=0"),
        }
    }
}

fn join_templates(children: &[Predicate], sep: &str, empty: &str) -> String {
    if children.is_empty() {
        return empty.to_string();
    }
    let parts: Vec<String> = children.iter().map(|c| format!("({})", c.template())).collect();
    parts.join(sep)
}

fn write_group(sql: &mut Sql, children: &[Predicate], sep: &str, empty: &str) {
    if children.is_empty() {
        sql.push(empty);
        return;
    }
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            sql.push(sep);
        }
        sql.push("(");
        child.write(sql);
        sql.push(")");
    }
}

/// A validated join clause.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledJoin {
    pub kind: JoinType,
    pub table: Ident,
    pub alias: Option<Ident>,
    pub on: Option<String>,
}

/// A validated ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledOrder {
    pub column: ColumnExpr,
    pub direction: Direction,
}

/// The executable form of an option set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledQuery {
    /// AND-combined WHERE predicates, one per condition.
    pub filters: Vec<Predicate>,
    /// Empty means all columns.
    pub projection: Vec<ColumnExpr>,
    pub orders: Vec<CompiledOrder>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub joins: Vec<CompiledJoin>,
    pub preloads: Vec<String>,
    pub groups: Vec<Ident>,
    pub having: Vec<Predicate>,
    pub distinct: bool,
}

/// Compile an option sequence.
pub fn compile(options: impl IntoIterator<Item = QueryOption>) -> OrmResult<CompiledQuery> {
    compile_query(Query::from_options(options))
}

/// Compile an already-populated accumulator.
pub fn compile_query(query: Query) -> OrmResult<CompiledQuery> {
    let filters = query
        .conditions
        .iter()
        .map(lower_where)
        .collect::<OrmResult<Vec<_>>>()?;

    let projection = query
        .fields
        .iter()
        .map(|f| ColumnExpr::parse(f))
        .collect::<OrmResult<Vec<_>>>()?;

    let orders = query
        .orders
        .iter()
        .map(|o| {
            Ok(CompiledOrder {
                column: ColumnExpr::parse(&o.field)?,
                direction: o.direction,
            })
        })
        .collect::<OrmResult<Vec<_>>>()?;

    let joins = query
        .joins
        .iter()
        .map(|j| {
            Ok(CompiledJoin {
                kind: j.kind,
                table: Ident::parse(&j.table)?,
                alias: j.alias.as_deref().map(Ident::parse).transpose()?,
                on: j.on.clone(),
            })
        })
        .collect::<OrmResult<Vec<_>>>()?;

    let groups = query
        .groups
        .iter()
        .map(|g| Ident::parse(g))
        .collect::<OrmResult<Vec<_>>>()?;

    let having = query
        .having
        .iter()
        .map(lower_having)
        .collect::<OrmResult<Vec<_>>>()?;

    Ok(CompiledQuery {
        filters,
        projection,
        orders,
        limit: query.limit,
        offset: query.offset,
        joins,
        preloads: query.preloads,
        groups,
        having,
        distinct: query.distinct,
    })
}

/// Lower a condition for use in a WHERE clause.
pub fn lower_where(condition: &Condition) -> OrmResult<Predicate> {
    lower(condition, &|field| Ok(ColumnExpr::Column(Ident::parse(field)?)), &|_| Ok(()))
}

/// Lower a HAVING condition: aggregates allowed, comparison operators only.
pub fn lower_having(condition: &Condition) -> OrmResult<Predicate> {
    lower(condition, &ColumnExpr::parse, &|op| {
        if op.is_comparison() {
            Ok(())
        } else {
            Err(OrmError::validation(format!("operator {op} is not supported in HAVING")))
        }
    })
}

fn lower(
    condition: &Condition,
    column: &dyn Fn(&str) -> OrmResult<ColumnExpr>,
    allow: &dyn Fn(Operator) -> OrmResult<()>,
) -> OrmResult<Predicate> {
    match condition {
        Condition::Basic(basic) => {
            if basic.field().is_empty() {
                return Err(OrmError::validation("condition field cannot be empty"));
            }
            allow(basic.operator())?;
            Ok(Predicate::Compare {
                column: column(basic.field())?,
                op: basic.operator(),
                value: basic.value().clone(),
            })
        }
        Condition::And(children) => Ok(Predicate::All(
            children
                .iter()
                .map(|c| lower(c, column, allow))
                .collect::<OrmResult<_>>()?,
        )),
        Condition::Or(children) => Ok(Predicate::Any(
            children
                .iter()
                .map(|c| lower(c, column, allow))
                .collect::<OrmResult<_>>()?,
        )),
    }
}

impl CompiledQuery {
    /// A query with only the given filters.
    pub fn filtered(filters: Vec<Predicate>) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    /// Whether the query is "all rows, all columns".
    pub fn is_unrestricted(&self) -> bool {
        *self == CompiledQuery::default()
    }

    /// Whether rows must be counted through a subquery.
    fn needs_wrapped_count(&self) -> bool {
        self.distinct || !self.groups.is_empty() || !self.having.is_empty()
    }

    /// `SELECT ... FROM table ...` for this query.
    pub fn to_select_sql(&self, table: &str) -> OrmResult<Sql> {
        let table = Ident::parse(table)?;
        let mut sql = Sql::new("SELECT ");
        self.push_projection(&mut sql);
        sql.push(" FROM ").push_ident_ref(&table);
        self.push_body(&mut sql);

        if !self.orders.is_empty() {
            sql.push(" ORDER BY ");
            for (i, order) in self.orders.iter().enumerate() {
                if i > 0 {
                    sql.push(", ");
                }
                sql.push_column(&order.column).push(" ").push(order.direction.as_sql());
            }
        }
        if let Some(limit) = self.limit {
            sql.push(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push(&format!(" OFFSET {offset}"));
        }
        Ok(sql)
    }

    /// `SELECT COUNT(*)` over the rows this query filters.
    ///
    /// Ordering, limit and offset do not affect the count.
    pub fn to_count_sql(&self, table: &str) -> OrmResult<Sql> {
        let table = Ident::parse(table)?;
        if !self.needs_wrapped_count() {
            let mut sql = Sql::new("SELECT COUNT(*) FROM ");
            sql.push_ident_ref(&table);
            self.push_body(&mut sql);
            return Ok(sql);
        }

        let mut sql = Sql::new("SELECT COUNT(*) FROM (SELECT ");
        self.push_projection(&mut sql);
        sql.push(" FROM ").push_ident_ref(&table);
        self.push_body(&mut sql);
        sql.push(") AS t");
        Ok(sql)
    }

    /// Render the WHERE predicates alone, for UPDATE and DELETE.
    pub(crate) fn push_where(sql: &mut Sql, filters: &[Predicate]) {
        for (i, predicate) in filters.iter().enumerate() {
            sql.push(if i == 0 { " WHERE " } else { " AND " });
            predicate.write(sql);
        }
    }

    /// Shortcut for `to_select_sql(table)?.build(style)`.
    pub fn render_select(&self, table: &str, style: Placeholder) -> OrmResult<(String, Vec<Value>)> {
        Ok(self.to_select_sql(table)?.build(style))
    }

    fn push_projection(&self, sql: &mut Sql) {
        if self.distinct {
            sql.push("DISTINCT ");
        }
        if self.projection.is_empty() {
            sql.push("*");
            return;
        }
        for (i, column) in self.projection.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.push_column(column);
        }
    }

    fn push_body(&self, sql: &mut Sql) {
        for join in &self.joins {
            sql.push(" ").push(join.kind.as_sql()).push(" ").push_ident_ref(&join.table);
            if let Some(alias) = &join.alias {
                sql.push(" AS ").push_ident_ref(alias);
            }
            if let Some(on) = &join.on {
                sql.push(" ON ").push(on);
            }
        }

        Self::push_where(sql, &self.filters);

        if !self.groups.is_empty() {
            sql.push(" GROUP BY ");
            for (i, group) in self.groups.iter().enumerate() {
                if i > 0 {
                    sql.push(", ");
                }
                sql.push_ident_ref(group);
            }
        }

        for (i, predicate) in self.having.iter().enumerate() {
            sql.push(if i == 0 { " HAVING " } else { " AND " });
            predicate.write(sql);
        }
    }
}
