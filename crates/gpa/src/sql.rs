//! Parameter-safe SQL text builder.
//!
//! `Sql` stores SQL pieces and bound [`Value`]s separately and generates
//! placeholders when rendered, so callers never track indices by hand:
//!
//! ```ignore
//! use gpa::sql::{sql, Placeholder};
//!
//! let mut q = sql("SELECT id, username FROM users WHERE status = ");
//! q.push_bind("active").push(" ORDER BY created_at DESC");
//!
//! assert_eq!(q.to_sql(), "SELECT id, username FROM users WHERE status = $1");
//! assert_eq!(q.render(Placeholder::Question), "SELECT id, username FROM users WHERE status = ?");
//! ```

use crate::error::OrmResult;
use crate::ident::{ColumnExpr, Ident};
use crate::value::Value;
use std::fmt::Write;

/// Placeholder syntax used when rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placeholder {
    /// `$1, $2, ...` (PostgreSQL).
    #[default]
    Dollar,
    /// `?` for every parameter.
    Question,
}

#[derive(Debug, Clone)]
enum SqlPart {
    Raw(String),
    Param,
}

/// A SQL statement under construction.
#[derive(Debug, Clone)]
pub struct Sql {
    parts: Vec<SqlPart>,
    params: Vec<Value>,
}

/// Start building a SQL statement.
pub fn sql(initial_sql: impl Into<String>) -> Sql {
    Sql::new(initial_sql)
}

impl Sql {
    pub fn new(initial_sql: impl Into<String>) -> Self {
        let mut out = Self::empty();
        out.push(&initial_sql.into());
        out
    }

    pub fn empty() -> Self {
        Self {
            parts: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Append raw SQL (no parameters).
    pub fn push(&mut self, sql: &str) -> &mut Self {
        if sql.is_empty() {
            return self;
        }
        match self.parts.last_mut() {
            Some(SqlPart::Raw(last)) => last.push_str(sql),
            _ => self.parts.push(SqlPart::Raw(sql.to_string())),
        }
        self
    }

    /// Append a placeholder and bind its value.
    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.parts.push(SqlPart::Param);
        self.params.push(value.into());
        self
    }

    /// Append one comma-separated placeholder per value.
    ///
    /// An empty list appends `NULL` so `IN (NULL)` stays valid SQL.
    pub fn push_bind_list(&mut self, values: impl IntoIterator<Item = Value>) -> &mut Self {
        let mut iter = values.into_iter();
        let Some(first) = iter.next() else {
            return self.push("NULL");
        };
        self.push_bind(first);
        for v in iter {
            self.push(", ");
            self.push_bind(v);
        }
        self
    }

    /// Append another fragment, consuming it.
    pub fn push_sql(&mut self, mut other: Sql) -> &mut Self {
        for part in other.parts.drain(..) {
            match part {
                SqlPart::Raw(s) => {
                    self.push(&s);
                }
                SqlPart::Param => self.parts.push(SqlPart::Param),
            }
        }
        self.params.append(&mut other.params);
        self
    }

    /// Append an identifier after validating it.
    pub fn push_ident(&mut self, ident: &str) -> OrmResult<&mut Self> {
        let ident = Ident::parse(ident)?;
        Ok(self.push_ident_ref(&ident))
    }

    pub(crate) fn push_ident_ref(&mut self, ident: &Ident) -> &mut Self {
        let mut out = String::new();
        ident.write_sql(&mut out);
        self.push(&out)
    }

    pub(crate) fn push_column(&mut self, column: &ColumnExpr) -> &mut Self {
        self.push(&column.to_sql())
    }

    /// Render with `$1, $2, ...` placeholders.
    pub fn to_sql(&self) -> String {
        self.render(Placeholder::Dollar)
    }

    pub fn render(&self, style: Placeholder) -> String {
        let mut out = String::new();
        let mut idx: usize = 0;
        for part in &self.parts {
            match part {
                SqlPart::Raw(s) => out.push_str(s),
                SqlPart::Param => {
                    idx += 1;
                    match style {
                        Placeholder::Dollar => {
                            let _ = write!(&mut out, "${idx}");
                        }
                        Placeholder::Question => out.push('?'),
                    }
                }
            }
        }
        out
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Rendered text plus its parameters.
    pub fn build(self, style: Placeholder) -> (String, Vec<Value>) {
        let text = self.render(style);
        (text, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_placeholders_in_order() {
        let mut q = sql("SELECT * FROM users WHERE a = ");
        q.push_bind(1).push(" AND b = ").push_bind("x");

        assert_eq!(q.to_sql(), "SELECT * FROM users WHERE a = $1 AND b = $2");
        assert_eq!(q.render(Placeholder::Question), "SELECT * FROM users WHERE a = ? AND b = ?");
        assert_eq!(q.params(), &[Value::Int(1), Value::Text("x".into())]);
    }

    #[test]
    fn composed_fragments_renumber() {
        let mut w = Sql::empty();
        w.push(" WHERE id = ").push_bind(42);

        let mut q = sql("SELECT * FROM users WHERE a = ");
        q.push_bind(1);
        q.push_sql(w);

        assert_eq!(q.to_sql(), "SELECT * FROM users WHERE a = $1 WHERE id = $2");
        assert_eq!(q.params().len(), 2);
    }

    #[test]
    fn bind_list_renders_commas() {
        let mut q = sql("SELECT * FROM users WHERE id IN (");
        q.push_bind_list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]).push(")");
        assert_eq!(q.to_sql(), "SELECT * FROM users WHERE id IN ($1, $2, $3)");
    }

    #[test]
    fn bind_list_empty_is_valid_sql() {
        let mut q = sql("SELECT * FROM users WHERE id IN (");
        q.push_bind_list(Vec::new()).push(")");
        assert_eq!(q.to_sql(), "SELECT * FROM users WHERE id IN (NULL)");
        assert!(q.params().is_empty());
    }

    #[test]
    fn push_ident_rejects_unsafe() {
        let mut q = Sql::empty();
        assert!(q.push_ident("users; drop table users; --").is_err());
        assert!(q.push_ident("1users").is_err());
        q.push_ident("public.users").unwrap();
        assert_eq!(q.to_sql(), "public.users");
    }
}
