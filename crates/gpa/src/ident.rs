//! Validated SQL identifiers and column expressions.
//!
//! Field, table, alias and group names are the only caller text that ends up
//! interpolated into SQL, so every one of them passes through here first.
//!
//! - Unquoted parts match `[A-Za-z_][A-Za-z0-9_$]*`
//! - Quoted parts allow any characters except NUL and escape `"` as `""`
//! - Parts are joined with `.` (`schema.table.column`)
//!
//! [`ColumnExpr`] additionally accepts `*`, `table.*` and a single aggregate
//! call such as `COUNT(*)`, `SUM(amount)` or `COUNT(DISTINCT user_id)`, which
//! is what projections and HAVING terms need.

use crate::error::{OrmError, OrmResult};
use std::fmt;
use std::str::FromStr;

/// A part of a SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentPart {
    Unquoted(String),
    Quoted(String),
}

impl IdentPart {
    pub fn as_str(&self) -> &str {
        match self {
            IdentPart::Unquoted(s) | IdentPart::Quoted(s) => s,
        }
    }
}

/// A SQL identifier (column, table, or schema name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    parts: Vec<IdentPart>,
}

impl Ident {
    /// Parse an identifier string, supporting dotted and quoted forms.
    pub fn parse(s: &str) -> OrmResult<Self> {
        if s.is_empty() {
            return Err(OrmError::validation("identifier cannot be empty"));
        }
        if s.contains('\0') {
            return Err(OrmError::validation("identifier cannot contain NUL character"));
        }

        let mut parts = Vec::new();
        let mut chars = s.chars().peekable();

        while chars.peek().is_some() {
            if !parts.is_empty() {
                match chars.next() {
                    Some('.') => {
                        if chars.peek().is_none() {
                            return Err(invalid(s, "trailing '.'"));
                        }
                    }
                    Some(c) => return Err(invalid(s, &format!("expected '.', got '{c}'"))),
                    None => break,
                }
            }

            if chars.peek() == Some(&'"') {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            name.push('"');
                        }
                        Some('"') => break,
                        Some(c) => name.push(c),
                        None => return Err(invalid(s, "unclosed quoted identifier")),
                    }
                }
                if name.is_empty() {
                    return Err(invalid(s, "empty quoted identifier"));
                }
                parts.push(IdentPart::Quoted(name));
                continue;
            }

            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c == '.' {
                    break;
                }
                let ok = if name.is_empty() {
                    c == '_' || c.is_ascii_alphabetic()
                } else {
                    c == '_' || c == '$' || c.is_ascii_alphanumeric()
                };
                if !ok {
                    return Err(invalid(s, &format!("unexpected character '{c}'")));
                }
                name.push(c);
                chars.next();
            }
            if name.is_empty() {
                return Err(invalid(s, "empty identifier segment"));
            }
            parts.push(IdentPart::Unquoted(name));
        }

        Ok(Self { parts })
    }

    /// The last segment: the bare column or table name.
    pub fn name(&self) -> &str {
        self.parts.last().map(IdentPart::as_str).unwrap_or_default()
    }

    /// Everything before the last segment (`users` for `users.age`).
    pub fn qualifier(&self) -> Option<String> {
        if self.parts.len() < 2 {
            return None;
        }
        let head = Ident {
            parts: self.parts[..self.parts.len() - 1].to_vec(),
        };
        Some(head.to_sql())
    }

    pub fn parts(&self) -> &[IdentPart] {
        &self.parts
    }

    /// Render the identifier as SQL.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        self.write_sql(&mut out);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            match part {
                IdentPart::Unquoted(s) => out.push_str(s),
                IdentPart::Quoted(s) => {
                    out.push('"');
                    out.push_str(&s.replace('"', "\"\""));
                    out.push('"');
                }
            }
        }
    }
}

impl FromStr for Ident {
    type Err = OrmError;

    fn from_str(s: &str) -> OrmResult<Self> {
        Ident::parse(s)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// A projection or HAVING term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnExpr {
    /// A plain (possibly qualified) column.
    Column(Ident),
    /// `*` or `table.*`.
    Star(Option<Ident>),
    /// `FUNC(arg)` / `FUNC(DISTINCT arg)`.
    Aggregate {
        func: String,
        distinct: bool,
        arg: Box<ColumnExpr>,
    },
}

impl ColumnExpr {
    pub fn parse(s: &str) -> OrmResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(OrmError::validation("column expression cannot be empty"));
        }
        if s == "*" {
            return Ok(ColumnExpr::Star(None));
        }
        if let Some(table) = s.strip_suffix(".*") {
            return Ok(ColumnExpr::Star(Some(Ident::parse(table)?)));
        }
        if let Some(open) = s.find('(') {
            let Some(inner) = s[open + 1..].strip_suffix(')') else {
                return Err(invalid(s, "unbalanced parentheses"));
            };
            let func = s[..open].trim();
            if func.is_empty() || !func.chars().all(|c| c == '_' || c.is_ascii_alphabetic()) {
                return Err(invalid(s, "invalid function name"));
            }
            let inner = inner.trim();
            let (distinct, arg) = match inner.get(..9) {
                Some(prefix) if prefix.eq_ignore_ascii_case("DISTINCT ") => (true, inner[9..].trim()),
                _ => (false, inner),
            };
            let arg = ColumnExpr::parse(arg)?;
            if matches!(arg, ColumnExpr::Aggregate { .. }) {
                return Err(invalid(s, "nested aggregates are not supported"));
            }
            return Ok(ColumnExpr::Aggregate {
                func: func.to_ascii_uppercase(),
                distinct,
                arg: Box::new(arg),
            });
        }
        Ok(ColumnExpr::Column(Ident::parse(s)?))
    }

    pub fn to_sql(&self) -> String {
        match self {
            ColumnExpr::Column(ident) => ident.to_sql(),
            ColumnExpr::Star(None) => "*".to_string(),
            ColumnExpr::Star(Some(table)) => format!("{}.*", table.to_sql()),
            ColumnExpr::Aggregate { func, distinct, arg } => {
                let distinct = if *distinct { "DISTINCT " } else { "" };
                format!("{func}({distinct}{})", arg.to_sql())
            }
        }
    }

    /// The plain column this expression names, if it is one.
    pub fn as_column(&self) -> Option<&Ident> {
        match self {
            ColumnExpr::Column(ident) => Some(ident),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

fn invalid(ident: &str, reason: &str) -> OrmError {
    OrmError::validation(format!("invalid identifier '{ident}': {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_simple_and_dotted() {
        assert_eq!(Ident::parse("users").unwrap().to_sql(), "users");
        let dotted = Ident::parse("public.users").unwrap();
        assert_eq!(dotted.to_sql(), "public.users");
        assert_eq!(dotted.name(), "users");
        assert_eq!(dotted.qualifier().as_deref(), Some("public"));
    }

    #[test]
    fn ident_quoted_with_escape() {
        let ident = Ident::parse(r#""has""quote""#).unwrap();
        assert_eq!(ident.to_sql(), r#""has""quote""#);
        assert_eq!(ident.name(), "has\"quote");
    }

    #[test]
    fn ident_mixed_quoted_unquoted() {
        let ident = Ident::parse(r#"public."UserTable".id"#).unwrap();
        assert_eq!(ident.to_sql(), r#"public."UserTable".id"#);
    }

    #[test]
    fn ident_rejects_injection_shapes() {
        assert!(Ident::parse("").is_err());
        assert!(Ident::parse("1table").is_err());
        assert!(Ident::parse("my table").is_err());
        assert!(Ident::parse("schema..table").is_err());
        assert!(Ident::parse("schema.").is_err());
        assert!(Ident::parse(r#""unclosed"#).is_err());
        assert!(Ident::parse("age; DROP TABLE users").is_err());
    }

    #[test]
    fn column_expr_forms() {
        assert_eq!(ColumnExpr::parse("*").unwrap(), ColumnExpr::Star(None));
        assert_eq!(ColumnExpr::parse("users.*").unwrap().to_sql(), "users.*");
        assert_eq!(ColumnExpr::parse("count(*)").unwrap().to_sql(), "COUNT(*)");
        assert_eq!(
            ColumnExpr::parse("COUNT(DISTINCT user_id)").unwrap().to_sql(),
            "COUNT(DISTINCT user_id)"
        );
        assert_eq!(
            ColumnExpr::parse("orders.total").unwrap().as_column().map(Ident::name),
            Some("total")
        );
    }

    #[test]
    fn column_expr_rejects_garbage() {
        assert!(ColumnExpr::parse("SUM(a) + 1").is_err());
        assert!(ColumnExpr::parse("SUM(MAX(a))").is_err());
        assert!(ColumnExpr::parse("(a").is_err());
        assert!(ColumnExpr::parse("1=1 OR x").is_err());
    }
}
