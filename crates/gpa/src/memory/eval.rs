//! Predicate evaluation and row shaping for the in-memory store.

use crate::compile::{CompiledOrder, CompiledQuery, Predicate};
use crate::condition::Operator;
use crate::error::StoreError;
use crate::ident::ColumnExpr;
use crate::query::Direction;
use crate::record::Record;
use crate::store::StoreResult;
use crate::value::Value;
use std::cmp::Ordering;

fn unknown_column(name: &str) -> StoreError {
    StoreError::Other(format!("column \"{name}\" does not exist"))
}

fn column_value<'r>(row: &'r Record, column: &ColumnExpr) -> StoreResult<&'r Value> {
    match column {
        ColumnExpr::Column(ident) => row.get(ident.name()).ok_or_else(|| unknown_column(ident.name())),
        other => Err(StoreError::Unsupported(format!("expression {other} outside an aggregate query"))),
    }
}

pub(super) fn matches_all(filters: &[Predicate], row: &Record) -> StoreResult<bool> {
    for predicate in filters {
        if !matches(predicate, row)? {
            return Ok(false);
        }
    }
    Ok(true)
}

pub(super) fn matches(predicate: &Predicate, row: &Record) -> StoreResult<bool> {
    match predicate {
        Predicate::All(children) => matches_all(children, row),
        Predicate::Any(children) => {
            for child in children {
                if matches(child, row)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::Compare { column, op, value } => {
            let actual = column_value(row, column)?;
            Ok(compare(actual, *op, value))
        }
    }
}

/// SQL three-valued comparison collapsed to "row passes".
fn compare(actual: &Value, op: Operator, expected: &Value) -> bool {
    let ord = actual.sql_cmp(expected);
    match op {
        Operator::Equal => ord == Some(Ordering::Equal),
        Operator::NotEqual => matches!(ord, Some(Ordering::Less | Ordering::Greater)),
        Operator::GreaterThan => ord == Some(Ordering::Greater),
        Operator::GreaterThanOrEqual => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        Operator::LessThan => ord == Some(Ordering::Less),
        Operator::LessThanOrEqual => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
        Operator::Like | Operator::NotLike => match (actual, expected) {
            (Value::Text(s), Value::Text(pattern)) => like(s, pattern) == (op == Operator::Like),
            _ => false,
        },
        Operator::In | Operator::NotIn => {
            if actual.is_null() {
                return false;
            }
            let found = match expected {
                Value::List(items) => items.iter().any(|v| actual.sql_cmp(v) == Some(Ordering::Equal)),
                single => actual.sql_cmp(single) == Some(Ordering::Equal),
            };
            found == (op == Operator::In)
        }
        Operator::IsNull => actual.is_null(),
        Operator::IsNotNull => !actual.is_null(),
    }
}

/// `LIKE` matching: `%` is any run, `_` any single char, `\` escapes.
pub(super) fn like(text: &str, pattern: &str) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Tok {
        Any,
        One,
        Lit(char),
    }

    let mut toks = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        toks.push(match c {
            '%' => Tok::Any,
            '_' => Tok::One,
            '\\' => Tok::Lit(chars.next().unwrap_or('\\')),
            c => Tok::Lit(c),
        });
    }

    let text: Vec<char> = text.chars().collect();
    // dp[j]: pattern prefix of length j matches the text prefix seen so far.
    let mut dp = vec![false; toks.len() + 1];
    dp[0] = true;
    for j in 1..=toks.len() {
        dp[j] = dp[j - 1] && toks[j - 1] == Tok::Any;
    }
    for &c in &text {
        let mut next = vec![false; toks.len() + 1];
        for j in 1..=toks.len() {
            next[j] = match toks[j - 1] {
                Tok::Any => next[j - 1] || dp[j],
                Tok::One => dp[j - 1],
                Tok::Lit(l) => dp[j - 1] && l == c,
            };
        }
        dp = next;
    }
    dp[toks.len()]
}

/// NULLs sort last ascending and first descending, as in PostgreSQL.
fn order_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.sql_cmp(b).unwrap_or(Ordering::Equal),
    }
}

pub(super) fn sort(rows: &mut [Record], orders: &[CompiledOrder]) -> StoreResult<()> {
    if orders.is_empty() {
        return Ok(());
    }
    for order in orders {
        if let Some(first) = rows.first() {
            column_value(first, &order.column)?;
        }
    }
    rows.sort_by(|a, b| {
        for order in orders {
            let (Ok(x), Ok(y)) = (column_value(a, &order.column), column_value(b, &order.column)) else {
                continue;
            };
            let ord = order_values(x, y);
            let ord = match order.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

/// Apply the projection to filtered, sorted rows.
pub(super) fn project(rows: Vec<Record>, query: &CompiledQuery) -> StoreResult<Vec<Record>> {
    if query.projection.is_empty() {
        return Ok(rows);
    }
    let has_aggregate = query
        .projection
        .iter()
        .any(|c| matches!(c, ColumnExpr::Aggregate { .. }));
    if has_aggregate {
        return aggregate(&rows, &query.projection).map(|row| vec![row]);
    }

    rows.into_iter()
        .map(|row| {
            let mut out = Record::with_capacity(query.projection.len());
            for column in &query.projection {
                match column {
                    ColumnExpr::Star(_) => {
                        for (name, value) in row.iter() {
                            out.set(name, value.clone());
                        }
                    }
                    ColumnExpr::Column(ident) => {
                        let value = row.get(ident.name()).ok_or_else(|| unknown_column(ident.name()))?;
                        out.set(ident.name(), value.clone());
                    }
                    ColumnExpr::Aggregate { .. } => {
                        return Err(StoreError::Unsupported(format!("aggregate {column} mixed with rows")));
                    }
                }
            }
            Ok(out)
        })
        .collect()
}

fn aggregate(rows: &[Record], projection: &[ColumnExpr]) -> StoreResult<Record> {
    let mut out = Record::with_capacity(projection.len());
    for column in projection {
        let ColumnExpr::Aggregate { func, distinct, arg } = column else {
            return Err(StoreError::Unsupported(format!(
                "column {column} must appear in GROUP BY or an aggregate"
            )));
        };

        let mut values: Vec<Value> = match arg.as_ref() {
            ColumnExpr::Star(_) => rows.iter().map(|_| Value::Bool(true)).collect(),
            inner => rows
                .iter()
                .map(|r| column_value(r, inner).cloned())
                .collect::<StoreResult<Vec<_>>>()?
                .into_iter()
                .filter(|v| !v.is_null())
                .collect(),
        };
        if *distinct {
            let mut unique: Vec<Value> = Vec::with_capacity(values.len());
            for v in values {
                if !unique.contains(&v) {
                    unique.push(v);
                }
            }
            values = unique;
        }

        let result = match func.as_str() {
            "COUNT" => Value::Int(values.len() as i64),
            "SUM" => sum(&values),
            "AVG" => match sum(&values) {
                Value::Int(total) => Value::Float(total as f64 / values.len() as f64),
                Value::Float(total) => Value::Float(total / values.len() as f64),
                other => other,
            },
            "MIN" => values
                .iter()
                .min_by(|a, b| order_values(a, b))
                .cloned()
                .unwrap_or_default(),
            "MAX" => values
                .iter()
                .max_by(|a, b| order_values(a, b))
                .cloned()
                .unwrap_or_default(),
            other => return Err(StoreError::Unsupported(format!("aggregate {other}"))),
        };
        out.set(func.to_ascii_lowercase(), result);
    }
    Ok(out)
}

fn sum(values: &[Value]) -> Value {
    if values.is_empty() {
        return Value::Null;
    }
    let mut int_total: i64 = 0;
    let mut float_total: f64 = 0.0;
    let mut is_float = false;
    for v in values {
        match v {
            Value::Int(i) => {
                int_total = int_total.saturating_add(*i);
                float_total += *i as f64;
            }
            Value::Float(x) => {
                is_float = true;
                float_total += x;
            }
            _ => {}
        }
    }
    if is_float { Value::Float(float_total) } else { Value::Int(int_total) }
}

/// Keep the first occurrence of each row.
pub(super) fn dedup(rows: Vec<Record>) -> Vec<Record> {
    let mut out: Vec<Record> = Vec::with_capacity(rows.len());
    for row in rows {
        if !out.contains(&row) {
            out.push(row);
        }
    }
    out
}

pub(super) fn page(rows: Vec<Record>, offset: Option<u64>, limit: Option<u64>) -> Vec<Record> {
    let skip = usize::try_from(offset.unwrap_or(0)).unwrap_or(usize::MAX);
    let take = limit.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
    rows.into_iter().skip(skip).take(take).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards() {
        assert!(like("alice@example.com", "%@example.com"));
        assert!(like("bob", "b_b"));
        assert!(!like("bob", "b_"));
        assert!(like("100%", "100\\%"));
        assert!(!like("1000", "100\\%"));
        assert!(like("", "%"));
    }

    #[test]
    fn nulls_never_compare() {
        assert!(!compare(&Value::Null, Operator::Equal, &Value::Null));
        assert!(!compare(&Value::Null, Operator::NotIn, &Value::List(vec![Value::Int(1)])));
        assert!(compare(&Value::Null, Operator::IsNull, &Value::Null));
    }

    #[test]
    fn in_list_membership() {
        let list = Value::List(vec![Value::Int(1), Value::Int(3)]);
        assert!(compare(&Value::Int(3), Operator::In, &list));
        assert!(compare(&Value::Int(2), Operator::NotIn, &list));
        assert!(!compare(&Value::Int(2), Operator::In, &Value::List(vec![])));
    }
}
