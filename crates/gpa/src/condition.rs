//! Filter predicates: [`Operator`], [`BasicCondition`] and [`Condition`].
//!
//! A condition only records *what* to compare. The query compiler is the one
//! place that turns operators into SQL (see [`crate::compile`]).

use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a [`BasicCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub const ALL: [Operator; 12] = [
        Operator::Equal,
        Operator::NotEqual,
        Operator::GreaterThan,
        Operator::GreaterThanOrEqual,
        Operator::LessThan,
        Operator::LessThanOrEqual,
        Operator::Like,
        Operator::NotLike,
        Operator::In,
        Operator::NotIn,
        Operator::IsNull,
        Operator::IsNotNull,
    ];

    /// SQL spelling of the operator.
    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }

    /// `IS NULL` / `IS NOT NULL` take no value.
    pub fn takes_value(self) -> bool {
        !matches!(self, Operator::IsNull | Operator::IsNotNull)
    }

    /// `IN` / `NOT IN` take a sequence.
    pub fn takes_list(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    /// The operators accepted in a HAVING clause.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::Equal
                | Operator::NotEqual
                | Operator::GreaterThan
                | Operator::GreaterThanOrEqual
                | Operator::LessThan
                | Operator::LessThanOrEqual
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Operator {
    type Err = OrmError;

    fn from_str(s: &str) -> OrmResult<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        let op = match normalized.as_str() {
            "=" | "==" => Operator::Equal,
            "!=" | "<>" => Operator::NotEqual,
            ">" => Operator::GreaterThan,
            ">=" => Operator::GreaterThanOrEqual,
            "<" => Operator::LessThan,
            "<=" => Operator::LessThanOrEqual,
            "LIKE" => Operator::Like,
            "NOT LIKE" => Operator::NotLike,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            "IS NULL" => Operator::IsNull,
            "IS NOT NULL" => Operator::IsNotNull,
            _ => return Err(OrmError::validation(format!("unknown operator: {s}"))),
        };
        Ok(op)
    }
}

/// `field operator value`.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicCondition {
    field: String,
    operator: Operator,
    value: Value,
}

impl BasicCondition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        let value = if operator.takes_value() { value.into() } else { Value::Null };
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The compared value; always `Null` for the null-check operators.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// A filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Basic(BasicCondition),
    /// All children must hold. An empty list is always true.
    And(Vec<Condition>),
    /// At least one child must hold. An empty list is always false.
    Or(Vec<Condition>),
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Condition::Basic(BasicCondition::new(field, operator, value))
    }

    /// Like [`Condition::new`] with the operator given in its SQL spelling.
    pub fn parse(field: impl Into<String>, operator: &str, value: impl Into<Value>) -> OrmResult<Self> {
        Ok(Condition::new(field, operator.parse()?, value))
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::new(field, Operator::Equal, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::new(field, Operator::NotEqual, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::new(field, Operator::GreaterThan, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::new(field, Operator::GreaterThanOrEqual, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::new(field, Operator::LessThan, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::new(field, Operator::LessThanOrEqual, value)
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Condition::new(field, Operator::Like, pattern.into())
    }

    pub fn not_like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Condition::new(field, Operator::NotLike, pattern.into())
    }

    pub fn in_list<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let list = Value::List(values.into_iter().map(Into::into).collect());
        Condition::new(field, Operator::In, list)
    }

    pub fn not_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let list = Value::List(values.into_iter().map(Into::into).collect());
        Condition::new(field, Operator::NotIn, list)
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Condition::new(field, Operator::IsNull, Value::Null)
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Condition::new(field, Operator::IsNotNull, Value::Null)
    }

    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::And(conditions.into_iter().collect())
    }

    pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Or(conditions.into_iter().collect())
    }

    /// The basic condition, if this is one.
    pub fn as_basic(&self) -> Option<&BasicCondition> {
        match self {
            Condition::Basic(basic) => Some(basic),
            _ => None,
        }
    }
}

impl From<BasicCondition> for Condition {
    fn from(basic: BasicCondition) -> Self {
        Condition::Basic(basic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_parse_from_sql_spelling() {
        for op in Operator::ALL {
            assert_eq!(op.as_sql().parse::<Operator>().unwrap(), op);
        }
        assert_eq!("<>".parse::<Operator>().unwrap(), Operator::NotEqual);
        assert_eq!("not   in".parse::<Operator>().unwrap(), Operator::NotIn);
    }

    #[test]
    fn unknown_operator_is_validation_error() {
        let err = "~~".parse::<Operator>().unwrap_err();
        assert!(err.is_validation());
        assert!(err.message().contains("~~"));
    }

    #[test]
    fn null_checks_drop_their_value() {
        let c = BasicCondition::new("deleted_at", Operator::IsNull, 5);
        assert_eq!(c.value(), &Value::Null);
        assert_eq!(c.field(), "deleted_at");
    }

    #[test]
    fn in_list_collects_values() {
        let c = Condition::in_list("id", [1, 2, 3]);
        let basic = c.as_basic().unwrap();
        assert_eq!(basic.operator(), Operator::In);
        assert_eq!(
            basic.value(),
            &Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn having_subset() {
        let comparison: Vec<_> = Operator::ALL.into_iter().filter(|op| op.is_comparison()).collect();
        assert_eq!(comparison.len(), 6);
        assert!(!Operator::Like.is_comparison());
    }
}
