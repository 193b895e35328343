//! Error types and the store-error classifier.
//!
//! Every repository operation returns [`OrmResult`]. Store implementations
//! report failures as [`StoreError`]; the repository runs them through
//! [`classify`] so callers only ever see the closed [`ErrorKind`] taxonomy.

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Boxed, thread-safe error used as an error cause.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type alias for repository operations
pub type OrmResult<T> = Result<T, OrmError>;

/// The closed set of error classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No row matched.
    NotFound,
    /// A uniqueness or key conflict.
    Duplicate,
    /// Input or hook rejected the operation before it reached the store.
    Validation,
    /// Any other store failure.
    Database,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::Validation => "validation",
            ErrorKind::Database => "database",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified repository error.
#[derive(Debug, Error)]
#[error("{kind} error: {message}")]
pub struct OrmError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<BoxError>,
}

impl OrmError {
    /// Create an error of the given kind without a cause.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Create an error of the given kind wrapping `cause`.
    pub fn with_cause(kind: ErrorKind, message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a duplicate error
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Duplicate, message)
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The underlying error this one was classified from, if any.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Check if this is a duplicate error
    pub fn is_duplicate(&self) -> bool {
        self.kind == ErrorKind::Duplicate
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        self.kind == ErrorKind::Validation
    }

    /// Check if this is a database error
    pub fn is_database(&self) -> bool {
        self.kind == ErrorKind::Database
    }
}

/// Errors reported by [`Store`](crate::store::Store) implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A single-row fetch matched nothing.
    #[error("no rows in result set")]
    NoRows,

    /// Unique constraint violation
    #[error("unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Query execution error
    #[cfg(feature = "postgres")]
    #[error("query error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Pool error
    #[cfg(feature = "postgres")]
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// The statement referenced a table the store does not have.
    #[error("no such table: {0}")]
    MissingTable(String),

    /// The transaction handle was used after commit or rollback.
    #[error("transaction already closed")]
    TransactionClosed,

    /// The store cannot execute this kind of statement.
    #[error("unsupported by store: {0}")]
    Unsupported(String),

    /// Row decode/mapping error
    #[error("decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// The store refused to build the statement, e.g. an invalid identifier.
    #[error(transparent)]
    Rejected(#[from] OrmError),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }
}

/// Map a raw error onto the [`ErrorKind`] taxonomy.
///
/// Rules, in priority order:
/// 1. an [`OrmError`] is returned unchanged;
/// 2. [`StoreError::NoRows`] becomes `NotFound`;
/// 3. a uniqueness conflict ([`StoreError::UniqueViolation`] or SQLSTATE `23505`)
///    becomes `Duplicate`;
/// 4. anything else becomes `Database` with the original kept as the cause.
///
/// The "no error" case is [`classify_result`] on an `Ok` value.
pub fn classify(raw: impl Into<BoxError>) -> OrmError {
    let raw: BoxError = raw.into();

    let raw = match raw.downcast::<OrmError>() {
        Ok(already) => return *already,
        Err(raw) => raw,
    };
    let raw: BoxError = match raw.downcast::<StoreError>() {
        Ok(store) => match *store {
            StoreError::Rejected(inner) => return inner,
            other => Box::new(other),
        },
        Err(raw) => raw,
    };

    if let Some((kind, message)) = known_signal(raw.as_ref()) {
        return OrmError::with_cause(kind, message, raw);
    }

    let message = raw.to_string();
    OrmError::with_cause(ErrorKind::Database, message, raw)
}

/// Classify the error side of a result; `Ok` passes through untouched.
pub fn classify_result<T, E>(result: Result<T, E>) -> OrmResult<T>
where
    E: Into<BoxError>,
{
    result.map_err(classify)
}

fn known_signal(raw: &(dyn StdError + Send + Sync + 'static)) -> Option<(ErrorKind, &'static str)> {
    if let Some(store_err) = raw.downcast_ref::<StoreError>() {
        match store_err {
            StoreError::NoRows => return Some((ErrorKind::NotFound, "record not found")),
            StoreError::UniqueViolation(_) => return Some((ErrorKind::Duplicate, "duplicate key")),
            #[cfg(feature = "postgres")]
            StoreError::Postgres(pg) if is_unique_violation(pg) => {
                return Some((ErrorKind::Duplicate, "duplicate key"));
            }
            _ => return None,
        }
    }

    #[cfg(feature = "postgres")]
    if let Some(pg) = raw.downcast_ref::<tokio_postgres::Error>() {
        if is_unique_violation(pg) {
            return Some((ErrorKind::Duplicate, "duplicate key"));
        }
    }

    None
}

#[cfg(feature = "postgres")]
fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.as_db_error()
        .is_some_and(|db| db.code() == &tokio_postgres::error::SqlState::UNIQUE_VIOLATION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_passes_through() {
        let out: OrmResult<u32> = classify_result(Ok::<u32, StoreError>(7));
        assert_eq!(out.unwrap(), 7);
    }

    #[test]
    fn classified_errors_are_returned_unchanged() {
        let original = OrmError::validation("bad input");
        let again = classify(original);
        assert_eq!(again.kind(), ErrorKind::Validation);
        assert_eq!(again.message(), "bad input");
        assert!(again.cause().is_none());

        let twice = classify(classify(StoreError::NoRows));
        assert_eq!(twice.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn rejected_statements_keep_their_classification() {
        let err = classify(StoreError::from(OrmError::validation("invalid identifier")));
        assert!(err.is_validation());
        assert_eq!(err.message(), "invalid identifier");
    }

    #[test]
    fn no_rows_is_not_found() {
        let err = classify(StoreError::NoRows);
        assert!(err.is_not_found());
    }

    #[test]
    fn unique_violation_is_duplicate() {
        let err = classify(StoreError::UniqueViolation("users.email".into()));
        assert!(err.is_duplicate());
        assert!(err.cause().is_some());
    }

    #[test]
    fn everything_else_is_database_with_cause() {
        let err = classify(StoreError::Other("connection reset".into()));
        assert!(err.is_database());
        let cause = err.cause().expect("cause preserved");
        assert_eq!(cause.to_string(), "connection reset");
        assert_eq!(err.message(), "connection reset");
        assert_eq!(err.to_string(), "database error: connection reset");

        let io = std::io::Error::other("disk full");
        let err = classify(io);
        assert!(err.is_database());
        assert_eq!(err.cause().unwrap().to_string(), "disk full");
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = OrmError::not_found("entity not found");
        assert_eq!(err.to_string(), "not found error: entity not found");
    }
}
