//! Convenient imports for typical `gpa` usage.
//!
//! ```ignore
//! use gpa::prelude::*;
//! ```

pub use crate::{
    Condition, Config, Direction, Entity, ErrorKind, MemoryStore, Operator, OrmError, OrmResult, Record,
    Repository, Transaction, TxOptions, Value, distinct, filter, filter_condition, group_by, having,
    inner_join, join, left_join, limit, offset, order_by, preload, select,
};

#[cfg(feature = "postgres")]
pub use crate::{PgStore, create_pool};
