//! Entity lifecycle hooks.
//!
//! An entity opts into a hook by implementing the matching trait and
//! returning `Some(self)` from the accessor on [`Entity`](crate::Entity):
//!
//! ```ignore
//! impl Validate for User {
//!     fn validate(&self) -> Result<(), HookError> {
//!         if self.email.is_empty() {
//!             return Err("email is required".into());
//!         }
//!         Ok(())
//!     }
//! }
//!
//! impl Entity for User {
//!     // ...
//!     fn validate_hook(&self) -> Option<&dyn Validate> {
//!         Some(self)
//!     }
//! }
//! ```
//!
//! `#[derive(Entity)]` writes the accessors from `#[orm(hooks(...))]`.
//!
//! Failure semantics:
//! - `Validate` and every `Before*` hook run before anything is persisted. An
//!   error aborts the operation as a `Validation` error wrapping the hook's
//!   error.
//! - `After*` hooks run once the store has accepted the write. Their errors
//!   never fail the operation and are never rolled back; they go to the
//!   repository's [`HookObserver`].

use crate::error::BoxError;
use std::fmt;

/// Error type returned by hooks.
pub type HookError = BoxError;

/// Runs before create and update.
pub trait Validate {
    fn validate(&self) -> Result<(), HookError>;
}

pub trait BeforeCreate {
    fn before_create(&mut self) -> Result<(), HookError>;
}

pub trait AfterCreate {
    fn after_create(&mut self) -> Result<(), HookError>;
}

pub trait BeforeUpdate {
    fn before_update(&mut self) -> Result<(), HookError>;
}

pub trait AfterUpdate {
    fn after_update(&mut self) -> Result<(), HookError>;
}

pub trait BeforeDelete {
    fn before_delete(&self) -> Result<(), HookError>;
}

pub trait AfterDelete {
    fn after_delete(&self) -> Result<(), HookError>;
}

/// Runs on every entity returned by a find or query.
pub trait AfterFind {
    fn after_find(&mut self) -> Result<(), HookError>;
}

/// Lifecycle point of a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    Validate,
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    AfterFind,
}

impl HookPoint {
    pub fn as_str(self) -> &'static str {
        match self {
            HookPoint::Validate => "validate",
            HookPoint::BeforeCreate => "before_create",
            HookPoint::AfterCreate => "after_create",
            HookPoint::BeforeUpdate => "before_update",
            HookPoint::AfterUpdate => "after_update",
            HookPoint::BeforeDelete => "before_delete",
            HookPoint::AfterDelete => "after_delete",
            HookPoint::AfterFind => "after_find",
        }
    }

    /// Whether a failure at this point aborts the operation.
    pub fn aborts(self) -> bool {
        matches!(
            self,
            HookPoint::Validate | HookPoint::BeforeCreate | HookPoint::BeforeUpdate | HookPoint::BeforeDelete
        )
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives post-persistence hook failures.
///
/// These errors are not returned to the caller; the operation has already
/// succeeded. Observers exist so they stay visible.
pub trait HookObserver: Send + Sync {
    fn hook_failed(&self, entity: &str, point: HookPoint, error: &HookError);
}

/// Logs swallowed hook failures with `tracing` at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHookObserver;

impl HookObserver for TracingHookObserver {
    fn hook_failed(&self, entity: &str, point: HookPoint, error: &HookError) {
        tracing::warn!(
            target: "gpa.hooks",
            entity = entity,
            hook = point.as_str(),
            error = %error,
            "hook failed after persistence"
        );
    }
}

/// Discards hook failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHookObserver;

impl HookObserver for NoopHookObserver {
    fn hook_failed(&self, _entity: &str, _point: HookPoint, _error: &HookError) {}
}
