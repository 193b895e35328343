//! Derive macros for gpa
//!
//! Provides `#[derive(Entity)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod common;
mod entity;

/// Derive `gpa::Entity` for a struct with named fields.
///
/// # Example
///
/// ```ignore
/// use gpa::Entity;
///
/// #[derive(Debug, Clone, Default, Entity)]
/// #[orm(table = "users", hooks(validate, before_create))]
/// struct User {
///     #[orm(id)]
///     id: i64,
///     #[orm(size = 255, unique)]
///     email: String,
///     #[orm(column = "years")]
///     age: Option<i32>,
///     #[orm(precision = 10, scale = 2, default = "0")]
///     balance: f64,
///     #[orm(has_many(foreign_key = "user_id"))]
///     posts: Vec<Post>,
///     #[orm(skip)]
///     cached_label: String,
/// }
/// ```
///
/// # Struct attributes
///
/// - `table = "name"`: table name; defaults to the snake_case plural of the struct name
/// - `hooks(validate, before_create, after_create, before_update, after_update,
///   before_delete, after_delete, after_find)`: hooks the struct implements
///
/// # Field attributes
///
/// - `id` / `primary_key`: primary key; a field named `id` is the default
/// - `auto_increment`: store-generated; implied for integer primary keys
/// - `column = "name"`: column name; defaults to the field name
/// - `size = n`, `precision = p`, `scale = s`, `db_type = "..."`: column type
/// - `unique`, `not_null`, `nullable`, `default = "sql expression"`
/// - `skip`: not persisted; filled with `Default::default()` when loaded
/// - `has_many(...)`, `has_one(...)`, `belongs_to(...)`: a relation field, with
///   `foreign_key = "..."` (required), `references = "..."` and `table = "..."`
#[proc_macro_derive(Entity, attributes(orm))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    entity::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
