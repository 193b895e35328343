//! Attribute parsing for the Entity derive macro.
//!
//! Handles struct-level and field-level `#[orm(...)]` attributes.

use syn::meta::ParseNestedMeta;
use syn::{DeriveInput, LitInt, LitStr, Result};

/// Lifecycle hooks a struct opts into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Hook {
    Validate,
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    AfterFind,
}

impl Hook {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "validate" => Hook::Validate,
            "before_create" => Hook::BeforeCreate,
            "after_create" => Hook::AfterCreate,
            "before_update" => Hook::BeforeUpdate,
            "after_update" => Hook::AfterUpdate,
            "before_delete" => Hook::BeforeDelete,
            "after_delete" => Hook::AfterDelete,
            "after_find" => Hook::AfterFind,
            _ => return None,
        })
    }

    /// (accessor method, hook trait, accessor takes `&mut self`)
    pub(super) fn accessor(self) -> (&'static str, &'static str, bool) {
        match self {
            Hook::Validate => ("validate_hook", "Validate", false),
            Hook::BeforeCreate => ("before_create_hook", "BeforeCreate", true),
            Hook::AfterCreate => ("after_create_hook", "AfterCreate", true),
            Hook::BeforeUpdate => ("before_update_hook", "BeforeUpdate", true),
            Hook::AfterUpdate => ("after_update_hook", "AfterUpdate", true),
            Hook::BeforeDelete => ("before_delete_hook", "BeforeDelete", false),
            Hook::AfterDelete => ("after_delete_hook", "AfterDelete", false),
            Hook::AfterFind => ("after_find_hook", "AfterFind", true),
        }
    }
}

#[derive(Default)]
pub(super) struct StructAttrs {
    pub table: Option<String>,
    pub hooks: Vec<Hook>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RelationKind {
    HasMany,
    HasOne,
    BelongsTo,
}

impl RelationKind {
    pub(super) fn constructor(self) -> &'static str {
        match self {
            RelationKind::HasMany => "has_many",
            RelationKind::HasOne => "has_one",
            RelationKind::BelongsTo => "belongs_to",
        }
    }
}

pub(super) struct RelationAttr {
    pub kind: RelationKind,
    pub foreign_key: String,
    pub references: Option<String>,
    pub table: Option<String>,
}

#[derive(Default)]
pub(super) struct FieldAttrs {
    pub primary_key: bool,
    pub auto_increment: bool,
    pub column: Option<String>,
    pub size: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub unique: bool,
    pub default: Option<String>,
    pub db_type: Option<String>,
    pub not_null: bool,
    pub nullable: bool,
    pub skip: bool,
    pub relation: Option<RelationAttr>,
}

fn lit_str(meta: &ParseNestedMeta) -> Result<String> {
    Ok(meta.value()?.parse::<LitStr>()?.value())
}

fn lit_u32(meta: &ParseNestedMeta) -> Result<u32> {
    meta.value()?.parse::<LitInt>()?.base10_parse()
}

fn orm_attrs(attrs: &[syn::Attribute]) -> impl Iterator<Item = &syn::Attribute> {
    attrs.iter().filter(|a| a.path().is_ident("orm"))
}

/// Parse `#[orm(table = "...", hooks(...))]` on the struct.
pub(super) fn parse_struct(input: &DeriveInput) -> Result<StructAttrs> {
    let mut out = StructAttrs::default();
    for attr in orm_attrs(&input.attrs) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                out.table = Some(lit_str(&meta)?);
                return Ok(());
            }
            if meta.path.is_ident("hooks") {
                return meta.parse_nested_meta(|hook| {
                    let name = hook
                        .path
                        .get_ident()
                        .map(|i| i.to_string())
                        .unwrap_or_default();
                    let parsed = Hook::from_name(&name).ok_or_else(|| hook.error("unknown hook"))?;
                    if !out.hooks.contains(&parsed) {
                        out.hooks.push(parsed);
                    }
                    Ok(())
                });
            }
            Err(meta.error("unknown orm attribute; expected `table` or `hooks`"))
        })?;
    }
    Ok(out)
}

/// Parse every `#[orm(...)]` on a field.
pub(super) fn parse_field(field: &syn::Field) -> Result<FieldAttrs> {
    let mut out = FieldAttrs::default();
    for attr in orm_attrs(&field.attrs) {
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("id") || path.is_ident("primary_key") {
                out.primary_key = true;
            } else if path.is_ident("auto_increment") {
                out.auto_increment = true;
            } else if path.is_ident("unique") {
                out.unique = true;
            } else if path.is_ident("not_null") {
                out.not_null = true;
            } else if path.is_ident("nullable") {
                out.nullable = true;
            } else if path.is_ident("skip") {
                out.skip = true;
            } else if path.is_ident("column") {
                out.column = Some(lit_str(&meta)?);
            } else if path.is_ident("default") {
                out.default = Some(lit_str(&meta)?);
            } else if path.is_ident("db_type") {
                out.db_type = Some(lit_str(&meta)?);
            } else if path.is_ident("size") {
                out.size = Some(lit_u32(&meta)?);
            } else if path.is_ident("precision") {
                out.precision = Some(lit_u32(&meta)?);
            } else if path.is_ident("scale") {
                out.scale = Some(lit_u32(&meta)?);
            } else if path.is_ident("has_many") {
                out.relation = Some(parse_relation(RelationKind::HasMany, &meta)?);
            } else if path.is_ident("has_one") {
                out.relation = Some(parse_relation(RelationKind::HasOne, &meta)?);
            } else if path.is_ident("belongs_to") {
                out.relation = Some(parse_relation(RelationKind::BelongsTo, &meta)?);
            } else {
                return Err(meta.error("unknown orm field attribute"));
            }
            Ok(())
        })?;
    }

    if out.not_null && out.nullable {
        return Err(syn::Error::new_spanned(field, "`not_null` and `nullable` conflict"));
    }
    if out.scale.is_some() && out.precision.is_none() {
        return Err(syn::Error::new_spanned(field, "`scale` requires `precision`"));
    }
    if out.relation.is_some() && (out.primary_key || out.skip || out.column.is_some()) {
        return Err(syn::Error::new_spanned(
            field,
            "a relation field cannot also be a column or skipped",
        ));
    }
    Ok(out)
}

fn parse_relation(kind: RelationKind, meta: &ParseNestedMeta) -> Result<RelationAttr> {
    let mut foreign_key = None;
    let mut references = None;
    let mut table = None;
    meta.parse_nested_meta(|inner| {
        if inner.path.is_ident("foreign_key") {
            foreign_key = Some(lit_str(&inner)?);
        } else if inner.path.is_ident("references") {
            references = Some(lit_str(&inner)?);
        } else if inner.path.is_ident("table") {
            table = Some(lit_str(&inner)?);
        } else {
            return Err(inner.error("expected `foreign_key`, `references` or `table`"));
        }
        Ok(())
    })?;

    let foreign_key = foreign_key.ok_or_else(|| {
        meta.error(format!("{} requires foreign_key = \"...\"", kind.constructor()))
    })?;
    Ok(RelationAttr {
        kind,
        foreign_key,
        references,
        table,
    })
}
