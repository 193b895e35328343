//! Entity derive macro implementation

mod attrs;

use crate::common::syn_types::{option_inner, vec_inner};
use attrs::{FieldAttrs, RelationKind, parse_field, parse_struct};
use heck::ToSnakeCase;
use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, Result};

struct Column {
    ident: syn::Ident,
    ty: syn::Type,
    name: String,
    attrs: FieldAttrs,
}

struct RelationField {
    ident: syn::Ident,
    inner: syn::Type,
    kind: RelationKind,
    foreign_key: String,
    references: Option<String>,
    table: Option<String>,
}

/// `UserProfile` -> `user_profiles`, `Category` -> `categories`, `Box` -> `boxes`.
fn default_table_name(struct_name: &str) -> String {
    let snake = struct_name.to_snake_case();
    let consonant_y = snake.ends_with('y')
        && !matches!(snake.chars().rev().nth(1), Some('a' | 'e' | 'i' | 'o' | 'u'));
    if consonant_y {
        format!("{}ies", &snake[..snake.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|end| snake.ends_with(end)) {
        format!("{snake}es")
    } else {
        format!("{snake}s")
    }
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Entity can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Entity can only be derived for structs",
            ));
        }
    };

    let struct_attrs = parse_struct(&input)?;
    let entity_name = name.to_string();
    let table = struct_attrs
        .table
        .clone()
        .unwrap_or_else(|| default_table_name(&entity_name));

    let mut columns: Vec<Column> = Vec::new();
    let mut relations: Vec<RelationField> = Vec::new();
    let mut skipped: Vec<syn::Ident> = Vec::new();

    for field in fields {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let mut field_attrs = parse_field(field)?;
        if let Some(rel) = field_attrs.relation.take() {
            let inner = match rel.kind {
                RelationKind::HasMany => vec_inner(&field.ty),
                RelationKind::HasOne | RelationKind::BelongsTo => option_inner(&field.ty),
            };
            let inner = inner.cloned().ok_or_else(|| {
                let expected = match rel.kind {
                    RelationKind::HasMany => "has_many fields must be Vec<T>",
                    _ => "has_one and belongs_to fields must be Option<T>",
                };
                syn::Error::new_spanned(&field.ty, expected)
            })?;
            relations.push(RelationField {
                ident,
                inner,
                kind: rel.kind,
                foreign_key: rel.foreign_key,
                references: rel.references,
                table: rel.table,
            });
            continue;
        }
        if field_attrs.skip {
            skipped.push(ident);
            continue;
        }
        let column_name = field_attrs.column.clone().unwrap_or_else(|| ident.to_string());
        columns.push(Column {
            ident,
            ty: field.ty.clone(),
            name: column_name,
            attrs: field_attrs,
        });
    }

    if columns.is_empty() {
        return Err(syn::Error::new_spanned(
            &input,
            "Entity needs at least one persisted field",
        ));
    }
    if !columns.iter().any(|c| c.attrs.primary_key) {
        if let Some(id) = columns.iter_mut().find(|c| c.ident == "id") {
            id.attrs.primary_key = true;
        }
    }
    let primary_keys: Vec<&Column> = columns.iter().filter(|c| c.attrs.primary_key).collect();

    let field_infos: Vec<TokenStream> = columns.iter().map(field_info).collect();
    let column_names: Vec<&String> = columns.iter().map(|c| &c.name).collect();
    let column_idents: Vec<&syn::Ident> = columns.iter().map(|c| &c.ident).collect();
    let relation_idents: Vec<&syn::Ident> = relations.iter().map(|r| &r.ident).collect();
    let capacity = columns.len();

    let primary_key_value = primary_keys.first().map(|pk| {
        let ident = &pk.ident;
        quote! {
            fn primary_key_value(&self) -> gpa::Value {
                gpa::ColumnType::to_value(&self.#ident)
            }
        }
    });

    let relation_methods = if relations.is_empty() {
        None
    } else {
        let pk_column = primary_keys
            .first()
            .map(|pk| pk.name.clone())
            .unwrap_or_else(|| "id".to_string());
        Some(relation_methods(&relations, &pk_column))
    };

    let hook_accessors = struct_attrs.hooks.iter().map(|hook| {
        let (method, trait_name, by_mut) = hook.accessor();
        let method = format_ident!("{}", method);
        let trait_ident = syn::Ident::new(trait_name, Span::call_site());
        if by_mut {
            quote! {
                fn #method(&mut self) -> Option<&mut dyn gpa::hooks::#trait_ident> {
                    Some(self)
                }
            }
        } else {
            quote! {
                fn #method(&self) -> Option<&dyn gpa::hooks::#trait_ident> {
                    Some(self)
                }
            }
        }
    });

    Ok(quote! {
        impl #impl_generics gpa::Entity for #name #ty_generics #where_clause {
            fn entity_info() -> gpa::EntityInfo {
                gpa::EntityInfo::new(#entity_name, #table, vec![#(#field_infos),*])
            }

            fn to_record(&self) -> gpa::Record {
                let mut record = gpa::Record::with_capacity(#capacity);
                #(
                    record.set(#column_names, gpa::ColumnType::to_value(&self.#column_idents));
                )*
                record
            }

            fn from_record(record: &gpa::Record) -> Result<Self, gpa::StoreError> {
                Ok(Self {
                    #( #column_idents: record.get_or_default(#column_names)?, )*
                    #( #skipped: ::core::default::Default::default(), )*
                    #( #relation_idents: ::core::default::Default::default(), )*
                })
            }

            fn apply_record(&mut self, record: &gpa::Record) -> Result<(), gpa::StoreError> {
                #(
                    if record.contains(#column_names) {
                        self.#column_idents = record.get_or_default(#column_names)?;
                    }
                )*
                Ok(())
            }

            #primary_key_value

            #relation_methods

            #(#hook_accessors)*
        }
    })
}

/// The `FieldInfo` builder expression for one column.
fn field_info(column: &Column) -> TokenStream {
    let ty = &column.ty;
    let field_name = column.ident.to_string();
    let column_name = &column.name;
    let attrs = &column.attrs;

    let mut chain = quote! { gpa::FieldInfo::of::<#ty>(#field_name).column(#column_name) };
    if attrs.not_null {
        chain.extend(quote! { .nullable(false) });
    }
    if attrs.nullable {
        chain.extend(quote! { .nullable(true) });
    }
    if attrs.primary_key {
        chain.extend(quote! { .primary_key() });
    }
    if attrs.auto_increment {
        chain.extend(quote! { .auto_increment() });
    }
    if attrs.unique {
        chain.extend(quote! { .unique() });
    }
    if let Some(size) = attrs.size {
        chain.extend(quote! { .max_length(#size) });
    }
    if let Some(precision) = attrs.precision {
        let scale = match attrs.scale {
            Some(s) => quote! { Some(#s) },
            None => quote! { None },
        };
        chain.extend(quote! { .precision(#precision, #scale) });
    }
    if let Some(default) = &attrs.default {
        chain.extend(quote! { .default_value(#default) });
    }
    if let Some(db_type) = &attrs.db_type {
        chain.extend(quote! { .db_type(#db_type) });
    }

    if attrs.primary_key && !attrs.auto_increment {
        // Integer primary keys are generated by the store.
        quote! {{
            let field = #chain;
            if field.field_type.is_integer() { field.auto_increment() } else { field }
        }}
    } else {
        chain
    }
}

fn relation_methods(relations: &[RelationField], pk_column: &str) -> TokenStream {
    let declarations = relations.iter().map(|rel| {
        let name = rel.ident.to_string();
        let inner = &rel.inner;
        let ctor = format_ident!("{}", rel.kind.constructor());
        let fk = &rel.foreign_key;
        let references = rel.references.clone().unwrap_or_else(|| match rel.kind {
            RelationKind::BelongsTo => "id".to_string(),
            RelationKind::HasMany | RelationKind::HasOne => pk_column.to_string(),
        });
        let table = match &rel.table {
            Some(t) => quote! { ::std::string::String::from(#t) },
            None => quote! { <#inner as gpa::Entity>::entity_info().table },
        };
        quote! {
            gpa::Relation::#ctor(#name, &#table, #fk, #references)
        }
    });

    let arms = relations.iter().map(|rel| {
        let name = rel.ident.to_string();
        let ident = &rel.ident;
        let inner = &rel.inner;
        match rel.kind {
            RelationKind::HasMany => quote! {
                #name => {
                    self.#ident = rows
                        .iter()
                        .map(<#inner as gpa::Entity>::from_record)
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(gpa::classify)?;
                    Ok(())
                }
            },
            RelationKind::HasOne | RelationKind::BelongsTo => quote! {
                #name => {
                    self.#ident = match rows.first() {
                        Some(row) => Some(<#inner as gpa::Entity>::from_record(row).map_err(gpa::classify)?),
                        None => None,
                    };
                    Ok(())
                }
            },
        }
    });

    quote! {
        fn relations() -> Vec<gpa::Relation> {
            vec![#(#declarations),*]
        }

        fn attach(&mut self, relation: &str, rows: Vec<gpa::Record>) -> gpa::OrmResult<()> {
            match relation {
                #(#arms)*
                other => Err(gpa::OrmError::validation(format!("unknown relation: {other}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_snake_plural() {
        assert_eq!(default_table_name("User"), "users");
        assert_eq!(default_table_name("UserProfile"), "user_profiles");
        assert_eq!(default_table_name("Category"), "categories");
        assert_eq!(default_table_name("Day"), "days");
        assert_eq!(default_table_name("Address"), "addresses");
    }

    #[test]
    fn rejects_tuple_structs() {
        let input: DeriveInput = syn::parse_quote! {
            struct Pair(i64, i64);
        };
        assert!(expand(input).is_err());
    }

    #[test]
    fn rejects_bad_relation_shape() {
        let input: DeriveInput = syn::parse_quote! {
            struct User {
                id: i64,
                #[orm(has_many(foreign_key = "user_id"))]
                posts: Option<Post>,
            }
        };
        let err = expand(input).unwrap_err();
        assert!(err.to_string().contains("Vec<T>"));
    }

    #[test]
    fn rejects_unknown_attribute() {
        let input: DeriveInput = syn::parse_quote! {
            struct User {
                #[orm(primary)]
                id: i64,
            }
        };
        assert!(expand(input).is_err());
    }

    #[test]
    fn expands_hooks_and_relations() {
        let input: DeriveInput = syn::parse_quote! {
            #[orm(table = "members", hooks(validate, after_find))]
            struct User {
                id: i64,
                name: String,
                #[orm(has_many(foreign_key = "user_id"))]
                posts: Vec<Post>,
            }
        };
        let out = expand(input).unwrap().to_string();
        assert!(out.contains("\"members\""));
        assert!(out.contains("validate_hook"));
        assert!(out.contains("after_find_hook"));
        assert!(out.contains("has_many"));
        assert!(!out.contains("before_create_hook"));
    }
}
