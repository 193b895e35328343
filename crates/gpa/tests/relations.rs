//! Eager loading of declared relations.
#![cfg(feature = "derive")]

use gpa::prelude::*;
use gpa::{Relation, RelationKind};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Entity)]
struct Author {
    id: i64,
    name: String,
    #[orm(has_many(foreign_key = "author_id"))]
    posts: Vec<Post>,
    #[orm(has_one(foreign_key = "author_id"))]
    profile: Option<Profile>,
}

#[derive(Debug, Clone, Default, PartialEq, Entity)]
struct Post {
    id: i64,
    author_id: Option<i64>,
    title: String,
    #[orm(belongs_to(foreign_key = "author_id"))]
    author: Option<Author>,
}

#[derive(Debug, Clone, Default, PartialEq, Entity)]
struct Profile {
    id: i64,
    author_id: i64,
    bio: String,
}

struct Fixture {
    authors: Repository<Author>,
    posts: Repository<Post>,
    ann: i64,
    ben: i64,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let authors: Repository<Author> = Repository::new(store);
    let posts = authors.for_entity::<Post>();
    let profiles = authors.for_entity::<Profile>();
    authors.create_table().await.unwrap();
    posts.create_table().await.unwrap();
    profiles.create_table().await.unwrap();

    let mut ann = Author {
        name: "ann".into(),
        ..Author::default()
    };
    let mut ben = Author {
        name: "ben".into(),
        ..Author::default()
    };
    authors.create(&mut ann).await.unwrap();
    authors.create(&mut ben).await.unwrap();

    let post = |author_id: Option<i64>, title: &str| Post {
        author_id,
        title: title.into(),
        ..Post::default()
    };
    let mut batch = vec![
        post(Some(ann.id), "first"),
        post(Some(ann.id), "second"),
        post(None, "anonymous"),
    ];
    posts.create_batch(&mut batch).await.unwrap();
    profiles
        .create(&mut Profile {
            id: 0,
            author_id: ben.id,
            bio: "writes rarely".into(),
        })
        .await
        .unwrap();

    Fixture {
        authors,
        posts,
        ann: ann.id,
        ben: ben.id,
    }
}

#[test]
fn relations_are_declared_from_attributes() {
    let relations = Author::relations();
    assert_eq!(
        relations,
        vec![
            Relation::has_many("posts", "posts", "author_id", "id"),
            Relation::has_one("profile", "profiles", "author_id", "id"),
        ]
    );
    let belongs = &Post::relations()[0];
    assert_eq!(belongs.kind, RelationKind::BelongsTo);
    assert_eq!(belongs.table, "authors");
    assert_eq!(belongs.parent_column(), "author_id");
    assert_eq!(belongs.related_column(), "id");
}

#[tokio::test]
async fn has_many_and_has_one_are_matched_per_parent() {
    let f = fixture().await;
    let authors = f
        .authors
        .find_with_relations(&["posts", "profile"], [order_by("id", Direction::Asc)])
        .await
        .unwrap();

    let ann = &authors[0];
    let mut titles: Vec<&str> = ann.posts.iter().map(|p| p.title.as_str()).collect();
    titles.sort();
    assert_eq!(titles, ["first", "second"]);
    assert!(ann.profile.is_none());

    let ben = &authors[1];
    assert!(ben.posts.is_empty());
    assert_eq!(ben.profile.as_ref().map(|p| p.bio.as_str()), Some("writes rarely"));
}

#[tokio::test]
async fn belongs_to_skips_null_keys() {
    let f = fixture().await;
    let posts = f
        .posts
        .query([preload("author"), order_by("id", Direction::Asc)])
        .await
        .unwrap();

    assert_eq!(posts.len(), 3);
    assert_eq!(posts[0].author.as_ref().map(|a| a.id), Some(f.ann));
    assert_eq!(posts[1].author.as_ref().map(|a| a.name.as_str()), Some("ann"));
    assert!(posts[2].author.is_none());
}

#[tokio::test]
async fn find_by_id_with_relations_loads_one() {
    let f = fixture().await;
    let ben = f.authors.find_by_id_with_relations(f.ben, &["profile"]).await.unwrap();
    assert!(ben.profile.is_some());
    // Relations not asked for stay empty.
    assert!(ben.posts.is_empty());

    let err = f
        .authors
        .find_by_id_with_relations(999, &["profile"])
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn unknown_relation_is_rejected() {
    let f = fixture().await;
    let err = f
        .authors
        .find_with_relations(&["comments"], [])
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(err.message(), "unknown relation: comments");
}

#[tokio::test]
async fn relation_fields_are_not_columns() {
    let f = fixture().await;
    let columns = f.authors.entity_info().columns().join(",");
    assert_eq!(columns, "id,name");
    let plain = f.authors.find_by_id(f.ann).await.unwrap();
    assert!(plain.posts.is_empty());
}
