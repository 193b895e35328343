//! Basic usage example for gpa
//!
//! Run with: cargo run --example basic -p gpa
//!
//! Uses the in-memory store, so no database is needed.

use gpa::hooks::{HookError, Validate};
use gpa::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Entity)]
#[orm(table = "users", hooks(validate))]
struct User {
    #[orm(id)]
    id: i64,
    #[orm(size = 100)]
    name: String,
    #[orm(size = 255, unique)]
    email: String,
    age: i32,
    #[orm(has_many(foreign_key = "user_id"))]
    posts: Vec<Post>,
}

impl Validate for User {
    fn validate(&self) -> Result<(), HookError> {
        if !self.email.contains('@') {
            return Err(format!("invalid email: {}", self.email).into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Entity)]
struct Post {
    id: i64,
    user_id: i64,
    title: String,
}

fn user(name: &str, age: i32) -> User {
    User {
        name: name.into(),
        email: format!("{name}@example.com"),
        age,
        ..User::default()
    }
}

#[tokio::main]
async fn main() -> Result<(), OrmError> {
    let store = Arc::new(MemoryStore::new());
    let users: Repository<User> = Repository::new(store);
    let posts = users.for_entity::<Post>();
    users.migrate_table().await?;
    posts.migrate_table().await?;

    // ============================================
    // Insert
    // ============================================
    println!("=== Insert ===");
    let mut alice = user("alice", 30);
    users.create(&mut alice).await?;
    println!("alice got id {}", alice.id);

    let mut rest = vec![user("bob", 17), user("carol", 42), user("dave", 25)];
    users.create_batch(&mut rest).await?;
    println!("inserted {} more", rest.len());

    // ============================================
    // Query
    // ============================================
    println!("\n=== Adults by age ===");
    let adults = users
        .query([
            filter("age", Operator::GreaterThanOrEqual, 18),
            order_by("age", Direction::Desc),
        ])
        .await?;
    for u in &adults {
        println!("{:>6} {}", u.name, u.age);
    }

    let teens = Condition::and([
        Condition::new("age", Operator::GreaterThanOrEqual, 13),
        Condition::new("age", Operator::LessThan, 20),
    ]);
    println!("teenagers: {}", users.count([filter_condition(teens)]).await?);

    // ============================================
    // Errors are classified
    // ============================================
    println!("\n=== Errors ===");
    let mut twin = user("alice", 31);
    match users.create(&mut twin).await {
        Err(e) if e.is_duplicate() => println!("duplicate: {e}"),
        other => println!("unexpected: {other:?}"),
    }
    let mut broken = User {
        email: "nobody".into(),
        ..user("eve", 20)
    };
    if let Err(e) = users.create(&mut broken).await {
        println!("{:?}: {}", e.kind(), e.message());
    }
    if let Err(e) = users.find_by_id(999).await {
        println!("{:?}: {}", e.kind(), e.message());
    }

    // ============================================
    // Transaction with a relation
    // ============================================
    println!("\n=== Transaction ===");
    let author = alice.id;
    users
        .transaction(|tx| async move {
            let posts = tx.for_entity::<Post>();
            for title in ["Hello", "Second thoughts"] {
                posts
                    .create(&mut Post {
                        id: 0,
                        user_id: author,
                        title: title.into(),
                    })
                    .await?;
            }
            tx.update_partial(author, Record::new().with("age", 31)).await?;
            Ok::<_, OrmError>(())
        })
        .await?;

    let alice = users.find_by_id_with_relations(author, &["posts"]).await?;
    println!("{} ({}) wrote:", alice.name, alice.age);
    for post in &alice.posts {
        println!("  - {}", post.title);
    }

    Ok(())
}
