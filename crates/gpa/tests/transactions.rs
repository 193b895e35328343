//! Transaction scoping: commit, rollback, savepoints and caller error types.
#![cfg(feature = "derive")]

use gpa::prelude::*;
use gpa::IsolationLevel;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Entity)]
struct Account {
    id: i64,
    #[orm(unique)]
    owner: String,
    balance: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Entity)]
struct Transfer {
    id: i64,
    from_account: i64,
    to_account: i64,
    amount: i64,
}

fn account(owner: &str, balance: i64) -> Account {
    Account {
        id: 0,
        owner: owner.into(),
        balance,
    }
}

async fn setup() -> (MemoryStore, Repository<Account>) {
    let store = MemoryStore::new();
    let accounts: Repository<Account> = Repository::new(Arc::new(store.clone()));
    accounts.create_table().await.unwrap();
    accounts.for_entity::<Transfer>().create_table().await.unwrap();
    store.reset_counters();
    (store, accounts)
}

/// A caller-side error type; the closure may fail for its own reasons.
#[derive(Debug)]
enum AppError {
    Orm(OrmError),
    InsufficientFunds { wanted: i64, available: i64 },
}

impl From<OrmError> for AppError {
    fn from(e: OrmError) -> Self {
        AppError::Orm(e)
    }
}

#[tokio::test]
async fn ok_commits_every_write() {
    let (store, accounts) = setup().await;

    let (alice_id, bob_id) = accounts
        .transaction(|tx| async move {
            assert!(tx.in_transaction());
            let mut alice = account("alice", 100);
            let mut bob = account("bob", 50);
            tx.create(&mut alice).await?;
            tx.create(&mut bob).await?;
            Ok::<_, OrmError>((alice.id, bob.id))
        })
        .await
        .unwrap();

    assert_eq!(store.transactions_begun(), 1);
    assert_eq!(accounts.find_by_id(alice_id).await.unwrap().balance, 100);
    assert_eq!(accounts.find_by_id(bob_id).await.unwrap().balance, 50);
}

#[tokio::test]
async fn err_rolls_back_and_is_returned_unchanged() {
    let (_store, accounts) = setup().await;
    let mut existing = account("carol", 10);
    accounts.create(&mut existing).await.unwrap();
    let carol_id = existing.id;

    let result = accounts
        .transaction(|tx| async move {
            let mut dave = account("dave", 500);
            tx.create(&mut dave).await?;
            tx.update_partial(carol_id, Record::new().with("balance", 0)).await?;

            let wanted = 1_000;
            let available = dave.balance;
            if wanted > available {
                return Err(AppError::InsufficientFunds { wanted, available });
            }
            Ok(())
        })
        .await;

    match result {
        Err(AppError::InsufficientFunds { wanted, available }) => {
            assert_eq!((wanted, available), (1_000, 500));
        }
        other => panic!("expected the caller's error, got {other:?}"),
    }

    // Nothing from the closure survived; pre-existing rows are untouched.
    assert_eq!(accounts.count([]).await.unwrap(), 1);
    assert_eq!(accounts.find_by_id(carol_id).await.unwrap(), existing);
}

#[tokio::test]
async fn orm_errors_convert_into_the_caller_type() {
    let (_store, accounts) = setup().await;
    accounts.create(&mut account("erin", 1)).await.unwrap();

    let result: Result<(), AppError> = accounts
        .transaction(|tx| async move {
            tx.create(&mut account("frank", 1)).await?;
            // Duplicate owner.
            tx.create(&mut account("erin", 2)).await?;
            Ok(())
        })
        .await;

    match result {
        Err(AppError::Orm(e)) => assert!(e.is_duplicate()),
        other => panic!("expected a duplicate error, got {other:?}"),
    }
    assert_eq!(accounts.count([]).await.unwrap(), 1);
}

#[tokio::test]
async fn writes_to_other_entities_share_the_transaction() {
    let (_store, accounts) = setup().await;
    let mut from = account("gail", 100);
    let mut to = account("hank", 0);
    accounts.create_batch(&mut [from.clone(), to.clone()]).await.unwrap();
    from = accounts.query_one([filter("owner", Operator::Equal, "gail")]).await.unwrap();
    to = accounts.query_one([filter("owner", Operator::Equal, "hank")]).await.unwrap();

    let result = accounts
        .transaction(|tx| async move {
            let transfers = tx.for_entity::<Transfer>();
            assert!(transfers.in_transaction());
            let mut transfer = Transfer {
                id: 0,
                from_account: from.id,
                to_account: to.id,
                amount: 40,
            };
            transfers.create(&mut transfer).await?;
            tx.update_partial(from.id, Record::new().with("balance", from.balance - 40))
                .await?;
            Err::<(), _>(OrmError::validation("abort after writing"))
        })
        .await;
    assert!(result.unwrap_err().is_validation());

    let transfers = accounts.for_entity::<Transfer>();
    assert_eq!(transfers.count([]).await.unwrap(), 0);
    let gail = accounts.query_one([filter("owner", Operator::Equal, "gail")]).await.unwrap();
    assert_eq!(gail.balance, 100);
}

#[tokio::test]
async fn nested_failure_undoes_only_the_inner_work() {
    let (store, accounts) = setup().await;

    accounts
        .transaction(|tx| async move {
            tx.create(&mut account("outer", 1)).await?;

            let inner: Result<(), OrmError> = tx
                .transaction(|nested| async move {
                    nested.create(&mut account("inner", 2)).await?;
                    Err(OrmError::validation("inner failure"))
                })
                .await;
            assert!(inner.is_err());

            tx.transaction(|nested| async move {
                nested.create(&mut account("kept", 3)).await?;
                Ok::<_, OrmError>(())
            })
            .await?;
            Ok::<_, OrmError>(())
        })
        .await
        .unwrap();

    // Nesting uses savepoints, not new transactions.
    assert_eq!(store.transactions_begun(), 1);
    let mut owners: Vec<String> = accounts
        .find_all([])
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.owner)
        .collect();
    owners.sort();
    assert_eq!(owners, ["kept", "outer"]);
}

#[tokio::test]
async fn explicit_savepoints() {
    let (_store, accounts) = setup().await;

    accounts
        .transaction(|tx| async move {
            tx.create(&mut account("a", 1)).await?;
            tx.set_savepoint("before_b").await?;
            tx.create(&mut account("b", 2)).await?;
            tx.rollback_to_savepoint("before_b").await?;
            tx.release_savepoint("before_b").await?;
            assert!(tx.set_savepoint("bad name").await.unwrap_err().is_validation());
            Ok::<_, OrmError>(())
        })
        .await
        .unwrap();

    let all = accounts.find_all([]).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].owner, "a");
}

#[tokio::test]
async fn escaped_handle_fails_after_commit() {
    let (_store, accounts) = setup().await;

    let leaked = accounts
        .transaction(|tx| async move { Ok::<_, OrmError>(tx.repository()) })
        .await
        .unwrap();

    assert!(leaked.in_transaction());
    let err = leaked.find_all([]).await.unwrap_err();
    assert!(err.is_database());
}

#[tokio::test]
async fn options_are_accepted() {
    let (store, accounts) = setup().await;
    let options = TxOptions::new()
        .isolation(IsolationLevel::Serializable)
        .read_only(true);

    let n = accounts
        .transaction_with(options, |tx| async move { tx.count([]).await })
        .await
        .unwrap();
    assert_eq!(n, 0);
    assert_eq!(store.transactions_begun(), 1);
}
