//! Transactions: commit on `Ok`, roll back on `Err`.
//!
//! ```ignore
//! users
//!     .transaction(|tx| async move {
//!         let mut bob = User::new("bob");
//!         tx.create(&mut bob).await?;
//!         tx.for_entity::<Account>().update_partial(1, Record::new().with("owner", bob.id)).await?;
//!         Ok::<_, OrmError>(())
//!     })
//!     .await?;
//! ```
//!
//! Calling `transaction` on a repository that is already inside one runs the
//! closure under a savepoint instead: an `Err` undoes only the nested work.

use crate::entity::Entity;
use crate::error::{OrmError, OrmResult, classify};
use crate::ident::Ident;
use crate::repository::{Conn, Repository};
use crate::store::{StoreTransaction, TxOptions};
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_savepoint_name() -> String {
    let n = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("gpa_sp_{n}")
}

/// A repository bound to an open transaction.
///
/// Derefs to [`Repository<T>`]; every operation runs inside the transaction.
pub struct Transaction<T: Entity> {
    repo: Repository<T>,
    tx: Arc<dyn StoreTransaction>,
}

impl<T: Entity> Deref for Transaction<T> {
    type Target = Repository<T>;

    fn deref(&self) -> &Repository<T> {
        &self.repo
    }
}

impl<T: Entity> Clone for Transaction<T> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Entity> Transaction<T> {
    /// The transactional repository as an owned value.
    pub fn repository(&self) -> Repository<T> {
        self.repo.clone()
    }

    pub async fn set_savepoint(&self, name: &str) -> OrmResult<()> {
        Ident::parse(name)?;
        self.tx.savepoint(name).await.map_err(classify)
    }

    pub async fn rollback_to_savepoint(&self, name: &str) -> OrmResult<()> {
        Ident::parse(name)?;
        self.tx.rollback_to_savepoint(name).await.map_err(classify)
    }

    pub async fn release_savepoint(&self, name: &str) -> OrmResult<()> {
        Ident::parse(name)?;
        self.tx.release_savepoint(name).await.map_err(classify)
    }
}

impl<T: Entity> Repository<T> {
    /// Run `f` in a transaction with default options.
    pub async fn transaction<F, Fut, R, E>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(Transaction<T>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<OrmError>,
    {
        self.transaction_with(TxOptions::default(), f).await
    }

    /// Run `f` in a transaction.
    ///
    /// The closure's error is returned unchanged after rollback. A failing
    /// rollback is logged, never reported in its place. Inside an outer
    /// transaction `options` are ignored and a savepoint is used.
    pub async fn transaction_with<F, Fut, R, E>(&self, options: TxOptions, f: F) -> Result<R, E>
    where
        F: FnOnce(Transaction<T>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<OrmError>,
    {
        match &self.conn {
            Conn::Store(store) => {
                let tx = store.begin(options).await.map_err(|e| E::from(classify(e)))?;
                debug!(target: "gpa.repository", isolation = ?options.isolation, read_only = options.read_only, "transaction started");

                let scope = self.bind(Arc::clone(&tx));
                match f(scope).await {
                    Ok(value) => {
                        tx.commit().await.map_err(|e| E::from(classify(e)))?;
                        debug!(target: "gpa.repository", "transaction committed");
                        Ok(value)
                    }
                    Err(error) => {
                        match tx.rollback().await {
                            Ok(()) => debug!(target: "gpa.repository", "transaction rolled back"),
                            Err(rollback) => {
                                warn!(target: "gpa.repository", error = %rollback, "rollback failed")
                            }
                        }
                        Err(error)
                    }
                }
            }
            Conn::Tx(tx) => {
                let name = next_savepoint_name();
                tx.savepoint(&name).await.map_err(|e| E::from(classify(e)))?;

                let scope = self.bind(Arc::clone(tx));
                match f(scope).await {
                    Ok(value) => {
                        tx.release_savepoint(&name)
                            .await
                            .map_err(|e| E::from(classify(e)))?;
                        Ok(value)
                    }
                    Err(error) => {
                        let undo = match tx.rollback_to_savepoint(&name).await {
                            Ok(()) => tx.release_savepoint(&name).await,
                            Err(e) => Err(e),
                        };
                        if let Err(undo) = undo {
                            warn!(target: "gpa.repository", savepoint = %name, error = %undo, "savepoint rollback failed");
                        }
                        Err(error)
                    }
                }
            }
        }
    }

    fn bind(&self, tx: Arc<dyn StoreTransaction>) -> Transaction<T> {
        Transaction {
            repo: Repository::from_conn(Conn::Tx(Arc::clone(&tx)), Arc::clone(&self.observer)),
            tx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn savepoint_names_are_unique_identifiers() {
        let a = next_savepoint_name();
        let b = next_savepoint_name();
        assert_ne!(a, b);
        assert!(a.starts_with("gpa_sp_"));
        assert!(Ident::parse(&a).is_ok());
    }
}
