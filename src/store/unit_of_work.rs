use std::{future::Future, time::Duration};

use sea_orm::{
    ConnAcquireErr, DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait,
};
use tracing::{debug, warn};

use crate::error::{CatalogError, CatalogResult};

/// Bounds a store call by `timeout`. An elapsed call is reported the same way
/// the pool reports an acquire timeout, so it classifies as `Unavailable`.
pub async fn bounded<T>(
    timeout: Duration,
    work: impl Future<Output = Result<T, DbErr>>,
) -> Result<T, DbErr> {
    tokio::time::timeout(timeout, work)
        .await
        .unwrap_or(Err(DbErr::ConnectionAcquire(ConnAcquireErr::Timeout)))
}

/// One all-or-nothing write, or one multi-statement read that must see a
/// single snapshot.
///
/// Steps run against [`UnitOfWork::txn`] and hand their combined outcome to
/// [`UnitOfWork::finish`], which commits on success and rolls back otherwise.
/// If the owning request is dropped before `finish`, dropping the transaction
/// rolls it back.
pub struct UnitOfWork {
    txn: DatabaseTransaction,
    op: &'static str,
    timeout: Duration,
}

impl UnitOfWork {
    pub async fn begin(
        db: &DatabaseConnection,
        op: &'static str,
        timeout: Duration,
    ) -> CatalogResult<Self> {
        match bounded(timeout, db.begin()).await {
            Ok(txn) => Ok(Self { txn, op, timeout }),
            Err(err) => {
                warn!(op, error = %err, "could not begin transaction");
                Err(CatalogError::Unavailable(format!("{op}: {err}")))
            },
        }
    }

    pub fn txn(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn run<T>(&self, work: impl Future<Output = Result<T, DbErr>>) -> Result<T, DbErr> {
        bounded(self.timeout, work).await
    }

    pub async fn finish<T>(self, outcome: Result<T, DbErr>) -> CatalogResult<T> {
        let op = self.op;
        match outcome {
            Ok(value) => match bounded(self.timeout, self.txn.commit()).await {
                Ok(()) => {
                    debug!(op, "committed");
                    Ok(value)
                },
                Err(err) => {
                    warn!(op, error = %err, "commit failed");
                    Err(CatalogError::from_db(err))
                },
            },
            Err(err) => {
                let classified = CatalogError::from_db(err);
                if let Err(rollback_err) = bounded(self.timeout, self.txn.rollback()).await {
                    warn!(op, error = %rollback_err, "rollback failed");
                }
                match classified {
                    CatalogError::NotFound(_) | CatalogError::Invalid(_) => {
                        debug!(op, error = %classified, "rolled back");
                    },
                    _ => warn!(op, error = %classified, "rolled back"),
                }
                Err(classified)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};

    use super::*;
    use crate::{db, entities::actor};

    fn actor_row(name: &str) -> actor::ActiveModel {
        actor::ActiveModel {
            name: Set(name.into()),
            gender: Set(1),
            birthday: Set("1960-05-05".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn success_commits() {
        let db = db::connect_memory().await.unwrap();
        let uow = UnitOfWork::begin(&db, "test", Duration::from_secs(5)).await.unwrap();
        let outcome = uow.run(actor_row("Kept").insert(uow.txn())).await;
        uow.finish(outcome).await.unwrap();

        assert_eq!(actor::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failure_rolls_back_earlier_steps() {
        let db = db::connect_memory().await.unwrap();
        let uow = UnitOfWork::begin(&db, "test", Duration::from_secs(5)).await.unwrap();
        let outcome = uow
            .run(async {
                actor_row("Discarded").insert(uow.txn()).await?;
                Err::<(), _>(DbErr::RecordNotFound("film 9".into()))
            })
            .await;
        let err = uow.finish(outcome).await.unwrap_err();

        assert!(matches!(err, CatalogError::NotFound(_)));
        assert_eq!(actor::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn timeout_is_unavailable_and_rolls_back() {
        let db = db::connect_memory().await.unwrap();
        let uow = UnitOfWork::begin(&db, "test", Duration::from_millis(50)).await.unwrap();
        let outcome = uow
            .run(async {
                actor_row("Slow").insert(uow.txn()).await?;
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        let err = uow.finish(outcome).await.unwrap_err();

        assert!(matches!(err, CatalogError::Unavailable(_)));
        assert_eq!(actor::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn bounded_gives_up_on_a_stalled_call() {
        let started = std::time::Instant::now();
        let stalled = std::future::pending::<Result<(), DbErr>>();
        let err = bounded(Duration::from_millis(20), stalled).await.unwrap_err();

        assert!(matches!(err, DbErr::ConnectionAcquire(ConnAcquireErr::Timeout)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn dropped_unit_of_work_discards_writes() {
        let db = db::connect_memory().await.unwrap();
        {
            let uow = UnitOfWork::begin(&db, "test", Duration::from_secs(5)).await.unwrap();
            uow.run(actor_row("Abandoned").insert(uow.txn())).await.unwrap();
        }

        assert_eq!(actor::Entity::find().count(&db).await.unwrap(), 0);
    }
}
