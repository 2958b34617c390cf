use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, Unchanged,
};

use super::{
    ActorStore,
    unit_of_work::{UnitOfWork, bounded},
};
use crate::{
    entities::{actor, film, film_actor},
    error::CatalogResult,
    models::{Actor, ActorInput, ActorPatch, ActorWithFilms, Film},
    patch::actor_patch,
};

#[derive(Clone)]
pub struct ActorRepo {
    db: DatabaseConnection,
    timeout: Duration,
}

impl ActorRepo {
    pub fn new(db: DatabaseConnection, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

#[async_trait]
impl ActorStore for ActorRepo {
    async fn create_actor(&self, input: &ActorInput) -> CatalogResult<Actor> {
        input.validate()?;

        let uow = UnitOfWork::begin(&self.db, "create_actor", self.timeout).await?;
        let outcome = uow
            .run(async {
                let row = actor::ActiveModel {
                    name: Set(input.name.clone()),
                    gender: Set(input.gender.as_code()),
                    birthday: Set(input.birthday.to_string()),
                    ..Default::default()
                }
                .insert(uow.txn())
                .await?;
                Actor::try_from(row)
            })
            .await;
        uow.finish(outcome).await
    }

    async fn update_actor(&self, id: i32, input: &ActorInput) -> CatalogResult<Actor> {
        input.validate()?;

        let uow = UnitOfWork::begin(&self.db, "update_actor", self.timeout).await?;
        let outcome = uow
            .run(async {
                let row = actor::ActiveModel {
                    id: Unchanged(id),
                    name: Set(input.name.clone()),
                    gender: Set(input.gender.as_code()),
                    birthday: Set(input.birthday.to_string()),
                }
                .update(uow.txn())
                .await?;
                Actor::try_from(row)
            })
            .await;
        uow.finish(outcome).await
    }

    async fn patch_actor(&self, id: i32, patch: &ActorPatch) -> CatalogResult<Actor> {
        patch.validate()?;

        let uow = UnitOfWork::begin(&self.db, "patch_actor", self.timeout).await?;
        let outcome = uow
            .run(async {
                if let Some(update) = actor_patch(id, patch) {
                    update.exec(uow.txn()).await?;
                }
                load_actor(uow.txn(), id).await
            })
            .await;
        uow.finish(outcome).await
    }

    async fn delete_actor(&self, id: i32) -> CatalogResult<()> {
        let uow = UnitOfWork::begin(&self.db, "delete_actor", self.timeout).await?;
        let outcome = uow
            .run(async {
                film_actor::Entity::delete_many()
                    .filter(film_actor::Column::ActorId.eq(id))
                    .exec(uow.txn())
                    .await?;
                let deleted = actor::Entity::delete_by_id(id).exec(uow.txn()).await?;
                if deleted.rows_affected == 0 {
                    return Err(DbErr::RecordNotFound(format!("actor {id}")));
                }
                Ok(())
            })
            .await;
        uow.finish(outcome).await
    }

    async fn get_actor(&self, id: i32) -> CatalogResult<Actor> {
        Ok(bounded(self.timeout, load_actor(&self.db, id)).await?)
    }

    async fn list_actors(&self) -> CatalogResult<Vec<ActorWithFilms>> {
        let uow = UnitOfWork::begin(&self.db, "list_actors", self.timeout).await?;
        let outcome = uow
            .run(async {
                let rows =
                    actor::Entity::find().order_by_asc(actor::Column::Id).all(uow.txn()).await?;
                let ids: Vec<i32> = rows.iter().map(|a| a.id).collect();
                let mut films = films_by_actor(uow.txn(), &ids).await?;

                rows.into_iter()
                    .map(|row| -> Result<ActorWithFilms, DbErr> {
                        let films = films.remove(&row.id).unwrap_or_default();
                        Ok(ActorWithFilms { actor: Actor::try_from(row)?, films })
                    })
                    .collect::<Result<Vec<_>, DbErr>>()
            })
            .await;
        uow.finish(outcome).await
    }
}

async fn load_actor<C: ConnectionTrait>(conn: &C, id: i32) -> Result<Actor, DbErr> {
    let row = actor::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("actor {id}")))?;
    Actor::try_from(row)
}

/// Films of each actor, best rated first.
async fn films_by_actor<C: ConnectionTrait>(
    conn: &C,
    actor_ids: &[i32],
) -> Result<HashMap<i32, Vec<Film>>, DbErr> {
    let mut out: HashMap<i32, Vec<Film>> = HashMap::new();
    if actor_ids.is_empty() {
        return Ok(out);
    }

    let rows = film_actor::Entity::find()
        .filter(film_actor::Column::ActorId.is_in(actor_ids.iter().copied()))
        .find_also_related(film::Entity)
        .order_by_desc(film::Column::Rating)
        .order_by_asc(film::Column::Id)
        .all(conn)
        .await?;

    for (link, row) in rows {
        if let Some(row) = row {
            out.entry(link.actor_id).or_default().push(Film::try_from(row)?);
        }
    }
    Ok(out)
}
