use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, Unchanged,
};
use tracing::debug;

use super::{FilmStore, unit_of_work::UnitOfWork};
use crate::{
    entities::{actor, film, film_actor},
    error::CatalogResult,
    models::{Actor, Film, FilmInput, FilmPatch, FilmWithActors},
    patch::film_patch,
    query::{self, FilmSort},
    sync::sync_film_actors,
};

#[derive(Clone)]
pub struct FilmRepo {
    db: DatabaseConnection,
    timeout: Duration,
}

impl FilmRepo {
    pub fn new(db: DatabaseConnection, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

#[async_trait]
impl FilmStore for FilmRepo {
    async fn create_film(
        &self,
        input: &FilmInput,
        actor_ids: &[i32],
    ) -> CatalogResult<FilmWithActors> {
        input.validate()?;

        let uow = UnitOfWork::begin(&self.db, "create_film", self.timeout).await?;
        let outcome = uow
            .run(async {
                let row = film::ActiveModel {
                    title: Set(input.title.clone()),
                    description: Set(input.description.clone()),
                    released: Set(input.released.to_string()),
                    rating: Set(input.rating),
                    ..Default::default()
                }
                .insert(uow.txn())
                .await?;
                sync_film_actors(uow.txn(), row.id, actor_ids).await?;
                load_film(uow.txn(), row.id).await
            })
            .await;
        uow.finish(outcome).await
    }

    async fn update_film(
        &self,
        id: i32,
        input: &FilmInput,
        actor_ids: Option<&[i32]>,
    ) -> CatalogResult<FilmWithActors> {
        input.validate()?;

        let uow = UnitOfWork::begin(&self.db, "update_film", self.timeout).await?;
        let outcome = uow
            .run(async {
                film::ActiveModel {
                    id: Unchanged(id),
                    title: Set(input.title.clone()),
                    description: Set(input.description.clone()),
                    released: Set(input.released.to_string()),
                    rating: Set(input.rating),
                }
                .update(uow.txn())
                .await?;
                if let Some(actor_ids) = actor_ids {
                    sync_film_actors(uow.txn(), id, actor_ids).await?;
                }
                load_film(uow.txn(), id).await
            })
            .await;
        uow.finish(outcome).await
    }

    async fn patch_film(
        &self,
        id: i32,
        patch: &FilmPatch,
        actor_ids: Option<&[i32]>,
    ) -> CatalogResult<FilmWithActors> {
        patch.validate()?;

        let uow = UnitOfWork::begin(&self.db, "patch_film", self.timeout).await?;
        let outcome = uow
            .run(async {
                match film_patch(id, patch) {
                    Some(update) => update.exec(uow.txn()).await?,
                    None => {
                        debug!(film_id = id, "no film columns in patch");
                        ensure_film(uow.txn(), id).await?;
                    },
                }
                if let Some(actor_ids) = actor_ids {
                    sync_film_actors(uow.txn(), id, actor_ids).await?;
                }
                load_film(uow.txn(), id).await
            })
            .await;
        uow.finish(outcome).await
    }

    async fn delete_film(&self, id: i32) -> CatalogResult<()> {
        let uow = UnitOfWork::begin(&self.db, "delete_film", self.timeout).await?;
        let outcome = uow
            .run(async {
                film_actor::Entity::delete_many()
                    .filter(film_actor::Column::FilmId.eq(id))
                    .exec(uow.txn())
                    .await?;
                let deleted = film::Entity::delete_by_id(id).exec(uow.txn()).await?;
                if deleted.rows_affected == 0 {
                    return Err(DbErr::RecordNotFound(format!("film {id}")));
                }
                Ok(())
            })
            .await;
        uow.finish(outcome).await
    }

    async fn get_film(&self, id: i32) -> CatalogResult<FilmWithActors> {
        let uow = UnitOfWork::begin(&self.db, "get_film", self.timeout).await?;
        let outcome = uow.run(load_film(uow.txn(), id)).await;
        uow.finish(outcome).await
    }

    async fn list_films(
        &self,
        sort: FilmSort,
        actor_id: Option<i32>,
    ) -> CatalogResult<Vec<FilmWithActors>> {
        let uow = UnitOfWork::begin(&self.db, "list_films", self.timeout).await?;
        let outcome = uow
            .run(async {
                let films = query::list_films(sort, actor_id).all(uow.txn()).await?;
                with_actors(uow.txn(), films).await
            })
            .await;
        uow.finish(outcome).await
    }

    async fn search_films(&self, text: &str) -> CatalogResult<Vec<FilmWithActors>> {
        let select = query::search_films(text)?;

        let uow = UnitOfWork::begin(&self.db, "search_films", self.timeout).await?;
        let outcome = uow
            .run(async {
                let films = select.all(uow.txn()).await?;
                with_actors(uow.txn(), films).await
            })
            .await;
        let found = uow.finish(outcome).await?;
        debug!(query = %text, matches = found.len(), "searched films");
        Ok(found)
    }
}

/// Attaches linked actors. Run it on the connection that produced `films`
/// so both statements read the same snapshot.
async fn with_actors<C: ConnectionTrait>(
    conn: &C,
    films: Vec<film::Model>,
) -> Result<Vec<FilmWithActors>, DbErr> {
    let ids: Vec<i32> = films.iter().map(|f| f.id).collect();
    let mut actors = actors_by_film(conn, &ids).await?;

    films
        .into_iter()
        .map(|row| -> Result<FilmWithActors, DbErr> {
            let actors = actors.remove(&row.id).unwrap_or_default();
            Ok(FilmWithActors { film: Film::try_from(row)?, actors })
        })
        .collect()
}

async fn ensure_film<C: ConnectionTrait>(conn: &C, id: i32) -> Result<film::Model, DbErr> {
    film::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("film {id}")))
}

pub(crate) async fn load_film<C: ConnectionTrait>(
    conn: &C,
    id: i32,
) -> Result<FilmWithActors, DbErr> {
    let row = ensure_film(conn, id).await?;
    let actors = actors_by_film(conn, &[id]).await?.remove(&id).unwrap_or_default();
    Ok(FilmWithActors { film: Film::try_from(row)?, actors })
}

/// Actors linked to each of `film_ids`, ordered by name then id.
pub(crate) async fn actors_by_film<C: ConnectionTrait>(
    conn: &C,
    film_ids: &[i32],
) -> Result<HashMap<i32, Vec<Actor>>, DbErr> {
    let mut out: HashMap<i32, Vec<Actor>> = HashMap::new();
    if film_ids.is_empty() {
        return Ok(out);
    }

    let rows = film_actor::Entity::find()
        .filter(film_actor::Column::FilmId.is_in(film_ids.iter().copied()))
        .find_also_related(actor::Entity)
        .order_by_asc(actor::Column::Name)
        .order_by_asc(actor::Column::Id)
        .all(conn)
        .await?;

    for (link, row) in rows {
        if let Some(row) = row {
            out.entry(link.film_id).or_default().push(Actor::try_from(row)?);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;

    use super::*;
    use crate::{
        db,
        error::CatalogError,
        models::{ActorInput, Gender},
        query::{SortColumn, SortDirection},
        store::{ActorRepo, ActorStore},
    };

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Fixture {
        films: FilmRepo,
        actors: ActorRepo,
    }

    async fn fixture(actor_names: &[&str]) -> Fixture {
        let db = db::connect_memory().await.unwrap();
        let fx = Fixture {
            films: FilmRepo::new(db.clone(), TIMEOUT),
            actors: ActorRepo::new(db, TIMEOUT),
        };
        for name in actor_names {
            let input = ActorInput {
                name: name.to_string(),
                gender: Gender::Unknown,
                birthday: date(1970, 1, 1),
            };
            fx.actors.create_actor(&input).await.unwrap();
        }
        fx
    }

    fn film(title: &str, rating: i32, released: jiff::civil::Date) -> FilmInput {
        FilmInput { title: title.into(), description: String::new(), released, rating }
    }

    fn actor_ids(film: &FilmWithActors) -> Vec<i32> {
        let mut ids: Vec<i32> = film.actors.iter().map(|a| a.id).collect();
        ids.sort_unstable();
        ids
    }

    #[tokio::test]
    async fn dune_patch_scenario() {
        let fx = fixture(&["One", "Two", "Three"]).await;
        let created =
            fx.films.create_film(&film("Dune", 8, date(2021, 10, 1)), &[1, 2]).await.unwrap();
        assert_eq!(actor_ids(&created), vec![1, 2]);

        let patch = FilmPatch { rating: Some(9), ..Default::default() };
        let patched =
            fx.films.patch_film(created.film.id, &patch, Some(&[2, 3])).await.unwrap();

        assert_eq!(patched.film.title, "Dune");
        assert_eq!(patched.film.rating, 9);
        assert_eq!(patched.film.released, date(2021, 10, 1));
        assert_eq!(actor_ids(&patched), vec![2, 3]);

        let reread = fx.films.get_film(created.film.id).await.unwrap();
        assert_eq!(reread, patched);
    }

    #[tokio::test]
    async fn empty_patch_still_syncs_actors() {
        let fx = fixture(&["One", "Two"]).await;
        let created =
            fx.films.create_film(&film("Solaris", 7, date(1972, 3, 20)), &[1]).await.unwrap();

        let patched = fx
            .films
            .patch_film(created.film.id, &FilmPatch::default(), Some(&[2, 2]))
            .await
            .unwrap();

        assert_eq!(patched.film, created.film);
        assert_eq!(actor_ids(&patched), vec![2]);
    }

    #[tokio::test]
    async fn absent_actor_list_leaves_links_alone() {
        let fx = fixture(&["One", "Two"]).await;
        let created =
            fx.films.create_film(&film("Stalker", 8, date(1979, 5, 25)), &[1, 2]).await.unwrap();

        let patch = FilmPatch { title: Some("Сталкер".into()), ..Default::default() };
        let patched = fx.films.patch_film(created.film.id, &patch, None).await.unwrap();
        assert_eq!(patched.film.title, "Сталкер");
        assert_eq!(actor_ids(&patched), vec![1, 2]);

        let cleared = fx.films.patch_film(created.film.id, &FilmPatch::default(), Some(&[])).await;
        assert!(cleared.unwrap().actors.is_empty());
    }

    #[tokio::test]
    async fn failed_sync_rolls_back_row_change() {
        let fx = fixture(&["One"]).await;
        let created =
            fx.films.create_film(&film("Dune", 8, date(2021, 10, 1)), &[1]).await.unwrap();

        let patch =
            FilmPatch { rating: Some(2), title: Some("Dune II".into()), ..Default::default() };
        let err = fx.films.patch_film(created.film.id, &patch, Some(&[1, 404])).await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)), "{err}");

        let reread = fx.films.get_film(created.film.id).await.unwrap();
        assert_eq!(reread, created);
    }

    #[tokio::test]
    async fn failed_create_leaves_nothing_behind() {
        let fx = fixture(&["One"]).await;
        let err =
            fx.films.create_film(&film("Ghost", 5, date(2000, 1, 1)), &[1, 77]).await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));

        let all = fx.films.list_films(FilmSort::default(), None).await.unwrap();
        assert!(all.is_empty());
        let linked = film_actor::Entity::find().all(&fx.films.db).await.unwrap();
        assert!(linked.is_empty());
    }

    #[tokio::test]
    async fn full_update_replaces_columns() {
        let fx = fixture(&["One", "Two"]).await;
        let created =
            fx.films.create_film(&film("Alien", 8, date(1979, 5, 25)), &[1]).await.unwrap();

        let replacement = FilmInput {
            title: "Aliens".into(),
            description: "Sequel".into(),
            released: date(1986, 7, 18),
            rating: 9,
        };
        let updated =
            fx.films.update_film(created.film.id, &replacement, Some(&[2])).await.unwrap();
        assert_eq!(updated.film.title, "Aliens");
        assert_eq!(updated.film.description, "Sequel");
        assert_eq!(actor_ids(&updated), vec![2]);
    }

    #[tokio::test]
    async fn writes_to_missing_film_are_not_found() {
        let fx = fixture(&["One"]).await;
        let patch = FilmPatch { rating: Some(1), ..Default::default() };

        let err = fx.films.patch_film(99, &patch, Some(&[1])).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)), "{err}");
        let err = fx.films.patch_film(99, &FilmPatch::default(), Some(&[1])).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)), "{err}");
        let err = fx
            .films
            .update_film(99, &film("X", 1, date(2000, 1, 1)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)), "{err}");
        let err = fx.films.delete_film(99).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)), "{err}");
    }

    #[tokio::test]
    async fn invalid_fields_never_reach_the_store() {
        let fx = fixture(&[]).await;
        let err = fx.films.create_film(&film("", 5, date(2000, 1, 1)), &[]).await.unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));
        let patch = FilmPatch { rating: Some(11), ..Default::default() };
        let err = fx.films.patch_film(1, &patch, None).await.unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));
    }

    #[tokio::test]
    async fn delete_removes_links_first() {
        let fx = fixture(&["One", "Two"]).await;
        let created =
            fx.films.create_film(&film("Heat", 8, date(1995, 12, 15)), &[1, 2]).await.unwrap();
        fx.films.delete_film(created.film.id).await.unwrap();

        assert!(matches!(fx.films.get_film(created.film.id).await, Err(CatalogError::NotFound(_))));
        assert!(film_actor::Entity::find().all(&fx.films.db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_sorts_with_id_tiebreak_and_filters_by_actor() {
        let fx = fixture(&["One", "Two", "Three", "Four", "Five"]).await;
        let a = fx.films.create_film(&film("A", 7, date(2001, 1, 1)), &[5]).await.unwrap();
        let b = fx.films.create_film(&film("B", 9, date(1999, 1, 1)), &[1]).await.unwrap();
        let c = fx.films.create_film(&film("C", 7, date(2010, 1, 1)), &[5, 1]).await.unwrap();

        let by_rating = fx
            .films
            .list_films(FilmSort::parse("rating", "desc").unwrap(), None)
            .await
            .unwrap();
        let ids: Vec<i32> = by_rating.iter().map(|f| f.film.id).collect();
        assert_eq!(ids, vec![b.film.id, a.film.id, c.film.id]);

        let by_release = fx
            .films
            .list_films(
                FilmSort { column: SortColumn::Released, direction: SortDirection::Asc },
                None,
            )
            .await
            .unwrap();
        let ids: Vec<i32> = by_release.iter().map(|f| f.film.id).collect();
        assert_eq!(ids, vec![b.film.id, a.film.id, c.film.id]);

        let owned = fx.films.list_films(FilmSort::default(), Some(5)).await.unwrap();
        let ids: Vec<i32> = owned.iter().map(|f| f.film.id).collect();
        assert_eq!(ids, vec![a.film.id, c.film.id]);
        assert!(owned.iter().all(|f| f.actors.iter().any(|actor| actor.id == 5)));
    }

    #[tokio::test]
    async fn read_transaction_keeps_one_snapshot() {
        let path = std::env::temp_dir().join(format!(
            "filmoteka-snapshot-{}-{}.db",
            std::process::id(),
            jiff::Timestamp::now().as_nanosecond()
        ));
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let db = db::connect_and_init(&url, 2, TIMEOUT).await.unwrap();
        let films = FilmRepo::new(db.clone(), TIMEOUT);
        let actors = ActorRepo::new(db.clone(), TIMEOUT);
        for name in ["One", "Two"] {
            let input =
                ActorInput { name: name.into(), gender: Gender::Male, birthday: date(1970, 1, 1) };
            actors.create_actor(&input).await.unwrap();
        }
        let created = films.create_film(&film("Dune", 8, date(2021, 10, 1)), &[1]).await.unwrap();

        let reader = UnitOfWork::begin(&db, "snapshot", TIMEOUT).await.unwrap();
        let row = ensure_film(reader.txn(), created.film.id).await.unwrap();
        assert_eq!(row.rating, 8);

        let patch = FilmPatch { rating: Some(9), ..Default::default() };
        films.patch_film(created.film.id, &patch, Some(&[2])).await.unwrap();

        let seen = load_film(reader.txn(), created.film.id).await.unwrap();
        reader.finish(Ok(())).await.unwrap();
        assert_eq!(seen, created, "columns and links come from the same snapshot");

        let after = films.get_film(created.film.id).await.unwrap();
        assert_eq!(after.film.rating, 9);
        assert_eq!(actor_ids(&after), vec![2]);

        db.close().await.unwrap();
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }

    #[tokio::test]
    async fn search_matches_title_or_actor_once() {
        let fx = fixture(&["Avatar Jones", "Avatar Smith", "Nobody"]).await;
        let titled =
            fx.films.create_film(&film("Avatar", 8, date(2009, 12, 18)), &[3]).await.unwrap();
        let via_actors =
            fx.films.create_film(&film("Side Quest", 6, date(2012, 1, 1)), &[1, 2]).await.unwrap();
        fx.films.create_film(&film("Unrelated", 5, date(2012, 1, 1)), &[3]).await.unwrap();

        let found = fx.films.search_films("Avatar").await.unwrap();
        let ids: Vec<i32> = found.iter().map(|f| f.film.id).collect();
        assert_eq!(ids, vec![titled.film.id, via_actors.film.id]);

        let lower = fx.films.search_films("avatar").await.unwrap();
        assert_eq!(lower.len(), 2, "ASCII matching ignores case");

        assert!(fx.films.search_films("%").await.unwrap().is_empty());
        assert!(matches!(fx.films.search_films(" ").await, Err(CatalogError::Invalid(_))));
    }
}
