//! Catalog persistence.
//!
//! Handlers talk to the [`FilmStore`], [`ActorStore`] and [`UserStore`]
//! capabilities. [`Repository`] bundles the SQLite-backed implementations
//! that share one connection pool.

mod actors;
mod films;
mod unit_of_work;
mod users;

use std::time::Duration;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;

pub use self::{
    actors::ActorRepo,
    films::FilmRepo,
    users::{UserRecord, UserRepo},
};
use crate::{
    error::CatalogResult,
    models::{
        Actor, ActorInput, ActorPatch, ActorWithFilms, FilmInput, FilmPatch, FilmWithActors, Role,
    },
    query::FilmSort,
};

/// Film writes take an optional actor list. `None` leaves the film's links as
/// they are; `Some` (even empty) replaces them inside the same transaction.
#[async_trait]
pub trait FilmStore: Send + Sync {
    async fn create_film(&self, input: &FilmInput, actor_ids: &[i32])
    -> CatalogResult<FilmWithActors>;

    async fn update_film(
        &self,
        id: i32,
        input: &FilmInput,
        actor_ids: Option<&[i32]>,
    ) -> CatalogResult<FilmWithActors>;

    async fn patch_film(
        &self,
        id: i32,
        patch: &FilmPatch,
        actor_ids: Option<&[i32]>,
    ) -> CatalogResult<FilmWithActors>;

    async fn delete_film(&self, id: i32) -> CatalogResult<()>;

    async fn get_film(&self, id: i32) -> CatalogResult<FilmWithActors>;

    async fn list_films(
        &self,
        sort: FilmSort,
        actor_id: Option<i32>,
    ) -> CatalogResult<Vec<FilmWithActors>>;

    async fn search_films(&self, text: &str) -> CatalogResult<Vec<FilmWithActors>>;
}

#[async_trait]
pub trait ActorStore: Send + Sync {
    async fn create_actor(&self, input: &ActorInput) -> CatalogResult<Actor>;

    async fn update_actor(&self, id: i32, input: &ActorInput) -> CatalogResult<Actor>;

    async fn patch_actor(&self, id: i32, patch: &ActorPatch) -> CatalogResult<Actor>;

    /// Also removes the actor from every film.
    async fn delete_actor(&self, id: i32) -> CatalogResult<()>;

    async fn get_actor(&self, id: i32) -> CatalogResult<Actor>;

    async fn list_actors(&self) -> CatalogResult<Vec<ActorWithFilms>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the username is taken.
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> CatalogResult<UserRecord>;

    async fn find_user_by_username(&self, username: &str) -> CatalogResult<Option<UserRecord>>;

    async fn find_user_by_id(&self, id: i32) -> CatalogResult<Option<UserRecord>>;

    async fn set_role(&self, id: i32, role: Role) -> CatalogResult<UserRecord>;

    async fn set_password(&self, id: i32, password_hash: &str) -> CatalogResult<UserRecord>;
}

#[derive(Clone)]
pub struct Repository {
    films: FilmRepo,
    actors: ActorRepo,
    users: UserRepo,
}

impl Repository {
    pub fn new(db: DatabaseConnection, timeout: Duration) -> Self {
        Self {
            films: FilmRepo::new(db.clone(), timeout),
            actors: ActorRepo::new(db.clone(), timeout),
            users: UserRepo::new(db, timeout),
        }
    }
}

#[async_trait]
impl FilmStore for Repository {
    async fn create_film(
        &self,
        input: &FilmInput,
        actor_ids: &[i32],
    ) -> CatalogResult<FilmWithActors> {
        self.films.create_film(input, actor_ids).await
    }

    async fn update_film(
        &self,
        id: i32,
        input: &FilmInput,
        actor_ids: Option<&[i32]>,
    ) -> CatalogResult<FilmWithActors> {
        self.films.update_film(id, input, actor_ids).await
    }

    async fn patch_film(
        &self,
        id: i32,
        patch: &FilmPatch,
        actor_ids: Option<&[i32]>,
    ) -> CatalogResult<FilmWithActors> {
        self.films.patch_film(id, patch, actor_ids).await
    }

    async fn delete_film(&self, id: i32) -> CatalogResult<()> {
        self.films.delete_film(id).await
    }

    async fn get_film(&self, id: i32) -> CatalogResult<FilmWithActors> {
        self.films.get_film(id).await
    }

    async fn list_films(
        &self,
        sort: FilmSort,
        actor_id: Option<i32>,
    ) -> CatalogResult<Vec<FilmWithActors>> {
        self.films.list_films(sort, actor_id).await
    }

    async fn search_films(&self, text: &str) -> CatalogResult<Vec<FilmWithActors>> {
        self.films.search_films(text).await
    }
}

#[async_trait]
impl ActorStore for Repository {
    async fn create_actor(&self, input: &ActorInput) -> CatalogResult<Actor> {
        self.actors.create_actor(input).await
    }

    async fn update_actor(&self, id: i32, input: &ActorInput) -> CatalogResult<Actor> {
        self.actors.update_actor(id, input).await
    }

    async fn patch_actor(&self, id: i32, patch: &ActorPatch) -> CatalogResult<Actor> {
        self.actors.patch_actor(id, patch).await
    }

    async fn delete_actor(&self, id: i32) -> CatalogResult<()> {
        self.actors.delete_actor(id).await
    }

    async fn get_actor(&self, id: i32) -> CatalogResult<Actor> {
        self.actors.get_actor(id).await
    }

    async fn list_actors(&self) -> CatalogResult<Vec<ActorWithFilms>> {
        self.actors.list_actors().await
    }
}

#[async_trait]
impl UserStore for Repository {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> CatalogResult<UserRecord> {
        self.users.create_user(username, password_hash, role).await
    }

    async fn find_user_by_username(&self, username: &str) -> CatalogResult<Option<UserRecord>> {
        self.users.find_user_by_username(username).await
    }

    async fn find_user_by_id(&self, id: i32) -> CatalogResult<Option<UserRecord>> {
        self.users.find_user_by_id(id).await
    }

    async fn set_role(&self, id: i32, role: Role) -> CatalogResult<UserRecord> {
        self.users.set_role(id, role).await
    }

    async fn set_password(&self, id: i32, password_hash: &str) -> CatalogResult<UserRecord> {
        self.users.set_password(id, password_hash).await
    }
}
