use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    auth::{AdminUser, AuthUser},
    error::{AppError, AppResult},
    models::{
        Actor, ActorInput, ActorPatch, ActorWithFilms, FilmInput, FilmPatch, FilmWithActors, Role,
    },
    query::FilmSort,
    store::{ActorStore, FilmStore},
};

/// JSON body whose rejection renders as a problem document.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/sign-in", post(sign_in))
        .route("/films", get(list_films).post(create_film))
        .route("/films/search", get(search_films))
        .route("/films/{id}", get(get_film).put(update_film).patch(patch_film).delete(delete_film))
        .route("/actors", get(list_actors).post(create_actor))
        .route(
            "/actors/{id}",
            get(get_actor).put(update_actor).patch(patch_actor).delete(delete_actor),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub struct Account {
    id: i32,
    username: String,
    role: Role,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    token: String,
}

pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<Credentials>,
) -> AppResult<(StatusCode, Json<Account>)> {
    let user = state.auth.sign_up(&req.username, &req.password).await?;
    let account = Account { id: user.id, username: user.username, role: user.role };
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<Credentials>,
) -> AppResult<Json<TokenResponse>> {
    let token = state.auth.sign_in(&req.username, &req.password).await?;
    Ok(Json(TokenResponse { token }))
}

#[derive(Debug, Deserialize)]
pub struct ListFilmsQuery {
    sortby: Option<String>,
    actor_id: Option<i32>,
}

pub async fn list_films(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiQuery(q): ApiQuery<ListFilmsQuery>,
) -> AppResult<Json<Vec<FilmWithActors>>> {
    let sort = FilmSort::from_sortby(q.sortby.as_deref())?;
    Ok(Json(state.repo.list_films(sort, q.actor_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    query: String,
}

pub async fn search_films(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiQuery(q): ApiQuery<SearchQuery>,
) -> AppResult<Json<Vec<FilmWithActors>>> {
    Ok(Json(state.repo.search_films(&q.query).await?))
}

pub async fn get_film(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<FilmWithActors>> {
    Ok(Json(state.repo.get_film(id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFilmRequest {
    film: FilmInput,
    #[serde(default)]
    actor_ids: Vec<i32>,
}

pub async fn create_film(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<CreateFilmRequest>,
) -> AppResult<(StatusCode, Json<FilmWithActors>)> {
    let film = state.repo.create_film(&req.film, &req.actor_ids).await?;
    tracing::info!(
        film_id = film.film.id,
        actors = film.actors.len(),
        by = admin.user_id,
        "film created"
    );
    Ok((StatusCode::CREATED, Json(film)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceFilmRequest {
    film: FilmInput,
    actor_ids: Option<Vec<i32>>,
}

pub async fn update_film(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<i32>,
    ApiJson(req): ApiJson<ReplaceFilmRequest>,
) -> AppResult<Json<FilmWithActors>> {
    let film = state.repo.update_film(id, &req.film, req.actor_ids.as_deref()).await?;
    tracing::info!(film_id = id, by = admin.user_id, "film replaced");
    Ok(Json(film))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchFilmRequest {
    #[serde(default)]
    film: FilmPatch,
    actor_ids: Option<Vec<i32>>,
}

pub async fn patch_film(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<i32>,
    ApiJson(req): ApiJson<PatchFilmRequest>,
) -> AppResult<Json<FilmWithActors>> {
    let film = state.repo.patch_film(id, &req.film, req.actor_ids.as_deref()).await?;
    tracing::info!(film_id = id, by = admin.user_id, "film patched");
    Ok(Json(film))
}

pub async fn delete_film(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<StatusCode> {
    state.repo.delete_film(id).await?;
    tracing::info!(film_id = id, by = admin.user_id, "film deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_actors(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> AppResult<Json<Vec<ActorWithFilms>>> {
    Ok(Json(state.repo.list_actors().await?))
}

pub async fn get_actor(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<Actor>> {
    Ok(Json(state.repo.get_actor(id).await?))
}

pub async fn create_actor(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiJson(input): ApiJson<ActorInput>,
) -> AppResult<(StatusCode, Json<Actor>)> {
    let actor = state.repo.create_actor(&input).await?;
    tracing::info!(actor_id = actor.id, by = admin.user_id, "actor created");
    Ok((StatusCode::CREATED, Json(actor)))
}

pub async fn update_actor(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<i32>,
    ApiJson(input): ApiJson<ActorInput>,
) -> AppResult<Json<Actor>> {
    let actor = state.repo.update_actor(id, &input).await?;
    tracing::info!(actor_id = id, by = admin.user_id, "actor replaced");
    Ok(Json(actor))
}

pub async fn patch_actor(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<i32>,
    ApiJson(patch): ApiJson<ActorPatch>,
) -> AppResult<Json<Actor>> {
    let actor = state.repo.patch_actor(id, &patch).await?;
    tracing::info!(actor_id = id, by = admin.user_id, "actor patched");
    Ok(Json(actor))
}

pub async fn delete_actor(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<StatusCode> {
    state.repo.delete_actor(id).await?;
    tracing::info!(actor_id = id, by = admin.user_id, "actor deleted");
    Ok(StatusCode::NO_CONTENT)
}
