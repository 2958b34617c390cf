//! Replaces a film's association set with an authoritative actor list.
//!
//! Runs against whatever connection it is handed; atomicity is the caller's
//! job. Store errors are returned untouched.

use std::collections::HashSet;

use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};
use tracing::debug;

use crate::entities::film_actor;

/// Keeps the first occurrence of every id.
pub fn dedup_actor_ids(actor_ids: &[i32]) -> Vec<i32> {
    let mut seen = HashSet::with_capacity(actor_ids.len());
    actor_ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Returns the number of association rows written.
pub async fn sync_film_actors<C: ConnectionTrait>(
    conn: &C,
    film_id: i32,
    actor_ids: &[i32],
) -> Result<usize, DbErr> {
    let cleared = film_actor::Entity::delete_many()
        .filter(film_actor::Column::FilmId.eq(film_id))
        .exec(conn)
        .await?;

    let actor_ids = dedup_actor_ids(actor_ids);
    for &actor_id in &actor_ids {
        let row = film_actor::ActiveModel { film_id: Set(film_id), actor_id: Set(actor_id) };
        film_actor::Entity::insert(row).exec_without_returning(conn).await?;
    }

    debug!(
        film_id,
        cleared = cleared.rows_affected,
        inserted = actor_ids.len(),
        "synced film actors"
    );
    Ok(actor_ids.len())
}
