//! Conditional `UPDATE` statements whose `SET` list depends on which fields a
//! request carried.
//!
//! Columns always come from the entity's `Column` enum; request data only ever
//! reaches the statement as bound parameters. The row id is appended last as
//! the single predicate, so a patch can touch at most one row.

use sea_orm::{
    ColumnTrait, ConnectionTrait, DbBackend, DbErr, EntityTrait, QueryFilter, QueryTrait,
    Statement, UpdateMany, Value, sea_query::Expr,
};
use tracing::debug;

use crate::{
    entities::{actor, film},
    models::{ActorPatch, FilmPatch},
};

pub struct PatchBuilder<E: EntityTrait> {
    id_column: E::Column,
    id: i32,
    assignments: Vec<(E::Column, Value)>,
}

impl<E: EntityTrait> PatchBuilder<E> {
    pub fn new(id_column: E::Column, id: i32) -> Self {
        Self { id_column, id, assignments: Vec::new() }
    }

    /// Adds `column = ?` when `value` is present. Order of calls is the order
    /// of the emitted assignments.
    pub fn set<V: Into<Value>>(mut self, column: E::Column, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.assignments.push((column, value.into()));
        }
        self
    }

    /// `None` means the request carried no field changes.
    pub fn build(self) -> Option<RowPatch<E>> {
        if self.assignments.is_empty() {
            return None;
        }

        let mut update = E::update_many();
        for (column, value) in self.assignments {
            update = update.col_expr(column, Expr::value(value));
        }

        Some(RowPatch { id: self.id, update: update.filter(self.id_column.eq(self.id)) })
    }
}

pub struct RowPatch<E: EntityTrait> {
    id: i32,
    update: UpdateMany<E>,
}

impl<E: EntityTrait> RowPatch<E> {
    pub fn statement(&self, backend: DbBackend) -> Statement {
        self.update.build(backend)
    }

    /// Fails with `RecordNotUpdated` when the id matched nothing.
    pub async fn exec<C: ConnectionTrait>(self, conn: &C) -> Result<(), DbErr> {
        let stmt = self.statement(conn.get_database_backend());
        debug!(row = self.id, sql = %stmt.sql, "patching row");
        let result = self.update.exec(conn).await?;
        match result.rows_affected {
            0 => Err(DbErr::RecordNotUpdated),
            1 => Ok(()),
            n => Err(DbErr::Custom(format!("patch of row {} matched {n} rows", self.id))),
        }
    }
}

pub fn film_patch(id: i32, patch: &FilmPatch) -> Option<RowPatch<film::Entity>> {
    PatchBuilder::<film::Entity>::new(film::Column::Id, id)
        .set(film::Column::Title, patch.title.clone())
        .set(film::Column::Description, patch.description.clone())
        .set(film::Column::Released, patch.released.map(|d| d.to_string()))
        .set(film::Column::Rating, patch.rating)
        .build()
}

pub fn actor_patch(id: i32, patch: &ActorPatch) -> Option<RowPatch<actor::Entity>> {
    PatchBuilder::<actor::Entity>::new(actor::Column::Id, id)
        .set(actor::Column::Name, patch.name.clone())
        .set(actor::Column::Gender, patch.gender.map(|g| g.as_code()))
        .set(actor::Column::Birthday, patch.birthday.map(|d| d.to_string()))
        .build()
}
