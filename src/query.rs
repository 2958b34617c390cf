//! Sorting, owner filtering and text search over films.
//!
//! Sort parameters arrive as raw strings and are mapped onto enums before any
//! statement exists; nothing a caller sends is interpolated into SQL.

use std::str::FromStr;

use sea_orm::{
    ColumnTrait, Condition, EntityTrait, Order, QueryFilter, QueryOrder, Select,
    sea_query::{Expr, LikeExpr, Query, SelectStatement},
};

use crate::{
    entities::{actor, film, film_actor},
    error::{CatalogError, CatalogResult},
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortColumn {
    Title,
    #[default]
    Rating,
    Released,
}

impl SortColumn {
    fn column(self) -> film::Column {
        match self {
            SortColumn::Title => film::Column::Title,
            SortColumn::Rating => film::Column::Rating,
            SortColumn::Released => film::Column::Released,
        }
    }
}

impl FromStr for SortColumn {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(SortColumn::Title),
            "rating" => Ok(SortColumn::Rating),
            "released" | "release_date" | "release-date" => Ok(SortColumn::Released),
            other => Err(CatalogError::invalid(format!("unsupported sorting column {other:?}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    fn order(self) -> Order {
        match self {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        }
    }
}

impl FromStr for SortDirection {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(CatalogError::invalid(format!("unsupported sorting direction {other:?}"))),
        }
    }
}

/// Defaults to rating, highest first. Ties always fall back to id ascending.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FilmSort {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl FilmSort {
    pub fn parse(column: &str, direction: &str) -> CatalogResult<Self> {
        Ok(Self { column: column.parse()?, direction: direction.parse()? })
    }

    /// Reads `column[.direction]`, e.g. `title.asc`. A missing direction is
    /// `desc`; a missing value is the default sort.
    pub fn from_sortby(raw: Option<&str>) -> CatalogResult<Self> {
        let raw = raw.map(str::trim).unwrap_or_default();
        match raw.split_once('.') {
            Some((column, direction)) => Self::parse(column, direction),
            None if raw.is_empty() => Ok(Self::default()),
            None => Ok(Self { column: raw.parse()?, direction: SortDirection::default() }),
        }
    }
}

pub fn list_films(sort: FilmSort, actor_id: Option<i32>) -> Select<film::Entity> {
    let mut select = film::Entity::find();
    if let Some(actor_id) = actor_id {
        select = select.filter(film::Column::Id.in_subquery(films_of_actor(actor_id)));
    }
    select.order_by(sort.column.column(), sort.direction.order()).order_by_asc(film::Column::Id)
}

/// Substring match on the title or on any linked actor's name, using SQLite
/// `LIKE`: case-insensitive for ASCII letters only. Each film appears once,
/// ordered by title then id.
pub fn search_films(text: &str) -> CatalogResult<Select<film::Entity>> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CatalogError::invalid("search query is empty"));
    }
    let pattern = format!("%{}%", escape_like(text));

    let matched_by_actor = Query::select()
        .column((film_actor::Entity, film_actor::Column::FilmId))
        .from(film_actor::Entity)
        .inner_join(
            actor::Entity,
            Expr::col((actor::Entity, actor::Column::Id))
                .equals((film_actor::Entity, film_actor::Column::ActorId)),
        )
        .and_where(
            Expr::col((actor::Entity, actor::Column::Name))
                .like(LikeExpr::new(pattern.clone()).escape('\\')),
        )
        .to_owned();

    Ok(film::Entity::find()
        .filter(
            Condition::any()
                .add(film::Column::Title.like(LikeExpr::new(pattern).escape('\\')))
                .add(film::Column::Id.in_subquery(matched_by_actor)),
        )
        .order_by_asc(film::Column::Title)
        .order_by_asc(film::Column::Id))
}

fn films_of_actor(actor_id: i32) -> SelectStatement {
    Query::select()
        .column(film_actor::Column::FilmId)
        .from(film_actor::Entity)
        .and_where(film_actor::Column::ActorId.eq(actor_id))
        .to_owned()
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use sea_orm::{DbBackend, QueryTrait};

    use super::*;

    #[test]
    fn sortby_defaults_and_parsing() {
        assert_eq!(FilmSort::from_sortby(None).unwrap(), FilmSort::default());
        assert_eq!(FilmSort::from_sortby(Some("")).unwrap(), FilmSort::default());
        assert_eq!(
            FilmSort::from_sortby(Some("title")).unwrap(),
            FilmSort { column: SortColumn::Title, direction: SortDirection::Desc }
        );
        assert_eq!(
            FilmSort::from_sortby(Some("released.asc")).unwrap(),
            FilmSort { column: SortColumn::Released, direction: SortDirection::Asc }
        );
        assert_eq!(FilmSort::parse("release-date", "asc").unwrap().column, SortColumn::Released);
    }

    #[test]
    fn sort_values_outside_allow_list_are_rejected() {
        for raw in ["id", "rating.up", "rating; DROP TABLE films", "RATING", "title.asc.desc"] {
            let err = FilmSort::from_sortby(Some(raw)).unwrap_err();
            assert!(matches!(err, CatalogError::Invalid(_)), "{raw}");
        }
        assert!(FilmSort::parse("rating", "sideways").is_err());
    }

    #[test]
    fn list_orders_with_id_tiebreak() {
        let sort = FilmSort { column: SortColumn::Rating, direction: SortDirection::Desc };
        let sql = list_films(sort, None).build(DbBackend::Sqlite).to_string();
        assert!(sql.contains(r#"ORDER BY "films"."rating" DESC, "films"."id" ASC"#), "{sql}");
    }

    #[test]
    fn owner_filter_uses_join_table() {
        let sql = list_films(FilmSort::default(), Some(5)).build(DbBackend::Sqlite).to_string();
        assert!(sql.contains("film_actors"), "{sql}");
        assert!(sql.contains("IN (SELECT"), "{sql}");
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert!(search_films("   ").is_err());
    }
}
