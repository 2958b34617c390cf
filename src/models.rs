use jiff::civil::Date;
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};

use crate::{
    entities::{actor, film},
    error::{CatalogError, CatalogResult},
};

pub const TITLE_MAX_CHARS: usize = 150;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;
pub const RATING_MIN: i32 = 0;
pub const RATING_MAX: i32 = 10;

/// ISO/IEC 5218 sex codes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Gender {
    #[default]
    Unknown,
    Male,
    Female,
    NotApplicable,
}

impl Gender {
    pub fn as_code(self) -> i32 {
        match self {
            Gender::Unknown => 0,
            Gender::Male => 1,
            Gender::Female => 2,
            Gender::NotApplicable => 9,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Gender::Unknown),
            1 => Some(Gender::Male),
            2 => Some(Gender::Female),
            9 => Some(Gender::NotApplicable),
            _ => None,
        }
    }
}

impl TryFrom<i32> for Gender {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Gender::from_code(code).ok_or_else(|| format!("unsupported gender code {code}"))
    }
}

impl From<Gender> for i32 {
    fn from(gender: Gender) -> Self {
        gender.as_code()
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_code(self) -> i32 {
        match self {
            Role::User => 0,
            Role::Admin => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Role::User),
            1 => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn can_write(self) -> bool {
        self == Role::Admin
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Film {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub released: Date,
    pub rating: i32,
}

impl TryFrom<film::Model> for Film {
    type Error = DbErr;

    fn try_from(row: film::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            released: parse_stored_date("films.released", &row.released)?,
            title: row.title,
            description: row.description,
            rating: row.rating,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i32,
    pub name: String,
    pub gender: Gender,
    pub birthday: Date,
}

impl TryFrom<actor::Model> for Actor {
    type Error = DbErr;

    fn try_from(row: actor::Model) -> Result<Self, Self::Error> {
        let gender = Gender::from_code(row.gender)
            .ok_or_else(|| DbErr::Type(format!("actors.gender holds {}", row.gender)))?;
        Ok(Self {
            id: row.id,
            birthday: parse_stored_date("actors.birthday", &row.birthday)?,
            name: row.name,
            gender,
        })
    }
}

fn parse_stored_date(column: &str, raw: &str) -> Result<Date, DbErr> {
    raw.parse().map_err(|err| DbErr::Type(format!("{column} holds {raw:?}: {err}")))
}

/// Full field set of a film, used by create and full replace.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FilmInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub released: Date,
    pub rating: i32,
}

impl FilmInput {
    pub fn validate(&self) -> CatalogResult<()> {
        validate_title(&self.title)?;
        validate_description(&self.description)?;
        validate_rating(self.rating)
    }
}

/// Sparse film update. `None` leaves the column untouched.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FilmPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub released: Option<Date>,
    pub rating: Option<i32>,
}

impl FilmPatch {
    pub fn validate(&self) -> CatalogResult<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        if let Some(rating) = self.rating {
            validate_rating(rating)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActorInput {
    pub name: String,
    #[serde(default)]
    pub gender: Gender,
    pub birthday: Date,
}

impl ActorInput {
    pub fn validate(&self) -> CatalogResult<()> {
        validate_name(&self.name)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActorPatch {
    pub name: Option<String>,
    pub gender: Option<Gender>,
    pub birthday: Option<Date>,
}

impl ActorPatch {
    pub fn validate(&self) -> CatalogResult<()> {
        match &self.name {
            Some(name) => validate_name(name),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FilmWithActors {
    #[serde(flatten)]
    pub film: Film,
    pub actors: Vec<Actor>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ActorWithFilms {
    #[serde(flatten)]
    pub actor: Actor,
    pub films: Vec<Film>,
}

fn validate_title(title: &str) -> CatalogResult<()> {
    let chars = title.chars().count();
    if title.trim().is_empty() {
        return Err(CatalogError::invalid("title must not be empty"));
    }
    if chars > TITLE_MAX_CHARS {
        return Err(CatalogError::invalid(format!(
            "title is {chars} characters, at most {TITLE_MAX_CHARS} allowed"
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> CatalogResult<()> {
    let chars = description.chars().count();
    if chars > DESCRIPTION_MAX_CHARS {
        return Err(CatalogError::invalid(format!(
            "description is {chars} characters, at most {DESCRIPTION_MAX_CHARS} allowed"
        )));
    }
    Ok(())
}

fn validate_rating(rating: i32) -> CatalogResult<()> {
    if !(RATING_MIN..=RATING_MAX).contains(&rating) {
        return Err(CatalogError::invalid(format!(
            "rating {rating} is outside {RATING_MIN}..={RATING_MAX}"
        )));
    }
    Ok(())
}

fn validate_name(name: &str) -> CatalogResult<()> {
    if name.trim().is_empty() {
        return Err(CatalogError::invalid("name must not be empty"));
    }
    Ok(())
}
