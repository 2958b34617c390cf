use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    Unchanged,
};
use tracing::info;

use super::{UserStore, unit_of_work::bounded};
use crate::{entities::user, error::CatalogResult, models::Role};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserRecord {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

impl TryFrom<user::Model> for UserRecord {
    type Error = DbErr;

    fn try_from(row: user::Model) -> Result<Self, Self::Error> {
        let role = Role::from_code(row.role)
            .ok_or_else(|| DbErr::Type(format!("users.role holds {}", row.role)))?;
        Ok(Self { id: row.id, username: row.username, password_hash: row.password_hash, role })
    }
}

#[derive(Clone)]
pub struct UserRepo {
    db: DatabaseConnection,
    timeout: Duration,
}

impl UserRepo {
    pub fn new(db: DatabaseConnection, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

#[async_trait]
impl UserStore for UserRepo {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> CatalogResult<UserRecord> {
        let row = user::ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(password_hash.to_string()),
            role: Set(role.as_code()),
            ..Default::default()
        };
        let row = bounded(self.timeout, row.insert(&self.db)).await?;
        info!(user_id = row.id, username, ?role, "user created");
        Ok(UserRecord::try_from(row)?)
    }

    async fn find_user_by_username(&self, username: &str) -> CatalogResult<Option<UserRecord>> {
        let row = bounded(
            self.timeout,
            user::Entity::find().filter(user::Column::Username.eq(username)).one(&self.db),
        )
        .await?;
        Ok(row.map(UserRecord::try_from).transpose()?)
    }

    async fn find_user_by_id(&self, id: i32) -> CatalogResult<Option<UserRecord>> {
        let row = bounded(self.timeout, user::Entity::find_by_id(id).one(&self.db)).await?;
        Ok(row.map(UserRecord::try_from).transpose()?)
    }

    async fn set_role(&self, id: i32, role: Role) -> CatalogResult<UserRecord> {
        let row = user::ActiveModel {
            id: Unchanged(id),
            role: Set(role.as_code()),
            ..Default::default()
        };
        let row = bounded(self.timeout, row.update(&self.db)).await?;
        Ok(UserRecord::try_from(row)?)
    }

    async fn set_password(&self, id: i32, password_hash: &str) -> CatalogResult<UserRecord> {
        let row = user::ActiveModel {
            id: Unchanged(id),
            password_hash: Set(password_hash.to_string()),
            ..Default::default()
        };
        let row = bounded(self.timeout, row.update(&self.db)).await?;
        info!(user_id = row.id, "password replaced");
        Ok(UserRecord::try_from(row)?)
    }
}
