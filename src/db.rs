use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};

const SCHEMA_001: &str = include_str!("../sql/001_catalog.sql");

pub async fn connect_and_init(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .max_connections(max_connections.max(1))
        .acquire_timeout(acquire_timeout)
        .sqlx_logging(false);

    let db = Database::connect(options).await?;

    if !database_url.contains(":memory:") {
        pragma(&db, "PRAGMA journal_mode=WAL").await?;
        pragma(&db, "PRAGMA synchronous=NORMAL").await?;
    }
    pragma(&db, "PRAGMA foreign_keys=ON").await?;

    run_sql(&db, SCHEMA_001).await?;
    Ok(db)
}

/// Single-connection in-memory store with the full schema.
#[cfg(test)]
pub async fn connect_memory() -> Result<DatabaseConnection, DbErr> {
    connect_and_init("sqlite::memory:", 1, Duration::from_secs(5)).await
}

async fn pragma(db: &DatabaseConnection, sql: &str) -> Result<(), DbErr> {
    db.execute(Statement::from_string(db.get_database_backend(), sql.to_string())).await?;
    Ok(())
}

async fn run_sql(db: &DatabaseConnection, sql: &str) -> Result<(), DbErr> {
    for stmt in sql.split(';') {
        let stmt = stmt.trim();
        if stmt.is_empty() {
            continue;
        }
        db.execute(Statement::from_string(db.get_database_backend(), stmt.to_string())).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_bootstrap_is_idempotent() {
        let db = connect_memory().await.unwrap();
        run_sql(&db, SCHEMA_001).await.unwrap();

        let rows = db
            .query_all(Statement::from_string(
                db.get_database_backend(),
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name".to_string(),
            ))
            .await
            .unwrap();
        let tables: Vec<String> =
            rows.iter().filter_map(|r| r.try_get::<String>("", "name").ok()).collect();
        for table in ["actors", "film_actors", "films", "users"] {
            assert!(tables.iter().any(|t| t == table), "missing {table}: {tables:?}");
        }
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let db = connect_memory().await.unwrap();
        let err = db
            .execute(Statement::from_string(
                db.get_database_backend(),
                "INSERT INTO film_actors (film_id, actor_id) VALUES (1, 1)".to_string(),
            ))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("FOREIGN KEY"), "{err}");
    }
}
