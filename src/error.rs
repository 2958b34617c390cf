use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;

use crate::auth::AuthError;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Maps a raw store error onto the catalog taxonomy.
    pub fn from_db(err: DbErr) -> Self {
        match &err {
            DbErr::RecordNotFound(what) => return Self::NotFound(what.clone()),
            DbErr::RecordNotUpdated => return Self::NotFound("no row matched".to_string()),
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => {
                return Self::Unavailable(err.to_string());
            },
            _ => {},
        }

        let text = err.to_string();
        if is_busy(&text) {
            return Self::Unavailable(text);
        }

        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg)) => Self::Conflict(msg),
            Some(SqlErr::ForeignKeyConstraintViolation(msg)) => Self::Conflict(msg),
            _ => {
                if text.contains("CHECK constraint failed") {
                    Self::Invalid(text)
                } else if text.contains("UNIQUE constraint failed")
                    || text.contains("FOREIGN KEY constraint failed")
                {
                    Self::Conflict(text)
                } else {
                    Self::Internal(text)
                }
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbErr> for CatalogError {
    fn from(err: DbErr) -> Self {
        Self::from_db(err)
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// SQLITE_BUSY and SQLITE_LOCKED: another connection holds the lock past the
/// busy timeout.
fn is_busy(message: &str) -> bool {
    message.contains("database is locked") || message.contains("database table is locked")
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("bad request: {0}")]
    BadRequest(String),
}

#[derive(Debug, Serialize)]
struct Problem {
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'static str,
    status: u16,
    detail: String,
}

impl AppError {
    fn problem(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            Self::Catalog(err) | Self::Auth(AuthError::Catalog(err)) => {
                let (kind, title) = match err {
                    CatalogError::NotFound(_) => ("not-found", "Resource not found"),
                    CatalogError::Conflict(_) => ("conflict", "Conflicting data"),
                    CatalogError::Invalid(_) => ("validation-error", "Invalid input"),
                    CatalogError::Unavailable(_) => ("unavailable", "Storage unavailable"),
                    CatalogError::Internal(_) => ("server-error", "Internal error"),
                };
                (err.status(), kind, title)
            },
            Self::Auth(err @ AuthError::Invalid(_)) => {
                (err.status(), "validation-error", "Invalid input")
            },
            Self::Auth(err @ AuthError::Internal(_)) => {
                (err.status(), "server-error", "Internal error")
            },
            Self::Auth(err) => (err.status(), "auth-error", "Authorization failed"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad-request", "Malformed request"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, title) = self.problem();
        let detail = match &self {
            Self::Catalog(CatalogError::Internal(_))
            | Self::Auth(AuthError::Internal(_))
            | Self::Auth(AuthError::Catalog(CatalogError::Internal(_))) => {
                "Please, try again later".to_string()
            },
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = Problem { kind, title, status: status.as_u16(), detail };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

pub type AppResult<T> = Result<T, AppError>;
