//! Accounts, bearer tokens and the role gate in front of catalog writes.
//!
//! Passwords are stored as bcrypt hashes. A successful sign-in yields an
//! HS256 token carrying the user id and role; handlers receive the verified
//! caller through the [`AuthUser`] and [`AdminUser`] extractors.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::{AppError, CatalogError},
    models::Role,
    store::{UserRecord, UserStore},
};

pub const USERNAME_MAX_CHARS: usize = 128;
pub const PASSWORD_MIN_CHARS: usize = 8;
pub const PASSWORD_MAX_CHARS: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("admin role required")]
    Forbidden,
    #[error("username is already taken")]
    UsernameTaken,
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("auth internals failed: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::MissingToken | Self::InvalidToken => {
                StatusCode::UNAUTHORIZED
            },
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::UsernameTaken => StatusCode::CONFLICT,
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::Catalog(err) => err.status(),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i32,
    role: Role,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_ttl: Duration,
    hash_cost: u32,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        signing_key: &[u8],
        token_ttl: Duration,
        hash_cost: u32,
    ) -> Self {
        Self {
            users,
            encoding: EncodingKey::from_secret(signing_key),
            decoding: DecodingKey::from_secret(signing_key),
            token_ttl,
            hash_cost,
        }
    }

    pub async fn sign_up(&self, username: &str, password: &str) -> AuthResult<UserRecord> {
        let username = validate_credentials(username, password)?;
        let hash = self.hash(password).await?;

        match self.users.create_user(username, &hash, Role::User).await {
            Ok(user) => Ok(user),
            Err(CatalogError::Conflict(_)) => Err(AuthError::UsernameTaken),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns a signed bearer token.
    pub async fn sign_in(&self, username: &str, password: &str) -> AuthResult<String> {
        let user = self
            .users
            .find_user_by_username(username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.verify_password(password, &user.password_hash).await? {
            debug!(user_id = user.id, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }
        self.issue(user.id, user.role, jiff::Timestamp::now().as_second())
    }

    pub fn verify(&self, token: &str) -> AuthResult<AuthUser> {
        let data = jsonwebtoken::decode::<Claims>(
            token,
            &self.decoding,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|err| {
            debug!(error = %err, "token rejected");
            AuthError::InvalidToken
        })?;
        Ok(AuthUser { user_id: data.claims.sub, role: data.claims.role })
    }

    /// Creates the account as admin, or takes over an existing one. The given
    /// password replaces any other stored hash before the role is raised.
    pub async fn ensure_admin(&self, username: &str, password: &str) -> AuthResult<UserRecord> {
        let username = validate_credentials(username, password)?;
        match self.users.find_user_by_username(username).await? {
            Some(mut user) => {
                if !self.verify_password(password, &user.password_hash).await? {
                    warn!(user_id = user.id, username, "resetting password of admin account");
                    let hash = self.hash(password).await?;
                    user = self.users.set_password(user.id, &hash).await?;
                }
                if user.role != Role::Admin {
                    info!(user_id = user.id, username, "promoting user to admin");
                    user = self.users.set_role(user.id, Role::Admin).await?;
                }
                Ok(user)
            },
            None => {
                let hash = self.hash(password).await?;
                let user = self.users.create_user(username, &hash, Role::Admin).await?;
                info!(user_id = user.id, username, "admin account created");
                Ok(user)
            },
        }
    }

    fn issue(&self, user_id: i32, role: Role, now: i64) -> AuthResult<String> {
        let ttl = i64::try_from(self.token_ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims { sub: user_id, role, iat: now, exp: now.saturating_add(ttl) };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AuthError::Internal(err.to_string()))
    }

    async fn hash(&self, password: &str) -> AuthResult<String> {
        let password = password.to_string();
        let cost = self.hash_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|err| AuthError::Internal(err.to_string()))?
            .map_err(|err| AuthError::Internal(err.to_string()))
    }

    async fn verify_password(&self, password: &str, hash: &str) -> AuthResult<bool> {
        let password = password.to_string();
        let hash = hash.to_string();
        let matched = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|err| AuthError::Internal(err.to_string()))?;
        // A malformed stored hash counts as a mismatch.
        Ok(matched.unwrap_or(false))
    }
}

fn validate_credentials<'a>(username: &'a str, password: &str) -> AuthResult<&'a str> {
    let username = username.trim();
    let name_chars = username.chars().count();
    if name_chars == 0 || name_chars > USERNAME_MAX_CHARS {
        return Err(AuthError::Invalid(format!(
            "username must be 1..={USERNAME_MAX_CHARS} characters"
        )));
    }
    let password_chars = password.chars().count();
    if !(PASSWORD_MIN_CHARS..=PASSWORD_MAX_CHARS).contains(&password_chars) {
        return Err(AuthError::Invalid(format!(
            "password must be {PASSWORD_MIN_CHARS}..={PASSWORD_MAX_CHARS} characters"
        )));
    }
    Ok(username)
}

/// A caller holding a valid token.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AuthUser {
    pub user_id: i32,
    pub role: Role,
}

impl<S> FromRequestParts<S> for AuthUser
where
    AuthService: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingToken)?;
        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        Ok(AuthService::from_ref(state).verify(token)?)
    }
}

/// A caller allowed to change the catalog.
#[derive(Clone, Copy, Debug)]
pub struct AdminUser(pub AuthUser);

impl<S> FromRequestParts<S> for AdminUser
where
    AuthService: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.role.can_write() {
            debug!(user_id = user.user_id, "write attempted without admin role");
            return Err(AuthError::Forbidden.into());
        }
        Ok(AdminUser(user))
    }
}
