use async_trait::async_trait;
use sqlx::PgPool;

use crate::auth::error::StoreError;
use crate::auth::repo_types::{NewUser, User};

#[async_trait]
pub trait UserSaver: Send + Sync {
    /// Insert a user and return the id assigned by the store.
    async fn save(&self, user: &NewUser) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait UserGetter: Send + Sync {
    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;
    async fn get_by_username(&self, username: &str) -> Result<User, StoreError>;
    /// Profile read; `password_hash` is always `None`.
    async fn get_by_id(&self, id: i64) -> Result<User, StoreError>;
}

pub trait UserStore: UserSaver + UserGetter {}

impl<T: UserSaver + UserGetter> UserStore for T {}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_err(op: &'static str, e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
        other => StoreError::unknown(op, other),
    }
}

#[async_trait]
impl UserSaver for PgUserStore {
    async fn save(&self, user: &NewUser) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (email, username, password)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_err("users.save", e))?;
        Ok(id)
    }
}

#[async_trait]
impl UserGetter for PgUserStore {
    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_err("users.get_by_email", e))
    }

    async fn get_by_username(&self, username: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_err("users.get_by_username", e))
    }

    async fn get_by_id(&self, id: i64) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(r#"SELECT id, email, username FROM users WHERE id = $1"#)
            .bind(id)
            .fetch_one(&self.db)
            .await
            .map_err(|e| map_err("users.get_by_id", e))
    }
}
