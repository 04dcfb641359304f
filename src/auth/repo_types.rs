use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User record in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    // Argon2 PHC string. Left out of profile reads, never serialized.
    #[serde(skip_serializing, default)]
    #[sqlx(rename = "password", default)]
    pub password_hash: Option<String>,
}

/// A validated, normalized user about to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}
