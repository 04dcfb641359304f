use serde::{Deserialize, Serialize};

use crate::auth::{error::ServiceError, repo_types::User};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Fields that must be present and non-blank before the workflow runs.
/// Passwords are taken verbatim, so only an empty one is missing.
pub trait Required {
    fn required(&self) -> Vec<(&'static str, &str)>;

    fn check_required(&self) -> Result<(), ServiceError> {
        let missing = self.required().into_iter().find(|(field, v)| match *field {
            "password" => v.is_empty(),
            _ => v.trim().is_empty(),
        });
        match missing {
            Some((field, _)) => Err(ServiceError::bad_request(format!("{field} is required"))),
            None => Ok(()),
        }
    }
}

impl Required for RegisterUserRequest {
    fn required(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("email", self.email.as_str()),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ]
    }
}

impl Required for LoginRequest {
    fn required(&self) -> Vec<(&'static str, &str)> {
        vec![("email", self.email.as_str()), ("password", self.password.as_str())]
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub email: String,
    pub username: String,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            username: u.username,
        }
    }
}
