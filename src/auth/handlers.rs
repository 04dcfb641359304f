use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{
            LoginRequest, LoginResponse, PublicUser, RegisterResponse, RegisterUserRequest,
            Required,
        },
        error::ServiceError,
    },
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user/register", post(register))
        .route("/user/login", post(login))
        .route("/user/:id", get(get_user))
}

/// Decode the body and check required fields; both failures are a 400.
fn accept<T: DeserializeOwned + Required>(
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, ServiceError> {
    let Json(body) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "undecodable request body");
        ServiceError::bad_request(rejection.body_text())
    })?;
    body.check_required()?;
    Ok(body)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ServiceError> {
    let req = accept(payload)?;
    let id = state
        .users
        .register_user(&req.email, &req.username, &req.password)
        .await?;
    Ok(Json(RegisterResponse { id }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ServiceError> {
    let req = accept(payload)?;
    let token = state.users.login_user(&req.email, &req.password).await?;
    Ok(Json(LoginResponse { token }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PublicUser>, ServiceError> {
    let user = state.users.get_user_by_id(id).await?;
    Ok(Json(user.into()))
}
