use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, PublicUser, RegisterRequest, TokenResponse},
        extractors::AuthUser,
        jwt::JwtKeys,
        services,
    },
    error::{AuthError, AuthResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
}

/// Malformed or incomplete JSON is a validation failure like any other.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> AuthResult<T> {
    body.map(|Json(v)| v).map_err(|rejection| {
        warn!(error = %rejection, "rejected request body");
        AuthError::Validation(rejection.body_text())
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AuthResult<(StatusCode, Json<PublicUser>)> {
    let payload = json_body(payload)?;
    let user = services::register(state.store.as_ref(), payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AuthResult<Json<TokenResponse>> {
    let payload = json_body(payload)?;
    let keys = JwtKeys::from_ref(&state);
    let res = services::login(state.store.as_ref(), &keys, payload).await?;
    Ok(Json(res))
}

#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AuthResult<Json<PublicUser>> {
    let user = state.store.find_by_id(user_id).await?.ok_or_else(|| {
        warn!(user_id = %user_id, "token subject not found");
        AuthError::Unauthorized("User not found".into())
    })?;
    Ok(Json(user.into()))
}
