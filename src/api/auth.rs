use axum::{
    extract::{Form, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::redis::RateLimitPolicy;
use crate::core::security;
use crate::core::state::AppState;
use crate::db::models::User;
use crate::schemas::auth::TokenResponse;
use crate::schemas::user::{UserLogin, UserResponse};

const BAD_CREDENTIALS: &str = "Incorrect username or password";

#[derive(Debug, Deserialize)]
struct OAuth2PasswordForm {
    username: String,
    password: String,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/token", post(token))
        .route("/me", get(me))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<UserLogin>,
) -> Result<Json<TokenResponse>, ApiError> {
    check_rate_limit(&state, RateLimitPolicy::LOGIN, &payload.username).await?;
    authenticate(&state, &payload.username, &payload.password).await.map(Json)
}

async fn token(
    State(state): State<AppState>,
    Form(payload): Form<OAuth2PasswordForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    check_rate_limit(&state, RateLimitPolicy::TOKEN, &payload.username).await?;
    authenticate(&state, &payload.username, &payload.password).await.map(Json)
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from_db(user))
}

async fn check_rate_limit(
    state: &AppState,
    policy: RateLimitPolicy,
    username: &str,
) -> Result<(), ApiError> {
    if state.redis().allow(policy, username).await {
        Ok(())
    } else {
        Err(ApiError::TooManyRequests("Too many login attempts, try again later"))
    }
}

async fn authenticate(
    state: &AppState,
    username: &str,
    password: &str,
) -> Result<TokenResponse, ApiError> {
    let user = fetch_user_by_username(state, username.trim()).await?;

    let verified = security::verify_password(password, &user.hashed_password)
        .map_err(|_| ApiError::Unauthorized(BAD_CREDENTIALS))?;
    if !verified {
        tracing::info!(username = %user.username, "Rejected login with wrong password");
        return Err(ApiError::Unauthorized(BAD_CREDENTIALS));
    }

    if !user.is_active {
        return Err(ApiError::BadRequest("Inactive user".to_string()));
    }

    let token = security::create_access_token(&user.id, user.role, state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;

    tracing::info!(user_id = %user.id, role = ?user.role, "User logged in");
    Ok(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        role: user.role,
        user: UserResponse::from_db(user),
    })
}

async fn fetch_user_by_username(state: &AppState, username: &str) -> Result<User, ApiError> {
    crate::repositories::users::find_by_username(state.db(), username)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?
        .ok_or(ApiError::Unauthorized(BAD_CREDENTIALS))
}

#[cfg(test)]
mod tests;
