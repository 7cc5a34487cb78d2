use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};
use crate::db::models::User;
use crate::db::types::UserRole;
use crate::repositories;

pub(crate) struct CurrentUser(pub(crate) User);
pub(crate) struct CurrentAdmin(pub(crate) User);
/// Admin or professor: exam authoring and the book catalogue.
pub(crate) struct CurrentAuthor(pub(crate) User);
/// Admin or doctor: timeline review.
pub(crate) struct CurrentReviewer(pub(crate) User);

const INVALID_CREDENTIALS: &str = "Invalid authentication credentials";

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::Unauthorized(INVALID_CREDENTIALS))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let claims = security::verify_token(bearer_token(parts)?, app_state.settings())
            .map_err(|_| ApiError::Unauthorized(INVALID_CREDENTIALS))?;

        let user = repositories::users::find_by_id(app_state.db(), &claims.sub)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load user"))?
            .ok_or(ApiError::Unauthorized("User not found"))?;

        if !user.is_active {
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
        }
        // Role changes take effect on the next login.
        if claims.role != user.role {
            tracing::info!(user_id = %user.id, "Rejected token issued for a previous role");
            return Err(ApiError::Unauthorized("Role changed, sign in again"));
        }

        Ok(CurrentUser(user))
    }
}

async fn require_role(
    parts: &mut Parts,
    state: &AppState,
    allowed: fn(UserRole) -> bool,
    message: &'static str,
) -> Result<User, ApiError> {
    let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
    if allowed(user.role) {
        Ok(user)
    } else {
        tracing::warn!(user_id = %user.id, role = ?user.role, "Role check failed");
        Err(ApiError::Forbidden(message))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        require_role(parts, state, |role| role == UserRole::Admin, "Admin access required")
            .await
            .map(CurrentAdmin)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAuthor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        require_role(parts, state, UserRole::is_author, "Professor or admin access required")
            .await
            .map(CurrentAuthor)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentReviewer {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        require_role(parts, state, UserRole::is_reviewer, "Doctor or admin access required")
            .await
            .map(CurrentReviewer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(authorization: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/records");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_token_requires_bearer_scheme() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc.def"))).unwrap(), "abc.def");
        assert!(bearer_token(&parts_with(Some("Basic dXNlcjpwdw=="))).is_err());
        assert!(bearer_token(&parts_with(Some("Bearer   "))).is_err());
        assert!(bearer_token(&parts_with(None)).is_err());
    }
}
