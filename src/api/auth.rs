use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Form, Json,
};
use chrono::Duration;
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_full_name, validate_password};
use crate::crypto::{issue_token, verify_token};
use crate::db::{
    SignupRequest, SignupResponse, TokenRequest, TokenResponse, User, UserResponse, UserRole,
};
use crate::services::accounts;
use crate::AppState;

/// Sign up as a rider or driver
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(&request.email));
    errors.check("password", validate_password(&request.password));
    errors.check("full_name", validate_full_name(&request.full_name));
    errors.finish()?;

    let user = accounts::signup(&state.db, &request).await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User created successfully".to_string(),
            user: UserResponse::from(user),
        }),
    ))
}

/// Password grant: form-encoded `username` (the email) and `password`
pub async fn token(
    State(state): State<Arc<AppState>>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = accounts::authenticate(&state.db, &request.username, &request.password).await?;

    let ttl = Duration::minutes(state.config.auth.token_ttl_minutes);
    let access_token = issue_token(&state.config.auth.jwt_secret, &user.id, user.role_enum(), ttl)
        .map_err(|e| ApiError::internal(format!("Failed to issue token: {}", e)))?;

    tracing::info!(user_id = %user.id, "Issued access token");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

pub async fn me(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve a JWT to an active user
pub async fn user_from_token(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = verify_token(&state.config.auth.jwt_secret, token).map_err(|e| {
        tracing::debug!("Rejected access token: {}", e);
        ApiError::unauthorized("Could not validate credentials")
    })?;

    let user = accounts::find_by_id(&state.db, &claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::unauthorized("Could not validate credentials"))?;
    Ok(user)
}

/// The caller, authenticated by `Authorization: Bearer <jwt>`
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;
        user_from_token(state, token).await
    }
}

/// An authenticated user with the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = User::from_request_parts(parts, state).await?;
        if user.role_enum() != UserRole::Admin {
            return Err(ApiError::forbidden("Admin access required"));
        }
        Ok(AdminUser(user))
    }
}
