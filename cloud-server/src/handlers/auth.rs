//! Authentication handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use jsonwebtoken::{encode, Header, EncodingKey};
use serde::{Deserialize, Serialize};
use chrono::{Utc, Duration};

use crate::{AppState, AppError, AppResult};
use crate::middleware::auth::UserContext;
use crate::models::{User, UserInfo, LoginRequest, LoginResponse};
use crate::services::accounts;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,      // User ID
    pub role: String,     // User role
    pub exp: usize,       // Expiration timestamp
    pub iat: usize,       // Issued at
}

/// Login endpoint
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    let Json(req) = payload?;
    let user = accounts::authenticate(state.store.as_ref(), &req.email, &req.password).await?;

    let token = generate_jwt(&user, &state.config.jwt_secret, state.config.jwt_expiration_hours)?;

    tracing::info!("User logged in: {}", user.email);

    Ok(Json(LoginResponse {
        token,
        user: user.to_info(),
    }))
}

/// Current user
pub async fn me(
    State(state): State<AppState>,
    user: UserContext,
) -> AppResult<Json<UserInfo>> {
    let user = state.store
        .find_user(user.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(user.to_info()))
}

/// Generate JWT token
pub fn generate_jwt(user: &User, secret: &str, expiration_hours: u64) -> AppResult<String> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiration_hours as i64);

    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role.as_str().to_string(),
        exp: exp.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes())
    ).map_err(|e| AppError::InternalError(e.to_string()))
}
