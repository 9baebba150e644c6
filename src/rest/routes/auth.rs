// rest/routes/auth.rs — registration, login, OAuth session exchange.

use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap},
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::{self, AuthUser, CREDENTIAL_TTL_DAYS};
use crate::error::ApiError;
use crate::gamification;
use crate::storage::UserRow;
use crate::AppContext;

pub fn user_json(user: &UserRow) -> Value {
    json!({
        "user_id": user.id,
        "email": user.email,
        "name": user.name,
        "picture": user.picture,
        "total_xp": user.total_xp,
        "weekly_xp": user.weekly_xp,
        "monthly_xp": user.monthly_xp,
        "streak": user.streak,
        "group_id": user.group_id,
    })
}

// ─── Register / login ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

pub async fn register(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::BadRequest("email and password required".into()));
    }

    if ctx.storage.get_user_by_email(&body.email).await?.is_some() {
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let hash = auth::hash_password(&body.password)?;
    let user = ctx
        .storage
        .create_user(&body.email, &body.name, Some(&hash), None)
        .await?;
    let token = auth::issue_token(&user.id, &ctx.config.token_secret)?;

    Ok(Json(json!({ "token": token, "user": user_json(&user) })))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let user = ctx
        .storage
        .get_user_by_email(&body.email)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Invalid email or password".into()))?;

    let valid = user
        .password_hash
        .as_deref()
        .map(|h| auth::verify_password(&body.password, h))
        .unwrap_or(false);
    if !valid {
        return Err(ApiError::BadRequest("Invalid email or password".into()));
    }

    // Counters shown at login must reflect the current week/month.
    let user = gamification::check_and_reset_periodic_xp(&ctx.storage, &user).await?;
    let token = auth::issue_token(&user.id, &ctx.config.token_secret)?;
    Ok(Json(json!({ "token": token, "user": user_json(&user) })))
}

// ─── OAuth session exchange ───────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SessionRequest {
    pub session_id: String,
}

#[derive(Deserialize)]
struct BrokerUser {
    email: String,
    name: String,
    picture: Option<String>,
    session_token: Option<String>,
}

/// Exchange an OAuth session id with the identity broker, find or create the
/// matching user, and hand back an http-only session cookie.
pub async fn create_session(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<SessionRequest>,
) -> Result<(HeaderMap, Json<Value>), ApiError> {
    if body.session_id.is_empty() {
        return Err(ApiError::BadRequest("session_id required".into()));
    }
    let broker_url = ctx
        .config
        .oauth_session_url
        .as_deref()
        .ok_or_else(|| ApiError::Upstream("OAuth session exchange not configured".into()))?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(anyhow::Error::from)?;
    let resp = client
        .get(broker_url)
        .header("X-Session-ID", &body.session_id)
        .send()
        .await
        .map_err(|e| ApiError::Upstream(format!("session exchange failed: {e}")))?;
    if !resp.status().is_success() {
        return Err(ApiError::Upstream("Invalid session_id".into()));
    }
    let broker: BrokerUser = resp
        .json()
        .await
        .map_err(|e| ApiError::Upstream(format!("malformed broker response: {e}")))?;

    let user = match ctx.storage.get_user_by_email(&broker.email).await? {
        Some(existing) => {
            ctx.storage
                .update_user_profile(&existing.id, &broker.name, broker.picture.as_deref())
                .await?;
            ctx.storage
                .get_user(&existing.id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("user vanished during profile update"))?
        }
        None => {
            ctx.storage
                .create_user(&broker.email, &broker.name, None, broker.picture.as_deref())
                .await?
        }
    };

    let session_token = broker
        .session_token
        .unwrap_or_else(|| format!("session_{}", uuid::Uuid::new_v4().simple()));
    let expires_at = (Utc::now() + Duration::days(CREDENTIAL_TTL_DAYS)).to_rfc3339();
    ctx.storage
        .create_auth_session(&user.id, &session_token, &expires_at)
        .await?;

    let mut headers = HeaderMap::new();
    let cookie = format!(
        "session_token={session_token}; HttpOnly; Secure; SameSite=None; Path=/; Max-Age={}",
        CREDENTIAL_TTL_DAYS * 24 * 60 * 60,
    );
    headers.insert(
        SET_COOKIE,
        cookie.parse().map_err(|_| anyhow::anyhow!("invalid cookie value"))?,
    );

    Ok((headers, Json(user_json(&user))))
}

pub async fn logout(
    State(ctx): State<Arc<AppContext>>,
    headers_in: HeaderMap,
) -> Result<(HeaderMap, Json<Value>), ApiError> {
    // Best effort: drop the server-side session when the cookie is present.
    if let Some(raw) = headers_in.get(axum::http::header::COOKIE).and_then(|v| v.to_str().ok()) {
        if let Some(token) = raw.split(';').find_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == "session_token").then(|| v.to_string())
        }) {
            ctx.storage.delete_auth_session(&token).await?;
        }
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        "session_token=; HttpOnly; Secure; SameSite=None; Path=/; Max-Age=0"
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid cookie value"))?,
    );
    Ok((headers, Json(json!({ "message": "Logged out" }))))
}

pub async fn me(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let user = gamification::check_and_reset_periodic_xp(&ctx.storage, &user).await?;
    Ok(Json(user_json(&user)))
}
