// rest/routes/calendar.rs — external calendar connect flow.
//
// The auth-url carries a signed state token so the provider's redirect can
// identify the connecting user without a cookie.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::{self, AuthUser};
use crate::error::ApiError;
use crate::AppContext;

pub async fn auth_url(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    if !ctx.calendar.configured() {
        return Err(ApiError::BadRequest("Calendar integration not configured".into()));
    }
    let state = auth::issue_token(&user.id, &ctx.config.token_secret)?;
    let url = ctx.calendar.auth_url(&state)?;
    Ok(Json(json!({ "auth_url": url })))
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

pub async fn callback(
    State(ctx): State<Arc<AppContext>>,
    Query(q): Query<CallbackQuery>,
) -> Result<Json<Value>, ApiError> {
    let claims = auth::verify_token(&q.state, &ctx.config.token_secret)
        .map_err(|_| ApiError::BadRequest("invalid state parameter".into()))?;
    let user = ctx
        .storage
        .get_user(&claims.user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    let grant = ctx
        .calendar
        .exchange_code(&q.code)
        .await
        .map_err(|e| ApiError::Upstream(format!("token exchange failed: {e}")))?;

    let expires_at = grant
        .expires_in
        .map(|secs| (Utc::now() + Duration::seconds(secs)).to_rfc3339());
    ctx.storage
        .upsert_calendar_account(
            &user.id,
            &grant.access_token,
            grant.refresh_token.as_deref(),
            expires_at.as_deref(),
        )
        .await?;

    Ok(Json(json!({ "message": "Calendar connected" })))
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub date: String,
}

pub async fn events(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Query(q): Query<EventsQuery>,
) -> Result<Json<Value>, ApiError> {
    let account = ctx
        .storage
        .get_calendar_account(&user.id)
        .await?
        .ok_or(ApiError::NotFound("Calendar account"))?;

    let events = ctx
        .calendar
        .events_for_date(&account.access_token, &q.date)
        .await
        .map_err(|e| ApiError::Upstream(format!("calendar fetch failed: {e}")))?;

    Ok(Json(json!({ "date": q.date, "events": events })))
}

pub async fn status(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let account = ctx.storage.get_calendar_account(&user.id).await?;
    Ok(Json(json!({
        "configured": ctx.calendar.configured(),
        "connected": account.is_some(),
        "connected_at": account.map(|a| a.connected_at),
    })))
}

pub async fn disconnect(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    if !ctx.storage.delete_calendar_account(&user.id).await? {
        return Err(ApiError::NotFound("Calendar account"));
    }
    Ok(Json(json!({ "message": "Calendar disconnected" })))
}
