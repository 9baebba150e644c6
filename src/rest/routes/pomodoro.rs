// rest/routes/pomodoro.rs — focus sessions and their stats.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::gamification::{self, POMODORO_XP};
use crate::storage::PomodoroRow;
use crate::AppContext;

fn session_json(s: &PomodoroRow) -> Value {
    json!({
        "session_id": s.id,
        "task_id": s.task_id,
        "focus_minutes": s.focus_minutes,
        "break_minutes": s.break_minutes,
        "completed": s.completed,
        "started_at": s.started_at,
        "completed_at": s.completed_at,
    })
}

#[derive(Deserialize)]
pub struct StartRequest {
    pub task_id: Option<String>,
    #[serde(default = "default_focus")]
    pub focus_minutes: i64,
    #[serde(default = "default_break")]
    pub break_minutes: i64,
}

fn default_focus() -> i64 {
    25
}
fn default_break() -> i64 {
    5
}

pub async fn start(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Json(body): Json<StartRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.focus_minutes <= 0 {
        return Err(ApiError::BadRequest("focus_minutes must be positive".into()));
    }
    if let Some(task_id) = body.task_id.as_deref() {
        ctx.storage
            .get_task(task_id, &user.id)
            .await?
            .ok_or(ApiError::NotFound("Task"))?;
    }

    let session = ctx
        .storage
        .create_pomodoro(&user.id, body.task_id.as_deref(), body.focus_minutes, body.break_minutes)
        .await?;
    Ok(Json(session_json(&session)))
}

/// Idempotent completion: the transition happens at most once, and so does
/// the XP award. A repeat call returns the unchanged session.
pub async fn complete(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    ctx.storage
        .get_pomodoro(&id, &user.id)
        .await?
        .ok_or(ApiError::NotFound("Session"))?;

    let transitioned = ctx.storage.complete_pomodoro(&id, &user.id).await?;
    let mut awarded = 0;
    if transitioned {
        awarded = gamification::award_xp(
            &ctx.storage,
            &user,
            POMODORO_XP,
            "pomodoro_completed",
            user.group_id.as_deref(),
        )
        .await?;
        gamification::calculate_streak(&ctx.storage, &user.id, Utc::now().date_naive()).await?;
    }

    let session = ctx
        .storage
        .get_pomodoro(&id, &user.id)
        .await?
        .ok_or(ApiError::NotFound("Session"))?;
    let mut out = session_json(&session);
    if awarded > 0 {
        out["awarded_xp"] = json!(awarded);
    }
    Ok(Json(out))
}

#[derive(Deserialize)]
pub struct SessionsQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    7
}

pub async fn sessions(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Query(q): Query<SessionsQuery>,
) -> Result<Json<Value>, ApiError> {
    let start = (Utc::now() - Duration::days(q.days.max(0))).to_rfc3339();
    let sessions = ctx.storage.list_pomodoros_since(&user.id, &start).await?;
    let list: Vec<Value> = sessions.iter().map(session_json).collect();
    Ok(Json(json!(list)))
}

pub async fn stats(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let now = Utc::now();
    let today_start = now.date_naive().and_time(NaiveTime::MIN).and_utc().to_rfc3339();
    let week_start = (now - Duration::days(7)).to_rfc3339();

    let today_sessions = ctx
        .storage
        .count_completed_pomodoros_since(&user.id, &today_start)
        .await?;
    let week_sessions = ctx
        .storage
        .count_completed_pomodoros_since(&user.id, &week_start)
        .await?;
    let total_focus = ctx.storage.sum_focus_minutes_since(&user.id, &week_start).await?;

    Ok(Json(json!({
        "today_sessions": today_sessions,
        "week_sessions": week_sessions,
        "total_focus_time_minutes": total_focus,
        "average_daily_sessions": week_sessions as f64 / 7.0,
    })))
}
