// rest/routes/analytics.rs — aggregate productivity read models.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::gamification::day_bounds;
use crate::AppContext;

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub async fn overview(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let now = Utc::now();

    let total_tasks = ctx.storage.count_tasks(&user.id).await?;
    let completed_tasks = ctx.storage.count_completed_tasks(&user.id).await?;
    let overdue_tasks = ctx
        .storage
        .count_overdue_tasks(&user.id, &now.to_rfc3339())
        .await?;

    let week_start = (now - Duration::days(7)).to_rfc3339();
    let week_sessions = ctx
        .storage
        .count_completed_pomodoros_since(&user.id, &week_start)
        .await?;
    let total_focus = ctx.storage.sum_focus_minutes_since(&user.id, &week_start).await?;

    let active_goals = ctx.storage.count_goals(&user.id, false).await?;
    let completed_goals = ctx.storage.count_goals(&user.id, true).await?;

    let completion_rate = if total_tasks > 0 {
        completed_tasks as f64 / total_tasks as f64 * 100.0
    } else {
        0.0
    };
    // 4 completed sessions a day over the week is a "perfect" focus score.
    let focus_score = (week_sessions as f64 / 28.0 * 100.0).min(100.0);
    let productivity_score = (completion_rate + focus_score) / 2.0;

    Ok(Json(json!({
        "tasks": {
            "total": total_tasks,
            "completed": completed_tasks,
            "overdue": overdue_tasks,
            "completion_rate": round1(completion_rate),
        },
        "pomodoro": {
            "sessions_this_week": week_sessions,
            "total_focus_time_minutes": total_focus,
            "average_daily_sessions": round1(week_sessions as f64 / 7.0),
        },
        "goals": {
            "active": active_goals,
            "completed": completed_goals,
        },
        "productivity_score": round1(productivity_score),
    })))
}

#[derive(Deserialize)]
pub struct DailyStatsQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    7
}

/// Per-day completed-task and focus numbers, oldest day first.
pub async fn daily_stats(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Query(q): Query<DailyStatsQuery>,
) -> Result<Json<Value>, ApiError> {
    let today = Utc::now().date_naive();
    let days = q.days.clamp(1, 90);

    let mut stats = Vec::with_capacity(days as usize);
    for offset in (0..days).rev() {
        let day = today - Duration::days(offset);
        let (start, end) = day_bounds(day);

        let tasks_completed = ctx
            .storage
            .count_tasks_completed_between(&user.id, &start, &end)
            .await?;
        let sessions = ctx
            .storage
            .count_completed_pomodoros_between(&user.id, &start, &end)
            .await?;
        let focus_minutes = ctx
            .storage
            .sum_focus_minutes_between(&user.id, &start, &end)
            .await?;

        stats.push(json!({
            "date": day.format("%Y-%m-%d").to_string(),
            "day": day.format("%a").to_string(),
            "tasks_completed": tasks_completed,
            "pomodoro_sessions": sessions,
            "focus_time_minutes": focus_minutes,
        }));
    }

    Ok(Json(json!(stats)))
}
