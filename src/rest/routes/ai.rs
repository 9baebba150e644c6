// rest/routes/ai.rs — advisory endpoints.
//
// Coach, breakdown and summary format the caller's numbers into a prompt and
// relay the model's text verbatim alongside those numbers. The burnout check
// is a local heuristic and never calls out.

use axum::{extract::State, Json};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::AppContext;

fn require_ai(ctx: &AppContext) -> Result<(), ApiError> {
    if ctx.ai.enabled() {
        Ok(())
    } else {
        Err(ApiError::Upstream("AI collaborator not configured".into()))
    }
}

pub async fn study_coach(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    require_ai(&ctx)?;
    let now = Utc::now();
    let week_start = (now - Duration::days(7)).to_rfc3339();

    let completed_tasks = ctx.storage.count_completed_tasks(&user.id).await?;
    let total_tasks = ctx.storage.count_tasks(&user.id).await?;
    let pending_tasks = total_tasks.saturating_sub(completed_tasks);
    let overdue_tasks = ctx
        .storage
        .count_overdue_tasks(&user.id, &now.to_rfc3339())
        .await?;
    let sessions = ctx
        .storage
        .count_completed_pomodoros_since(&user.id, &week_start)
        .await?;
    let total_focus = ctx.storage.sum_focus_minutes_since(&user.id, &week_start).await?;
    let active_goals = ctx.storage.count_goals(&user.id, false).await?;

    let context = format!(
        "This week's study data:\n\
         - Tasks completed: {completed_tasks}\n\
         - Tasks pending: {pending_tasks}\n\
         - Overdue tasks: {overdue_tasks}\n\
         - Pomodoro sessions completed: {sessions}\n\
         - Total focus time: {total_focus} minutes\n\
         - Active goals: {active_goals}"
    );

    let advice = ctx
        .ai
        .study_coach(&context)
        .await
        .map_err(|e| ApiError::Upstream(format!("coach request failed: {e}")))?;

    Ok(Json(json!({
        "advice": advice,
        "data_summary": {
            "tasks_completed": completed_tasks,
            "focus_time_hours": (total_focus as f64 / 60.0 * 10.0).round() / 10.0,
            "sessions_completed": sessions,
        },
    })))
}

#[derive(Deserialize)]
pub struct BreakdownRequest {
    pub task_title: String,
    #[serde(default)]
    pub context: String,
}

pub async fn break_down_task(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(_user): AuthUser,
    Json(body): Json<BreakdownRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.task_title.trim().is_empty() {
        return Err(ApiError::BadRequest("task_title is required".into()));
    }
    require_ai(&ctx)?;

    let subtasks = ctx
        .ai
        .break_down_task(&body.task_title, &body.context)
        .await
        .map_err(|e| ApiError::Upstream(format!("breakdown request failed: {e}")))?;

    Ok(Json(json!({
        "original_task": body.task_title,
        "subtasks": subtasks,
    })))
}

pub async fn weekly_summary(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    require_ai(&ctx)?;
    let week_start = (Utc::now() - Duration::days(7)).to_rfc3339();

    let completed_this_week = ctx
        .storage
        .count_tasks_completed_since(&user.id, &week_start)
        .await?;
    let sessions = ctx
        .storage
        .count_completed_pomodoros_since(&user.id, &week_start)
        .await?;
    let total_focus = ctx.storage.sum_focus_minutes_since(&user.id, &week_start).await?;
    let active_goals = ctx.storage.count_goals(&user.id, false).await?;
    let completed_goals = ctx.storage.count_goals(&user.id, true).await?;

    let focus_hours = (total_focus as f64 / 60.0 * 10.0).round() / 10.0;
    let context = format!(
        "Weekly summary data:\n\
         - Tasks completed this week: {completed_this_week}\n\
         - Total Pomodoro sessions: {sessions}\n\
         - Total focus time: {total_focus} minutes ({focus_hours} hours)\n\
         - Goals in progress: {active_goals}\n\
         - Goals completed: {completed_goals}"
    );

    let summary = ctx
        .ai
        .weekly_summary(&context)
        .await
        .map_err(|e| ApiError::Upstream(format!("summary request failed: {e}")))?;

    Ok(Json(json!({
        "summary": summary,
        "stats": {
            "tasks_completed": completed_this_week,
            "focus_hours": focus_hours,
            "sessions": sessions,
        },
    })))
}

/// Overwork heuristic over the last four days. Thresholds: >240 focus
/// minutes/day or >24 sessions raise medium; >5 overdue tasks escalates;
/// >360 minutes/day together with >32 sessions is high outright.
pub async fn burnout_check(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let now = Utc::now();
    let check_start = (now - Duration::days(4)).to_rfc3339();

    let sessions = ctx
        .storage
        .count_completed_pomodoros_since(&user.id, &check_start)
        .await?;
    let total_focus = ctx.storage.sum_focus_minutes_since(&user.id, &check_start).await?;
    let overdue_count = ctx
        .storage
        .count_overdue_tasks(&user.id, &now.to_rfc3339())
        .await?;
    let daily_avg = total_focus as f64 / 4.0;

    let mut warnings: Vec<String> = Vec::new();
    let mut risk_level = "low";

    if daily_avg > 240.0 {
        warnings.push(
            "You've been averaging over 4 hours of focus time daily. Consider taking breaks."
                .to_string(),
        );
        risk_level = "medium";
    }
    if sessions > 24 {
        warnings.push(
            "High number of Pomodoro sessions detected. Make sure you're resting properly."
                .to_string(),
        );
        risk_level = "medium";
    }
    if overdue_count > 5 {
        warnings.push(format!(
            "You have {overdue_count} overdue tasks. Consider prioritizing or rescheduling."
        ));
        risk_level = if risk_level == "medium" { "high" } else { "medium" };
    }
    if daily_avg > 360.0 && sessions > 32 {
        risk_level = "high";
        warnings.push("Warning: Signs of potential burnout detected. Please take a break!".to_string());
    }
    if warnings.is_empty() {
        warnings.push("Looking good! Your workload appears balanced.".to_string());
    }

    Ok(Json(json!({
        "risk_level": risk_level,
        "warnings": warnings,
        "stats": {
            "avg_daily_focus_minutes": daily_avg.round(),
            "sessions_last_4_days": sessions,
            "overdue_tasks": overdue_count,
        },
    })))
}
