// rest/routes/goals.rs — weekly goals with derived progress.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::gamification::{self, resolve_current_period};
use crate::storage::GoalRow;
use crate::AppContext;

/// One checklist item inside a goal, stored as JSON on the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskItem {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<i64>,
}

fn parse_subtasks(goal: &GoalRow) -> Vec<SubtaskItem> {
    serde_json::from_str(&goal.subtasks).unwrap_or_default()
}

fn parse_target_tasks(goal: &GoalRow) -> Vec<String> {
    serde_json::from_str(&goal.target_tasks).unwrap_or_default()
}

/// Progress is recomputed on every read: subtask completion ratio when
/// subtasks exist, else target-task completion ratio, else the stored value.
async fn derived_progress(ctx: &AppContext, goal: &GoalRow) -> Result<f64, ApiError> {
    let subtasks = parse_subtasks(goal);
    if !subtasks.is_empty() {
        let done = subtasks.iter().filter(|s| s.completed).count();
        return Ok(done as f64 / subtasks.len() as f64 * 100.0);
    }
    let targets = parse_target_tasks(goal);
    if !targets.is_empty() {
        let done = ctx.storage.count_completed_in_list(&targets).await?;
        return Ok(done as f64 / targets.len() as f64 * 100.0);
    }
    Ok(goal.progress)
}

fn goal_json(goal: &GoalRow, progress: f64) -> Value {
    json!({
        "goal_id": goal.id,
        "title": goal.title,
        "description": goal.description,
        "target_tasks": serde_json::from_str::<Value>(&goal.target_tasks).unwrap_or_else(|_| json!([])),
        "subtasks": serde_json::from_str::<Value>(&goal.subtasks).unwrap_or_else(|_| json!([])),
        "week_start": goal.week_start,
        "progress": progress,
        "completed": goal.completed,
        "streak": goal.streak,
        "xp_reward": goal.xp_reward,
        "created_at": goal.created_at,
    })
}

// ─── CRUD ─────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateGoalRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_tasks: Vec<String>,
    pub week_start: Option<String>,
    pub xp_reward: Option<i64>,
}

pub async fn create_goal(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateGoalRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title required".into()));
    }

    let week_start = body
        .week_start
        .unwrap_or_else(|| resolve_current_period(Utc::now()).week_marker());
    let target_tasks = serde_json::to_string(&body.target_tasks).map_err(anyhow::Error::from)?;
    let xp_reward = body.xp_reward.unwrap_or(gamification::DEFAULT_GOAL_XP);

    let goal = ctx
        .storage
        .create_goal(&user.id, &body.title, &body.description, &target_tasks, &week_start, xp_reward)
        .await?;
    let progress = derived_progress(&ctx, &goal).await?;
    Ok(Json(goal_json(&goal, progress)))
}

pub async fn list_goals(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let goals = ctx.storage.list_goals(&user.id).await?;
    let mut list = Vec::with_capacity(goals.len());
    for goal in &goals {
        let progress = derived_progress(&ctx, goal).await?;
        list.push(goal_json(goal, progress));
    }
    Ok(Json(json!(list)))
}

#[derive(Deserialize, Default)]
pub struct UpdateGoalRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub target_tasks: Option<Vec<String>>,
    pub subtasks: Option<Vec<SubtaskItem>>,
    pub completed: Option<bool>,
    pub xp_reward: Option<i64>,
}

impl UpdateGoalRequest {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.target_tasks.is_none()
            && self.subtasks.is_none()
            && self.completed.is_none()
            && self.xp_reward.is_none()
    }
}

pub async fn update_goal(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateGoalRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".into()));
    }

    let mut goal = ctx
        .storage
        .get_goal(&id, &user.id)
        .await?
        .ok_or(ApiError::NotFound("Goal"))?;

    let was_completed = goal.completed;

    if let Some(v) = body.title {
        goal.title = v;
    }
    if let Some(v) = body.description {
        goal.description = v;
    }
    if let Some(v) = body.target_tasks {
        goal.target_tasks = serde_json::to_string(&v).map_err(anyhow::Error::from)?;
    }
    if let Some(v) = body.subtasks {
        goal.subtasks = serde_json::to_string(&v).map_err(anyhow::Error::from)?;
    }
    if let Some(v) = body.completed {
        goal.completed = v;
    }
    if let Some(v) = body.xp_reward {
        goal.xp_reward = v;
    }

    let mut awarded = 0;
    if goal.completed && !was_completed && !goal.xp_awarded {
        goal.xp_awarded = true;
        awarded = gamification::award_xp(
            &ctx.storage,
            &user,
            goal.xp_reward,
            "goal_completed",
            user.group_id.as_deref(),
        )
        .await?;
    }

    let progress = derived_progress(&ctx, &goal).await?;
    goal.progress = progress;
    ctx.storage.update_goal(&goal).await?;

    let mut out = goal_json(&goal, progress);
    if awarded > 0 {
        out["awarded_xp"] = json!(awarded);
    }
    Ok(Json(out))
}

pub async fn delete_goal(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !ctx.storage.delete_goal(&id, &user.id).await? {
        return Err(ApiError::NotFound("Goal"));
    }
    Ok(Json(json!({ "message": "Goal deleted" })))
}

// ─── AI breakdown ─────────────────────────────────────────────────────────────

/// Generate subtasks for a goal via the AI collaborator and persist them.
/// Runs only when an API key is configured; unparseable model output
/// degrades to a single wrapped item rather than failing.
pub async fn breakdown(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let mut goal = ctx
        .storage
        .get_goal(&id, &user.id)
        .await?
        .ok_or(ApiError::NotFound("Goal"))?;
    if !ctx.ai.enabled() {
        return Err(ApiError::Upstream("AI collaborator not configured".into()));
    }

    let generated = ctx
        .ai
        .break_down_task(&goal.title, &goal.description)
        .await
        .map_err(|e| ApiError::Upstream(format!("breakdown failed: {e}")))?;

    let subtasks: Vec<SubtaskItem> = generated
        .into_iter()
        .map(|s| SubtaskItem {
            title: s.title,
            completed: false,
            estimated_minutes: Some(s.estimated_minutes),
        })
        .collect();
    goal.subtasks = serde_json::to_string(&subtasks).map_err(anyhow::Error::from)?;
    let progress = derived_progress(&ctx, &goal).await?;
    goal.progress = progress;
    ctx.storage.update_goal(&goal).await?;

    Ok(Json(goal_json(&goal, progress)))
}
