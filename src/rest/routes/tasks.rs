// rest/routes/tasks.rs — task CRUD with completion-driven XP.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::gamification;
use crate::storage::{due_date_deadline, TaskRow};
use crate::AppContext;

const PRIORITIES: [&str; 4] = ["low", "medium", "high", "urgent"];
const STATUSES: [&str; 3] = ["pending", "in_progress", "completed"];

pub fn task_json(task: &TaskRow, now: &str) -> Value {
    let depends_on: Value = serde_json::from_str(&task.depends_on).unwrap_or_else(|_| json!([]));
    let is_overdue = task.status != "completed"
        && task
            .due_date
            .as_deref()
            .map(|d| due_date_deadline(d).as_str() < now)
            .unwrap_or(false);
    json!({
        "task_id": task.id,
        "title": task.title,
        "description": task.description,
        "subject": task.subject,
        "priority": task.priority,
        "status": task.status,
        "due_date": task.due_date,
        "estimated_minutes": task.estimated_minutes,
        "depends_on": depends_on,
        "scheduled_time": task.scheduled_time,
        "completed_at": task.completed_at,
        "is_overdue": is_overdue,
        "created_at": task.created_at,
    })
}

// ─── Create / list ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: String,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    pub estimated_minutes: Option<i64>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub scheduled_time: Option<String>,
}

pub async fn create_task(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateTaskRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title required".into()));
    }
    let priority = body.priority.unwrap_or_else(|| "medium".to_string());
    if !PRIORITIES.contains(&priority.as_str()) {
        return Err(ApiError::BadRequest(format!("invalid priority {priority:?}")));
    }

    let depends_on = serde_json::to_string(&body.depends_on).map_err(anyhow::Error::from)?;
    let task = ctx
        .storage
        .create_task(
            &user.id,
            &body.title,
            &body.description,
            &body.subject,
            &priority,
            body.due_date.as_deref(),
            body.estimated_minutes,
            &depends_on,
            body.scheduled_time.as_deref(),
        )
        .await?;

    Ok(Json(task_json(&task, &Utc::now().to_rfc3339())))
}

#[derive(Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub subject: Option<String>,
}

pub async fn list_tasks(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Query(q): Query<ListTasksQuery>,
) -> Result<Json<Value>, ApiError> {
    let tasks = ctx
        .storage
        .list_tasks(
            &user.id,
            q.status.as_deref(),
            q.priority.as_deref(),
            q.subject.as_deref(),
        )
        .await?;
    let now = Utc::now().to_rfc3339();
    let list: Vec<Value> = tasks.iter().map(|t| task_json(t, &now)).collect();
    Ok(Json(json!(list)))
}

pub async fn get_task(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task = ctx
        .storage
        .get_task(&id, &user.id)
        .await?
        .ok_or(ApiError::NotFound("Task"))?;
    Ok(Json(task_json(&task, &Utc::now().to_rfc3339())))
}

// ─── Update / delete ──────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub due_date: Option<String>,
    pub estimated_minutes: Option<i64>,
    pub depends_on: Option<Vec<String>>,
    pub scheduled_time: Option<String>,
}

impl UpdateTaskRequest {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.subject.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.due_date.is_none()
            && self.estimated_minutes.is_none()
            && self.depends_on.is_none()
            && self.scheduled_time.is_none()
    }
}

pub async fn update_task(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".into()));
    }
    if let Some(p) = body.priority.as_deref() {
        if !PRIORITIES.contains(&p) {
            return Err(ApiError::BadRequest(format!("invalid priority {p:?}")));
        }
    }
    if let Some(s) = body.status.as_deref() {
        if !STATUSES.contains(&s) {
            return Err(ApiError::BadRequest(format!("invalid status {s:?}")));
        }
    }

    let mut task = ctx
        .storage
        .get_task(&id, &user.id)
        .await?
        .ok_or(ApiError::NotFound("Task"))?;

    let was_completed = task.status == "completed";

    if let Some(v) = body.title {
        task.title = v;
    }
    if let Some(v) = body.description {
        task.description = v;
    }
    if let Some(v) = body.subject {
        task.subject = v;
    }
    if let Some(v) = body.priority {
        task.priority = v;
    }
    if let Some(v) = body.status {
        task.status = v;
    }
    if let Some(v) = body.due_date {
        task.due_date = Some(v);
    }
    if let Some(v) = body.estimated_minutes {
        task.estimated_minutes = Some(v);
    }
    if let Some(v) = body.depends_on {
        task.depends_on = serde_json::to_string(&v).map_err(anyhow::Error::from)?;
    }
    if let Some(v) = body.scheduled_time {
        task.scheduled_time = Some(v);
    }

    let now_completed = task.status == "completed";
    let mut awarded = 0;
    if now_completed && !was_completed {
        task.completed_at = Some(Utc::now().to_rfc3339());
        // XP only on the first-ever completion; status flapping never
        // re-awards.
        if !task.xp_awarded {
            task.xp_awarded = true;
            awarded = gamification::award_xp(
                &ctx.storage,
                &user,
                gamification::task_xp(&task.priority),
                "task_completed",
                user.group_id.as_deref(),
            )
            .await?;
        }
    } else if !now_completed && was_completed {
        task.completed_at = None;
    }

    ctx.storage.update_task(&task).await?;

    if now_completed && !was_completed {
        gamification::calculate_streak(&ctx.storage, &user.id, Utc::now().date_naive()).await?;
    }

    let mut out = task_json(&task, &Utc::now().to_rfc3339());
    if awarded > 0 {
        out["awarded_xp"] = json!(awarded);
    }
    Ok(Json(out))
}

pub async fn delete_task(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !ctx.storage.delete_task(&id, &user.id).await? {
        return Err(ApiError::NotFound("Task"));
    }
    Ok(Json(json!({ "message": "Task deleted" })))
}
