// rest/routes/planner.rs — day schedule generation and block edits.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::planner::{self, parse_minutes, GenerateRequest};
use crate::storage::{BlockRow, ScheduleRow};
use crate::AppContext;

fn block_json(b: &BlockRow) -> Value {
    json!({
        "block_id": b.id,
        "start_time": b.start_time,
        "end_time": b.end_time,
        "title": b.title,
        "kind": b.kind,
        "task_id": b.task_id,
        "locked": b.locked,
    })
}

fn schedule_json(s: &ScheduleRow, blocks: &[BlockRow]) -> Value {
    json!({
        "schedule_id": s.id,
        "date": s.date,
        "blocks": blocks.iter().map(block_json).collect::<Vec<_>>(),
        "created_at": s.created_at,
    })
}

fn validate_date(date: &str) -> Result<(), ApiError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| ApiError::BadRequest(format!("invalid date {date:?}")))
}

pub async fn generate(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<Value>, ApiError> {
    validate_date(&body.date)?;
    planner::validate_window(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let blocks =
        planner::generate_blocks(&ctx.storage, &ctx.ai, &ctx.calendar, &user.id, &body).await?;

    let schedule = ctx.storage.replace_schedule(&user.id, &body.date, &blocks).await?;
    let stored = ctx.storage.list_blocks(&schedule.id).await?;
    Ok(Json(schedule_json(&schedule, &stored)))
}

pub async fn get_schedule(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Path(date): Path<String>,
) -> Result<Json<Value>, ApiError> {
    validate_date(&date)?;
    let schedule = ctx
        .storage
        .get_schedule(&user.id, &date)
        .await?
        .ok_or(ApiError::NotFound("Schedule"))?;
    let blocks = ctx.storage.list_blocks(&schedule.id).await?;
    Ok(Json(schedule_json(&schedule, &blocks)))
}

#[derive(Deserialize, Default)]
pub struct UpdateBlockRequest {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub title: Option<String>,
}

pub async fn update_block(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Path((date, block_id)): Path<(String, String)>,
    Json(body): Json<UpdateBlockRequest>,
) -> Result<Json<Value>, ApiError> {
    validate_date(&date)?;
    if body.start_time.is_none() && body.end_time.is_none() && body.title.is_none() {
        return Err(ApiError::BadRequest("No fields to update".into()));
    }

    let schedule = ctx
        .storage
        .get_schedule(&user.id, &date)
        .await?
        .ok_or(ApiError::NotFound("Schedule"))?;
    let block = ctx
        .storage
        .get_block(&schedule.id, &block_id)
        .await?
        .ok_or(ApiError::NotFound("Block"))?;
    if block.locked {
        return Err(ApiError::BadRequest("Locked blocks are not modifiable".into()));
    }

    let start_time = body.start_time.unwrap_or(block.start_time);
    let end_time = body.end_time.unwrap_or(block.end_time);
    let title = body.title.unwrap_or(block.title);

    let start = parse_minutes(&start_time).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let end = parse_minutes(&end_time).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if start >= end {
        return Err(ApiError::BadRequest("start_time must precede end_time".into()));
    }

    ctx.storage
        .update_block(&block_id, &start_time, &end_time, &title)
        .await?;
    let updated = ctx
        .storage
        .get_block(&schedule.id, &block_id)
        .await?
        .ok_or(ApiError::NotFound("Block"))?;
    Ok(Json(block_json(&updated)))
}

pub async fn delete_block(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Path((date, block_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    validate_date(&date)?;
    let schedule = ctx
        .storage
        .get_schedule(&user.id, &date)
        .await?
        .ok_or(ApiError::NotFound("Schedule"))?;
    let block = ctx
        .storage
        .get_block(&schedule.id, &block_id)
        .await?
        .ok_or(ApiError::NotFound("Block"))?;
    if block.locked {
        return Err(ApiError::BadRequest("Locked blocks are not modifiable".into()));
    }

    ctx.storage.delete_block(&block_id).await?;
    Ok(Json(json!({ "message": "Block deleted" })))
}
