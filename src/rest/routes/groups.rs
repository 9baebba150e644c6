// rest/routes/groups.rs — study group membership.
//
// A user belongs to at most one group. Leaving hands ownership to the
// longest-standing remaining member; the last member out dissolves the group.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::storage::GroupRow;
use crate::AppContext;

fn group_json(group: &GroupRow, member_count: u64) -> Value {
    json!({
        "group_id": group.id,
        "name": group.name,
        "description": group.description,
        "owner_id": group.owner_id,
        "is_public": group.is_public,
        "total_xp": group.total_xp,
        "weekly_xp": group.weekly_xp,
        "member_count": member_count,
        "created_at": group.created_at,
    })
}

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

pub async fn create_group(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateGroupRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name required".into()));
    }
    if user.group_id.is_some() {
        return Err(ApiError::Conflict("Leave your current group first".into()));
    }

    let group = ctx
        .storage
        .create_group(&body.name, &body.description, &user.id, body.is_public)
        .await?;
    ctx.storage.set_user_group(&user.id, Some(&group.id)).await?;

    Ok(Json(group_json(&group, 1)))
}

pub async fn list_groups(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(_user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let groups = ctx.storage.list_public_groups().await?;
    let mut list = Vec::with_capacity(groups.len());
    for group in &groups {
        let members = ctx.storage.count_group_members(&group.id).await?;
        list.push(group_json(group, members));
    }
    Ok(Json(json!(list)))
}

pub async fn get_group(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(_user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let group = ctx.storage.get_group(&id).await?.ok_or(ApiError::NotFound("Group"))?;
    let members = ctx.storage.list_group_members(&group.id).await?;
    let mut out = group_json(&group, members.len() as u64);
    out["members"] = json!(members
        .iter()
        .map(|m| json!({
            "user_id": m.id,
            "name": m.name,
            "picture": m.picture,
            "weekly_xp": m.weekly_xp,
            "streak": m.streak,
        }))
        .collect::<Vec<_>>());
    Ok(Json(out))
}

pub async fn join_group(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let group = ctx.storage.get_group(&id).await?.ok_or(ApiError::NotFound("Group"))?;
    match user.group_id.as_deref() {
        Some(current) if current == group.id => {
            return Err(ApiError::Conflict("Already a member of this group".into()));
        }
        Some(_) => {
            return Err(ApiError::Conflict("Leave your current group first".into()));
        }
        None => {}
    }

    ctx.storage.set_user_group(&user.id, Some(&group.id)).await?;
    let members = ctx.storage.count_group_members(&group.id).await?;
    Ok(Json(group_json(&group, members)))
}

pub async fn leave_group(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let group = ctx.storage.get_group(&id).await?.ok_or(ApiError::NotFound("Group"))?;
    if user.group_id.as_deref() != Some(group.id.as_str()) {
        return Err(ApiError::BadRequest("Not a member of this group".into()));
    }

    ctx.storage.set_user_group(&user.id, None).await?;

    let remaining = ctx.storage.list_group_members(&group.id).await?;
    if remaining.is_empty() {
        ctx.storage.delete_group(&group.id).await?;
    } else if group.owner_id == user.id {
        // Members come back in insertion order, so the first one is the
        // longest-standing.
        ctx.storage.set_group_owner(&group.id, &remaining[0].id).await?;
    }

    Ok(Json(json!({ "message": "Left group" })))
}

pub async fn my_group(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let Some(group_id) = user.group_id.as_deref() else {
        return Ok(Json(json!({ "group": null })));
    };
    let Some(group) = ctx.storage.get_group(group_id).await? else {
        return Ok(Json(json!({ "group": null })));
    };
    let members = ctx.storage.count_group_members(&group.id).await?;
    Ok(Json(json!({ "group": group_json(&group, members) })))
}
