// rest/routes/leaderboard.rs — ranking read endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::leaderboard::{self, Period};
use crate::AppContext;

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default = "default_period")]
    pub period: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_period() -> String {
    "weekly".to_string()
}
fn default_limit() -> usize {
    10
}

pub async fn users(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(user): AuthUser,
    Query(q): Query<LeaderboardQuery>,
) -> Result<Json<Value>, ApiError> {
    let period = Period::parse(&q.period);
    let (entries, my_rank) =
        leaderboard::user_leaderboard(&ctx.storage, period, q.limit, &user.id).await?;
    Ok(Json(json!({
        "period": period.as_str(),
        "leaderboard": entries,
        "my_rank": my_rank,
    })))
}

pub async fn groups(
    State(ctx): State<Arc<AppContext>>,
    AuthUser(_user): AuthUser,
    Query(q): Query<LeaderboardQuery>,
) -> Result<Json<Value>, ApiError> {
    let period = Period::parse(&q.period);
    let entries = leaderboard::group_leaderboard(&ctx.storage, period, q.limit).await?;
    Ok(Json(json!({
        "period": period.as_str(),
        "leaderboard": entries,
    })))
}
