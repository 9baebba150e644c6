// rest/mod.rs — public REST API server.
//
// Axum HTTP server, JSON bodies, `/api` prefix. All routes except
// /api/health and the auth entry points require an authenticated caller
// (bearer token or session cookie — see auth::AuthUser).

pub mod routes;

use anyhow::Result;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::AppContext;

pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/health", get(routes::health::health))
        // Auth
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/session", post(routes::auth::create_session))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/me", get(routes::auth::me))
        // Tasks
        .route(
            "/api/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/api/tasks/{id}",
            get(routes::tasks::get_task)
                .put(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        // Pomodoro
        .route("/api/pomodoro/start", post(routes::pomodoro::start))
        .route("/api/pomodoro/{id}/complete", post(routes::pomodoro::complete))
        .route("/api/pomodoro/sessions", get(routes::pomodoro::sessions))
        .route("/api/pomodoro/stats", get(routes::pomodoro::stats))
        // Goals
        .route(
            "/api/goals",
            get(routes::goals::list_goals).post(routes::goals::create_goal),
        )
        .route(
            "/api/goals/{id}",
            put(routes::goals::update_goal).delete(routes::goals::delete_goal),
        )
        .route("/api/goals/{id}/breakdown", post(routes::goals::breakdown))
        // Leaderboards
        .route("/api/leaderboard", get(routes::leaderboard::users))
        .route("/api/leaderboard/groups", get(routes::leaderboard::groups))
        // Study groups
        .route(
            "/api/groups",
            get(routes::groups::list_groups).post(routes::groups::create_group),
        )
        .route("/api/groups/my/current", get(routes::groups::my_group))
        .route("/api/groups/{id}", get(routes::groups::get_group))
        .route("/api/groups/{id}/join", post(routes::groups::join_group))
        .route("/api/groups/{id}/leave", post(routes::groups::leave_group))
        // Analytics
        .route("/api/analytics/overview", get(routes::analytics::overview))
        .route("/api/analytics/daily-stats", get(routes::analytics::daily_stats))
        // AI advisory
        .route("/api/ai/study-coach", post(routes::ai::study_coach))
        .route("/api/ai/break-down-task", post(routes::ai::break_down_task))
        .route("/api/ai/weekly-summary", post(routes::ai::weekly_summary))
        .route("/api/ai/burnout-check", post(routes::ai::burnout_check))
        // Day planner
        .route("/api/planner/generate", post(routes::planner::generate))
        .route("/api/planner/schedule/{date}", get(routes::planner::get_schedule))
        .route(
            "/api/planner/schedule/{date}/block/{block_id}",
            put(routes::planner::update_block).delete(routes::planner::delete_block),
        )
        // Calendar
        .route("/api/calendar/auth-url", get(routes::calendar::auth_url))
        .route("/api/calendar/callback", get(routes::calendar::callback))
        .route("/api/calendar/events", get(routes::calendar::events))
        .route("/api/calendar/status", get(routes::calendar::status))
        .route("/api/calendar/disconnect", delete(routes::calendar::disconnect))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
