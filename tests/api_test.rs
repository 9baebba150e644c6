//! End-to-end REST tests: real server on a random port, real SQLite file,
//! requests through reqwest. The AI key is never configured here, so the
//! planner always exercises the deterministic fallback.

use serde_json::{json, Value};
use std::sync::Arc;
use studyd::{config::AppConfig, rest, storage::Storage, AppContext};
use tempfile::TempDir;

struct TestApp {
    base: String,
    client: reqwest::Client,
    _dir: TempDir,
}

impl TestApp {
    async fn spawn() -> Self {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::new(
            Some(0),
            Some(dir.path().to_path_buf()),
            Some("error".to_string()),
            None,
        );
        let storage = Storage::new(dir.path()).await.unwrap();
        let ctx = Arc::new(AppContext::new(Arc::new(config), Arc::new(storage)));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = rest::build_router(ctx);
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            _dir: dir,
        }
    }

    async fn register(&self, email: &str) -> String {
        let resp = self
            .client
            .post(format!("{}/api/auth/register", self.base))
            .json(&json!({ "email": email, "name": "Tester", "password": "hunter2!" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn put(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(format!("{}{path}", self.base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.base))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn health_needs_no_auth() {
    let app = TestApp::spawn().await;
    let resp = app
        .client
        .get(format!("{}/api/health", app.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn register_login_me_round_trip() {
    let app = TestApp::spawn().await;
    let token = app.register("alice@example.com").await;

    // Duplicate email is a conflict.
    let dup = app
        .client
        .post(format!("{}/api/auth/register", app.base))
        .json(&json!({ "email": "alice@example.com", "name": "Alice", "password": "pw" }))
        .send()
        .await
        .unwrap();
    assert_eq!(dup.status(), 409);

    let login = app
        .client
        .post(format!("{}/api/auth/login", app.base))
        .json(&json!({ "email": "alice@example.com", "password": "hunter2!" }))
        .send()
        .await
        .unwrap();
    assert_eq!(login.status(), 200);

    let bad = app
        .client
        .post(format!("{}/api/auth/login", app.base))
        .json(&json!({ "email": "alice@example.com", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 400);

    let me = app.get(&token, "/api/auth/me").await;
    assert_eq!(me.status(), 200);
    let body: Value = me.json().await.unwrap();
    assert_eq!(body["email"], "alice@example.com");

    let anon = app.client.get(format!("{}/api/auth/me", app.base)).send().await.unwrap();
    assert_eq!(anon.status(), 401);
}

#[tokio::test]
async fn task_completion_awards_xp_exactly_once() {
    let app = TestApp::spawn().await;
    let token = app.register("bob@example.com").await;

    let created: Value = app
        .post(&token, "/api/tasks", json!({ "title": "Read chapter 4", "priority": "high" }))
        .await
        .json()
        .await
        .unwrap();
    let task_id = created["task_id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "pending");

    // Empty update is rejected.
    let empty = app.put(&token, &format!("/api/tasks/{task_id}"), json!({})).await;
    assert_eq!(empty.status(), 400);

    let done: Value = app
        .put(&token, &format!("/api/tasks/{task_id}"), json!({ "status": "completed" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(done["status"], "completed");
    assert!(done["completed_at"].is_string());
    assert_eq!(done["awarded_xp"], 30);

    // Flap away and back: no second award.
    app.put(&token, &format!("/api/tasks/{task_id}"), json!({ "status": "pending" }))
        .await;
    let again: Value = app
        .put(&token, &format!("/api/tasks/{task_id}"), json!({ "status": "completed" }))
        .await
        .json()
        .await
        .unwrap();
    assert!(again.get("awarded_xp").is_none());

    let me: Value = app.get(&token, "/api/auth/me").await.json().await.unwrap();
    assert_eq!(me["total_xp"], 30);
    assert_eq!(me["streak"], 1);
}

#[tokio::test]
async fn foreign_tasks_look_missing() {
    let app = TestApp::spawn().await;
    let owner = app.register("owner@example.com").await;
    let other = app.register("other@example.com").await;

    let created: Value = app
        .post(&owner, "/api/tasks", json!({ "title": "Private notes" }))
        .await
        .json()
        .await
        .unwrap();
    let task_id = created["task_id"].as_str().unwrap();

    let stolen = app.get(&other, &format!("/api/tasks/{task_id}")).await;
    assert_eq!(stolen.status(), 404);

    let deleted = app
        .client
        .delete(format!("{}/api/tasks/{task_id}", app.base))
        .bearer_auth(&other)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 404);
}

#[tokio::test]
async fn date_only_due_dates_last_until_end_of_day() {
    let app = TestApp::spawn().await;
    let token = app.register("due@example.com").await;
    let today = chrono::Utc::now().date_naive();

    // Due today (bare date, no time): still on schedule.
    let current: Value = app
        .post(
            &token,
            "/api/tasks",
            json!({ "title": "Lab writeup", "due_date": today.to_string() }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(current["is_overdue"], false);

    // Due yesterday: overdue.
    let late: Value = app
        .post(
            &token,
            "/api/tasks",
            json!({
                "title": "Problem set",
                "due_date": (today - chrono::Duration::days(1)).to_string(),
            }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(late["is_overdue"], true);

    // The burnout overdue count agrees with the per-task flag.
    let body: Value = app
        .post(&token, "/api/ai/burnout-check", json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["stats"]["overdue_tasks"], 1);
}

#[tokio::test]
async fn pomodoro_completion_is_idempotent() {
    let app = TestApp::spawn().await;
    let token = app.register("pomo@example.com").await;

    let started: Value = app
        .post(&token, "/api/pomodoro/start", json!({ "focus_minutes": 25, "break_minutes": 5 }))
        .await
        .json()
        .await
        .unwrap();
    let id = started["session_id"].as_str().unwrap().to_string();
    assert_eq!(started["completed"], false);

    let first: Value = app
        .post(&token, &format!("/api/pomodoro/{id}/complete"), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(first["completed"], true);
    assert_eq!(first["awarded_xp"], 25);
    let completed_at = first["completed_at"].as_str().unwrap().to_string();

    let second: Value = app
        .post(&token, &format!("/api/pomodoro/{id}/complete"), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(second["completed"], true);
    assert!(second.get("awarded_xp").is_none());
    assert_eq!(second["completed_at"], completed_at.as_str());

    let me: Value = app.get(&token, "/api/auth/me").await.json().await.unwrap();
    assert_eq!(me["total_xp"], 25);

    let stats: Value = app.get(&token, "/api/pomodoro/stats").await.json().await.unwrap();
    assert_eq!(stats["today_sessions"], 1);
    assert_eq!(stats["total_focus_time_minutes"], 25);
}

#[tokio::test]
async fn goal_progress_follows_subtasks() {
    let app = TestApp::spawn().await;
    let token = app.register("goal@example.com").await;

    let created: Value = app
        .post(&token, "/api/goals", json!({ "title": "Finish thesis outline" }))
        .await
        .json()
        .await
        .unwrap();
    let goal_id = created["goal_id"].as_str().unwrap().to_string();
    assert_eq!(created["progress"], 0.0);
    assert_eq!(created["xp_reward"], 50);

    let updated: Value = app
        .put(
            &token,
            &format!("/api/goals/{goal_id}"),
            json!({ "subtasks": [
                { "title": "Intro", "completed": true },
                { "title": "Methods", "completed": true },
                { "title": "Results", "completed": false },
                { "title": "Discussion", "completed": false },
            ]}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(updated["progress"], 50.0);

    let completed: Value = app
        .put(&token, &format!("/api/goals/{goal_id}"), json!({ "completed": true }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(completed["awarded_xp"], 50);

    let me: Value = app.get(&token, "/api/auth/me").await.json().await.unwrap();
    assert_eq!(me["total_xp"], 50);
}

#[tokio::test]
async fn planner_generates_and_edits_a_day() {
    let app = TestApp::spawn().await;
    let token = app.register("plan@example.com").await;

    app.post(&token, "/api/tasks", json!({ "title": "Calculus set", "priority": "high" }))
        .await;
    app.post(&token, "/api/tasks", json!({ "title": "History essay", "priority": "low" }))
        .await;

    let schedule: Value = app
        .post(
            &token,
            "/api/planner/generate",
            json!({
                "date": "2026-09-01",
                "start_time": "09:00",
                "end_time": "11:00",
                "work_minutes": 50,
                "break_minutes": 10,
            }),
        )
        .await
        .json()
        .await
        .unwrap();

    let blocks = schedule["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0]["kind"], "work");
    assert_eq!(blocks[0]["start_time"], "09:00");
    assert_eq!(blocks[0]["end_time"], "09:50");
    // High priority wins the first slot.
    assert_eq!(blocks[0]["title"], "Calculus set");
    assert_eq!(blocks[1]["kind"], "break");
    assert_eq!(blocks[2]["kind"], "work");
    assert_eq!(blocks[2]["end_time"], "10:50");

    let fetched: Value = app
        .get(&token, "/api/planner/schedule/2026-09-01")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["blocks"].as_array().unwrap().len(), 3);

    let block_id = blocks[1]["block_id"].as_str().unwrap();
    let edited = app
        .put(
            &token,
            &format!("/api/planner/schedule/2026-09-01/block/{block_id}"),
            json!({ "title": "Coffee" }),
        )
        .await;
    assert_eq!(edited.status(), 200);

    let missing = app.get(&token, "/api/planner/schedule/2026-09-02").await;
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn planner_rejects_bad_windows_without_masking_other_failures() {
    let app = TestApp::spawn().await;
    let token = app.register("window@example.com").await;

    let garbled = app
        .post(
            &token,
            "/api/planner/generate",
            json!({ "date": "2026-09-01", "start_time": "9am" }),
        )
        .await;
    assert_eq!(garbled.status(), 400);

    let inverted = app
        .post(
            &token,
            "/api/planner/generate",
            json!({ "date": "2026-09-01", "start_time": "17:00", "end_time": "09:00" }),
        )
        .await;
    assert_eq!(inverted.status(), 400);

    // A well-formed window generates fine even with no tasks.
    let empty = app
        .post(&token, "/api/planner/generate", json!({ "date": "2026-09-01" }))
        .await;
    assert_eq!(empty.status(), 200);
}

#[tokio::test]
async fn groups_join_leave_lifecycle() {
    let app = TestApp::spawn().await;
    let founder = app.register("founder@example.com").await;
    let joiner = app.register("joiner@example.com").await;

    let group: Value = app
        .post(&founder, "/api/groups", json!({ "name": "Exam crunch", "is_public": true }))
        .await
        .json()
        .await
        .unwrap();
    let group_id = group["group_id"].as_str().unwrap().to_string();
    assert_eq!(group["member_count"], 1);

    let joined: Value = app
        .post(&joiner, &format!("/api/groups/{group_id}/join"), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(joined["member_count"], 2);

    // Founder leaves; ownership passes to the remaining member.
    app.post(&founder, &format!("/api/groups/{group_id}/leave"), json!({}))
        .await;
    let after: Value = app
        .get(&joiner, &format!("/api/groups/{group_id}"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(after["member_count"], 1);
    assert_eq!(after["owner_id"], after["members"][0]["user_id"]);

    // Last member out dissolves the group.
    app.post(&joiner, &format!("/api/groups/{group_id}/leave"), json!({}))
        .await;
    let gone = app.get(&joiner, &format!("/api/groups/{group_id}")).await;
    assert_eq!(gone.status(), 404);
}

#[tokio::test]
async fn analytics_overview_tracks_completions() {
    let app = TestApp::spawn().await;
    let token = app.register("stats@example.com").await;

    let t: Value = app
        .post(&token, "/api/tasks", json!({ "title": "One" }))
        .await
        .json()
        .await
        .unwrap();
    app.post(&token, "/api/tasks", json!({ "title": "Two" })).await;
    app.put(
        &token,
        &format!("/api/tasks/{}", t["task_id"].as_str().unwrap()),
        json!({ "status": "completed" }),
    )
    .await;

    let overview: Value = app
        .get(&token, "/api/analytics/overview")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(overview["tasks"]["total"], 2);
    assert_eq!(overview["tasks"]["completed"], 1);
    assert_eq!(overview["tasks"]["completion_rate"], 50.0);

    let daily: Value = app
        .get(&token, "/api/analytics/daily-stats?days=3")
        .await
        .json()
        .await
        .unwrap();
    let days = daily.as_array().unwrap();
    assert_eq!(days.len(), 3);
    // Oldest first; today is the last entry.
    assert_eq!(days[2]["tasks_completed"], 1);
}

#[tokio::test]
async fn burnout_check_reports_low_risk_for_light_load() {
    let app = TestApp::spawn().await;
    let token = app.register("calm@example.com").await;

    let body: Value = app
        .post(&token, "/api/ai/burnout-check", json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["risk_level"], "low");
    assert_eq!(body["warnings"][0], "Looking good! Your workload appears balanced.");
}

#[tokio::test]
async fn leaderboard_ranks_registered_users() {
    let app = TestApp::spawn().await;
    let token = app.register("ranked@example.com").await;

    let t: Value = app
        .post(&token, "/api/tasks", json!({ "title": "Win", "priority": "urgent" }))
        .await
        .json()
        .await
        .unwrap();
    app.put(
        &token,
        &format!("/api/tasks/{}", t["task_id"].as_str().unwrap()),
        json!({ "status": "completed" }),
    )
    .await;

    let board: Value = app
        .get(&token, "/api/leaderboard?period=weekly&limit=5")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(board["my_rank"], 1);
    assert_eq!(board["leaderboard"][0]["xp"], 50);
    assert_eq!(board["leaderboard"][0]["tasks_completed"], 1);
}
