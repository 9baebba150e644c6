use anyhow::{Context as _, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};
use uuid::Uuid;

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the daemon indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
/// Returns an error if the operation takes longer than `QUERY_TIMEOUT`.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

/// Generate a prefixed short id, e.g. `task_9f8e7d6c5b4a`.
pub fn new_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().to_string().replace('-', "");
    format!("{prefix}_{}", &hex[..12])
}

/// Due dates come in as either RFC 3339 timestamps or bare `YYYY-MM-DD`
/// dates. A bare date means "by the end of that day", so stretch it to
/// 23:59:59 before comparing against a timestamp; a plain string compare
/// would otherwise flag it overdue from midnight.
pub fn due_date_deadline(due: &str) -> String {
    if due.len() == 10 {
        format!("{due}T23:59:59+00:00")
    } else {
        due.to_string()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    /// NULL for accounts created through the OAuth session flow.
    pub password_hash: Option<String>,
    pub picture: Option<String>,
    pub total_xp: i64,
    pub weekly_xp: i64,
    pub monthly_xp: i64,
    /// ISO date of the Monday the weekly counter was last reset to.
    pub current_week: String,
    /// `YYYY-MM` the monthly counter was last reset to.
    pub current_month: String,
    pub streak: i64,
    pub group_id: Option<String>,
    /// JSON array of badge names.
    pub badges: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthSessionRow {
    pub session_token: String,
    pub user_id: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub priority: String,
    pub status: String,
    pub due_date: Option<String>,
    pub estimated_minutes: Option<i64>,
    /// JSON array of task ids this task depends on.
    pub depends_on: String,
    pub scheduled_time: Option<String>,
    pub completed_at: Option<String>,
    /// Set on the first-ever transition to completed. XP is never awarded
    /// again for this task, even if status flaps away and back.
    pub xp_awarded: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PomodoroRow {
    pub id: String,
    pub user_id: String,
    pub task_id: Option<String>,
    pub focus_minutes: i64,
    pub break_minutes: i64,
    pub completed: bool,
    pub started_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GoalRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    /// JSON array of task ids whose completion drives progress.
    pub target_tasks: String,
    /// JSON array of `{ "title": …, "completed": … }` objects.
    pub subtasks: String,
    pub week_start: String,
    /// Derived 0–100; recomputed on each read, the stored value is a cache.
    pub progress: f64,
    pub completed: bool,
    pub xp_awarded: bool,
    pub streak: i64,
    pub xp_reward: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GroupRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub is_public: bool,
    pub total_xp: i64,
    pub weekly_xp: i64,
    pub current_week: String,
    pub created_at: String,
}

/// Immutable gamification ledger entry.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct XpEventRow {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    pub reason: String,
    pub group_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduleRow {
    pub id: String,
    pub user_id: String,
    pub date: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BlockRow {
    pub id: String,
    pub schedule_id: String,
    /// "HH:MM", 24-hour.
    pub start_time: String,
    pub end_time: String,
    pub title: String,
    /// work | break | locked
    pub kind: String,
    pub task_id: Option<String>,
    /// Locked blocks come from the external calendar and are immutable
    /// through the block-edit endpoints.
    pub locked: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CalendarAccountRow {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<String>,
    pub connected_at: String,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding it
    /// are logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("studyd.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            use sqlx::ConnectOptions as _;
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("src/storage/migrations")
            .run(pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    // ─── Users ──────────────────────────────────────────────────────────────

    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        password_hash: Option<&str>,
        picture: Option<&str>,
    ) -> Result<UserRow> {
        let id = new_id("user");
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (id, email, name, password_hash, picture, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .bind(picture)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_user(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user not found after insert"))
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn update_user_profile(
        &self,
        id: &str,
        name: &str,
        picture: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE users SET name = ?, picture = ? WHERE id = ?")
            .bind(name)
            .bind(picture)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_user_group(&self, id: &str, group_id: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE users SET group_id = ? WHERE id = ?")
            .bind(group_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Unconditional counter increments — commutative, so concurrent awards
    /// are safe without any locking.
    pub async fn add_user_xp(&self, id: &str, amount: i64) -> Result<()> {
        sqlx::query(
            "UPDATE users SET total_xp = total_xp + ?, weekly_xp = weekly_xp + ?, \
             monthly_xp = monthly_xp + ? WHERE id = ?",
        )
        .bind(amount)
        .bind(amount)
        .bind(amount)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn reset_weekly_xp(&self, id: &str, week_marker: &str) -> Result<()> {
        sqlx::query("UPDATE users SET weekly_xp = 0, current_week = ? WHERE id = ?")
            .bind(week_marker)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn reset_monthly_xp(&self, id: &str, month_marker: &str) -> Result<()> {
        sqlx::query("UPDATE users SET monthly_xp = 0, current_month = ? WHERE id = ?")
            .bind(month_marker)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_user_streak(&self, id: &str, streak: i64) -> Result<()> {
        sqlx::query("UPDATE users SET streak = ? WHERE id = ?")
            .bind(streak)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All users in insertion order. The leaderboard aggregator stable-sorts
    /// these in memory so XP ties keep insertion order.
    pub async fn list_users_by_insertion(&self) -> Result<Vec<UserRow>> {
        with_timeout(async {
            Ok(sqlx::query_as("SELECT * FROM users ORDER BY created_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await?)
        })
        .await
    }

    pub async fn list_group_members(&self, group_id: &str) -> Result<Vec<UserRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM users WHERE group_id = ? ORDER BY created_at ASC")
                .bind(group_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn count_group_members(&self, group_id: &str) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE group_id = ?")
            .bind(group_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    // ─── Auth sessions (OAuth cookie flow) ──────────────────────────────────

    pub async fn create_auth_session(
        &self,
        user_id: &str,
        session_token: &str,
        expires_at: &str,
    ) -> Result<()> {
        // One active cookie session per user.
        sqlx::query("DELETE FROM auth_sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO auth_sessions (session_token, user_id, expires_at, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(session_token)
        .bind(user_id)
        .bind(expires_at)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_auth_session(&self, session_token: &str) -> Result<Option<AuthSessionRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM auth_sessions WHERE session_token = ?")
                .bind(session_token)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn delete_auth_session(&self, session_token: &str) -> Result<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE session_token = ?")
            .bind(session_token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ─── Tasks ──────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn create_task(
        &self,
        user_id: &str,
        title: &str,
        description: &str,
        subject: &str,
        priority: &str,
        due_date: Option<&str>,
        estimated_minutes: Option<i64>,
        depends_on: &str,
        scheduled_time: Option<&str>,
    ) -> Result<TaskRow> {
        let id = new_id("task");
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO tasks (id, user_id, title, description, subject, priority, status, \
             due_date, estimated_minutes, depends_on, scheduled_time, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(title)
        .bind(description)
        .bind(subject)
        .bind(priority)
        .bind(due_date)
        .bind(estimated_minutes)
        .bind(depends_on)
        .bind(scheduled_time)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_task(&id, user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("task not found after insert"))
    }

    /// Scoped to the owner — a foreign id behaves exactly like a missing one.
    pub async fn get_task(&self, id: &str, user_id: &str) -> Result<Option<TaskRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM tasks WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list_tasks(
        &self,
        user_id: &str,
        status: Option<&str>,
        priority: Option<&str>,
        subject: Option<&str>,
    ) -> Result<Vec<TaskRow>> {
        let mut sql = String::from("SELECT * FROM tasks WHERE user_id = ?");
        if status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if priority.is_some() {
            sql.push_str(" AND priority = ?");
        }
        if subject.is_some() {
            sql.push_str(" AND subject = ?");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut query = sqlx::query_as(&sql).bind(user_id);
        if let Some(s) = status {
            query = query.bind(s);
        }
        if let Some(p) = priority {
            query = query.bind(p);
        }
        if let Some(s) = subject {
            query = query.bind(s);
        }
        with_timeout(async { Ok(query.fetch_all(&self.pool).await?) }).await
    }

    /// Write back every client-mutable column of a task row.
    pub async fn update_task(&self, task: &TaskRow) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET title = ?, description = ?, subject = ?, priority = ?, \
             status = ?, due_date = ?, estimated_minutes = ?, depends_on = ?, \
             scheduled_time = ?, completed_at = ?, xp_awarded = ? \
             WHERE id = ? AND user_id = ?",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.subject)
        .bind(&task.priority)
        .bind(&task.status)
        .bind(&task.due_date)
        .bind(task.estimated_minutes)
        .bind(&task.depends_on)
        .bind(&task.scheduled_time)
        .bind(&task.completed_at)
        .bind(task.xp_awarded)
        .bind(&task.id)
        .bind(&task.user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_task(&self, id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_tasks(&self, user_id: &str) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    pub async fn count_completed_tasks(&self, user_id: &str) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks WHERE user_id = ? AND status = 'completed'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as u64)
    }

    pub async fn count_overdue_tasks(&self, user_id: &str, now: &str) -> Result<u64> {
        // Date-only due dates stretch to end of day; see `due_date_deadline`.
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks WHERE user_id = ? AND status != 'completed' \
             AND due_date IS NOT NULL \
             AND (CASE WHEN length(due_date) = 10 \
                       THEN due_date || 'T23:59:59+00:00' \
                       ELSE due_date END) < ?",
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as u64)
    }

    /// Tasks completed in `[start, end)` — streaks and daily stats.
    pub async fn count_tasks_completed_between(
        &self,
        user_id: &str,
        start: &str,
        end: &str,
    ) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks WHERE user_id = ? \
             AND completed_at IS NOT NULL AND completed_at >= ? AND completed_at < ?",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as u64)
    }

    pub async fn count_tasks_completed_since(&self, user_id: &str, start: &str) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks WHERE user_id = ? \
             AND completed_at IS NOT NULL AND completed_at >= ?",
        )
        .bind(user_id)
        .bind(start)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as u64)
    }

    /// How many of the given task ids are completed. Drives goal progress.
    pub async fn count_completed_in_list(&self, task_ids: &[String]) -> Result<u64> {
        if task_ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; task_ids.len()].join(", ");
        let sql = format!(
            "SELECT COUNT(*) FROM tasks WHERE status = 'completed' AND id IN ({placeholders})"
        );
        let mut query = sqlx::query_as(&sql);
        for id in task_ids {
            query = query.bind(id);
        }
        let row: (i64,) = query.fetch_one(&self.pool).await?;
        Ok(row.0 as u64)
    }

    // ─── Pomodoro sessions ──────────────────────────────────────────────────

    pub async fn create_pomodoro(
        &self,
        user_id: &str,
        task_id: Option<&str>,
        focus_minutes: i64,
        break_minutes: i64,
    ) -> Result<PomodoroRow> {
        let id = new_id("pomo");
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO pomodoro_sessions (id, user_id, task_id, focus_minutes, break_minutes, \
             completed, started_at) VALUES (?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(task_id)
        .bind(focus_minutes)
        .bind(break_minutes)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_pomodoro(&id, user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("pomodoro session not found after insert"))
    }

    pub async fn get_pomodoro(&self, id: &str, user_id: &str) -> Result<Option<PomodoroRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM pomodoro_sessions WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Conditional completion — only flips sessions that are still open.
    /// Returns `true` if this call performed the transition. A second call
    /// matches no rows, so `completed_at` never changes and the caller knows
    /// not to award XP again.
    pub async fn complete_pomodoro(&self, id: &str, user_id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE pomodoro_sessions SET completed = 1, completed_at = ? \
             WHERE id = ? AND user_id = ? AND completed = 0",
        )
        .bind(&now)
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_pomodoros_since(&self, user_id: &str, start: &str) -> Result<Vec<PomodoroRow>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM pomodoro_sessions WHERE user_id = ? AND started_at >= ? \
                 ORDER BY started_at DESC",
            )
            .bind(user_id)
            .bind(start)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    pub async fn count_completed_pomodoros_between(
        &self,
        user_id: &str,
        start: &str,
        end: &str,
    ) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM pomodoro_sessions WHERE user_id = ? AND completed = 1 \
             AND started_at >= ? AND started_at < ?",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as u64)
    }

    pub async fn count_completed_pomodoros_since(&self, user_id: &str, start: &str) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM pomodoro_sessions WHERE user_id = ? AND completed = 1 \
             AND started_at >= ?",
        )
        .bind(user_id)
        .bind(start)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as u64)
    }

    /// Focus minutes summed over completed sessions started at or after `start`.
    pub async fn sum_focus_minutes_since(&self, user_id: &str, start: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(focus_minutes), 0) FROM pomodoro_sessions \
             WHERE user_id = ? AND completed = 1 AND started_at >= ?",
        )
        .bind(user_id)
        .bind(start)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn sum_focus_minutes_between(
        &self,
        user_id: &str,
        start: &str,
        end: &str,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(focus_minutes), 0) FROM pomodoro_sessions \
             WHERE user_id = ? AND completed = 1 AND started_at >= ? AND started_at < ?",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    // ─── Goals ──────────────────────────────────────────────────────────────

    pub async fn create_goal(
        &self,
        user_id: &str,
        title: &str,
        description: &str,
        target_tasks: &str,
        week_start: &str,
        xp_reward: i64,
    ) -> Result<GoalRow> {
        let id = new_id("goal");
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO goals (id, user_id, title, description, target_tasks, week_start, \
             xp_reward, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(title)
        .bind(description)
        .bind(target_tasks)
        .bind(week_start)
        .bind(xp_reward)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_goal(&id, user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("goal not found after insert"))
    }

    pub async fn get_goal(&self, id: &str, user_id: &str) -> Result<Option<GoalRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM goals WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list_goals(&self, user_id: &str) -> Result<Vec<GoalRow>> {
        with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM goals WHERE user_id = ? ORDER BY created_at DESC")
                    .bind(user_id)
                    .fetch_all(&self.pool)
                    .await?,
            )
        })
        .await
    }

    pub async fn update_goal(&self, goal: &GoalRow) -> Result<()> {
        sqlx::query(
            "UPDATE goals SET title = ?, description = ?, target_tasks = ?, subtasks = ?, \
             progress = ?, completed = ?, xp_awarded = ?, streak = ?, xp_reward = ? \
             WHERE id = ? AND user_id = ?",
        )
        .bind(&goal.title)
        .bind(&goal.description)
        .bind(&goal.target_tasks)
        .bind(&goal.subtasks)
        .bind(goal.progress)
        .bind(goal.completed)
        .bind(goal.xp_awarded)
        .bind(goal.streak)
        .bind(goal.xp_reward)
        .bind(&goal.id)
        .bind(&goal.user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_goal(&self, id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM goals WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_goals(&self, user_id: &str, completed: bool) -> Result<u64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM goals WHERE user_id = ? AND completed = ?")
                .bind(user_id)
                .bind(completed)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0 as u64)
    }

    // ─── Study groups ───────────────────────────────────────────────────────

    pub async fn create_group(
        &self,
        name: &str,
        description: &str,
        owner_id: &str,
        is_public: bool,
    ) -> Result<GroupRow> {
        let id = new_id("group");
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO study_groups (id, name, description, owner_id, is_public, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(description)
        .bind(owner_id)
        .bind(is_public)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_group(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("group not found after insert"))
    }

    pub async fn get_group(&self, id: &str) -> Result<Option<GroupRow>> {
        Ok(sqlx::query_as("SELECT * FROM study_groups WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_public_groups(&self) -> Result<Vec<GroupRow>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM study_groups WHERE is_public = 1 ORDER BY created_at ASC",
            )
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    pub async fn list_groups_by_insertion(&self) -> Result<Vec<GroupRow>> {
        with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM study_groups ORDER BY created_at ASC, id ASC")
                    .fetch_all(&self.pool)
                    .await?,
            )
        })
        .await
    }

    pub async fn add_group_xp(&self, id: &str, amount: i64) -> Result<()> {
        sqlx::query(
            "UPDATE study_groups SET total_xp = total_xp + ?, weekly_xp = weekly_xp + ? \
             WHERE id = ?",
        )
        .bind(amount)
        .bind(amount)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn reset_group_weekly_xp(&self, id: &str, week_marker: &str) -> Result<()> {
        sqlx::query("UPDATE study_groups SET weekly_xp = 0, current_week = ? WHERE id = ?")
            .bind(week_marker)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_group_owner(&self, id: &str, owner_id: &str) -> Result<()> {
        sqlx::query("UPDATE study_groups SET owner_id = ? WHERE id = ?")
            .bind(owner_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_group(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM study_groups WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ─── XP ledger ──────────────────────────────────────────────────────────

    pub async fn insert_xp_event(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        group_id: Option<&str>,
    ) -> Result<()> {
        let id = new_id("xp");
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO xp_events (id, user_id, amount, reason, group_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(amount)
        .bind(reason)
        .bind(group_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_xp_events(&self, user_id: &str, limit: i64) -> Result<Vec<XpEventRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM xp_events WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    // ─── Day schedules ──────────────────────────────────────────────────────

    pub async fn get_schedule(&self, user_id: &str, date: &str) -> Result<Option<ScheduleRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM schedules WHERE user_id = ? AND date = ?")
                .bind(user_id)
                .bind(date)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list_blocks(&self, schedule_id: &str) -> Result<Vec<BlockRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM schedule_blocks WHERE schedule_id = ? ORDER BY start_time ASC",
        )
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Replace the day's schedule wholesale — upsert semantics, not append.
    pub async fn replace_schedule(
        &self,
        user_id: &str,
        date: &str,
        blocks: &[crate::planner::Block],
    ) -> Result<ScheduleRow> {
        if let Some(existing) = self.get_schedule(user_id, date).await? {
            sqlx::query("DELETE FROM schedule_blocks WHERE schedule_id = ?")
                .bind(&existing.id)
                .execute(&self.pool)
                .await?;
            sqlx::query("DELETE FROM schedules WHERE id = ?")
                .bind(&existing.id)
                .execute(&self.pool)
                .await?;
        }

        let schedule_id = new_id("sched");
        let now = Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO schedules (id, user_id, date, created_at) VALUES (?, ?, ?, ?)")
            .bind(&schedule_id)
            .bind(user_id)
            .bind(date)
            .bind(&now)
            .execute(&self.pool)
            .await?;

        for block in blocks {
            sqlx::query(
                "INSERT INTO schedule_blocks (id, schedule_id, start_time, end_time, title, \
                 kind, task_id, locked) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(new_id("block"))
            .bind(&schedule_id)
            .bind(&block.start_time)
            .bind(&block.end_time)
            .bind(&block.title)
            .bind(block.kind.as_str())
            .bind(&block.task_id)
            .bind(block.locked)
            .execute(&self.pool)
            .await?;
        }

        self.get_schedule(user_id, date)
            .await?
            .ok_or_else(|| anyhow::anyhow!("schedule not found after insert"))
    }

    pub async fn get_block(&self, schedule_id: &str, block_id: &str) -> Result<Option<BlockRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM schedule_blocks WHERE id = ? AND schedule_id = ?")
                .bind(block_id)
                .bind(schedule_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn update_block(
        &self,
        block_id: &str,
        start_time: &str,
        end_time: &str,
        title: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE schedule_blocks SET start_time = ?, end_time = ?, title = ? WHERE id = ?",
        )
        .bind(start_time)
        .bind(end_time)
        .bind(title)
        .bind(block_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_block(&self, block_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM schedule_blocks WHERE id = ?")
            .bind(block_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ─── Calendar accounts ──────────────────────────────────────────────────

    pub async fn upsert_calendar_account(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO calendar_accounts (user_id, access_token, refresh_token, expires_at, connected_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (user_id) DO UPDATE SET access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token, expires_at = excluded.expires_at",
        )
        .bind(user_id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_calendar_account(&self, user_id: &str) -> Result<Option<CalendarAccountRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM calendar_accounts WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn delete_calendar_account(&self, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM calendar_accounts WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
