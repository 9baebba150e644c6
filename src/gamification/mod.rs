// gamification/mod.rs — XP accounting, periodic rollovers, streaks.
//
// Awards fire exactly on the transition into completed (tasks, pomodoro
// sessions, goals) and never on other edits. Task and goal awards are
// first-completion-only, tracked by an `xp_awarded` flag, so flapping a
// status away and back replays nothing. Weekly/monthly counters reset
// lazily: callers invoke `check_and_reset_periodic_xp` before any read
// that reports them.

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use tracing::debug;

use crate::storage::{Storage, UserRow};

/// Multiplier applied to awards earned while the user belongs to a group.
pub const GROUP_BONUS: f64 = 1.2;

/// XP for completing a pomodoro focus session.
pub const POMODORO_XP: i64 = 25;

/// Default XP for completing a goal without an explicit reward.
pub const DEFAULT_GOAL_XP: i64 = 50;

/// Streak walk never looks further back than this.
const STREAK_LOOKBACK_DAYS: i64 = 365;

/// Per-priority XP for completing a task. Unknown strings get the
/// medium award rather than failing the completion.
pub fn task_xp(priority: &str) -> i64 {
    match priority {
        "low" => 10,
        "high" => 30,
        "urgent" => 50,
        _ => 20,
    }
}

// ─── Periods ──────────────────────────────────────────────────────────────────

/// Canonical start-of-week (Monday, UTC) and start-of-month for an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentPeriod {
    pub week_start: NaiveDate,
    pub month_start: NaiveDate,
}

impl CurrentPeriod {
    /// Marker stored on the user row for the weekly counter, e.g. "2026-08-24".
    pub fn week_marker(&self) -> String {
        self.week_start.format("%Y-%m-%d").to_string()
    }

    /// Marker for the monthly counter, e.g. "2026-08".
    pub fn month_marker(&self) -> String {
        self.month_start.format("%Y-%m").to_string()
    }
}

/// Pure period resolution — no storage access, no side effects.
pub fn resolve_current_period(now: DateTime<Utc>) -> CurrentPeriod {
    let today = now.date_naive();
    let week_start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let month_start = today.with_day(1).unwrap_or(today);
    CurrentPeriod {
        week_start,
        month_start,
    }
}

/// Zero the weekly/monthly counters whose stored marker no longer matches the
/// current period. Returns the row as it stands after any resets.
///
/// Must run before every XP-reporting read (login, profile, leaderboard) and
/// before awards, so counters always reflect the current window.
pub async fn check_and_reset_periodic_xp(storage: &Storage, user: &UserRow) -> Result<UserRow> {
    let period = resolve_current_period(Utc::now());
    let week_marker = period.week_marker();
    let month_marker = period.month_marker();

    let mut changed = false;
    if user.current_week != week_marker {
        storage.reset_weekly_xp(&user.id, &week_marker).await?;
        changed = true;
    }
    if user.current_month != month_marker {
        storage.reset_monthly_xp(&user.id, &month_marker).await?;
        changed = true;
    }

    if changed {
        debug!(user_id = %user.id, "periodic XP counters rolled over");
        storage
            .get_user(&user.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user vanished during period reset"))
    } else {
        Ok(user.clone())
    }
}

// ─── Awards ───────────────────────────────────────────────────────────────────

/// Award XP to a user, applying the group bonus when a group id is present,
/// mirroring the award onto the group's counters, and appending a ledger
/// entry. Returns the final awarded amount for client display.
pub async fn award_xp(
    storage: &Storage,
    user: &UserRow,
    base_amount: i64,
    reason: &str,
    group_id: Option<&str>,
) -> Result<i64> {
    // Roll the window first so the award lands in the current period.
    let user = check_and_reset_periodic_xp(storage, user).await?;

    let amount = match group_id {
        Some(_) => (base_amount as f64 * GROUP_BONUS).floor() as i64,
        None => base_amount,
    };

    storage.add_user_xp(&user.id, amount).await?;
    storage
        .insert_xp_event(&user.id, amount, reason, group_id)
        .await?;
    if let Some(gid) = group_id {
        // The group's week must roll here too, or an award landing between
        // the boundary and the next weekly board read gets zeroed by the
        // lazy reset.
        if let Some(group) = storage.get_group(gid).await? {
            let week_marker = resolve_current_period(Utc::now()).week_marker();
            if group.current_week != week_marker {
                storage.reset_group_weekly_xp(gid, &week_marker).await?;
            }
            storage.add_group_xp(gid, amount).await?;
        }
    }

    debug!(user_id = %user.id, amount, reason, "XP awarded");
    Ok(amount)
}

// ─── Streaks ──────────────────────────────────────────────────────────────────

/// Consecutive calendar days (UTC) with at least one completed task or
/// completed pomodoro session, walking backward from `today` with a
/// 365-day bound. An empty `today` does not break the chain — the streak
/// then starts at the most recent active day. The result is persisted.
pub async fn calculate_streak(storage: &Storage, user_id: &str, today: NaiveDate) -> Result<i64> {
    let mut streak: i64 = 0;
    for offset in 0..=STREAK_LOOKBACK_DAYS {
        let day = today - Duration::days(offset);
        let (start, end) = day_bounds(day);
        let active = storage
            .count_tasks_completed_between(user_id, &start, &end)
            .await?
            > 0
            || storage
                .count_completed_pomodoros_between(user_id, &start, &end)
                .await?
                > 0;
        if active {
            streak += 1;
        } else if offset == 0 {
            // Today being quiet so far is not a broken chain.
            continue;
        } else {
            break;
        }
    }

    storage.set_user_streak(user_id, streak).await?;
    Ok(streak)
}

/// RFC 3339 bounds `[midnight, next midnight)` for a UTC calendar day.
pub fn day_bounds(day: NaiveDate) -> (String, String) {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    let end = (day + Duration::days(1)).and_time(NaiveTime::MIN).and_utc();
    (start.to_rfc3339(), end.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn period_resolves_to_monday_and_first() {
        // 2026-08-29 is a Saturday.
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 15, 30, 0).unwrap();
        let period = resolve_current_period(now);
        assert_eq!(period.week_marker(), "2026-08-24");
        assert_eq!(period.month_marker(), "2026-08");
    }

    #[test]
    fn period_on_a_monday_is_that_monday() {
        let now = Utc.with_ymd_and_hms(2026, 8, 24, 0, 0, 1).unwrap();
        let period = resolve_current_period(now);
        assert_eq!(period.week_marker(), "2026-08-24");
    }

    #[test]
    fn task_xp_table() {
        assert_eq!(task_xp("low"), 10);
        assert_eq!(task_xp("medium"), 20);
        assert_eq!(task_xp("high"), 30);
        assert_eq!(task_xp("urgent"), 50);
        assert_eq!(task_xp("nonsense"), 20);
    }

    #[test]
    fn day_bounds_cover_the_day() {
        let day = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();
        let (start, end) = day_bounds(day);
        let inside = Utc.with_ymd_and_hms(2026, 8, 29, 23, 59, 59).unwrap().to_rfc3339();
        assert!(start.as_str() <= inside.as_str());
        assert!(inside.as_str() < end.as_str());
    }
}
