// leaderboard/mod.rs — XP ranking over users and groups.
//
// Users are fetched in insertion order and stable-sorted on the selected XP
// window, so ties keep insertion order without an explicit tiebreak field.
// Display stats (focus minutes, completed tasks) are joined per entry over
// the same window.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

use crate::gamification::{self, day_bounds, resolve_current_period};
use crate::storage::{GroupRow, Storage, UserRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Weekly,
    Monthly,
    AllTime,
}

impl Period {
    /// Unknown strings fall back to weekly, the dashboard default.
    pub fn parse(s: &str) -> Self {
        match s {
            "monthly" => Self::Monthly,
            "alltime" => Self::AllTime,
            _ => Self::Weekly,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::AllTime => "alltime",
        }
    }

    fn user_xp(self, user: &UserRow) -> i64 {
        match self {
            Self::Weekly => user.weekly_xp,
            Self::Monthly => user.monthly_xp,
            Self::AllTime => user.total_xp,
        }
    }

    fn group_xp(self, group: &GroupRow) -> i64 {
        match self {
            Self::Weekly => group.weekly_xp,
            // Groups only keep weekly and lifetime counters.
            Self::Monthly | Self::AllTime => group.total_xp,
        }
    }

    /// RFC 3339 lower bound of the window; empty string means "everything".
    fn window_start(self) -> String {
        let period = resolve_current_period(Utc::now());
        match self {
            Self::Weekly => day_bounds(period.week_start).0,
            Self::Monthly => day_bounds(period.month_start).0,
            Self::AllTime => String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u64,
    pub user_id: String,
    pub name: String,
    pub picture: Option<String>,
    pub xp: i64,
    pub streak: i64,
    pub focus_minutes: i64,
    pub tasks_completed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupLeaderboardEntry {
    pub rank: u64,
    pub group_id: String,
    pub name: String,
    pub xp: i64,
    pub member_count: u64,
}

/// Top-`limit` users by the period's XP field, plus the requester's rank
/// (computed separately when they fall outside the page).
pub async fn user_leaderboard(
    storage: &Storage,
    period: Period,
    limit: usize,
    requester_id: &str,
) -> Result<(Vec<LeaderboardEntry>, u64)> {
    let mut users = Vec::new();
    for user in storage.list_users_by_insertion().await? {
        // Lazy rollover before reporting any weekly/monthly number.
        users.push(gamification::check_and_reset_periodic_xp(storage, &user).await?);
    }

    // Stable sort: XP ties keep insertion order.
    users.sort_by(|a, b| period.user_xp(b).cmp(&period.user_xp(a)));

    let requester_xp = users
        .iter()
        .find(|u| u.id == requester_id)
        .map(|u| period.user_xp(u))
        .unwrap_or(0);
    let requester_rank = users
        .iter()
        .filter(|u| period.user_xp(u) > requester_xp)
        .count() as u64
        + 1;

    let window_start = period.window_start();
    let mut entries = Vec::with_capacity(limit.min(users.len()));
    for (i, user) in users.iter().take(limit).enumerate() {
        let focus_minutes = storage
            .sum_focus_minutes_since(&user.id, &window_start)
            .await?;
        let tasks_completed = storage
            .count_tasks_completed_since(&user.id, &window_start)
            .await?;
        entries.push(LeaderboardEntry {
            rank: i as u64 + 1,
            user_id: user.id.clone(),
            name: user.name.clone(),
            picture: user.picture.clone(),
            xp: period.user_xp(user),
            streak: user.streak,
            focus_minutes,
            tasks_completed,
        });
    }

    Ok((entries, requester_rank))
}

/// Top-`limit` groups by weekly or lifetime XP with member counts.
pub async fn group_leaderboard(
    storage: &Storage,
    period: Period,
    limit: usize,
) -> Result<Vec<GroupLeaderboardEntry>> {
    let current_week = resolve_current_period(Utc::now()).week_marker();

    let mut groups = Vec::new();
    for group in storage.list_groups_by_insertion().await? {
        if period == Period::Weekly && group.current_week != current_week {
            storage.reset_group_weekly_xp(&group.id, &current_week).await?;
            if let Some(fresh) = storage.get_group(&group.id).await? {
                groups.push(fresh);
            }
        } else {
            groups.push(group);
        }
    }

    groups.sort_by(|a, b| period.group_xp(b).cmp(&period.group_xp(a)));

    let mut entries = Vec::with_capacity(limit.min(groups.len()));
    for (i, group) in groups.iter().take(limit).enumerate() {
        let member_count = storage.count_group_members(&group.id).await?;
        entries.push(GroupLeaderboardEntry {
            rank: i as u64 + 1,
            group_id: group.id.clone(),
            name: group.name.clone(),
            xp: period.group_xp(group),
            member_count,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_parse_defaults_to_weekly() {
        assert_eq!(Period::parse("weekly"), Period::Weekly);
        assert_eq!(Period::parse("monthly"), Period::Monthly);
        assert_eq!(Period::parse("alltime"), Period::AllTime);
        assert_eq!(Period::parse("anything-else"), Period::Weekly);
    }
}
