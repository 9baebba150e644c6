//! Integration tests for XP awards, periodic resets, and streaks against a
//! real on-disk SQLite database.

use chrono::{Duration, Utc};
use studyd::gamification::{
    award_xp, calculate_streak, check_and_reset_periodic_xp, resolve_current_period,
};
use studyd::storage::Storage;
use tempfile::TempDir;

async fn make_storage() -> (Storage, TempDir) {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path()).await.unwrap();
    (storage, dir)
}

#[tokio::test]
async fn award_without_group_is_the_base_amount() {
    let (storage, _dir) = make_storage().await;
    let user = storage
        .create_user("solo@example.com", "Solo", None, None)
        .await
        .unwrap();

    let amount = award_xp(&storage, &user, 20, "task_completed", None)
        .await
        .unwrap();
    assert_eq!(amount, 20);

    let user = storage.get_user(&user.id).await.unwrap().unwrap();
    assert_eq!(user.total_xp, 20);
    assert_eq!(user.weekly_xp, 20);
    assert_eq!(user.monthly_xp, 20);

    let events = storage.list_xp_events(&user.id, 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].amount, 20);
    assert_eq!(events[0].reason, "task_completed");
}

#[tokio::test]
async fn group_membership_applies_floored_bonus() {
    let (storage, _dir) = make_storage().await;
    let user = storage
        .create_user("member@example.com", "Member", None, None)
        .await
        .unwrap();
    let group = storage
        .create_group("Night Owls", "", &user.id, true)
        .await
        .unwrap();
    storage.set_user_group(&user.id, Some(&group.id)).await.unwrap();

    // 25 × 1.2 = 30 exactly; 10 × 1.2 = 12.
    let amount = award_xp(&storage, &user, 25, "pomodoro_completed", Some(&group.id))
        .await
        .unwrap();
    assert_eq!(amount, 30);

    let group = storage.get_group(&group.id).await.unwrap().unwrap();
    assert_eq!(group.total_xp, 30);
    assert_eq!(group.weekly_xp, 30);
}

#[tokio::test]
async fn stale_week_marker_zeroes_weekly_xp_only() {
    let (storage, _dir) = make_storage().await;
    let user = storage
        .create_user("stale@example.com", "Stale", None, None)
        .await
        .unwrap();
    award_xp(&storage, &user, 50, "task_completed", None).await.unwrap();

    // Age the weekly marker; the monthly one stays current.
    sqlx::query("UPDATE users SET current_week = '2000-01-03' WHERE id = ?")
        .bind(&user.id)
        .execute(&storage.pool())
        .await
        .unwrap();

    let user = storage.get_user(&user.id).await.unwrap().unwrap();
    let fresh = check_and_reset_periodic_xp(&storage, &user).await.unwrap();

    assert_eq!(fresh.weekly_xp, 0);
    assert_eq!(fresh.monthly_xp, 50);
    assert_eq!(fresh.total_xp, 50);
    assert_eq!(fresh.current_week, resolve_current_period(Utc::now()).week_marker());
}

#[tokio::test]
async fn award_rolls_a_stale_group_week_before_crediting() {
    let (storage, _dir) = make_storage().await;
    let user = storage
        .create_user("grouped@example.com", "Grouped", None, None)
        .await
        .unwrap();
    let group = storage
        .create_group("Early Birds", "", &user.id, true)
        .await
        .unwrap();
    storage.set_user_group(&user.id, Some(&group.id)).await.unwrap();
    award_xp(&storage, &user, 25, "pomodoro_completed", Some(&group.id))
        .await
        .unwrap();

    // Age the group's weekly marker as if the week boundary passed with
    // no leaderboard reads in between.
    sqlx::query("UPDATE study_groups SET current_week = '2000-01-03' WHERE id = ?")
        .bind(&group.id)
        .execute(&storage.pool())
        .await
        .unwrap();

    let user = storage.get_user(&user.id).await.unwrap().unwrap();
    let amount = award_xp(&storage, &user, 25, "pomodoro_completed", Some(&group.id))
        .await
        .unwrap();
    assert_eq!(amount, 30);

    // The stale week is rolled first, so the fresh week holds exactly
    // this award instead of zero.
    let group = storage.get_group(&group.id).await.unwrap().unwrap();
    assert_eq!(group.weekly_xp, 30);
    assert_eq!(group.total_xp, 60);
    assert_eq!(group.current_week, resolve_current_period(Utc::now()).week_marker());
}

async fn completed_task_on(storage: &Storage, user_id: &str, days_ago: i64) {
    let mut task = storage
        .create_task(
            user_id,
            &format!("task {days_ago} days ago"),
            "",
            "",
            "medium",
            None,
            None,
            "[]",
            None,
        )
        .await
        .unwrap();
    task.status = "completed".to_string();
    task.completed_at = Some((Utc::now() - Duration::days(days_ago)).to_rfc3339());
    storage.update_task(&task).await.unwrap();
}

#[tokio::test]
async fn streak_counts_consecutive_active_days() {
    let (storage, _dir) = make_storage().await;
    let user = storage
        .create_user("streak@example.com", "Streak", None, None)
        .await
        .unwrap();

    // Active today, yesterday, and the day before; quiet on day 3.
    completed_task_on(&storage, &user.id, 0).await;
    completed_task_on(&storage, &user.id, 1).await;
    completed_task_on(&storage, &user.id, 2).await;
    completed_task_on(&storage, &user.id, 4).await;

    let streak = calculate_streak(&storage, &user.id, Utc::now().date_naive())
        .await
        .unwrap();
    assert_eq!(streak, 3);

    let user = storage.get_user(&user.id).await.unwrap().unwrap();
    assert_eq!(user.streak, 3);
}

#[tokio::test]
async fn quiet_today_does_not_break_the_chain() {
    let (storage, _dir) = make_storage().await;
    let user = storage
        .create_user("late@example.com", "Late", None, None)
        .await
        .unwrap();

    completed_task_on(&storage, &user.id, 1).await;
    completed_task_on(&storage, &user.id, 2).await;

    let streak = calculate_streak(&storage, &user.id, Utc::now().date_naive())
        .await
        .unwrap();
    assert_eq!(streak, 2);
}

#[tokio::test]
async fn zero_history_user_has_zero_streak() {
    let (storage, _dir) = make_storage().await;
    let user = storage
        .create_user("new@example.com", "New", None, None)
        .await
        .unwrap();

    let streak = calculate_streak(&storage, &user.id, Utc::now().date_naive())
        .await
        .unwrap();
    assert_eq!(streak, 0);
}
