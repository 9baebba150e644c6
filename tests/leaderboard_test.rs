//! Ranking tests: ordering, tie handling, requester rank, group boards.

use studyd::gamification::award_xp;
use studyd::leaderboard::{group_leaderboard, user_leaderboard, Period};
use studyd::storage::{Storage, UserRow};
use tempfile::TempDir;

async fn make_storage() -> (Storage, TempDir) {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path()).await.unwrap();
    (storage, dir)
}

async fn user_with_xp(storage: &Storage, email: &str, xp: i64) -> UserRow {
    let user = storage.create_user(email, email, None, None).await.unwrap();
    if xp > 0 {
        award_xp(storage, &user, xp, "task_completed", None).await.unwrap();
    }
    storage.get_user(&user.id).await.unwrap().unwrap()
}

#[tokio::test]
async fn weekly_board_sorts_descending_with_ranks() {
    let (storage, _dir) = make_storage().await;
    let a = user_with_xp(&storage, "a@example.com", 50).await;
    let b = user_with_xp(&storage, "b@example.com", 30).await;
    let c = user_with_xp(&storage, "c@example.com", 80).await;

    let (entries, my_rank) = user_leaderboard(&storage, Period::Weekly, 10, &a.id)
        .await
        .unwrap();

    let ids: Vec<&str> = entries.iter().map(|e| e.user_id.as_str()).collect();
    assert_eq!(ids, vec![c.id.as_str(), a.id.as_str(), b.id.as_str()]);
    let ranks: Vec<u64> = entries.iter().map(|e| e.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
    assert_eq!(my_rank, 2);
}

#[tokio::test]
async fn ties_keep_insertion_order_and_share_no_rank_inflation() {
    let (storage, _dir) = make_storage().await;
    let first = user_with_xp(&storage, "first@example.com", 40).await;
    let second = user_with_xp(&storage, "second@example.com", 40).await;

    let (entries, my_rank) = user_leaderboard(&storage, Period::Weekly, 10, &second.id)
        .await
        .unwrap();

    assert_eq!(entries[0].user_id, first.id);
    assert_eq!(entries[1].user_id, second.id);
    // Nobody strictly above 40, so both resolve to rank 1.
    assert_eq!(my_rank, 1);
}

#[tokio::test]
async fn requester_outside_the_page_still_gets_a_rank() {
    let (storage, _dir) = make_storage().await;
    user_with_xp(&storage, "top@example.com", 100).await;
    user_with_xp(&storage, "mid@example.com", 60).await;
    let low = user_with_xp(&storage, "low@example.com", 10).await;

    let (entries, my_rank) = user_leaderboard(&storage, Period::Weekly, 2, &low.id)
        .await
        .unwrap();

    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.user_id != low.id));
    assert_eq!(my_rank, 3);
}

#[tokio::test]
async fn unknown_period_defaults_to_weekly() {
    assert_eq!(Period::parse("fortnightly"), Period::Weekly);
}

#[tokio::test]
async fn group_board_ranks_by_xp_with_member_counts() {
    let (storage, _dir) = make_storage().await;
    let u1 = user_with_xp(&storage, "g1@example.com", 0).await;
    let u2 = user_with_xp(&storage, "g2@example.com", 0).await;
    let u3 = user_with_xp(&storage, "g3@example.com", 0).await;

    let alpha = storage.create_group("Alpha", "", &u1.id, true).await.unwrap();
    let beta = storage.create_group("Beta", "", &u2.id, true).await.unwrap();
    storage.set_user_group(&u1.id, Some(&alpha.id)).await.unwrap();
    storage.set_user_group(&u2.id, Some(&beta.id)).await.unwrap();
    storage.set_user_group(&u3.id, Some(&beta.id)).await.unwrap();

    award_xp(&storage, &u1, 10, "task_completed", Some(&alpha.id)).await.unwrap();
    award_xp(&storage, &u2, 50, "task_completed", Some(&beta.id)).await.unwrap();

    let entries = group_leaderboard(&storage, Period::AllTime, 10).await.unwrap();
    assert_eq!(entries[0].group_id, beta.id);
    assert_eq!(entries[0].member_count, 2);
    assert_eq!(entries[1].group_id, alpha.id);
    assert_eq!(entries[1].member_count, 1);
}
