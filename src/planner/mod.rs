// planner/mod.rs — day-planner heuristic.
//
// Pending tasks are scored (priority × due-date urgency, biased by the
// requested energy level) and laid into the day either by the external
// language model or, whenever that call fails or returns anything but the
// expected block list, by a deterministic greedy packer. Locked blocks from
// the external calendar are immovable: the packer walks around them and AI
// output that overlaps one is discarded wholesale.

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ai::AiClient;
use crate::calendar::CalendarClient;
use crate::storage::{Storage, TaskRow};

pub const DEFAULT_WORK_MINUTES: u32 = 50;
pub const DEFAULT_BREAK_MINUTES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Work,
    Break,
    Locked,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Break => "break",
            Self::Locked => "locked",
        }
    }
}

/// One entry in a day schedule. Times are "HH:MM", 24-hour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub start_time: String,
    pub end_time: String,
    pub title: String,
    pub kind: BlockKind,
    pub task_id: Option<String>,
    pub locked: bool,
}

// ─── Scoring ──────────────────────────────────────────────────────────────────

/// Qualitative energy input biasing task selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Energy {
    Low,
    Medium,
    High,
}

impl Energy {
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("low") => Self::Low,
            Some("high") => Self::High,
            _ => Self::Medium,
        }
    }
}

fn priority_weight(priority: &str) -> f64 {
    match priority {
        "low" => 1.0,
        "medium" => 2.0,
        // Urgent carries no extra planner weight over high; urgency comes
        // from the due date term.
        "high" | "urgent" => 3.0,
        _ => 1.0,
    }
}

fn urgency_weight(days_until_due: Option<i64>) -> f64 {
    match days_until_due {
        Some(d) if d <= 1 => 3.0,
        Some(d) if d <= 3 => 2.0,
        _ => 1.0,
    }
}

fn days_until_due(task: &TaskRow, today: NaiveDate) -> Option<i64> {
    let due = task.due_date.as_deref()?;
    // Accept both plain dates and full timestamps.
    let date = NaiveDate::parse_from_str(due.get(..10)?, "%Y-%m-%d").ok()?;
    Some((date - today).num_days())
}

/// priority × urgency — a plain product, not normalized.
pub fn priority_score(task: &TaskRow, today: NaiveDate) -> f64 {
    priority_weight(&task.priority) * urgency_weight(days_until_due(task, today))
}

/// Energy bias applies only to high/urgent tasks: low energy halves them to
/// discourage overload, high energy boosts them 1.3×.
pub fn adjusted_score(task: &TaskRow, today: NaiveDate, energy: Energy) -> f64 {
    let base = priority_score(task, today);
    let high_priority = matches!(task.priority.as_str(), "high" | "urgent");
    match (energy, high_priority) {
        (Energy::Low, true) => base * 0.5,
        (Energy::High, true) => base * 1.3,
        _ => base,
    }
}

// ─── Time helpers ─────────────────────────────────────────────────────────────

/// "HH:MM" → minutes since midnight.
pub fn parse_minutes(hhmm: &str) -> Result<u32> {
    let (h, m) = hhmm
        .split_once(':')
        .ok_or_else(|| anyhow!("invalid time {hhmm:?}"))?;
    let h: u32 = h.parse().map_err(|_| anyhow!("invalid time {hhmm:?}"))?;
    let m: u32 = m.parse().map_err(|_| anyhow!("invalid time {hhmm:?}"))?;
    if h > 23 || m > 59 {
        return Err(anyhow!("invalid time {hhmm:?}"));
    }
    Ok(h * 60 + m)
}

pub fn format_minutes(total: u32) -> String {
    format!("{:02}:{:02}", total / 60, total % 60)
}

fn overlaps(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    a_start < b_end && b_start < a_end
}

// ─── Greedy packer ────────────────────────────────────────────────────────────

/// Deterministic fallback: walk the window in work-duration increments,
/// hopping past locked blocks, assigning the next unscheduled task to each
/// slot and interleaving a break after each work block while tasks remain.
pub fn greedy_pack(
    tasks: &[TaskRow],
    window_start: u32,
    window_end: u32,
    work_minutes: u32,
    break_minutes: u32,
    breaks_enabled: bool,
    locked: &[Block],
) -> Vec<Block> {
    let locked_spans: Vec<(u32, u32)> = locked
        .iter()
        .filter_map(|b| Some((parse_minutes(&b.start_time).ok()?, parse_minutes(&b.end_time).ok()?)))
        .collect();

    let mut blocks = Vec::new();
    let mut cursor = window_start;
    let mut remaining = tasks.iter();
    let mut next_task = remaining.next();

    while next_task.is_some() && cursor + work_minutes <= window_end {
        if let Some(&(_, lock_end)) = locked_spans
            .iter()
            .find(|&&(s, e)| overlaps(cursor, cursor + work_minutes, s, e))
        {
            // Slot collides with an immovable event — resume after it.
            cursor = cursor.max(lock_end);
            continue;
        }

        let task = next_task.take().unwrap();
        blocks.push(Block {
            start_time: format_minutes(cursor),
            end_time: format_minutes(cursor + work_minutes),
            title: task.title.clone(),
            kind: BlockKind::Work,
            task_id: Some(task.id.clone()),
            locked: false,
        });
        cursor += work_minutes;
        next_task = remaining.next();

        if breaks_enabled && next_task.is_some() && cursor + break_minutes <= window_end {
            blocks.push(Block {
                start_time: format_minutes(cursor),
                end_time: format_minutes(cursor + break_minutes),
                title: "Break".to_string(),
                kind: BlockKind::Break,
                task_id: None,
                locked: false,
            });
            cursor += break_minutes;
        }
    }

    blocks
}

// ─── Generation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    /// ISO date the schedule is for.
    pub date: String,
    #[serde(default = "default_start")]
    pub start_time: String,
    #[serde(default = "default_end")]
    pub end_time: String,
    #[serde(default = "default_work")]
    pub work_minutes: u32,
    #[serde(default = "default_break")]
    pub break_minutes: u32,
    #[serde(default = "default_true")]
    pub breaks_enabled: bool,
    /// low | medium | high
    pub energy: Option<String>,
}

fn default_start() -> String {
    "09:00".to_string()
}
fn default_end() -> String {
    "17:00".to_string()
}
fn default_work() -> u32 {
    DEFAULT_WORK_MINUTES
}
fn default_break() -> u32 {
    DEFAULT_BREAK_MINUTES
}
fn default_true() -> bool {
    true
}

/// Check the request's time window and return it as minutes-of-day.
pub fn validate_window(req: &GenerateRequest) -> Result<(u32, u32)> {
    let window_start = parse_minutes(&req.start_time)?;
    let window_end = parse_minutes(&req.end_time)?;
    if window_end <= window_start {
        return Err(anyhow!("schedule window is empty"));
    }
    if req.work_minutes == 0 {
        return Err(anyhow!("work duration must be positive"));
    }
    Ok((window_start, window_end))
}

/// Build the day's block list: scored pending tasks, locked calendar events,
/// AI layout with deterministic fallback. The caller persists the result.
pub async fn generate_blocks(
    storage: &Storage,
    ai: &AiClient,
    calendar: &CalendarClient,
    user_id: &str,
    req: &GenerateRequest,
) -> Result<Vec<Block>> {
    let (window_start, window_end) = validate_window(req)?;

    let today = Utc::now().date_naive();
    let energy = Energy::parse(req.energy.as_deref());

    let mut tasks = storage
        .list_tasks(user_id, Some("pending"), None, None)
        .await?;
    // Stable sort, highest adjusted score first.
    tasks.sort_by(|a, b| {
        adjusted_score(b, today, energy)
            .partial_cmp(&adjusted_score(a, today, energy))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Locked calendar events are best-effort: an unreachable calendar means
    // an unconstrained day, not a failed request.
    let locked = match calendar.locked_blocks(storage, user_id, &req.date).await {
        Ok(blocks) => blocks,
        Err(e) => {
            warn!("calendar fetch failed: {e:#} — planning without locked blocks");
            Vec::new()
        }
    };

    let generated = match ai.plan_schedule(&tasks, &locked, req).await {
        Ok(blocks) if validate_ai_blocks(&blocks, window_start, window_end, &locked) => blocks,
        Ok(_) => {
            warn!("AI schedule violated constraints — using deterministic packer");
            greedy_pack(
                &tasks,
                window_start,
                window_end,
                req.work_minutes,
                req.break_minutes,
                req.breaks_enabled,
                &locked,
            )
        }
        Err(e) => {
            warn!("AI schedule unavailable: {e:#} — using deterministic packer");
            greedy_pack(
                &tasks,
                window_start,
                window_end,
                req.work_minutes,
                req.break_minutes,
                req.breaks_enabled,
                &locked,
            )
        }
    };

    let mut blocks = generated;
    blocks.extend(locked);
    blocks.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    Ok(blocks)
}

/// Strict acceptance for AI output: well-formed times inside the window and
/// zero overlap with locked blocks. Anything else falls back wholesale —
/// malformed output is never partially trusted.
fn validate_ai_blocks(blocks: &[Block], window_start: u32, window_end: u32, locked: &[Block]) -> bool {
    if blocks.is_empty() {
        return false;
    }
    let locked_spans: Vec<(u32, u32)> = locked
        .iter()
        .filter_map(|b| Some((parse_minutes(&b.start_time).ok()?, parse_minutes(&b.end_time).ok()?)))
        .collect();

    for block in blocks {
        let (Ok(start), Ok(end)) = (parse_minutes(&block.start_time), parse_minutes(&block.end_time))
        else {
            return false;
        };
        if start >= end || start < window_start || end > window_end {
            return false;
        }
        if block.kind == BlockKind::Locked {
            return false;
        }
        if locked_spans.iter().any(|&(s, e)| overlaps(start, end, s, e)) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, title: &str, priority: &str, due: Option<&str>) -> TaskRow {
        TaskRow {
            id: id.to_string(),
            user_id: "user_test".to_string(),
            title: title.to_string(),
            description: String::new(),
            subject: String::new(),
            priority: priority.to_string(),
            status: "pending".to_string(),
            due_date: due.map(|d| d.to_string()),
            estimated_minutes: None,
            depends_on: "[]".to_string(),
            scheduled_time: None,
            completed_at: None,
            xp_awarded: false,
            created_at: String::new(),
        }
    }

    fn locked_block(start: &str, end: &str) -> Block {
        Block {
            start_time: start.to_string(),
            end_time: end.to_string(),
            title: "Lecture".to_string(),
            kind: BlockKind::Locked,
            task_id: None,
            locked: true,
        }
    }

    #[test]
    fn score_is_priority_times_urgency() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        let due_tomorrow = task("t1", "a", "high", Some("2026-08-25"));
        assert_eq!(priority_score(&due_tomorrow, today), 9.0);
        let due_in_three = task("t2", "b", "medium", Some("2026-08-27"));
        assert_eq!(priority_score(&due_in_three, today), 4.0);
        let no_due = task("t3", "c", "low", None);
        assert_eq!(priority_score(&no_due, today), 1.0);
    }

    #[test]
    fn energy_bias_only_touches_high_priority() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        let high = task("t1", "a", "high", None);
        let low = task("t2", "b", "low", None);
        assert_eq!(adjusted_score(&high, today, Energy::Low), 1.5);
        assert_eq!(adjusted_score(&high, today, Energy::High), 3.0 * 1.3);
        assert_eq!(adjusted_score(&low, today, Energy::Low), 1.0);
        assert_eq!(adjusted_score(&low, today, Energy::High), 1.0);
    }

    #[test]
    fn packer_alternates_work_and_break() {
        let tasks = vec![task("t1", "Essay", "high", None), task("t2", "Reading", "low", None)];
        let blocks = greedy_pack(&tasks, 9 * 60, 11 * 60, 50, 10, true, &[]);

        let spans: Vec<(String, String, BlockKind)> = blocks
            .iter()
            .map(|b| (b.start_time.clone(), b.end_time.clone(), b.kind))
            .collect();
        assert_eq!(
            spans,
            vec![
                ("09:00".into(), "09:50".into(), BlockKind::Work),
                ("09:50".into(), "10:00".into(), BlockKind::Break),
                ("10:00".into(), "10:50".into(), BlockKind::Work),
            ]
        );
        assert_eq!(blocks[0].task_id.as_deref(), Some("t1"));
        assert_eq!(blocks[2].task_id.as_deref(), Some("t2"));
    }

    #[test]
    fn packer_skips_locked_blocks() {
        let tasks = vec![task("t1", "Essay", "high", None), task("t2", "Reading", "low", None)];
        let locked = vec![locked_block("09:30", "10:00")];
        let blocks = greedy_pack(&tasks, 9 * 60, 12 * 60, 50, 10, true, &locked);

        // First slot 09:00–09:50 collides with the lecture, so work starts
        // at 10:00.
        assert_eq!(blocks[0].start_time, "10:00");
        assert_eq!(blocks[0].end_time, "10:50");
        assert_eq!(blocks[1].kind, BlockKind::Break);
        assert_eq!(blocks[2].start_time, "11:00");
    }

    #[test]
    fn packer_without_breaks() {
        let tasks = vec![task("t1", "a", "low", None), task("t2", "b", "low", None)];
        let blocks = greedy_pack(&tasks, 9 * 60, 12 * 60, 50, 10, false, &[]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].start_time, "09:50");
    }

    #[test]
    fn packer_stops_at_window_end() {
        let tasks = vec![
            task("t1", "a", "low", None),
            task("t2", "b", "low", None),
            task("t3", "c", "low", None),
        ];
        let blocks = greedy_pack(&tasks, 9 * 60, 10 * 60, 50, 10, true, &[]);
        // Only one 50-minute slot fits before 10:00.
        assert_eq!(blocks.iter().filter(|b| b.kind == BlockKind::Work).count(), 1);
    }

    #[test]
    fn ai_validation_rejects_locked_overlap() {
        let locked = vec![locked_block("10:00", "11:00")];
        let bad = vec![Block {
            start_time: "10:30".into(),
            end_time: "11:20".into(),
            title: "Essay".into(),
            kind: BlockKind::Work,
            task_id: None,
            locked: false,
        }];
        assert!(!validate_ai_blocks(&bad, 9 * 60, 17 * 60, &locked));
    }

    #[test]
    fn ai_validation_rejects_malformed_times() {
        let bad = vec![Block {
            start_time: "25:99".into(),
            end_time: "26:00".into(),
            title: "x".into(),
            kind: BlockKind::Work,
            task_id: None,
            locked: false,
        }];
        assert!(!validate_ai_blocks(&bad, 0, 24 * 60, &[]));
    }

    #[test]
    fn parse_minutes_bounds() {
        assert_eq!(parse_minutes("09:00").unwrap(), 540);
        assert_eq!(parse_minutes("23:59").unwrap(), 1439);
        assert!(parse_minutes("24:00").is_err());
        assert!(parse_minutes("0900").is_err());
    }
}
