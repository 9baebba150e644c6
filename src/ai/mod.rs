// ai/mod.rs — external language-model collaborator.
//
// Pure formatting and delegation: callers assemble a numeric context, this
// client wraps it in a fixed instructional preamble and relays the generated
// text verbatim. Nothing here influences control flow beyond the planner's
// parse-or-fallback contract. Every call is bounded by the configured
// timeout (default 30s).

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::AppConfig;
use crate::planner::{Block, BlockKind, GenerateRequest};
use crate::storage::TaskRow;

const COACH_PREAMBLE: &str = "You are an AI study coach. Analyze the student's \
productivity data and provide 2-3 specific, actionable tips. Be encouraging but \
direct. Focus on patterns and concrete suggestions. Keep the response under 150 words.";

const BREAKDOWN_PREAMBLE: &str = "You are a task breakdown assistant. Break the \
given task into 3-6 smaller, actionable subtasks, each achievable in 15-45 \
minutes. Return only a JSON array of objects with 'title' and \
'estimated_minutes' fields.";

const SUMMARY_PREAMBLE: &str = "You are a supportive study coach. Write a brief, \
encouraging weekly summary (under 100 words). Acknowledge achievements, note one \
area for improvement, and end with motivation for next week. Be warm but concise.";

const PLANNER_PREAMBLE: &str = "You are a day-planning assistant. Arrange the \
given tasks into focus blocks for the stated window, alternating work and break \
blocks of the stated durations. Never overlap the listed calendar events. Return \
only a JSON array of objects with 'start_time', 'end_time', 'title', 'kind' \
('work' or 'break') and optional 'task_id' fields, times as 24-hour HH:MM.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subtask {
    pub title: String,
    #[serde(default = "default_subtask_minutes")]
    pub estimated_minutes: i64,
}

fn default_subtask_minutes() -> i64 {
    30
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Client for an OpenAI-compatible chat-completions API.
pub struct AiClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl AiClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.ai.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_url: config.ai.api_url.clone(),
            api_key: config.ai.api_key.clone(),
            model: config.ai.model.clone(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("no AI API key configured"))?;
        let url = format!("{}/chat/completions", self.api_url);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user },
                ],
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: ChatResponse = resp.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("empty completion response"))
    }

    pub async fn study_coach(&self, context: &str) -> Result<String> {
        self.chat(
            COACH_PREAMBLE,
            &format!("Based on this data, give me personalized study tips:\n{context}"),
        )
        .await
    }

    pub async fn weekly_summary(&self, context: &str) -> Result<String> {
        self.chat(SUMMARY_PREAMBLE, &format!("Write my weekly study summary:\n{context}"))
            .await
    }

    /// Generated subtasks for a task title. The model's text is strict-parsed
    /// as a JSON array; unparseable output is wrapped as a single item rather
    /// than trusted piecemeal.
    pub async fn break_down_task(&self, task_title: &str, context: &str) -> Result<Vec<Subtask>> {
        let text = self
            .chat(
                BREAKDOWN_PREAMBLE,
                &format!("Break down this task into smaller steps:\nTask: {task_title}\nContext: {context}"),
            )
            .await?;
        Ok(parse_subtasks(&text))
    }

    /// Ask the model to lay out the day. Strict parse only — the caller
    /// validates the result against the window and locked blocks and falls
    /// back to the greedy packer on any failure.
    pub async fn plan_schedule(
        &self,
        tasks: &[TaskRow],
        locked: &[Block],
        req: &GenerateRequest,
    ) -> Result<Vec<Block>> {
        if tasks.is_empty() {
            return Err(anyhow!("nothing to schedule"));
        }

        let task_lines: Vec<String> = tasks
            .iter()
            .map(|t| format!("- {} (id {}, priority {})", t.title, t.id, t.priority))
            .collect();
        let locked_lines: Vec<String> = locked
            .iter()
            .map(|b| format!("- {} to {}: {}", b.start_time, b.end_time, b.title))
            .collect();

        let prompt = format!(
            "Window: {} to {}. Work blocks of {} minutes, breaks of {} minutes.\n\
             Tasks, highest priority first:\n{}\n\
             Immovable calendar events:\n{}",
            req.start_time,
            req.end_time,
            req.work_minutes,
            req.break_minutes,
            task_lines.join("\n"),
            if locked_lines.is_empty() {
                "(none)".to_string()
            } else {
                locked_lines.join("\n")
            },
        );

        let text = self.chat(PLANNER_PREAMBLE, &prompt).await?;
        parse_blocks(&text)
    }
}

// ─── Structured-output parsing ────────────────────────────────────────────────

/// Locate the JSON array in `text` and strict-parse it; wrap the raw text as
/// a single 30-minute item when no parseable array is present.
pub fn parse_subtasks(text: &str) -> Vec<Subtask> {
    if let Some(parsed) = extract_array::<Subtask>(text) {
        if !parsed.is_empty() {
            return parsed;
        }
    }
    vec![Subtask {
        title: text.trim().to_string(),
        estimated_minutes: default_subtask_minutes(),
    }]
}

#[derive(Debug, Deserialize)]
struct AiBlock {
    start_time: String,
    end_time: String,
    title: String,
    kind: BlockKind,
    #[serde(default)]
    task_id: Option<String>,
}

fn parse_blocks(text: &str) -> Result<Vec<Block>> {
    let parsed: Vec<AiBlock> =
        extract_array(text).ok_or_else(|| anyhow!("completion is not a block list"))?;
    Ok(parsed
        .into_iter()
        .map(|b| Block {
            start_time: b.start_time,
            end_time: b.end_time,
            title: b.title,
            kind: b.kind,
            task_id: b.task_id,
            locked: false,
        })
        .collect())
}

/// Strict parse of the first `[...]` span in the text. Models often wrap the
/// array in prose or a code fence; anything inside the brackets must still
/// deserialize exactly.
fn extract_array<T: serde::de::DeserializeOwned>(text: &str) -> Option<Vec<T>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtasks_parse_clean_array() {
        let text = r#"[{"title":"Outline","estimated_minutes":20},{"title":"Draft"}]"#;
        let subtasks = parse_subtasks(text);
        assert_eq!(subtasks.len(), 2);
        assert_eq!(subtasks[0].title, "Outline");
        assert_eq!(subtasks[0].estimated_minutes, 20);
        assert_eq!(subtasks[1].estimated_minutes, 30);
    }

    #[test]
    fn subtasks_parse_fenced_array() {
        let text = "Here you go:\n```json\n[{\"title\":\"Read chapter\"}]\n```";
        let subtasks = parse_subtasks(text);
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].title, "Read chapter");
    }

    #[test]
    fn subtasks_wrap_unparseable_text() {
        let text = "Just do it in one sitting.";
        let subtasks = parse_subtasks(text);
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].title, "Just do it in one sitting.");
        assert_eq!(subtasks[0].estimated_minutes, 30);
    }

    #[test]
    fn subtasks_wrap_malformed_array() {
        let text = "[{\"title\": unquoted}]";
        let subtasks = parse_subtasks(text);
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].title, text);
    }

    #[test]
    fn blocks_parse_strictly() {
        let text = r#"[{"start_time":"09:00","end_time":"09:50","title":"Essay","kind":"work","task_id":"task_1"},
                       {"start_time":"09:50","end_time":"10:00","title":"Break","kind":"break"}]"#;
        let blocks = parse_blocks(text).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::Work);
        assert_eq!(blocks[1].kind, BlockKind::Break);
        assert!(!blocks[0].locked);
    }

    #[test]
    fn blocks_reject_prose() {
        assert!(parse_blocks("I suggest starting with the essay.").is_err());
    }
}
