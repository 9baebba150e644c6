// calendar/mod.rs — external calendar OAuth shim.
//
// Authorization-code flow against the configured provider (Google-shaped
// defaults). Tokens are stored per user; events fetched for a date become
// locked schedule blocks the planner treats as immovable. Outside the
// planner an unreachable provider surfaces as an upstream error; inside it,
// the day is simply planned unconstrained.

use anyhow::{anyhow, Result};
use chrono::DateTime;
use serde::Deserialize;

use crate::config::CalendarConfig;
use crate::planner::{Block, BlockKind};
use crate::storage::Storage;

const OAUTH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// One external calendar event, reduced to what the planner needs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CalendarEvent {
    pub title: String,
    /// "HH:MM" wall-clock times as the provider reported them.
    pub start_time: String,
    pub end_time: String,
}

pub struct CalendarClient {
    client: reqwest::Client,
    config: CalendarConfig,
}

impl CalendarClient {
    pub fn new(config: CalendarConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(OAUTH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// All three OAuth credentials present.
    pub fn configured(&self) -> bool {
        self.config.client_id.is_some()
            && self.config.client_secret.is_some()
            && self.config.redirect_uri.is_some()
    }

    /// Provider consent URL. `state` round-trips through the provider and
    /// identifies the connecting user at the callback.
    pub fn auth_url(&self, state: &str) -> Result<String> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or_else(|| anyhow!("calendar integration not configured"))?;
        let redirect_uri = self
            .config
            .redirect_uri
            .as_deref()
            .ok_or_else(|| anyhow!("calendar integration not configured"))?;

        Ok(format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&state={}",
            self.config.auth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode("https://www.googleapis.com/auth/calendar.readonly"),
            urlencoding::encode(state),
        ))
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or_else(|| anyhow!("calendar integration not configured"))?;
        let client_secret = self
            .config
            .client_secret
            .as_deref()
            .ok_or_else(|| anyhow!("calendar integration not configured"))?;
        let redirect_uri = self
            .config
            .redirect_uri
            .as_deref()
            .ok_or_else(|| anyhow!("calendar integration not configured"))?;

        let resp = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("code", code),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .error_for_status()?;

        Ok(resp.json().await?)
    }

    /// Events on `date` (ISO date) for a connected account.
    pub async fn events_for_date(&self, access_token: &str, date: &str) -> Result<Vec<CalendarEvent>> {
        let time_min = format!("{date}T00:00:00Z");
        let time_max = format!("{date}T23:59:59Z");
        let resp = self
            .client
            .get(&self.config.events_url)
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: EventsResponse = resp.json().await?;
        Ok(body
            .items
            .into_iter()
            .filter_map(|item| {
                let start = wall_time(item.start.date_time.as_deref()?)?;
                let end = wall_time(item.end.date_time.as_deref()?)?;
                Some(CalendarEvent {
                    title: item.summary.unwrap_or_else(|| "Busy".to_string()),
                    start_time: start,
                    end_time: end,
                })
            })
            .collect())
    }

    /// The date's external events as locked blocks, or an empty list when no
    /// calendar is connected.
    pub async fn locked_blocks(
        &self,
        storage: &Storage,
        user_id: &str,
        date: &str,
    ) -> Result<Vec<Block>> {
        let Some(account) = storage.get_calendar_account(user_id).await? else {
            return Ok(Vec::new());
        };
        let events = self.events_for_date(&account.access_token, date).await?;
        Ok(events
            .into_iter()
            .map(|e| Block {
                start_time: e.start_time,
                end_time: e.end_time,
                title: e.title,
                kind: BlockKind::Locked,
                task_id: None,
                locked: true,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    items: Vec<EventItem>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    summary: Option<String>,
    start: EventTime,
    end: EventTime,
}

#[derive(Debug, Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    // All-day events carry only `date`; those never block planner slots.
}

/// Provider timestamps keep their own offset — the wall-clock "HH:MM" is what
/// the schedule grid needs.
fn wall_time(rfc3339: &str) -> Option<String> {
    let dt = DateTime::parse_from_rfc3339(rfc3339).ok()?;
    Some(dt.format("%H:%M").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> CalendarClient {
        CalendarClient::new(CalendarConfig {
            client_id: Some("client".to_string()),
            client_secret: Some("secret".to_string()),
            redirect_uri: Some("http://localhost:4400/api/calendar/callback".to_string()),
            ..CalendarConfig::default()
        })
    }

    #[test]
    fn auth_url_encodes_parameters() {
        let url = configured().auth_url("user_abc").unwrap();
        assert!(url.starts_with("https://accounts.google.com/"));
        assert!(url.contains("client_id=client"));
        assert!(url.contains("state=user_abc"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A4400"));
    }

    #[test]
    fn unconfigured_client_refuses_auth_url() {
        let client = CalendarClient::new(CalendarConfig::default());
        assert!(!client.configured());
        assert!(client.auth_url("user_abc").is_err());
    }

    #[test]
    fn wall_time_keeps_provider_offset() {
        assert_eq!(wall_time("2026-08-29T10:30:00+02:00").unwrap(), "10:30");
        assert_eq!(wall_time("2026-08-29T09:00:00Z").unwrap(), "09:00");
        assert!(wall_time("not-a-timestamp").is_none());
    }
}
