use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

const DEFAULT_PORT: u16 = 4400;
const DEFAULT_AI_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_AI_MODEL: &str = "gpt-4o";
const DEFAULT_CALENDAR_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_CALENDAR_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_CALENDAR_EVENTS_URL: &str = "https://www.googleapis.com/calendar/v3/calendars/primary/events";

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── AiConfig ─────────────────────────────────────────────────────────────────

/// External language-model collaborator (`[ai]` in config.toml).
///
/// `api_key = None` disables the AI endpoints — the planner then always uses
/// the deterministic packer and the advisory endpoints return an upstream
/// error.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Base URL of an OpenAI-compatible chat-completions API.
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Request timeout in seconds. Bounds every advisory/planner call.
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_AI_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_AI_MODEL.to_string(),
            timeout_secs: 30,
        }
    }
}

// ─── CalendarConfig ───────────────────────────────────────────────────────────

/// External calendar OAuth settings (`[calendar]` in config.toml).
///
/// All three credentials must be present for the connect flow to work;
/// otherwise `/calendar/auth-url` reports the integration as unconfigured.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub auth_url: String,
    pub token_url: String,
    pub events_url: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            auth_url: DEFAULT_CALENDAR_AUTH_URL.to_string(),
            token_url: DEFAULT_CALENDAR_TOKEN_URL.to_string(),
            events_url: DEFAULT_CALENDAR_EVENTS_URL.to_string(),
        }
    }
}

// ─── ObservabilityConfig ──────────────────────────────────────────────────────

/// `[observability]` in config.toml.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log SQLite queries that exceed this threshold (milliseconds). Default: 100.
    /// Set to 0 to disable slow query logging.
    pub slow_query_threshold_ms: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: 100,
        }
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// REST server port (default: 4400).
    port: Option<u16>,
    /// Log level filter string, e.g. "debug", "info,studyd=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json".
    log_format: Option<String>,
    /// Bind address for the REST server (default: "127.0.0.1").
    bind_address: Option<String>,
    /// Secret for signing bearer tokens. Prefer STUDYD_TOKEN_SECRET.
    token_secret: Option<String>,
    /// Identity broker endpoint that exchanges an OAuth session id for user
    /// data (GET with an X-Session-ID header). Unset disables /auth/session.
    oauth_session_url: Option<String>,
    ai: Option<AiConfig>,
    calendar: Option<CalendarConfig>,
    observability: Option<ObservabilityConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── AppConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// Log output format: "pretty" (default) | "json".
    pub log_format: String,
    /// Bind address for the REST server (STUDYD_BIND env var).
    pub bind_address: String,
    /// Secret for signing bearer tokens (STUDYD_TOKEN_SECRET env var).
    /// Generated fresh at startup when unset — tokens then do not survive
    /// a restart, which is fine for local development only.
    pub token_secret: String,
    /// Identity broker endpoint for the OAuth session-id exchange.
    pub oauth_session_url: Option<String>,
    pub ai: AiConfig,
    pub calendar: CalendarConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let log_format = std::env::var("STUDYD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let bind_address = bind_address
            .or(std::env::var("STUDYD_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let token_secret = std::env::var("STUDYD_TOKEN_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.token_secret)
            .unwrap_or_else(|| {
                warn!("STUDYD_TOKEN_SECRET not set — generating an ephemeral signing secret");
                uuid::Uuid::new_v4().to_string().replace('-', "")
            });

        let oauth_session_url = std::env::var("STUDYD_OAUTH_SESSION_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.oauth_session_url);

        let mut ai = toml.ai.unwrap_or_default();
        if let Ok(key) = std::env::var("STUDYD_AI_API_KEY") {
            if !key.is_empty() {
                ai.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("STUDYD_AI_API_URL") {
            if !url.is_empty() {
                ai.api_url = url;
            }
        }
        if let Ok(model) = std::env::var("STUDYD_AI_MODEL") {
            if !model.is_empty() {
                ai.model = model;
            }
        }

        let mut calendar = toml.calendar.unwrap_or_default();
        if let Ok(v) = std::env::var("STUDYD_CALENDAR_CLIENT_ID") {
            if !v.is_empty() {
                calendar.client_id = Some(v);
            }
        }
        if let Ok(v) = std::env::var("STUDYD_CALENDAR_CLIENT_SECRET") {
            if !v.is_empty() {
                calendar.client_secret = Some(v);
            }
        }
        if let Ok(v) = std::env::var("STUDYD_CALENDAR_REDIRECT_URI") {
            if !v.is_empty() {
                calendar.redirect_uri = Some(v);
            }
        }

        let observability = toml.observability.unwrap_or_default();

        Self {
            port,
            data_dir,
            log,
            log_format,
            bind_address,
            token_secret,
            oauth_session_url,
            ai,
            calendar,
            observability,
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/studyd
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("studyd");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/studyd or ~/.local/share/studyd
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("studyd");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("studyd");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\studyd
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("studyd");
        }
    }
    // Fallback
    PathBuf::from(".studyd")
}
