use crate::{Error, Result};
use serde::Deserialize;

pub const DEFAULT_GOOGLE_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_LIMIT: usize = 5;

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| env(k))
}

fn env_flag(key: &str) -> Option<bool> {
    env(key).map(|v| {
        matches!(
            v.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn split_keys(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Which request/response/error events are logged. Logging never changes results.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggerConfig {
    #[serde(alias = "LOG_REQUESTS")]
    pub log_requests: bool,
    #[serde(alias = "LOG_RESPONSES")]
    pub log_responses: bool,
    #[serde(alias = "LOG_ERRORS")]
    pub log_errors: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_requests: false,
            log_responses: false,
            log_errors: true,
        }
    }
}

/// Engine configuration. Read-only once a pipeline is built from it.
///
/// Field aliases accept the upper-case key names (`OPENAI_API_KEY`, `GOOGLE_SEARCH_API_KEY`, ...)
/// so existing JSON config files load unchanged.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(alias = "OPENAI_API_KEY")]
    pub openai_api_key: String,
    #[serde(alias = "OPENAI_ORGANIZATION_ID")]
    pub openai_organization_id: Option<String>,
    #[serde(alias = "GOOGLE_SEARCH_API_KEY")]
    pub google_search_api_key: String,
    /// Fallback keys, tried in order after the primary one is rate limited.
    #[serde(alias = "MULTIPLE_SEARCH_API_KEYS")]
    pub multiple_search_api_keys: Vec<String>,
    #[serde(alias = "GOOGLE_SEARCH_ENGINE_ID")]
    pub google_search_engine_id: String,
    #[serde(alias = "LOGGER")]
    pub logger: LoggerConfig,

    pub google_endpoint: String,
    pub openai_base_url: String,
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    pub request_timeout_ms: u64,
    pub max_page_bytes: u64,
    pub fetch_full_page: bool,
    pub default_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_organization_id: None,
            google_search_api_key: String::new(),
            multiple_search_api_keys: Vec::new(),
            google_search_engine_id: String::new(),
            logger: LoggerConfig::default(),
            google_endpoint: DEFAULT_GOOGLE_ENDPOINT.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: Some(0.2),
            max_tokens: None,
            request_timeout_ms: 20_000,
            max_page_bytes: 2_000_000,
            fetch_full_page: false,
            default_limit: DEFAULT_LIMIT,
        }
    }
}

impl Config {
    pub fn new(
        openai_api_key: impl Into<String>,
        google_search_api_key: impl Into<String>,
        google_search_engine_id: impl Into<String>,
    ) -> Self {
        Self {
            openai_api_key: openai_api_key.into(),
            google_search_api_key: google_search_api_key.into(),
            google_search_engine_id: google_search_engine_id.into(),
            ..Self::default()
        }
    }

    /// Build from `BEYOND_*` variables, falling back to the bare provider names
    /// (`OPENAI_API_KEY`, `GOOGLE_SEARCH_API_KEY`, ...). Blank values count as unset.
    ///
    /// Does not validate; call [`Config::validate`] (pipelines do it on construction).
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_any(&["BEYOND_OPENAI_API_KEY", "OPENAI_API_KEY"]) {
            cfg.openai_api_key = v;
        }
        cfg.openai_organization_id =
            env_any(&["BEYOND_OPENAI_ORGANIZATION_ID", "OPENAI_ORGANIZATION_ID"]);
        if let Some(v) = env_any(&["BEYOND_GOOGLE_SEARCH_API_KEY", "GOOGLE_SEARCH_API_KEY"]) {
            cfg.google_search_api_key = v;
        }
        if let Some(v) = env("BEYOND_GOOGLE_SEARCH_API_KEYS") {
            cfg.multiple_search_api_keys = split_keys(&v);
        }
        if let Some(v) = env_any(&["BEYOND_GOOGLE_SEARCH_ENGINE_ID", "GOOGLE_SEARCH_ENGINE_ID"]) {
            cfg.google_search_engine_id = v;
        }
        if let Some(v) = env("BEYOND_GOOGLE_ENDPOINT") {
            cfg.google_endpoint = v;
        }
        if let Some(v) = env("BEYOND_OPENAI_BASE_URL") {
            cfg.openai_base_url = v;
        }
        if let Some(v) = env("BEYOND_OPENAI_MODEL") {
            cfg.model = v;
        }
        if let Some(ms) = env("BEYOND_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            cfg.request_timeout_ms = ms;
        }
        if let Some(b) = env_flag("BEYOND_FETCH_FULL_PAGE") {
            cfg.fetch_full_page = b;
        }
        if let Some(b) = env_flag("BEYOND_LOG_REQUESTS") {
            cfg.logger.log_requests = b;
        }
        if let Some(b) = env_flag("BEYOND_LOG_RESPONSES") {
            cfg.logger.log_responses = b;
        }
        if let Some(b) = env_flag("BEYOND_LOG_ERRORS") {
            cfg.logger.log_errors = b;
        }
        cfg
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::NotConfigured(format!("invalid config: {e}")))
    }

    /// Check required credentials and endpoint URLs. Performs no IO.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.openai_api_key.trim().is_empty() {
            missing.push("openai_api_key");
        }
        if self.google_search_api_key.trim().is_empty() {
            missing.push("google_search_api_key");
        }
        if self.google_search_engine_id.trim().is_empty() {
            missing.push("google_search_engine_id");
        }
        if !missing.is_empty() {
            return Err(Error::NotConfigured(format!(
                "missing configuration: {}",
                missing.join(", ")
            )));
        }
        for (name, raw) in [
            ("google_endpoint", &self.google_endpoint),
            ("openai_base_url", &self.openai_base_url),
        ] {
            url::Url::parse(raw)
                .map_err(|e| Error::NotConfigured(format!("invalid {name} {raw:?}: {e}")))?;
        }
        Ok(())
    }

    /// Primary key followed by the fallbacks, in listed order; blanks and repeats dropped.
    pub fn search_keys(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for k in std::iter::once(&self.google_search_api_key).chain(&self.multiple_search_api_keys)
        {
            let k = k.trim();
            if k.is_empty() {
                continue;
            }
            let k = k.to_string();
            if !out.contains(&k) {
                out.push(k);
            }
        }
        out
    }

    /// Per-request timeout, clamped so a provider cannot hang a query forever.
    pub fn timeout_ms(&self) -> u64 {
        self.request_timeout_ms.clamp(1_000, 120_000)
    }

    pub fn organization(&self) -> Option<&str> {
        self.openai_organization_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
