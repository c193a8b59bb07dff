use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

mod config;

pub use config::{Config, LoggerConfig};

/// Token budget for the context handed to the completion service.
pub const MAX_CONTEXT_TOKENS: usize = 3000;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("all {attempts} search api keys are rate limited")]
    AllKeysRateLimited { attempts: usize },
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("moderation failed: {0}")]
    Moderation(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Safety level for a single query.
///
/// Anything other than `Off` also enables the moderation gate on the generated answer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SafeSearch {
    #[default]
    #[serde(rename = "off")]
    Off,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "safeUndefined", alias = "default")]
    ProviderDefault,
}

impl SafeSearch {
    /// Value for the provider's `safe` query parameter; `None` leaves it to the provider.
    pub fn query_value(self) -> Option<&'static str> {
        match self {
            SafeSearch::Off => Some("off"),
            SafeSearch::Active => Some("active"),
            SafeSearch::ProviderDefault => None,
        }
    }

    pub fn moderated(self) -> bool {
        self != SafeSearch::Off
    }
}

impl FromStr for SafeSearch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(SafeSearch::Off),
            "active" | "on" => Ok(SafeSearch::Active),
            "default" | "safeundefined" | "provider-default" => Ok(SafeSearch::ProviderDefault),
            other => Err(Error::NotConfigured(format!(
                "unknown safe search mode {other:?} (expected off|active|default)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub title: Option<String>,
    pub link: String,
    pub snippet: String,
}

/// Grounding material assembled for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchContext {
    pub text: String,
    /// Link of the first (most relevant) result.
    pub url: String,
    /// All result links, in provider order.
    pub urls: Vec<String>,
}

impl SearchContext {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.url.is_empty()
    }
}

/// Recovered failure kinds. Each one reaches the caller as an [`Answer`] carrying a fixed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    AllProviderKeysRateLimited,
    ProviderRequestFailed,
    NoSearchResults,
    NoCompletionResponse,
    ModerationUnavailable,
    ContentFlagged,
    Unclassified,
}

impl Failure {
    pub fn message(self) -> &'static str {
        match self {
            Failure::AllProviderKeysRateLimited => {
                "All search API keys are currently rate limited, please try again later."
            }
            Failure::ProviderRequestFailed => "This request failed, please try again later.",
            Failure::NoSearchResults => "The search returned no results.",
            Failure::NoCompletionResponse => "No response from OpenAI",
            Failure::ModerationUnavailable => {
                "The answer could not be checked by the moderation service, so it has been withheld."
            }
            Failure::ContentFlagged => "The answer was withheld because it was flagged as unsafe.",
            Failure::Unclassified => "An error occurred while searching Google.",
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// The externally visible result of a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    pub content: String,
    pub url: Option<String>,
    pub urls: Option<Vec<String>>,
}

impl Answer {
    pub fn grounded(content: String, ctx: &SearchContext) -> Self {
        Self {
            content,
            url: Some(ctx.url.clone()),
            urls: Some(ctx.urls.clone()),
        }
    }

    pub fn failure(kind: Failure) -> Self {
        Self {
            content: kind.message().to_string(),
            url: None,
            urls: None,
        }
    }
}

impl From<Failure> for Answer {
    fn from(kind: Failure) -> Self {
        Answer::failure(kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

#[async_trait::async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &'static str;
    /// Returns the first candidate's text, or `None` when the service produced no usable choice.
    async fn complete(&self, req: &CompletionRequest) -> Result<Option<String>>;
}

#[async_trait::async_trait]
pub trait ModerationBackend: Send + Sync {
    /// `Some(flagged)` for a verdict, `None` when the service returned no result.
    async fn moderate(&self, input: &str) -> Result<Option<bool>>;
}

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str, model: &str) -> usize;
}

/// ~4 characters per token, rounded up. Model-independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenCounter;

impl TokenCounter for ApproxTokenCounter {
    fn count(&self, text: &str, _model: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    pub timeout_ms: Option<u64>,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: Option<u64>,
}

impl FetchRequest {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}
