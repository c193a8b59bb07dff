use crate::answer::AnswerEngine;
use crate::context::ContextBuilder;
use crate::google::{GoogleSearch, SearchOutcome};
use crate::openai::OpenAiClient;
use crate::{http_client, LocalFetcher};
use beyond_core::{
    Answer, ApproxTokenCounter, CompletionBackend, Config, Failure, FetchBackend, LoggerConfig,
    ModerationBackend, Result, SafeSearch, TokenCounter,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Collaborators behind the answer pipeline. [`Beyond::new`] wires the OpenAI and HTTP ones.
#[derive(Clone)]
pub struct Backends {
    pub completion: Arc<dyn CompletionBackend>,
    pub moderation: Arc<dyn ModerationBackend>,
    pub tokens: Arc<dyn TokenCounter>,
    pub pages: Arc<dyn FetchBackend>,
}

/// Search, build context, answer.
///
/// `search` never fails: every outcome, including internal errors, is an [`Answer`].
/// Only construction can fail, on invalid configuration, and it does so before any IO.
pub struct Beyond {
    search: GoogleSearch,
    context: ContextBuilder,
    engine: AnswerEngine,
    default_limit: usize,
    fetch_full_page: bool,
    logger: LoggerConfig,
}

impl Beyond {
    pub fn new(cfg: Config) -> Result<Self> {
        cfg.validate()?;
        let client = http_client(cfg.timeout_ms())?;
        let openai = Arc::new(OpenAiClient::new(client.clone(), &cfg)?);
        let backends = Backends {
            completion: openai.clone(),
            moderation: openai,
            tokens: Arc::new(ApproxTokenCounter),
            pages: Arc::new(LocalFetcher::new(client.clone())),
        };
        Self::build(cfg, client, backends)
    }

    /// Like [`Beyond::new`] but with caller-provided completion/moderation/token/page backends.
    /// The search provider is still reached over HTTP.
    pub fn with_backends(cfg: Config, backends: Backends) -> Result<Self> {
        cfg.validate()?;
        let client = http_client(cfg.timeout_ms())?;
        Self::build(cfg, client, backends)
    }

    fn build(cfg: Config, client: reqwest::Client, backends: Backends) -> Result<Self> {
        Ok(Self {
            search: GoogleSearch::new(client, &cfg)?,
            context: ContextBuilder::new(backends.pages, backends.tokens, &cfg),
            engine: AnswerEngine::new(backends.completion, backends.moderation, &cfg),
            default_limit: cfg.default_limit.max(1),
            fetch_full_page: cfg.fetch_full_page,
            logger: cfg.logger,
        })
    }

    pub fn with_fetch_full_page(mut self, on: bool) -> Self {
        self.fetch_full_page = on;
        self
    }

    pub async fn search(&self, query: &str, limit: Option<usize>, safe: Option<SafeSearch>) -> Answer {
        let limit = limit.unwrap_or(self.default_limit);
        let safe = safe.unwrap_or_default();
        match self.run(query, limit, safe).await {
            Ok(answer) => answer,
            Err(e) => {
                if self.logger.log_errors {
                    warn!(error = %e, "search pipeline failed");
                }
                Failure::Unclassified.into()
            }
        }
    }

    async fn run(&self, query: &str, limit: usize, safe: SafeSearch) -> Result<Answer> {
        if self.logger.log_requests {
            info!(query, limit, safe = ?safe, "answering query");
        }

        let items = match self.search.fetch(query, limit, safe).await? {
            SearchOutcome::Results(items) => items,
            SearchOutcome::NoResults => return Ok(Failure::NoSearchResults.into()),
            SearchOutcome::RequestFailed { status } => {
                if self.logger.log_errors {
                    warn!(status, "search request failed");
                }
                return Ok(Failure::ProviderRequestFailed.into());
            }
            SearchOutcome::RateLimited { attempts } => {
                if self.logger.log_errors {
                    warn!(attempts, "every search api key is rate limited");
                }
                return Ok(Failure::AllProviderKeysRateLimited.into());
            }
        };

        let ctx = self.context.build(&items, self.fetch_full_page).await;
        if ctx.is_empty() {
            return Ok(Failure::NoSearchResults.into());
        }
        self.engine.answer(&ctx, query, safe).await
    }
}
