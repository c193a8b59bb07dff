//! Turn ranked search results into a bounded grounding text.

use crate::extract;
use beyond_core::{
    Config, FetchBackend, FetchRequest, LoggerConfig, SearchContext, SearchResult, TokenCounter,
    MAX_CONTEXT_TOKENS,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Replace every ellipsis run (`...` or longer, or any run containing `…`) with one space.
/// Shorter dot runs such as `..` or a sentence-final `.` are kept.
pub fn normalize_snippet(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut run = String::new();
    let flush = |run: &mut String, out: &mut String| {
        if run.is_empty() {
            return;
        }
        if run.contains('…') || run.chars().count() >= 3 {
            out.push(' ');
        } else {
            out.push_str(run);
        }
        run.clear();
    };
    for c in s.chars() {
        if c == '.' || c == '…' {
            run.push(c);
        } else {
            flush(&mut run, &mut out);
            out.push(c);
        }
    }
    flush(&mut run, &mut out);
    out
}

/// First `max_chars` characters of `s`. Character-level, so it can cut mid-token.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

pub struct ContextBuilder {
    fetcher: Arc<dyn FetchBackend>,
    counter: Arc<dyn TokenCounter>,
    model: String,
    max_tokens: usize,
    timeout_ms: u64,
    max_page_bytes: u64,
    logger: LoggerConfig,
}

impl ContextBuilder {
    pub fn new(
        fetcher: Arc<dyn FetchBackend>,
        counter: Arc<dyn TokenCounter>,
        cfg: &Config,
    ) -> Self {
        Self {
            fetcher,
            counter,
            model: cfg.model.clone(),
            max_tokens: MAX_CONTEXT_TOKENS,
            timeout_ms: cfg.timeout_ms(),
            max_page_bytes: cfg.max_page_bytes,
            logger: cfg.logger.clone(),
        }
    }

    pub async fn build(&self, items: &[SearchResult], fetch_full_page: bool) -> SearchContext {
        let Some(first) = items.first() else {
            return SearchContext::default();
        };

        let snippets = items
            .iter()
            .map(|it| normalize_snippet(&it.snippet).trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        // Only the top result is ever fetched in full.
        let page = if fetch_full_page {
            self.page_text(&first.link).await
        } else {
            None
        };

        let mut text = match page {
            Some(p) if snippets.is_empty() => p,
            Some(p) => format!("{p} {snippets}"),
            None => snippets,
        };

        let tokens = self.counter.count(&text, &self.model);
        if tokens > self.max_tokens {
            if self.logger.log_responses {
                info!(tokens, budget = self.max_tokens, "context over budget, truncating");
            }
            text = truncate_chars(&text, self.max_tokens);
        }

        SearchContext {
            text,
            url: first.link.clone(),
            urls: items.iter().map(|it| it.link.clone()).collect(),
        }
    }

    async fn page_text(&self, url: &str) -> Option<String> {
        let req = FetchRequest {
            url: url.to_string(),
            timeout_ms: Some(self.timeout_ms),
            max_bytes: Some(self.max_page_bytes),
        };
        if self.logger.log_requests {
            info!(url, "page fetch");
        }
        let resp = match self.fetcher.fetch(&req).await {
            Ok(r) => r,
            Err(e) => {
                if self.logger.log_errors {
                    warn!(url, error = %e, "page fetch failed; using snippets only");
                }
                return None;
            }
        };
        if self.logger.log_responses {
            info!(url, status = resp.status, bytes = resp.bytes.len(), "page fetched");
        }
        if !resp.is_success() {
            if self.logger.log_errors {
                warn!(url, status = resp.status, "page fetch returned an error status");
            }
            return None;
        }
        let text = extract::page_text(&resp.text_lossy());
        (!text.is_empty()).then_some(text)
    }
}
