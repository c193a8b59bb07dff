//! Completion call plus the moderation gate around it.
//!
//! One pass, no retries: compose -> complete -> (moderate) -> answer. Content that could not be
//! moderated is withheld, never released unchecked.

use beyond_core::{
    Answer, ChatMessage, CompletionBackend, CompletionRequest, Config, Failure, LoggerConfig,
    ModerationBackend, Result, SafeSearch, SearchContext,
};
use std::sync::Arc;
use tracing::warn;

/// Instruction sent as the user turn, followed by the query.
pub fn instruction(query: &str) -> String {
    format!(
        "Using only the information provided above, answer the following question. \
         Answer in the same language as the question.\n\nQuestion: {query}"
    )
}

pub struct AnswerEngine {
    completion: Arc<dyn CompletionBackend>,
    moderation: Arc<dyn ModerationBackend>,
    model: String,
    temperature: Option<f64>,
    max_tokens: Option<u64>,
    logger: LoggerConfig,
}

impl AnswerEngine {
    pub fn new(
        completion: Arc<dyn CompletionBackend>,
        moderation: Arc<dyn ModerationBackend>,
        cfg: &Config,
    ) -> Self {
        Self {
            completion,
            moderation,
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            logger: cfg.logger.clone(),
        }
    }

    pub fn compose(&self, ctx: &SearchContext, query: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::assistant(ctx.text.clone()),
                ChatMessage::user(instruction(query)),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Completion failures (transport, HTTP status) are returned as `Err`; every other branch is
    /// a finished [`Answer`].
    pub async fn answer(&self, ctx: &SearchContext, query: &str, safe: SafeSearch) -> Result<Answer> {
        let req = self.compose(ctx, query);
        let Some(text) = self.completion.complete(&req).await? else {
            if self.logger.log_errors {
                warn!(backend = self.completion.name(), "completion returned no usable choice");
            }
            return Ok(Failure::NoCompletionResponse.into());
        };

        if safe.moderated() {
            let input = moderation_input(&text, ctx);
            match self.moderation.moderate(&input).await {
                Ok(Some(false)) => {}
                Ok(Some(true)) => {
                    if self.logger.log_errors {
                        warn!("answer flagged by moderation; withholding");
                    }
                    return Ok(Failure::ContentFlagged.into());
                }
                Ok(None) => {
                    if self.logger.log_errors {
                        warn!("moderation returned no result; withholding");
                    }
                    return Ok(Failure::ModerationUnavailable.into());
                }
                Err(e) => {
                    if self.logger.log_errors {
                        warn!(error = %e, "moderation failed; withholding");
                    }
                    return Ok(Failure::ModerationUnavailable.into());
                }
            }
        }

        Ok(Answer::grounded(text, ctx))
    }
}

/// Answer text followed by the reference links, one per line.
fn moderation_input(answer: &str, ctx: &SearchContext) -> String {
    let mut out = answer.to_string();
    let links: Vec<&str> = if ctx.urls.is_empty() {
        vec![ctx.url.as_str()]
    } else {
        ctx.urls.iter().map(String::as_str).collect()
    };
    for l in links.into_iter().filter(|l| !l.is_empty()) {
        out.push('\n');
        out.push_str(l);
    }
    out
}
