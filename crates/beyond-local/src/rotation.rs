//! Sequential fallback across search API keys.
//!
//! Keys are tried strictly in order (primary, then fallbacks). Only HTTP 429 advances to the next
//! key; any other status, success or not, is handed back to the caller as-is. There is no backoff
//! and no second pass.

use beyond_core::{Error, LoggerConfig, Result};
use reqwest::StatusCode;
use tracing::{info, warn};

pub async fn fetch_with_rotation<F>(
    keys: &[String],
    logger: &LoggerConfig,
    build_request: F,
) -> Result<reqwest::Response>
where
    F: Fn(&str) -> reqwest::RequestBuilder,
{
    if keys.is_empty() {
        return Err(Error::NotConfigured("no search api keys".to_string()));
    }

    for (idx, key) in keys.iter().enumerate() {
        if logger.log_requests {
            info!(attempt = idx + 1, keys = keys.len(), "search request");
        }
        let resp = match build_request(key).send().await {
            Ok(r) => r,
            Err(e) => {
                if logger.log_errors {
                    warn!(attempt = idx + 1, error = %e, "search request failed");
                }
                return Err(Error::Search(e.to_string()));
            }
        };
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            if logger.log_errors {
                warn!(
                    attempt = idx + 1,
                    keys = keys.len(),
                    "search api key rate limited, trying next key"
                );
            }
            continue;
        }
        return Ok(resp);
    }

    Err(Error::AllKeysRateLimited {
        attempts: keys.len(),
    })
}
