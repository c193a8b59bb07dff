use crate::rotation::fetch_with_rotation;
use beyond_core::{Config, Error, LoggerConfig, Result, SafeSearch, SearchResult};
use serde::Deserialize;
use std::time::Instant;
use tracing::info;

/// Custom Search JSON API returns at most 10 items per request.
pub const MAX_RESULTS: usize = 10;

/// Typed outcome of one search. Only unexpected faults (transport, decode) are `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Results(Vec<SearchResult>),
    NoResults,
    RequestFailed { status: u16 },
    RateLimited { attempts: usize },
}

#[derive(Debug, Clone)]
pub struct GoogleSearch {
    client: reqwest::Client,
    endpoint: url::Url,
    engine_id: String,
    keys: Vec<String>,
    logger: LoggerConfig,
}

impl GoogleSearch {
    pub fn new(client: reqwest::Client, cfg: &Config) -> Result<Self> {
        let endpoint = url::Url::parse(&cfg.google_endpoint)
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let keys = cfg.search_keys();
        if keys.is_empty() {
            return Err(Error::NotConfigured(
                "missing google_search_api_key".to_string(),
            ));
        }
        Ok(Self {
            client,
            endpoint,
            engine_id: cfg.google_search_engine_id.trim().to_string(),
            keys,
            logger: cfg.logger.clone(),
        })
    }

    /// Request URL for one key. The query is percent-encoded by `url`.
    pub fn request_url(&self, key: &str, query: &str, limit: usize, safe: SafeSearch) -> url::Url {
        let mut u = self.endpoint.clone();
        {
            let mut qp = u.query_pairs_mut();
            qp.append_pair("key", key)
                .append_pair("cx", &self.engine_id)
                .append_pair("q", query)
                .append_pair("num", &limit.clamp(1, MAX_RESULTS).to_string());
            if let Some(s) = safe.query_value() {
                qp.append_pair("safe", s);
            }
        }
        u
    }

    pub async fn fetch(&self, query: &str, limit: usize, safe: SafeSearch) -> Result<SearchOutcome> {
        let t0 = Instant::now();
        let resp = match fetch_with_rotation(&self.keys, &self.logger, |key| {
            self.client.get(self.request_url(key, query, limit, safe))
        })
        .await
        {
            Ok(r) => r,
            Err(Error::AllKeysRateLimited { attempts }) => {
                return Ok(SearchOutcome::RateLimited { attempts })
            }
            Err(e) => return Err(e),
        };

        let status = resp.status();
        if self.logger.log_responses {
            info!(status = status.as_u16(), elapsed_ms = t0.elapsed().as_millis() as u64, "search response");
        }
        if status != reqwest::StatusCode::OK {
            return Ok(SearchOutcome::RequestFailed {
                status: status.as_u16(),
            });
        }

        let parsed: GoogleSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let results = parsed.into_results();
        if self.logger.log_responses {
            info!(results = results.len(), "search results parsed");
        }
        if results.is_empty() {
            return Ok(SearchOutcome::NoResults);
        }
        Ok(SearchOutcome::Results(results))
    }
}

#[derive(Debug, Deserialize)]
struct GoogleSearchResponse {
    items: Option<Vec<GoogleItem>>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
}

impl GoogleSearchResponse {
    fn into_results(self) -> Vec<SearchResult> {
        let mut out = Vec::new();
        for it in self.items.unwrap_or_default() {
            let Some(link) = it.link.filter(|l| !l.trim().is_empty()) else {
                continue;
            };
            out.push(SearchResult {
                title: it.title,
                link,
                snippet: it.snippet.unwrap_or_default(),
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Query,
        http::{header, StatusCode as AxumStatus},
        routing::get,
        Router,
    };
    use std::collections::HashMap;
    use std::net::SocketAddr;

    fn cfg(endpoint: &str, keys: &[&str]) -> Config {
        let mut c = Config::new("sk", keys[0], "engine-1");
        c.multiple_search_api_keys = keys[1..].iter().map(|s| s.to_string()).collect();
        c.google_endpoint = endpoint.to_string();
        c
    }

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[test]
    fn parses_minimal_google_shape_and_keeps_order() {
        let js = r#"
        {
          "kind": "customsearch#search",
          "items": [
            {"title":"A","link":"https://a.example","snippet":"first"},
            {"link":"https://b.example","snippet":"second"},
            {"title":"no link","snippet":"dropped"},
            {"title":"C","link":"https://c.example"}
          ]
        }
        "#;
        let parsed: GoogleSearchResponse = serde_json::from_str(js).unwrap();
        let rs = parsed.into_results();
        assert_eq!(rs.len(), 3);
        assert_eq!(rs[0].link, "https://a.example");
        assert_eq!(rs[0].title.as_deref(), Some("A"));
        assert_eq!(rs[1].title, None);
        assert_eq!(rs[2].snippet, "");
    }

    #[test]
    fn missing_items_parse_as_empty() {
        let parsed: GoogleSearchResponse =
            serde_json::from_str(r#"{"searchInformation":{"totalResults":"0"}}"#).unwrap();
        assert!(parsed.into_results().is_empty());
    }

    #[test]
    fn request_url_encodes_query_and_forwards_safety() {
        let g = GoogleSearch::new(
            reqwest::Client::new(),
            &cfg("https://search.example/customsearch/v1", &["k1"]),
        )
        .unwrap();

        let u = g.request_url("k1", "capital of France & more", 3, SafeSearch::Active);
        let pairs: HashMap<String, String> = u.query_pairs().into_owned().collect();
        assert_eq!(pairs["key"], "k1");
        assert_eq!(pairs["cx"], "engine-1");
        assert_eq!(pairs["q"], "capital of France & more");
        assert_eq!(pairs["num"], "3");
        assert_eq!(pairs["safe"], "active");
        assert!(!u.as_str().contains("capital of"));

        let u = g.request_url("k1", "q", 50, SafeSearch::ProviderDefault);
        let pairs: HashMap<String, String> = u.query_pairs().into_owned().collect();
        assert_eq!(pairs["num"], "10");
        assert!(!pairs.contains_key("safe"));

        let u = g.request_url("k1", "q", 0, SafeSearch::Off);
        let pairs: HashMap<String, String> = u.query_pairs().into_owned().collect();
        assert_eq!(pairs["num"], "1");
        assert_eq!(pairs["safe"], "off");
    }

    #[tokio::test]
    async fn fetch_maps_statuses_and_bodies_to_outcomes() {
        let app = Router::new().route(
            "/v1",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                let body = match q.get("q").map(String::as_str) {
                    Some("hits") => {
                        r#"{"items":[{"title":"T","link":"https://x/1","snippet":"S"}]}"#
                    }
                    Some("empty") => r#"{"items":[]}"#,
                    Some("absent") => r#"{}"#,
                    _ => return (AxumStatus::FORBIDDEN, [(header::CONTENT_TYPE, "application/json")], "{}"),
                };
                (AxumStatus::OK, [(header::CONTENT_TYPE, "application/json")], body)
            }),
        );
        let addr = serve(app).await;
        let g = GoogleSearch::new(
            reqwest::Client::new(),
            &cfg(&format!("http://{addr}/v1"), &["k1"]),
        )
        .unwrap();

        let out = g.fetch("hits", 5, SafeSearch::Off).await.unwrap();
        assert_eq!(
            out,
            SearchOutcome::Results(vec![SearchResult {
                title: Some("T".to_string()),
                link: "https://x/1".to_string(),
                snippet: "S".to_string(),
            }])
        );
        assert_eq!(
            g.fetch("empty", 5, SafeSearch::Off).await.unwrap(),
            SearchOutcome::NoResults
        );
        assert_eq!(
            g.fetch("absent", 5, SafeSearch::Off).await.unwrap(),
            SearchOutcome::NoResults
        );
        assert_eq!(
            g.fetch("denied", 5, SafeSearch::Off).await.unwrap(),
            SearchOutcome::RequestFailed { status: 403 }
        );
    }

    #[tokio::test]
    async fn fetch_reports_rate_limited_when_every_key_is_exhausted() {
        let app = Router::new().route(
            "/v1",
            get(|| async { (AxumStatus::TOO_MANY_REQUESTS, "{}") }),
        );
        let addr = serve(app).await;
        let g = GoogleSearch::new(
            reqwest::Client::new(),
            &cfg(&format!("http://{addr}/v1"), &["k1", "k2"]),
        )
        .unwrap();
        assert_eq!(
            g.fetch("anything", 5, SafeSearch::Off).await.unwrap(),
            SearchOutcome::RateLimited { attempts: 2 }
        );
    }

    #[tokio::test]
    async fn undecodable_body_is_an_error() {
        let app = Router::new().route("/v1", get(|| async { "<html>not json</html>" }));
        let addr = serve(app).await;
        let g = GoogleSearch::new(
            reqwest::Client::new(),
            &cfg(&format!("http://{addr}/v1"), &["k1"]),
        )
        .unwrap();
        let err = g.fetch("q", 5, SafeSearch::Off).await.unwrap_err();
        assert!(matches!(err, Error::Search(_)));
    }
}
