use beyond_core::{
    ChatMessage, CompletionBackend, CompletionRequest, Config, Error, LoggerConfig,
    ModerationBackend, Result,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    organization: Option<String>,
    logger: LoggerConfig,
}

impl OpenAiClient {
    pub fn new(client: reqwest::Client, cfg: &Config) -> Result<Self> {
        let api_key = cfg.openai_api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(Error::NotConfigured("missing openai_api_key".to_string()));
        }
        Ok(Self {
            client,
            base_url: cfg.openai_base_url.clone(),
            api_key,
            organization: cfg.organization().map(str::to_string),
            logger: cfg.logger.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url.trim_end_matches('/'))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut rb = self
            .client
            .post(self.endpoint(path))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(org) = &self.organization {
            rb = rb.header("OpenAI-Organization", org);
        }
        rb
    }
}

#[async_trait::async_trait]
impl CompletionBackend for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<Option<String>> {
        let body = ChatCompletionsRequest {
            model: req.model.clone(),
            messages: req.messages.clone(),
            max_tokens: req.max_tokens,
            temperature: req.temperature,
        };
        if self.logger.log_requests {
            info!(model = %req.model, messages = req.messages.len(), "chat.completions request");
        }

        let resp = self
            .post("chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;
        let status = resp.status();
        if self.logger.log_responses {
            info!(status = status.as_u16(), "chat.completions response");
        }
        if !status.is_success() {
            return Err(Error::Llm(format!("openai chat.completions HTTP {status}")));
        }

        let parsed: ChatCompletionsResponse =
            resp.json().await.map_err(|e| Error::Llm(e.to_string()))?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|s| !s.trim().is_empty()))
    }
}

#[async_trait::async_trait]
impl ModerationBackend for OpenAiClient {
    async fn moderate(&self, input: &str) -> Result<Option<bool>> {
        if self.logger.log_requests {
            info!(chars = input.chars().count(), "moderations request");
        }
        let resp = self
            .post("moderations")
            .json(&ModerationRequest { input })
            .send()
            .await
            .map_err(|e| Error::Moderation(e.to_string()))?;
        let status = resp.status();
        if self.logger.log_responses {
            info!(status = status.as_u16(), "moderations response");
        }
        if !status.is_success() {
            return Err(Error::Moderation(format!("openai moderations HTTP {status}")));
        }

        let parsed: ModerationResponse = resp
            .json()
            .await
            .map_err(|e| Error::Moderation(e.to_string()))?;
        Ok(parsed.results.first().map(|r| r.flagged))
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    #[serde(default)]
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured {
        headers: Arc<Mutex<Vec<HeaderMap>>>,
        bodies: Arc<Mutex<Vec<serde_json::Value>>>,
    }

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client_for(addr: SocketAddr, org: Option<&str>) -> OpenAiClient {
        let mut cfg = Config::new("sk-test", "k1", "cx");
        cfg.openai_base_url = format!("http://{addr}/");
        cfg.openai_organization_id = org.map(str::to_string);
        OpenAiClient::new(reqwest::Client::new(), &cfg).unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![ChatMessage::assistant("ctx"), ChatMessage::user("q")],
            temperature: Some(0.2),
            max_tokens: None,
        }
    }

    #[test]
    fn missing_api_key_is_not_configured() {
        let cfg = Config::new(" ", "k1", "cx");
        let err = OpenAiClient::new(reqwest::Client::new(), &cfg).unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));
    }

    #[test]
    fn parses_choice_shapes() {
        let full: ChatCompletionsResponse = serde_json::from_str(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Paris."}}]}"#,
        )
        .unwrap();
        assert_eq!(
            full.choices[0].message.as_ref().unwrap().content.as_deref(),
            Some("Paris.")
        );
        let none: ChatCompletionsResponse = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert!(none.choices.is_empty());
    }

    #[tokio::test]
    async fn completion_sends_auth_org_and_messages() {
        let cap = Captured::default();
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(
                    |State(cap): State<Captured>, headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                        cap.headers.lock().unwrap().push(headers);
                        cap.bodies.lock().unwrap().push(body);
                        Json(serde_json::json!({
                            "choices": [{"message": {"role": "assistant", "content": "Paris."}}]
                        }))
                    },
                ),
            )
            .with_state(cap.clone());
        let addr = serve(app).await;

        let out = client_for(addr, Some("org-1"))
            .complete(&request())
            .await
            .unwrap();
        assert_eq!(out.as_deref(), Some("Paris."));

        let headers = cap.headers.lock().unwrap()[0].clone();
        assert_eq!(headers["authorization"], "Bearer sk-test");
        assert_eq!(headers["openai-organization"], "org-1");
        let body = cap.bodies.lock().unwrap()[0].clone();
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["messages"][0]["role"], "assistant");
        assert_eq!(body["messages"][0]["content"], "ctx");
        assert_eq!(body["messages"][1]["role"], "user");
        assert!(body.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn empty_or_missing_choices_are_no_completion() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                let reply = if body["messages"][1]["content"] == "blank" {
                    serde_json::json!({"choices": [{"message": {"content": "   "}}]})
                } else {
                    serde_json::json!({"choices": []})
                };
                Json(reply)
            }),
        );
        let addr = serve(app).await;
        let c = client_for(addr, None);
        assert_eq!(c.complete(&request()).await.unwrap(), None);
        let mut r = request();
        r.messages[1] = ChatMessage::user("blank");
        assert_eq!(c.complete(&r).await.unwrap(), None);
    }

    #[tokio::test]
    async fn completion_http_error_is_an_llm_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "{}") }),
        );
        let addr = serve(app).await;
        let err = client_for(addr, None)
            .complete(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
    }

    #[tokio::test]
    async fn moderation_reports_verdict_or_absence() {
        let app = Router::new().route(
            "/v1/moderations",
            post(|Json(body): Json<serde_json::Value>| async move {
                let reply = match body["input"].as_str().unwrap_or("") {
                    "bad" => serde_json::json!({"results": [{"flagged": true}]}),
                    "none" => serde_json::json!({"results": []}),
                    _ => serde_json::json!({"results": [{"flagged": false}]}),
                };
                Json(reply)
            }),
        );
        let addr = serve(app).await;
        let c = client_for(addr, None);
        assert_eq!(c.moderate("bad").await.unwrap(), Some(true));
        assert_eq!(c.moderate("fine").await.unwrap(), Some(false));
        assert_eq!(c.moderate("none").await.unwrap(), None);
    }
}
