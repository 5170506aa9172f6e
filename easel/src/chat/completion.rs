//! Client for the OpenAI-compatible chat completion API.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::chat::prompt::PromptMessage;
use crate::config::CompletionConfig;
use crate::errors::{Error, Result, UpstreamService};

/// Shown when a chat request arrives and no completion credential is configured.
pub const MISSING_KEY_MESSAGE: &str = "Completion API key is missing.";

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
}

/// A successful completion payload, kept verbatim so it can be relayed unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    payload: Value,
}

impl Completion {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    /// The assistant text of the first choice, if the payload carries one
    pub fn content(&self) -> Option<&str> {
        self.payload.pointer("/choices/0/message/content").and_then(Value::as_str)
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }
}

#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("configured", &self.is_configured())
            .finish()
    }
}

impl CompletionClient {
    pub fn new(config: &CompletionConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.as_str().trim_end_matches('/')),
            api_key: config.api_key.clone().filter(|key| !key.trim().is_empty()),
            model: config.model.clone(),
            timeout: config.timeout,
        }
    }

    /// Whether a bearer credential is available
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Send one completion request. Failures are never retried.
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    pub async fn complete(&self, messages: &[PromptMessage]) -> Result<Completion> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(Error::Configuration {
                message: MISSING_KEY_MESSAGE.to_string(),
            });
        };

        let body = CompletionRequest {
            model: &self.model,
            messages,
        };

        let mut request = self.http.post(&self.endpoint).bearer_auth(api_key).json(&body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::upstream(UpstreamService::Completion, format!("request failed: {e}")))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| Error::upstream(UpstreamService::Completion, format!("HTTP {status} - failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(Error::upstream(UpstreamService::Completion, format!("HTTP {status} - {body_text}")));
        }

        let payload: Value = serde_json::from_str(&body_text).map_err(|e| {
            Error::upstream(
                UpstreamService::Completion,
                format!("HTTP {status} - failed to parse response as JSON: {e}"),
            )
        })?;

        debug!(status = %status, "Completion request succeeded");
        Ok(Completion::new(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::prompt::build_prompt;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str, api_key: Option<&str>) -> CompletionClient {
        crate::install_crypto_provider();
        let config = CompletionConfig {
            base_url: format!("{base_url}/v1").parse().unwrap(),
            api_key: api_key.map(str::to_string),
            model: "gpt-4o-mini".to_string(),
            timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        CompletionClient::new(&config, reqwest::Client::new())
    }

    fn reply(text: &str) -> Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": text }, "finish_reason": "stop" }]
        })
    }

    #[tokio::test]
    async fn test_complete_sends_model_messages_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({
                "model": "gpt-4o-mini",
                "messages": [
                    { "role": "system", "content": "Be brief." },
                    { "role": "user", "content": "Hi" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("Hello!")))
            .expect(1)
            .mount(&server)
            .await;

        let completion = client(&server.uri(), Some("sk-test"))
            .complete(&build_prompt("Be brief.", Some("Hi"), None))
            .await
            .unwrap();

        assert_eq!(completion.content(), Some("Hello!"));
        assert_eq!(completion.into_payload()["id"], "chatcmpl-1");
    }

    #[tokio::test]
    async fn test_non_success_status_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server.uri(), Some("sk-test"))
            .complete(&build_prompt("Be brief.", Some("Hi"), None))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Upstream { service: UpstreamService::Completion, .. }));
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let err = client(&server.uri(), Some("sk-test"))
            .complete(&build_prompt("Be brief.", Some("Hi"), None))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Upstream { .. }));
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("unused")))
            .expect(0)
            .mount(&server)
            .await;

        let client = client(&server.uri(), None);
        assert!(!client.is_configured());

        let err = client.complete(&build_prompt("Be brief.", Some("Hi"), None)).await.unwrap_err();
        assert_eq!(err.user_message(), MISSING_KEY_MESSAGE);
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        assert!(!client("http://localhost:1", Some("   ")).is_configured());
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        crate::install_crypto_provider();
        let config = CompletionConfig {
            base_url: "https://api.openai.com/v1/".parse().unwrap(),
            ..Default::default()
        };
        let client = CompletionClient::new(&config, reqwest::Client::new());

        assert_eq!(client.endpoint, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_content_absent() {
        let completion = Completion::new(json!({ "choices": [] }));
        assert_eq!(completion.content(), None);
    }
}
