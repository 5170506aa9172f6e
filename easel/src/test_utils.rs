//! Test utilities shared by the handler and application tests.

use axum_test::TestServer;
use serde_json::{Value, json};
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::Config;

pub const TEST_API_KEY: &str = "sk-test-key";
pub const TEST_SYSTEM_PROMPT: &str = "You are a friendly art critic.";

/// Config pointing the completion API at `completion_uri` and staging uploads in `temp_dir`
pub fn create_test_config(completion_uri: &str, temp_dir: &Path) -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.completion.base_url = format!("{completion_uri}/v1").parse().expect("mock server URI is a valid URL");
    config.completion.api_key = Some(TEST_API_KEY.to_string());
    config.completion.system_prompt = TEST_SYSTEM_PROMPT.to_string();
    config.images.temp_dir = Some(temp_dir.to_path_buf());
    config
}

pub fn create_test_server(config: Config) -> TestServer {
    crate::install_crypto_provider();
    crate::Application::new(config)
        .expect("Failed to create application")
        .into_test_server()
}

/// A minimal chat completion payload with one assistant choice
pub fn completion_payload(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20 }
    })
}

/// Mount a completion endpoint answering with `content`, expecting exactly `calls` requests
pub async fn mock_completion(server: &MockServer, content: &str, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_payload(content)))
        .expect(calls)
        .mount(server)
        .await;
}

/// Bodies of the completion requests the mock server received, in order
pub async fn completion_requests(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/v1/chat/completions")
        .map(|r| r.body_json::<Value>().expect("completion request body is JSON"))
        .collect()
}

/// `size` bytes that start with the PNG signature
pub fn png_bytes(size: usize) -> Vec<u8> {
    let signature = b"\x89PNG\r\n\x1a\n";
    let mut bytes = Vec::with_capacity(size.max(signature.len()));
    bytes.extend_from_slice(signature);
    bytes.resize(size.max(signature.len()), 0x42);
    bytes
}

pub fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).expect("temp dir is readable").count()
}
