use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stop tokens that close a ChatML turn
pub const CHATML_STOP: [&str; 2] = ["<|im_end|>", "<|im_start|>"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: Vec<String>,
}

impl GenerationParams {
    pub fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
            top_p: 0.9,
            stop: CHATML_STOP.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Raw text completion over a rendered prompt
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, String>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stop: &'a [String],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Client for an OpenAI-compatible `/v1/completions` endpoint, such as a
/// local llama.cpp server.
#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    endpoint: String,
    model: String,
}

impl CompletionClient {
    pub fn new(endpoint: &str, model: &str, api_key: &str) -> Result<Self, String> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        // Local servers usually run without a key
        if !api_key.is_empty() {
            let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?;
            headers.insert(header::AUTHORIZATION, auth_value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl LanguageModel for CompletionClient {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, String> {
        let request = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            stop: &params.stop,
        };

        log::debug!(
            "[LLM] Sending completion request to {} ({} prompt chars)",
            self.endpoint,
            prompt.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("Completion request failed: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read completion response: {}", e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            log::error!("[LLM] Completion API error ({}): {}", status, message);
            return Err(format!("Completion API error ({}): {}", status, message));
        }

        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| format!("Failed to parse completion response: {}", e))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.text.trim().to_string())
            .ok_or_else(|| "Completion response has no choices".to_string())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays canned completions in order and records every prompt.
    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, String>>>,
        pub prompts: Mutex<Vec<(String, GenerationParams)>>,
    }

    impl ScriptedModel {
        pub fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(error: &str) -> Self {
            Self {
                replies: Mutex::new(VecDeque::from([Err(error.to_string())])),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().len()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, String> {
            self.prompts.lock().push((prompt.to_string(), params.clone()));
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err("no scripted completion left".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_stop_on_chatml() {
        let params = GenerationParams::new(384, 0.1);
        assert_eq!(params.stop, vec!["<|im_end|>", "<|im_start|>"]);
        assert_eq!(params.top_p, 0.9);
    }

    #[test]
    fn test_request_serializes_stop_list() {
        let stop = vec!["<|im_end|>".to_string()];
        let request = CompletionRequest {
            model: "qwen",
            prompt: "hi",
            max_tokens: 16,
            temperature: 0.1,
            top_p: 0.9,
            stop: &stop,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stop"][0], "<|im_end|>");
        assert_eq!(value["max_tokens"], 16);
    }

    #[test]
    fn test_client_rejects_bad_key() {
        assert!(CompletionClient::new("http://localhost/v1/completions", "m", "bad\nkey").is_err());
        assert!(CompletionClient::new("http://localhost/v1/completions", "m", "").is_ok());
    }
}
