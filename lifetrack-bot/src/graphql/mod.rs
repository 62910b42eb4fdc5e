//! LifeTrack backend access over GraphQL.

pub mod models;
pub mod queries;
pub mod resolve;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use models::AuthPayload;

#[derive(Debug, Clone, Error)]
pub enum GraphQLError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("{}", .messages.join("; "))]
    Query { messages: Vec<String> },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Resolution(String),
}

impl GraphQLError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GraphQLError::Timeout)
    }

    /// Case-insensitive substring match on the rendered error.
    pub fn mentions(&self, needle: &str) -> bool {
        self.to_string().to_lowercase().contains(&needle.to_lowercase())
    }
}

impl From<reqwest::Error> for GraphQLError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GraphQLError::Timeout
        } else {
            GraphQLError::Transport(e.to_string())
        }
    }
}

/// Runs a GraphQL document against the backend and returns its `data` object.
#[async_trait]
pub trait GraphQLExecutor: Send + Sync {
    async fn execute(
        &self,
        token: Option<&str>,
        query: &str,
        variables: Value,
    ) -> Result<Value, GraphQLError>;
}

#[derive(Debug, Deserialize)]
struct GraphQLResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQLErrorEntry>>,
}

#[derive(Debug, Deserialize)]
struct GraphQLErrorEntry {
    message: String,
}

/// HTTP client for the backend's `/query` endpoint
#[derive(Clone)]
pub struct GraphQLClient {
    client: Client,
    endpoint: String,
}

impl GraphQLClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, String> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl GraphQLExecutor for GraphQLClient {
    async fn execute(
        &self,
        token: Option<&str>,
        query: &str,
        variables: Value,
    ) -> Result<Value, GraphQLError> {
        let body = json!({ "query": query, "variables": variables });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        // gqlgen answers validation failures with 422 and a regular errors body
        let parsed: Result<GraphQLResponse, _> = serde_json::from_str(&text);
        let parsed = match parsed {
            Ok(p) => p,
            Err(e) if status.is_success() => return Err(GraphQLError::Decode(e.to_string())),
            Err(_) => {
                log::error!("[GRAPHQL] HTTP {} from backend: {}", status, text);
                return Err(GraphQLError::Http {
                    status: status.as_u16(),
                    body: text,
                });
            }
        };

        if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            log::warn!("[GRAPHQL] Query returned errors: {:?}", messages);
            return Err(GraphQLError::Query { messages });
        }

        parsed
            .data
            .ok_or_else(|| GraphQLError::Decode("response has no data".to_string()))
    }
}

/// A backend handle bound to one user's token.
#[derive(Clone)]
pub struct BackendSession {
    executor: Arc<dyn GraphQLExecutor>,
    token: Option<String>,
}

impl BackendSession {
    pub fn new(executor: Arc<dyn GraphQLExecutor>, token: Option<String>) -> Self {
        Self { executor, token }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub async fn execute(&self, query: &str, variables: Value) -> Result<Value, GraphQLError> {
        self.executor
            .execute(self.token.as_deref(), query, variables)
            .await
    }

    /// Execute and deserialize the top-level `field` of the result. A
    /// missing or `null` field yields `None`.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        field: &str,
    ) -> Result<Option<T>, GraphQLError> {
        let data = self.execute(query, variables).await?;
        take_field(data, field)
    }
}

pub fn take_field<T: DeserializeOwned>(mut data: Value, field: &str) -> Result<Option<T>, GraphQLError> {
    match data.get_mut(field).map(Value::take) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| GraphQLError::Decode(format!("{}: {}", field, e))),
    }
}

/// Exchange credentials for a token. The returned payload always carries one.
pub async fn login(
    executor: &dyn GraphQLExecutor,
    email: &str,
    password: &str,
) -> Result<AuthPayload, GraphQLError> {
    let result = executor
        .execute(
            None,
            queries::LOGIN,
            json!({ "email": email, "password": password }),
        )
        .await
        .and_then(|data| take_field::<AuthPayload>(data, "login"));

    match result {
        Ok(Some(payload)) if payload.token.as_deref().is_some_and(|t| !t.is_empty()) => {
            log::info!("[GRAPHQL] Login succeeded for {}", email);
            Ok(payload)
        }
        Ok(_) => {
            log::error!("[GRAPHQL] Login error for {}: no token received", email);
            Err(GraphQLError::Auth("Login failed: no token received".to_string()))
        }
        Err(e) => {
            log::error!("[GRAPHQL] Login error for {}: {}", email, e);
            Err(GraphQLError::Auth(format!("Login failed: {}", e)))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedExecutor;
    use super::*;

    #[tokio::test]
    async fn test_login_returns_payload_with_token() {
        let exec = ScriptedExecutor::new().on(
            "mutation Login",
            json!({ "login": { "token": "jwt-123", "user": { "id": "u1", "email": "a@b.c", "name": "Ann" } } }),
        );

        let payload = login(&exec, "a@b.c", "pw").await.unwrap();
        assert_eq!(payload.token.as_deref(), Some("jwt-123"));
        assert_eq!(payload.user.unwrap().id, "u1");

        let calls = exec.calls_matching("mutation Login");
        assert_eq!(calls[0].variables["email"], "a@b.c");
        assert!(calls[0].token.is_none());
    }

    #[tokio::test]
    async fn test_login_without_token_fails() {
        let exec = ScriptedExecutor::new().on("mutation Login", json!({ "login": { "token": null, "user": null } }));
        let err = login(&exec, "a@b.c", "pw").await.unwrap_err();
        assert_eq!(err.to_string(), "Login failed: no token received");
    }

    #[tokio::test]
    async fn test_login_wraps_backend_errors() {
        let exec = ScriptedExecutor::new().fail(
            "mutation Login",
            GraphQLError::Query { messages: vec!["invalid credentials".to_string()] },
        );
        let err = login(&exec, "a@b.c", "bad").await.unwrap_err();
        assert!(matches!(err, GraphQLError::Auth(_)));
        assert_eq!(err.to_string(), "Login failed: invalid credentials");
    }

    #[tokio::test]
    async fn test_session_passes_token_and_extracts_field() {
        let exec = Arc::new(ScriptedExecutor::new().on(
            "activeSession",
            json!({ "activeSession": { "id": "s1", "status": "ACTIVE", "duration": 75 } }),
        ));
        let session = BackendSession::new(exec.clone(), Some("tok".to_string()));

        let active: Option<models::ActivitySession> = session
            .fetch(queries::ACTIVE_SESSION, json!({}), "activeSession")
            .await
            .unwrap();
        assert_eq!(active.unwrap().duration, Some(75));
        assert_eq!(exec.calls.lock()[0].token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_take_field_null_is_none() {
        let value: Option<models::ActivitySession> =
            take_field(json!({ "activeSession": null }), "activeSession").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_error_mentions_is_case_insensitive() {
        let err = GraphQLError::Query {
            messages: vec!["You already have an active session".to_string()],
        };
        assert!(err.mentions("already have an active session"));
        assert!(!err.is_timeout());
        assert!(GraphQLError::Timeout.is_timeout());
    }
}
