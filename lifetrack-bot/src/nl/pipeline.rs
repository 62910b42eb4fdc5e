//! End-to-end handling of a free-text request: generate with retry,
//! execute, follow up on the running session, format.

use chrono::Local;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

use super::embed::HttpEmbedder;
use super::explain::ErrorExplainer;
use super::format::format_response;
use super::generator::{GenerationOutcome, QueryGenerator};
use super::llm::{CompletionClient, LanguageModel};
use super::prompt::{FailedAttempt, PromptBuilder};
use super::rag::RagStore;
use super::retry::{is_retryable, GiveUp, RetryDecision, RetryPolicy, RetryState};
use super::schema::SchemaValidator;
use crate::config::NlConfig;
use crate::graphql::resolve::execute_with_resolution;
use crate::graphql::{queries, BackendSession, GraphQLError};

/// How a request ended before formatting
#[derive(Debug)]
enum Answer {
    Data(Value),
    Clarify(String),
    Failed(String),
    /// Backend failure to be explained to the user
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionIntent {
    Stop,
    Pause,
    Resume,
}

impl SessionIntent {
    fn detect(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        if ["stop", "end", "finish", "complete"].iter().any(|w| lower.contains(w)) {
            Some(SessionIntent::Stop)
        } else if lower.contains("pause") {
            Some(SessionIntent::Pause)
        } else if lower.contains("resume") || lower.contains("continue") {
            Some(SessionIntent::Resume)
        } else {
            None
        }
    }

    fn mutation(self) -> &'static str {
        match self {
            SessionIntent::Stop => queries::FOLLOW_UP_STOP_SESSION,
            SessionIntent::Pause => queries::FOLLOW_UP_PAUSE_SESSION,
            SessionIntent::Resume => queries::FOLLOW_UP_RESUME_SESSION,
        }
    }
}

pub struct NlPipeline {
    generator: QueryGenerator,
    explainer: ErrorExplainer,
    policy: RetryPolicy,
}

impl NlPipeline {
    pub fn new(generator: QueryGenerator, explainer: ErrorExplainer, policy: RetryPolicy) -> Self {
        Self {
            generator,
            explainer,
            policy,
        }
    }

    /// Wire the pipeline to the configured completion and embedding servers.
    /// Builds the retrieval index on first use.
    pub async fn from_config(config: &NlConfig) -> Result<Self, String> {
        let llm: Arc<dyn LanguageModel> = Arc::new(CompletionClient::new(
            &config.llm_endpoint,
            &config.llm_model,
            &config.llm_api_key,
        )?);
        let embedder = Arc::new(HttpEmbedder::new(
            &config.embedding_endpoint,
            &config.embedding_model,
            &config.llm_api_key,
        )?);

        let rag = RagStore::open(
            Path::new(&config.schema_path),
            Path::new(&config.examples_path),
            Path::new(&config.rag_index_path),
            embedder,
        )
        .await?;

        let validator = match std::fs::read_to_string(&config.schema_path)
            .map_err(|e| format!("Failed to read schema {}: {}", config.schema_path, e))
            .and_then(|sdl| SchemaValidator::from_sdl(&sdl))
        {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("[NL] Query validation disabled: {}", e);
                None
            }
        };

        let prompts = Arc::new(PromptBuilder::new(
            config.max_tokens_query,
            config.max_tokens_error,
            config.temperature,
            config.temperature_creative,
        ));

        log::info!(
            "[NL] Pipeline ready: model {} at {}, {} retrieval documents",
            config.llm_model,
            config.llm_endpoint,
            rag.documents().len()
        );

        Ok(Self::new(
            QueryGenerator::new(llm.clone(), Arc::new(rag), prompts.clone(), validator),
            ErrorExplainer::new(Some(llm), prompts),
            RetryPolicy::new(config.max_attempts),
        ))
    }

    /// Answer one chat message. Never fails: every error becomes a reply.
    pub async fn handle(&self, backend: &BackendSession, message: &str) -> String {
        log::info!("[NL] Handling message: {}", message);

        match self.generate_and_execute(backend, message).await {
            Answer::Data(data) => {
                let data = follow_up_session(backend, message, data).await;
                format_response(&data)
            }
            Answer::Clarify(question) => format!("🤔 {}", question),
            Answer::Failed(text) => format!("❌ {}", text),
            Answer::Backend(error) => self.explainer.explain(&error, message).await,
        }
    }

    async fn generate_and_execute(&self, backend: &BackendSession, message: &str) -> Answer {
        let today = Local::now().date_naive();
        let mut context = self.policy.context();
        let mut last_failure: Option<(String, String)> = None;

        loop {
            log::info!(
                "[NL] Generating query (attempt {}/{})",
                context.attempt,
                context.max_attempts
            );
            let failed = last_failure
                .as_ref()
                .map(|(query, error)| FailedAttempt { query, error });
            let outcome = self.generator.generate(message, failed, today).await;
            context.transition(RetryState::Validating);

            let (query, error) = match outcome {
                GenerationOutcome::Clarify(question) => return Answer::Clarify(question),
                GenerationOutcome::Invalid { query, errors } => (query, errors.join("; ")),
                GenerationOutcome::Query(query) => {
                    log::info!("[NL] Executing generated query:\n{}", query);
                    match execute_with_resolution(backend, &query, json!({}), message).await {
                        Ok(data) => {
                            context.transition(RetryState::Succeeded);
                            return Answer::Data(data);
                        }
                        Err(GraphQLError::Resolution(text)) => return Answer::Failed(text),
                        Err(e @ (GraphQLError::Timeout | GraphQLError::Transport(_) | GraphQLError::Auth(_))) => {
                            log::error!("[NL] Backend unavailable: {}", e);
                            return Answer::Backend(e.to_string());
                        }
                        Err(e) => {
                            let error = e.to_string();
                            if !is_retryable(&error) {
                                return Answer::Backend(error);
                            }
                            log::warn!("[NL] Retryable execution error: {}", error);
                            match self.policy.on_failure(&mut context, &error, Some(&query)) {
                                RetryDecision::Retry => {
                                    last_failure = Some((query, error));
                                    continue;
                                }
                                RetryDecision::Stop(_) => return Answer::Backend(error),
                            }
                        }
                    }
                }
            };

            match self.policy.on_failure(&mut context, &error, Some(&query)) {
                RetryDecision::Retry => last_failure = Some((query, error)),
                RetryDecision::Stop(GiveUp::Exhausted) => {
                    return Answer::Failed(GiveUp::Exhausted.clarification().to_string());
                }
                RetryDecision::Stop(reason) => return Answer::Clarify(reason.clarification().to_string()),
            }
        }
    }
}

/// When the request resolved to the running session and the message asks
/// to stop, pause or resume it, run that mutation and return its result
/// instead. Falls back to the session itself on failure.
async fn follow_up_session(backend: &BackendSession, message: &str, data: Value) -> Value {
    let Some(session_id) = data
        .get("activeSession")
        .and_then(|s| s.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
    else {
        return data;
    };
    let Some(intent) = SessionIntent::detect(message) else {
        log::info!("[NL] No session intent in message, showing active session");
        return data;
    };

    log::info!("[NL] Following up on session {} with {:?}", session_id, intent);
    match backend.execute(intent.mutation(), json!({ "id": session_id })).await {
        Ok(result) => result,
        Err(e) => {
            log::error!("[NL] Session follow-up failed: {}", e);
            data
        }
    }
}
