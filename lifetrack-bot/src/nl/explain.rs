//! User-facing explanations for failed requests.

use std::sync::Arc;

use super::llm::LanguageModel;
use super::prompt::PromptBuilder;

const MAX_EXPLANATION_CHARS: usize = 200;
const GENERIC_GRAPHQL_PREFIX: &str = "❌ Sorry, I encountered an issue";

/// Canned explanation for a backend error message
pub fn explain_graphql_error(message: &str) -> String {
    let lower = message.to_lowercase();

    if lower.contains("failed to fetch skill") {
        return "❌ I couldn't find that skill. Try starting a learning session to create it first.".to_string();
    }
    if lower.contains("already have an active session") {
        return "❌ You already have a session running. Stop your current session before starting a new one."
            .to_string();
    }
    if lower.contains("not found") {
        return "❌ I couldn't find what you're looking for. Please double-check and try again.".to_string();
    }
    if lower.contains("invalid") {
        return "❌ Something in your request wasn't valid. Could you try rephrasing it?".to_string();
    }
    if lower.contains("unauthorized") {
        return "❌ I don't have permission to access that. Please check your settings.".to_string();
    }

    let clipped: String = message.chars().take(100).collect();
    format!("{}: {}", GENERIC_GRAPHQL_PREFIX, clipped)
}

/// Used when the model cannot explain an error
pub fn fallback_explanation(message: &str) -> String {
    let lower = message.to_lowercase();

    if lower.contains("not found") {
        "❌ I couldn't find what you're looking for. Please check and try again."
    } else if lower.contains("already") && lower.contains("active") {
        "❌ You already have an active session running. Stop it before starting a new one."
    } else if lower.contains("failed to fetch") {
        "❌ I had trouble getting your data. Please try again in a moment."
    } else if lower.contains("invalid") {
        "❌ Something about your request wasn't quite right. Could you rephrase it?"
    } else if lower.contains("unauthorized") || lower.contains("permission") {
        "❌ I don't have permission to do that. Please check your settings."
    } else {
        "❌ Sorry, something went wrong. Please try again or rephrase your request."
    }
    .to_string()
}

/// Strip quotes and keep the explanation short enough for one chat line.
pub fn tidy_explanation(raw: &str) -> String {
    let cleaned = raw.replace('"', "").trim().to_string();
    if cleaned.chars().count() > MAX_EXPLANATION_CHARS {
        let clipped: String = cleaned.chars().take(MAX_EXPLANATION_CHARS - 3).collect();
        format!("{}...", clipped)
    } else {
        cleaned
    }
}

pub struct ErrorExplainer {
    model: Option<Arc<dyn LanguageModel>>,
    prompts: Arc<PromptBuilder>,
}

impl ErrorExplainer {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, prompts: Arc<PromptBuilder>) -> Self {
        Self { model, prompts }
    }

    /// Canned text for recognised backend errors, otherwise a model
    /// explanation, otherwise a pattern-based fallback.
    pub async fn explain(&self, error: &str, user_message: &str) -> String {
        let quick = explain_graphql_error(error);
        if !quick.starts_with(GENERIC_GRAPHQL_PREFIX) {
            return quick;
        }

        let Some(model) = &self.model else {
            return fallback_explanation(error);
        };

        let (prompt, params) = self.prompts.error_explanation(user_message, error);
        match model.complete(&prompt, &params).await {
            Ok(text) if !text.trim().is_empty() => format!("❌ {}", tidy_explanation(&text)),
            Ok(_) => fallback_explanation(error),
            Err(e) => {
                log::error!("[EXPLAIN] LLM error explanation failed: {}", e);
                fallback_explanation(error)
            }
        }
    }
}
