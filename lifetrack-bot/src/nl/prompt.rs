//! ChatML prompts for query generation, error recovery and clarification.

use once_cell::sync::Lazy;
use regex::Regex;

use super::llm::GenerationParams;
use super::rag::ScoredDocument;

const RECOVERY_TEMPERATURE: f32 = 0.2;

static FIELD_IN_ERROR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"Cannot query field "([^"]+)""#).unwrap());

const QUERY_SYSTEM_PROMPT: &str = "You translate requests for a personal productivity app into GraphQL.
Reply with exactly one GraphQL document and nothing else: no prose, no code fences.

Rules:
- Only use root fields and arguments that appear in the schema below.
- Dates use the placeholders TODAY_PLACEHOLDER, TOMORROW_PLACEHOLDER, WEEK_START_PLACEHOLDER, WEEK_END_PLACEHOLDER and MONTH_START_PLACEHOLDER.
- Refer to a skill by SKILL_ID_PLACEHOLDER and to the running session by ACTIVITY_ID_PLACEHOLDER; never invent ids.
- startSession takes only skillId and name.
- To stop, pause or resume the current session, query activeSession { id name status }.
- If the request is too vague to answer, reply with CLARIFY: followed by one short question.";

const RECOVERY_SYSTEM_PROMPT: &str = "You fix GraphQL documents that failed validation against a known schema.
Reply with exactly one corrected GraphQL document and nothing else: no prose, no code fences.
Only use fields and arguments that appear in the schema below. Keep placeholders such as TODAY_PLACEHOLDER and SKILL_ID_PLACEHOLDER unchanged.";

const CLARIFICATION_SYSTEM_PROMPT: &str =
    "Ask the user one short, friendly question that resolves the ambiguity in their request.";

/// Previous attempt fed back into a recovery prompt
#[derive(Debug, Clone, Copy)]
pub struct FailedAttempt<'a> {
    pub query: &'a str,
    pub error: &'a str,
}

/// Render one system/user exchange and open the assistant turn.
pub fn render_chatml(system: &str, user: &str, assistant_prefix: &str) -> String {
    format!(
        "<|im_start|>system\n{}<|im_end|>\n<|im_start|>user\n{}<|im_end|>\n<|im_start|>assistant\n{}",
        system.trim(),
        user.trim(),
        assistant_prefix.trim()
    )
}

pub struct PromptBuilder {
    max_tokens_query: u32,
    max_tokens_error: u32,
    temperature: f32,
    temperature_creative: f32,
}

impl PromptBuilder {
    pub fn new(max_tokens_query: u32, max_tokens_error: u32, temperature: f32, temperature_creative: f32) -> Self {
        Self {
            max_tokens_query,
            max_tokens_error,
            temperature,
            temperature_creative,
        }
    }

    /// Generation prompt, or a recovery prompt when a previous attempt
    /// failed validation.
    pub fn query_generation(
        &self,
        user_message: &str,
        schema_text: &str,
        examples_text: &str,
        failed: Option<FailedAttempt<'_>>,
    ) -> (String, GenerationParams) {
        let prompt = match failed {
            None => {
                let user = format!(
                    "SCHEMA:\n{}\n\nEXAMPLES:\n{}\n\nREQUEST: {}\n\nGraphQL:",
                    schema_text, examples_text, user_message
                );
                render_chatml(QUERY_SYSTEM_PROMPT, &user, "")
            }
            Some(attempt) => {
                let user = format!(
                    "SCHEMA:\n{}\n\nEXAMPLES:\n{}\n\nREQUEST: {}\n\nFAILED QUERY:\n{}\n\nVALIDATION ERROR: {}\nWHAT WENT WRONG: {}\n\nGUIDANCE:\n{}\n\nSTRATEGY: {}\n\nCorrected GraphQL:",
                    schema_text,
                    examples_text,
                    user_message,
                    attempt.query,
                    attempt.error,
                    explain_error(attempt.error),
                    error_guidance(attempt.error, attempt.query),
                    correction_strategy(attempt.error),
                );
                render_chatml(RECOVERY_SYSTEM_PROMPT, &user, "")
            }
        };

        let temperature = if failed.is_some() {
            self.temperature.max(RECOVERY_TEMPERATURE)
        } else {
            self.temperature
        };

        log::debug!("[PROMPT] Generated prompt length: {} chars", prompt.len());
        (prompt, GenerationParams::new(self.max_tokens_query, temperature))
    }

    pub fn clarification(&self, user_message: &str, ambiguity: &str) -> (String, GenerationParams) {
        let user = format!("Request: \"{}\"\nWhat is unclear: {}\n\nQuestion:", user_message, ambiguity);
        (
            render_chatml(CLARIFICATION_SYSTEM_PROMPT, &user, ""),
            GenerationParams::new(self.max_tokens_error, self.temperature_creative),
        )
    }

    pub fn error_explanation(&self, user_message: &str, error: &str) -> (String, GenerationParams) {
        let user = format!(
            "User asked: \"{}\"\nError: {}\n\nExplain and suggest action:",
            user_message, error
        );
        (
            render_chatml("Explain errors in a friendly way (max 2 sentences).", &user, ""),
            GenerationParams::new(self.max_tokens_error, self.temperature_creative),
        )
    }
}

pub fn extract_field_from_error(error: &str) -> String {
    FIELD_IN_ERROR
        .captures(error)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn error_guidance(error: &str, failed_query: &str) -> String {
    if failed_query.contains("startSession") {
        return "- startSession accepts only skillId and name\n\
                - Use SKILL_ID_PLACEHOLDER for skillId\n\
                - Do not pass startedAt, duration or nested objects"
            .to_string();
    }
    if error.contains("Cannot query field") {
        let field = extract_field_from_error(error);
        return format!(
            "- \"{}\" is not available where you used it\n\
             - Pick the closest field from the schema root summary\n\
             - Calendar entries come from events(startDate, endDate)",
            field
        );
    }
    "- Review the schema carefully\n- Follow the examples".to_string()
}

pub fn explain_error(error: &str) -> String {
    if error.contains("Cannot query field") {
        return format!(
            "The field '{}' doesn't exist at the Query root level.",
            extract_field_from_error(error)
        );
    }
    if error.contains("Unknown argument") {
        return "One or more arguments are not accepted by this field.".to_string();
    }
    if error.contains("Expected type") {
        return "Data type mismatch - check that values match expected types.".to_string();
    }
    "The query structure doesn't match the schema.".to_string()
}

pub fn correction_strategy(error: &str) -> &'static str {
    if error.contains("Cannot query field") {
        "Replace the unknown field with an existing one from the schema."
    } else if error.contains("Unknown argument") {
        "Remove the arguments the field does not declare."
    } else if error.contains("Expected type") {
        "Quote strings and dates, and match enum values exactly."
    } else {
        "Rewrite the query so every field and argument matches the schema."
    }
}

pub fn format_examples(examples: &[ScoredDocument]) -> String {
    if examples.is_empty() {
        return "No examples available.".to_string();
    }

    let mut lines = Vec::new();
    for (i, example) in examples.iter().enumerate() {
        lines.push(format!("# Example {}", i + 1));
        lines.push(format!(
            "# User says: \"{}\"",
            example.document.intent.as_deref().unwrap_or("Unknown intent")
        ));
        lines.push("# Generate this query:".to_string());
        lines.push(example.document.query.clone().unwrap_or_default());
        lines.push(String::new());
    }
    lines.join("\n")
}

pub fn format_schema(schema_parts: &[ScoredDocument]) -> String {
    if schema_parts.is_empty() {
        return "No schema information available.".to_string();
    }
    schema_parts
        .iter()
        .map(|p| p.document.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nl::rag::{DocumentKind, RagDocument};

    fn builder() -> PromptBuilder {
        PromptBuilder::new(384, 96, 0.1, 0.6)
    }

    fn example(intent: &str, query: &str) -> ScoredDocument {
        ScoredDocument {
            document: RagDocument {
                text: String::new(),
                kind: DocumentKind::Example,
                category: "general".into(),
                intent: Some(intent.into()),
                query: Some(query.into()),
                source: "examples".into(),
            },
            score: 0.5,
        }
    }

    #[test]
    fn test_query_generation_prompt_is_chatml() {
        let (prompt, params) = builder().query_generation(
            "Show me my skills",
            "type Query { skills: [Skill!]! }",
            "# Example\nquery { skills { id name } }",
            None,
        );
        assert!(prompt.starts_with("<|im_start|>system\n"));
        assert!(prompt.contains("<|im_start|>user\n"));
        assert!(prompt.ends_with("<|im_start|>assistant\n"));
        assert!(prompt.contains("REQUEST: Show me my skills"));
        assert_eq!(params.max_tokens, 384);
        assert_eq!(params.temperature, 0.1);
        assert!(params.stop.contains(&"<|im_end|>".to_string()));
    }

    #[test]
    fn test_recovery_prompt_carries_failure() {
        let (prompt, params) = builder().query_generation(
            "Show schedule",
            "type Query { events: [Event!]! }",
            "query { events { id title } }",
            Some(FailedAttempt {
                query: "query { schedule { id } }",
                error: r#"Cannot query field "schedule" on type "Query"."#,
            }),
        );
        assert!(prompt.contains("FAILED QUERY:\nquery { schedule { id } }"));
        assert!(prompt.contains("The field 'schedule' doesn't exist"));
        assert!(params.temperature >= 0.2);
    }

    #[test]
    fn test_error_guidance_prefers_start_session() {
        let guidance = error_guidance(r#"Unknown argument "duration""#, "mutation { startSession(duration: 5) { id } }");
        assert!(guidance.contains("skillId and name"));
        assert_eq!(extract_field_from_error("no field here"), "unknown");
    }

    #[test]
    fn test_format_examples_and_schema() {
        let text = format_examples(&[example("Show skills", "query { skills { id } }")]);
        assert_eq!(
            text,
            "# Example 1\n# User says: \"Show skills\"\n# Generate this query:\nquery { skills { id } }\n"
        );
        assert_eq!(format_examples(&[]), "No examples available.");
        assert_eq!(format_schema(&[]), "No schema information available.");
    }

    #[test]
    fn test_error_explanation_uses_creative_params() {
        let (prompt, params) = builder().error_explanation("stop", "not found");
        assert!(prompt.contains("Error: not found"));
        assert_eq!(params.max_tokens, 96);
        assert_eq!(params.temperature, 0.6);
    }
}
