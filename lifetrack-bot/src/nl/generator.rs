//! One generation attempt: retrieval, prompt, completion, extraction,
//! placeholder processing and validation.

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::{Captures, Regex};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::llm::LanguageModel;
use super::prompt::{format_examples, format_schema, FailedAttempt, PromptBuilder};
use super::rag::{RagContext, RagStore, DEFAULT_MAX_EXAMPLES};
use super::schema::SchemaValidator;

const METRICS_LOG_EVERY: u64 = 10;

pub const EXTRACTION_FAILED: &str = "I couldn't generate a valid query. Could you rephrase?";
pub const MODEL_FAILED: &str = "I couldn't understand that. Could you rephrase your request?";
const DEFAULT_CLARIFICATION: &str = "Could you provide more details?";

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(?:graphql|gql)?\s*(.*?)```").unwrap());
static CONVERSATIONAL_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(Sure[,!]?\s*|Here's\s+|Here is\s+|Yes[,!]?\s*|Okay[,!]?\s*|Certainly[,!]?\s*)+").unwrap()
});
static OPERATION_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(query|mutation)\b").unwrap());
static BARE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"((?:start|end)?(?:Date|Time|At)|date|time|createdAt|updatedAt|pausedAt)(:\s*)(\d{4}-\d{2}-\d{2}(?:T[\d:]+(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})?)?)",
    )
    .unwrap()
});
static START_SESSION_BAD_ARGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(startedAt|endedAt|duration|date|pausedAt|pausedDuration|createdAt|updatedAt):[^\n]*\n",
    )
    .unwrap()
});
static START_SESSION_NESTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(skill|user|activity):\s*\{[^{}]*\}\s*,?").unwrap());

/// Result of a single attempt
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// Extracted and, when a schema is loaded, validated
    Query(String),
    /// A question for the user instead of a query
    Clarify(String),
    /// Extracted but rejected by the schema validator
    Invalid { query: String, errors: Vec<String> },
}

/// What the model's raw reply turned into
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    Query(String),
    Clarify(String),
}

#[derive(Debug, Default, Clone)]
pub struct GenerationMetrics {
    pub total: u64,
    pub succeeded: u64,
    pub validation_failures: u64,
    pub total_time: Duration,
    rag_score_sum: f64,
    rag_score_count: u64,
}

impl GenerationMetrics {
    pub fn record(&mut self, outcome: &GenerationOutcome, elapsed: Duration, rag_scores: &[f32]) {
        self.total += 1;
        self.total_time += elapsed;
        match outcome {
            GenerationOutcome::Query(_) => self.succeeded += 1,
            GenerationOutcome::Invalid { .. } => self.validation_failures += 1,
            GenerationOutcome::Clarify(_) => {}
        }
        self.rag_score_sum += rag_scores.iter().map(|s| *s as f64).sum::<f64>();
        self.rag_score_count += rag_scores.len() as u64;
    }

    pub fn success_rate(&self) -> f64 {
        ratio(self.succeeded, self.total)
    }

    pub fn validation_failure_rate(&self) -> f64 {
        ratio(self.validation_failures, self.total)
    }

    pub fn average_time(&self) -> Duration {
        if self.total == 0 {
            Duration::ZERO
        } else {
            self.total_time / self.total as u32
        }
    }

    pub fn average_rag_score(&self) -> f64 {
        if self.rag_score_count == 0 {
            0.0
        } else {
            self.rag_score_sum / self.rag_score_count as f64
        }
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

pub struct QueryGenerator {
    llm: Arc<dyn LanguageModel>,
    rag: Arc<RagStore>,
    prompts: Arc<PromptBuilder>,
    validator: Option<SchemaValidator>,
    metrics: Mutex<GenerationMetrics>,
}

impl QueryGenerator {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        rag: Arc<RagStore>,
        prompts: Arc<PromptBuilder>,
        validator: Option<SchemaValidator>,
    ) -> Self {
        Self {
            llm,
            rag,
            prompts,
            validator,
            metrics: Mutex::new(GenerationMetrics::default()),
        }
    }

    pub fn metrics(&self) -> GenerationMetrics {
        self.metrics.lock().clone()
    }

    pub async fn generate(
        &self,
        user_message: &str,
        failed: Option<FailedAttempt<'_>>,
        today: NaiveDate,
    ) -> GenerationOutcome {
        let started = Instant::now();

        // Recovery prompts search with the failed query too, so the schema
        // parts for the fields it touched come back
        let search_text = match failed {
            Some(attempt) => format!("{} {}", user_message, attempt.query),
            None => user_message.to_string(),
        };
        let context = match self.rag.relevant_context(&search_text, DEFAULT_MAX_EXAMPLES).await {
            Ok(context) => context,
            Err(e) => {
                log::warn!("[NL] Retrieval failed, generating without context: {}", e);
                RagContext::default()
            }
        };
        let rag_scores = context.example_scores();
        log::debug!("[NL] Retrieved example scores: {:?}", rag_scores);

        let (prompt, params) = self.prompts.query_generation(
            user_message,
            &format_schema(&context.schema_parts),
            &format_examples(&context.examples),
            failed,
        );

        let outcome = match self.llm.complete(&prompt, &params).await {
            Ok(raw) => {
                log::debug!("[NL] Raw completion: {}", raw);
                match parse_response(&raw) {
                    Some(ParsedResponse::Clarify(question)) => GenerationOutcome::Clarify(question),
                    Some(ParsedResponse::Query(query)) => self.check(process_placeholders(&query, today)),
                    None => {
                        log::warn!("[NL] Could not extract a query from: {}", raw);
                        GenerationOutcome::Clarify(EXTRACTION_FAILED.to_string())
                    }
                }
            }
            Err(e) => {
                log::error!("[NL] Completion failed: {}", e);
                GenerationOutcome::Clarify(MODEL_FAILED.to_string())
            }
        };

        self.record(&outcome, started.elapsed(), &rag_scores);
        outcome
    }

    fn check(&self, query: String) -> GenerationOutcome {
        let Some(validator) = &self.validator else {
            return GenerationOutcome::Query(query);
        };
        let errors = validator.validate(&query);
        if errors.is_empty() {
            GenerationOutcome::Query(query)
        } else {
            log::info!("[NL] Generated query failed validation: {}", errors.join("; "));
            GenerationOutcome::Invalid { query, errors }
        }
    }

    fn record(&self, outcome: &GenerationOutcome, elapsed: Duration, rag_scores: &[f32]) {
        let mut metrics = self.metrics.lock();
        metrics.record(outcome, elapsed, rag_scores);
        if metrics.total % METRICS_LOG_EVERY == 0 {
            log::info!(
                "[NL] Metrics after {} generations: success {:.1}%, validation failures {:.1}%, avg time {:?}, avg RAG score {:.3}",
                metrics.total,
                metrics.success_rate() * 100.0,
                metrics.validation_failure_rate() * 100.0,
                metrics.average_time(),
                metrics.average_rag_score()
            );
        }
    }
}

/// Pull a single GraphQL document (or a clarification) out of free-form
/// model output. `None` when nothing usable is found.
pub fn parse_response(raw: &str) -> Option<ParsedResponse> {
    let text = raw.trim();

    if let Some(rest) = text.strip_prefix("CLARIFY:") {
        let question = rest.trim();
        return Some(ParsedResponse::Clarify(if question.is_empty() {
            DEFAULT_CLARIFICATION.to_string()
        } else {
            question.to_string()
        }));
    }

    let unfenced = match CODE_FENCE.captures(text) {
        Some(c) => c[1].trim().to_string(),
        None => text.to_string(),
    };
    let cleaned = CONVERSATIONAL_PREFIX.replace(&unfenced, "");

    let start = OPERATION_START
        .find(&cleaned)
        .map(|m| m.start())
        .or_else(|| cleaned.find('{'))?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }
    let candidate = cleaned[start..=end].trim();

    let opening = candidate.matches('{').count();
    let closing = candidate.matches('}').count();
    if opening == 0 || opening != closing {
        log::warn!("[NL] Unbalanced braces in generated query ({} vs {})", opening, closing);
        return None;
    }
    Some(ParsedResponse::Query(candidate.to_string()))
}

/// Replace date placeholders, quote bare ISO dates, and drop arguments
/// `startSession` does not accept.
pub fn process_placeholders(query: &str, today: NaiveDate) -> String {
    let week_start = today - ChronoDuration::days(today.weekday().num_days_from_monday() as i64);
    let week_end = week_start + ChronoDuration::days(6);
    let month_start = today.with_day(1).unwrap_or(today);
    let iso = |d: NaiveDate| d.format("%Y-%m-%d").to_string();

    let mut processed = query.to_string();
    for (placeholder, date) in [
        ("TODAY_PLACEHOLDER", iso(today)),
        ("TOMORROW_PLACEHOLDER", iso(today + ChronoDuration::days(1))),
        ("WEEK_START_PLACEHOLDER", iso(week_start)),
        ("WEEK_END_PLACEHOLDER", iso(week_end)),
        ("MONTH_START_PLACEHOLDER", iso(month_start)),
    ] {
        processed = processed.replace(&format!("\"{}\"", placeholder), &date);
        processed = processed.replace(placeholder, &date);
    }

    processed = BARE_DATE
        .replace_all(&processed, |c: &Captures| format!("{}{}\"{}\"", &c[1], &c[2], &c[3]))
        .into_owned();

    if processed.contains("startSession") {
        processed = START_SESSION_BAD_ARGS.replace_all(&processed, "").into_owned();
        processed = START_SESSION_NESTED.replace_all(&processed, "").into_owned();
    }
    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nl::embed::testing::KeywordEmbedder;
    use crate::nl::llm::testing::ScriptedModel;

    const SDL: &str = "
scalar UUID
scalar Date

type Query {
  skills: [Skill!]!
  events(startDate: Date!, endDate: Date!): [Event!]!
}

type Skill {
  id: UUID!
  name: String!
}

type Event {
  id: UUID!
  title: String!
}
";

    const EXAMPLES: &str = r#"
examples:
  - intent: "Show my skills"
    query: "query { skills { id name } }"
  - intent: "What events do I have today"
    query: "query { events(startDate: TODAY_PLACEHOLDER, endDate: TODAY_PLACEHOLDER) { title } }"
"#;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn generator(model: Arc<ScriptedModel>) -> QueryGenerator {
        let embedder = Arc::new(KeywordEmbedder::new(&["skills", "events", "today"]));
        let rag = RagStore::build(SDL, EXAMPLES, embedder).await.unwrap();
        QueryGenerator::new(
            model,
            Arc::new(rag),
            Arc::new(PromptBuilder::new(384, 96, 0.1, 0.6)),
            Some(SchemaValidator::from_sdl(SDL).unwrap()),
        )
    }

    #[test]
    fn test_parse_strips_fences_and_chatter() {
        let raw = "Sure! Here's the query:\n```graphql\nquery {\n  skills { id name }\n}\n```\nLet me know!";
        assert_eq!(
            parse_response(raw),
            Some(ParsedResponse::Query("query {\n  skills { id name }\n}".to_string()))
        );

        assert_eq!(
            parse_response("Okay, { skills { id } }"),
            Some(ParsedResponse::Query("{ skills { id } }".to_string()))
        );
    }

    #[test]
    fn test_parse_clarify_and_failures() {
        assert_eq!(
            parse_response("CLARIFY: Which skill?"),
            Some(ParsedResponse::Clarify("Which skill?".to_string()))
        );
        assert_eq!(
            parse_response("CLARIFY:"),
            Some(ParsedResponse::Clarify("Could you provide more details?".to_string()))
        );
        assert_eq!(parse_response("I am not sure what you mean."), None);
        assert_eq!(parse_response("query { skills { id }"), None);
    }

    #[test]
    fn test_date_placeholders() {
        // Wednesday
        let today = date(2026, 2, 11);
        let query = process_placeholders(
            "query { events(startDate: WEEK_START_PLACEHOLDER, endDate: \"WEEK_END_PLACEHOLDER\") { title } }",
            today,
        );
        assert_eq!(
            query,
            "query { events(startDate: \"2026-02-09\", endDate: \"2026-02-15\") { title } }"
        );

        let query = process_placeholders("{ a(date: TOMORROW_PLACEHOLDER, from: MONTH_START_PLACEHOLDER) }", today);
        assert_eq!(query, "{ a(date: \"2026-02-12\", from: 2026-02-01) }");
    }

    #[test]
    fn test_bare_timestamps_are_quoted_once() {
        let query = process_placeholders(
            "mutation { createEvent(input: { startTime: 2026-02-11T09:30:00Z, endTime: \"2026-02-11T10:00:00Z\" }) { id } }",
            date(2026, 2, 11),
        );
        assert_eq!(
            query,
            "mutation { createEvent(input: { startTime: \"2026-02-11T09:30:00Z\", endTime: \"2026-02-11T10:00:00Z\" }) { id } }"
        );
    }

    #[test]
    fn test_start_session_arguments_are_stripped() {
        let query = "mutation {\n  startSession(input: {\n    skillId: SKILL_ID_PLACEHOLDER\n    name: \"Rust\"\n    duration: 30\n    startedAt: TODAY_PLACEHOLDER\n    skill: { name: \"Rust\" }\n  }) { id }\n}";
        let processed = process_placeholders(query, date(2026, 2, 11));
        assert!(processed.contains("skillId: SKILL_ID_PLACEHOLDER"));
        assert!(processed.contains("name: \"Rust\"\n"));
        assert!(!processed.contains("duration"));
        assert!(!processed.contains("startedAt"));
        assert!(!processed.contains("skill: {"));
    }

    #[test]
    fn test_bundled_examples_validate_against_bundled_schema() {
        let validator = SchemaValidator::from_sdl(include_str!("../../schemas/schema.graphqls")).unwrap();
        let examples =
            crate::nl::rag::parse_examples(include_str!("../../schemas/graphql_examples.yaml")).unwrap();
        assert!(examples.len() >= 10);
        for example in examples {
            let query = process_placeholders(&example.query, date(2026, 2, 11));
            let errors = validator.validate(&query);
            assert!(errors.is_empty(), "{}: {:?}", example.intent, errors);
        }
    }

    #[tokio::test]
    async fn test_generate_valid_query_and_metrics() {
        let model = Arc::new(ScriptedModel::new(["```graphql\nquery { skills { id name } }\n```"]));
        let generator = generator(model.clone()).await;

        let outcome = generator.generate("Show my skills", None, date(2026, 2, 11)).await;
        assert_eq!(outcome, GenerationOutcome::Query("query { skills { id name } }".to_string()));

        let prompt = &model.prompts.lock()[0].0;
        assert!(prompt.contains("REQUEST: Show my skills"));
        assert!(prompt.contains("# User says: \"Show my skills\""));

        let metrics = generator.metrics();
        assert_eq!(metrics.total, 1);
        assert_eq!(metrics.success_rate(), 1.0);
    }

    #[tokio::test]
    async fn test_generate_reports_validation_errors() {
        let model = Arc::new(ScriptedModel::new(["query { schedule { id } }"]));
        let generator = generator(model).await;

        match generator.generate("Show my schedule", None, date(2026, 2, 11)).await {
            GenerationOutcome::Invalid { query, errors } => {
                assert_eq!(query, "query { schedule { id } }");
                assert_eq!(errors, vec![r#"Cannot query field "schedule" on type "Query"."#]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(generator.metrics().validation_failure_rate(), 1.0);
    }

    #[tokio::test]
    async fn test_generate_model_failure_asks_to_rephrase() {
        let generator = generator(Arc::new(ScriptedModel::failing("connection refused"))).await;
        assert_eq!(
            generator.generate("hm", None, date(2026, 2, 11)).await,
            GenerationOutcome::Clarify(MODEL_FAILED.to_string())
        );
    }

    #[tokio::test]
    async fn test_recovery_prompt_includes_failure() {
        let model = Arc::new(ScriptedModel::new(["query { events(startDate: TODAY_PLACEHOLDER, endDate: TODAY_PLACEHOLDER) { title } }"]));
        let generator = generator(model.clone()).await;

        let outcome = generator
            .generate(
                "Show my schedule",
                Some(FailedAttempt {
                    query: "query { schedule { id } }",
                    error: r#"Cannot query field "schedule" on type "Query"."#,
                }),
                date(2026, 2, 11),
            )
            .await;
        assert_eq!(
            outcome,
            GenerationOutcome::Query(
                "query { events(startDate: \"2026-02-11\", endDate: \"2026-02-11\") { title } }".to_string()
            )
        );
        assert!(model.prompts.lock()[0].0.contains("FAILED QUERY:\nquery { schedule { id } }"));
    }
}
