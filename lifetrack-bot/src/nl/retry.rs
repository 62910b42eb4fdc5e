//! Bounded retry loop around query generation.
//!
//! An attempt moves Generating -> Validating and ends in Succeeded, or in
//! Retrying when a retryable failure leaves attempts to spare, or in Failed.

use once_cell::sync::Lazy;
use regex::Regex;
use strum::AsRefStr;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const RETRYABLE_PATTERNS: &[&str] = &[
    "cannot query field",
    "unknown argument",
    "expected type",
    "graphql_validation_failed",
];

const FATAL_PATTERNS: &[&str] = &["authentication", "authorization", "timeout", "network", "connection"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum RetryState {
    Generating,
    Validating,
    Succeeded,
    Retrying,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CannotQueryField,
    UnknownArgument,
    TypeMismatch,
    Other,
}

impl ErrorKind {
    pub fn classify(error: &str) -> Self {
        if error.contains("Cannot query field") {
            ErrorKind::CannotQueryField
        } else if error.contains("Unknown argument") {
            ErrorKind::UnknownArgument
        } else if error.contains("Expected type") {
            ErrorKind::TypeMismatch
        } else {
            ErrorKind::Other
        }
    }
}

/// Why the loop stopped retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUp {
    Exhausted,
    RepeatedError,
    DuplicateQuery,
    Fatal,
}

impl GiveUp {
    /// Question sent back to the user
    pub fn clarification(&self) -> &'static str {
        match self {
            GiveUp::Exhausted => {
                "I tried multiple times but couldn't generate a valid query. Please rephrase your request."
            }
            GiveUp::DuplicateQuery => "I'm stuck on this request. Please try rephrasing it differently.",
            GiveUp::RepeatedError | GiveUp::Fatal => {
                "I'm having trouble generating a valid query. Could you rephrase?"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Stop(GiveUp),
}

/// Per-request history of attempts
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub attempt: u32,
    pub max_attempts: u32,
    pub state: RetryState,
    pub last_error: Option<String>,
    pub last_query: Option<String>,
    pub errors: Vec<String>,
}

impl RetryContext {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 1,
            max_attempts: max_attempts.max(1),
            state: RetryState::Generating,
            last_error: None,
            last_query: None,
            errors: Vec::new(),
        }
    }

    pub fn transition(&mut self, next: RetryState) {
        log::debug!(
            "[RETRY] Attempt {}/{}: {} -> {}",
            self.attempt,
            self.max_attempts,
            self.state.as_ref(),
            next.as_ref()
        );
        self.state = next;
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// The same error twice in a row, or two errors of the same kind.
    /// Two unclassified errors count as the same kind.
    pub fn is_repeated_error(&self) -> bool {
        let [.., previous, last] = self.errors.as_slice() else {
            return false;
        };
        let (previous_kind, last_kind) = (ErrorKind::classify(previous), ErrorKind::classify(last));
        last == previous || last_kind == previous_kind
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub fail_on_duplicate: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            fail_on_duplicate: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn context(&self) -> RetryContext {
        RetryContext::new(self.max_attempts)
    }

    /// Record a failed attempt and decide what happens next. On `Retry` the
    /// context has advanced to the next attempt.
    pub fn on_failure(&self, context: &mut RetryContext, error: &str, failed_query: Option<&str>) -> RetryDecision {
        let duplicate = match (failed_query, context.last_query.as_deref()) {
            (Some(new), Some(old)) => self.fail_on_duplicate && normalize_query(new) == normalize_query(old),
            _ => false,
        };

        context.last_error = Some(error.to_string());
        if let Some(query) = failed_query {
            context.last_query = Some(query.to_string());
        }
        context.errors.push(error.to_string());

        let decision = if !is_retryable(error) {
            log::info!("[RETRY] Error is not retryable: {}", error.chars().take(100).collect::<String>());
            RetryDecision::Stop(GiveUp::Fatal)
        } else if duplicate {
            log::warn!("[RETRY] Retry generated identical query");
            RetryDecision::Stop(GiveUp::DuplicateQuery)
        } else if context.is_repeated_error() {
            log::warn!("[RETRY] Repeated error detected");
            RetryDecision::Stop(GiveUp::RepeatedError)
        } else if !context.has_attempts_left() {
            log::info!("[RETRY] Max attempts ({}) reached", context.max_attempts);
            RetryDecision::Stop(GiveUp::Exhausted)
        } else {
            RetryDecision::Retry
        };

        match decision {
            RetryDecision::Retry => {
                context.transition(RetryState::Retrying);
                context.attempt += 1;
                log::info!("[RETRY] Retrying (attempt {}/{})", context.attempt, context.max_attempts);
                context.transition(RetryState::Generating);
            }
            RetryDecision::Stop(_) => context.transition(RetryState::Failed),
        }
        decision
    }
}

/// Field, argument and type mismatches can be fixed by regenerating;
/// transport and auth problems cannot.
pub fn is_retryable(error: &str) -> bool {
    let lower = error.to_lowercase();
    if RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p)) {
        return true;
    }
    !FATAL_PATTERNS.iter().any(|p| lower.contains(p))
}

pub fn normalize_query(query: &str) -> String {
    WHITESPACE.replace_all(query.trim(), " ").to_lowercase()
}
