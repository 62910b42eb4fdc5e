//! Entity resolution for generated queries.
//!
//! Generated documents may reference entities by placeholder instead of id:
//! `ACTIVITY_ID_PLACEHOLDER` stands for the user's running session, any other
//! `<NAME>_ID_PLACEHOLDER` for a skill named in the user's message.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use super::models::{ActivitySession, Skill};
use super::{queries, BackendSession, GraphQLError};

pub const ACTIVITY_PLACEHOLDER: &str = "ACTIVITY_ID_PLACEHOLDER";

/// Minimum similarity for a fuzzy skill match
const FUZZY_CUTOFF: f64 = 0.6;
const FUZZY_MAX_MATCHES: usize = 3;
const LISTED_SKILLS: usize = 10;

static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["']?(\w+_ID_PLACEHOLDER)["']?"#).unwrap());

static SKILL_NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // "start a Python session"
        r"(?i)(?:start|begin|practice)\s+(?:a\s+)?([A-Za-z0-9\s]+?)\s+(?:session|practice|coding)",
        // "start session for Python"
        r"(?i)session\s+(?:for|with)\s+([A-Za-z0-9\s]+)",
        // "practicing Guitar"
        r"(?i)(?:practicing|learning|studying)\s+([A-Za-z0-9\s]+)",
        // "Python coding session"
        r"(?i)([A-Za-z0-9\s]+?)\s+(?:coding|practice|study|learning)\s+session",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

const PATTERN_STOPWORDS: &[&str] = &["a", "the", "my", "new", "session"];
const CAPITALIZED_STOPWORDS: &[&str] = &["the", "a", "my", "i"];

/// Execute `query` after substituting every id placeholder it contains.
pub async fn execute_with_resolution(
    session: &BackendSession,
    query: &str,
    variables: Value,
    user_message: &str,
) -> Result<Value, GraphQLError> {
    let mut query = query.to_string();

    let skill_placeholders = skill_placeholders(&query);
    if !skill_placeholders.is_empty() {
        log::info!(
            "[RESOLVE] Detected skill placeholders {:?}, resolving from message",
            skill_placeholders
        );
        let skill_id = resolve_skill(session, user_message).await?;
        for placeholder in &skill_placeholders {
            query = substitute_placeholder(&query, placeholder, &skill_id);
        }
        log::info!("[RESOLVE] Resolved skill id {}", skill_id);
    }

    if query.contains(ACTIVITY_PLACEHOLDER) {
        let activity_id = resolve_active_session(session)
            .await?
            .ok_or_else(|| GraphQLError::Resolution("No active session found".to_string()))?;
        query = substitute_placeholder(&query, ACTIVITY_PLACEHOLDER, &activity_id);
    }

    session.execute(&query, variables).await
}

/// Distinct skill placeholders, in order of first appearance.
pub fn skill_placeholders(query: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_PATTERN.captures_iter(query) {
        let name = caps[1].to_string();
        if name != ACTIVITY_PLACEHOLDER && !found.contains(&name) {
            found.push(name);
        }
    }
    found
}

/// Replace quoted and bare occurrences of `placeholder` with a quoted id.
pub fn substitute_placeholder(query: &str, placeholder: &str, id: &str) -> String {
    let quoted_id = format!("\"{}\"", id);
    query
        .replace(&format!("\"{}\"", placeholder), &quoted_id)
        .replace(&format!("'{}'", placeholder), &quoted_id)
        .replace(placeholder, &quoted_id)
}

async fn resolve_active_session(session: &BackendSession) -> Result<Option<String>, GraphQLError> {
    let active: Option<ActivitySession> = session
        .fetch(queries::ACTIVE_SESSION_ID, json!({}), "activeSession")
        .await?;
    Ok(active.map(|a| a.id))
}

/// Find the id of the skill named in `user_message`. Errors carry a message
/// meant for the user.
pub async fn resolve_skill(session: &BackendSession, user_message: &str) -> Result<String, GraphQLError> {
    let Some(skill_name) = extract_skill_name(user_message) else {
        log::warn!("[RESOLVE] Could not extract skill name from: {}", user_message);
        return Err(GraphQLError::Resolution(
            "I couldn't identify which skill you want to use. \
             Please specify the exact skill name from your existing skills."
                .to_string(),
        ));
    };

    let skills: Vec<Skill> = session
        .fetch(queries::SKILL_NAMES, json!({}), "skills")
        .await?
        .unwrap_or_default();

    match_skill(&skill_name, &skills)
}

/// Pick the skill matching `skill_name`: exact (ignoring case), then a
/// single close fuzzy match.
pub fn match_skill(skill_name: &str, skills: &[Skill]) -> Result<String, GraphQLError> {
    if skills.is_empty() {
        return Err(GraphQLError::Resolution(
            "You don't have any skills yet. Please create a skill first using the web app or by saying \
             'Create a new skill called [skill name]'"
                .to_string(),
        ));
    }

    if let Some(skill) = skills
        .iter()
        .find(|s| s.name.to_lowercase() == skill_name.to_lowercase())
    {
        log::info!("[RESOLVE] Exact match: {} ({})", skill.name, skill.id);
        return Ok(skill.id.clone());
    }

    let close = close_matches(skill_name, skills);
    match close.as_slice() {
        [only] => {
            log::info!(
                "[RESOLVE] Fuzzy matched '{}' to '{}' ({})",
                skill_name, only.name, only.id
            );
            Ok(only.id.clone())
        }
        [] => {
            let mut listed = skills
                .iter()
                .take(LISTED_SKILLS)
                .map(|s| format!("\"{}\"", s.name))
                .collect::<Vec<_>>()
                .join(", ");
            if skills.len() > LISTED_SKILLS {
                listed.push_str(&format!(" (and {} more)", skills.len() - LISTED_SKILLS));
            }
            Err(GraphQLError::Resolution(format!(
                "I couldn't find a skill matching '{}'. Your existing skills are: {}. \
                 Please use an exact skill name or create a new skill first.",
                skill_name, listed
            )))
        }
        several => {
            let listed = several
                .iter()
                .map(|s| format!("\"{}\"", s.name))
                .collect::<Vec<_>>()
                .join(", ");
            Err(GraphQLError::Resolution(format!(
                "I found '{}' in your message, but I'm not sure which skill you mean. \
                 Did you mean one of these: {}? Please specify the exact name.",
                skill_name, listed
            )))
        }
    }
}

/// Skills whose name is at least `FUZZY_CUTOFF` similar, best first.
fn close_matches<'a>(skill_name: &str, skills: &'a [Skill]) -> Vec<&'a Skill> {
    let needle = skill_name.to_lowercase();
    let mut scored: Vec<(f64, &Skill)> = skills
        .iter()
        .map(|s| (strsim::normalized_levenshtein(&needle, &s.name.to_lowercase()), s))
        .filter(|(score, _)| *score >= FUZZY_CUTOFF)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored
        .into_iter()
        .take(FUZZY_MAX_MATCHES)
        .map(|(_, s)| s)
        .collect()
}

/// Guess the skill a free-text message refers to.
pub fn extract_skill_name(message: &str) -> Option<String> {
    for pattern in SKILL_NAME_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(message) {
            let name = caps[1].trim();
            if !PATTERN_STOPWORDS.contains(&name.to_lowercase().as_str()) {
                return Some(name.to_string());
            }
        }
    }

    message
        .split_whitespace()
        .find(|word| {
            word.chars().next().is_some_and(char::is_uppercase)
                && word.chars().count() > 2
                && !CAPITALIZED_STOPWORDS.contains(&word.to_lowercase().as_str())
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::testing::ScriptedExecutor;
    use std::sync::Arc;

    fn skill(id: &str, name: &str) -> Skill {
        Skill {
            id: id.to_string(),
            name: name.to_string(),
            level: None,
        }
    }

    #[test]
    fn test_extract_skill_name_patterns() {
        assert_eq!(extract_skill_name("start a Python session").as_deref(), Some("Python"));
        assert_eq!(extract_skill_name("start session for Guitar").as_deref(), Some("Guitar"));
        assert_eq!(extract_skill_name("I am practicing piano").as_deref(), Some("piano"));
        assert_eq!(extract_skill_name("Rust coding session please").as_deref(), Some("Rust"));
    }

    #[test]
    fn test_extract_skill_name_falls_back_to_capitalized_word() {
        assert_eq!(extract_skill_name("let's do some Spanish now").as_deref(), Some("Spanish"));
        assert_eq!(extract_skill_name("The rest is quiet").as_deref(), None);
        assert_eq!(extract_skill_name("nothing here"), None);
    }

    #[test]
    fn test_placeholders_exclude_activity() {
        let query = r#"mutation { startSession(skillId: "PYTHON_ID_PLACEHOLDER") { id } stopSession(id: ACTIVITY_ID_PLACEHOLDER) { id } }"#;
        assert_eq!(skill_placeholders(query), vec!["PYTHON_ID_PLACEHOLDER".to_string()]);
    }

    #[test]
    fn test_substitute_placeholder_quotes_bare_and_single_quoted() {
        let query = "a(id: SKILL_ID_PLACEHOLDER) b(id: 'SKILL_ID_PLACEHOLDER') c(id: \"SKILL_ID_PLACEHOLDER\")";
        assert_eq!(
            substitute_placeholder(query, "SKILL_ID_PLACEHOLDER", "42"),
            "a(id: \"42\") b(id: \"42\") c(id: \"42\")"
        );
    }

    #[test]
    fn test_match_skill_exact_ignores_case() {
        let skills = vec![skill("1", "Python"), skill("2", "Guitar")];
        assert_eq!(match_skill("python", &skills).unwrap(), "1");
    }

    #[test]
    fn test_match_skill_single_fuzzy_match() {
        let skills = vec![skill("1", "Python"), skill("2", "Guitar")];
        assert_eq!(match_skill("Pythn", &skills).unwrap(), "1");
    }

    #[test]
    fn test_match_skill_ambiguous_lists_candidates() {
        let skills = vec![skill("1", "Spanish A"), skill("2", "Spanish B"), skill("3", "Chess")];
        let err = match_skill("Spanish", &skills).unwrap_err().to_string();
        assert!(err.contains("Did you mean one of these"));
        assert!(err.contains("\"Spanish A\""));
        assert!(err.contains("\"Spanish B\""));
    }

    #[test]
    fn test_match_skill_no_match_lists_ten_and_more() {
        let skills: Vec<Skill> = (0..12).map(|i| skill(&i.to_string(), &format!("Topic{}", i))).collect();
        let err = match_skill("Underwater Basket Weaving", &skills).unwrap_err().to_string();
        assert!(err.contains("I couldn't find a skill matching 'Underwater Basket Weaving'"));
        assert!(err.contains("(and 2 more)"));
        assert!(!err.contains("Topic10"));
    }

    #[test]
    fn test_match_skill_without_skills() {
        let err = match_skill("Python", &[]).unwrap_err().to_string();
        assert!(err.starts_with("You don't have any skills yet"));
    }

    #[tokio::test]
    async fn test_execute_with_resolution_substitutes_ids() {
        let exec = Arc::new(
            ScriptedExecutor::new()
                .on("query GetSkills", json!({ "skills": [{ "id": "sk-1", "name": "Python" }] }))
                .on("query GetActiveSession", json!({ "activeSession": { "id": "act-9" } }))
                .on("startSession", json!({ "startSession": { "id": "new" } })),
        );
        let session = BackendSession::new(exec.clone(), Some("tok".to_string()));

        let query = r#"mutation { startSession(skillId: "SKILL_ID_PLACEHOLDER", name: "x") { id } }"#;
        execute_with_resolution(&session, query, json!({}), "start a Python session")
            .await
            .unwrap();

        let sent = exec.calls_matching("startSession");
        assert!(sent[0].query.contains(r#"skillId: "sk-1""#));
    }

    #[tokio::test]
    async fn test_activity_placeholder_without_active_session() {
        let exec = Arc::new(ScriptedExecutor::new().on("query GetActiveSession", json!({ "activeSession": null })));
        let session = BackendSession::new(exec, Some("tok".to_string()));

        let err = execute_with_resolution(
            &session,
            "mutation { stopSession(id: ACTIVITY_ID_PLACEHOLDER) { id } }",
            json!({}),
            "stop",
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "No active session found");
    }
}
