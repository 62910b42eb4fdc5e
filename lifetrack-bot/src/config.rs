use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Telegram rejects messages longer than this many characters
pub const MAX_MESSAGE_LENGTH: usize = 4096;

#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    pub backend_url: String,
    pub backend_timeout_secs: u64,
    pub notification_interval_secs: u64,
    pub file_storage_path: String,
    pub nl: NlConfig,
}

/// Settings for the natural-language query pipeline. Disabled unless
/// `NL_QUERIES_ENABLED` is set.
#[derive(Clone, Debug)]
pub struct NlConfig {
    pub enabled: bool,
    pub llm_endpoint: String,
    pub llm_model: String,
    pub llm_api_key: String,
    pub embedding_endpoint: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub temperature_creative: f32,
    pub max_tokens_query: u32,
    pub max_tokens_error: u32,
    pub schema_path: String,
    pub examples_path: String,
    pub rag_index_path: String,
    pub max_attempts: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| "TELEGRAM_BOT_TOKEN must be set".to_string())?;

        let backend_url =
            env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:8080/query".to_string());
        url::Url::parse(&backend_url)
            .map_err(|e| format!("BACKEND_URL is not a valid URL ({}): {}", backend_url, e))?;

        Ok(Self {
            telegram_bot_token,
            backend_url,
            backend_timeout_secs: parse_secs("BACKEND_TIMEOUT_SECS", 10)?,
            notification_interval_secs: parse_secs("NOTIFICATION_INTERVAL_SECS", 60)?,
            file_storage_path: env::var("FILE_STORAGE_PATH")
                .unwrap_or_else(|_| "./data/files".to_string()),
            nl: NlConfig::from_env()?,
        })
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn notification_interval(&self) -> Duration {
        Duration::from_secs(self.notification_interval_secs)
    }
}

impl NlConfig {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            enabled: env_flag("NL_QUERIES_ENABLED"),
            llm_endpoint: env::var("LLM_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:8081/v1/completions".to_string()),
            llm_model: env::var("LLM_MODEL")
                .unwrap_or_else(|_| "qwen2.5-coder-7b-instruct".to_string()),
            llm_api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            embedding_endpoint: env::var("EMBEDDING_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:8082/v1/embeddings".to_string()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "all-MiniLM-L6-v2".to_string()),
            temperature: parse_var("MODEL_TEMPERATURE", 0.1)?,
            temperature_creative: parse_var("MODEL_TEMPERATURE_CREATIVE", 0.6)?,
            max_tokens_query: parse_var("MODEL_MAX_TOKENS_QUERY", 384)?,
            max_tokens_error: parse_var("MODEL_MAX_TOKENS_ERROR", 96)?,
            schema_path: env::var("GRAPHQL_SCHEMA_PATH")
                .unwrap_or_else(|_| "./schemas/schema.graphqls".to_string()),
            examples_path: env::var("GRAPHQL_EXAMPLES_PATH")
                .unwrap_or_else(|_| "./schemas/graphql_examples.yaml".to_string()),
            rag_index_path: env::var("RAG_INDEX_PATH")
                .unwrap_or_else(|_| "./data/graphql_rag.index.json".to_string()),
            max_attempts: parse_var("NL_MAX_ATTEMPTS", 2)?,
        })
    }
}

impl Default for NlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            llm_endpoint: "http://localhost:8081/v1/completions".to_string(),
            llm_model: "qwen2.5-coder-7b-instruct".to_string(),
            llm_api_key: String::new(),
            embedding_endpoint: "http://localhost:8082/v1/embeddings".to_string(),
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            temperature: 0.1,
            temperature_creative: 0.6,
            max_tokens_query: 384,
            max_tokens_error: 96,
            schema_path: "./schemas/schema.graphqls".to_string(),
            examples_path: "./schemas/graphql_examples.yaml".to_string(),
            rag_index_path: "./data/graphql_rag.index.json".to_string(),
            max_attempts: 2,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} must be a valid number, got '{}'", key, raw)),
        _ => Ok(default),
    }
}

/// Like `parse_var`, but zero is rejected.
fn parse_secs(key: &str, default: u64) -> Result<u64, String> {
    match parse_var(key, default)? {
        0 => Err(format!("{} must be greater than zero", key)),
        secs => Ok(secs),
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_defaults_when_missing() {
        let value: u64 = parse_var("LIFETRACK_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        unsafe { env::set_var("LIFETRACK_TEST_BAD_NUMBER", "sixty") };
        let result: Result<u64, String> = parse_var("LIFETRACK_TEST_BAD_NUMBER", 60);
        assert!(result.unwrap_err().contains("LIFETRACK_TEST_BAD_NUMBER"));
    }

    #[test]
    fn test_parse_secs_rejects_zero() {
        unsafe {
            env::set_var("LIFETRACK_TEST_ZERO_SECS", "0");
            env::set_var("LIFETRACK_TEST_SOME_SECS", " 15 ");
        }
        let err = parse_secs("LIFETRACK_TEST_ZERO_SECS", 60).unwrap_err();
        assert_eq!(err, "LIFETRACK_TEST_ZERO_SECS must be greater than zero");
        assert_eq!(parse_secs("LIFETRACK_TEST_SOME_SECS", 60), Ok(15));
        assert_eq!(parse_secs("LIFETRACK_TEST_UNSET_SECS", 60), Ok(60));
    }

    #[test]
    fn test_env_flag() {
        unsafe {
            env::set_var("LIFETRACK_TEST_FLAG_ON", "True");
            env::set_var("LIFETRACK_TEST_FLAG_OFF", "0");
        }
        assert!(env_flag("LIFETRACK_TEST_FLAG_ON"));
        assert!(!env_flag("LIFETRACK_TEST_FLAG_OFF"));
        assert!(!env_flag("LIFETRACK_TEST_FLAG_MISSING"));
    }

    #[test]
    fn test_nl_defaults() {
        let nl = NlConfig::default();
        assert!(!nl.enabled);
        assert_eq!(nl.max_attempts, 2);
        assert_eq!(nl.max_tokens_query, 384);
    }
}
