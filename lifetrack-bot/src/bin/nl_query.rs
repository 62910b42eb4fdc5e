//! Natural-language query runner
//!
//! Drives the natural-language pipeline against a live backend without
//! booting Telegram, for tuning prompts and examples.
//!
//! Usage:
//!   LIFETRACK_EMAIL="me@example.com" LIFETRACK_PASSWORD="secret" \
//!   cargo run --bin nl_query -- "how much did I practice this week"
//!
//! `LIFETRACK_TOKEN` (or `SERVICE_JWT`) skips the login step.

use dotenv::dotenv;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use lifetrack_bot::config::NlConfig;
use lifetrack_bot::graphql::{self, BackendSession, GraphQLClient, GraphQLExecutor};
use lifetrack_bot::nl::NlPipeline;

const BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

async fn token(executor: &dyn GraphQLExecutor) -> Result<String, String> {
    if let Some(token) = ["LIFETRACK_TOKEN", "SERVICE_JWT"]
        .iter()
        .find_map(|key| env::var(key).ok().filter(|t| !t.trim().is_empty()))
    {
        return Ok(token);
    }

    let email = env::var("LIFETRACK_EMAIL").map_err(|_| "LIFETRACK_EMAIL or LIFETRACK_TOKEN must be set".to_string())?;
    let password = env::var("LIFETRACK_PASSWORD").map_err(|_| "LIFETRACK_PASSWORD must be set".to_string())?;
    let payload = graphql::login(executor, &email, &password)
        .await
        .map_err(|e| e.to_string())?;
    payload.token.ok_or_else(|| "Login failed: no token received".to_string())
}

async fn run() -> Result<(), String> {
    let message = env::args().skip(1).collect::<Vec<_>>().join(" ");
    if message.trim().is_empty() {
        return Err("Usage: nl_query <message>".to_string());
    }

    let backend_url = env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:8080/query".to_string());
    let executor: Arc<dyn GraphQLExecutor> = Arc::new(GraphQLClient::new(&backend_url, BACKEND_TIMEOUT)?);
    let token = token(executor.as_ref()).await?;
    let backend = BackendSession::new(executor, Some(token));

    let pipeline = NlPipeline::from_config(&NlConfig::from_env()?).await?;
    println!("{}", pipeline.handle(&backend, &message).await);
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
