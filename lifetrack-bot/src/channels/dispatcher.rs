use chrono::{Local, NaiveDateTime};
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::utils::command::BotCommands;

use crate::graphql::{self, BackendSession, GraphQLExecutor};
use crate::nl::pipeline::NlPipeline;
use crate::sessions::SessionStore;
use crate::ui::callbacks::{self, CallbackAction};
use crate::ui::files::{self, FileFetcher, IncomingFile};
use crate::ui::{commands, dates, messages, CallbackOutcome, Reply, LOGIN_REQUIRED, SESSION_EXPIRED};

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "LifeTrack commands:")]
pub enum Command {
    #[command(description = "welcome")]
    Start,
    #[command(description = "full command list")]
    Help,
    #[command(description = "link your account: /link <email> <password>")]
    Link(String),
    #[command(description = "forget your login")]
    Logout,
    #[command(description = "manage sessions and view skills")]
    Session,
    #[command(description = "same as /session")]
    Skills,
    #[command(description = "view your calendar")]
    Schedule,
    #[command(description = "access your notes")]
    Notes,
    #[command(description = "check your progress")]
    Stats,
    #[command(description = "browse files: /files [directory]")]
    Files(String),
    #[command(description = "show or set the upload directory")]
    Cd(String),
}

/// Routes chat input to the UI handlers with the chat's own backend login.
pub struct BotDispatcher {
    executor: Arc<dyn GraphQLExecutor>,
    sessions: Arc<SessionStore>,
    storage_root: PathBuf,
    nl: Option<Arc<NlPipeline>>,
}

impl BotDispatcher {
    pub fn new(executor: Arc<dyn GraphQLExecutor>, sessions: Arc<SessionStore>, storage_root: PathBuf) -> Self {
        Self {
            executor,
            sessions,
            storage_root,
            nl: None,
        }
    }

    /// Route free text without a pending prompt to the natural-language pipeline
    pub fn with_nl(mut self, pipeline: Arc<NlPipeline>) -> Self {
        self.nl = Some(pipeline);
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Backend handle for a logged-in chat
    fn backend(&self, chat_id: i64) -> Option<BackendSession> {
        self.sessions
            .token(chat_id)
            .map(|token| BackendSession::new(self.executor.clone(), Some(token)))
    }

    fn now() -> NaiveDateTime {
        Local::now().naive_local()
    }

    pub async fn command(&self, chat_id: i64, first_name: &str, command: Command) -> Reply {
        log::info!("[DISPATCH] Chat {} ran {:?}", chat_id, redact(&command));

        let backend = self.backend(chat_id);
        match (command, backend) {
            (Command::Start, _) => {
                commands::welcome(first_name, self.sessions.get(chat_id).is_logged_in())
            }
            (Command::Help, _) => commands::help(),
            (Command::Link(args), _) => self.link(chat_id, &args).await,
            (Command::Logout, _) => {
                if self.sessions.logout(chat_id) {
                    Reply::plain("👋 Logged out. Use /link to login again.")
                } else {
                    Reply::plain("ℹ️ You are not logged in.")
                }
            }
            (_, None) => Reply::markdown(LOGIN_REQUIRED),
            (Command::Session | Command::Skills, Some(backend)) => {
                commands::session_overview(&backend).await
            }
            (Command::Schedule, Some(backend)) => {
                commands::schedule_today(&backend, dates::today()).await
            }
            (Command::Notes, Some(backend)) => commands::recent_notes(&backend).await,
            (Command::Stats, Some(backend)) => {
                commands::stats_overview(&backend, dates::today()).await
            }
            (Command::Files(args), Some(backend)) => {
                files::files_command(&backend, &self.sessions, chat_id, &args).await
            }
            (Command::Cd(args), Some(_)) => files::cd_command(&self.sessions, chat_id, &args),
        }
    }

    async fn link(&self, chat_id: i64, args: &str) -> Reply {
        let mut parts = args.split_whitespace();
        let (Some(email), Some(password), None) = (parts.next(), parts.next(), parts.next()) else {
            return Reply::markdown(
                "🔑 *Link your LifeTrack account*\n\nUsage: `/link your@email.com password`",
            );
        };

        match graphql::login(self.executor.as_ref(), email, password).await {
            Ok(payload) => {
                let name = payload
                    .user
                    .as_ref()
                    .map(|u| u.name.clone().unwrap_or_else(|| u.email.clone()))
                    .unwrap_or_else(|| email.to_string());
                // login() only returns payloads that carry a token
                let token = payload.token.clone().unwrap_or_default();
                self.sessions.login(chat_id, token, payload.user);
                Reply::plain(format!("✅ Logged in as {}!\n\nTry /session to get started.", name))
            }
            Err(e) => Reply::plain(format!("❌ {}", e)),
        }
    }

    pub async fn callback(&self, chat_id: i64, data: &str) -> CallbackOutcome {
        let Some(backend) = self.backend(chat_id) else {
            return CallbackOutcome::edit(Reply::plain(SESSION_EXPIRED));
        };
        let action = CallbackAction::parse(data);
        callbacks::handle(&backend, &self.sessions, chat_id, action, Self::now()).await
    }

    pub async fn text(&self, chat_id: i64, text: &str) -> Reply {
        let Some(backend) = self.backend(chat_id) else {
            return Reply::markdown(LOGIN_REQUIRED);
        };

        let pending = self.sessions.take_pending(chat_id);
        if let Some(reply) = messages::handle_pending(&backend, pending, text).await {
            return reply;
        }

        match &self.nl {
            Some(pipeline) => Reply::plain(pipeline.handle(&backend, text).await),
            None => messages::quick_commands(),
        }
    }

    pub async fn upload(&self, chat_id: i64, fetcher: &dyn FileFetcher, incoming: IncomingFile) -> Reply {
        let Some(backend) = self.backend(chat_id) else {
            return Reply::markdown(LOGIN_REQUIRED);
        };
        files::upload(
            &backend,
            &self.sessions,
            chat_id,
            &self.storage_root,
            fetcher,
            incoming,
            Self::now(),
        )
        .await
    }
}

/// Keeps credentials out of the logs
fn redact(command: &Command) -> Command {
    match command {
        Command::Link(_) => Command::Link("<redacted>".to_string()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::testing::ScriptedExecutor;
    use crate::graphql::GraphQLError;
    use crate::sessions::PendingInput;
    use serde_json::json;

    fn dispatcher(exec: ScriptedExecutor) -> (Arc<ScriptedExecutor>, BotDispatcher) {
        let exec = Arc::new(exec);
        let dispatcher = BotDispatcher::new(exec.clone(), Arc::new(SessionStore::new()), PathBuf::from("/tmp/unused"));
        (exec, dispatcher)
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("/start", "lifetrack_bot").unwrap(), Command::Start);
        assert_eq!(
            Command::parse("/link ann@example.com hunter2", "lifetrack_bot").unwrap(),
            Command::Link("ann@example.com hunter2".to_string())
        );
        assert_eq!(
            Command::parse("/files /docs/work", "lifetrack_bot").unwrap(),
            Command::Files("/docs/work".to_string())
        );
        assert!(Command::parse("/frobnicate", "lifetrack_bot").is_err());
    }

    #[tokio::test]
    async fn test_data_commands_require_login() {
        let (exec, dispatcher) = dispatcher(ScriptedExecutor::new());
        let reply = dispatcher.command(1, "Ann", Command::Notes).await;
        assert_eq!(reply.text, LOGIN_REQUIRED);
        assert!(exec.queries().is_empty());

        let reply = dispatcher.text(1, "hello").await;
        assert_eq!(reply.text, LOGIN_REQUIRED);
    }

    #[tokio::test]
    async fn test_link_then_commands_use_token() {
        let (exec, dispatcher) = dispatcher(
            ScriptedExecutor::new()
                .on("mutation Login", json!({ "login": { "token": "jwt-1", "user": { "id": "u1", "email": "ann@example.com", "name": "Ann" } } }))
                .on("query GetNotes", json!({ "notes": { "nodes": [] } })),
        );

        let reply = dispatcher.command(1, "Ann", Command::Link("ann@example.com pw".into())).await;
        assert!(reply.text.starts_with("✅ Logged in as Ann!"));
        assert_eq!(dispatcher.sessions().token(1).as_deref(), Some("jwt-1"));

        dispatcher.command(1, "Ann", Command::Notes).await;
        let calls = exec.calls_matching("query GetNotes");
        assert_eq!(calls[0].token.as_deref(), Some("jwt-1"));
    }

    #[tokio::test]
    async fn test_link_usage_and_failure() {
        let (_, dispatcher) = dispatcher(ScriptedExecutor::new().fail(
            "mutation Login",
            GraphQLError::Query { messages: vec!["invalid credentials".into()] },
        ));

        let usage = dispatcher.command(1, "Ann", Command::Link("only-email".into())).await;
        assert!(usage.text.contains("Usage"));

        let failed = dispatcher.command(1, "Ann", Command::Link("a@b.c wrong".into())).await;
        assert_eq!(failed.text, "❌ Login failed: invalid credentials");
        assert!(dispatcher.sessions().token(1).is_none());
    }

    #[tokio::test]
    async fn test_logout() {
        let (_, dispatcher) = dispatcher(ScriptedExecutor::new());
        assert_eq!(dispatcher.command(1, "Ann", Command::Logout).await.text, "ℹ️ You are not logged in.");

        dispatcher.sessions().login(1, "tok".into(), None);
        assert!(dispatcher.command(1, "Ann", Command::Logout).await.text.starts_with("👋 Logged out"));
        assert!(!dispatcher.sessions().get(1).is_logged_in());
    }

    #[tokio::test]
    async fn test_callback_without_login_expires() {
        let (_, dispatcher) = dispatcher(ScriptedExecutor::new());
        let outcome = dispatcher.callback(1, "schedule:today").await;
        assert_eq!(outcome.edit.unwrap().text, SESSION_EXPIRED);
    }

    #[tokio::test]
    async fn test_text_consumes_pending_once() {
        let (exec, dispatcher) = dispatcher(ScriptedExecutor::new().on(
            "query SearchNotes",
            json!({ "searchNotes": [] }),
        ));
        dispatcher.sessions().login(1, "tok".into(), None);
        dispatcher.sessions().set_pending(1, PendingInput::NoteSearch);

        let first = dispatcher.text(1, "goals").await;
        assert!(first.text.contains("No results found"));

        let second = dispatcher.text(1, "goals").await;
        assert_eq!(second, messages::quick_commands());
        assert_eq!(exec.calls_matching("query SearchNotes").len(), 1);
    }

    #[test]
    fn test_redact_hides_credentials() {
        let shown = format!("{:?}", redact(&Command::Link("a@b.c secret".into())));
        assert!(!shown.contains("secret"));
    }
}
