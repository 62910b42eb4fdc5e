//! Inline keyboard button handling.

use chrono::{Duration, NaiveDateTime};
use serde_json::{json, Value};
use strum::{AsRefStr, EnumString};

use super::commands::{event_line, fetch_stats, load_recent_notes, sort_events, stats_keyboard, top_skills};
use super::dates::Period;
use super::{
    clip, event_type_emoji, files, format_duration, format_tags, parse_timestamp,
    skill_level_emoji, truncate, Button, CallbackOutcome, Reply, TIMED_OUT,
};
use crate::graphql::models::{ActivitySession, Event, Note, Skill};
use crate::graphql::{queries, BackendSession, GraphQLError};
use crate::sessions::{EventTemplate, PendingInput, SessionStore};

const SKILL_MENU_SIZE: usize = 10;
const SCHEDULE_EVENTS_SHOWN: usize = 15;
const STATS_TOP_SKILLS: usize = 5;
const NOTE_CONTENT_PREVIEW: usize = 500;

/// A button press, decoded from its callback data
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackAction {
    Cancel,
    StartSessionMenu,
    StartSkill(String),
    PauseSession(String),
    ResumeSession(String),
    StopSession(String),
    Schedule(Period),
    Stats(Period),
    NoteCreate,
    NoteList,
    NoteSearch,
    NoteView(String),
    NoteDelete(String),
    EventCreate,
    EventTemplates,
    EventTemplate(String),
    EventView(String),
    EventDelete(String),
    FilesList(String),
    FilesDownloadMenu(String),
    FilesDownload(String),
    Unknown(String),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Self {
        let unknown = || CallbackAction::Unknown(data.to_string());

        match data {
            "cancel" => return CallbackAction::Cancel,
            "start_session_menu" => return CallbackAction::StartSessionMenu,
            _ => {}
        }

        let Some((prefix, rest)) = data.split_once(':') else {
            return unknown();
        };

        match prefix {
            "start_skill" | "quick_start" => CallbackAction::StartSkill(rest.to_string()),
            "pause_session" => CallbackAction::PauseSession(rest.to_string()),
            "resume_session" => CallbackAction::ResumeSession(rest.to_string()),
            "stop_session" => CallbackAction::StopSession(rest.to_string()),
            // Unrecognised periods show today
            "schedule" => CallbackAction::Schedule(rest.parse().unwrap_or(Period::Today)),
            "stats" => CallbackAction::Stats(match rest.parse::<Period>() {
                Ok(p @ (Period::Week | Period::Month)) => p,
                _ => Period::Today,
            }),
            "note" => match rest.split_once(':') {
                Some(("view", id)) => CallbackAction::NoteView(id.to_string()),
                Some(("delete", id)) => CallbackAction::NoteDelete(id.to_string()),
                None if rest == "create" => CallbackAction::NoteCreate,
                None if rest == "list" => CallbackAction::NoteList,
                None if rest == "search" => CallbackAction::NoteSearch,
                _ => unknown(),
            },
            "event" => match rest.split_once(':') {
                Some(("template", kind)) => CallbackAction::EventTemplate(kind.to_string()),
                Some(("view", id)) => CallbackAction::EventView(id.to_string()),
                Some(("delete", id)) => CallbackAction::EventDelete(id.to_string()),
                None if rest == "create" => CallbackAction::EventCreate,
                None if rest == "templates" => CallbackAction::EventTemplates,
                _ => unknown(),
            },
            "files_list" => CallbackAction::FilesList(rest.to_string()),
            "files_download_menu" => CallbackAction::FilesDownloadMenu(rest.to_string()),
            "files_download" => CallbackAction::FilesDownload(rest.to_string()),
            _ => unknown(),
        }
    }
}

/// Quick-create presets offered under "Event Templates"
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum TemplateKind {
    Meeting,
    Study,
    Reminder,
}

impl TemplateKind {
    pub fn build(&self, now: NaiveDateTime) -> EventTemplate {
        let (title, start, end, event_type) = match self {
            TemplateKind::Meeting => ("Team Meeting", now, now + Duration::minutes(30), "MEETING"),
            TemplateKind::Study => ("Study Session", now, now + Duration::hours(1), "LEARNING"),
            TemplateKind::Reminder => (
                "Reminder",
                now + Duration::hours(2),
                now + Duration::hours(2) + Duration::minutes(15),
                "REMINDER",
            ),
        };
        EventTemplate {
            title: title.to_string(),
            start,
            end,
            event_type: event_type.to_string(),
        }
    }
}

pub async fn handle(
    backend: &BackendSession,
    store: &SessionStore,
    chat_id: i64,
    action: CallbackAction,
    now: NaiveDateTime,
) -> CallbackOutcome {
    log::debug!("[CALLBACK] Chat {} pressed {:?}", chat_id, action);

    match action {
        CallbackAction::Cancel => {
            CallbackOutcome::edit(Reply::plain("❌ Cancelled. Use /session to try again."))
        }
        CallbackAction::StartSessionMenu => CallbackOutcome::edit(skill_menu(backend).await),
        CallbackAction::StartSkill(skill_id) => {
            CallbackOutcome::edit(start_session(backend, &skill_id).await)
        }
        CallbackAction::PauseSession(id) => {
            CallbackOutcome::edit(session_control(backend, SessionControl::Pause, &id).await)
        }
        CallbackAction::ResumeSession(id) => {
            CallbackOutcome::edit(session_control(backend, SessionControl::Resume, &id).await)
        }
        CallbackAction::StopSession(id) => {
            CallbackOutcome::edit(session_control(backend, SessionControl::Stop, &id).await)
        }
        CallbackAction::Schedule(period) => {
            CallbackOutcome::edit(schedule(backend, period, now).await)
        }
        CallbackAction::Stats(period) => CallbackOutcome::edit(stats(backend, period, now).await),
        CallbackAction::NoteCreate => {
            store.set_pending(chat_id, PendingInput::Note);
            CallbackOutcome::edit(Reply::markdown(
                "📝 *Create New Note*\n\n\
                 Please send your note in this format:\n\n\
                 `Title\nContent\n#tag1 #tag2`\n\n\
                 Example:\n\
                 `Meeting Notes\nDiscussed Q1 goals\n#work #meeting`\n\n\
                 Or just send a simple message and I'll create a note from it.",
            ))
        }
        CallbackAction::NoteSearch => {
            store.set_pending(chat_id, PendingInput::NoteSearch);
            CallbackOutcome::edit(Reply::markdown(
                "🔍 *Search Notes*\n\nSend me keywords to search your notes.",
            ))
        }
        CallbackAction::NoteList => match load_recent_notes(backend).await {
            Ok(reply) => CallbackOutcome::edit(reply),
            Err(e) => {
                log::error!("[CALLBACK] Failed to load notes: {}", e);
                CallbackOutcome::edit(Reply::plain("❌ Error loading notes."))
            }
        },
        CallbackAction::NoteView(id) => CallbackOutcome::edit(note_detail(backend, &id).await),
        CallbackAction::NoteDelete(id) => {
            let reply = match backend.execute(queries::DELETE_NOTE, json!({ "id": id })).await {
                Ok(_) => {
                    log::info!("[CALLBACK] Deleted note {}", id);
                    Reply::markdown(
                        "✅ *Note Deleted*\n\nThe note has been removed.\n\nUse /notes to view your remaining notes.",
                    )
                }
                Err(e) => {
                    log::error!("[CALLBACK] Failed to delete note {}: {}", id, e);
                    Reply::plain("❌ Error deleting note.")
                }
            };
            CallbackOutcome::edit(reply)
        }
        CallbackAction::EventCreate => {
            store.set_pending(chat_id, PendingInput::Event);
            CallbackOutcome::edit(Reply::markdown(
                "📅 *Create New Event*\n\n\
                 Please send your event in this format:\n\n\
                 `Title\nDate Time (YYYY-MM-DD HH:MM)\nDuration (minutes)\nType (LEARNING/MEETING/REMINDER)`\n\n\
                 Example:\n\
                 `Team Meeting\n2026-02-13 14:00\n60\nMEETING`\n\n\
                 Or use templates below:",
            ))
        }
        CallbackAction::EventTemplates => CallbackOutcome::edit(event_templates()),
        CallbackAction::EventTemplate(kind) => {
            let Ok(kind) = kind.parse::<TemplateKind>() else {
                return CallbackOutcome::edit(Reply::plain("❌ Invalid template type."));
            };
            let template = kind.build(now);
            let reply = Reply::markdown(format!(
                "📅 *Creating {}*\n\nStart: {}\nEnd: {}\nType: {}\n\n\
                 Send a custom title, or type 'confirm' to create with default settings.",
                template.title,
                template.start.format("%I:%M %p"),
                template.end.format("%I:%M %p"),
                template.event_type
            ));
            store.set_pending(chat_id, PendingInput::EventTitle(template));
            CallbackOutcome::edit(reply)
        }
        CallbackAction::EventView(id) => CallbackOutcome::edit(event_detail(backend, &id).await),
        CallbackAction::EventDelete(id) => {
            let reply = match backend.execute(queries::DELETE_EVENT, json!({ "id": id })).await {
                Ok(_) => {
                    log::info!("[CALLBACK] Deleted event {}", id);
                    Reply::markdown(
                        "✅ *Event Deleted*\n\nThe event has been removed from your calendar.\n\nUse /schedule to view your calendar.",
                    )
                }
                Err(e) => {
                    log::error!("[CALLBACK] Failed to delete event {}: {}", id, e);
                    Reply::plain("❌ Error deleting event.")
                }
            };
            CallbackOutcome::edit(reply)
        }
        CallbackAction::FilesList(directory) => {
            match files::directory_listing(backend, store, chat_id, &directory).await {
                Ok(reply) => CallbackOutcome::edit(reply),
                Err(e) => {
                    log::error!("[CALLBACK] Failed to list {}: {}", directory, e);
                    CallbackOutcome::toast(format!("❌ Error listing files: {}", e))
                }
            }
        }
        CallbackAction::FilesDownloadMenu(directory) => files::download_menu(backend, &directory).await,
        CallbackAction::FilesDownload(file_id) => files::download(backend, &file_id).await,
        CallbackAction::Unknown(data) => {
            log::warn!("[CALLBACK] Unknown callback data: {}", data);
            CallbackOutcome::edit(Reply::plain(format!("Unknown action: {}", data)))
        }
    }
}

async fn skill_menu(backend: &BackendSession) -> Reply {
    let skills: Vec<Skill> = match backend.fetch(queries::SKILLS, json!({}), "skills").await {
        Ok(skills) => skills.unwrap_or_default(),
        Err(e) => {
            log::error!("[CALLBACK] Failed to load skills: {}", e);
            return Reply::plain("❌ Error loading skills. Try /skills command.");
        }
    };

    if skills.is_empty() {
        return Reply::markdown("📚 *No Skills Available*\n\nCreate skills in the web app first!");
    }

    let mut keyboard: Vec<Vec<Button>> = skills
        .iter()
        .take(SKILL_MENU_SIZE)
        .map(|skill| {
            vec![Button::new(
                format!("{} {}", skill_level_emoji(skill.level.as_deref()), skill.name),
                format!("start_skill:{}", skill.id),
            )]
        })
        .collect();
    keyboard.push(vec![Button::new("❌ Cancel", "cancel")]);

    Reply::markdown("📚 *Select a Skill*\n\nChoose which skill you want to practice:")
        .with_keyboard(keyboard)
}

async fn start_session(backend: &BackendSession, skill_id: &str) -> Reply {
    let skill: Option<Skill> = match backend
        .fetch(queries::SKILL, json!({ "id": skill_id }), "skill")
        .await
    {
        Ok(skill) => skill,
        Err(e) => return session_error("start", &e, 200),
    };
    let Some(skill) = skill else {
        return Reply::plain("❌ Skill not found.");
    };

    let started: Result<Option<ActivitySession>, _> = backend
        .fetch(
            queries::START_SESSION,
            json!({ "skillId": skill_id, "name": format!("{} practice", skill.name) }),
            "startSession",
        )
        .await;

    match started {
        Ok(Some(session)) => {
            log::info!("[CALLBACK] Started session {} for skill {}", session.id, skill.name);
            Reply::markdown(format!(
                "✅ *Session Started!*\n\n📚 {}\n⏱️ Timer running...\n\nUse /session to pause or stop.",
                skill.name
            ))
        }
        Ok(None) => Reply::plain("❌ Failed to start session."),
        Err(e) if e.mentions("already have an active session") => Reply::markdown(
            "⚠️ *Session Already Active*\n\nStop your current session first.\n\nUse /session to manage it.",
        ),
        Err(e) => session_error("start", &e, 200),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionControl {
    Pause,
    Resume,
    Stop,
}

impl SessionControl {
    fn mutation(&self) -> (&'static str, &'static str) {
        match self {
            SessionControl::Pause => (queries::PAUSE_SESSION, "pauseSession"),
            SessionControl::Resume => (queries::RESUME_SESSION, "resumeSession"),
            SessionControl::Stop => (queries::STOP_SESSION, "stopSession"),
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            SessionControl::Pause => "pause",
            SessionControl::Resume => "resume",
            SessionControl::Stop => "stop",
        }
    }
}

async fn session_control(backend: &BackendSession, control: SessionControl, session_id: &str) -> Reply {
    let (query, field) = control.mutation();
    let result: Result<Option<ActivitySession>, _> =
        backend.fetch(query, json!({ "id": session_id }), field).await;

    match result {
        Ok(Some(session)) => {
            log::info!("[CALLBACK] Session {} {}d", session.id, control.verb());
            match control {
                SessionControl::Pause => Reply::markdown(
                    "⏸️ *Session Paused*\n\nUse /session to resume or stop.",
                ),
                SessionControl::Resume => Reply::markdown(
                    "▶️ *Session Resumed*\n\nTimer is running. Use /session for controls.",
                ),
                SessionControl::Stop => Reply::markdown(format!(
                    "⏹️ *Session Completed*\n\n⏱️ Duration: {}\n\n✨ Great work! Use /session to start another.",
                    format_duration(session.duration.unwrap_or(0))
                )),
            }
        }
        Ok(None) => Reply::plain(format!("❌ Failed to {} session.", control.verb())),
        Err(e) if e.mentions("not found") => match control {
            SessionControl::Stop => Reply::plain(
                "⚠️ Session not found. It may have already been stopped.\n\nUse /session to check status.",
            ),
            _ => Reply::plain(
                "⚠️ Session not found. It may have been stopped.\n\nUse /session to check.",
            ),
        },
        Err(e) => session_error(control.verb(), &e, 150),
    }
}

/// Backend errors show their message; anything else gets a generic notice.
fn session_error(verb: &str, error: &GraphQLError, max_chars: usize) -> Reply {
    log::error!("[CALLBACK] Session {} failed: {}", verb, error);
    match error {
        GraphQLError::Timeout => Reply::markdown(TIMED_OUT),
        GraphQLError::Query { .. } => {
            Reply::plain(format!("❌ Error: {}", clip(&error.to_string(), max_chars)))
        }
        _ if verb == "start" => Reply::plain("❌ Unexpected error. Please try /session again."),
        _ => Reply::plain("❌ Unexpected error. Use /session to check status."),
    }
}

async fn schedule(backend: &BackendSession, period: Period, now: NaiveDateTime) -> Reply {
    let (start, end) = period.range(now.date());
    let events: Vec<Event> = match backend
        .fetch(
            queries::EVENTS,
            json!({
                "startDate": start.format("%Y-%m-%d").to_string(),
                "endDate": end.format("%Y-%m-%d").to_string(),
            }),
            "events",
        )
        .await
    {
        Ok(events) => events.unwrap_or_default(),
        Err(e) => {
            log::error!("[CALLBACK] Failed to load {} schedule: {}", period.as_ref(), e);
            return Reply::plain("❌ Error loading schedule.");
        }
    };
    let events = sort_events(events);

    let mut text = match period {
        Period::Week => format!("📅 *Week of {}*\n\n", start.format("%B %d")),
        Period::Month => format!("📅 *{}*\n\n", start.format("%B %Y")),
        _ => format!("📅 *{}*\n\n", start.format("%A, %B %d, %Y")),
    };

    if events.is_empty() {
        text.push_str("🌟 No events scheduled!\n");
    } else {
        for event in events.iter().take(SCHEDULE_EVENTS_SHOWN) {
            text.push_str(&event_line(event, period));
        }
        if events.len() > SCHEDULE_EVENTS_SHOWN {
            text.push_str(&format!(
                "\n_...and {} more events._\n",
                events.len() - SCHEDULE_EVENTS_SHOWN
            ));
        }
    }

    Reply::markdown(text).with_keyboard(vec![
        vec![
            Button::new("◀️ Yesterday", "schedule:yesterday"),
            Button::new("Tomorrow ▶️", "schedule:tomorrow"),
        ],
        vec![
            Button::new("📆 This Week", "schedule:week"),
            Button::new("📅 This Month", "schedule:month"),
        ],
        vec![
            Button::new("⏺️ Today", "schedule:today"),
            Button::new("➕ New Event", "event:create"),
        ],
    ])
}

async fn stats(backend: &BackendSession, period: Period, now: NaiveDateTime) -> Reply {
    let (start, end) = period.range(now.date());
    let stats = match fetch_stats(backend, start, end).await {
        Ok(stats) => stats,
        Err(e) => {
            log::error!("[CALLBACK] Failed to load stats: {}", e);
            return Reply::plain("❌ Error loading stats.");
        }
    };

    let mut text = format!(
        "📊 *Stats: {}*\n\n• Activities: {}\n• Time: {:.1} hours\n\n",
        period.stats_label(),
        stats.total_activities,
        stats.total_hours
    );
    text.push_str(&top_skills(&stats, STATS_TOP_SKILLS));

    Reply::markdown(text).with_keyboard(stats_keyboard())
}

async fn note_detail(backend: &BackendSession, note_id: &str) -> Reply {
    let note: Option<Note> = match backend.fetch(queries::NOTE, json!({ "id": note_id }), "note").await {
        Ok(note) => note,
        Err(e) => {
            log::error!("[CALLBACK] Failed to load note {}: {}", note_id, e);
            return Reply::plain("❌ Error loading note.");
        }
    };
    let Some(note) = note else {
        return Reply::plain("❌ Note not found.");
    };

    let content = note.content.as_deref().unwrap_or_default();
    let mut text = format!(
        "📝 *{}*\n\n{}\n\n",
        note.title,
        truncate(content, NOTE_CONTENT_PREVIEW, NOTE_CONTENT_PREVIEW)
    );
    if !note.tags.is_empty() {
        text.push_str(&format!("🏷️ {}\n\n", format_tags(&note.tags, note.tags.len())));
    }
    if let Some(created) = note.created_at.as_deref().and_then(parse_timestamp) {
        text.push_str(&format!("📅 Created: {}\n", created.format("%B %d, %Y at %I:%M %p")));
    }

    Reply::markdown(text).with_keyboard(vec![vec![
        Button::new("🗑️ Delete", format!("note:delete:{}", note_id)),
        Button::new("« Back", "note:list"),
    ]])
}

fn event_templates() -> Reply {
    Reply::markdown(
        "📋 *Event Templates*\n\n\
         Choose a template to quickly create an event:\n\n\
         ⏰ *Quick Meeting* - 30 min meeting starting now\n\
         📚 *Study Session* - 1 hour learning session\n\
         🔔 *Reminder* - Quick reminder for later today\n",
    )
    .with_keyboard(vec![
        vec![Button::new("⏰ Quick Meeting", "event:template:meeting")],
        vec![Button::new("📚 Study Session", "event:template:study")],
        vec![Button::new("🔔 Reminder", "event:template:reminder")],
        vec![Button::new("« Back", "schedule:today")],
    ])
}

async fn event_detail(backend: &BackendSession, event_id: &str) -> Reply {
    let event: Option<Event> = match backend
        .fetch(queries::EVENT, json!({ "id": event_id }), "event")
        .await
    {
        Ok(event) => event,
        Err(e) => {
            log::error!("[CALLBACK] Failed to load event {}: {}", event_id, e);
            return Reply::plain("❌ Error loading event.");
        }
    };
    let Some(event) = event else {
        return Reply::plain("❌ Event not found.");
    };

    Reply::markdown(render_event_detail(&event)).with_keyboard(vec![vec![
        Button::new("🗑️ Delete", format!("event:delete:{}", event_id)),
        Button::new("« Back", "schedule:today"),
    ]])
}

pub fn render_event_detail(event: &Event) -> String {
    let mut text = format!(
        "{} *{}*\n\n",
        event_type_emoji(event.event_type.as_deref()),
        event.title
    );

    if event.all_day.unwrap_or(false) {
        text.push_str("🌅 All Day Event\n\n");
    } else if let Some(start) = event.start_time.as_deref().and_then(parse_timestamp) {
        let end = event.end_time.as_deref().and_then(parse_timestamp);
        match end {
            Some(end) => text.push_str(&format!(
                "🕐 {} - {}\n",
                start.format("%I:%M %p"),
                end.format("%I:%M %p")
            )),
            None => text.push_str(&format!("🕐 {}\n", start.format("%I:%M %p"))),
        }
        text.push_str(&format!("📅 {}\n\n", start.format("%A, %B %d, %Y")));
    }

    if let Some(description) = event.description.as_deref().filter(|d| !d.is_empty()) {
        text.push_str(&format!("{}\n\n", description));
    }
    if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
        text.push_str(&format!("📍 {}\n\n", location));
    }
    if let Some(attendees) = event.attendees.as_ref().filter(|a| !a.is_empty()) {
        text.push_str(&format!("👥 Attendees: {}\n\n", attendees.join(", ")));
    }

    text
}

/// Body of a `createEvent` mutation. Wall-clock times are sent as UTC.
pub fn create_event_input(title: &str, event_type: &str, start: NaiveDateTime, end: NaiveDateTime) -> Value {
    json!({
        "input": {
            "title": title,
            "type": event_type,
            "startTime": start.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "endTime": end.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "allDay": false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::testing::ScriptedExecutor;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn backend(exec: ScriptedExecutor) -> (Arc<ScriptedExecutor>, BackendSession) {
        let exec = Arc::new(exec);
        (exec.clone(), BackendSession::new(exec, Some("tok".to_string())))
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 13)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap()
    }

    async fn press(backend: &BackendSession, store: &SessionStore, data: &str) -> CallbackOutcome {
        handle(backend, store, 1, CallbackAction::parse(data), now()).await
    }

    fn edited(outcome: &CallbackOutcome) -> &Reply {
        outcome.edit.as_ref().expect("message edit")
    }

    #[test]
    fn test_parse_callback_data() {
        assert_eq!(CallbackAction::parse("cancel"), CallbackAction::Cancel);
        assert_eq!(CallbackAction::parse("quick_start:s1"), CallbackAction::StartSkill("s1".into()));
        assert_eq!(CallbackAction::parse("start_skill:s1"), CallbackAction::StartSkill("s1".into()));
        assert_eq!(CallbackAction::parse("schedule:week"), CallbackAction::Schedule(Period::Week));
        assert_eq!(CallbackAction::parse("schedule:bogus"), CallbackAction::Schedule(Period::Today));
        assert_eq!(CallbackAction::parse("stats:yesterday"), CallbackAction::Stats(Period::Today));
        assert_eq!(CallbackAction::parse("note:view:n1"), CallbackAction::NoteView("n1".into()));
        assert_eq!(CallbackAction::parse("note:list"), CallbackAction::NoteList);
        assert_eq!(
            CallbackAction::parse("event:template:study"),
            CallbackAction::EventTemplate("study".into())
        );
        assert_eq!(
            CallbackAction::parse("files_list:/docs/work"),
            CallbackAction::FilesList("/docs/work".into())
        );
        assert_eq!(CallbackAction::parse("bogus"), CallbackAction::Unknown("bogus".into()));
        assert_eq!(CallbackAction::parse("note:frobnicate"), CallbackAction::Unknown("note:frobnicate".into()));
    }

    #[tokio::test]
    async fn test_start_session_success() {
        let (exec, backend) = backend(
            ScriptedExecutor::new()
                .on("query GetSkill(", json!({ "skill": { "id": "s1", "name": "Python" } }))
                .on("mutation StartSession", json!({ "startSession": { "id": "a1", "status": "ACTIVE" } })),
        );
        let store = SessionStore::new();

        let outcome = press(&backend, &store, "quick_start:s1").await;
        assert!(edited(&outcome).text.starts_with("✅ *Session Started!*\n\n📚 Python"));

        let calls = exec.calls_matching("mutation StartSession");
        assert_eq!(calls[0].variables["name"], "Python practice");
        assert_eq!(calls[0].variables["skillId"], "s1");
    }

    #[tokio::test]
    async fn test_start_session_already_active() {
        let (_, backend) = backend(
            ScriptedExecutor::new()
                .on("query GetSkill(", json!({ "skill": { "id": "s1", "name": "Python" } }))
                .fail(
                    "mutation StartSession",
                    GraphQLError::Query { messages: vec!["You already have an active session".into()] },
                ),
        );
        let outcome = press(&backend, &SessionStore::new(), "start_skill:s1").await;
        assert!(edited(&outcome).text.contains("Session Already Active"));
    }

    #[tokio::test]
    async fn test_start_session_unknown_skill() {
        let (exec, backend) = backend(ScriptedExecutor::new().on("query GetSkill(", json!({ "skill": null })));
        let outcome = press(&backend, &SessionStore::new(), "start_skill:nope").await;
        assert_eq!(edited(&outcome).text, "❌ Skill not found.");
        assert!(exec.calls_matching("StartSession").is_empty());
    }

    #[tokio::test]
    async fn test_stop_session_reports_duration() {
        let (_, backend) = backend(ScriptedExecutor::new().on(
            "mutation StopSession",
            json!({ "stopSession": { "id": "a1", "status": "COMPLETED", "duration": 130 } }),
        ));
        let outcome = press(&backend, &SessionStore::new(), "stop_session:a1").await;
        assert!(edited(&outcome).text.contains("⏱️ Duration: 2h 10m"));
    }

    #[tokio::test]
    async fn test_pause_session_errors() {
        let (_, backend) = backend(
            ScriptedExecutor::new()
                .fail("mutation PauseSession", GraphQLError::Query { messages: vec!["session not found".into()] })
                .fail("mutation ResumeSession", GraphQLError::Query { messages: vec!["x".repeat(300)] }),
        );
        let store = SessionStore::new();

        let paused = press(&backend, &store, "pause_session:a1").await;
        assert!(edited(&paused).text.starts_with("⚠️ Session not found. It may have been stopped."));

        let resumed = press(&backend, &store, "resume_session:a1").await;
        assert_eq!(edited(&resumed).text, format!("❌ Error: {}", "x".repeat(150)));
    }

    #[tokio::test]
    async fn test_skill_menu_lists_ten_and_cancel() {
        let skills: Vec<_> = (0..12).map(|i| json!({ "id": format!("s{}", i), "name": format!("S{}", i) })).collect();
        let (_, backend) = backend(ScriptedExecutor::new().on("query GetSkills", json!({ "skills": skills })));
        let outcome = press(&backend, &SessionStore::new(), "start_session_menu").await;
        let reply = edited(&outcome);
        assert_eq!(reply.keyboard.len(), 11);
        assert_eq!(reply.keyboard[0][0].data, "start_skill:s0");
        assert_eq!(reply.keyboard[10][0].data, "cancel");
    }

    #[tokio::test]
    async fn test_week_schedule_uses_monday_range_and_dates() {
        let (exec, backend) = backend(ScriptedExecutor::new().on("query GetEvents", json!({ "events": [
            { "id": "1", "title": "Gym", "startTime": "2026-02-10T07:00:00Z", "type": "ACTIVITY" }
        ] })));
        let outcome = press(&backend, &SessionStore::new(), "schedule:week").await;
        let reply = edited(&outcome);
        assert!(reply.text.starts_with("📅 *Week of February 09*"));
        assert!(reply.text.contains("✅ 02/10 *07:00 AM* - Gym"));
        assert_eq!(reply.keyboard[2][0].data, "schedule:today");

        let calls = exec.calls_matching("query GetEvents");
        assert_eq!(calls[0].variables["startDate"], "2026-02-09");
        assert_eq!(calls[0].variables["endDate"], "2026-02-15");
    }

    #[tokio::test]
    async fn test_schedule_caps_at_fifteen() {
        let events: Vec<_> = (0..18)
            .map(|i| json!({ "title": format!("E{}", i), "startTime": format!("2026-02-13T{:02}:00:00Z", i) }))
            .collect();
        let (_, backend) = backend(ScriptedExecutor::new().on("query GetEvents", json!({ "events": events })));
        let outcome = press(&backend, &SessionStore::new(), "schedule:today").await;
        assert!(edited(&outcome).text.contains("_...and 3 more events._"));
    }

    #[tokio::test]
    async fn test_month_stats() {
        let (exec, backend) = backend(ScriptedExecutor::new().on("activityStats", json!({ "activityStats": {
            "totalActivities": 12, "totalHours": 9.5, "skillBreakdown": []
        } })));
        let outcome = press(&backend, &SessionStore::new(), "stats:month").await;
        let reply = edited(&outcome);
        assert!(reply.text.starts_with("📊 *Stats: This Month*"));
        assert!(reply.text.contains("• Activities: 12\n• Time: 9.5 hours"));
        assert!(!reply.text.contains("Top Skills"));
        assert_eq!(exec.calls_matching("activityStats")[0].variables["endDate"], "2026-02-28");
    }

    #[tokio::test]
    async fn test_note_create_and_search_set_pending() {
        let (_, backend) = backend(ScriptedExecutor::new());
        let store = SessionStore::new();

        press(&backend, &store, "note:create").await;
        assert_eq!(store.get(1).pending, PendingInput::Note);

        press(&backend, &store, "note:search").await;
        assert_eq!(store.get(1).pending, PendingInput::NoteSearch);

        press(&backend, &store, "event:create").await;
        assert_eq!(store.get(1).pending, PendingInput::Event);
    }

    #[tokio::test]
    async fn test_note_detail_truncates_content() {
        let (_, backend) = backend(ScriptedExecutor::new().on("query GetNote(", json!({ "note": {
            "id": "n1", "title": "Long", "content": "y".repeat(600), "tags": ["a", "b", "c"],
            "createdAt": "2026-02-01T08:30:00Z"
        } })));
        let outcome = press(&backend, &SessionStore::new(), "note:view:n1").await;
        let reply = edited(&outcome);
        assert!(reply.text.contains(&format!("{}...", "y".repeat(500))));
        assert!(reply.text.contains("🏷️ #a #b #c"));
        assert!(reply.text.contains("📅 Created: February 01, 2026 at 08:30 AM"));
        assert_eq!(reply.button_data(), vec!["note:delete:n1", "note:list"]);
    }

    #[tokio::test]
    async fn test_note_list_error_uses_callback_text() {
        let (_, backend) = backend(ScriptedExecutor::new().fail("query GetNotes", GraphQLError::Transport("down".into())));
        let outcome = press(&backend, &SessionStore::new(), "note:list").await;
        assert_eq!(edited(&outcome).text, "❌ Error loading notes.");
    }

    #[tokio::test]
    async fn test_event_template_sets_pending_template() {
        let (_, backend) = backend(ScriptedExecutor::new());
        let store = SessionStore::new();

        let outcome = press(&backend, &store, "event:template:reminder").await;
        let reply = edited(&outcome);
        assert!(reply.text.contains("Start: 04:00 PM"));
        assert!(reply.text.contains("End: 04:15 PM"));
        assert!(reply.text.contains("Type: REMINDER"));

        match store.get(1).pending {
            PendingInput::EventTitle(template) => assert_eq!(template.title, "Reminder"),
            other => panic!("unexpected pending input {:?}", other),
        }

        let invalid = press(&backend, &store, "event:template:party").await;
        assert_eq!(edited(&invalid).text, "❌ Invalid template type.");
    }

    #[test]
    fn test_event_detail_rendering() {
        let event: Event = serde_json::from_value(json!({
            "id": "e1", "title": "Sync", "type": "MEETING",
            "startTime": "2026-02-13T14:00:00Z", "endTime": "2026-02-13T15:00:00Z",
            "location": "Room 4", "attendees": ["ann", "bob"], "description": ""
        }))
        .unwrap();
        let text = render_event_detail(&event);
        assert!(text.starts_with("👥 *Sync*\n\n🕐 02:00 PM - 03:00 PM\n📅 Friday, February 13, 2026\n\n"));
        assert!(text.contains("📍 Room 4\n\n"));
        assert!(text.contains("👥 Attendees: ann, bob"));
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let (_, backend) = backend(ScriptedExecutor::new());
        let outcome = press(&backend, &SessionStore::new(), "mystery").await;
        assert_eq!(edited(&outcome).text, "Unknown action: mystery");
    }

    #[test]
    fn test_create_event_input_format() {
        let start = now();
        let input = create_event_input("Sync", "MEETING", start, start + Duration::minutes(45));
        assert_eq!(input["input"]["startTime"], "2026-02-13T14:00:00Z");
        assert_eq!(input["input"]["endTime"], "2026-02-13T14:45:00Z");
        assert_eq!(input["input"]["allDay"], false);
    }
}
