//! Plain-text messages answering an earlier prompt (note, search, event).

use chrono::{Duration, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use super::callbacks::create_event_input;
use super::{event_type_emoji, format_tags, EventType, Reply};
use crate::graphql::models::{Event, Note};
use crate::graphql::{queries, BackendSession};
use crate::sessions::{EventTemplate, PendingInput};

const NOTE_TITLE_MAX: usize = 50;
const SEARCH_RESULTS_SHOWN: usize = 5;

static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").unwrap());

const EVENT_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M"];
/// One week.
const MAX_EVENT_MINUTES: i64 = 7 * 24 * 60;

pub fn quick_commands() -> Reply {
    Reply::plain(
        "💡 Quick Commands:\n\n\
         • /session - Manage learning sessions\n\
         • /schedule - View calendar & create events\n\
         • /notes - View & create notes\n\
         • /stats - Check your progress\n\n\
         Use buttons in these commands for quick actions!",
    )
}

/// Answer the prompt the chat was waiting on. `None` when nothing was pending.
pub async fn handle_pending(backend: &BackendSession, pending: PendingInput, text: &str) -> Option<Reply> {
    let reply = match pending {
        PendingInput::None => return None,
        PendingInput::Note => create_note(backend, text).await,
        PendingInput::NoteSearch => search_notes(backend, text).await,
        PendingInput::Event => create_event(backend, text).await,
        PendingInput::EventTitle(template) => finalize_template(backend, template, text).await,
    };
    Some(reply)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

/// First line is the title and the rest the content; a single line is both.
/// `#tags` anywhere are collected and removed from the content.
pub fn parse_note(text: &str) -> Option<NoteDraft> {
    let tags: Vec<String> = TAG_PATTERN
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();
    let trimmed = text.trim();
    let lines: Vec<&str> = trimmed.split('\n').collect();

    let (title, content) = if lines.len() >= 2 {
        let content = lines[1..].join("\n");
        (
            lines[0].trim().to_string(),
            TAG_PATTERN.replace_all(&content, "").trim().to_string(),
        )
    } else {
        let clean = TAG_PATTERN.replace_all(text, "").trim().to_string();
        (clean.chars().take(NOTE_TITLE_MAX).collect(), clean)
    };

    if title.is_empty() || content.is_empty() {
        return None;
    }
    Some(NoteDraft { title, content, tags })
}

async fn create_note(backend: &BackendSession, text: &str) -> Reply {
    let Some(draft) = parse_note(text) else {
        return Reply::markdown(
            "❌ *Invalid Note Format*\n\n\
             Please provide at least a title and content.\n\n\
             Example:\n\
             `Meeting Notes\nDiscussed project timeline\n#work #meeting`",
        );
    };

    let created: Result<Option<Note>, _> = backend
        .fetch(
            queries::CREATE_NOTE,
            json!({ "input": { "title": draft.title, "content": draft.content, "tags": draft.tags } }),
            "createNote",
        )
        .await;

    match created {
        Ok(Some(note)) => {
            log::info!("[MESSAGE] Created note {}", note.id);
            Reply::markdown(format!(
                "✅ *Note Created!*\n\n📝 {}\n{}\n\nUse /notes to view all your notes.",
                note.title,
                format_tags(&draft.tags, draft.tags.len())
            ))
        }
        Ok(None) => Reply::plain("❌ Failed to create note."),
        Err(e) => {
            log::error!("[MESSAGE] Failed to create note: {}", e);
            Reply::plain("❌ Error creating note. Please try again.")
        }
    }
}

async fn search_notes(backend: &BackendSession, text: &str) -> Reply {
    let notes: Vec<Note> = match backend
        .fetch(queries::SEARCH_NOTES, json!({ "query": text }), "searchNotes")
        .await
    {
        Ok(notes) => notes.unwrap_or_default(),
        Err(e) => {
            log::error!("[MESSAGE] Note search failed: {}", e);
            return Reply::plain("❌ Error searching notes.");
        }
    };

    if notes.is_empty() {
        return Reply::markdown(format!(
            "🔍 *No results found for:* `{}`\n\nTry different keywords.",
            text
        ));
    }

    let mut message = format!("🔍 *Search Results* ({} found)\n\n", notes.len());
    for (i, note) in notes.iter().take(SEARCH_RESULTS_SHOWN).enumerate() {
        message.push_str(&format!("{}. *{}*", i + 1, note.title));
        let tags = format_tags(&note.tags, 2);
        if !tags.is_empty() {
            message.push(' ');
            message.push_str(&tags);
        }
        message.push('\n');
    }
    if notes.len() > SEARCH_RESULTS_SHOWN {
        message.push_str(&format!("\n_...and {} more._\n", notes.len() - SEARCH_RESULTS_SHOWN));
    }
    message.push_str("\nUse /notes to manage your notes.");

    Reply::markdown(message)
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_minutes: i64,
    pub event_type: EventType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventParseError {
    MissingLines,
    InvalidDateOrDuration,
}

/// Title, start, duration in minutes and an optional type, one per line.
pub fn parse_event(text: &str) -> Result<EventDraft, EventParseError> {
    let lines: Vec<&str> = text.trim().split('\n').collect();
    if lines.len() < 3 {
        return Err(EventParseError::MissingLines);
    }

    let date_time = lines[1].trim();
    let start = EVENT_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(date_time, fmt).ok())
        .ok_or(EventParseError::InvalidDateOrDuration)?;
    let duration_minutes: i64 = lines[2]
        .trim()
        .parse()
        .map_err(|_| EventParseError::InvalidDateOrDuration)?;
    if !(1..=MAX_EVENT_MINUTES).contains(&duration_minutes) {
        return Err(EventParseError::InvalidDateOrDuration);
    }
    let end = Duration::try_minutes(duration_minutes)
        .and_then(|d| start.checked_add_signed(d))
        .ok_or(EventParseError::InvalidDateOrDuration)?;
    let event_type = lines
        .get(3)
        .map(|t| EventType::parse_or_custom(t))
        .unwrap_or(EventType::Custom);

    Ok(EventDraft {
        title: lines[0].trim().to_string(),
        start,
        end,
        duration_minutes,
        event_type,
    })
}

async fn create_event(backend: &BackendSession, text: &str) -> Reply {
    let draft = match parse_event(text) {
        Ok(draft) => draft,
        Err(EventParseError::MissingLines) => {
            return Reply::markdown(
                "❌ *Invalid Event Format*\n\n\
                 Please provide:\n\
                 1. Title\n\
                 2. Date & Time (YYYY-MM-DD HH:MM)\n\
                 3. Duration (minutes)\n\
                 4. Type (optional: LEARNING/MEETING/REMINDER/CUSTOM)\n\n\
                 Example:\n\
                 `Team Meeting\n2026-02-13 14:00\n60\nMEETING`",
            );
        }
        Err(EventParseError::InvalidDateOrDuration) => {
            log::warn!("[MESSAGE] Could not parse event from {:?}", text);
            return Reply::markdown(
                "❌ *Invalid Date/Time or Duration*\n\n\
                 Use format: YYYY-MM-DD HH:MM\n\
                 Duration in minutes (e.g., 60)\n\n\
                 Example: `2026-02-13 14:00` and `60`",
            );
        }
    };

    let created: Result<Option<Event>, _> = backend
        .fetch(
            queries::CREATE_EVENT,
            create_event_input(&draft.title, draft.event_type.as_ref(), draft.start, draft.end),
            "createEvent",
        )
        .await;

    match created {
        Ok(Some(event)) => {
            log::info!("[MESSAGE] Created event {:?}", event.id);
            Reply::markdown(format!(
                "✅ *Event Created!*\n\n{} {}\n📅 {}\n⏱️ Duration: {} minutes\n\nUse /schedule to view your calendar.",
                draft.event_type.emoji(),
                event.title,
                draft.start.format("%A, %B %d at %I:%M %p"),
                draft.duration_minutes
            ))
        }
        Ok(None) => Reply::plain("❌ Failed to create event."),
        Err(e) => {
            log::error!("[MESSAGE] Failed to create event: {}", e);
            Reply::plain("❌ Error creating event. Please try again.")
        }
    }
}

/// `confirm` keeps the template's title; any other text replaces it.
async fn finalize_template(backend: &BackendSession, mut template: EventTemplate, text: &str) -> Reply {
    let text = text.trim();
    if !text.eq_ignore_ascii_case("confirm") {
        template.title = text.to_string();
    }

    let created: Result<Option<Event>, _> = backend
        .fetch(
            queries::CREATE_EVENT,
            create_event_input(&template.title, &template.event_type, template.start, template.end),
            "createEvent",
        )
        .await;

    match created {
        Ok(Some(event)) => {
            log::info!("[MESSAGE] Created event {:?} from template", event.id);
            Reply::markdown(format!(
                "✅ *Event Created!*\n\n{} {}\n📅 {}\n\nUse /schedule to view your calendar.",
                event_type_emoji(Some(&template.event_type)),
                event.title,
                template.start.format("%A, %B %d at %I:%M %p")
            ))
        }
        Ok(None) => Reply::plain("❌ Failed to create event."),
        Err(e) => {
            log::error!("[MESSAGE] Failed to create event from template: {}", e);
            Reply::plain("❌ Error creating event. Please try again.")
        }
    }
}
