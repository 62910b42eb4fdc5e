//! Chat replies, inline keyboards and the text templates shared by the
//! command, callback and message handlers.

pub mod callbacks;
pub mod commands;
pub mod dates;
pub mod files;
pub mod messages;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use strum::{AsRefStr, EnumString};

use crate::graphql::GraphQLError;

pub const LOGIN_REQUIRED: &str =
    "🔒 Please login first: `/link your@email.com password`\n\nSee /start for details.";

pub const SESSION_EXPIRED: &str = "🔒 Session expired. Please /start to login again.";

pub const TIMED_OUT: &str =
    "⏱️ *Request Timed Out*\n\nThe backend is taking too long to respond.\nPlease try again in a moment.";

pub const SEPARATOR: &str = "━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Markdown,
    Html,
    Plain,
}

/// Inline keyboard button carrying callback data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub parse_mode: ParseMode,
    pub keyboard: Vec<Vec<Button>>,
}

impl Reply {
    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::Markdown,
            keyboard: Vec::new(),
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::Plain,
            keyboard: Vec::new(),
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::Html,
            keyboard: Vec::new(),
        }
    }

    pub fn with_keyboard(mut self, keyboard: Vec<Vec<Button>>) -> Self {
        self.keyboard = keyboard;
        self
    }

    /// Callback data of every button, row by row
    pub fn button_data(&self) -> Vec<&str> {
        self.keyboard
            .iter()
            .flatten()
            .map(|b| b.data.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Document,
}

/// A file already stored on Telegram's side, re-sent by its file id
#[derive(Debug, Clone, PartialEq)]
pub struct SendFile {
    pub kind: MediaKind,
    pub telegram_file_id: String,
    pub caption: String,
}

/// What to do in response to an inline button press
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallbackOutcome {
    /// Short notice shown on the button itself
    pub toast: Option<String>,
    /// Replacement for the message holding the button
    pub edit: Option<Reply>,
    /// Sent as a new message
    pub file: Option<SendFile>,
    /// Sent as a new message
    pub follow_up: Option<Reply>,
}

impl CallbackOutcome {
    pub fn edit(reply: Reply) -> Self {
        Self {
            edit: Some(reply),
            ..Default::default()
        }
    }

    pub fn toast(text: impl Into<String>) -> Self {
        Self {
            toast: Some(text.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum EventType {
    Activity,
    Meeting,
    Learning,
    Reminder,
    Custom,
}

impl EventType {
    /// Unknown types fall back to `Custom`
    pub fn parse_or_custom(s: &str) -> Self {
        s.trim().parse().unwrap_or(EventType::Custom)
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            EventType::Activity => "✅",
            EventType::Meeting => "👥",
            EventType::Learning => "📚",
            EventType::Reminder => "🔔",
            EventType::Custom => "📌",
        }
    }
}

pub fn event_type_emoji(event_type: Option<&str>) -> &'static str {
    event_type
        .and_then(|t| t.parse::<EventType>().ok())
        .map(|t| t.emoji())
        .unwrap_or("📌")
}

pub fn skill_level_emoji(level: Option<&str>) -> &'static str {
    match level.unwrap_or_default() {
        "BEGINNER" => "🌱",
        "INTERMEDIATE" => "🌿",
        "ADVANCED" => "🌳",
        "EXPERT" => "🏆",
        _ => "📖",
    }
}

pub fn priority_emoji(priority: Option<&str>) -> &'static str {
    match priority.unwrap_or_default().to_uppercase().as_str() {
        "LOW" => "🔵",
        "MEDIUM" => "🟡",
        "HIGH" => "🔴",
        _ => "⚪",
    }
}

/// `2h 5m`, or `45m` under an hour
pub fn format_duration(minutes: i64) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}

/// Kilobytes below 1 MB, megabytes above. `compact` drops the space.
pub fn format_size(bytes: i64, compact: bool) -> String {
    let kb = bytes as f64 / 1024.0;
    let sep = if compact { "" } else { " " };
    if kb < 1024.0 {
        format!("{:.1}{}KB", kb, sep)
    } else {
        format!("{:.1}{}MB", kb / 1024.0, sep)
    }
}

/// Keeps `keep` characters and appends `...` when `text` is longer than `max`.
pub fn truncate(text: &str, max: usize, keep: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(keep).collect::<String>())
    } else {
        text.to_string()
    }
}

/// First `max` characters, no marker
pub fn clip(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub fn format_tags(tags: &[String], limit: usize) -> String {
    tags.iter()
        .take(limit)
        .map(|t| format!("#{}", t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Backend timestamps are RFC 3339; wall-clock strings without an offset are
/// read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw).ok().or_else(|| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

/// Chat reply for a failed backend call: timeouts get the timeout notice,
/// anything else `fallback`.
pub fn error_reply(error: &GraphQLError, fallback: &str) -> Reply {
    if error.is_timeout() {
        Reply::markdown(TIMED_OUT)
    } else {
        Reply::plain(fallback)
    }
}

/// Split text into chunks of at most `max_len` characters, preferring line
/// boundaries.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let line_len = line.chars().count();
        if current_len + line_len + 1 > max_len {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            // A single line that is too long is cut into pieces
            if line_len > max_len {
                let chars: Vec<char> = line.chars().collect();
                let mut pieces = chars.chunks(max_len).map(|c| c.iter().collect::<String>());
                let mut last = pieces.next_back().unwrap_or_default();
                chunks.extend(pieces);
                current_len = last.chars().count();
                current = std::mem::take(&mut last);
            } else {
                current = line.to_string();
                current_len = line_len;
            }
        } else {
            if !current.is_empty() {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(line);
            current_len += line_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
