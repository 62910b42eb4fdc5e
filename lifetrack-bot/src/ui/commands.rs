//! Slash-command views. Each returns the reply for a logged-in chat; login
//! gating happens in the dispatcher.

use chrono::NaiveDate;
use serde_json::json;
use teloxide::utils::html;

use super::dates::{week_range, Period};
use super::{
    error_reply, event_type_emoji, format_duration, format_tags, parse_timestamp,
    skill_level_emoji, truncate, Button, Reply, SEPARATOR,
};
use crate::graphql::models::{ActivitySession, ActivityStats, Event, NoteConnection, Skill};
use crate::graphql::{queries, BackendSession, GraphQLError};

const SESSION_SKILLS_SHOWN: usize = 8;
const NOTES_FETCHED: i64 = 10;
const NOTES_SHOWN: usize = 5;
const NOTE_BUTTON_TITLE: usize = 35;
const OVERVIEW_TOP_SKILLS: usize = 3;

pub fn welcome(first_name: &str, logged_in: bool) -> Reply {
    let mut text = format!(
        "👋 Hi {}!\n\n\
         Welcome to <b>LifeTrack Bot</b>! Track your learning journey with quick, visual controls.\n\n\
         ⚡ <b>Commands:</b>\n\
         • /session - Manage sessions &amp; view skills\n\
         • /schedule - View your calendar\n\
         • /stats - Check your progress\n\
         • /notes - Access your notes\n\
         • /files - Browse your files\n\
         • /help - Full command list\n\n",
        html::escape(first_name)
    );
    if logged_in {
        text.push_str("🚀 <b>Try /session to get started!</b>");
    } else {
        text.push_str("🔑 <b>Link your account first:</b>\n<code>/link your@email.com password</code>");
    }
    Reply::html(text)
}

pub fn help() -> Reply {
    Reply::markdown(
        "📚 *LifeTrack Bot Commands*\n\n\
         *🎮 Main Commands:*\n\n\
         /session - Unified session & skills view\n\
         • View active session with controls\n\
         • Browse all your skills\n\
         • Quick-start any skill with one tap\n\
         • Pause/resume/stop active sessions\n\n\
         /schedule - Calendar view\n\
         • Today's events\n\
         • Navigate days/weeks\n\
         • Event type indicators\n\n\
         /stats - Progress dashboard\n\
         • Activity metrics\n\
         • Switch time periods\n\
         • Top skills breakdown\n\n\
         /notes - Recent notes\n\
         • View last 5 notes\n\
         • Create and search notes\n\n\
         /files - File storage\n\
         • Browse directories\n\
         • Send a document or photo to upload it\n\
         • /cd sets the upload directory\n\n\
         *📋 Aliases:*\n\
         /skills - Same as /session\n\n\
         *🔑 Account:*\n\
         /link - Link your LifeTrack account\n\
         /logout - Forget your login\n\n\
         *ℹ️ Other:*\n\
         /start - Welcome\n\
         /help - This help\n\n\
         💡 *Tip:* Use /session for everything related to learning sessions and skills!",
    )
}

/// Active session controls plus the skill list.
pub async fn session_overview(backend: &BackendSession) -> Reply {
    let active: Option<ActivitySession> =
        match backend.fetch(queries::ACTIVE_SESSION, json!({}), "activeSession").await {
            Ok(active) => active,
            Err(e) => {
                log::error!("[UI] Failed to load active session: {}", e);
                return error_reply(&e, "❌ Error loading session/skills. Please try again.");
            }
        };

    match &active {
        Some(a) => log::info!("[UI] Active session {} ({:?})", a.id, a.status),
        None => log::info!("[UI] No active session"),
    }

    // The skill list is decoration; the session controls still work without it
    let skills: Vec<Skill> = match backend.fetch(queries::SKILLS, json!({}), "skills").await {
        Ok(skills) => skills.unwrap_or_default(),
        Err(e) => {
            log::warn!("[UI] Failed to fetch skills: {}", e);
            Vec::new()
        }
    };

    render_session_overview(active.as_ref(), &skills)
}

pub fn render_session_overview(active: Option<&ActivitySession>, skills: &[Skill]) -> Reply {
    let mut keyboard = Vec::new();
    let mut text = String::new();

    match active {
        Some(session) => {
            let controls = if session.is_paused() {
                Button::new("▶️ Resume", format!("resume_session:{}", session.id))
            } else {
                Button::new("⏸️ Pause", format!("pause_session:{}", session.id))
            };
            keyboard.push(vec![
                controls,
                Button::new("⏹️ Stop", format!("stop_session:{}", session.id)),
            ]);

            let skill_name = session
                .skill
                .as_ref()
                .map(|s| s.name.as_str())
                .unwrap_or("Unknown skill");
            let status_emoji = if session.status.as_deref() == Some("ACTIVE") {
                "⏱️"
            } else {
                "⏸️"
            };
            text.push_str(&format!(
                "{} *Active: {}* • {}\n\n{}\n\n",
                status_emoji,
                skill_name,
                format_duration(session.duration.unwrap_or(0)),
                SEPARATOR
            ));
        }
        None => {
            keyboard.push(vec![Button::new("▶️ Start Session", "start_session_menu")]);
            text.push_str(&format!("📭 No active session\n\n{}\n\n", SEPARATOR));
        }
    }

    if skills.is_empty() {
        text.push_str("📚 *Skills*\n\nNo skills yet. Create skills in the web app!");
        return Reply::markdown(text).with_keyboard(keyboard);
    }

    let active_skill_id = active.and_then(|a| a.skill.as_ref()).map(|s| s.id.as_str());

    text.push_str(&format!("📚 *All Skills* ({})\n\n", skills.len()));
    for skill in skills.iter().take(SESSION_SKILLS_SHOWN) {
        text.push_str(&format!("{} {}", skill_level_emoji(skill.level.as_deref()), skill.name));
        if active_skill_id == Some(skill.id.as_str()) {
            text.push_str(" ⚡");
        }
        text.push('\n');
    }
    if skills.len() > SESSION_SKILLS_SHOWN {
        text.push_str(&format!("\n_+{} more_", skills.len() - SESSION_SKILLS_SHOWN));
    }

    if active.is_none() {
        for skill in skills.iter().take(SESSION_SKILLS_SHOWN) {
            keyboard.push(vec![Button::new(
                format!("▶️ {}", skill.name),
                format!("quick_start:{}", skill.id),
            )]);
        }
    }

    Reply::markdown(text).with_keyboard(keyboard)
}

/// Today's events with day/week/month navigation.
pub async fn schedule_today(backend: &BackendSession, today: NaiveDate) -> Reply {
    let day = today.format("%Y-%m-%d").to_string();
    let events: Vec<Event> = match backend
        .fetch(queries::EVENTS, json!({ "startDate": day, "endDate": day }), "events")
        .await
    {
        Ok(events) => events.unwrap_or_default(),
        Err(e) => {
            log::error!("[UI] Failed to load schedule: {}", e);
            return error_reply(&e, "❌ Error fetching schedule. Please try again.");
        }
    };

    let mut text = format!("📅 *{}*\n\n", today.format("%A, %B %d, %Y"));
    let events = sort_events(events);
    if events.is_empty() {
        text.push_str("🌟 No events scheduled for today!\n\n_Add your first event using the buttons below._");
    } else {
        for event in &events {
            text.push_str(&event_line(event, Period::Today));
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
            Button::new("➕ New Event", "event:create"),
            Button::new("📋 Event Templates", "event:templates"),
        ],
    ])
}

/// Events ordered by start time; events without one sort first.
pub fn sort_events(mut events: Vec<Event>) -> Vec<Event> {
    events.sort_by(|a, b| {
        a.start_time
            .as_deref()
            .unwrap_or("")
            .cmp(b.start_time.as_deref().unwrap_or(""))
    });
    events
}

/// One schedule line. Multi-day views prefix the date.
pub fn event_line(event: &Event, period: Period) -> String {
    let emoji = event_type_emoji(event.event_type.as_deref());
    if event.all_day.unwrap_or(false) {
        return format!("{} 🌅 *All Day* - {}\n", emoji, event.title);
    }
    match event.start_time.as_deref().and_then(parse_timestamp) {
        Some(start) if period.is_multi_day() => format!(
            "{} {} *{}* - {}\n",
            emoji,
            start.format("%m/%d"),
            start.format("%I:%M %p"),
            event.title
        ),
        Some(start) => format!("{} *{}* - {}\n", emoji, start.format("%I:%M %p"), event.title),
        None => format!("{} {}\n", emoji, event.title),
    }
}

pub async fn recent_notes(backend: &BackendSession) -> Reply {
    match load_recent_notes(backend).await {
        Ok(reply) => reply,
        Err(e) => {
            log::error!("[UI] Failed to load notes: {}", e);
            error_reply(&e, "❌ Error fetching notes. Please try again.")
        }
    }
}

/// Latest notes with a view button per note
pub async fn load_recent_notes(backend: &BackendSession) -> Result<Reply, GraphQLError> {
    let notes = backend
        .fetch::<NoteConnection>(queries::NOTES, json!({ "limit": NOTES_FETCHED }), "notes")
        .await?
        .map(|c| c.nodes)
        .unwrap_or_default();

    if notes.is_empty() {
        return Ok(Reply::markdown("📝 *No Notes Yet*\n\nCreate your first note!")
            .with_keyboard(vec![vec![Button::new("➕ Create Note", "note:create")]]));
    }

    let mut text = format!("📝 *Recent Notes* ({})\n\n", notes.len());
    let mut keyboard = Vec::new();
    for (i, note) in notes.iter().take(NOTES_SHOWN).enumerate() {
        text.push_str(&format!("{}. *{}*", i + 1, note.title));
        let tags = format_tags(&note.tags, 2);
        if !tags.is_empty() {
            text.push(' ');
            text.push_str(&tags);
        }
        text.push('\n');

        keyboard.push(vec![Button::new(
            format!("{}. {}", i + 1, truncate(&note.title, NOTE_BUTTON_TITLE, NOTE_BUTTON_TITLE)),
            format!("note:view:{}", note.id),
        )]);
    }
    if notes.len() > NOTES_SHOWN {
        text.push_str(&format!("\n_...and {} more._\n", notes.len() - NOTES_SHOWN));
    }

    keyboard.push(vec![
        Button::new("➕ Create Note", "note:create"),
        Button::new("🔍 Search", "note:search"),
    ]);

    Ok(Reply::markdown(text).with_keyboard(keyboard))
}

pub fn stats_keyboard() -> Vec<Vec<Button>> {
    vec![vec![
        Button::new("Today", "stats:today"),
        Button::new("Week", "stats:week"),
        Button::new("Month", "stats:month"),
    ]]
}

pub async fn fetch_stats(
    backend: &BackendSession,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<ActivityStats, GraphQLError> {
    let stats: Option<ActivityStats> = backend
        .fetch(
            queries::ACTIVITY_STATS,
            json!({
                "startDate": start.format("%Y-%m-%d").to_string(),
                "endDate": end.format("%Y-%m-%d").to_string(),
            }),
            "activityStats",
        )
        .await?;
    Ok(stats.unwrap_or_default())
}

pub fn top_skills(stats: &ActivityStats, limit: usize) -> String {
    if stats.skill_breakdown.is_empty() {
        return String::new();
    }
    let mut text = String::from("*Top Skills:*\n");
    for stat in stats.skill_breakdown.iter().take(limit) {
        text.push_str(&format!("• {}: {:.1}h\n", stat.skill_name, stat.total_hours));
    }
    text
}

/// Today and this week side by side.
pub async fn stats_overview(backend: &BackendSession, today: NaiveDate) -> Reply {
    let (week_start, week_end) = week_range(today);

    let result = async {
        let today_stats = fetch_stats(backend, today, today).await?;
        let week_stats = fetch_stats(backend, week_start, week_end).await?;
        Ok::<_, GraphQLError>((today_stats, week_stats))
    }
    .await;

    let (today_stats, week_stats) = match result {
        Ok(stats) => stats,
        Err(e) => {
            log::error!("[UI] Failed to load stats: {}", e);
            return error_reply(&e, "❌ Error fetching stats. Please try again.");
        }
    };

    let mut text = String::from("📊 *Your Activity Stats*\n\n");
    text.push_str(&format!(
        "*Today:*\n• Activities: {}\n• Time: {:.1} hours\n\n",
        today_stats.total_activities, today_stats.total_hours
    ));
    text.push_str(&format!(
        "*This Week:*\n• Activities: {}\n• Time: {:.1} hours\n\n",
        week_stats.total_activities, week_stats.total_hours
    ));
    text.push_str(&top_skills(&week_stats, OVERVIEW_TOP_SKILLS));

    Reply::markdown(text).with_keyboard(stats_keyboard())
}
