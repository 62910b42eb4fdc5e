//! Typed views of the backend objects the bot reads.
//!
//! Every field the bot does not strictly need is optional: different
//! documents select different subsets of the same backend type.

use serde::{Deserialize, Deserializer, Serialize};

/// Treats an explicit `null` like a missing field.
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthPayload {
    #[serde(default)]
    pub token: Option<String>,
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkillRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySession {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Minutes
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub skill: Option<SkillRef>,
}

impl ActivitySession {
    pub fn is_paused(&self) -> bool {
        self.status.as_deref() == Some("PAUSED")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub all_day: Option<bool>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NoteConnection {
    #[serde(default, deserialize_with = "null_default")]
    pub nodes: Vec<Note>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStats {
    #[serde(default, deserialize_with = "null_default")]
    pub total_activities: i64,
    #[serde(default, deserialize_with = "null_default")]
    pub total_minutes: i64,
    #[serde(default, deserialize_with = "null_default")]
    pub total_hours: f64,
    #[serde(default, deserialize_with = "null_default")]
    pub skill_breakdown: Vec<SkillStat>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillStat {
    pub skill_name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub activity_count: i64,
    #[serde(default, deserialize_with = "null_default")]
    pub total_hours: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub original_filename: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub telegram_file_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl FileRecord {
    pub fn display_name(&self) -> &str {
        self.original_filename
            .as_deref()
            .or(self.filename.as_deref())
            .unwrap_or("unnamed")
    }

    pub fn is_image(&self) -> bool {
        self.mime_type
            .as_deref()
            .map(|m| m.starts_with("image/"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConnection {
    #[serde(default, deserialize_with = "null_default")]
    pub nodes: Vec<FileRecord>,
    #[serde(default)]
    pub total_count: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryInfo {
    #[serde(default, deserialize_with = "null_default")]
    pub subdirectories: Vec<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub file_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingNotification {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub reminder_id: Option<String>,
    #[serde(default)]
    pub scheduled_time: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub notification_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_time: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_field_is_renamed() {
        let event: Event = serde_json::from_value(json!({
            "id": "e1",
            "title": "Standup",
            "startTime": "2026-02-13T09:00:00Z",
            "type": "MEETING",
            "allDay": false
        }))
        .unwrap();
        assert_eq!(event.event_type.as_deref(), Some("MEETING"));
        assert_eq!(event.start_time.as_deref(), Some("2026-02-13T09:00:00Z"));
    }

    #[test]
    fn test_file_record_helpers() {
        let file: FileRecord = serde_json::from_value(json!({
            "id": "f1",
            "originalFilename": "cat.jpg",
            "mimeType": "image/jpeg"
        }))
        .unwrap();
        assert_eq!(file.display_name(), "cat.jpg");
        assert!(file.is_image());
    }

    #[test]
    fn test_stats_tolerate_missing_fields() {
        let stats: ActivityStats = serde_json::from_value(json!({ "totalActivities": 3 })).unwrap();
        assert_eq!(stats.total_activities, 3);
        assert!(stats.skill_breakdown.is_empty());
    }
}
