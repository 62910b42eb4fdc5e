//! Plain-text rendering of arbitrary GraphQL results.

use serde_json::{Map, Value};

use crate::ui::format_duration;

const MAX_LIST_ITEMS: usize = 10;
const MAX_BREAKDOWN: usize = 5;

fn str_field<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

fn skill_name(data: &Map<String, Value>) -> &str {
    data.get("skill")
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
}

fn activity_name(data: &Map<String, Value>) -> &str {
    str_field(data, "name").unwrap_or("Session")
}

fn duration_line(data: &Map<String, Value>) -> Option<String> {
    data.get("duration")
        .and_then(Value::as_i64)
        .filter(|d| *d > 0)
        .map(|d| format!("⏱️ Duration: {}", format_duration(d)))
}

/// Render the first top-level field of a `data` object.
pub fn format_response(result: &Value) -> String {
    let Some((operation, data)) = result.as_object().and_then(|o| o.iter().next()) else {
        return "✅ Done!".to_string();
    };

    match data {
        Value::Null if operation.to_lowercase().contains("activesession") => {
            "ℹ️ You don't have an active learning session right now.".to_string()
        }
        Value::Null => "✅ Done!".to_string(),
        Value::Bool(true) => "✅ Completed successfully!".to_string(),
        Value::Bool(false) => "❌ Operation failed".to_string(),
        Value::Object(map) => format_object(map, operation),
        Value::Array(items) => format_list(items),
        other => format!("✅ Result: {}", other),
    }
}

fn format_object(data: &Map<String, Value>, operation: &str) -> String {
    let op = operation.to_lowercase();
    let mut lines: Vec<String> = Vec::new();

    if op.contains("stop") {
        lines.push(format!("⏹️ Stopped: {}", activity_name(data)));
        lines.push(format!("📚 Skill: {}", skill_name(data)));
        lines.extend(duration_line(data));
    } else if op.contains("pause") {
        lines.push(format!("⏸️ Paused: {}", activity_name(data)));
        lines.push(format!("📚 Skill: {}", skill_name(data)));
    } else if op.contains("resume") {
        lines.push(format!("▶️ Resumed: {}", activity_name(data)));
        lines.push(format!("📚 Skill: {}", skill_name(data)));
    } else if op.contains("active") {
        lines.push(format!("📚 Active Session: {}", activity_name(data)));
        lines.push(format!("🎯 Skill: {}", skill_name(data)));
        lines.push(format!("📊 Status: {}", str_field(data, "status").unwrap_or("ACTIVE")));
        lines.extend(duration_line(data));
        if let Some(started) = str_field(data, "startedAt").filter(|s| !s.is_empty()) {
            lines.push(format!("🕐 Started: {}", started));
        }
    } else if op.contains("session") {
        lines.push(format!("🚀 Started: {}", activity_name(data)));
        lines.push(format!("📚 Skill: {}", skill_name(data)));
        if let Some(started) = str_field(data, "startedAt") {
            lines.push(format!("⏰ Started at: {}", started));
        }
    } else if op.contains("stats") {
        let hours = data.get("totalHours").and_then(Value::as_f64).unwrap_or(0.0);
        let activities = data.get("totalActivities").and_then(Value::as_i64).unwrap_or(0);
        lines.push("📊 Statistics".to_string());
        lines.push(format!("⏱️ Total hours: {:.1}", hours));
        lines.push(format!("📝 Activities: {}", activities));

        let breakdown = data
            .get("skillBreakdown")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if !breakdown.is_empty() {
            lines.push("\n🎯 By skill:".to_string());
            for stat in breakdown.iter().take(MAX_BREAKDOWN) {
                let name = stat.get("skillName").and_then(Value::as_str).unwrap_or("Unknown");
                let hours = stat.get("totalHours").and_then(Value::as_f64).unwrap_or(0.0);
                lines.push(format!("  • {}: {:.1}h", name, hours));
            }
        }
    } else if op.contains("event") {
        lines.push(format!("📅 {}", str_field(data, "title").unwrap_or("Event")));
        if let Some(start) = str_field(data, "startTime").filter(|s| !s.is_empty()) {
            lines.push(format!("🕐 {}", start));
        }
    } else if op.contains("skill") {
        lines.push(format!("🎯 {}", str_field(data, "name").unwrap_or("Skill")));
        if let Some(level) = str_field(data, "level").filter(|s| !s.is_empty()) {
            lines.push(format!("Level: {}", level));
        }
    } else if op.contains("note") {
        lines.push(format!("📝 {}", str_field(data, "title").unwrap_or("Note")));
        let tags: Vec<&str> = data
            .get("tags")
            .and_then(Value::as_array)
            .map(|t| t.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if !tags.is_empty() {
            lines.push(format!("Tags: {}", tags.join(", ")));
        }
    } else {
        for (key, value) in data {
            if key == "id" || key == "__typename" || value.is_null() {
                continue;
            }
            match value {
                Value::String(s) => lines.push(format!("{}: {}", key, s)),
                other => lines.push(format!("{}: {}", key, other)),
            }
        }
    }

    if lines.is_empty() {
        "✅ Done!".to_string()
    } else {
        lines.join("\n")
    }
}

fn format_list(items: &[Value]) -> String {
    if items.is_empty() {
        return "No results found.".to_string();
    }

    let mut lines = vec![format!("Found {} results:\n", items.len())];
    for (i, item) in items.iter().take(MAX_LIST_ITEMS).enumerate() {
        let label = match item {
            Value::Object(map) => ["name", "title", "id"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .unwrap_or("Item")
                .to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        lines.push(format!("{}. {}", i + 1, label));
    }
    if items.len() > MAX_LIST_ITEMS {
        lines.push(format!("\n... and {} more", items.len() - MAX_LIST_ITEMS));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stop_session() {
        let text = format_response(&json!({
            "stopSession": { "id": "a1", "name": "Evening practice", "duration": 95, "skill": { "name": "Guitar" } }
        }));
        assert_eq!(text, "⏹️ Stopped: Evening practice\n📚 Skill: Guitar\n⏱️ Duration: 1h 35m");
    }

    #[test]
    fn test_null_active_session() {
        assert_eq!(
            format_response(&json!({ "activeSession": null })),
            "ℹ️ You don't have an active learning session right now."
        );
        assert_eq!(format_response(&json!({ "deleteNote": null })), "✅ Done!");
    }

    #[test]
    fn test_booleans() {
        assert_eq!(format_response(&json!({ "deleteEvent": true })), "✅ Completed successfully!");
        assert_eq!(format_response(&json!({ "deleteEvent": false })), "❌ Operation failed");
    }

    #[test]
    fn test_stats() {
        let text = format_response(&json!({
            "activityStats": {
                "totalHours": 3.25,
                "totalActivities": 4,
                "skillBreakdown": [{ "skillName": "Rust", "totalHours": 2.0 }]
            }
        }));
        assert!(text.starts_with("📊 Statistics\n⏱️ Total hours: 3.2"));
        assert!(text.contains("📝 Activities: 4"));
        assert!(text.ends_with("🎯 By skill:\n  • Rust: 2.0h"));
    }

    #[test]
    fn test_list_truncates_at_ten() {
        let items: Vec<Value> = (1..=12).map(|i| json!({ "id": format!("s{}", i), "name": format!("Skill {}", i) })).collect();
        let text = format_response(&json!({ "skills": items }));
        assert!(text.starts_with("Found 12 results:\n\n1. Skill 1"));
        assert!(text.contains("10. Skill 10"));
        assert!(!text.contains("11. Skill 11"));
        assert!(text.ends_with("... and 2 more"));
        assert_eq!(format_response(&json!({ "searchNotes": [] })), "No results found.");
    }

    #[test]
    fn test_note_and_generic() {
        assert_eq!(
            format_response(&json!({ "createNote": { "id": "n", "title": "Ideas", "tags": ["a", "b"] } })),
            "📝 Ideas\nTags: a, b"
        );
        assert_eq!(
            format_response(&json!({ "me": { "id": "u", "email": "a@b.c", "name": null } })),
            "email: a@b.c"
        );
    }
}
