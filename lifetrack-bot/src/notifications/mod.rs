//! Background delivery of due backend notifications to logged-in chats.

pub mod backoff;

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use teloxide::utils::html::escape;
use tokio_util::sync::CancellationToken;

use crate::graphql::models::{Event, PendingNotification, Reminder};
use crate::graphql::{queries, BackendSession, GraphQLError, GraphQLExecutor};
use crate::sessions::SessionStore;
use crate::ui::{event_type_emoji, parse_timestamp, priority_emoji};
use backoff::ChatBackoff;

const TELEGRAM_CHANNEL: &str = "telegram";
const SEND_PAUSE: Duration = Duration::from_millis(100);

/// Delivers an HTML message to a chat
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, chat_id: i64, html: &str) -> Result<(), String>;
}

pub struct NotificationPoller {
    executor: Arc<dyn GraphQLExecutor>,
    sessions: Arc<SessionStore>,
    notifier: Arc<dyn Notifier>,
    backoff: ChatBackoff,
    send_pause: Duration,
}

impl NotificationPoller {
    pub fn new(
        executor: Arc<dyn GraphQLExecutor>,
        sessions: Arc<SessionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            executor,
            sessions,
            notifier,
            backoff: ChatBackoff::new(),
            send_pause: SEND_PAUSE,
        }
    }

    pub fn with_send_pause(mut self, pause: Duration) -> Self {
        self.send_pause = pause;
        self
    }

    /// Poll every `interval` until `shutdown` fires.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        log::info!("[NOTIFY] Starting notification loop (checking every {}s)", interval.as_secs());
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("[NOTIFY] Notification loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let sent = self.poll_once().await;
                    if sent > 0 {
                        log::info!("[NOTIFY] Delivered {} notification(s)", sent);
                    }
                }
            }
        }
    }

    /// One pass over every logged-in chat. Returns how many notifications
    /// were delivered.
    pub async fn poll_once(&self) -> usize {
        let mut delivered = 0;
        for (chat_id, token) in self.sessions.logged_in() {
            if !self.backoff.is_ready(chat_id, Instant::now()) {
                log::debug!("[NOTIFY] Skipping chat {} during backoff", chat_id);
                continue;
            }

            let backend = BackendSession::new(self.executor.clone(), Some(token));
            match self.poll_chat(chat_id, &backend).await {
                Ok(count) => {
                    self.backoff.record_success(chat_id);
                    delivered += count;
                }
                Err(e) => {
                    log::error!("[NOTIFY] Error checking notifications for chat {}: {}", chat_id, e);
                    self.backoff.record_error(chat_id, Instant::now());
                }
            }
        }
        delivered
    }

    async fn poll_chat(&self, chat_id: i64, backend: &BackendSession) -> Result<usize, GraphQLError> {
        let pending: Vec<PendingNotification> = backend
            .fetch(queries::PENDING_NOTIFICATIONS, json!({}), "pendingNotifications")
            .await?
            .unwrap_or_default();
        if pending.is_empty() {
            return Ok(0);
        }
        log::info!("[NOTIFY] Found {} pending notifications for chat {}", pending.len(), chat_id);

        let mut delivered = 0;
        for notification in pending
            .iter()
            .filter(|n| n.channel.as_deref() == Some(TELEGRAM_CHANNEL))
        {
            let html = format_notification(backend, notification).await;

            match self.notifier.notify(chat_id, &html).await {
                Ok(()) => {
                    backend
                        .execute(queries::MARK_NOTIFICATION_SENT, json!({ "id": notification.id }))
                        .await?;
                    log::info!("[NOTIFY] Sent notification {} to chat {}", notification.id, chat_id);
                    delivered += 1;
                }
                Err(e) => {
                    log::error!("[NOTIFY] Failed to send notification to chat {}: {}", chat_id, e);
                }
            }

            tokio::time::sleep(self.send_pause).await;
        }
        Ok(delivered)
    }
}

/// Render a notification, pulling event or reminder details when it
/// references one. Falls back to the notification's own message.
pub async fn format_notification(backend: &BackendSession, notification: &PendingNotification) -> String {
    let message = notification.message.clone().unwrap_or_default();
    let fallback = escape(&message);

    match notification.notification_type.as_deref() {
        Some("event") => {
            let Some(event_id) = notification.event_id.as_deref() else {
                return fallback;
            };
            match backend
                .fetch::<Event>(queries::NOTIFICATION_EVENT, json!({ "id": event_id }), "event")
                .await
            {
                Ok(Some(event)) => render_event(&event),
                Ok(None) => fallback,
                Err(e) => {
                    log::warn!("[NOTIFY] Could not load event {}: {}", event_id, e);
                    fallback
                }
            }
        }
        Some("reminder") => {
            let Some(reminder_id) = notification.reminder_id.as_deref() else {
                return fallback;
            };
            match backend
                .fetch::<Reminder>(queries::NOTIFICATION_REMINDER, json!({ "id": reminder_id }), "reminder")
                .await
            {
                Ok(Some(reminder)) => render_reminder(&reminder),
                Ok(None) => fallback,
                Err(e) => {
                    log::warn!("[NOTIFY] Could not load reminder {}: {}", reminder_id, e);
                    fallback
                }
            }
        }
        _ => render_generic(&message),
    }
}

pub fn render_event(event: &Event) -> String {
    let mut text = String::from("🔔 <b>Event Reminder</b>\n\n");
    text.push_str(&format!(
        "{} <b>{}</b>\n",
        event_type_emoji(event.event_type.as_deref()),
        escape(&event.title)
    ));

    match event.start_time.as_deref().and_then(parse_timestamp) {
        Some(start) => {
            text.push_str(&format!("📅 {}\n", start.format("%A, %B %d")));
            text.push_str(&format!("🕐 {}\n", start.format("%I:%M %p")));
        }
        None => {
            if let Some(raw) = event.start_time.as_deref() {
                text.push_str(&format!("📅 {}\n", escape(raw)));
            }
        }
    }

    if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
        text.push_str(&format!("📍 {}\n", escape(location)));
    }

    text.push_str("\n💡 Use /schedule to view your calendar");
    text
}

pub fn render_reminder(reminder: &Reminder) -> String {
    let mut text = String::from("⏰ <b>Reminder</b>\n\n");
    text.push_str(&format!(
        "{} <b>{}</b>\n",
        priority_emoji(reminder.priority.as_deref()),
        escape(&reminder.title)
    ));

    if let Some(description) = reminder.description.as_deref().filter(|d| !d.is_empty()) {
        text.push_str(&format!("📝 {}\n", escape(description)));
    }

    match reminder.due_time.as_deref().and_then(parse_timestamp) {
        Some(due) => text.push_str(&format!("📅 Due: {}\n", due.format("%A, %B %d at %I:%M %p"))),
        None => {
            if let Some(raw) = reminder.due_time.as_deref() {
                text.push_str(&format!("📅 Due: {}\n", escape(raw)));
            }
        }
    }

    text.push_str("\n💡 Use /schedule to manage reminders");
    text
}

pub fn render_generic(message: &str) -> String {
    format!("🔔 <b>Notification</b>\n\n{}", escape(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::testing::ScriptedExecutor;
    use parking_lot::Mutex;
    use serde_json::Value;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(i64, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, chat_id: i64, html: &str) -> Result<(), String> {
            if self.fail {
                return Err("blocked by user".to_string());
            }
            self.sent.lock().push((chat_id, html.to_string()));
            Ok(())
        }
    }

    fn poller(exec: Arc<ScriptedExecutor>, notifier: Arc<RecordingNotifier>) -> (Arc<SessionStore>, NotificationPoller) {
        let sessions = Arc::new(SessionStore::new());
        let poller = NotificationPoller::new(exec, sessions.clone(), notifier).with_send_pause(Duration::ZERO);
        (sessions, poller)
    }

    fn pending(items: Value) -> Value {
        json!({ "pendingNotifications": items })
    }

    #[tokio::test]
    async fn test_only_telegram_notifications_are_sent_and_marked() {
        let exec = Arc::new(
            ScriptedExecutor::new()
                .on(
                    "query GetPendingNotifications",
                    pending(json!([
                        { "id": "n1", "channel": "telegram", "notificationType": "custom", "message": "Drink water" },
                        { "id": "n2", "channel": "email", "notificationType": "custom", "message": "Ignored" }
                    ])),
                )
                .on("mutation MarkNotificationSent", json!({ "markNotificationSent": { "id": "n1", "sent": true } })),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let (sessions, poller) = poller(exec.clone(), notifier.clone());
        sessions.login(42, "tok".into(), None);

        assert_eq!(poller.poll_once().await, 1);

        let sent = notifier.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], (42, "🔔 <b>Notification</b>\n\nDrink water".to_string()));

        let marks = exec.calls_matching("mutation MarkNotificationSent");
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].variables["id"], "n1");
        assert_eq!(marks[0].token.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_failed_send_is_not_marked() {
        let exec = Arc::new(ScriptedExecutor::new().on(
            "query GetPendingNotifications",
            pending(json!([{ "id": "n1", "channel": "telegram", "notificationType": "custom", "message": "x" }])),
        ));
        let notifier = Arc::new(RecordingNotifier { fail: true, ..Default::default() });
        let (sessions, poller) = poller(exec.clone(), notifier);
        sessions.login(1, "tok".into(), None);

        assert_eq!(poller.poll_once().await, 0);
        assert!(exec.calls_matching("mutation MarkNotificationSent").is_empty());
    }

    #[tokio::test]
    async fn test_failing_chat_backs_off_without_stopping_others() {
        let exec = Arc::new(ScriptedExecutor::new().fail("query GetPendingNotifications", GraphQLError::Timeout));
        let notifier = Arc::new(RecordingNotifier::default());
        let (sessions, poller) = poller(exec.clone(), notifier);
        sessions.login(1, "a".into(), None);
        sessions.login(2, "b".into(), None);

        assert_eq!(poller.poll_once().await, 0);
        assert_eq!(exec.calls_matching("query GetPendingNotifications").len(), 2);
        assert_eq!(poller.backoff.current_delay(1), Some(5));
        assert_eq!(poller.backoff.current_delay(2), Some(5));

        // Both chats are inside their backoff window now
        poller.poll_once().await;
        assert_eq!(exec.calls_matching("query GetPendingNotifications").len(), 2);
    }

    #[tokio::test]
    async fn test_event_notification_uses_event_details() {
        let exec = Arc::new(ScriptedExecutor::new().on(
            "query GetEvent(",
            json!({ "event": {
                "title": "Standup & sync",
                "startTime": "2026-02-13T09:30:00Z",
                "type": "MEETING",
                "location": "Room 4"
            } }),
        ));
        let backend = BackendSession::new(exec, Some("tok".into()));
        let notification = PendingNotification {
            id: "n1".into(),
            user_id: None,
            event_id: Some("e1".into()),
            reminder_id: None,
            scheduled_time: None,
            channel: Some("telegram".into()),
            notification_type: Some("event".into()),
            message: Some("fallback".into()),
        };

        let html = format_notification(&backend, &notification).await;
        assert!(html.starts_with("🔔 <b>Event Reminder</b>"));
        assert!(html.contains("👥 <b>Standup &amp; sync</b>"));
        assert!(html.contains("📅 Friday, February 13"));
        assert!(html.contains("🕐 09:30 AM"));
        assert!(html.contains("📍 Room 4"));
    }

    #[test]
    fn test_render_reminder() {
        let reminder = Reminder {
            title: "Pay rent".into(),
            description: Some("Before noon".into()),
            due_time: Some("2026-03-01T11:00:00Z".into()),
            priority: Some("high".into()),
        };
        let html = render_reminder(&reminder);
        assert!(html.starts_with("⏰ <b>Reminder</b>\n\n🔴 <b>Pay rent</b>\n"));
        assert!(html.contains("📝 Before noon"));
        assert!(html.contains("📅 Due: Sunday, March 01 at 11:00 AM"));
    }

    #[tokio::test]
    async fn test_missing_event_falls_back_to_message() {
        let exec = Arc::new(ScriptedExecutor::new().on("query GetEvent(", json!({ "event": null })));
        let backend = BackendSession::new(exec, Some("tok".into()));
        let notification = PendingNotification {
            id: "n1".into(),
            user_id: None,
            event_id: Some("gone".into()),
            reminder_id: None,
            scheduled_time: None,
            channel: Some("telegram".into()),
            notification_type: Some("event".into()),
            message: Some("Event starting soon".into()),
        };
        assert_eq!(format_notification(&backend, &notification).await, "Event starting soon");
    }

    #[tokio::test]
    async fn test_fallback_message_is_html_escaped() {
        let exec = Arc::new(
            ScriptedExecutor::new()
                .on("query GetEvent(", json!({ "event": null }))
                .fail("query GetReminder(", GraphQLError::Transport("down".into())),
        );
        let backend = BackendSession::new(exec, Some("tok".into()));
        let mut notification = PendingNotification {
            id: "n1".into(),
            user_id: None,
            event_id: Some("gone".into()),
            reminder_id: None,
            scheduled_time: None,
            channel: Some("telegram".into()),
            notification_type: Some("event".into()),
            message: Some("Budget < 5 & review".into()),
        };
        assert_eq!(format_notification(&backend, &notification).await, "Budget &lt; 5 &amp; review");

        notification.event_id = None;
        assert_eq!(format_notification(&backend, &notification).await, "Budget &lt; 5 &amp; review");

        notification.notification_type = Some("reminder".into());
        notification.reminder_id = Some("r1".into());
        assert_eq!(format_notification(&backend, &notification).await, "Budget &lt; 5 &amp; review");
    }
}
