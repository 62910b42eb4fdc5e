//! Per-chat exponential backoff for the notification poller.
//!
//! A chat whose backend calls fail is skipped until its delay has passed.
//! Delays start at 5s, double on each consecutive failure up to 60s and
//! reset on the first success.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const MIN_BACKOFF_SECS: u64 = 5;
const MAX_BACKOFF_SECS: u64 = 60;

#[derive(Debug, Clone)]
struct BackoffState {
    error_count: u32,
    current_delay: u64,
    retry_at: Instant,
}

#[derive(Default)]
pub struct ChatBackoff {
    states: RwLock<HashMap<i64, BackoffState>>,
}

impl ChatBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the chat may be polled at `now`
    pub fn is_ready(&self, chat_id: i64, now: Instant) -> bool {
        self.states
            .read()
            .get(&chat_id)
            .map(|s| now >= s.retry_at)
            .unwrap_or(true)
    }

    pub fn record_success(&self, chat_id: i64) {
        if self.states.write().remove(&chat_id).is_some() {
            log::debug!("[NOTIFY] Chat {} recovered, backoff reset", chat_id);
        }
    }

    /// Record a failed poll and return the delay in seconds before the chat
    /// is tried again.
    pub fn record_error(&self, chat_id: i64, now: Instant) -> u64 {
        let mut states = self.states.write();
        let state = states.entry(chat_id).or_insert(BackoffState {
            error_count: 0,
            current_delay: MIN_BACKOFF_SECS,
            retry_at: now,
        });

        state.error_count += 1;
        if state.error_count > 1 {
            state.current_delay = (state.current_delay * 2).min(MAX_BACKOFF_SECS);
        }
        state.retry_at = now + Duration::from_secs(state.current_delay);

        log::warn!(
            "[NOTIFY] Error #{} for chat {}, backoff: {}s",
            state.error_count,
            chat_id,
            state.current_delay
        );
        state.current_delay
    }

    pub fn current_delay(&self, chat_id: i64) -> Option<u64> {
        self.states.read().get(&chat_id).map(|s| s.current_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let backoff = ChatBackoff::new();
        let now = Instant::now();
        let delays: Vec<u64> = (0..6).map(|_| backoff.record_error(1, now)).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 60, 60]);
    }

    #[test]
    fn test_backoff_resets_on_success() {
        let backoff = ChatBackoff::new();
        let now = Instant::now();
        backoff.record_error(1, now);
        backoff.record_error(1, now);
        assert_eq!(backoff.current_delay(1), Some(10));

        backoff.record_success(1);
        assert_eq!(backoff.current_delay(1), None);
        assert_eq!(backoff.record_error(1, now), 5);
    }

    #[test]
    fn test_chat_skipped_until_delay_passes() {
        let backoff = ChatBackoff::new();
        let now = Instant::now();
        assert!(backoff.is_ready(1, now));

        backoff.record_error(1, now);
        assert!(!backoff.is_ready(1, now + Duration::from_secs(4)));
        assert!(backoff.is_ready(1, now + Duration::from_secs(5)));
        assert!(backoff.is_ready(2, now));
    }
}
