//! Transient user-facing notices.
//!
//! The service is constructed explicitly and handed to whatever needs it. The
//! presentation layer owns the receiving half and decides how to show each
//! notice; after [`NoticeService::shutdown`] new notices are dropped.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub const DEFAULT_NOTICE_DURATION: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub id: u64,
    pub level: NoticeLevel,
    pub title: Option<String>,
    pub text: String,
    pub duration: Duration,
}

#[derive(Clone)]
pub struct NoticeService {
    tx: Arc<Mutex<Option<UnboundedSender<Notice>>>>,
    next_id: Arc<AtomicU64>,
}

impl NoticeService {
    pub fn start() -> (Self, UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (service, rx)
    }

    /// A service with no receiver; every notice is dropped.
    pub fn disabled() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Closes the feed for every clone of this service.
    pub fn shutdown(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }

    pub fn is_running(&self) -> bool {
        self.tx
            .lock()
            .map(|tx| tx.as_ref().is_some_and(|tx| !tx.is_closed()))
            .unwrap_or(false)
    }

    pub fn success(&self, text: impl Into<String>) -> Option<u64> {
        self.show(NoticeLevel::Success, None, text.into(), DEFAULT_NOTICE_DURATION)
    }

    pub fn info(&self, text: impl Into<String>) -> Option<u64> {
        self.show(NoticeLevel::Info, None, text.into(), DEFAULT_NOTICE_DURATION)
    }

    pub fn warning(&self, text: impl Into<String>) -> Option<u64> {
        self.show(NoticeLevel::Warning, None, text.into(), DEFAULT_NOTICE_DURATION)
    }

    pub fn error(&self, text: impl Into<String>) -> Option<u64> {
        self.show(NoticeLevel::Error, None, text.into(), DEFAULT_NOTICE_DURATION)
    }

    /// Sends one notice and returns its id, or `None` when nobody is listening.
    pub fn show(
        &self,
        level: NoticeLevel,
        title: Option<String>,
        text: String,
        duration: Duration,
    ) -> Option<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let notice = Notice {
            id,
            level,
            title,
            text,
            duration,
        };

        let guard = self.tx.lock().ok()?;
        let Some(tx) = guard.as_ref() else {
            tracing::debug!(level = ?notice.level, text = %notice.text, "notice dropped after shutdown");
            return None;
        };
        if let Err(error) = tx.send(notice) {
            tracing::debug!(%error, "notice receiver closed");
            return None;
        }
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notices_arrive_in_order_with_default_duration() {
        let (notices, mut rx) = NoticeService::start();
        let first = notices.warning("tool calls pending").expect("sent");
        let second = notices.error("request failed").expect("sent");
        assert!(second > first);

        let notice = rx.try_recv().expect("first notice");
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.text, "tool calls pending");
        assert_eq!(notice.duration, Duration::from_millis(1000));
        assert_eq!(rx.try_recv().expect("second notice").level, NoticeLevel::Error);
    }

    #[test]
    fn test_shutdown_closes_feed_for_all_clones() {
        let (notices, mut rx) = NoticeService::start();
        let clone = notices.clone();
        assert!(clone.is_running());

        notices.shutdown();
        assert!(!clone.is_running());
        assert_eq!(clone.info("late"), None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disabled_service_drops_notices() {
        let notices = NoticeService::disabled();
        assert!(!notices.is_running());
        assert_eq!(notices.success("ok"), None);
    }

    #[test]
    fn test_custom_title_and_duration() {
        let (notices, mut rx) = NoticeService::start();
        notices.show(
            NoticeLevel::Info,
            Some("Session".to_string()),
            "restored".to_string(),
            Duration::from_secs(3),
        );
        let notice = rx.try_recv().expect("notice");
        assert_eq!(notice.title.as_deref(), Some("Session"));
        assert_eq!(notice.duration, Duration::from_secs(3));
    }
}
