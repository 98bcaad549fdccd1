use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use super::domain::{Notification, UserId};

/// Delivery failures. The service layer retries once and then drops the
/// message with a warning; notification loss never fails the triggering
/// operation.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),
}

/// Sink for lifecycle event messages. Implementations own ordering and
/// read-state bookkeeping per recipient.
pub trait NotificationDispatcher: Send + Sync {
    fn emit(&self, user: UserId, message: String) -> Result<Notification, NotifyError>;
    /// Messages for a user, newest first.
    fn list(&self, user: UserId) -> Result<Vec<Notification>, NotifyError>;
    /// Mark everything for the user as read, returning how many changed.
    fn mark_all_read(&self, user: UserId) -> Result<usize, NotifyError>;
}

/// In-memory dispatcher used by the demo and the test suite.
#[derive(Default)]
pub struct InMemoryNotifier {
    state: Mutex<NotifierState>,
}

#[derive(Default)]
struct NotifierState {
    sequence: u64,
    by_user: HashMap<UserId, Vec<Notification>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationDispatcher for InMemoryNotifier {
    fn emit(&self, user: UserId, message: String) -> Result<Notification, NotifyError> {
        let mut state = self.state.lock().expect("notifier mutex poisoned");
        state.sequence += 1;
        let notification = Notification {
            id: state.sequence,
            user_id: user,
            message,
            created_at: Utc::now(),
            read: false,
        };
        state
            .by_user
            .entry(user)
            .or_default()
            .push(notification.clone());
        Ok(notification)
    }

    fn list(&self, user: UserId) -> Result<Vec<Notification>, NotifyError> {
        let state = self.state.lock().expect("notifier mutex poisoned");
        let mut messages = state.by_user.get(&user).cloned().unwrap_or_default();
        messages.reverse();
        Ok(messages)
    }

    fn mark_all_read(&self, user: UserId) -> Result<usize, NotifyError> {
        let mut state = self.state.lock().expect("notifier mutex poisoned");
        let messages = state.by_user.entry(user).or_default();
        let mut changed = 0;
        for message in messages.iter_mut() {
            if !message.read {
                message.read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_is_newest_first() {
        let notifier = InMemoryNotifier::new();
        notifier.emit(UserId(1), "first".into()).expect("emit");
        notifier.emit(UserId(1), "second".into()).expect("emit");
        notifier.emit(UserId(2), "other".into()).expect("emit");

        let messages = notifier.list(UserId(1)).expect("list");
        let texts: Vec<&str> = messages.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(texts, vec!["second", "first"]);
    }

    #[test]
    fn mark_all_read_reports_changed_count() {
        let notifier = InMemoryNotifier::new();
        notifier.emit(UserId(1), "a".into()).expect("emit");
        notifier.emit(UserId(1), "b".into()).expect("emit");

        assert_eq!(notifier.mark_all_read(UserId(1)).expect("mark"), 2);
        assert_eq!(notifier.mark_all_read(UserId(1)).expect("mark again"), 0);
        assert!(notifier.list(UserId(1)).expect("list").iter().all(|n| n.read));
    }

    #[test]
    fn unknown_user_has_empty_feed() {
        let notifier = InMemoryNotifier::new();
        assert!(notifier.list(UserId(42)).expect("list").is_empty());
    }
}
