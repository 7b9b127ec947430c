use crate::domain::notification::Notification;
use crate::domain::ports::Notifier;
use crate::error::{LogisticsError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Delivers notifications by logging them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, notification: Notification) -> Result<()> {
        tracing::info!(
            user = %notification.user_id,
            kind = ?notification.kind,
            priority = ?notification.priority,
            title = %notification.title,
            "{}",
            notification.message
        );
        Ok(())
    }
}

/// Keeps every notification in memory. Can be switched into a failing mode to
/// simulate an unreachable delivery backend.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LogisticsError::DependencyFailure(
                "notification backend unreachable".to_string(),
            ));
        }
        self.sent.lock().await.push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::NotificationKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        let note = Notification::new(Uuid::new_v4(), NotificationKind::WalletUpdated, "t", "m");
        notifier.send(note.clone()).await.unwrap();
        assert_eq!(notifier.sent().await, vec![note.clone()]);

        notifier.set_failing(true);
        assert!(matches!(
            notifier.send(note).await,
            Err(LogisticsError::DependencyFailure(_))
        ));
        assert_eq!(notifier.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_tracing_notifier_never_fails() {
        let note = Notification::new(Uuid::new_v4(), NotificationKind::OrderAssigned, "t", "m");
        assert!(TracingNotifier.send(note).await.is_ok());
    }
}
