//! Outbound notifications (onboarding, one-time passwords).
//!
//! Delivery is best effort: a failed send is logged and never undoes the
//! write that triggered it.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use assurance_core::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Sent once a user account has been provisioned.
    Onboarding {
        user_id: UserId,
        email: String,
        name: String,
    },
    OneTimePassword {
        user_id: UserId,
        email: String,
        code: String,
    },
}

impl Notification {
    pub fn recipient(&self) -> &str {
        match self {
            Notification::Onboarding { email, .. } | Notification::OneTimePassword { email, .. } => email,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

#[async_trait]
impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        (**self).send(notification).await
    }
}

/// Deliver and swallow failures.
pub async fn notify_best_effort(notifier: &dyn Notifier, notification: &Notification) {
    if let Err(error) = notifier.send(notification).await {
        warn!(recipient = notification.recipient(), %error, "notification delivery failed");
    }
}

/// Writes notifications to the log. Default channel when nothing else is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        // Codes stay out of the log.
        match notification {
            Notification::Onboarding { user_id, .. } => {
                info!(%user_id, recipient = notification.recipient(), "onboarding notification")
            }
            Notification::OneTimePassword { user_id, .. } => {
                info!(%user_id, recipient = notification.recipient(), "one-time password notification")
            }
        }
        Ok(())
    }
}

/// Keeps every notification in memory; optionally fails every send.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<RwLock<Vec<Notification>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Unavailable("recording notifier set to fail".to_string()));
        }
        self.sent
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn onboarding() -> Notification {
        Notification::Onboarding {
            user_id: UserId::new(),
            email: "new@acme.test".to_string(),
            name: "New Hire".to_string(),
        }
    }

    #[tokio::test]
    async fn best_effort_swallows_failures() {
        let notifier = RecordingNotifier::failing();
        notify_best_effort(&notifier, &onboarding()).await;
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        let first = onboarding();
        let second = Notification::OneTimePassword {
            user_id: UserId::new(),
            email: "otp@acme.test".to_string(),
            code: "493817".to_string(),
        };
        notify_best_effort(&notifier, &first).await;
        notify_best_effort(&notifier, &second).await;

        assert_eq!(notifier.sent(), vec![first, second]);
        assert!(LogNotifier.send(&onboarding()).await.is_ok());
    }
}
