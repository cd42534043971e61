//! Coarse lifecycle shared by assessments and sub-assessments.
//!
//! ```text
//! NotStarted ──start──▶ Started ──submit──▶ Submitted
//!                          ▲                    │
//!                          └──────reopen────────┘
//! ```
//!
//! The state is persisted as two booleans (`started`, `submitted`) plus
//! timestamps; [`LifecycleState::from_flags`] is the only place they are read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use assurance_core::{DomainError, DomainResult};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleState {
    NotStarted,
    Started,
    Submitted,
}

impl LifecycleState {
    /// Derive the state from persisted flags.
    ///
    /// `submitted` without `started` cannot be produced by the transitions;
    /// such a row is treated as submitted so it stays read-only.
    pub fn from_flags(started: bool, submitted: bool) -> Self {
        match (started, submitted) {
            (_, true) => LifecycleState::Submitted,
            (true, false) => LifecycleState::Started,
            (false, false) => LifecycleState::NotStarted,
        }
    }

    pub fn is_started(&self) -> bool {
        !matches!(self, LifecycleState::NotStarted)
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, LifecycleState::Submitted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::NotStarted => "notStarted",
            LifecycleState::Started => "started",
            LifecycleState::Submitted => "submitted",
        }
    }
}

/// Which kind of container a lifecycle belongs to (used in messages).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContainerKind {
    Assessment,
    SubAssessment,
}

impl core::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ContainerKind::Assessment => f.write_str("assessment"),
            ContainerKind::SubAssessment => f.write_str("sub-assessment"),
        }
    }
}

/// Persisted lifecycle columns of a container.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lifecycle {
    pub started: bool,
    pub submitted: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl Lifecycle {
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_flags(self.started, self.submitted)
    }

    pub fn ensure_can_start(&self, kind: ContainerKind) -> DomainResult<()> {
        match self.state() {
            LifecycleState::NotStarted => Ok(()),
            LifecycleState::Started | LifecycleState::Submitted => {
                Err(DomainError::conflict(format!("{kind} already started")))
            }
        }
    }

    pub fn ensure_can_submit(&self, kind: ContainerKind) -> DomainResult<()> {
        match self.state() {
            LifecycleState::Started => Ok(()),
            LifecycleState::NotStarted => Err(DomainError::conflict(format!(
                "{kind} has not been started, cannot submit"
            ))),
            LifecycleState::Submitted => Err(DomainError::conflict(format!("{kind} already submitted"))),
        }
    }

    pub fn ensure_can_reopen(&self, kind: ContainerKind) -> DomainResult<()> {
        match self.state() {
            LifecycleState::Submitted => Ok(()),
            LifecycleState::NotStarted | LifecycleState::Started => Err(DomainError::conflict(format!(
                "{kind} not submitted, cannot reopen"
            ))),
        }
    }

    pub fn start(&mut self, at: DateTime<Utc>) {
        self.started = true;
        self.started_at = Some(at);
    }

    pub fn submit(&mut self, at: DateTime<Utc>) {
        self.submitted = true;
        self.submitted_at = Some(at);
    }

    pub fn reopen(&mut self) {
        self.submitted = false;
        self.submitted_at = None;
    }
}

/// Guard for answer / comment / evidence writes.
///
/// Content may change only while the owning container is started, not yet
/// submitted, and (when it has one) before its deadline.
pub fn ensure_content_mutable(
    kind: ContainerKind,
    state: LifecycleState,
    deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DomainResult<()> {
    match state {
        LifecycleState::NotStarted => {
            return Err(DomainError::forbidden(format!(
                "{kind} has not been started; content cannot be changed yet"
            )));
        }
        LifecycleState::Submitted => {
            return Err(DomainError::forbidden(format!(
                "{kind} has been submitted; reopen it before changing content"
            )));
        }
        LifecycleState::Started => {}
    }

    if let Some(deadline) = deadline {
        if now > deadline {
            return Err(DomainError::forbidden(format!("{kind} deadline passed")));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn flags_map_to_states() {
        assert_eq!(LifecycleState::from_flags(false, false), LifecycleState::NotStarted);
        assert_eq!(LifecycleState::from_flags(true, false), LifecycleState::Started);
        assert_eq!(LifecycleState::from_flags(true, true), LifecycleState::Submitted);
        assert_eq!(LifecycleState::from_flags(false, true), LifecycleState::Submitted);
    }

    #[test]
    fn transitions_follow_the_machine() {
        let kind = ContainerKind::Assessment;
        let mut lc = Lifecycle::default();

        assert!(matches!(lc.ensure_can_submit(kind), Err(DomainError::Conflict(_))));
        assert!(matches!(lc.ensure_can_reopen(kind), Err(DomainError::Conflict(_))));

        lc.ensure_can_start(kind).unwrap();
        lc.start(Utc::now());
        let err = lc.ensure_can_start(kind).unwrap_err();
        assert_eq!(err.message(), "assessment already started");

        lc.ensure_can_submit(kind).unwrap();
        lc.submit(Utc::now());
        assert!(lc.submitted_at.is_some());

        lc.ensure_can_reopen(kind).unwrap();
        lc.reopen();
        assert_eq!(lc.state(), LifecycleState::Started);
        assert!(lc.submitted_at.is_none());
        assert!(lc.ensure_can_submit(kind).is_ok());
    }

    #[test]
    fn content_window_is_started_and_not_submitted() {
        let kind = ContainerKind::SubAssessment;
        let now = Utc::now();
        assert!(ensure_content_mutable(kind, LifecycleState::Started, None, now).is_ok());
        assert!(matches!(
            ensure_content_mutable(kind, LifecycleState::NotStarted, None, now),
            Err(DomainError::Forbidden(_))
        ));
        assert!(matches!(
            ensure_content_mutable(kind, LifecycleState::Submitted, None, now),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn content_window_closes_at_the_deadline() {
        let kind = ContainerKind::SubAssessment;
        let now = Utc::now();
        let err = ensure_content_mutable(kind, LifecycleState::Started, Some(now - Duration::hours(1)), now)
            .unwrap_err();
        assert_eq!(err.message(), "sub-assessment deadline passed");
        assert!(ensure_content_mutable(kind, LifecycleState::Started, Some(now + Duration::hours(1)), now).is_ok());
    }
}
