//! Department-wide assessment aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use assurance_core::{Aggregate, AssessmentId, DepartmentId, DomainError, Entity};

use crate::lifecycle::{ContainerKind, Lifecycle, LifecycleState};

/// Department-wide wrapper around one sub-assessment per sub-department.
///
/// # Invariants
/// - Never submitted without having been started.
/// - Start and submit cascade to every child sub-assessment (the caller
///   persists the cascade in the same transaction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: AssessmentId,
    pub department_id: DepartmentId,
    pub lifecycle: Lifecycle,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Assessment {
    pub fn new(
        id: AssessmentId,
        department_id: DepartmentId,
        deadline: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            department_id,
            lifecycle: Lifecycle::default(),
            deadline,
            created_at,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }
}

impl Entity for Assessment {
    type Id = AssessmentId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssessmentCommand {
    Start { at: DateTime<Utc> },
    Submit { at: DateTime<Utc> },
    Reopen { at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssessmentEvent {
    Started { assessment_id: AssessmentId, at: DateTime<Utc> },
    Submitted { assessment_id: AssessmentId, at: DateTime<Utc> },
    Reopened { assessment_id: AssessmentId, at: DateTime<Utc> },
}

impl AssessmentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AssessmentEvent::Started { .. } => "assessment.started",
            AssessmentEvent::Submitted { .. } => "assessment.submitted",
            AssessmentEvent::Reopened { .. } => "assessment.reopened",
        }
    }
}

impl Aggregate for Assessment {
    type Command = AssessmentCommand;
    type Event = AssessmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AssessmentEvent::Started { at, .. } => self.lifecycle.start(*at),
            AssessmentEvent::Submitted { at, .. } => self.lifecycle.submit(*at),
            AssessmentEvent::Reopened { .. } => self.lifecycle.reopen(),
        }
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let kind = ContainerKind::Assessment;
        let assessment_id = self.id;
        match command {
            AssessmentCommand::Start { at } => {
                self.lifecycle.ensure_can_start(kind)?;
                Ok(vec![AssessmentEvent::Started { assessment_id, at: *at }])
            }
            AssessmentCommand::Submit { at } => {
                self.lifecycle.ensure_can_submit(kind)?;
                Ok(vec![AssessmentEvent::Submitted { assessment_id, at: *at }])
            }
            AssessmentCommand::Reopen { at } => {
                self.lifecycle.ensure_can_reopen(kind)?;
                Ok(vec![AssessmentEvent::Reopened { assessment_id, at: *at }])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Assessment {
        Assessment::new(AssessmentId::new(), DepartmentId::new(), None, Utc::now())
    }

    #[test]
    fn submit_before_start_is_a_conflict() {
        let a = fresh();
        let err = a.handle(&AssessmentCommand::Submit { at: Utc::now() }).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn start_sets_flag_and_timestamp() {
        let mut a = fresh();
        let at = Utc::now();
        let events = a.execute(&AssessmentCommand::Start { at }).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "assessment.started");
        assert!(a.lifecycle.started);
        assert!(!a.lifecycle.submitted);
        assert_eq!(a.lifecycle.started_at, Some(at));
    }

    #[test]
    fn start_twice_is_a_conflict() {
        let mut a = fresh();
        a.execute(&AssessmentCommand::Start { at: Utc::now() }).unwrap();
        let err = a.handle(&AssessmentCommand::Start { at: Utc::now() }).unwrap_err();
        assert_eq!(err, DomainError::conflict("assessment already started"));
    }

    #[test]
    fn reopen_then_submit_again() {
        let mut a = fresh();
        a.execute(&AssessmentCommand::Start { at: Utc::now() }).unwrap();

        let err = a.handle(&AssessmentCommand::Reopen { at: Utc::now() }).unwrap_err();
        assert_eq!(err, DomainError::conflict("assessment not submitted, cannot reopen"));

        a.execute(&AssessmentCommand::Submit { at: Utc::now() }).unwrap();
        a.execute(&AssessmentCommand::Reopen { at: Utc::now() }).unwrap();
        assert_eq!(a.state(), LifecycleState::Started);
        assert!(a.execute(&AssessmentCommand::Submit { at: Utc::now() }).is_ok());
    }
}
