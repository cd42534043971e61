//! Sub-department scoped unit of work, with its own lifecycle and a finer
//! review workflow layered on top.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use assurance_core::{
    Aggregate, AssessmentId, DomainError, DomainResult, Entity, SubAssessmentId, SubDepartmentId,
};

use crate::lifecycle::{ContainerKind, Lifecycle, LifecycleState};

/// Review workflow of a sub-assessment.
///
/// ```text
/// draft ──submit──▶ submittedForReview ──begin──▶ underReview ──complete──▶ completed
///   ▲                      ▲                          │
///   └──reopen              └────submit──── needRevision ◀──request revision
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewStatus {
    #[default]
    Draft,
    SubmittedForReview,
    UnderReview,
    NeedRevision,
    Completed,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Draft => "draft",
            ReviewStatus::SubmittedForReview => "submittedForReview",
            ReviewStatus::UnderReview => "underReview",
            ReviewStatus::NeedRevision => "needRevision",
            ReviewStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "draft" => Ok(ReviewStatus::Draft),
            "submittedForReview" => Ok(ReviewStatus::SubmittedForReview),
            "underReview" => Ok(ReviewStatus::UnderReview),
            "needRevision" => Ok(ReviewStatus::NeedRevision),
            "completed" => Ok(ReviewStatus::Completed),
            other => Err(DomainError::bad_request(format!("unknown review status '{other}'"))),
        }
    }
}

/// How many questions of a sub-assessment carry a live answer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub total_questions: u64,
    pub answered_questions: u64,
}

impl Completion {
    pub fn is_complete(&self) -> bool {
        self.answered_questions >= self.total_questions
    }

    pub fn percentage(&self) -> f64 {
        crate::stats::percentage(self.answered_questions, self.total_questions)
    }
}

/// Submit guard: every question must be attempted.
pub fn check_sub_assessment_completion(completion: Completion) -> DomainResult<()> {
    if completion.is_complete() {
        Ok(())
    } else {
        Err(DomainError::conflict(format!(
            "all questions must be attempted before submitting ({} of {} answered)",
            completion.answered_questions, completion.total_questions
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAssessment {
    pub id: SubAssessmentId,
    pub assessment_id: AssessmentId,
    pub sub_department_id: SubDepartmentId,
    pub lifecycle: Lifecycle,
    pub review_status: ReviewStatus,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SubAssessment {
    pub fn new(
        id: SubAssessmentId,
        assessment_id: AssessmentId,
        sub_department_id: SubDepartmentId,
        deadline: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            assessment_id,
            sub_department_id,
            lifecycle: Lifecycle::default(),
            review_status: ReviewStatus::Draft,
            deadline,
            created_at,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Start propagated from the parent assessment. Already started children
    /// keep their original `startedAt`.
    pub fn cascade_start(&mut self, at: DateTime<Utc>) -> bool {
        if self.lifecycle.started {
            return false;
        }
        self.lifecycle.start(at);
        true
    }

    /// Submit propagated from the parent assessment (no completion check).
    pub fn cascade_submit(&mut self, at: DateTime<Utc>) -> bool {
        if self.lifecycle.submitted {
            return false;
        }
        if !self.lifecycle.started {
            self.lifecycle.start(at);
        }
        self.lifecycle.submit(at);
        self.review_status = ReviewStatus::SubmittedForReview;
        true
    }

    fn ensure_review(&self, expected: ReviewStatus, action: &str) -> DomainResult<()> {
        if self.review_status == expected {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "cannot {action}: review status is {}, expected {}",
                self.review_status.as_str(),
                expected.as_str()
            )))
        }
    }
}

impl Entity for SubAssessment {
    type Id = SubAssessmentId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubAssessmentCommand {
    Start { at: DateTime<Utc> },
    Submit { at: DateTime<Utc>, completion: Completion },
    Reopen { at: DateTime<Utc> },
    BeginReview { at: DateTime<Utc> },
    RequestRevision { at: DateTime<Utc> },
    CompleteReview { at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubAssessmentEvent {
    Started { sub_assessment_id: SubAssessmentId, at: DateTime<Utc> },
    Submitted { sub_assessment_id: SubAssessmentId, at: DateTime<Utc> },
    Reopened { sub_assessment_id: SubAssessmentId, at: DateTime<Utc> },
    ReviewStatusChanged {
        sub_assessment_id: SubAssessmentId,
        from: ReviewStatus,
        to: ReviewStatus,
        at: DateTime<Utc>,
    },
}

impl Aggregate for SubAssessment {
    type Command = SubAssessmentCommand;
    type Event = SubAssessmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SubAssessmentEvent::Started { at, .. } => self.lifecycle.start(*at),
            SubAssessmentEvent::Submitted { at, .. } => self.lifecycle.submit(*at),
            SubAssessmentEvent::Reopened { .. } => self.lifecycle.reopen(),
            SubAssessmentEvent::ReviewStatusChanged { to, .. } => self.review_status = *to,
        }
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let kind = ContainerKind::SubAssessment;
        let sub_assessment_id = self.id;
        let review = |to: ReviewStatus, at: DateTime<Utc>| SubAssessmentEvent::ReviewStatusChanged {
            sub_assessment_id,
            from: self.review_status,
            to,
            at,
        };

        match command {
            SubAssessmentCommand::Start { at } => {
                self.lifecycle.ensure_can_start(kind)?;
                Ok(vec![SubAssessmentEvent::Started { sub_assessment_id, at: *at }])
            }
            SubAssessmentCommand::Submit { at, completion } => {
                self.lifecycle.ensure_can_submit(kind)?;
                check_sub_assessment_completion(*completion)?;
                let mut events = vec![SubAssessmentEvent::Submitted { sub_assessment_id, at: *at }];
                if self.review_status != ReviewStatus::SubmittedForReview {
                    events.push(review(ReviewStatus::SubmittedForReview, *at));
                }
                Ok(events)
            }
            SubAssessmentCommand::Reopen { at } => {
                self.lifecycle.ensure_can_reopen(kind)?;
                let mut events = vec![SubAssessmentEvent::Reopened { sub_assessment_id, at: *at }];
                if self.review_status != ReviewStatus::Draft {
                    events.push(review(ReviewStatus::Draft, *at));
                }
                Ok(events)
            }
            SubAssessmentCommand::BeginReview { at } => {
                self.ensure_review(ReviewStatus::SubmittedForReview, "begin review")?;
                Ok(vec![review(ReviewStatus::UnderReview, *at)])
            }
            SubAssessmentCommand::RequestRevision { at } => {
                self.ensure_review(ReviewStatus::UnderReview, "request revision")?;
                // Sending work back reopens it so answers can be edited again.
                let mut events = Vec::with_capacity(2);
                if self.lifecycle.submitted {
                    events.push(SubAssessmentEvent::Reopened { sub_assessment_id, at: *at });
                }
                events.push(review(ReviewStatus::NeedRevision, *at));
                Ok(events)
            }
            SubAssessmentCommand::CompleteReview { at } => {
                self.ensure_review(ReviewStatus::UnderReview, "complete review")?;
                Ok(vec![review(ReviewStatus::Completed, *at)])
            }
        }
    }
}
