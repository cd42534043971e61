//! Answers and the answer/evidence write rule.
//!
//! # Invariants
//! - One live (non-deleted) answer per question; checked by the caller before insert.
//! - A `yes` answer has at least one evidence file; `no` / `notApplicable`
//!   answers have none.
//! - A final-reviewed answer is frozen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use assurance_core::{AnswerId, AssessmentQuestionId, DomainError, DomainResult, Entity, UserId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnswerText {
    Yes,
    No,
    NotApplicable,
}

impl AnswerText {
    pub const ALL: [AnswerText; 3] = [AnswerText::Yes, AnswerText::No, AnswerText::NotApplicable];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerText::Yes => "yes",
            AnswerText::No => "no",
            AnswerText::NotApplicable => "notApplicable",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "yes" => Ok(AnswerText::Yes),
            "no" => Ok(AnswerText::No),
            "notApplicable" => Ok(AnswerText::NotApplicable),
            other => Err(DomainError::bad_request(format!(
                "answer must be one of yes, no, notApplicable (got '{other}')"
            ))),
        }
    }

    pub fn requires_evidence(&self) -> bool {
        matches!(self, AnswerText::Yes)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnswerReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl AnswerReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerReviewStatus::Pending => "pending",
            AnswerReviewStatus::Approved => "approved",
            AnswerReviewStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending" => Ok(AnswerReviewStatus::Pending),
            "approved" => Ok(AnswerReviewStatus::Approved),
            "rejected" => Ok(AnswerReviewStatus::Rejected),
            other => Err(DomainError::bad_request(format!("unknown review status '{other}'"))),
        }
    }
}

/// Set once an assessor reworks a rejected answer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RevisionStatus {
    #[default]
    None,
    Improved,
}

impl RevisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionStatus::None => "none",
            RevisionStatus::Improved => "improved",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "none" => Ok(RevisionStatus::None),
            "improved" => Ok(RevisionStatus::Improved),
            other => Err(DomainError::bad_request(format!("unknown revision status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: AnswerId,
    pub assessment_question_id: AssessmentQuestionId,
    pub created_by: UserId,
    pub answer_text: AnswerText,
    pub review_status: AnswerReviewStatus,
    pub revision_status: RevisionStatus,
    pub final_review: bool,
    pub reviewer_comment: Option<String>,
    pub reviewed_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for Answer {
    type Id = AnswerId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Evidence rule for a new answer, checked before anything is written.
pub fn validate_new_answer(answer_text: AnswerText, new_files: usize) -> DomainResult<()> {
    match (answer_text.requires_evidence(), new_files) {
        (true, 0) => Err(DomainError::bad_request(
            "at least one evidence file is required when the answer is yes",
        )),
        (false, n) if n > 0 => Err(DomainError::bad_request(format!(
            "evidence files are only accepted when the answer is yes (answer is {})",
            answer_text.as_str()
        ))),
        _ => Ok(()),
    }
}

/// What an answer update must do to evidence in the same transaction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AnswerUpdatePlan {
    pub answer_text: AnswerText,
    /// Delete every existing evidence row of the answer.
    pub purge_evidence: bool,
    /// Number of new files to attach.
    pub attach: usize,
}

/// Reviewer verdict on an answer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl Answer {
    pub fn new(
        assessment_question_id: AssessmentQuestionId,
        created_by: UserId,
        answer_text: AnswerText,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AnswerId::new(),
            assessment_question_id,
            created_by,
            answer_text,
            review_status: AnswerReviewStatus::Pending,
            revision_status: RevisionStatus::None,
            final_review: false,
            reviewer_comment: None,
            reviewed_by: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    fn ensure_not_final(&self) -> DomainResult<()> {
        if self.final_review {
            return Err(DomainError::conflict(
                "answer has passed final review and can no longer change",
            ));
        }
        Ok(())
    }

    /// Validate an update against the evidence rule.
    ///
    /// `existing_files` is the evidence currently attached, `new_files` the
    /// uploads carried by the update.
    pub fn plan_update(
        &self,
        answer_text: AnswerText,
        existing_files: usize,
        new_files: usize,
    ) -> DomainResult<AnswerUpdatePlan> {
        self.ensure_not_final()?;

        if answer_text.requires_evidence() {
            if existing_files + new_files == 0 {
                return Err(DomainError::bad_request(
                    "at least one evidence file must remain when the answer is yes",
                ));
            }
            return Ok(AnswerUpdatePlan {
                answer_text,
                purge_evidence: false,
                attach: new_files,
            });
        }

        if new_files > 0 {
            return Err(DomainError::bad_request(format!(
                "evidence files are only accepted when the answer is yes (answer is {})",
                answer_text.as_str()
            )));
        }

        Ok(AnswerUpdatePlan {
            answer_text,
            purge_evidence: existing_files > 0,
            attach: 0,
        })
    }

    /// Apply a validated update. Reworking a rejected answer marks it improved
    /// and sends it back for review.
    pub fn apply_update(&mut self, plan: &AnswerUpdatePlan, now: DateTime<Utc>) {
        self.answer_text = plan.answer_text;
        if self.review_status == AnswerReviewStatus::Rejected {
            self.revision_status = RevisionStatus::Improved;
            self.review_status = AnswerReviewStatus::Pending;
        }
        self.updated_at = now;
    }

    pub fn review(
        &mut self,
        decision: ReviewDecision,
        comment: Option<String>,
        final_review: bool,
        reviewer: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_not_final()?;
        if final_review && decision == ReviewDecision::Reject {
            return Err(DomainError::bad_request("a rejected answer cannot be final-reviewed"));
        }

        self.review_status = match decision {
            ReviewDecision::Approve => AnswerReviewStatus::Approved,
            ReviewDecision::Reject => AnswerReviewStatus::Rejected,
        };
        self.reviewer_comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        self.reviewed_by = Some(reviewer);
        self.final_review = final_review;
        self.updated_at = now;
        Ok(())
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_not_final()?;
        self.deleted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Only a live `yes` answer that has not passed final review takes more files.
    pub fn ensure_evidence_addable(&self) -> DomainResult<()> {
        self.ensure_not_final()?;
        if !self.answer_text.requires_evidence() {
            return Err(DomainError::bad_request(format!(
                "evidence files are only accepted when the answer is yes (answer is {})",
                self.answer_text.as_str()
            )));
        }
        Ok(())
    }

    /// Removing a single evidence file may not strip a `yes` answer bare.
    pub fn ensure_evidence_removable(&self, remaining_after: usize) -> DomainResult<()> {
        self.ensure_not_final()?;
        if self.answer_text.requires_evidence() && remaining_after == 0 {
            return Err(DomainError::bad_request(
                "cannot remove the last evidence file of a yes answer",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(text: AnswerText) -> Answer {
        Answer::new(AssessmentQuestionId::new(), UserId::new(), text, Utc::now())
    }

    #[test]
    fn yes_without_files_is_rejected_on_create() {
        assert!(matches!(validate_new_answer(AnswerText::Yes, 0), Err(DomainError::BadRequest(_))));
        assert!(validate_new_answer(AnswerText::Yes, 2).is_ok());
    }

    #[test]
    fn no_or_not_applicable_with_files_is_rejected_on_create() {
        for text in [AnswerText::No, AnswerText::NotApplicable] {
            assert!(matches!(validate_new_answer(text, 1), Err(DomainError::BadRequest(_))));
            assert!(validate_new_answer(text, 0).is_ok());
        }
    }

    #[test]
    fn switching_to_no_purges_evidence() {
        let a = answer(AnswerText::Yes);
        let plan = a.plan_update(AnswerText::No, 3, 0).unwrap();
        assert!(plan.purge_evidence);
        assert_eq!(plan.attach, 0);

        let err = a.plan_update(AnswerText::NotApplicable, 3, 1).unwrap_err();
        assert!(matches!(err, DomainError::BadRequest(_)));
    }

    #[test]
    fn switching_to_yes_needs_a_file_after_the_update() {
        let a = answer(AnswerText::No);
        assert!(matches!(a.plan_update(AnswerText::Yes, 0, 0), Err(DomainError::BadRequest(_))));
        let plan = a.plan_update(AnswerText::Yes, 0, 1).unwrap();
        assert!(!plan.purge_evidence);
        assert_eq!(plan.attach, 1);

        let yes = answer(AnswerText::Yes);
        assert!(yes.plan_update(AnswerText::Yes, 1, 0).is_ok());
    }

    #[test]
    fn reworking_a_rejected_answer_marks_it_improved() {
        let mut a = answer(AnswerText::No);
        a.review(ReviewDecision::Reject, Some("needs evidence".into()), false, UserId::new(), Utc::now())
            .unwrap();
        assert_eq!(a.review_status, AnswerReviewStatus::Rejected);

        let plan = a.plan_update(AnswerText::Yes, 0, 1).unwrap();
        a.apply_update(&plan, Utc::now());
        assert_eq!(a.revision_status, RevisionStatus::Improved);
        assert_eq!(a.review_status, AnswerReviewStatus::Pending);
        assert_eq!(a.answer_text, AnswerText::Yes);
    }

    #[test]
    fn final_review_freezes_the_answer() {
        let mut a = answer(AnswerText::NotApplicable);
        a.review(ReviewDecision::Approve, None, true, UserId::new(), Utc::now()).unwrap();
        assert!(matches!(a.plan_update(AnswerText::No, 0, 0), Err(DomainError::Conflict(_))));
        assert!(matches!(a.soft_delete(Utc::now()), Err(DomainError::Conflict(_))));

        let mut yes = answer(AnswerText::Yes);
        assert!(yes.ensure_evidence_addable().is_ok());
        yes.review(ReviewDecision::Approve, None, true, UserId::new(), Utc::now()).unwrap();
        assert!(matches!(yes.ensure_evidence_addable(), Err(DomainError::Conflict(_))));
        assert!(matches!(yes.ensure_evidence_removable(2), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn evidence_only_attaches_to_yes_answers() {
        assert!(matches!(answer(AnswerText::No).ensure_evidence_addable(), Err(DomainError::BadRequest(_))));
        assert!(matches!(
            answer(AnswerText::NotApplicable).ensure_evidence_addable(),
            Err(DomainError::BadRequest(_))
        ));
    }

    #[test]
    fn last_evidence_of_a_yes_answer_cannot_be_removed() {
        let a = answer(AnswerText::Yes);
        assert!(a.ensure_evidence_removable(1).is_ok());
        assert!(matches!(a.ensure_evidence_removable(0), Err(DomainError::BadRequest(_))));
    }
}
