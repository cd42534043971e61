//! Assessment and sub-assessment state transitions, plus the read views.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use assurance_assessments::{
    Assessment, AssessmentCommand, Completion, SubAssessment, SubAssessmentCommand,
};
use assurance_auth::{Action, Permission, Principal, ResourceType};
use assurance_core::{Aggregate, AssessmentId, DepartmentId, DomainResult, Page, PageRequest, SubAssessmentId};

use super::{ComplianceServices, ensure_updated, found};
use crate::store::{QuestionDetail, ResourceRef, StoreTx};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssessmentTransition {
    Start,
    Submit,
    Reopen,
}

impl AssessmentTransition {
    fn action(self) -> Action {
        match self {
            AssessmentTransition::Start => Action::Start,
            AssessmentTransition::Submit => Action::Submit,
            AssessmentTransition::Reopen => Action::Reopen,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubAssessmentTransition {
    Start,
    Submit,
    Reopen,
    BeginReview,
    RequestRevision,
    CompleteReview,
}

impl SubAssessmentTransition {
    fn action(self) -> Action {
        match self {
            SubAssessmentTransition::Start => Action::Start,
            SubAssessmentTransition::Submit => Action::Submit,
            SubAssessmentTransition::Reopen => Action::Reopen,
            SubAssessmentTransition::BeginReview
            | SubAssessmentTransition::RequestRevision
            | SubAssessmentTransition::CompleteReview => Action::Review,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentView {
    #[serde(flatten)]
    pub assessment: Assessment,
    pub sub_assessments: Vec<SubAssessment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAssessmentView {
    #[serde(flatten)]
    pub sub_assessment: SubAssessment,
    pub total_questions: u64,
    pub answered_questions: u64,
    pub percentage_completed: f64,
}

impl SubAssessmentView {
    fn new(sub_assessment: SubAssessment, completion: Completion) -> Self {
        Self {
            sub_assessment,
            total_questions: completion.total_questions,
            answered_questions: completion.answered_questions,
            percentage_completed: completion.percentage(),
        }
    }
}

async fn assessment_view(tx: &mut dyn StoreTx, id: AssessmentId) -> DomainResult<AssessmentView> {
    let assessment = found(tx.get_assessment(id).await?, "assessment")?;
    let sub_assessments = tx.list_sub_assessments(id).await?;
    Ok(AssessmentView {
        assessment,
        sub_assessments,
    })
}

impl ComplianceServices {
    /// Start, submit or reopen an assessment.
    ///
    /// Start and submit cascade to every sub-assessment in the same
    /// transaction. Children already in the target state are left alone.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id), err)]
    pub async fn transition_assessment(
        &self,
        principal: &Principal,
        id: AssessmentId,
        transition: AssessmentTransition,
    ) -> DomainResult<AssessmentView> {
        let now = self.now();
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::Assessment, transition.action()),
                ResourceRef::Assessment(id),
                now,
            )
            .await?;

        let mut assessment = found(tx.get_assessment(id).await?, "assessment")?;
        let expected = assessment.state();
        let command = match transition {
            AssessmentTransition::Start => AssessmentCommand::Start { at: now },
            AssessmentTransition::Submit => AssessmentCommand::Submit { at: now },
            AssessmentTransition::Reopen => AssessmentCommand::Reopen { at: now },
        };
        let events = assessment.execute(&command)?;
        ensure_updated(tx.update_assessment_lifecycle(&assessment, expected).await?, "assessment")?;

        let mut cascaded = 0usize;
        if transition != AssessmentTransition::Reopen {
            for mut sub in tx.list_sub_assessments(id).await? {
                let (state, review) = (sub.state(), sub.review_status);
                let changed = match transition {
                    AssessmentTransition::Start => sub.cascade_start(now),
                    _ => sub.cascade_submit(now),
                };
                if changed {
                    ensure_updated(tx.update_sub_assessment(&sub, state, review).await?, "sub-assessment")?;
                    cascaded += 1;
                }
            }
        }

        let view = assessment_view(tx.as_mut(), id).await?;
        tx.commit().await?;

        for event in &events {
            info!(event = event.event_type(), assessment_id = %id, cascaded, "assessment transitioned");
        }
        Ok(view)
    }

    pub async fn start_assessment(&self, principal: &Principal, id: AssessmentId) -> DomainResult<AssessmentView> {
        self.transition_assessment(principal, id, AssessmentTransition::Start).await
    }

    pub async fn submit_assessment(&self, principal: &Principal, id: AssessmentId) -> DomainResult<AssessmentView> {
        self.transition_assessment(principal, id, AssessmentTransition::Submit).await
    }

    pub async fn reopen_assessment(&self, principal: &Principal, id: AssessmentId) -> DomainResult<AssessmentView> {
        self.transition_assessment(principal, id, AssessmentTransition::Reopen).await
    }

    /// Lifecycle or review transition of one sub-assessment.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id), err)]
    pub async fn transition_sub_assessment(
        &self,
        principal: &Principal,
        id: SubAssessmentId,
        transition: SubAssessmentTransition,
    ) -> DomainResult<SubAssessmentView> {
        let now = self.now();
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::SubAssessment, transition.action()),
                ResourceRef::SubAssessment(id),
                now,
            )
            .await?;

        let mut sub = found(tx.get_sub_assessment(id).await?, "sub-assessment")?;
        let (state, review) = (sub.state(), sub.review_status);
        let command = match transition {
            SubAssessmentTransition::Start => SubAssessmentCommand::Start { at: now },
            SubAssessmentTransition::Submit => SubAssessmentCommand::Submit {
                at: now,
                completion: tx.sub_assessment_completion(id).await?,
            },
            SubAssessmentTransition::Reopen => SubAssessmentCommand::Reopen { at: now },
            SubAssessmentTransition::BeginReview => SubAssessmentCommand::BeginReview { at: now },
            SubAssessmentTransition::RequestRevision => SubAssessmentCommand::RequestRevision { at: now },
            SubAssessmentTransition::CompleteReview => SubAssessmentCommand::CompleteReview { at: now },
        };
        let events = sub.execute(&command)?;
        ensure_updated(tx.update_sub_assessment(&sub, state, review).await?, "sub-assessment")?;

        let completion = tx.sub_assessment_completion(id).await?;
        tx.commit().await?;

        info!(sub_assessment_id = %id, ?transition, events = events.len(), review_status = sub.review_status.as_str(), "sub-assessment transitioned");
        Ok(SubAssessmentView::new(sub, completion))
    }

    pub async fn start_sub_assessment(&self, principal: &Principal, id: SubAssessmentId) -> DomainResult<SubAssessmentView> {
        self.transition_sub_assessment(principal, id, SubAssessmentTransition::Start).await
    }

    pub async fn submit_sub_assessment(&self, principal: &Principal, id: SubAssessmentId) -> DomainResult<SubAssessmentView> {
        self.transition_sub_assessment(principal, id, SubAssessmentTransition::Submit).await
    }

    pub async fn reopen_sub_assessment(&self, principal: &Principal, id: SubAssessmentId) -> DomainResult<SubAssessmentView> {
        self.transition_sub_assessment(principal, id, SubAssessmentTransition::Reopen).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get_assessment(&self, principal: &Principal, id: AssessmentId) -> DomainResult<AssessmentView> {
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::Assessment, Action::Read),
                ResourceRef::Assessment(id),
                self.now(),
            )
            .await?;
        assessment_view(tx.as_mut(), id).await
    }

    pub async fn list_assessments(
        &self,
        principal: &Principal,
        department_id: DepartmentId,
        page: PageRequest,
    ) -> DomainResult<Page<Assessment>> {
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::Assessment, Action::Read),
                ResourceRef::Department(department_id),
                self.now(),
            )
            .await?;
        Ok(page.slice(tx.list_assessments(department_id).await?))
    }

    pub async fn get_sub_assessment(&self, principal: &Principal, id: SubAssessmentId) -> DomainResult<SubAssessmentView> {
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::SubAssessment, Action::Read),
                ResourceRef::SubAssessment(id),
                self.now(),
            )
            .await?;
        let sub = found(tx.get_sub_assessment(id).await?, "sub-assessment")?;
        let completion = tx.sub_assessment_completion(id).await?;
        Ok(SubAssessmentView::new(sub, completion))
    }

    /// Questions of a sub-assessment with their bank text and live answer.
    pub async fn list_questions(
        &self,
        principal: &Principal,
        sub_assessment_id: SubAssessmentId,
        page: PageRequest,
    ) -> DomainResult<Page<QuestionDetail>> {
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::AssessmentQuestion, Action::Read),
                ResourceRef::SubAssessment(sub_assessment_id),
                self.now(),
            )
            .await?;
        Ok(page.slice(tx.list_questions(sub_assessment_id).await?))
    }
}

#[cfg(test)]
mod tests {
    use assurance_assessments::{AnswerText, LifecycleState, ReviewStatus};
    use assurance_core::DomainError;

    use super::*;
    use crate::fixtures::{World, pdf};
    use crate::services::AnswerInput;

    async fn answer_all(world: &World, services: &ComplianceServices, count: usize) {
        for question in world.questions_of(world.sub_x.id).into_iter().take(count) {
            services
                .create_answer(&world.assessor_x(), question, AnswerInput::new(AnswerText::No, vec![]))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn start_cascades_to_every_sub_assessment() {
        let world = World::seed(2).await;
        let view = world.services().start_assessment(&world.admin(), world.blueprint.assessment.id).await.unwrap();

        assert_eq!(view.assessment.state(), LifecycleState::Started);
        assert_eq!(view.assessment.lifecycle.started_at, Some(world.now));
        assert_eq!(view.sub_assessments.len(), 2);
        for sub in &view.sub_assessments {
            assert!(sub.lifecycle.started);
            assert!(!sub.lifecycle.submitted);
            assert_eq!(sub.lifecycle.started_at, Some(world.now));
        }
    }

    #[tokio::test]
    async fn lifecycle_order_is_enforced() {
        let world = World::seed(1).await;
        let services = world.services();
        let admin = world.admin();
        let id = world.blueprint.assessment.id;

        let err = services.submit_assessment(&admin, id).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        let err = services.reopen_assessment(&admin, id).await.unwrap_err();
        assert!(err.message().contains("not submitted, cannot reopen"));

        services.start_assessment(&admin, id).await.unwrap();
        let err = services.start_assessment(&admin, id).await.unwrap_err();
        assert!(err.message().contains("already started"));

        let view = services.submit_assessment(&admin, id).await.unwrap();
        assert!(view.sub_assessments.iter().all(|s| s.lifecycle.submitted));
        assert!(view.sub_assessments.iter().all(|s| s.review_status == ReviewStatus::SubmittedForReview));

        let view = services.reopen_assessment(&admin, id).await.unwrap();
        assert_eq!(view.assessment.lifecycle.submitted_at, None);
        services.submit_assessment(&admin, id).await.unwrap();
    }

    #[tokio::test]
    async fn sub_assessment_submit_needs_every_question_answered() {
        let world = World::seed(5).await;
        world.start_assessment().await;
        let services = world.services();
        let sub = world.sub_assessment_of(world.sub_x.id);

        answer_all(&world, &services, 4).await;
        let err = services.submit_sub_assessment(&world.assessor_x(), sub).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert!(err.message().contains("must be attempted"));

        let fifth = world.questions_of(world.sub_x.id)[4];
        services
            .create_answer(&world.assessor_x(), fifth, AnswerInput::new(AnswerText::Yes, vec![pdf("policy.pdf")]))
            .await
            .unwrap();
        let view = services.submit_sub_assessment(&world.assessor_x(), sub).await.unwrap();
        assert_eq!(view.sub_assessment.state(), LifecycleState::Submitted);
        assert_eq!(view.percentage_completed, 100.0);
    }

    #[tokio::test]
    async fn review_workflow_reopens_on_revision() {
        let world = World::seed(1).await;
        world.start_assessment().await;
        let services = world.services();
        let sub = world.sub_assessment_of(world.sub_x.id);
        answer_all(&world, &services, 1).await;
        services.submit_sub_assessment(&world.assessor_x(), sub).await.unwrap();

        let reviewer = world.reviewer_x();
        let err = services
            .transition_sub_assessment(&reviewer, sub, SubAssessmentTransition::CompleteReview)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        services
            .transition_sub_assessment(&reviewer, sub, SubAssessmentTransition::BeginReview)
            .await
            .unwrap();
        let view = services
            .transition_sub_assessment(&reviewer, sub, SubAssessmentTransition::RequestRevision)
            .await
            .unwrap();
        assert_eq!(view.sub_assessment.review_status, ReviewStatus::NeedRevision);
        assert_eq!(view.sub_assessment.state(), LifecycleState::Started);

        // Reviewers hold no submit permission; the assessor resubmits.
        assert!(services.submit_sub_assessment(&reviewer, sub).await.is_err());
        let view = services.submit_sub_assessment(&world.assessor_x(), sub).await.unwrap();
        assert_eq!(view.sub_assessment.review_status, ReviewStatus::SubmittedForReview);
    }

    #[tokio::test]
    async fn questions_are_paginated() {
        let world = World::seed(5).await;
        let services = world.services();
        let sub = world.sub_assessment_of(world.sub_x.id);

        let page = services
            .list_questions(&world.assessor_x(), sub, PageRequest::new(Some(2), Some(2)).unwrap())
            .await
            .unwrap();
        assert_eq!(page.total_items, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|q| q.answer.is_none()));

        let other = world.sub_assessment_of(world.sub_y.id);
        assert!(services.list_questions(&world.assessor_x(), other, PageRequest::default()).await.is_err());
    }
}
