//! Answers and their evidence.
//!
//! The answer row, evidence inserts/deletes and the re-read that produces
//! the response all happen in one transaction. Uploads are validated and
//! fingerprinted before the first write.

use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use assurance_assessments::{
    Answer, AnswerText, EvidenceFile, EvidenceUpload, LifecycleState, ReviewDecision,
    prepare_evidence, validate_new_answer,
};
use assurance_auth::{Action, Permission, Principal, ResourceType};
use assurance_core::{AnswerId, AssessmentQuestionId, DomainError, DomainResult, EvidenceFileId, UserId};

use super::{ComplianceServices, ensure_updated, found};
use crate::store::{ResourceRef, StoreTx};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerInput {
    pub answer_text: AnswerText,
    pub files: Vec<EvidenceUpload>,
}

impl AnswerInput {
    pub fn new(answer_text: AnswerText, files: Vec<EvidenceUpload>) -> Self {
        Self { answer_text, files }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerReview {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub final_review: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerView {
    #[serde(flatten)]
    pub answer: Answer,
    pub evidence: Vec<EvidenceFile>,
}

async fn answer_view(tx: &mut dyn StoreTx, id: AnswerId) -> DomainResult<AnswerView> {
    let answer = found(tx.get_answer(id).await?, "answer")?;
    let evidence = tx.list_evidence(id).await?;
    Ok(AnswerView { answer, evidence })
}

async fn insert_all(tx: &mut dyn StoreTx, files: &[EvidenceFile]) -> DomainResult<()> {
    for file in files {
        tx.insert_evidence(file).await?;
    }
    Ok(())
}

impl ComplianceServices {
    /// Validate, checksum and place uploads, keeping their order.
    ///
    /// Files are processed on the blocking pool, at most
    /// `evidence_concurrency` at a time. Ids are allocated up front so the
    /// stored order matches the upload order.
    async fn prepare_uploads(
        &self,
        uploads: Vec<EvidenceUpload>,
        answer_id: AnswerId,
        created_by: UserId,
    ) -> DomainResult<Vec<EvidenceFile>> {
        self.evidence_policy.check_batch(&uploads)?;
        let policy = self.evidence_policy;
        let now = self.now();

        let batch: Vec<_> = uploads.into_iter().map(|upload| (EvidenceFileId::new(), upload)).collect();

        stream::iter(batch)
            .map(|(id, upload)| {
                tokio::task::spawn_blocking(move || {
                    policy.check_file(&upload)?;
                    Ok::<_, DomainError>(prepare_evidence(id, upload, answer_id, created_by, now))
                })
            })
            .buffered(self.evidence_concurrency)
            .map(|joined| {
                joined
                    .map_err(|e| {
                        error!(error = %e, "evidence preparation task failed");
                        DomainError::internal()
                    })
                    .and_then(|prepared| prepared)
            })
            .try_collect()
            .await
    }

    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id, files = input.files.len()), err)]
    pub async fn create_answer(
        &self,
        principal: &Principal,
        question_id: AssessmentQuestionId,
        input: AnswerInput,
    ) -> DomainResult<AnswerView> {
        let now = self.now();
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::Answer, Action::Create),
                ResourceRef::AssessmentQuestion(question_id),
                now,
            )
            .await?;

        validate_new_answer(input.answer_text, input.files.len())?;
        if tx.live_answer_for_question(question_id).await?.is_some() {
            return Err(DomainError::conflict("this question already has an answer"));
        }

        let answer = Answer::new(question_id, principal.user_id, input.answer_text, now);
        let files = self.prepare_uploads(input.files, answer.id, principal.user_id).await?;

        tx.insert_answer(&answer).await?;
        insert_all(tx.as_mut(), &files).await?;
        let view = answer_view(tx.as_mut(), answer.id).await?;
        tx.commit().await?;

        info!(answer_id = %answer.id, answer_text = answer.answer_text.as_str(), evidence = files.len(), "answer created");
        Ok(view)
    }

    /// Change an answer's text, attaching or purging evidence as the new
    /// text requires.
    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id, files = input.files.len()), err)]
    pub async fn update_answer(
        &self,
        principal: &Principal,
        id: AnswerId,
        input: AnswerInput,
    ) -> DomainResult<AnswerView> {
        let now = self.now();
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::Answer, Action::Update),
                ResourceRef::Answer(id),
                now,
            )
            .await?;

        let mut answer = found(tx.get_answer(id).await?, "answer")?;
        let existing = tx.list_evidence(id).await?.len();
        let plan = answer.plan_update(input.answer_text, existing, input.files.len())?;
        let files = self.prepare_uploads(input.files, id, principal.user_id).await?;

        if plan.purge_evidence {
            let purged = tx.delete_evidence_for_answer(id).await?;
            info!(answer_id = %id, purged, "evidence purged by answer update");
        }
        answer.apply_update(&plan, now);
        ensure_updated(tx.update_answer(&answer).await?, "answer")?;
        insert_all(tx.as_mut(), &files).await?;

        let view = answer_view(tx.as_mut(), id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Soft-delete an answer and drop its evidence. The question can then be
    /// answered again.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id), err)]
    pub async fn delete_answer(&self, principal: &Principal, id: AnswerId) -> DomainResult<()> {
        let now = self.now();
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::Answer, Action::Remove),
                ResourceRef::Answer(id),
                now,
            )
            .await?;

        let mut answer = found(tx.get_answer(id).await?, "answer")?;
        answer.soft_delete(now)?;
        ensure_updated(tx.update_answer(&answer).await?, "answer")?;
        tx.delete_evidence_for_answer(id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Approve or reject an answer. Only possible once the owning
    /// sub-assessment has been submitted.
    #[instrument(skip(self, principal, review), fields(user_id = %principal.user_id, decision = ?review.decision), err)]
    pub async fn review_answer(
        &self,
        principal: &Principal,
        id: AnswerId,
        review: AnswerReview,
    ) -> DomainResult<AnswerView> {
        let now = self.now();
        let mut tx = self.begin().await?;
        let grant = self
            .access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::Answer, Action::Review),
                ResourceRef::Answer(id),
                now,
            )
            .await?;

        let submitted = grant
            .ownership
            .container
            .is_some_and(|c| c.state == LifecycleState::Submitted);
        if !submitted {
            return Err(DomainError::conflict(
                "answers can only be reviewed after the sub-assessment has been submitted",
            ));
        }

        let mut answer = found(tx.get_answer(id).await?, "answer")?;
        answer.review(review.decision, review.comment, review.final_review, principal.user_id, now)?;
        ensure_updated(tx.update_answer(&answer).await?, "answer")?;
        let view = answer_view(tx.as_mut(), id).await?;
        tx.commit().await?;
        Ok(view)
    }

    pub async fn get_answer(&self, principal: &Principal, id: AnswerId) -> DomainResult<AnswerView> {
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::Answer, Action::Read),
                ResourceRef::Answer(id),
                self.now(),
            )
            .await?;
        answer_view(tx.as_mut(), id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Evidence
    // ─────────────────────────────────────────────────────────────────────────

    /// Attach more files to a `yes` answer.
    #[instrument(skip(self, principal, uploads), fields(user_id = %principal.user_id, files = uploads.len()), err)]
    pub async fn add_evidence(
        &self,
        principal: &Principal,
        answer_id: AnswerId,
        uploads: Vec<EvidenceUpload>,
    ) -> DomainResult<AnswerView> {
        let now = self.now();
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::EvidenceFile, Action::Create),
                ResourceRef::Answer(answer_id),
                now,
            )
            .await?;

        let answer = found(tx.get_answer(answer_id).await?, "answer")?;
        if uploads.is_empty() {
            return Err(DomainError::bad_request("no evidence files supplied"));
        }
        answer.ensure_evidence_addable()?;
        let files = self.prepare_uploads(uploads, answer_id, principal.user_id).await?;
        insert_all(tx.as_mut(), &files).await?;

        let view = answer_view(tx.as_mut(), answer_id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Remove one evidence file. The last file of a `yes` answer stays.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id), err)]
    pub async fn remove_evidence(&self, principal: &Principal, id: EvidenceFileId) -> DomainResult<AnswerView> {
        let now = self.now();
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::EvidenceFile, Action::Remove),
                ResourceRef::EvidenceFile(id),
                now,
            )
            .await?;

        let file = found(tx.get_evidence(id).await?, "evidence file")?;
        let answer = found(tx.get_answer(file.answer_id).await?, "answer")?;
        let remaining = tx.list_evidence(answer.id).await?.len().saturating_sub(1);
        answer.ensure_evidence_removable(remaining)?;

        if tx.delete_evidence(id).await? == 0 {
            return Err(DomainError::not_found("evidence file not found"));
        }
        let view = answer_view(tx.as_mut(), answer.id).await?;
        tx.commit().await?;
        Ok(view)
    }

    pub async fn list_evidence(&self, principal: &Principal, answer_id: AnswerId) -> DomainResult<Vec<EvidenceFile>> {
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::EvidenceFile, Action::Read),
                ResourceRef::Answer(answer_id),
                self.now(),
            )
            .await?;
        Ok(tx.list_evidence(answer_id).await?)
    }

    /// One evidence file including its bytes, for download.
    pub async fn get_evidence(&self, principal: &Principal, id: EvidenceFileId) -> DomainResult<EvidenceFile> {
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::EvidenceFile, Action::Read),
                ResourceRef::EvidenceFile(id),
                self.now(),
            )
            .await?;
        found(tx.get_evidence(id).await?, "evidence file")
    }
}
