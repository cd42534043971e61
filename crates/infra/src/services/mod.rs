//! Application services.
//!
//! Each public operation follows the same shape: open one store transaction,
//! run the access pipeline, apply the domain rules, write through conditional
//! updates, commit. Any error drops the transaction, which rolls it back.

mod answers;
mod comments;
mod lifecycle;
mod organization;
mod statistics;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use assurance_assessments::{CommentPolicy, EvidencePolicy};
use assurance_auth::{AuthorizationExplanation, Permission, Principal, RolePermissionTable};
use assurance_core::{DomainError, DomainResult};

use crate::access::AccessChecker;
use crate::clock::{Clock, SystemClock};
use crate::notify::{LogNotifier, Notifier};
use crate::store::{ComplianceStore, ResourceRef, StoreTx};

pub use answers::{AnswerInput, AnswerReview, AnswerView};
pub use lifecycle::{AssessmentTransition, AssessmentView, SubAssessmentTransition, SubAssessmentView};
pub use organization::{NewAssessment, NewCompany, NewDepartment, NewMasterQuestion, NewSubDepartment};

#[derive(Clone)]
pub struct ComplianceServices {
    store: Arc<dyn ComplianceStore>,
    access: AccessChecker,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    evidence_policy: EvidencePolicy,
    evidence_concurrency: usize,
    comment_policy: CommentPolicy,
}

impl ComplianceServices {
    pub fn new(store: Arc<dyn ComplianceStore>, table: Arc<RolePermissionTable>) -> Self {
        Self {
            store,
            access: AccessChecker::new(table),
            clock: Arc::new(SystemClock),
            notifier: Arc::new(LogNotifier),
            evidence_policy: EvidencePolicy::default(),
            evidence_concurrency: 4,
            comment_policy: CommentPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_evidence_policy(mut self, policy: EvidencePolicy, concurrency: usize) -> Self {
        self.evidence_policy = policy;
        self.evidence_concurrency = concurrency.max(1);
        self
    }

    pub fn with_comment_policy(mut self, policy: CommentPolicy) -> Self {
        self.comment_policy = policy;
        self
    }

    pub fn access(&self) -> &AccessChecker {
        &self.access
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn begin(&self) -> DomainResult<Box<dyn StoreTx>> {
        Ok(self.store.begin().await?)
    }

    /// Explain what the access pipeline decides for `permission` on `target`.
    pub async fn explain_access(
        &self,
        principal: &Principal,
        permission: Permission,
        target: ResourceRef,
    ) -> DomainResult<AuthorizationExplanation> {
        let mut tx = self.begin().await?;
        self.access
            .explain(tx.as_mut(), principal, permission, target, self.now())
            .await
    }
}

fn found<T>(row: Option<T>, what: &str) -> DomainResult<T> {
    row.ok_or_else(|| DomainError::not_found(format!("{what} not found")))
}

/// A conditional update that touched nothing lost a race.
fn ensure_updated(rows: u64, what: &str) -> DomainResult<()> {
    if rows == 0 {
        return Err(DomainError::conflict(format!(
            "{what} was modified concurrently, retry the request"
        )));
    }
    Ok(())
}
