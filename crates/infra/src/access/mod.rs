//! Context access checkers.
//!
//! Every service call runs one pipeline before touching data:
//!
//! 1. role-permission table (coarse gate, no IO);
//! 2. ownership projection of the target (missing ⇒ NotFound);
//! 3. scope resolver, or the user-management rule for `User` targets;
//! 4. state window for content writes (answers, comments, evidence, questions);
//! 5. author rule for comment edits and deletes.
//!
//! The first failing step decides. [`AccessChecker::explain`] runs the same
//! pipeline and reports which step decided instead of failing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use assurance_assessments::ensure_content_mutable;
use assurance_auth::{
    Action, AuthorizationExplanation, DecisionStep, Permission, Principal, ResourceType, Role,
    RolePermissionTable, authorize, in_scope,
};
use assurance_core::{DomainError, DomainResult};

use crate::store::{Ownership, ResourceRef, StoreTx};

/// Proof that the pipeline passed, carrying what it loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub ownership: Ownership,
}

enum Decision {
    Granted(Ownership),
    Denied { step: DecisionStep, error: DomainError },
}

fn denied(step: DecisionStep, error: DomainError) -> DomainResult<Decision> {
    Ok(Decision::Denied { step, error })
}

/// User management reach: who may act on which account.
fn user_in_reach(principal: &Principal, target: &Ownership) -> bool {
    match principal.role {
        Role::SuperAdmin => true,
        Role::Admin => principal.company_id.is_some() && principal.company_id == target.company_id,
        Role::DepartmentManager => principal.shares_department_with(&target.member_departments),
        Role::Assessor | Role::Reviewer | Role::Leadership => target.author == Some(principal.user_id),
    }
}

#[derive(Debug, Clone)]
pub struct AccessChecker {
    table: Arc<RolePermissionTable>,
}

impl AccessChecker {
    pub fn new(table: Arc<RolePermissionTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RolePermissionTable {
        &self.table
    }

    /// Coarse gate only, for operations without an existing target instance.
    pub fn require_role(&self, principal: &Principal, permission: Permission) -> DomainResult<()> {
        authorize(&self.table, principal, permission).map_err(|e| {
            debug!(user_id = %principal.user_id, role = %principal.role, %permission, "role permission denied");
            DomainError::from(e)
        })
    }

    /// Run the full pipeline against `target`.
    #[instrument(
        skip(self, tx, principal),
        fields(user_id = %principal.user_id, role = %principal.role, permission = %permission, target = ?target),
        err
    )]
    pub async fn check(
        &self,
        tx: &mut dyn StoreTx,
        principal: &Principal,
        permission: Permission,
        target: ResourceRef,
        now: DateTime<Utc>,
    ) -> DomainResult<AccessGrant> {
        match self.evaluate(tx, principal, permission, target, now).await? {
            Decision::Granted(ownership) => Ok(AccessGrant { ownership }),
            Decision::Denied { step, error } => {
                match step {
                    DecisionStep::Existence | DecisionStep::RolePermission => {
                        debug!(?step, reason = error.message(), "access denied")
                    }
                    _ => warn!(?step, reason = error.message(), "access denied"),
                }
                Err(error)
            }
        }
    }

    /// Explain the decision `check` would make, without failing on denial.
    pub async fn explain(
        &self,
        tx: &mut dyn StoreTx,
        principal: &Principal,
        permission: Permission,
        target: ResourceRef,
        now: DateTime<Utc>,
    ) -> DomainResult<AuthorizationExplanation> {
        Ok(match self.evaluate(tx, principal, permission, target, now).await? {
            Decision::Granted(_) => AuthorizationExplanation::granted(&self.table, principal, permission),
            Decision::Denied { step, error } => {
                AuthorizationExplanation::denied(&self.table, principal, permission, step, error.message())
            }
        })
    }

    async fn evaluate(
        &self,
        tx: &mut dyn StoreTx,
        principal: &Principal,
        permission: Permission,
        target: ResourceRef,
        now: DateTime<Utc>,
    ) -> DomainResult<Decision> {
        if let Err(e) = authorize(&self.table, principal, permission) {
            return denied(DecisionStep::RolePermission, e.into());
        }

        let Some(ownership) = tx.ownership(target).await? else {
            return denied(
                DecisionStep::Existence,
                DomainError::not_found(format!("{} not found", target.resource_type())),
            );
        };

        let reachable = match target {
            ResourceRef::User(_) => user_in_reach(principal, &ownership),
            _ => ownership.scope().is_some_and(|scope| in_scope(principal, &scope)),
        };
        if !reachable {
            return denied(
                DecisionStep::Scope,
                DomainError::forbidden(format!(
                    "{} is outside the scope of role '{}'",
                    target.resource_type(),
                    principal.role
                )),
            );
        }

        if permission.resource.is_state_gated() && permission.action.mutates_content() {
            if let Some(container) = ownership.container {
                if let Err(e) = ensure_content_mutable(container.kind, container.state, container.deadline, now) {
                    return denied(DecisionStep::StateWindow, e);
                }
            }
        }

        let author_only = permission.resource == ResourceType::Comment
            && matches!(target, ResourceRef::Comment(_))
            && matches!(permission.action, Action::Update | Action::Remove);
        if author_only && !principal.is_super_admin() && ownership.author != Some(principal.user_id) {
            let verb = if permission.action == Action::Remove { "delete" } else { "modify" };
            return denied(
                DecisionStep::Ownership,
                DomainError::forbidden(format!("only the author may {verb} this comment")),
            );
        }

        Ok(Decision::Granted(ownership))
    }
}
