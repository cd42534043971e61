use serde::Serialize;
use thiserror::Error;

use assurance_core::{CompanyId, DepartmentId, DomainError, SubDepartmentId, UserId};

use crate::{Permission, Principal, Role, RolePermissionTable};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' lacks permission '{permission}'")]
    MissingPermission { role: Role, permission: Permission },

    #[error("forbidden: {0}")]
    OutOfScope(String),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        DomainError::forbidden(value.to_string())
    }
}

/// Coarse role gate: can this role perform the action on the resource type at all?
///
/// - No IO
/// - No panics
/// - No instance data
pub fn authorize(
    table: &RolePermissionTable,
    principal: &Principal,
    required: Permission,
) -> Result<(), AuthzError> {
    if table.allows(principal.role, required) {
        Ok(())
    } else {
        Err(AuthzError::MissingPermission {
            role: principal.role,
            permission: required,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Which step of the access pipeline produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStep {
    RolePermission,
    Existence,
    Scope,
    Ownership,
    StateWindow,
}

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    /// Last step evaluated (the failing one on denial).
    pub step: DecisionStep,
    pub reason: String,
    pub principal: PrincipalState,
    pub suggestions: Vec<String>,
}

/// Snapshot of the principal at decision time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalState {
    pub user_id: UserId,
    pub role: Role,
    pub company_id: Option<CompanyId>,
    pub departments: Vec<DepartmentId>,
    pub sub_departments: Vec<SubDepartmentId>,
    pub role_permissions: Vec<String>,
}

impl PrincipalState {
    pub fn capture(table: &RolePermissionTable, principal: &Principal) -> Self {
        Self {
            user_id: principal.user_id,
            role: principal.role,
            company_id: principal.company_id,
            departments: principal.departments.iter().copied().collect(),
            sub_departments: principal.sub_departments.iter().copied().collect(),
            role_permissions: table
                .permissions_for(principal.role)
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl AuthorizationExplanation {
    pub fn granted(table: &RolePermissionTable, principal: &Principal, required: Permission) -> Self {
        Self {
            required_permission: required.to_string(),
            granted: true,
            step: DecisionStep::StateWindow,
            reason: format!(
                "role '{}' holds '{}' and the target is within the principal's scope",
                principal.role, required
            ),
            principal: PrincipalState::capture(table, principal),
            suggestions: Vec::new(),
        }
    }

    pub fn denied(
        table: &RolePermissionTable,
        principal: &Principal,
        required: Permission,
        step: DecisionStep,
        reason: impl Into<String>,
    ) -> Self {
        let suggestions = match step {
            DecisionStep::RolePermission => {
                let roles = table.roles_granting(required);
                let mut s = vec![format!("Assign a role that grants '{required}'")];
                if !roles.is_empty() {
                    let names: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
                    s.push(format!("Roles granting it: {}", names.join(", ")));
                }
                s
            }
            DecisionStep::Existence => vec!["Check the resource id".to_string()],
            DecisionStep::Scope => vec![
                "Add the user to the owning department or sub-department".to_string(),
            ],
            DecisionStep::Ownership => vec!["Only the author may change this resource".to_string()],
            DecisionStep::StateWindow => vec![
                "Content can only change while the assessment is started and not submitted".to_string(),
            ],
        };

        Self {
            required_permission: required.to_string(),
            granted: false,
            step,
            reason: reason.into(),
            principal: PrincipalState::capture(table, principal),
            suggestions,
        }
    }
}

/// Explain the coarse (role-permission) step alone.
pub fn explain_role_permission(
    table: &RolePermissionTable,
    principal: &Principal,
    required: Permission,
) -> Option<AuthorizationExplanation> {
    match authorize(table, principal, required) {
        Ok(()) => None,
        Err(e) => Some(AuthorizationExplanation::denied(
            table,
            principal,
            required,
            DecisionStep::RolePermission,
            e.to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, ResourceType};

    #[test]
    fn authorize_uses_the_table() {
        let table = RolePermissionTable::builtin();
        let assessor = Principal::new(UserId::new(), Role::Assessor, Some(CompanyId::new()));
        assert!(authorize(&table, &assessor, Permission::new(ResourceType::Answer, Action::Create)).is_ok());

        let err = authorize(&table, &assessor, Permission::new(ResourceType::Company, Action::Remove)).unwrap_err();
        assert!(err.to_string().contains("company.remove"));
        assert_eq!(DomainError::from(err).status_code(), 403);
    }

    #[test]
    fn denial_explanation_lists_granting_roles() {
        let table = RolePermissionTable::builtin();
        let leader = Principal::new(UserId::new(), Role::Leadership, Some(CompanyId::new()));
        let explanation =
            explain_role_permission(&table, &leader, Permission::new(ResourceType::Answer, Action::Review))
                .expect("leadership cannot review");

        assert!(!explanation.granted);
        assert_eq!(explanation.step, DecisionStep::RolePermission);
        assert!(explanation.suggestions.iter().any(|s| s.contains("reviewer")));
    }
}
