//! User accounts and the rules for provisioning them.
//!
//! Provisioning enforces tenant isolation and prevents privilege escalation:
//! an actor can never create an account broader than their own scope.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use assurance_core::{CompanyId, DepartmentId, DomainError, DomainResult, Entity, SubDepartmentId, UserId};

use crate::{Principal, Role};

// ─────────────────────────────────────────────────────────────────────────────
// User account
// ─────────────────────────────────────────────────────────────────────────────

/// A persisted user.
///
/// # Invariants
/// - `company_id` is `None` only for super-admins.
/// - The email is stored trimmed and lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub company_id: Option<CompanyId>,
    pub department_ids: BTreeSet<DepartmentId>,
    pub sub_department_ids: BTreeSet<SubDepartmentId>,
    pub created_at: DateTime<Utc>,
}

impl Entity for UserAccount {
    type Id = UserId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl UserAccount {
    /// The principal this account authenticates as.
    pub fn principal(&self) -> Principal {
        Principal::new(self.id, self.role, self.company_id)
            .with_departments(self.department_ids.iter().copied())
            .with_sub_departments(self.sub_department_ids.iter().copied())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provisioning
// ─────────────────────────────────────────────────────────────────────────────

/// Input for creating a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub company_id: Option<CompanyId>,
    #[serde(default)]
    pub department_ids: BTreeSet<DepartmentId>,
    #[serde(default)]
    pub sub_department_ids: BTreeSet<SubDepartmentId>,
}

impl NewUser {
    /// Shape checks plus the escalation rules against `actor`.
    ///
    /// Memberships pointing into other companies are checked by the caller,
    /// which can see the organisation rows.
    pub fn validate(&self, actor: &Principal) -> DomainResult<()> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::bad_request("invalid email format"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::bad_request("name cannot be empty"));
        }

        match (self.role.is_super_admin(), self.company_id) {
            (true, Some(_)) => {
                return Err(DomainError::bad_request("a super-admin cannot belong to a company"));
            }
            (false, None) => {
                return Err(DomainError::bad_request("companyId is required for this role"));
            }
            _ => {}
        }

        ensure_no_escalation(actor, self.role)?;

        if !actor.is_super_admin() && self.company_id != actor.company_id {
            return Err(DomainError::forbidden("cannot create users in another company"));
        }
        if actor.role == Role::DepartmentManager && !self.department_ids.is_subset(&actor.departments) {
            return Err(DomainError::forbidden(
                "department managers can only assign their own departments",
            ));
        }
        Ok(())
    }

    pub fn into_account(self, now: DateTime<Utc>) -> UserAccount {
        UserAccount {
            id: UserId::new(),
            email: self.email.trim().to_lowercase(),
            name: self.name.trim().to_string(),
            role: self.role,
            company_id: self.company_id,
            department_ids: self.department_ids,
            sub_department_ids: self.sub_department_ids,
            created_at: now,
        }
    }
}

/// An actor may only hand out roles whose scope is no broader than their own.
/// Only a super-admin may create another super-admin.
pub fn ensure_no_escalation(actor: &Principal, target: Role) -> DomainResult<()> {
    if actor.is_super_admin() {
        return Ok(());
    }
    if target.is_super_admin() || target.scope_level() < actor.role.scope_level() {
        return Err(DomainError::forbidden(format!(
            "role {} cannot grant role {}",
            actor.role, target
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(role: Role, company_id: Option<CompanyId>) -> NewUser {
        NewUser {
            email: " Alice@Example.com ".to_string(),
            name: "Alice".to_string(),
            role,
            company_id,
            department_ids: BTreeSet::new(),
            sub_department_ids: BTreeSet::new(),
        }
    }

    #[test]
    fn admin_creates_assessor_in_own_company() {
        let company = CompanyId::new();
        let admin = Principal::new(UserId::new(), Role::Admin, Some(company));
        let input = new_user(Role::Assessor, Some(company));
        input.validate(&admin).unwrap();

        let account = input.into_account(Utc::now());
        assert_eq!(account.email, "alice@example.com");
        assert_eq!(account.principal().role, Role::Assessor);
    }

    #[test]
    fn admin_cannot_cross_tenants_or_escalate() {
        let company = CompanyId::new();
        let admin = Principal::new(UserId::new(), Role::Admin, Some(company));

        let other = new_user(Role::Assessor, Some(CompanyId::new()));
        assert!(matches!(other.validate(&admin), Err(DomainError::Forbidden(_))));

        let super_admin = new_user(Role::SuperAdmin, None);
        assert!(matches!(super_admin.validate(&admin), Err(DomainError::Forbidden(_))));
    }

    #[test]
    fn manager_cannot_create_admins_or_foreign_department_members() {
        let company = CompanyId::new();
        let dept = DepartmentId::new();
        let manager =
            Principal::new(UserId::new(), Role::DepartmentManager, Some(company)).with_departments([dept]);

        assert!(new_user(Role::Admin, Some(company)).validate(&manager).is_err());

        let mut own = new_user(Role::Reviewer, Some(company));
        own.department_ids.insert(dept);
        own.validate(&manager).unwrap();

        let mut foreign = new_user(Role::Reviewer, Some(company));
        foreign.department_ids.insert(DepartmentId::new());
        assert!(matches!(foreign.validate(&manager), Err(DomainError::Forbidden(_))));
    }

    #[test]
    fn company_rules_follow_the_role() {
        let root = Principal::new(UserId::new(), Role::SuperAdmin, None);
        assert!(new_user(Role::SuperAdmin, None).validate(&root).is_ok());
        assert!(new_user(Role::SuperAdmin, Some(CompanyId::new())).validate(&root).is_err());
        assert!(new_user(Role::Admin, None).validate(&root).is_err());

        let mut bad_email = new_user(Role::Admin, Some(CompanyId::new()));
        bad_email.email = "nope".into();
        assert!(matches!(bad_email.validate(&root), Err(DomainError::BadRequest(_))));
    }
}
