//! Scope resolver: does a principal's role-scope cover a target entity?

use serde::{Deserialize, Serialize};

use assurance_core::{CompanyId, DepartmentId, SubDepartmentId, ValueObject};

use crate::{Principal, Role};

/// The `(company, department, sub-department)` triple an entity belongs to.
///
/// Entities above the sub-department level leave the lower fields empty.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub company_id: CompanyId,
    pub department_id: Option<DepartmentId>,
    pub sub_department_id: Option<SubDepartmentId>,
}

impl ValueObject for Scope {}

impl Scope {
    pub fn company(company_id: CompanyId) -> Self {
        Self {
            company_id,
            department_id: None,
            sub_department_id: None,
        }
    }

    pub fn department(company_id: CompanyId, department_id: DepartmentId) -> Self {
        Self {
            company_id,
            department_id: Some(department_id),
            sub_department_id: None,
        }
    }

    pub fn sub_department(
        company_id: CompanyId,
        department_id: DepartmentId,
        sub_department_id: SubDepartmentId,
    ) -> Self {
        Self {
            company_id,
            department_id: Some(department_id),
            sub_department_id: Some(sub_department_id),
        }
    }
}

/// Ordered, first match wins:
///
/// 1. super-admin: always;
/// 2. admin: same company;
/// 3. department-manager: member of the target department;
/// 4. everyone else: member of the target sub-department, or of the target
///    department when the target has no sub-department granularity.
///
/// Membership never widens a role: a department-manager outside the company's
/// department set fails even when they happen to sit in the sub-department.
pub fn in_scope(principal: &Principal, scope: &Scope) -> bool {
    match principal.role {
        Role::SuperAdmin => true,
        Role::Admin => principal.company_id == Some(scope.company_id),
        Role::DepartmentManager => scope
            .department_id
            .is_some_and(|d| principal.belongs_to_department(d)),
        Role::Assessor | Role::Reviewer | Role::Leadership => match scope.sub_department_id {
            Some(sub) => principal.belongs_to_sub_department(sub),
            None => scope
                .department_id
                .is_some_and(|d| principal.belongs_to_department(d)),
        },
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use assurance_core::UserId;

    use super::*;

    fn principal(role: Role, company: CompanyId) -> Principal {
        Principal::new(UserId::new(), role, Some(company))
    }

    #[test]
    fn super_admin_passes_everything() {
        let p = Principal::new(UserId::new(), Role::SuperAdmin, None);
        let scope = Scope::sub_department(CompanyId::new(), DepartmentId::new(), SubDepartmentId::new());
        assert!(in_scope(&p, &scope));
        assert!(in_scope(&p, &Scope::company(CompanyId::new())));
    }

    #[test]
    fn admin_is_company_wide() {
        let company = CompanyId::new();
        let p = principal(Role::Admin, company);
        let inside = Scope::sub_department(company, DepartmentId::new(), SubDepartmentId::new());
        let outside = Scope::sub_department(CompanyId::new(), DepartmentId::new(), SubDepartmentId::new());
        assert!(in_scope(&p, &inside));
        assert!(!in_scope(&p, &outside));
    }

    #[test]
    fn department_manager_needs_department_membership() {
        let company = CompanyId::new();
        let dept = DepartmentId::new();
        let p = principal(Role::DepartmentManager, company).with_departments([dept]);
        assert!(in_scope(&p, &Scope::sub_department(company, dept, SubDepartmentId::new())));
        assert!(!in_scope(&p, &Scope::department(company, DepartmentId::new())));
        assert!(!in_scope(&p, &Scope::company(company)));
    }

    #[test]
    fn assessor_of_one_sub_department_cannot_see_a_sibling() {
        let company = CompanyId::new();
        let dept = DepartmentId::new();
        let x = SubDepartmentId::new();
        let y = SubDepartmentId::new();
        let p = principal(Role::Assessor, company)
            .with_departments([dept])
            .with_sub_departments([x]);
        assert!(in_scope(&p, &Scope::sub_department(company, dept, x)));
        assert!(!in_scope(&p, &Scope::sub_department(company, dept, y)));
    }

    #[test]
    fn narrow_roles_fall_back_to_department_membership_without_sub_department() {
        let company = CompanyId::new();
        let dept = DepartmentId::new();
        let p = principal(Role::Reviewer, company).with_departments([dept]);
        assert!(in_scope(&p, &Scope::department(company, dept)));
        assert!(!in_scope(&p, &Scope::department(company, DepartmentId::new())));
    }

    fn arb_role() -> impl Strategy<Value = Role> {
        prop::sample::select(Role::ALL.to_vec())
    }

    proptest! {
        /// Given identical, consistent memberships (a sub-department member is a
        /// member of its department, which sits in the user's company), a
        /// narrower role never passes a check a broader role fails.
        #[test]
        fn narrower_roles_never_exceed_broader_ones(
            a in arb_role(),
            b in arb_role(),
            same_company in any::<bool>(),
            in_dept in any::<bool>(),
            in_sub in any::<bool>(),
            has_sub in any::<bool>(),
        ) {
            let (broad, narrow) = if a.scope_level() <= b.scope_level() { (a, b) } else { (b, a) };

            let company = CompanyId::new();
            let dept = DepartmentId::new();
            let sub = SubDepartmentId::new();
            let scope = if has_sub {
                Scope::sub_department(company, dept, sub)
            } else {
                Scope::department(company, dept)
            };

            let in_dept = in_dept || in_sub;
            let same_company = same_company || in_dept;
            let user_company = if same_company { company } else { CompanyId::new() };
            let build = |role: Role| {
                let mut p = Principal::new(UserId::new(), role, Some(user_company));
                if in_dept {
                    p.departments.insert(dept);
                }
                if in_sub {
                    p.sub_departments.insert(sub);
                }
                p
            };

            let narrow_allowed = in_scope(&build(narrow), &scope);
            let broad_allowed = in_scope(&build(broad), &scope);
            if narrow_allowed {
                prop_assert!(broad_allowed, "{narrow} allowed where {broad} was denied");
            }
        }

        #[test]
        fn decisions_are_deterministic(role in arb_role(), in_sub in any::<bool>()) {
            let company = CompanyId::new();
            let dept = DepartmentId::new();
            let sub = SubDepartmentId::new();
            let mut p = Principal::new(UserId::new(), role, Some(company));
            if in_sub {
                p.sub_departments.insert(sub);
            }
            let scope = Scope::sub_department(company, dept, sub);
            prop_assert_eq!(in_scope(&p, &scope), in_scope(&p, &scope));
        }
    }
}
