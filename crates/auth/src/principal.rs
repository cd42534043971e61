use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use assurance_core::{CompanyId, DepartmentId, SubDepartmentId, UserId};

use crate::Role;

/// A fully resolved principal for authorization decisions.
///
/// Supplied by the identity/session layer after authentication; nothing in
/// this crate looks anything up to build it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    /// `None` only for super-admins.
    pub company_id: Option<CompanyId>,
    pub departments: BTreeSet<DepartmentId>,
    pub sub_departments: BTreeSet<SubDepartmentId>,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role, company_id: Option<CompanyId>) -> Self {
        Self {
            user_id,
            role,
            company_id,
            departments: BTreeSet::new(),
            sub_departments: BTreeSet::new(),
        }
    }

    pub fn with_departments(mut self, departments: impl IntoIterator<Item = DepartmentId>) -> Self {
        self.departments.extend(departments);
        self
    }

    pub fn with_sub_departments(
        mut self,
        sub_departments: impl IntoIterator<Item = SubDepartmentId>,
    ) -> Self {
        self.sub_departments.extend(sub_departments);
        self
    }

    pub fn is_super_admin(&self) -> bool {
        self.role.is_super_admin()
    }

    pub fn belongs_to_department(&self, department_id: DepartmentId) -> bool {
        self.departments.contains(&department_id)
    }

    pub fn belongs_to_sub_department(&self, sub_department_id: SubDepartmentId) -> bool {
        self.sub_departments.contains(&sub_department_id)
    }

    pub fn shares_department_with(&self, departments: &BTreeSet<DepartmentId>) -> bool {
        !self.departments.is_disjoint(departments)
    }
}
