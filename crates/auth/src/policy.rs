//! Role-permission table (the coarse gate).
//!
//! A static allow-list of `(role, resource type, action)` grants. Built once at
//! start-up and shared read-only; absence of a grant means deny.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Action, Permission, ResourceType, Role};

/// One row of the allow-list.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub role: Role,
    pub resource: ResourceType,
    pub action: Action,
}

#[derive(Debug, Error)]
pub enum PolicyLoadError {
    #[error("invalid permission grant list: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("permission grant list is empty")]
    Empty,
}

/// Immutable role → permission mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePermissionTable {
    grants: HashSet<Grant>,
}

impl RolePermissionTable {
    pub fn from_grants(grants: impl IntoIterator<Item = Grant>) -> Self {
        Self {
            grants: grants.into_iter().collect(),
        }
    }

    /// Load a JSON array of `{"role", "resource", "action"}` rows.
    pub fn from_json(json: &str) -> Result<Self, PolicyLoadError> {
        let grants: Vec<Grant> = serde_json::from_str(json)?;
        if grants.is_empty() {
            return Err(PolicyLoadError::Empty);
        }
        Ok(Self::from_grants(grants))
    }

    /// Pure lookup. Fails closed.
    pub fn has_role_permission(&self, role: Role, resource: ResourceType, action: Action) -> bool {
        self.grants.contains(&Grant { role, resource, action })
    }

    pub fn allows(&self, role: Role, permission: Permission) -> bool {
        self.has_role_permission(role, permission.resource, permission.action)
    }

    /// Every permission granted to `role`, sorted.
    pub fn permissions_for(&self, role: Role) -> Vec<Permission> {
        let set: BTreeSet<Permission> = self
            .grants
            .iter()
            .filter(|g| g.role == role)
            .map(|g| Permission::new(g.resource, g.action))
            .collect();
        set.into_iter().collect()
    }

    /// Roles that hold `permission`, broadest first.
    pub fn roles_granting(&self, permission: Permission) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|r| self.allows(*r, permission))
            .collect()
    }

    /// Role → permission names, for audit/display.
    pub fn registry(&self) -> BTreeMap<Role, Vec<String>> {
        Role::ALL
            .into_iter()
            .map(|r| (r, self.permissions_for(r).iter().map(ToString::to_string).collect()))
            .collect()
    }

    /// Built-in seed used when no grant list is configured.
    pub fn builtin() -> Self {
        use Action::*;
        use ResourceType::*;

        const ALL_RESOURCES: [ResourceType; 11] = [
            Company,
            Department,
            SubDepartment,
            Assessment,
            SubAssessment,
            AssessmentQuestion,
            Answer,
            Comment,
            EvidenceFile,
            User,
            Statistics,
        ];
        const ALL_ACTIONS: [Action; 8] = [Create, Read, Update, Remove, Start, Submit, Reopen, Review];
        const CRUD: [Action; 4] = [Create, Read, Update, Remove];
        const LIFECYCLE: [Action; 3] = [Start, Submit, Reopen];

        let mut grants = Vec::new();
        let mut grant = |role: Role, resource: ResourceType, actions: &[Action]| {
            grants.extend(actions.iter().map(|&action| Grant { role, resource, action }));
        };

        for resource in ALL_RESOURCES {
            grant(Role::SuperAdmin, resource, &ALL_ACTIONS);
        }

        let admin = Role::Admin;
        grant(admin, Company, &[Read, Update]);
        grant(admin, Department, &CRUD);
        grant(admin, SubDepartment, &CRUD);
        grant(admin, Assessment, &CRUD);
        grant(admin, Assessment, &LIFECYCLE);
        grant(admin, SubAssessment, &[Read, Update, Review]);
        grant(admin, SubAssessment, &LIFECYCLE);
        grant(admin, AssessmentQuestion, &[Read]);
        grant(admin, Answer, &[Read, Review]);
        grant(admin, Comment, &CRUD);
        grant(admin, EvidenceFile, &[Read]);
        grant(admin, User, &CRUD);
        grant(admin, Statistics, &[Read]);

        let manager = Role::DepartmentManager;
        grant(manager, Department, &[Read]);
        grant(manager, SubDepartment, &[Create, Read, Update]);
        grant(manager, Assessment, &[Create, Read]);
        grant(manager, Assessment, &LIFECYCLE);
        grant(manager, SubAssessment, &[Read, Review]);
        grant(manager, SubAssessment, &LIFECYCLE);
        grant(manager, AssessmentQuestion, &[Read]);
        grant(manager, Answer, &[Read, Review]);
        grant(manager, Comment, &CRUD);
        grant(manager, EvidenceFile, &[Read]);
        grant(manager, User, &[Read]);
        grant(manager, Statistics, &[Read]);

        let assessor = Role::Assessor;
        grant(assessor, SubDepartment, &[Read]);
        grant(assessor, Assessment, &[Read]);
        grant(assessor, SubAssessment, &[Read, Start, Submit]);
        grant(assessor, AssessmentQuestion, &[Read]);
        grant(assessor, Answer, &CRUD);
        grant(assessor, Comment, &CRUD);
        grant(assessor, EvidenceFile, &[Create, Read, Remove]);
        grant(assessor, User, &[Read]);
        grant(assessor, Statistics, &[Read]);

        let reviewer = Role::Reviewer;
        grant(reviewer, SubDepartment, &[Read]);
        grant(reviewer, Assessment, &[Read]);
        grant(reviewer, SubAssessment, &[Read, Reopen, Review]);
        grant(reviewer, AssessmentQuestion, &[Read]);
        grant(reviewer, Answer, &[Read, Review]);
        grant(reviewer, Comment, &CRUD);
        grant(reviewer, EvidenceFile, &[Read]);
        grant(reviewer, User, &[Read]);
        grant(reviewer, Statistics, &[Read]);

        let leadership = Role::Leadership;
        for resource in [SubDepartment, Assessment, SubAssessment, AssessmentQuestion, Answer, Comment, EvidenceFile, User, Statistics] {
            grant(leadership, resource, &[Read]);
        }

        Self::from_grants(grants)
    }
}

impl Default for RolePermissionTable {
    fn default() -> Self {
        Self::builtin()
    }
}
