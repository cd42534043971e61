use core::str::FromStr;

use serde::{Deserialize, Serialize};

use assurance_core::DomainError;

/// Role used for RBAC and scope resolution.
///
/// Declaration order is privilege order: broader roles first. Legacy numeric ids
/// (`"1"` = super-admin ... `"6"` = leadership) parse to the same variants as
/// their names, so there is exactly one comparison path.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    DepartmentManager,
    Assessor,
    Reviewer,
    Leadership,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::SuperAdmin,
        Role::Admin,
        Role::DepartmentManager,
        Role::Assessor,
        Role::Reviewer,
        Role::Leadership,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::DepartmentManager => "department_manager",
            Role::Assessor => "assessor",
            Role::Reviewer => "reviewer",
            Role::Leadership => "leadership",
        }
    }

    /// Legacy numeric identifier.
    pub fn legacy_id(&self) -> u8 {
        match self {
            Role::SuperAdmin => 1,
            Role::Admin => 2,
            Role::DepartmentManager => 3,
            Role::Assessor => 4,
            Role::Reviewer => 5,
            Role::Leadership => 6,
        }
    }

    /// Breadth of the scope a role covers.
    pub fn scope_level(&self) -> ScopeLevel {
        match self {
            Role::SuperAdmin => ScopeLevel::Global,
            Role::Admin => ScopeLevel::Company,
            Role::DepartmentManager => ScopeLevel::Department,
            Role::Assessor | Role::Reviewer | Role::Leadership => ScopeLevel::SubDepartment,
        }
    }

    pub fn is_super_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }
}

/// How much of the hierarchy a role sees, broadest first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    Global,
    Company,
    Department,
    SubDepartment,
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let role = match normalized.as_str() {
            "1" | "super_admin" | "superadmin" => Role::SuperAdmin,
            "2" | "admin" => Role::Admin,
            "3" | "department_manager" | "departmentmanager" => Role::DepartmentManager,
            "4" | "assessor" => Role::Assessor,
            "5" | "reviewer" => Role::Reviewer,
            "6" | "leadership" => Role::Leadership,
            _ => return Err(DomainError::bad_request(format!("unknown role '{s}'"))),
        };
        Ok(role)
    }
}
