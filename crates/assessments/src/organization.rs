//! Tenancy tree: companies, departments and sub-departments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use assurance_core::{
    CompanyId, DepartmentId, DomainError, DomainResult, Entity, MasterDepartmentId, SubDepartmentId,
};

fn required(field: &str, value: &str) -> DomainResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::bad_request(format!("{field} cannot be empty")));
    }
    Ok(value.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Company {
    pub fn new(
        name: &str,
        contact_email: Option<String>,
        contact_phone: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let contact_email = contact_email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty());
        if let Some(email) = &contact_email {
            if !email.contains('@') {
                return Err(DomainError::bad_request("invalid contact email"));
            }
        }
        Ok(Self {
            id: CompanyId::new(),
            name: required("company name", name)?,
            contact_email,
            contact_phone: contact_phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
            created_at: now,
        })
    }
}

impl Entity for Company {
    type Id = CompanyId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub company_id: CompanyId,
    /// Template whose master questions seed this department's assessments.
    pub master_department_id: Option<MasterDepartmentId>,
    pub created_at: DateTime<Utc>,
}

impl Department {
    pub fn new(
        company_id: CompanyId,
        name: &str,
        master_department_id: Option<MasterDepartmentId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id: DepartmentId::new(),
            name: required("department name", name)?,
            company_id,
            master_department_id,
            created_at: now,
        })
    }
}

impl Entity for Department {
    type Id = DepartmentId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubDepartment {
    pub id: SubDepartmentId,
    pub name: String,
    pub department_id: DepartmentId,
    pub created_at: DateTime<Utc>,
}

impl SubDepartment {
    pub fn new(department_id: DepartmentId, name: &str, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: SubDepartmentId::new(),
            name: required("sub-department name", name)?,
            department_id,
            created_at: now,
        })
    }
}

impl Entity for SubDepartment {
    type Id = SubDepartmentId;

    fn id(&self) -> Self::Id {
        self.id
    }
}
