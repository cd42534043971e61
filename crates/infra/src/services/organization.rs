//! Administrative provisioning: the organisation tree, users, the question
//! bank and new department assessments.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, instrument};

use assurance_assessments::{
    AssessmentBlueprint, Company, ControlNumber, Department, MasterQuestion, RiskRating, SubDepartment,
};
use assurance_auth::{Action, NewUser, Permission, Principal, ResourceType, UserAccount};
use assurance_core::{
    CompanyId, DepartmentId, DomainError, DomainResult, MasterDepartmentId, MasterQuestionId, UserId,
};

use super::{AssessmentView, ComplianceServices, found};
use crate::notify::{Notification, notify_best_effort};
use crate::store::ResourceRef;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCompany {
    pub name: String,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDepartment {
    pub name: String,
    #[serde(default)]
    pub master_department_id: Option<MasterDepartmentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubDepartment {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssessment {
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMasterQuestion {
    pub master_department_id: MasterDepartmentId,
    pub text: String,
    pub control_numbers: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub risk_rating: Option<String>,
}

impl NewMasterQuestion {
    fn into_question(self) -> DomainResult<MasterQuestion> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(DomainError::bad_request("question text cannot be empty"));
        }
        if self.control_numbers.is_empty() {
            return Err(DomainError::bad_request("at least one control number is required"));
        }
        let control_numbers = self
            .control_numbers
            .into_iter()
            .map(ControlNumber::new)
            .collect::<DomainResult<Vec<_>>>()?;
        let risk_rating = self.risk_rating.as_deref().map(RiskRating::parse).transpose()?;

        Ok(MasterQuestion {
            id: MasterQuestionId::new(),
            master_department_id: self.master_department_id,
            text: text.to_string(),
            control_numbers,
            frameworks: self
                .frameworks
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            risk_rating,
        })
    }
}

impl ComplianceServices {
    /// Companies are tenant roots; only roles granted `company.create` (the
    /// super-admin by default) may add one.
    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id), err)]
    pub async fn create_company(&self, principal: &Principal, input: NewCompany) -> DomainResult<Company> {
        self.access
            .require_role(principal, Permission::new(ResourceType::Company, Action::Create))?;
        let company = Company::new(&input.name, input.contact_email, input.contact_phone, self.now())?;

        let mut tx = self.begin().await?;
        tx.insert_company(&company).await?;
        tx.commit().await?;
        info!(company_id = %company.id, "company created");
        Ok(company)
    }

    pub async fn get_company(&self, principal: &Principal, id: CompanyId) -> DomainResult<Company> {
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::Company, Action::Read),
                ResourceRef::Company(id),
                self.now(),
            )
            .await?;
        found(tx.get_company(id).await?, "company")
    }

    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id), err)]
    pub async fn create_department(
        &self,
        principal: &Principal,
        company_id: CompanyId,
        input: NewDepartment,
    ) -> DomainResult<Department> {
        let now = self.now();
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::Department, Action::Create),
                ResourceRef::Company(company_id),
                now,
            )
            .await?;

        let department = Department::new(company_id, &input.name, input.master_department_id, now)?;
        tx.insert_department(&department).await?;
        tx.commit().await?;
        info!(department_id = %department.id, "department created");
        Ok(department)
    }

    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id), err)]
    pub async fn create_sub_department(
        &self,
        principal: &Principal,
        department_id: DepartmentId,
        input: NewSubDepartment,
    ) -> DomainResult<SubDepartment> {
        let now = self.now();
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::SubDepartment, Action::Create),
                ResourceRef::Department(department_id),
                now,
            )
            .await?;

        let sub_department = SubDepartment::new(department_id, &input.name, now)?;
        tx.insert_sub_department(&sub_department).await?;
        tx.commit().await?;
        info!(sub_department_id = %sub_department.id, "sub-department created");
        Ok(sub_department)
    }

    pub async fn list_sub_departments(
        &self,
        principal: &Principal,
        department_id: DepartmentId,
    ) -> DomainResult<Vec<SubDepartment>> {
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::SubDepartment, Action::Read),
                ResourceRef::Department(department_id),
                self.now(),
            )
            .await?;
        Ok(tx.list_sub_departments(department_id).await?)
    }

    /// Provision a user and send the onboarding notification.
    ///
    /// The actor must reach every department handed out; sub-departments must
    /// sit inside those departments. Delivery failures are logged and do not
    /// undo the account.
    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id, role = %input.role), err)]
    pub async fn create_user(&self, principal: &Principal, input: NewUser) -> DomainResult<UserAccount> {
        let permission = Permission::new(ResourceType::User, Action::Create);
        self.access.require_role(principal, permission)?;
        input.validate(principal)?;

        let now = self.now();
        let mut tx = self.begin().await?;

        if input.department_ids.is_empty() {
            if let Some(company_id) = input.company_id {
                self.access
                    .check(tx.as_mut(), principal, permission, ResourceRef::Company(company_id), now)
                    .await?;
            }
        }
        for &department_id in &input.department_ids {
            self.access
                .check(tx.as_mut(), principal, permission, ResourceRef::Department(department_id), now)
                .await?;
            let department = found(tx.get_department(department_id).await?, "department")?;
            if Some(department.company_id) != input.company_id {
                return Err(DomainError::bad_request(format!(
                    "department {department_id} belongs to another company"
                )));
            }
        }
        for &sub_department_id in &input.sub_department_ids {
            let sub_department = found(tx.get_sub_department(sub_department_id).await?, "sub-department")?;
            if !input.department_ids.contains(&sub_department.department_id) {
                return Err(DomainError::bad_request(format!(
                    "sub-department {sub_department_id} is not inside the assigned departments"
                )));
            }
        }

        let account = input.into_account(now);
        if tx.user_email_exists(&account.email).await? {
            return Err(DomainError::conflict(format!("a user with email {} already exists", account.email)));
        }
        tx.insert_user(&account).await?;
        tx.commit().await?;
        info!(new_user_id = %account.id, role = %account.role, "user created");

        notify_best_effort(
            self.notifier.as_ref(),
            &Notification::Onboarding {
                user_id: account.id,
                email: account.email.clone(),
                name: account.name.clone(),
            },
        )
        .await;
        Ok(account)
    }

    pub async fn get_user(&self, principal: &Principal, id: UserId) -> DomainResult<UserAccount> {
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::User, Action::Read),
                ResourceRef::User(id),
                self.now(),
            )
            .await?;
        found(tx.get_user(id).await?, "user")
    }

    /// Add a question to the framework-neutral bank.
    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id), err)]
    pub async fn create_master_question(
        &self,
        principal: &Principal,
        input: NewMasterQuestion,
    ) -> DomainResult<MasterQuestion> {
        self.access
            .require_role(principal, Permission::new(ResourceType::AssessmentQuestion, Action::Create))?;
        let question = input.into_question()?;

        let mut tx = self.begin().await?;
        tx.insert_master_question(&question).await?;
        tx.commit().await?;
        Ok(question)
    }

    /// Create an assessment for a department together with one
    /// sub-assessment per sub-department and their questions.
    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id), err)]
    pub async fn create_assessment(
        &self,
        principal: &Principal,
        department_id: DepartmentId,
        input: NewAssessment,
    ) -> DomainResult<AssessmentView> {
        let now = self.now();
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::Assessment, Action::Create),
                ResourceRef::Department(department_id),
                now,
            )
            .await?;

        let department = found(tx.get_department(department_id).await?, "department")?;
        let Some(master_department_id) = department.master_department_id else {
            return Err(DomainError::bad_request(
                "department has no master department to build questions from",
            ));
        };
        let sub_departments: Vec<_> = tx
            .list_sub_departments(department_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let masters = tx.master_questions_for(master_department_id).await?;

        let blueprint = AssessmentBlueprint::build(department_id, &sub_departments, &masters, input.deadline, now)?;
        tx.insert_blueprint(&blueprint).await?;
        tx.commit().await?;

        info!(
            assessment_id = %blueprint.assessment.id,
            sub_assessments = blueprint.sub_assessments.len(),
            questions = blueprint.questions.len(),
            "assessment created"
        );
        Ok(AssessmentView {
            assessment: blueprint.assessment,
            sub_assessments: blueprint.sub_assessments,
        })
    }
}
