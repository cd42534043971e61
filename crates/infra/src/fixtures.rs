//! Seeded in-memory world shared by the infra tests.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use assurance_assessments::{
    AssessmentBlueprint, Company, ControlNumber, Department, EvidenceUpload, MasterQuestion,
    PDF_CONTENT_TYPE, RiskRating, SubDepartment,
};
use assurance_auth::{Principal, Role, RolePermissionTable, UserAccount};
use assurance_core::{
    AssessmentQuestionId, MasterDepartmentId, MasterQuestionId, SubAssessmentId, SubDepartmentId,
    UserId,
};

use crate::access::AccessChecker;
use crate::clock::ManualClock;
use crate::services::ComplianceServices;
use crate::store::{ComplianceStore, InMemoryComplianceStore};

pub(crate) struct World {
    pub store: InMemoryComplianceStore,
    pub clock: ManualClock,
    pub company: Company,
    pub department: Department,
    pub sub_x: SubDepartment,
    pub sub_y: SubDepartment,
    pub blueprint: AssessmentBlueprint,
    pub assessor: UserAccount,
    pub now: DateTime<Utc>,
}

impl World {
    /// One company, one department with sub-departments X and Y, and an
    /// assessment holding `questions` questions per sub-department.
    pub async fn seed(questions: usize) -> Self {
        let now = Utc::now();
        let store = InMemoryComplianceStore::new();
        let master_department = MasterDepartmentId::new();

        let company = Company::new("Acme", Some("ops@acme.test".into()), None, now).unwrap();
        let department = Department::new(company.id, "Security", Some(master_department), now).unwrap();
        let sub_x = SubDepartment::new(department.id, "Identity", now).unwrap();
        let sub_y = SubDepartment::new(department.id, "Network", now).unwrap();

        let masters: Vec<MasterQuestion> = (0..questions)
            .map(|i| MasterQuestion {
                id: MasterQuestionId::new(),
                master_department_id: master_department,
                text: format!("Control objective {i} is met"),
                control_numbers: vec![ControlNumber::new(format!("A.{}-{i}", 5 + i % 2)).unwrap()],
                frameworks: vec!["ISO27001".to_string()],
                risk_rating: (i == 0).then_some(RiskRating::High),
            })
            .collect();

        let blueprint =
            AssessmentBlueprint::build(department.id, &[sub_x.id, sub_y.id], &masters, None, now).unwrap();

        let assessor = UserAccount {
            id: UserId::new(),
            email: "assessor@acme.test".to_string(),
            name: "Ada Assessor".to_string(),
            role: Role::Assessor,
            company_id: Some(company.id),
            department_ids: BTreeSet::from([department.id]),
            sub_department_ids: BTreeSet::from([sub_x.id]),
            created_at: now,
        };

        let mut tx = store.begin().await.unwrap();
        tx.insert_company(&company).await.unwrap();
        tx.insert_department(&department).await.unwrap();
        tx.insert_sub_department(&sub_x).await.unwrap();
        tx.insert_sub_department(&sub_y).await.unwrap();
        for master in &masters {
            tx.insert_master_question(master).await.unwrap();
        }
        tx.insert_blueprint(&blueprint).await.unwrap();
        tx.insert_user(&assessor).await.unwrap();
        tx.commit().await.unwrap();

        Self {
            store,
            clock: ManualClock::new(now),
            company,
            department,
            sub_x,
            sub_y,
            blueprint,
            assessor,
            now,
        }
    }

    pub fn checker(&self) -> AccessChecker {
        AccessChecker::new(Arc::new(RolePermissionTable::builtin()))
    }

    pub fn services(&self) -> ComplianceServices {
        ComplianceServices::new(Arc::new(self.store.clone()), Arc::new(RolePermissionTable::builtin()))
            .with_clock(Arc::new(self.clock.clone()))
    }

    pub fn super_admin(&self) -> Principal {
        Principal::new(UserId::new(), Role::SuperAdmin, None)
    }

    pub fn admin(&self) -> Principal {
        Principal::new(UserId::new(), Role::Admin, Some(self.company.id))
    }

    pub fn manager(&self) -> Principal {
        Principal::new(UserId::new(), Role::DepartmentManager, Some(self.company.id))
            .with_departments([self.department.id])
    }

    fn member_of(&self, sub: SubDepartmentId, role: Role) -> Principal {
        Principal::new(UserId::new(), role, Some(self.company.id))
            .with_departments([self.department.id])
            .with_sub_departments([sub])
    }

    /// The persisted assessor of sub-department X.
    pub fn assessor_x(&self) -> Principal {
        self.assessor.principal()
    }

    pub fn assessor_x_account(&self) -> UserAccount {
        self.assessor.clone()
    }

    pub fn assessor_y(&self) -> Principal {
        self.member_of(self.sub_y.id, Role::Assessor)
    }

    pub fn reviewer_x(&self) -> Principal {
        self.member_of(self.sub_x.id, Role::Reviewer)
    }

    pub fn leadership_x(&self) -> Principal {
        self.member_of(self.sub_x.id, Role::Leadership)
    }

    pub fn sub_assessment_of(&self, sub: SubDepartmentId) -> SubAssessmentId {
        self.blueprint
            .sub_assessments
            .iter()
            .find(|s| s.sub_department_id == sub)
            .map(|s| s.id)
            .unwrap()
    }

    pub fn questions_of(&self, sub: SubDepartmentId) -> Vec<AssessmentQuestionId> {
        let sub_assessment = self.sub_assessment_of(sub);
        self.blueprint
            .questions
            .iter()
            .filter(|q| q.sub_assessment_id == sub_assessment)
            .map(|q| q.id)
            .collect()
    }

    /// Start the assessment as an admin (cascades to every sub-assessment).
    pub async fn start_assessment(&self) {
        self.services()
            .start_assessment(&self.admin(), self.blueprint.assessment.id)
            .await
            .unwrap();
    }
}

pub(crate) fn pdf(name: &str) -> EvidenceUpload {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.extend_from_slice(name.as_bytes());
    EvidenceUpload {
        original_name: name.to_string(),
        content_type: PDF_CONTENT_TYPE.to_string(),
        bytes,
    }
}
