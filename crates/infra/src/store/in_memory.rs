use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use assurance_assessments::{
    Answer, AnswerFact, Assessment, AssessmentBlueprint, AssessmentQuestion, Comment, Company,
    Completion, ContainerKind, Department, EvidenceFile, LifecycleState, MasterQuestion,
    ReviewStatus, StatisticsInput, SubAssessment, SubDepartment,
};
use assurance_auth::UserAccount;
use assurance_core::{
    AnswerId, AssessmentId, AssessmentQuestionId, CommentId, CompanyId, DepartmentId,
    EvidenceFileId, MasterDepartmentId, MasterQuestionId, SubAssessmentId, SubDepartmentId, UserId,
};

use super::r#trait::{
    ComplianceStore, ContainerState, Ownership, QuestionDetail, ResourceRef, StatsScope,
    StoreError, StoreResult, StoreTx,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    companies: HashMap<CompanyId, Company>,
    departments: HashMap<DepartmentId, Department>,
    sub_departments: HashMap<SubDepartmentId, SubDepartment>,
    users: HashMap<UserId, UserAccount>,
    master_questions: HashMap<MasterQuestionId, MasterQuestion>,
    assessments: HashMap<AssessmentId, Assessment>,
    sub_assessments: HashMap<SubAssessmentId, SubAssessment>,
    questions: HashMap<AssessmentQuestionId, AssessmentQuestion>,
    answers: HashMap<AnswerId, Answer>,
    evidence: HashMap<EvidenceFileId, EvidenceFile>,
    comments: HashMap<CommentId, Comment>,
}

impl Tables {
    /// `(company, department)` of a department row.
    fn department_path(&self, id: DepartmentId) -> Option<(CompanyId, DepartmentId)> {
        self.departments.get(&id).map(|d| (d.company_id, d.id))
    }

    fn sub_department_path(&self, id: SubDepartmentId) -> Option<(CompanyId, DepartmentId, SubDepartmentId)> {
        let sub = self.sub_departments.get(&id)?;
        let (company, dept) = self.department_path(sub.department_id)?;
        Some((company, dept, sub.id))
    }

    fn sub_assessment_ownership(&self, id: SubAssessmentId) -> Option<Ownership> {
        let sub = self.sub_assessments.get(&id)?;
        let (company, dept, sub_dept) = self.sub_department_path(sub.sub_department_id)?;
        Some(Ownership {
            company_id: Some(company),
            department_id: Some(dept),
            sub_department_id: Some(sub_dept),
            container: Some(ContainerState {
                kind: ContainerKind::SubAssessment,
                state: sub.state(),
                deadline: sub.deadline,
            }),
            ..Ownership::default()
        })
    }

    fn question_ownership(&self, id: AssessmentQuestionId) -> Option<Ownership> {
        let question = self.questions.get(&id)?;
        self.sub_assessment_ownership(question.sub_assessment_id)
    }

    fn live_answer(&self, id: AnswerId) -> Option<&Answer> {
        self.answers.get(&id).filter(|a| !a.is_deleted())
    }

    fn ownership(&self, target: ResourceRef) -> Option<Ownership> {
        match target {
            ResourceRef::Company(id) => self.companies.get(&id).map(|c| Ownership {
                company_id: Some(c.id),
                ..Ownership::default()
            }),
            ResourceRef::Department(id) => self.department_path(id).map(|(company, dept)| Ownership {
                company_id: Some(company),
                department_id: Some(dept),
                ..Ownership::default()
            }),
            ResourceRef::SubDepartment(id) => {
                self.sub_department_path(id).map(|(company, dept, sub)| Ownership {
                    company_id: Some(company),
                    department_id: Some(dept),
                    sub_department_id: Some(sub),
                    ..Ownership::default()
                })
            }
            ResourceRef::Assessment(id) => {
                let assessment = self.assessments.get(&id)?;
                let (company, dept) = self.department_path(assessment.department_id)?;
                Some(Ownership {
                    company_id: Some(company),
                    department_id: Some(dept),
                    container: Some(ContainerState {
                        kind: ContainerKind::Assessment,
                        state: assessment.state(),
                        deadline: assessment.deadline,
                    }),
                    ..Ownership::default()
                })
            }
            ResourceRef::SubAssessment(id) => self.sub_assessment_ownership(id),
            ResourceRef::AssessmentQuestion(id) => self.question_ownership(id),
            ResourceRef::Answer(id) => {
                let answer = self.live_answer(id)?;
                let mut ownership = self.question_ownership(answer.assessment_question_id)?;
                ownership.author = Some(answer.created_by);
                Some(ownership)
            }
            ResourceRef::Comment(id) => {
                let comment = self.comments.get(&id).filter(|c| c.deleted_at.is_none())?;
                let mut ownership = self.question_ownership(comment.assessment_question_id)?;
                ownership.author = Some(comment.created_by);
                Some(ownership)
            }
            ResourceRef::EvidenceFile(id) => {
                let file = self.evidence.get(&id)?;
                let answer = self.live_answer(file.answer_id)?;
                let mut ownership = self.question_ownership(answer.assessment_question_id)?;
                ownership.author = Some(file.created_by);
                Some(ownership)
            }
            ResourceRef::User(id) => self.users.get(&id).map(|u| Ownership {
                company_id: u.company_id,
                author: Some(u.id),
                member_departments: u.department_ids.clone(),
                ..Ownership::default()
            }),
        }
    }

    fn sorted<T: Clone, K: Ord>(rows: impl Iterator<Item = T>, key: impl Fn(&T) -> K) -> Vec<T> {
        let mut rows: Vec<T> = rows.collect();
        rows.sort_by_key(|r| key(r));
        rows
    }
}

/// In-memory store for tests and local development.
///
/// Transactions are serialized: `begin` takes the table lock and works on a
/// copy that replaces the shared tables on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryComplianceStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryComplianceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ComplianceStore for InMemoryComplianceStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTx { guard, working }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn duplicate(operation: &'static str, id: impl core::fmt::Display) -> StoreError {
    StoreError::UniqueViolation {
        operation,
        message: format!("row {id} already exists"),
    }
}

fn missing_parent(operation: &'static str, what: &str, id: impl core::fmt::Display) -> StoreError {
    StoreError::Database {
        operation,
        message: format!("foreign key violation: {what} {id} does not exist"),
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn ownership(&mut self, target: ResourceRef) -> StoreResult<Option<Ownership>> {
        Ok(self.working.ownership(target))
    }

    async fn insert_company(&mut self, company: &Company) -> StoreResult<()> {
        if self.working.companies.contains_key(&company.id) {
            return Err(duplicate("insert_company", company.id));
        }
        self.working.companies.insert(company.id, company.clone());
        Ok(())
    }

    async fn get_company(&mut self, id: CompanyId) -> StoreResult<Option<Company>> {
        Ok(self.working.companies.get(&id).cloned())
    }

    async fn insert_department(&mut self, department: &Department) -> StoreResult<()> {
        if !self.working.companies.contains_key(&department.company_id) {
            return Err(missing_parent("insert_department", "company", department.company_id));
        }
        self.working.departments.insert(department.id, department.clone());
        Ok(())
    }

    async fn get_department(&mut self, id: DepartmentId) -> StoreResult<Option<Department>> {
        Ok(self.working.departments.get(&id).cloned())
    }

    async fn insert_sub_department(&mut self, sub_department: &SubDepartment) -> StoreResult<()> {
        if !self.working.departments.contains_key(&sub_department.department_id) {
            return Err(missing_parent(
                "insert_sub_department",
                "department",
                sub_department.department_id,
            ));
        }
        self.working.sub_departments.insert(sub_department.id, sub_department.clone());
        Ok(())
    }

    async fn list_sub_departments(&mut self, department_id: DepartmentId) -> StoreResult<Vec<SubDepartment>> {
        Ok(Tables::sorted(
            self.working
                .sub_departments
                .values()
                .filter(|s| s.department_id == department_id)
                .cloned(),
            |s| (s.created_at, s.id),
        ))
    }

    async fn get_sub_department(&mut self, id: SubDepartmentId) -> StoreResult<Option<SubDepartment>> {
        Ok(self.working.sub_departments.get(&id).cloned())
    }

    async fn insert_user(&mut self, user: &UserAccount) -> StoreResult<()> {
        if self.working.users.values().any(|u| u.email == user.email) {
            return Err(duplicate("insert_user", &user.email));
        }
        self.working.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&mut self, id: UserId) -> StoreResult<Option<UserAccount>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn user_email_exists(&mut self, email: &str) -> StoreResult<bool> {
        Ok(self.working.users.values().any(|u| u.email == email))
    }

    async fn insert_master_question(&mut self, question: &MasterQuestion) -> StoreResult<()> {
        self.working.master_questions.insert(question.id, question.clone());
        Ok(())
    }

    async fn master_questions_for(
        &mut self,
        master_department_id: MasterDepartmentId,
    ) -> StoreResult<Vec<MasterQuestion>> {
        Ok(Tables::sorted(
            self.working
                .master_questions
                .values()
                .filter(|q| q.master_department_id == master_department_id)
                .cloned(),
            |q| q.id,
        ))
    }

    async fn insert_blueprint(&mut self, blueprint: &AssessmentBlueprint) -> StoreResult<()> {
        let assessment = &blueprint.assessment;
        if !self.working.departments.contains_key(&assessment.department_id) {
            return Err(missing_parent("insert_blueprint", "department", assessment.department_id));
        }
        self.working.assessments.insert(assessment.id, assessment.clone());
        for sub in &blueprint.sub_assessments {
            self.working.sub_assessments.insert(sub.id, sub.clone());
        }
        for question in &blueprint.questions {
            self.working.questions.insert(question.id, question.clone());
        }
        Ok(())
    }

    async fn get_assessment(&mut self, id: AssessmentId) -> StoreResult<Option<Assessment>> {
        Ok(self.working.assessments.get(&id).cloned())
    }

    async fn list_assessments(&mut self, department_id: DepartmentId) -> StoreResult<Vec<Assessment>> {
        Ok(Tables::sorted(
            self.working
                .assessments
                .values()
                .filter(|a| a.department_id == department_id)
                .cloned(),
            |a| (a.created_at, a.id),
        ))
    }

    async fn update_assessment_lifecycle(
        &mut self,
        assessment: &Assessment,
        expected: LifecycleState,
    ) -> StoreResult<u64> {
        match self.working.assessments.get_mut(&assessment.id) {
            Some(row) if row.state() == expected => {
                row.lifecycle = assessment.lifecycle;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn get_sub_assessment(&mut self, id: SubAssessmentId) -> StoreResult<Option<SubAssessment>> {
        Ok(self.working.sub_assessments.get(&id).cloned())
    }

    async fn list_sub_assessments(&mut self, assessment_id: AssessmentId) -> StoreResult<Vec<SubAssessment>> {
        Ok(Tables::sorted(
            self.working
                .sub_assessments
                .values()
                .filter(|s| s.assessment_id == assessment_id)
                .cloned(),
            |s| (s.created_at, s.id),
        ))
    }

    async fn update_sub_assessment(
        &mut self,
        sub_assessment: &SubAssessment,
        expected_state: LifecycleState,
        expected_review: ReviewStatus,
    ) -> StoreResult<u64> {
        match self.working.sub_assessments.get_mut(&sub_assessment.id) {
            Some(row) if row.state() == expected_state && row.review_status == expected_review => {
                row.lifecycle = sub_assessment.lifecycle;
                row.review_status = sub_assessment.review_status;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn sub_assessment_completion(&mut self, id: SubAssessmentId) -> StoreResult<Completion> {
        let questions: Vec<AssessmentQuestionId> = self
            .working
            .questions
            .values()
            .filter(|q| q.sub_assessment_id == id)
            .map(|q| q.id)
            .collect();
        let answered = questions
            .iter()
            .filter(|q| {
                self.working
                    .answers
                    .values()
                    .any(|a| a.assessment_question_id == **q && !a.is_deleted())
            })
            .count();
        Ok(Completion {
            total_questions: questions.len() as u64,
            answered_questions: answered as u64,
        })
    }

    async fn get_question(&mut self, id: AssessmentQuestionId) -> StoreResult<Option<AssessmentQuestion>> {
        Ok(self.working.questions.get(&id).cloned())
    }

    async fn list_questions(&mut self, sub_assessment_id: SubAssessmentId) -> StoreResult<Vec<QuestionDetail>> {
        let questions = Tables::sorted(
            self.working
                .questions
                .values()
                .filter(|q| q.sub_assessment_id == sub_assessment_id)
                .cloned(),
            |q| (q.created_at, q.id),
        );

        let mut details = Vec::with_capacity(questions.len());
        for question in questions {
            let master = self
                .working
                .master_questions
                .get(&question.master_question_id)
                .ok_or_else(|| StoreError::Decode {
                    operation: "list_questions",
                    message: format!("master question {} is missing", question.master_question_id),
                })?;
            let answer = self
                .working
                .answers
                .values()
                .find(|a| a.assessment_question_id == question.id && !a.is_deleted())
                .cloned();
            details.push(QuestionDetail {
                text: master.text.clone(),
                control_numbers: master.control_numbers.clone(),
                frameworks: master.frameworks.clone(),
                risk_rating: master.risk_rating,
                answer,
                question,
            });
        }
        Ok(details)
    }

    async fn live_answer_for_question(&mut self, question_id: AssessmentQuestionId) -> StoreResult<Option<Answer>> {
        Ok(self
            .working
            .answers
            .values()
            .find(|a| a.assessment_question_id == question_id && !a.is_deleted())
            .cloned())
    }

    async fn get_answer(&mut self, id: AnswerId) -> StoreResult<Option<Answer>> {
        Ok(self.working.live_answer(id).cloned())
    }

    async fn insert_answer(&mut self, answer: &Answer) -> StoreResult<()> {
        if !self.working.questions.contains_key(&answer.assessment_question_id) {
            return Err(missing_parent("insert_answer", "question", answer.assessment_question_id));
        }
        let live_exists = self
            .working
            .answers
            .values()
            .any(|a| a.assessment_question_id == answer.assessment_question_id && !a.is_deleted());
        if live_exists {
            return Err(duplicate("insert_answer", answer.assessment_question_id));
        }
        self.working.answers.insert(answer.id, answer.clone());
        Ok(())
    }

    async fn update_answer(&mut self, answer: &Answer) -> StoreResult<u64> {
        match self.working.answers.get_mut(&answer.id) {
            Some(row) if !row.is_deleted() => {
                *row = answer.clone();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn list_evidence(&mut self, answer_id: AnswerId) -> StoreResult<Vec<EvidenceFile>> {
        Ok(Tables::sorted(
            self.working
                .evidence
                .values()
                .filter(|f| f.answer_id == answer_id)
                .cloned(),
            |f| (f.created_at, f.id),
        ))
    }

    async fn get_evidence(&mut self, id: EvidenceFileId) -> StoreResult<Option<EvidenceFile>> {
        Ok(self.working.evidence.get(&id).cloned())
    }

    async fn insert_evidence(&mut self, file: &EvidenceFile) -> StoreResult<()> {
        if !self.working.answers.contains_key(&file.answer_id) {
            return Err(missing_parent("insert_evidence", "answer", file.answer_id));
        }
        self.working.evidence.insert(file.id, file.clone());
        Ok(())
    }

    async fn delete_evidence(&mut self, id: EvidenceFileId) -> StoreResult<u64> {
        Ok(self.working.evidence.remove(&id).map_or(0, |_| 1))
    }

    async fn delete_evidence_for_answer(&mut self, answer_id: AnswerId) -> StoreResult<u64> {
        let before = self.working.evidence.len();
        self.working.evidence.retain(|_, f| f.answer_id != answer_id);
        Ok((before - self.working.evidence.len()) as u64)
    }

    async fn insert_comment(&mut self, comment: &Comment) -> StoreResult<()> {
        if !self.working.questions.contains_key(&comment.assessment_question_id) {
            return Err(missing_parent("insert_comment", "question", comment.assessment_question_id));
        }
        self.working.comments.insert(comment.id, comment.clone());
        Ok(())
    }

    async fn get_comment(&mut self, id: CommentId) -> StoreResult<Option<Comment>> {
        Ok(self
            .working
            .comments
            .get(&id)
            .filter(|c| c.deleted_at.is_none())
            .cloned())
    }

    async fn update_comment(&mut self, comment: &Comment) -> StoreResult<u64> {
        match self.working.comments.get_mut(&comment.id) {
            Some(row) if row.deleted_at.is_none() => {
                *row = comment.clone();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn list_comments(&mut self, question_id: AssessmentQuestionId) -> StoreResult<Vec<Comment>> {
        Ok(Tables::sorted(
            self.working
                .comments
                .values()
                .filter(|c| c.assessment_question_id == question_id && c.deleted_at.is_none())
                .cloned(),
            |c| (c.created_at, c.id),
        ))
    }

    async fn statistics_input(&mut self, scope: StatsScope) -> StoreResult<StatisticsInput> {
        let tables = &self.working;
        let in_scope = |assessment: &Assessment| match scope {
            StatsScope::Assessment(id) => assessment.id == id,
            StatsScope::Company(company_id) => tables
                .department_path(assessment.department_id)
                .is_some_and(|(company, _)| company == company_id),
        };

        let subs: HashMap<SubAssessmentId, SubDepartmentId> = tables
            .sub_assessments
            .values()
            .filter(|s| tables.assessments.get(&s.assessment_id).is_some_and(in_scope))
            .map(|s| (s.id, s.sub_department_id))
            .collect();

        let mut input = StatisticsInput::default();
        for sub_department in subs.values() {
            input.question_counts.entry(*sub_department).or_insert(0);
        }

        let mut questions: Vec<&AssessmentQuestion> = tables
            .questions
            .values()
            .filter(|q| subs.contains_key(&q.sub_assessment_id))
            .collect();
        questions.sort_by_key(|q| (q.created_at, q.id));

        for question in questions {
            let sub_department_id = subs[&question.sub_assessment_id];
            *input.question_counts.entry(sub_department_id).or_insert(0) += 1;

            let Some(answer) = tables
                .answers
                .values()
                .find(|a| a.assessment_question_id == question.id && !a.is_deleted())
            else {
                continue;
            };
            let master = tables.master_questions.get(&question.master_question_id);
            input.answers.push(AnswerFact {
                sub_department_id,
                answer_text: answer.answer_text,
                control_numbers: master.map(|m| m.control_numbers.clone()).unwrap_or_default(),
                risk_rating: master.and_then(|m| m.risk_rating),
            });
        }

        Ok(input)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
