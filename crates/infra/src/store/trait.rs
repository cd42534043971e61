use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use assurance_assessments::{
    Answer, Assessment, AssessmentBlueprint, AssessmentQuestion, Comment, Company, Completion,
    ContainerKind, ControlNumber, Department, EvidenceFile, LifecycleState, MasterQuestion,
    ReviewStatus, RiskRating, StatisticsInput, SubAssessment, SubDepartment,
};
use assurance_auth::{ResourceType, Scope, UserAccount};
use assurance_core::{
    AnswerId, AssessmentId, AssessmentQuestionId, CommentId, CompanyId, DepartmentId, DomainError,
    DomainResult, EvidenceFileId, MasterDepartmentId, SubAssessmentId, SubDepartmentId, UserId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Persistence failure.
///
/// These are infrastructure errors. Domain outcomes (missing rows, failed
/// conditional updates) are reported through return values, never through
/// this type.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error in {operation}: {message}")]
    Database { operation: &'static str, message: String },

    #[error("unique constraint violated in {operation}: {message}")]
    UniqueViolation { operation: &'static str, message: String },

    #[error("failed to decode row in {operation}: {message}")]
    Decode { operation: &'static str, message: String },
}

impl StoreError {
    pub fn operation(&self) -> &'static str {
        match self {
            StoreError::Database { operation, .. }
            | StoreError::UniqueViolation { operation, .. }
            | StoreError::Decode { operation, .. } => operation,
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { operation, .. } => {
                tracing::warn!(operation, error = %err, "concurrent write rejected by the store");
                DomainError::conflict("the resource was modified concurrently, retry the request")
            }
            other => {
                tracing::error!(operation = other.operation(), error = %other, "store operation failed");
                DomainError::internal()
            }
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Ownership projection
// ─────────────────────────────────────────────────────────────────────────────

/// Instance a request targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ResourceRef {
    Company(CompanyId),
    Department(DepartmentId),
    SubDepartment(SubDepartmentId),
    Assessment(AssessmentId),
    SubAssessment(SubAssessmentId),
    AssessmentQuestion(AssessmentQuestionId),
    Answer(AnswerId),
    Comment(CommentId),
    EvidenceFile(EvidenceFileId),
    User(UserId),
}

impl ResourceRef {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            ResourceRef::Company(_) => ResourceType::Company,
            ResourceRef::Department(_) => ResourceType::Department,
            ResourceRef::SubDepartment(_) => ResourceType::SubDepartment,
            ResourceRef::Assessment(_) => ResourceType::Assessment,
            ResourceRef::SubAssessment(_) => ResourceType::SubAssessment,
            ResourceRef::AssessmentQuestion(_) => ResourceType::AssessmentQuestion,
            ResourceRef::Answer(_) => ResourceType::Answer,
            ResourceRef::Comment(_) => ResourceType::Comment,
            ResourceRef::EvidenceFile(_) => ResourceType::EvidenceFile,
            ResourceRef::User(_) => ResourceType::User,
        }
    }

    /// Build a reference from a resource type and a textual id.
    pub fn parse(resource_type: ResourceType, id: &str) -> DomainResult<Self> {
        Ok(match resource_type {
            ResourceType::Company => ResourceRef::Company(id.parse()?),
            ResourceType::Department => ResourceRef::Department(id.parse()?),
            ResourceType::SubDepartment => ResourceRef::SubDepartment(id.parse()?),
            ResourceType::Assessment => ResourceRef::Assessment(id.parse()?),
            ResourceType::SubAssessment => ResourceRef::SubAssessment(id.parse()?),
            ResourceType::AssessmentQuestion => ResourceRef::AssessmentQuestion(id.parse()?),
            ResourceType::Answer => ResourceRef::Answer(id.parse()?),
            ResourceType::Comment => ResourceRef::Comment(id.parse()?),
            ResourceType::EvidenceFile => ResourceRef::EvidenceFile(id.parse()?),
            ResourceType::User => ResourceRef::User(id.parse()?),
            ResourceType::Statistics => {
                return Err(DomainError::bad_request(
                    "statistics are addressed through an assessment or company",
                ));
            }
        })
    }
}

/// Lifecycle of the container that owns a piece of content.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerState {
    pub kind: ContainerKind,
    pub state: LifecycleState,
    pub deadline: Option<DateTime<Utc>>,
}

/// Everything an access check needs to know about one instance, loaded by a
/// single query per resource type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ownership {
    /// `None` only for super-admin user targets.
    pub company_id: Option<CompanyId>,
    pub department_id: Option<DepartmentId>,
    pub sub_department_id: Option<SubDepartmentId>,
    pub container: Option<ContainerState>,
    /// Creator of an answer or comment.
    pub author: Option<UserId>,
    /// Department memberships of a user target.
    pub member_departments: BTreeSet<DepartmentId>,
}

impl Ownership {
    pub fn scope(&self) -> Option<Scope> {
        let company_id = self.company_id?;
        Some(Scope {
            company_id,
            department_id: self.department_id,
            sub_department_id: self.sub_department_id,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Read views
// ─────────────────────────────────────────────────────────────────────────────

/// A question of a sub-assessment joined with its bank text and live answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: AssessmentQuestion,
    pub text: String,
    pub control_numbers: Vec<ControlNumber>,
    pub frameworks: Vec<String>,
    pub risk_rating: Option<RiskRating>,
    pub answer: Option<Answer>,
}

/// Which assessments feed a statistics computation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StatsScope {
    Assessment(AssessmentId),
    Company(CompanyId),
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// Transactional store for the compliance hierarchy.
///
/// Every operation of the service layer runs inside exactly one transaction
/// obtained from [`ComplianceStore::begin`]. Dropping a [`StoreTx`] without
/// calling [`StoreTx::commit`] rolls every write back.
#[async_trait]
pub trait ComplianceStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

/// One open transaction.
///
/// Conditional updates return the number of affected rows; `0` means the
/// row was missing or no longer in the expected state.
#[async_trait]
pub trait StoreTx: Send {
    async fn ownership(&mut self, target: ResourceRef) -> StoreResult<Option<Ownership>>;

    // organisation
    async fn insert_company(&mut self, company: &Company) -> StoreResult<()>;
    async fn get_company(&mut self, id: CompanyId) -> StoreResult<Option<Company>>;
    async fn insert_department(&mut self, department: &Department) -> StoreResult<()>;
    async fn get_department(&mut self, id: DepartmentId) -> StoreResult<Option<Department>>;
    async fn insert_sub_department(&mut self, sub_department: &SubDepartment) -> StoreResult<()>;
    async fn list_sub_departments(&mut self, department_id: DepartmentId) -> StoreResult<Vec<SubDepartment>>;
    async fn get_sub_department(&mut self, id: SubDepartmentId) -> StoreResult<Option<SubDepartment>>;
    async fn insert_user(&mut self, user: &UserAccount) -> StoreResult<()>;
    async fn get_user(&mut self, id: UserId) -> StoreResult<Option<UserAccount>>;
    async fn user_email_exists(&mut self, email: &str) -> StoreResult<bool>;

    // question bank
    async fn insert_master_question(&mut self, question: &MasterQuestion) -> StoreResult<()>;
    async fn master_questions_for(&mut self, master_department_id: MasterDepartmentId) -> StoreResult<Vec<MasterQuestion>>;

    // assessments
    async fn insert_blueprint(&mut self, blueprint: &AssessmentBlueprint) -> StoreResult<()>;
    async fn get_assessment(&mut self, id: AssessmentId) -> StoreResult<Option<Assessment>>;
    async fn list_assessments(&mut self, department_id: DepartmentId) -> StoreResult<Vec<Assessment>>;
    async fn update_assessment_lifecycle(&mut self, assessment: &Assessment, expected: LifecycleState) -> StoreResult<u64>;
    async fn get_sub_assessment(&mut self, id: SubAssessmentId) -> StoreResult<Option<SubAssessment>>;
    async fn list_sub_assessments(&mut self, assessment_id: AssessmentId) -> StoreResult<Vec<SubAssessment>>;
    async fn update_sub_assessment(
        &mut self,
        sub_assessment: &SubAssessment,
        expected_state: LifecycleState,
        expected_review: ReviewStatus,
    ) -> StoreResult<u64>;
    async fn sub_assessment_completion(&mut self, id: SubAssessmentId) -> StoreResult<Completion>;

    // questions
    async fn get_question(&mut self, id: AssessmentQuestionId) -> StoreResult<Option<AssessmentQuestion>>;
    async fn list_questions(&mut self, sub_assessment_id: SubAssessmentId) -> StoreResult<Vec<QuestionDetail>>;

    // answers (reads skip soft-deleted rows)
    async fn live_answer_for_question(&mut self, question_id: AssessmentQuestionId) -> StoreResult<Option<Answer>>;
    async fn get_answer(&mut self, id: AnswerId) -> StoreResult<Option<Answer>>;
    async fn insert_answer(&mut self, answer: &Answer) -> StoreResult<()>;
    async fn update_answer(&mut self, answer: &Answer) -> StoreResult<u64>;

    // evidence (ordered by creation)
    async fn list_evidence(&mut self, answer_id: AnswerId) -> StoreResult<Vec<EvidenceFile>>;
    async fn get_evidence(&mut self, id: EvidenceFileId) -> StoreResult<Option<EvidenceFile>>;
    async fn insert_evidence(&mut self, file: &EvidenceFile) -> StoreResult<()>;
    async fn delete_evidence(&mut self, id: EvidenceFileId) -> StoreResult<u64>;
    async fn delete_evidence_for_answer(&mut self, answer_id: AnswerId) -> StoreResult<u64>;

    // comments (reads skip soft-deleted rows)
    async fn insert_comment(&mut self, comment: &Comment) -> StoreResult<()>;
    async fn get_comment(&mut self, id: CommentId) -> StoreResult<Option<Comment>>;
    async fn update_comment(&mut self, comment: &Comment) -> StoreResult<u64>;
    async fn list_comments(&mut self, question_id: AssessmentQuestionId) -> StoreResult<Vec<Comment>>;

    // statistics
    async fn statistics_input(&mut self, scope: StatsScope) -> StoreResult<StatisticsInput>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
