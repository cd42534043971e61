//! Postgres-backed compliance store.
//!
//! ## Error Mapping
//!
//! | SQLx error | Postgres code | `StoreError` |
//! |------------|---------------|--------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` |
//! | Database (other) | any | `Database` |
//! | Column decode / enum text | n/a | `Decode` |
//! | PoolClosed, Io, Tls, ... | n/a | `Database` |
//!
//! Every [`StoreTx`] wraps one `sqlx::Transaction`; dropping it without a
//! commit rolls back.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use assurance_assessments::{
    Answer, AnswerFact, AnswerReviewStatus, AnswerText, Assessment, AssessmentBlueprint,
    AssessmentQuestion, Comment, Company, Completion, ContainerKind, ControlNumber, Department,
    EvidenceFile, Lifecycle, LifecycleState, MasterQuestion, ReviewStatus, RevisionStatus,
    RiskRating, StatisticsInput, SubAssessment, SubDepartment,
};
use assurance_auth::{Role, UserAccount};
use assurance_core::{
    AnswerId, AssessmentId, AssessmentQuestionId, CommentId, CompanyId, DepartmentId, DomainError,
    EvidenceFileId, MasterDepartmentId, SubAssessmentId, SubDepartmentId, UserId,
};

use super::r#trait::{
    ComplianceStore, ContainerState, Ownership, QuestionDetail, ResourceRef, StatsScope,
    StoreError, StoreResult, StoreTx,
};

const SCHEMA: &str = include_str!("../../migrations/0001_schema.sql");

/// Create the tables if they do not exist yet.
#[instrument(skip(pool), err)]
pub async fn ensure_schema(pool: &PgPool) -> StoreResult<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PostgresComplianceStore {
    pool: Arc<PgPool>,
}

impl PostgresComplianceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl ComplianceStore for PostgresComplianceStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresTx { tx }))
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn col<'r, T>(row: &'r PgRow, name: &str, operation: &'static str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(|e| StoreError::Decode {
        operation,
        message: format!("column {name}: {e}"),
    })
}

fn parsed<T>(value: Result<T, DomainError>, operation: &'static str) -> StoreResult<T> {
    value.map_err(|e| StoreError::Decode {
        operation,
        message: e.message().to_string(),
    })
}

fn company_from_row(row: &PgRow, op: &'static str) -> StoreResult<Company> {
    Ok(Company {
        id: CompanyId::from_uuid(col(row, "id", op)?),
        name: col(row, "name", op)?,
        contact_email: col(row, "contact_email", op)?,
        contact_phone: col(row, "contact_phone", op)?,
        created_at: col(row, "created_at", op)?,
    })
}

fn department_from_row(row: &PgRow, op: &'static str) -> StoreResult<Department> {
    let master: Option<Uuid> = col(row, "master_department_id", op)?;
    Ok(Department {
        id: DepartmentId::from_uuid(col(row, "id", op)?),
        name: col(row, "name", op)?,
        company_id: CompanyId::from_uuid(col(row, "company_id", op)?),
        master_department_id: master.map(MasterDepartmentId::from_uuid),
        created_at: col(row, "created_at", op)?,
    })
}

fn sub_department_from_row(row: &PgRow, op: &'static str) -> StoreResult<SubDepartment> {
    Ok(SubDepartment {
        id: SubDepartmentId::from_uuid(col(row, "id", op)?),
        name: col(row, "name", op)?,
        department_id: DepartmentId::from_uuid(col(row, "department_id", op)?),
        created_at: col(row, "created_at", op)?,
    })
}

fn user_from_row(row: &PgRow, op: &'static str) -> StoreResult<UserAccount> {
    let role: String = col(row, "role", op)?;
    let company: Option<Uuid> = col(row, "company_id", op)?;
    let departments: Vec<Uuid> = col(row, "department_ids", op)?;
    let sub_departments: Vec<Uuid> = col(row, "sub_department_ids", op)?;
    Ok(UserAccount {
        id: UserId::from_uuid(col(row, "id", op)?),
        email: col(row, "email", op)?,
        name: col(row, "name", op)?,
        role: parsed(role.parse::<Role>(), op)?,
        company_id: company.map(CompanyId::from_uuid),
        department_ids: departments.into_iter().map(DepartmentId::from_uuid).collect(),
        sub_department_ids: sub_departments.into_iter().map(SubDepartmentId::from_uuid).collect(),
        created_at: col(row, "created_at", op)?,
    })
}

fn master_question_from_row(row: &PgRow, op: &'static str) -> StoreResult<MasterQuestion> {
    let controls: Vec<String> = col(row, "control_numbers", op)?;
    let rating: Option<String> = col(row, "risk_rating", op)?;
    Ok(MasterQuestion {
        id: col::<Uuid>(row, "id", op)?.into(),
        master_department_id: MasterDepartmentId::from_uuid(col(row, "master_department_id", op)?),
        text: col(row, "text", op)?,
        control_numbers: controls
            .into_iter()
            .map(|c| parsed(ControlNumber::new(c), op))
            .collect::<StoreResult<_>>()?,
        frameworks: col(row, "frameworks", op)?,
        risk_rating: rating.map(|r| parsed(RiskRating::parse(&r), op)).transpose()?,
    })
}

fn lifecycle_from_row(row: &PgRow, started_column: &str, op: &'static str) -> StoreResult<Lifecycle> {
    Ok(Lifecycle {
        started: col(row, started_column, op)?,
        submitted: col(row, "submitted", op)?,
        started_at: col(row, "started_at", op)?,
        submitted_at: col(row, "submitted_at", op)?,
    })
}

fn assessment_from_row(row: &PgRow, op: &'static str) -> StoreResult<Assessment> {
    Ok(Assessment {
        id: AssessmentId::from_uuid(col(row, "id", op)?),
        department_id: DepartmentId::from_uuid(col(row, "department_id", op)?),
        lifecycle: lifecycle_from_row(row, "assessment_started", op)?,
        deadline: col(row, "deadline", op)?,
        created_at: col(row, "created_at", op)?,
    })
}

fn sub_assessment_from_row(row: &PgRow, op: &'static str) -> StoreResult<SubAssessment> {
    let review: String = col(row, "review_status", op)?;
    Ok(SubAssessment {
        id: SubAssessmentId::from_uuid(col(row, "id", op)?),
        assessment_id: AssessmentId::from_uuid(col(row, "assessment_id", op)?),
        sub_department_id: SubDepartmentId::from_uuid(col(row, "sub_department_id", op)?),
        lifecycle: lifecycle_from_row(row, "sub_assessment_started", op)?,
        review_status: parsed(ReviewStatus::parse(&review), op)?,
        deadline: col(row, "deadline", op)?,
        created_at: col(row, "created_at", op)?,
    })
}

fn question_from_row(row: &PgRow, op: &'static str) -> StoreResult<AssessmentQuestion> {
    Ok(AssessmentQuestion {
        id: AssessmentQuestionId::from_uuid(col(row, "id", op)?),
        assessment_id: AssessmentId::from_uuid(col(row, "assessment_id", op)?),
        sub_assessment_id: SubAssessmentId::from_uuid(col(row, "sub_assessment_id", op)?),
        master_question_id: col::<Uuid>(row, "master_question_id", op)?.into(),
        created_at: col(row, "created_at", op)?,
    })
}

fn answer_from_row(row: &PgRow, op: &'static str) -> StoreResult<Answer> {
    let text: String = col(row, "answer_text", op)?;
    let review: String = col(row, "review_status", op)?;
    let revision: String = col(row, "revision_status", op)?;
    let reviewed_by: Option<Uuid> = col(row, "reviewed_by", op)?;
    Ok(Answer {
        id: AnswerId::from_uuid(col(row, "id", op)?),
        assessment_question_id: AssessmentQuestionId::from_uuid(col(row, "assessment_question_id", op)?),
        created_by: UserId::from_uuid(col(row, "created_by", op)?),
        answer_text: parsed(AnswerText::parse(&text), op)?,
        review_status: parsed(AnswerReviewStatus::parse(&review), op)?,
        revision_status: parsed(RevisionStatus::parse(&revision), op)?,
        final_review: col(row, "final_review", op)?,
        reviewer_comment: col(row, "reviewer_comment", op)?,
        reviewed_by: reviewed_by.map(UserId::from_uuid),
        created_at: col(row, "created_at", op)?,
        updated_at: col(row, "updated_at", op)?,
        deleted_at: col(row, "deleted_at", op)?,
    })
}

fn evidence_from_row(row: &PgRow, op: &'static str) -> StoreResult<EvidenceFile> {
    let size: i64 = col(row, "size_bytes", op)?;
    Ok(EvidenceFile {
        id: EvidenceFileId::from_uuid(col(row, "id", op)?),
        answer_id: AnswerId::from_uuid(col(row, "answer_id", op)?),
        file_path: col(row, "file_path", op)?,
        original_name: col(row, "original_name", op)?,
        content_type: col(row, "content_type", op)?,
        size_bytes: size.max(0) as u64,
        checksum_sha256: col(row, "checksum_sha256", op)?,
        bytes: col(row, "bytes", op)?,
        created_by: UserId::from_uuid(col(row, "created_by", op)?),
        created_at: col(row, "created_at", op)?,
    })
}

fn comment_from_row(row: &PgRow, op: &'static str) -> StoreResult<Comment> {
    Ok(Comment {
        id: CommentId::from_uuid(col(row, "id", op)?),
        assessment_question_id: AssessmentQuestionId::from_uuid(col(row, "assessment_question_id", op)?),
        created_by: UserId::from_uuid(col(row, "created_by", op)?),
        comment_text: col(row, "comment_text", op)?,
        created_at: col(row, "created_at", op)?,
        updated_at: col(row, "updated_at", op)?,
        deleted_at: col(row, "deleted_at", op)?,
    })
}

/// Ownership columns shared by every content-level projection query:
/// `company_id, department_id, sub_department_id, started, submitted,
/// deadline, author`.
fn content_ownership_from_row(row: &PgRow, kind: ContainerKind, op: &'static str) -> StoreResult<Ownership> {
    let sub: Option<Uuid> = col(row, "sub_department_id", op)?;
    let author: Option<Uuid> = col(row, "author", op)?;
    let started: bool = col(row, "started", op)?;
    let submitted: bool = col(row, "submitted", op)?;
    let deadline: Option<DateTime<Utc>> = col(row, "deadline", op)?;
    Ok(Ownership {
        company_id: Some(CompanyId::from_uuid(col(row, "company_id", op)?)),
        department_id: Some(DepartmentId::from_uuid(col(row, "department_id", op)?)),
        sub_department_id: sub.map(SubDepartmentId::from_uuid),
        container: Some(ContainerState {
            kind,
            state: LifecycleState::from_flags(started, submitted),
            deadline,
        }),
        author: author.map(UserId::from_uuid),
        ..Ownership::default()
    })
}

// Joins from `q` (assessment_questions) up to the department.
const QUESTION_CHAIN: &str = r#"
    JOIN sub_assessments sa ON sa.id = q.sub_assessment_id
    JOIN sub_departments sd ON sd.id = sa.sub_department_id
    JOIN departments d ON d.id = sd.department_id
"#;

const CONTENT_COLUMNS: &str = r#"
    d.company_id, d.id AS department_id, sd.id AS sub_department_id,
    sa.sub_assessment_started AS started, sa.submitted, sa.deadline
"#;

const USER_COLUMNS: &str = r#"
    u.id, u.email, u.name, u.role, u.company_id, u.created_at,
    ARRAY(SELECT ud.department_id FROM user_departments ud WHERE ud.user_id = u.id) AS department_ids,
    ARRAY(SELECT us.sub_department_id FROM user_sub_departments us WHERE us.user_id = u.id) AS sub_department_ids
"#;

const ANSWER_COLUMNS: &str = r#"
    id, assessment_question_id, created_by, answer_text, review_status, revision_status,
    final_review, reviewer_comment, reviewed_by, created_at, updated_at, deleted_at
"#;

const EVIDENCE_COLUMNS: &str = r#"
    id, answer_id, file_path, original_name, content_type, size_bytes, checksum_sha256,
    bytes, created_by, created_at
"#;

const SUB_ASSESSMENT_COLUMNS: &str = r#"
    id, assessment_id, sub_department_id, sub_assessment_started, submitted, started_at,
    submitted_at, review_status, deadline, created_at
"#;

const ASSESSMENT_COLUMNS: &str = r#"
    id, department_id, assessment_started, submitted, started_at, submitted_at, deadline, created_at
"#;

fn stats_filter(scope: StatsScope) -> (Option<Uuid>, Option<Uuid>) {
    match scope {
        StatsScope::Assessment(id) => (Some(*id.as_uuid()), None),
        StatsScope::Company(id) => (None, Some(*id.as_uuid())),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transaction
// ─────────────────────────────────────────────────────────────────────────────

impl PostgresTx {
    async fn fetch_optional(&mut self, op: &'static str, sql: &str, id: Uuid) -> StoreResult<Option<PgRow>> {
        sqlx::query(sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))
    }

    async fn fetch_all(&mut self, op: &'static str, sql: &str, id: Uuid) -> StoreResult<Vec<PgRow>> {
        sqlx::query(sql)
            .bind(id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))
    }

    async fn content_ownership(
        &mut self,
        from_clause: &str,
        author_column: &str,
        id: Uuid,
    ) -> StoreResult<Option<Ownership>> {
        let op = "ownership";
        // `{chain}` in the FROM clause marks where the question-to-department joins go.
        let from_clause = from_clause.replace("{chain}", QUESTION_CHAIN);
        let sql = format!("SELECT {CONTENT_COLUMNS}, {author_column} AS author {from_clause}");
        let row = self.fetch_optional(op, &sql, id).await?;
        row.map(|r| content_ownership_from_row(&r, ContainerKind::SubAssessment, op))
            .transpose()
    }
}

#[async_trait]
impl StoreTx for PostgresTx {
    #[instrument(skip(self), fields(target = ?target), err)]
    async fn ownership(&mut self, target: ResourceRef) -> StoreResult<Option<Ownership>> {
        let op = "ownership";
        match target {
            ResourceRef::Company(id) => {
                let row = self
                    .fetch_optional(op, "SELECT id FROM companies WHERE id = $1", *id.as_uuid())
                    .await?;
                Ok(row.map(|_| Ownership {
                    company_id: Some(id),
                    ..Ownership::default()
                }))
            }
            ResourceRef::Department(id) => {
                let row = self
                    .fetch_optional(op, "SELECT company_id FROM departments WHERE id = $1", *id.as_uuid())
                    .await?;
                row.map(|r| {
                    Ok(Ownership {
                        company_id: Some(CompanyId::from_uuid(col(&r, "company_id", op)?)),
                        department_id: Some(id),
                        ..Ownership::default()
                    })
                })
                .transpose()
            }
            ResourceRef::SubDepartment(id) => {
                let row = self
                    .fetch_optional(
                        op,
                        r#"
                        SELECT d.company_id, d.id AS department_id
                        FROM sub_departments sd
                        JOIN departments d ON d.id = sd.department_id
                        WHERE sd.id = $1
                        "#,
                        *id.as_uuid(),
                    )
                    .await?;
                row.map(|r| {
                    Ok(Ownership {
                        company_id: Some(CompanyId::from_uuid(col(&r, "company_id", op)?)),
                        department_id: Some(DepartmentId::from_uuid(col(&r, "department_id", op)?)),
                        sub_department_id: Some(id),
                        ..Ownership::default()
                    })
                })
                .transpose()
            }
            ResourceRef::Assessment(id) => {
                let row = self
                    .fetch_optional(
                        op,
                        r#"
                        SELECT d.company_id, d.id AS department_id, NULL::uuid AS sub_department_id,
                               a.assessment_started AS started, a.submitted, a.deadline,
                               NULL::uuid AS author
                        FROM assessments a
                        JOIN departments d ON d.id = a.department_id
                        WHERE a.id = $1
                        "#,
                        *id.as_uuid(),
                    )
                    .await?;
                row.map(|r| content_ownership_from_row(&r, ContainerKind::Assessment, op))
                    .transpose()
            }
            ResourceRef::SubAssessment(id) => {
                let sql = format!(
                    "SELECT {CONTENT_COLUMNS}, NULL::uuid AS author
                     FROM sub_assessments sa
                     JOIN sub_departments sd ON sd.id = sa.sub_department_id
                     JOIN departments d ON d.id = sd.department_id
                     WHERE sa.id = $1"
                );
                let row = self.fetch_optional(op, &sql, *id.as_uuid()).await?;
                row.map(|r| content_ownership_from_row(&r, ContainerKind::SubAssessment, op))
                    .transpose()
            }
            ResourceRef::AssessmentQuestion(id) => {
                self.content_ownership(
                    "FROM assessment_questions q {chain} WHERE q.id = $1",
                    "NULL::uuid",
                    *id.as_uuid(),
                )
                .await
            }
            ResourceRef::Answer(id) => {
                self.content_ownership(
                    "FROM answers an
                     JOIN assessment_questions q ON q.id = an.assessment_question_id
                     {chain}
                     WHERE an.id = $1 AND an.deleted_at IS NULL",
                    "an.created_by",
                    *id.as_uuid(),
                )
                .await
            }
            ResourceRef::Comment(id) => {
                self.content_ownership(
                    "FROM comments c
                     JOIN assessment_questions q ON q.id = c.assessment_question_id
                     {chain}
                     WHERE c.id = $1 AND c.deleted_at IS NULL",
                    "c.created_by",
                    *id.as_uuid(),
                )
                .await
            }
            ResourceRef::EvidenceFile(id) => {
                self.content_ownership(
                    "FROM evidence_files ef
                     JOIN answers an ON an.id = ef.answer_id AND an.deleted_at IS NULL
                     JOIN assessment_questions q ON q.id = an.assessment_question_id
                     {chain}
                     WHERE ef.id = $1",
                    "ef.created_by",
                    *id.as_uuid(),
                )
                .await
            }
            ResourceRef::User(id) => {
                let row = self
                    .fetch_optional(
                        op,
                        r#"
                        SELECT u.company_id,
                               ARRAY(SELECT ud.department_id FROM user_departments ud WHERE ud.user_id = u.id)
                                   AS department_ids
                        FROM users u
                        WHERE u.id = $1
                        "#,
                        *id.as_uuid(),
                    )
                    .await?;
                row.map(|r| {
                    let company: Option<Uuid> = col(&r, "company_id", op)?;
                    let departments: Vec<Uuid> = col(&r, "department_ids", op)?;
                    Ok(Ownership {
                        company_id: company.map(CompanyId::from_uuid),
                        author: Some(id),
                        member_departments: departments.into_iter().map(DepartmentId::from_uuid).collect(),
                        ..Ownership::default()
                    })
                })
                .transpose()
            }
        }
    }

    async fn insert_company(&mut self, company: &Company) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO companies (id, name, contact_email, contact_phone, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(company.id.as_uuid())
        .bind(&company.name)
        .bind(&company.contact_email)
        .bind(&company.contact_phone)
        .bind(company.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_company", e))?;
        Ok(())
    }

    async fn get_company(&mut self, id: CompanyId) -> StoreResult<Option<Company>> {
        let op = "get_company";
        let row = self
            .fetch_optional(
                op,
                "SELECT id, name, contact_email, contact_phone, created_at FROM companies WHERE id = $1",
                *id.as_uuid(),
            )
            .await?;
        row.map(|r| company_from_row(&r, op)).transpose()
    }

    async fn insert_department(&mut self, department: &Department) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO departments (id, name, company_id, master_department_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(department.id.as_uuid())
        .bind(&department.name)
        .bind(department.company_id.as_uuid())
        .bind(department.master_department_id.map(|m| *m.as_uuid()))
        .bind(department.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_department", e))?;
        Ok(())
    }

    async fn get_department(&mut self, id: DepartmentId) -> StoreResult<Option<Department>> {
        let op = "get_department";
        let row = self
            .fetch_optional(
                op,
                "SELECT id, name, company_id, master_department_id, created_at FROM departments WHERE id = $1",
                *id.as_uuid(),
            )
            .await?;
        row.map(|r| department_from_row(&r, op)).transpose()
    }

    async fn insert_sub_department(&mut self, sub_department: &SubDepartment) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO sub_departments (id, name, department_id, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(sub_department.id.as_uuid())
        .bind(&sub_department.name)
        .bind(sub_department.department_id.as_uuid())
        .bind(sub_department.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_sub_department", e))?;
        Ok(())
    }

    async fn list_sub_departments(&mut self, department_id: DepartmentId) -> StoreResult<Vec<SubDepartment>> {
        let op = "list_sub_departments";
        let rows = self
            .fetch_all(
                op,
                r#"
                SELECT id, name, department_id, created_at
                FROM sub_departments
                WHERE department_id = $1
                ORDER BY created_at, id
                "#,
                *department_id.as_uuid(),
            )
            .await?;
        rows.iter().map(|r| sub_department_from_row(r, op)).collect()
    }

    async fn get_sub_department(&mut self, id: SubDepartmentId) -> StoreResult<Option<SubDepartment>> {
        let op = "get_sub_department";
        let row = self
            .fetch_optional(
                op,
                "SELECT id, name, department_id, created_at FROM sub_departments WHERE id = $1",
                *id.as_uuid(),
            )
            .await?;
        row.map(|r| sub_department_from_row(&r, op)).transpose()
    }

    async fn insert_user(&mut self, user: &UserAccount) -> StoreResult<()> {
        let op = "insert_user";
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, role, company_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.company_id.map(|c| *c.as_uuid()))
        .bind(user.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let departments: Vec<Uuid> = user.department_ids.iter().map(|d| *d.as_uuid()).collect();
        sqlx::query(
            "INSERT INTO user_departments (user_id, department_id) SELECT $1, UNNEST($2::uuid[])",
        )
        .bind(user.id.as_uuid())
        .bind(&departments)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let sub_departments: Vec<Uuid> = user.sub_department_ids.iter().map(|s| *s.as_uuid()).collect();
        sqlx::query(
            "INSERT INTO user_sub_departments (user_id, sub_department_id) SELECT $1, UNNEST($2::uuid[])",
        )
        .bind(user.id.as_uuid())
        .bind(&sub_departments)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;
        Ok(())
    }

    async fn get_user(&mut self, id: UserId) -> StoreResult<Option<UserAccount>> {
        let op = "get_user";
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1");
        let row = self.fetch_optional(op, &sql, *id.as_uuid()).await?;
        row.map(|r| user_from_row(&r, op)).transpose()
    }

    async fn user_email_exists(&mut self, email: &str) -> StoreResult<bool> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1) AS taken")
            .bind(email)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("user_email_exists", e))?;
        col(&row, "taken", "user_email_exists")
    }

    async fn insert_master_question(&mut self, question: &MasterQuestion) -> StoreResult<()> {
        let controls: Vec<&str> = question.control_numbers.iter().map(|c| c.as_str()).collect();
        sqlx::query(
            r#"
            INSERT INTO master_questions
                (id, master_department_id, text, control_numbers, frameworks, risk_rating)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::from(question.id))
        .bind(question.master_department_id.as_uuid())
        .bind(&question.text)
        .bind(&controls)
        .bind(&question.frameworks)
        .bind(question.risk_rating.map(|r| r.as_str()))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_master_question", e))?;
        Ok(())
    }

    async fn master_questions_for(
        &mut self,
        master_department_id: MasterDepartmentId,
    ) -> StoreResult<Vec<MasterQuestion>> {
        let op = "master_questions_for";
        let rows = self
            .fetch_all(
                op,
                r#"
                SELECT id, master_department_id, text, control_numbers, frameworks, risk_rating
                FROM master_questions
                WHERE master_department_id = $1
                ORDER BY id
                "#,
                *master_department_id.as_uuid(),
            )
            .await?;
        rows.iter().map(|r| master_question_from_row(r, op)).collect()
    }

    #[instrument(skip(self, blueprint), fields(assessment_id = %blueprint.assessment.id), err)]
    async fn insert_blueprint(&mut self, blueprint: &AssessmentBlueprint) -> StoreResult<()> {
        let op = "insert_blueprint";
        let assessment = &blueprint.assessment;
        sqlx::query(
            r#"
            INSERT INTO assessments (id, department_id, deadline, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(assessment.id.as_uuid())
        .bind(assessment.department_id.as_uuid())
        .bind(assessment.deadline)
        .bind(assessment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let subs = &blueprint.sub_assessments;
        sqlx::query(
            r#"
            INSERT INTO sub_assessments (id, assessment_id, sub_department_id, review_status, deadline, created_at)
            SELECT id, $2, sub_department_id, $3, $4, $5
            FROM UNNEST($1::uuid[], $6::uuid[]) AS t(id, sub_department_id)
            "#,
        )
        .bind(subs.iter().map(|s| *s.id.as_uuid()).collect::<Vec<_>>())
        .bind(assessment.id.as_uuid())
        .bind(ReviewStatus::Draft.as_str())
        .bind(assessment.deadline)
        .bind(assessment.created_at)
        .bind(subs.iter().map(|s| *s.sub_department_id.as_uuid()).collect::<Vec<_>>())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let questions = &blueprint.questions;
        sqlx::query(
            r#"
            INSERT INTO assessment_questions (id, assessment_id, sub_assessment_id, master_question_id, created_at)
            SELECT id, $2, sub_assessment_id, master_question_id, $5
            FROM UNNEST($1::uuid[], $3::uuid[], $4::uuid[]) AS t(id, sub_assessment_id, master_question_id)
            "#,
        )
        .bind(questions.iter().map(|q| *q.id.as_uuid()).collect::<Vec<_>>())
        .bind(assessment.id.as_uuid())
        .bind(questions.iter().map(|q| *q.sub_assessment_id.as_uuid()).collect::<Vec<_>>())
        .bind(questions.iter().map(|q| Uuid::from(q.master_question_id)).collect::<Vec<_>>())
        .bind(assessment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;
        Ok(())
    }

    async fn get_assessment(&mut self, id: AssessmentId) -> StoreResult<Option<Assessment>> {
        let op = "get_assessment";
        let sql = format!("SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE id = $1");
        let row = self.fetch_optional(op, &sql, *id.as_uuid()).await?;
        row.map(|r| assessment_from_row(&r, op)).transpose()
    }

    async fn list_assessments(&mut self, department_id: DepartmentId) -> StoreResult<Vec<Assessment>> {
        let op = "list_assessments";
        let sql = format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE department_id = $1 ORDER BY created_at, id"
        );
        let rows = self.fetch_all(op, &sql, *department_id.as_uuid()).await?;
        rows.iter().map(|r| assessment_from_row(r, op)).collect()
    }

    async fn update_assessment_lifecycle(
        &mut self,
        assessment: &Assessment,
        expected: LifecycleState,
    ) -> StoreResult<u64> {
        let lc = &assessment.lifecycle;
        let result = sqlx::query(
            r#"
            UPDATE assessments
            SET assessment_started = $2, submitted = $3, started_at = $4, submitted_at = $5
            WHERE id = $1 AND assessment_started = $6 AND submitted = $7
            "#,
        )
        .bind(assessment.id.as_uuid())
        .bind(lc.started)
        .bind(lc.submitted)
        .bind(lc.started_at)
        .bind(lc.submitted_at)
        .bind(expected.is_started())
        .bind(expected.is_submitted())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_assessment_lifecycle", e))?;
        Ok(result.rows_affected())
    }

    async fn get_sub_assessment(&mut self, id: SubAssessmentId) -> StoreResult<Option<SubAssessment>> {
        let op = "get_sub_assessment";
        let sql = format!("SELECT {SUB_ASSESSMENT_COLUMNS} FROM sub_assessments WHERE id = $1");
        let row = self.fetch_optional(op, &sql, *id.as_uuid()).await?;
        row.map(|r| sub_assessment_from_row(&r, op)).transpose()
    }

    async fn list_sub_assessments(&mut self, assessment_id: AssessmentId) -> StoreResult<Vec<SubAssessment>> {
        let op = "list_sub_assessments";
        let sql = format!(
            "SELECT {SUB_ASSESSMENT_COLUMNS} FROM sub_assessments WHERE assessment_id = $1 ORDER BY created_at, id"
        );
        let rows = self.fetch_all(op, &sql, *assessment_id.as_uuid()).await?;
        rows.iter().map(|r| sub_assessment_from_row(r, op)).collect()
    }

    async fn update_sub_assessment(
        &mut self,
        sub_assessment: &SubAssessment,
        expected_state: LifecycleState,
        expected_review: ReviewStatus,
    ) -> StoreResult<u64> {
        let lc = &sub_assessment.lifecycle;
        let result = sqlx::query(
            r#"
            UPDATE sub_assessments
            SET sub_assessment_started = $2, submitted = $3, started_at = $4, submitted_at = $5,
                review_status = $6
            WHERE id = $1 AND sub_assessment_started = $7 AND submitted = $8 AND review_status = $9
            "#,
        )
        .bind(sub_assessment.id.as_uuid())
        .bind(lc.started)
        .bind(lc.submitted)
        .bind(lc.started_at)
        .bind(lc.submitted_at)
        .bind(sub_assessment.review_status.as_str())
        .bind(expected_state.is_started())
        .bind(expected_state.is_submitted())
        .bind(expected_review.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_sub_assessment", e))?;
        Ok(result.rows_affected())
    }

    async fn sub_assessment_completion(&mut self, id: SubAssessmentId) -> StoreResult<Completion> {
        let op = "sub_assessment_completion";
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total, COUNT(an.id) AS answered
            FROM assessment_questions q
            LEFT JOIN answers an ON an.assessment_question_id = q.id AND an.deleted_at IS NULL
            WHERE q.sub_assessment_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;
        let total: i64 = col(&row, "total", op)?;
        let answered: i64 = col(&row, "answered", op)?;
        Ok(Completion {
            total_questions: total.max(0) as u64,
            answered_questions: answered.max(0) as u64,
        })
    }

    async fn get_question(&mut self, id: AssessmentQuestionId) -> StoreResult<Option<AssessmentQuestion>> {
        let op = "get_question";
        let row = self
            .fetch_optional(
                op,
                r#"
                SELECT id, assessment_id, sub_assessment_id, master_question_id, created_at
                FROM assessment_questions WHERE id = $1
                "#,
                *id.as_uuid(),
            )
            .await?;
        row.map(|r| question_from_row(&r, op)).transpose()
    }

    async fn list_questions(&mut self, sub_assessment_id: SubAssessmentId) -> StoreResult<Vec<QuestionDetail>> {
        let op = "list_questions";
        let rows = self
            .fetch_all(
                op,
                r#"
                SELECT q.id, q.assessment_id, q.sub_assessment_id, q.master_question_id, q.created_at,
                       mq.text, mq.control_numbers, mq.frameworks, mq.risk_rating
                FROM assessment_questions q
                JOIN master_questions mq ON mq.id = q.master_question_id
                WHERE q.sub_assessment_id = $1
                ORDER BY q.created_at, q.id
                "#,
                *sub_assessment_id.as_uuid(),
            )
            .await?;

        let answer_sql = format!(
            r#"
            SELECT {ANSWER_COLUMNS}
            FROM answers
            WHERE deleted_at IS NULL
              AND assessment_question_id IN (SELECT id FROM assessment_questions WHERE sub_assessment_id = $1)
            "#
        );
        let mut answers: HashMap<AssessmentQuestionId, Answer> = self
            .fetch_all(op, &answer_sql, *sub_assessment_id.as_uuid())
            .await?
            .iter()
            .map(|r| answer_from_row(r, op).map(|a| (a.assessment_question_id, a)))
            .collect::<StoreResult<_>>()?;

        rows.iter()
            .map(|r| {
                let question = question_from_row(r, op)?;
                let controls: Vec<String> = col(r, "control_numbers", op)?;
                let rating: Option<String> = col(r, "risk_rating", op)?;
                Ok(QuestionDetail {
                    answer: answers.remove(&question.id),
                    text: col(r, "text", op)?,
                    control_numbers: controls
                        .into_iter()
                        .map(|c| parsed(ControlNumber::new(c), op))
                        .collect::<StoreResult<_>>()?,
                    frameworks: col(r, "frameworks", op)?,
                    risk_rating: rating.map(|v| parsed(RiskRating::parse(&v), op)).transpose()?,
                    question,
                })
            })
            .collect()
    }

    async fn live_answer_for_question(&mut self, question_id: AssessmentQuestionId) -> StoreResult<Option<Answer>> {
        let op = "live_answer_for_question";
        let sql = format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE assessment_question_id = $1 AND deleted_at IS NULL"
        );
        let row = self.fetch_optional(op, &sql, *question_id.as_uuid()).await?;
        row.map(|r| answer_from_row(&r, op)).transpose()
    }

    async fn get_answer(&mut self, id: AnswerId) -> StoreResult<Option<Answer>> {
        let op = "get_answer";
        let sql = format!("SELECT {ANSWER_COLUMNS} FROM answers WHERE id = $1 AND deleted_at IS NULL");
        let row = self.fetch_optional(op, &sql, *id.as_uuid()).await?;
        row.map(|r| answer_from_row(&r, op)).transpose()
    }

    async fn insert_answer(&mut self, answer: &Answer) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO answers (
                id, assessment_question_id, created_by, answer_text, review_status, revision_status,
                final_review, reviewer_comment, reviewed_by, created_at, updated_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(answer.id.as_uuid())
        .bind(answer.assessment_question_id.as_uuid())
        .bind(answer.created_by.as_uuid())
        .bind(answer.answer_text.as_str())
        .bind(answer.review_status.as_str())
        .bind(answer.revision_status.as_str())
        .bind(answer.final_review)
        .bind(&answer.reviewer_comment)
        .bind(answer.reviewed_by.map(|u| *u.as_uuid()))
        .bind(answer.created_at)
        .bind(answer.updated_at)
        .bind(answer.deleted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_answer", e))?;
        Ok(())
    }

    async fn update_answer(&mut self, answer: &Answer) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE answers
            SET answer_text = $2, review_status = $3, revision_status = $4, final_review = $5,
                reviewer_comment = $6, reviewed_by = $7, updated_at = $8, deleted_at = $9
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(answer.id.as_uuid())
        .bind(answer.answer_text.as_str())
        .bind(answer.review_status.as_str())
        .bind(answer.revision_status.as_str())
        .bind(answer.final_review)
        .bind(&answer.reviewer_comment)
        .bind(answer.reviewed_by.map(|u| *u.as_uuid()))
        .bind(answer.updated_at)
        .bind(answer.deleted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_answer", e))?;
        Ok(result.rows_affected())
    }

    async fn list_evidence(&mut self, answer_id: AnswerId) -> StoreResult<Vec<EvidenceFile>> {
        let op = "list_evidence";
        let sql = format!(
            "SELECT {EVIDENCE_COLUMNS} FROM evidence_files WHERE answer_id = $1 ORDER BY created_at, id"
        );
        let rows = self.fetch_all(op, &sql, *answer_id.as_uuid()).await?;
        rows.iter().map(|r| evidence_from_row(r, op)).collect()
    }

    async fn get_evidence(&mut self, id: EvidenceFileId) -> StoreResult<Option<EvidenceFile>> {
        let op = "get_evidence";
        let sql = format!("SELECT {EVIDENCE_COLUMNS} FROM evidence_files WHERE id = $1");
        let row = self.fetch_optional(op, &sql, *id.as_uuid()).await?;
        row.map(|r| evidence_from_row(&r, op)).transpose()
    }

    async fn insert_evidence(&mut self, file: &EvidenceFile) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO evidence_files (
                id, answer_id, file_path, original_name, content_type, size_bytes,
                checksum_sha256, bytes, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(file.id.as_uuid())
        .bind(file.answer_id.as_uuid())
        .bind(&file.file_path)
        .bind(&file.original_name)
        .bind(&file.content_type)
        .bind(file.size_bytes as i64)
        .bind(&file.checksum_sha256)
        .bind(&file.bytes)
        .bind(file.created_by.as_uuid())
        .bind(file.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_evidence", e))?;
        Ok(())
    }

    async fn delete_evidence(&mut self, id: EvidenceFileId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM evidence_files WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_evidence", e))?;
        Ok(result.rows_affected())
    }

    async fn delete_evidence_for_answer(&mut self, answer_id: AnswerId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM evidence_files WHERE answer_id = $1")
            .bind(answer_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_evidence_for_answer", e))?;
        Ok(result.rows_affected())
    }

    async fn insert_comment(&mut self, comment: &Comment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO comments (id, assessment_question_id, created_by, comment_text, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(comment.id.as_uuid())
        .bind(comment.assessment_question_id.as_uuid())
        .bind(comment.created_by.as_uuid())
        .bind(&comment.comment_text)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .bind(comment.deleted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_comment", e))?;
        Ok(())
    }

    async fn get_comment(&mut self, id: CommentId) -> StoreResult<Option<Comment>> {
        let op = "get_comment";
        let row = self
            .fetch_optional(
                op,
                r#"
                SELECT id, assessment_question_id, created_by, comment_text, created_at, updated_at, deleted_at
                FROM comments WHERE id = $1 AND deleted_at IS NULL
                "#,
                *id.as_uuid(),
            )
            .await?;
        row.map(|r| comment_from_row(&r, op)).transpose()
    }

    async fn update_comment(&mut self, comment: &Comment) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE comments SET comment_text = $2, updated_at = $3, deleted_at = $4
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(comment.id.as_uuid())
        .bind(&comment.comment_text)
        .bind(comment.updated_at)
        .bind(comment.deleted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_comment", e))?;
        Ok(result.rows_affected())
    }

    async fn list_comments(&mut self, question_id: AssessmentQuestionId) -> StoreResult<Vec<Comment>> {
        let op = "list_comments";
        let rows = self
            .fetch_all(
                op,
                r#"
                SELECT id, assessment_question_id, created_by, comment_text, created_at, updated_at, deleted_at
                FROM comments
                WHERE assessment_question_id = $1 AND deleted_at IS NULL
                ORDER BY created_at, id
                "#,
                *question_id.as_uuid(),
            )
            .await?;
        rows.iter().map(|r| comment_from_row(r, op)).collect()
    }

    #[instrument(skip(self), err)]
    async fn statistics_input(&mut self, scope: StatsScope) -> StoreResult<StatisticsInput> {
        let op = "statistics_input";
        let (assessment_id, company_id) = stats_filter(scope);

        let counts = sqlx::query(
            r#"
            SELECT sa.sub_department_id, COUNT(q.id) AS total
            FROM sub_assessments sa
            JOIN assessments a ON a.id = sa.assessment_id
            JOIN departments d ON d.id = a.department_id
            LEFT JOIN assessment_questions q ON q.sub_assessment_id = sa.id
            WHERE ($1::uuid IS NULL OR a.id = $1)
              AND ($2::uuid IS NULL OR d.company_id = $2)
            GROUP BY sa.sub_department_id
            "#,
        )
        .bind(assessment_id)
        .bind(company_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let mut input = StatisticsInput::default();
        for row in &counts {
            let sub = SubDepartmentId::from_uuid(col(row, "sub_department_id", op)?);
            let total: i64 = col(row, "total", op)?;
            input.question_counts.insert(sub, total.max(0) as u64);
        }

        let facts = sqlx::query(
            r#"
            SELECT sa.sub_department_id, an.answer_text, mq.control_numbers, mq.risk_rating
            FROM answers an
            JOIN assessment_questions q ON q.id = an.assessment_question_id
            JOIN master_questions mq ON mq.id = q.master_question_id
            JOIN sub_assessments sa ON sa.id = q.sub_assessment_id
            JOIN assessments a ON a.id = sa.assessment_id
            JOIN departments d ON d.id = a.department_id
            WHERE an.deleted_at IS NULL
              AND ($1::uuid IS NULL OR a.id = $1)
              AND ($2::uuid IS NULL OR d.company_id = $2)
            ORDER BY q.created_at, q.id
            "#,
        )
        .bind(assessment_id)
        .bind(company_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        for row in &facts {
            let text: String = col(row, "answer_text", op)?;
            let controls: Vec<String> = col(row, "control_numbers", op)?;
            let rating: Option<String> = col(row, "risk_rating", op)?;
            input.answers.push(AnswerFact {
                sub_department_id: SubDepartmentId::from_uuid(col(row, "sub_department_id", op)?),
                answer_text: parsed(AnswerText::parse(&text), op)?,
                control_numbers: controls
                    .into_iter()
                    .map(|c| parsed(ControlNumber::new(c), op))
                    .collect::<StoreResult<_>>()?,
                risk_rating: rating.map(|r| parsed(RiskRating::parse(&r), op)).transpose()?,
            });
        }

        Ok(input)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation { operation, message },
                _ => StoreError::Database { operation, message },
            }
        }
        sqlx::Error::ColumnDecode { index, source } => StoreError::Decode {
            operation,
            message: format!("column {index}: {source}"),
        },
        other => StoreError::Database {
            operation,
            message: other.to_string(),
        },
    }
}
