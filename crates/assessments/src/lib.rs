//! Assessment domain module.
//!
//! Organisation entities, the assessment and sub-assessment state machines,
//! answer/evidence/comment rules and the statistics engine. Pure domain
//! logic: no IO, no HTTP, no storage.

pub mod answer;
pub mod assessment;
pub mod comment;
pub mod evidence;
pub mod lifecycle;
pub mod organization;
pub mod question;
pub mod stats;
pub mod sub_assessment;

pub use answer::{
    Answer, AnswerReviewStatus, AnswerText, AnswerUpdatePlan, ReviewDecision, RevisionStatus,
    validate_new_answer,
};
pub use assessment::{Assessment, AssessmentCommand, AssessmentEvent};
pub use comment::{Comment, CommentPolicy, DEFAULT_EDIT_WINDOW_MINUTES};
pub use evidence::{EvidenceFile, EvidencePolicy, EvidenceUpload, PDF_CONTENT_TYPE, prepare_evidence};
pub use lifecycle::{ContainerKind, Lifecycle, LifecycleState, ensure_content_mutable};
pub use organization::{Company, Department, SubDepartment};
pub use question::{AssessmentBlueprint, AssessmentQuestion, ControlNumber, MasterQuestion, RiskRating};
pub use stats::{
    AnswerFact, AnswerTypeBreakdown, Statistics, StatisticsInput, SubDepartmentRisk,
    compute_statistics, percentage,
};
pub use sub_assessment::{
    Completion, ReviewStatus, SubAssessment, SubAssessmentCommand, SubAssessmentEvent,
    check_sub_assessment_completion,
};
