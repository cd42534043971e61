//! `assurance-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod pagination;
pub mod value_object;

pub use aggregate::Aggregate;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    AnswerId, AssessmentId, AssessmentQuestionId, CommentId, CompanyId, DepartmentId,
    EvidenceFileId, MasterDepartmentId, MasterQuestionId, SubAssessmentId, SubDepartmentId,
    UserId,
};
pub use pagination::{Page, PageRequest};
pub use value_object::ValueObject;
