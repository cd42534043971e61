//! Transactional persistence for the compliance hierarchy.
//!
//! Services never touch SQL directly: they open a [`StoreTx`], read the rows
//! they need (including the [`Ownership`] projection used for access checks),
//! write through conditional updates and commit.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryComplianceStore;
pub use postgres::{PostgresComplianceStore, ensure_schema};
pub use r#trait::{
    ComplianceStore, ContainerState, Ownership, QuestionDetail, ResourceRef, StatsScope,
    StoreError, StoreResult, StoreTx,
};
