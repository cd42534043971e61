//! Infrastructure layer: stores, access checks, services, config, notifier.

pub mod access;
pub mod clock;
pub mod config;
pub mod notify;
pub mod services;
pub mod store;

#[cfg(test)]
mod fixtures;

pub use access::{AccessChecker, AccessGrant};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigError};
pub use notify::{LogNotifier, Notification, Notifier, NotifyError, RecordingNotifier, notify_best_effort};
pub use services::ComplianceServices;
pub use store::{
    ComplianceStore, InMemoryComplianceStore, PostgresComplianceStore, ResourceRef, StoreError, ensure_schema,
};
