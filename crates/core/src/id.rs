//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! uuid_ids {
    ($($(#[$meta:meta])* $t:ident => $name:literal),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $t(Uuid);

            impl $t {
                /// Create a new identifier.
                ///
                /// Uses UUIDv7 (time-ordered), so ids sort by creation order.
                pub fn new() -> Self {
                    Self(Uuid::now_v7())
                }

                pub fn from_uuid(uuid: Uuid) -> Self {
                    Self(uuid)
                }

                pub fn as_uuid(&self) -> &Uuid {
                    &self.0
                }
            }

            impl Default for $t {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl core::fmt::Display for $t {
                fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                    core::fmt::Display::fmt(&self.0, f)
                }
            }

            impl From<Uuid> for $t {
                fn from(value: Uuid) -> Self {
                    Self(value)
                }
            }

            impl From<$t> for Uuid {
                fn from(value: $t) -> Self {
                    value.0
                }
            }

            impl FromStr for $t {
                type Err = DomainError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    let uuid = Uuid::from_str(s)
                        .map_err(|e| DomainError::bad_request(format!("invalid {}: {}", $name, e)))?;
                    Ok(Self(uuid))
                }
            }
        )+
    };
}

uuid_ids! {
    /// Root of tenancy.
    CompanyId => "company id",
    DepartmentId => "department id",
    SubDepartmentId => "sub-department id",
    /// Template department the question bank is keyed by.
    MasterDepartmentId => "master department id",
    AssessmentId => "assessment id",
    SubAssessmentId => "sub-assessment id",
    MasterQuestionId => "master question id",
    AssessmentQuestionId => "assessment question id",
    AnswerId => "answer id",
    CommentId => "comment id",
    EvidenceFileId => "evidence file id",
    /// Identifier of a user (actor identity).
    UserId => "user id",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_display() {
        let id = AnswerId::new();
        let parsed: AnswerId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_failure_is_bad_request() {
        let err = "not-a-uuid".parse::<CompanyId>().unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.message().contains("company id"));
    }
}
