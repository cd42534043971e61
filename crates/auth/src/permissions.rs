use core::str::FromStr;

use serde::{Deserialize, Serialize};

use assurance_core::DomainError;

/// Resource types the permission table and the context checkers know about.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Company,
    Department,
    SubDepartment,
    Assessment,
    SubAssessment,
    AssessmentQuestion,
    Answer,
    Comment,
    EvidenceFile,
    User,
    Statistics,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Company => "company",
            ResourceType::Department => "department",
            ResourceType::SubDepartment => "sub_department",
            ResourceType::Assessment => "assessment",
            ResourceType::SubAssessment => "sub_assessment",
            ResourceType::AssessmentQuestion => "assessment_question",
            ResourceType::Answer => "answer",
            ResourceType::Comment => "comment",
            ResourceType::EvidenceFile => "evidence_file",
            ResourceType::User => "user",
            ResourceType::Statistics => "statistics",
        }
    }

    /// Resources whose content lives inside an assessment container and is
    /// therefore gated by the container's lifecycle state.
    pub fn is_state_gated(&self) -> bool {
        matches!(
            self,
            ResourceType::AssessmentQuestion
                | ResourceType::Answer
                | ResourceType::Comment
                | ResourceType::EvidenceFile
        )
    }
}

impl core::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| DomainError::bad_request(format!("unknown resource type '{s}'")))
    }
}

/// Actions a role can be granted on a resource type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Remove,
    Start,
    Submit,
    Reopen,
    Review,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Remove => "remove",
            Action::Start => "start",
            Action::Submit => "submit",
            Action::Reopen => "reopen",
            Action::Review => "review",
        }
    }

    /// Writes to assessment content (answers, comments, evidence).
    pub fn mutates_content(&self) -> bool {
        matches!(self, Action::Create | Action::Update | Action::Remove)
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| DomainError::bad_request(format!("unknown action '{s}'")))
    }
}

/// A `(resource type, action)` capability, rendered as `"answer.update"`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Permission {
    pub resource: ResourceType,
    pub action: Action,
}

impl Permission {
    pub const fn new(resource: ResourceType, action: Action) -> Self {
        Self { resource, action }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.resource, self.action)
    }
}
