//! Question comments and their edit window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use assurance_core::{AssessmentQuestionId, CommentId, DomainError, DomainResult, Entity, UserId};

pub const DEFAULT_EDIT_WINDOW_MINUTES: i64 = 20;
const MAX_COMMENT_CHARS: usize = 4000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub assessment_question_id: AssessmentQuestionId,
    pub created_by: UserId,
    pub comment_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for Comment {
    type Id = CommentId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// How long after creation the author may still edit or delete a comment.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CommentPolicy {
    pub edit_window: Duration,
}

impl Default for CommentPolicy {
    fn default() -> Self {
        Self {
            edit_window: Duration::minutes(DEFAULT_EDIT_WINDOW_MINUTES),
        }
    }
}

fn normalize_text(text: &str) -> DomainResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DomainError::bad_request("comment text cannot be empty"));
    }
    if text.chars().count() > MAX_COMMENT_CHARS {
        return Err(DomainError::bad_request(format!(
            "comment text exceeds {MAX_COMMENT_CHARS} characters"
        )));
    }
    Ok(text.to_string())
}

impl Comment {
    pub fn new(
        assessment_question_id: AssessmentQuestionId,
        created_by: UserId,
        text: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id: CommentId::new(),
            assessment_question_id,
            created_by,
            comment_text: normalize_text(text)?,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Edit-window check. Privileged actors (super-admins) are exempt; the
    /// author check itself happens in the access layer.
    pub fn ensure_within_window(
        &self,
        policy: &CommentPolicy,
        privileged: bool,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if privileged {
            return Ok(());
        }
        if now - self.created_at > policy.edit_window {
            return Err(DomainError::forbidden(format!(
                "time limit exceeded: comments can only be changed within {} minutes of creation",
                policy.edit_window.num_minutes()
            )));
        }
        Ok(())
    }

    pub fn edit(&mut self, text: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.comment_text = normalize_text(text)?;
        self.updated_at = now;
        Ok(())
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
        self.updated_at = now;
    }
}
