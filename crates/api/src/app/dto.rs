//! Request DTOs, the success envelope and multipart decoding.

use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use assurance_assessments::{AnswerText, EvidenceUpload};
use assurance_core::{DomainError, PageRequest};

use crate::app::errors::{ApiError, ApiResult, bad_request};

// -------------------------
// Envelope
// -------------------------

#[derive(Debug, Serialize)]
struct Envelope<T> {
    success: bool,
    messages: Vec<String>,
    #[serde(flatten)]
    payload: T,
}

/// `{"success": true, "messages": [message], ...payload}`.
///
/// `payload` must serialize as a map; its fields land next to `success`.
pub fn respond<T: Serialize>(status: StatusCode, message: &str, payload: T) -> Response {
    let envelope = Envelope {
        success: true,
        messages: vec![message.to_string()],
        payload,
    };
    (status, axum::Json(envelope)).into_response()
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u32>,
    pub items_per_page: Option<u32>,
}

impl PageQuery {
    pub fn into_request(self) -> Result<PageRequest, DomainError> {
        PageRequest::new(self.page, self.items_per_page)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    pub comment_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainQuery {
    pub resource_type: String,
    pub action: String,
    pub resource_id: String,
}

/// Parse a path segment into a typed id (`BadRequest` on garbage).
pub fn parse_id<T>(raw: &str) -> ApiResult<T>
where
    T: std::str::FromStr<Err = DomainError>,
{
    raw.parse().map_err(ApiError::from)
}

// -------------------------
// Multipart
// -------------------------

/// Fields of an answer form: `answerText` plus any number of `files` parts.
#[derive(Debug, Default)]
pub struct AnswerForm {
    pub answer_text: Option<AnswerText>,
    pub files: Vec<EvidenceUpload>,
}

impl AnswerForm {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = AnswerForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| bad_request(format!("malformed multipart body: {e}")))?
        {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("answerText") => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("unreadable answerText: {e}")))?;
                    form.answer_text = Some(AnswerText::parse(&text)?);
                }
                Some("files") => {
                    let original_name = field.file_name().unwrap_or_default().to_string();
                    let content_type = field.content_type().unwrap_or_default().to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| bad_request(format!("unreadable file '{original_name}': {e}")))?;
                    form.files.push(EvidenceUpload {
                        original_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                _ => {}
            }
        }
        Ok(form)
    }

    pub fn require_text(&self) -> ApiResult<AnswerText> {
        self.answer_text.ok_or_else(|| bad_request("answerText is required"))
    }
}
