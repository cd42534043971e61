//! Answers, reviews and evidence files.
//!
//! Create and update take `multipart/form-data` with an `answerText` field
//! and zero or more `files` parts.

use axum::{
    Json,
    extract::{Extension, Multipart, Path},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde_json::json;

use assurance_core::{AnswerId, AssessmentQuestionId, EvidenceFileId};
use assurance_infra::ComplianceServices;
use assurance_infra::services::{AnswerInput, AnswerReview};

use crate::app::dto::{AnswerForm, parse_id, respond};
use crate::app::errors::{ApiResult, bad_request};
use crate::context::PrincipalContext;

pub async fn create_answer(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult {
    let question_id: AssessmentQuestionId = parse_id(&id)?;
    let form = AnswerForm::read(multipart).await?;
    let input = AnswerInput::new(form.require_text()?, form.files);
    let view = services.create_answer(ctx.principal(), question_id, input).await?;
    Ok(respond(StatusCode::CREATED, "answer created", json!({ "answer": view })))
}

pub async fn update_answer(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult {
    let id: AnswerId = parse_id(&id)?;
    let form = AnswerForm::read(multipart).await?;
    let input = AnswerInput::new(form.require_text()?, form.files);
    let view = services.update_answer(ctx.principal(), id, input).await?;
    Ok(respond(StatusCode::OK, "answer updated", json!({ "answer": view })))
}

pub async fn get_answer(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: AnswerId = parse_id(&id)?;
    let view = services.get_answer(ctx.principal(), id).await?;
    Ok(respond(StatusCode::OK, "answer fetched", json!({ "answer": view })))
}

pub async fn delete_answer(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: AnswerId = parse_id(&id)?;
    services.delete_answer(ctx.principal(), id).await?;
    Ok(respond(StatusCode::OK, "answer deleted", json!({})))
}

pub async fn review_answer(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(review): Json<AnswerReview>,
) -> ApiResult {
    let id: AnswerId = parse_id(&id)?;
    let view = services.review_answer(ctx.principal(), id, review).await?;
    Ok(respond(StatusCode::OK, "answer reviewed", json!({ "answer": view })))
}

pub async fn list_evidence(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let answer_id: AnswerId = parse_id(&id)?;
    let files = services.list_evidence(ctx.principal(), answer_id).await?;
    Ok(respond(StatusCode::OK, "evidence listed", json!({ "files": files })))
}

/// Attach more PDFs to an existing answer. Only `files` parts are read.
pub async fn add_evidence(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult {
    let answer_id: AnswerId = parse_id(&id)?;
    let form = AnswerForm::read(multipart).await?;
    if form.files.is_empty() {
        return Err(bad_request("at least one file is required"));
    }
    let view = services.add_evidence(ctx.principal(), answer_id, form.files).await?;
    Ok(respond(StatusCode::CREATED, "evidence added", json!({ "answer": view })))
}

/// Stream the stored PDF back with its original name.
pub async fn download_evidence(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: EvidenceFileId = parse_id(&id)?;
    let file = services.get_evidence(ctx.principal(), id).await?;
    let disposition = format!("attachment; filename=\"{}\"", attachment_name(&file.original_name));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.bytes,
    )
        .into_response())
}

pub async fn remove_evidence(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: EvidenceFileId = parse_id(&id)?;
    let view = services.remove_evidence(ctx.principal(), id).await?;
    Ok(respond(StatusCode::OK, "evidence removed", json!({ "answer": view })))
}

/// Keep the header value printable ASCII without quotes.
fn attachment_name(original: &str) -> String {
    let name: String = original
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .filter(|c| !matches!(c, '"' | '\\'))
        .collect();
    if name.trim().is_empty() { "evidence.pdf".to_string() } else { name }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_names_are_header_safe() {
        assert_eq!(attachment_name("ISO \"27001\" policy.pdf"), "ISO 27001 policy.pdf");
        assert_eq!(attachment_name("\u{00e9}\u{00e9}"), "evidence.pdf");
    }
}
