use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
};
use serde_json::json;

use assurance_core::{AssessmentQuestionId, CommentId};
use assurance_infra::ComplianceServices;

use crate::app::dto::{CommentRequest, PageQuery, parse_id, respond};
use crate::app::errors::ApiResult;
use crate::context::PrincipalContext;

pub async fn list_comments(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult {
    let question_id: AssessmentQuestionId = parse_id(&id)?;
    let page = services
        .list_comments(ctx.principal(), question_id, query.into_request()?)
        .await?;
    Ok(respond(StatusCode::OK, "comments listed", page))
}

pub async fn create_comment(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<CommentRequest>,
) -> ApiResult {
    let question_id: AssessmentQuestionId = parse_id(&id)?;
    let comment = services
        .create_comment(ctx.principal(), question_id, &body.comment_text)
        .await?;
    Ok(respond(StatusCode::CREATED, "comment created", json!({ "comment": comment })))
}

/// Authors may edit within the edit window; super-admins at any time.
pub async fn update_comment(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<CommentRequest>,
) -> ApiResult {
    let id: CommentId = parse_id(&id)?;
    let comment = services.update_comment(ctx.principal(), id, &body.comment_text).await?;
    Ok(respond(StatusCode::OK, "comment updated", json!({ "comment": comment })))
}

pub async fn delete_comment(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: CommentId = parse_id(&id)?;
    services.delete_comment(ctx.principal(), id).await?;
    Ok(respond(StatusCode::OK, "comment deleted", json!({})))
}
