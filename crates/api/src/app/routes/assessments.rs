use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
};
use serde_json::json;

use assurance_core::{AssessmentId, DepartmentId, DomainError, SubAssessmentId};
use assurance_infra::ComplianceServices;
use assurance_infra::services::{AssessmentTransition, NewAssessment, SubAssessmentTransition};

use crate::app::dto::{PageQuery, parse_id, respond};
use crate::app::errors::{ApiError, ApiResult};
use crate::context::PrincipalContext;

fn assessment_transition(raw: &str) -> ApiResult<AssessmentTransition> {
    match raw {
        "start" => Ok(AssessmentTransition::Start),
        "submit" => Ok(AssessmentTransition::Submit),
        "reopen" => Ok(AssessmentTransition::Reopen),
        other => Err(ApiError(DomainError::not_found(format!("unknown assessment transition '{other}'")))),
    }
}

fn sub_assessment_transition(raw: &str) -> ApiResult<SubAssessmentTransition> {
    match raw {
        "start" => Ok(SubAssessmentTransition::Start),
        "submit" => Ok(SubAssessmentTransition::Submit),
        "reopen" => Ok(SubAssessmentTransition::Reopen),
        "begin-review" => Ok(SubAssessmentTransition::BeginReview),
        "request-revision" => Ok(SubAssessmentTransition::RequestRevision),
        "complete-review" => Ok(SubAssessmentTransition::CompleteReview),
        other => Err(ApiError(DomainError::not_found(format!("unknown sub-assessment transition '{other}'")))),
    }
}

pub async fn list_assessments(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult {
    let department_id: DepartmentId = parse_id(&id)?;
    let page = services
        .list_assessments(ctx.principal(), department_id, query.into_request()?)
        .await?;
    Ok(respond(StatusCode::OK, "assessments listed", page))
}

pub async fn create_assessment(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<NewAssessment>,
) -> ApiResult {
    let department_id: DepartmentId = parse_id(&id)?;
    let view = services.create_assessment(ctx.principal(), department_id, body).await?;
    Ok(respond(StatusCode::CREATED, "assessment created", json!({ "assessment": view })))
}

pub async fn get_assessment(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: AssessmentId = parse_id(&id)?;
    let view = services.get_assessment(ctx.principal(), id).await?;
    Ok(respond(StatusCode::OK, "assessment fetched", json!({ "assessment": view })))
}

pub async fn assessment_statistics(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: AssessmentId = parse_id(&id)?;
    let statistics = services.assessment_statistics(ctx.principal(), id).await?;
    Ok(respond(StatusCode::OK, "statistics computed", json!({ "statistics": statistics })))
}

/// POST /assessments/:id/transitions/{start|submit|reopen}
pub async fn transition_assessment(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path((id, transition)): Path<(String, String)>,
) -> ApiResult {
    let id: AssessmentId = parse_id(&id)?;
    let transition = assessment_transition(&transition)?;
    let view = services.transition_assessment(ctx.principal(), id, transition).await?;
    Ok(respond(StatusCode::OK, "assessment updated", json!({ "assessment": view })))
}

pub async fn get_sub_assessment(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: SubAssessmentId = parse_id(&id)?;
    let view = services.get_sub_assessment(ctx.principal(), id).await?;
    Ok(respond(StatusCode::OK, "sub-assessment fetched", json!({ "subAssessment": view })))
}

pub async fn list_questions(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult {
    let id: SubAssessmentId = parse_id(&id)?;
    let page = services
        .list_questions(ctx.principal(), id, query.into_request()?)
        .await?;
    Ok(respond(StatusCode::OK, "questions listed", page))
}

/// POST /sub-assessments/:id/transitions/{start|submit|reopen|begin-review|request-revision|complete-review}
pub async fn transition_sub_assessment(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path((id, transition)): Path<(String, String)>,
) -> ApiResult {
    let id: SubAssessmentId = parse_id(&id)?;
    let transition = sub_assessment_transition(&transition)?;
    let view = services
        .transition_sub_assessment(ctx.principal(), id, transition)
        .await?;
    Ok(respond(StatusCode::OK, "sub-assessment updated", json!({ "subAssessment": view })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_segments_map_to_commands() {
        assert_eq!(assessment_transition("submit").ok(), Some(AssessmentTransition::Submit));
        assert!(assessment_transition("begin-review").is_err());
        assert_eq!(
            sub_assessment_transition("request-revision").ok(),
            Some(SubAssessmentTransition::RequestRevision)
        );
        assert!(sub_assessment_transition("approve").is_err());
    }
}
