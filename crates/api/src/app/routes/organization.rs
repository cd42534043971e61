use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use serde_json::json;

use assurance_auth::NewUser;
use assurance_core::{CompanyId, DepartmentId, UserId};
use assurance_infra::ComplianceServices;
use assurance_infra::services::{NewCompany, NewDepartment, NewMasterQuestion, NewSubDepartment};

use crate::app::dto::{parse_id, respond};
use crate::app::errors::ApiResult;
use crate::context::PrincipalContext;

pub async fn create_company(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<NewCompany>,
) -> ApiResult {
    let company = services.create_company(ctx.principal(), body).await?;
    Ok(respond(StatusCode::CREATED, "company created", json!({ "company": company })))
}

pub async fn get_company(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: CompanyId = parse_id(&id)?;
    let company = services.get_company(ctx.principal(), id).await?;
    Ok(respond(StatusCode::OK, "company fetched", json!({ "company": company })))
}

pub async fn create_department(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<NewDepartment>,
) -> ApiResult {
    let company_id: CompanyId = parse_id(&id)?;
    let department = services.create_department(ctx.principal(), company_id, body).await?;
    Ok(respond(StatusCode::CREATED, "department created", json!({ "department": department })))
}

pub async fn company_statistics(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let company_id: CompanyId = parse_id(&id)?;
    let statistics = services.company_statistics(ctx.principal(), company_id).await?;
    Ok(respond(StatusCode::OK, "statistics computed", json!({ "statistics": statistics })))
}

pub async fn create_sub_department(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<NewSubDepartment>,
) -> ApiResult {
    let department_id: DepartmentId = parse_id(&id)?;
    let sub_department = services
        .create_sub_department(ctx.principal(), department_id, body)
        .await?;
    Ok(respond(
        StatusCode::CREATED,
        "sub-department created",
        json!({ "subDepartment": sub_department }),
    ))
}

pub async fn list_sub_departments(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let department_id: DepartmentId = parse_id(&id)?;
    let sub_departments = services.list_sub_departments(ctx.principal(), department_id).await?;
    Ok(respond(
        StatusCode::OK,
        "sub-departments listed",
        json!({ "subDepartments": sub_departments }),
    ))
}

pub async fn create_user(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<NewUser>,
) -> ApiResult {
    let user = services.create_user(ctx.principal(), body).await?;
    Ok(respond(StatusCode::CREATED, "user created", json!({ "user": user })))
}

pub async fn get_user(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: UserId = parse_id(&id)?;
    let user = services.get_user(ctx.principal(), id).await?;
    Ok(respond(StatusCode::OK, "user fetched", json!({ "user": user })))
}

pub async fn create_master_question(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<NewMasterQuestion>,
) -> ApiResult {
    let question = services.create_master_question(ctx.principal(), body).await?;
    Ok(respond(StatusCode::CREATED, "master question created", json!({ "masterQuestion": question })))
}
