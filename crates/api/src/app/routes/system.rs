use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde_json::json;

use assurance_infra::ComplianceServices;

use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// The caller as the token describes them, plus what their role may do.
pub async fn whoami(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
) -> impl IntoResponse {
    let principal = ctx.principal();
    let permissions: Vec<String> = services
        .access()
        .table()
        .permissions_for(principal.role)
        .iter()
        .map(ToString::to_string)
        .collect();

    Json(json!({
        "success": true,
        "messages": [],
        "userId": principal.user_id,
        "role": principal.role,
        "companyId": ctx.company_id(),
        "departmentIds": principal.departments,
        "subDepartmentIds": principal.sub_departments,
        "permissions": permissions,
    }))
}
