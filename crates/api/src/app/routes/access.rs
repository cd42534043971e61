//! Authorization audit endpoints.
//!
//! They answer "why was this request denied?" without performing the
//! request itself.

use axum::{
    Router,
    extract::{Extension, Query},
    http::StatusCode,
    routing::get,
};
use serde_json::json;

use assurance_auth::{Action, Permission, ResourceType};
use assurance_infra::{ComplianceServices, ResourceRef};

use crate::app::dto::{ExplainQuery, respond};
use crate::app::errors::ApiResult;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/explain", get(explain))
        .route("/roles", get(roles))
}

/// GET /access/explain?resourceType=answer&action=update&resourceId=...
pub async fn explain(
    Extension(services): Extension<ComplianceServices>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(query): Query<ExplainQuery>,
) -> ApiResult {
    let resource: ResourceType = query.resource_type.parse()?;
    let action: Action = query.action.parse()?;
    let target = ResourceRef::parse(resource, &query.resource_id)?;

    let explanation = services
        .explain_access(ctx.principal(), Permission::new(resource, action), target)
        .await?;
    Ok(respond(StatusCode::OK, "authorization explained", json!({ "explanation": explanation })))
}

/// GET /access/roles - the role to permission registry in effect.
pub async fn roles(Extension(services): Extension<ComplianceServices>) -> ApiResult {
    let registry = services.access().table().registry();
    Ok(respond(StatusCode::OK, "roles listed", json!({ "roles": registry })))
}
