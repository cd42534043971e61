//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and service assembly
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs, the success envelope, multipart decoding
//! - `errors.rs`: the error envelope

use std::sync::Arc;

use axum::{Extension, Router, extract::DefaultBodyLimit, routing::get};
use tower::ServiceBuilder;

use assurance_infra::{AppConfig, ComplianceServices};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Room for multipart framing and the non-file fields of an upload.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the full HTTP router from configuration (used by `main.rs`).
pub async fn build_app(config: AppConfig) -> anyhow::Result<Router> {
    let services = services::build_services(&config).await?;
    Ok(build_router(services, &config))
}

/// Router over already-assembled services.
pub fn build_router(services: ComplianceServices, config: &AppConfig) -> Router {
    let jwt = Arc::new(assurance_auth::Hs256JwtValidator::new(config.jwt_secret.clone().into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let max_file_bytes = usize::try_from(config.evidence_policy.max_file_bytes).unwrap_or(usize::MAX);
    let body_limit = max_file_bytes
        .saturating_mul(config.evidence_policy.max_files)
        .saturating_add(BODY_OVERHEAD_BYTES);

    // Protected routes: require a valid bearer token.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(DefaultBodyLimit::max(body_limit)))
}
