//! Service wiring: pick the store backend and assemble the services.

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tracing::info;

use assurance_infra::{
    AppConfig, ComplianceServices, ComplianceStore, InMemoryComplianceStore, LogNotifier,
    PostgresComplianceStore, ensure_schema,
};

/// Build the services described by `config`.
///
/// `USE_PERSISTENT_STORES=true` connects to `DATABASE_URL` and creates the
/// schema when missing; otherwise everything lives in memory.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<ComplianceServices> {
    let table = Arc::new(config.load_permissions()?);

    let store: Arc<dyn ComplianceStore> = match (config.use_persistent_stores, &config.database_url) {
        (true, Some(url)) => {
            let pool = PgPool::connect(url)
                .await
                .context("failed to connect to Postgres")?;
            ensure_schema(&pool).await.context("failed to prepare the schema")?;
            info!("using the Postgres store");
            Arc::new(PostgresComplianceStore::new(pool))
        }
        _ => {
            info!("using the in-memory store");
            Arc::new(InMemoryComplianceStore::new())
        }
    };

    Ok(ComplianceServices::new(store, table)
        .with_notifier(Arc::new(LogNotifier))
        .with_evidence_policy(config.evidence_policy, config.evidence_concurrency)
        .with_comment_policy(config.comment_policy))
}
