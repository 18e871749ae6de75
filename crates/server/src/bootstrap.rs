use std::sync::Arc;

use meetbook_agent::{build_policy, FixedSlotProvider, PolicyError, Scheduler};
use meetbook_core::config::{AppConfig, ConfigError, LoadOptions};
use meetbook_core::{AuditEvent, AuditSink};
use meetbook_db::{connect_from_config, migrations, DbPool, SqlConversationStore, SqlRecordStore};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub scheduler: Scheduler,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("decision policy client could not be built: {0}")]
    Policy(#[source] PolicyError),
}

/// Writes audit events to the log stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = "audit.event",
            audit_type = %event.event_type,
            category = ?event.category,
            outcome = ?event.outcome,
            actor = %event.actor,
            correlation_id = %event.correlation_id,
            thread_id = event.thread_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
            metadata = ?event.metadata,
            "audit"
        );
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        "database migrations applied"
    );

    let policy = build_policy(&config.policy).map_err(BootstrapError::Policy)?;
    info!(
        event_name = "system.bootstrap.policy_ready",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        provider = config.policy.provider.as_str(),
        model = %policy.model_id(),
        base_url = %config.policy_base_url(),
        "decision policy client configured"
    );

    let scheduler = Scheduler::new(
        &config,
        Arc::new(SqlConversationStore::new(db_pool.clone())),
        Arc::new(SqlRecordStore::new(db_pool.clone())),
        Arc::new(FixedSlotProvider),
        policy,
        Arc::new(TracingAuditSink),
    );

    Ok(Application { config, db_pool, scheduler })
}
