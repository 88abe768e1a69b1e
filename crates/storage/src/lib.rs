//! PostgreSQL metadata store for ScaleODM.
//!
//! The store is the durable system of record for tasks and clusters. Rows
//! outlive the workflow engine's objects: once Argo garbage-collects a
//! workflow, the row here is the only remaining description of the task.

mod clusters;
mod jobs;
mod rows;

pub use rows::{ClusterRow, JobRow};

use scaleodm_models::ScaleOdmError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// Advisory lock id guarding concurrent schema initialization across
/// control-plane replicas.
const SCHEMA_LOCK_ID: i64 = 123_456;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Repository over the two metadata tables.
#[derive(Clone)]
pub struct MetadataStore {
    pool: PgPool,
}

impl MetadataStore {
    /// Connect to PostgreSQL and verify the connection with a ping.
    pub async fn connect(database_url: &str) -> Result<Self, ScaleOdmError> {
        info!("Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .min_connections(5)
            .max_connections(20)
            .max_lifetime(Duration::from_secs(60 * 60))
            .idle_timeout(Duration::from_secs(30 * 60))
            .connect(database_url)
            .await
            .map_err(|e| ScaleOdmError::Store {
                reason: format!("failed to connect to PostgreSQL: {e}"),
            })?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| ScaleOdmError::Store {
                reason: format!("failed to ping database: {e}"),
            })?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool, used by tests.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the schema, safe under concurrent startup of multiple replicas.
    ///
    /// Takes a PostgreSQL advisory lock for the duration of the DDL and
    /// swallows "already exists" races so a replica losing the race still
    /// starts cleanly.
    pub async fn init_schema(&self) -> Result<(), ScaleOdmError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(SCHEMA_LOCK_ID)
            .execute(&mut *tx)
            .await
            .map_err(|e| ScaleOdmError::Store {
                reason: format!("failed to acquire schema lock: {e}"),
            })?;

        let ddl_result = sqlx::raw_sql(SCHEMA_SQL).execute(&mut *tx).await;
        if let Err(e) = ddl_result {
            let message = e.to_string();
            if message.contains("already exists") || message.contains("duplicate key") {
                info!("Schema already initialized, skipping DDL");
                let _ = sqlx::query("SELECT pg_advisory_unlock($1)")
                    .bind(SCHEMA_LOCK_ID)
                    .execute(&mut *tx)
                    .await;
                let _ = tx.commit().await;
                return Ok(());
            }
            return Err(ScaleOdmError::Store {
                reason: format!("failed to initialize schema: {message}"),
            });
        }

        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(SCHEMA_LOCK_ID)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        info!("Database schema initialized");
        Ok(())
    }

    /// Ping the database; used by the liveness probe.
    pub async fn health_check(&self) -> Result<(), ScaleOdmError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| ScaleOdmError::ServiceUnavailable {
                service: format!("database: {e}"),
            })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn store_error(err: sqlx::Error) -> ScaleOdmError {
    ScaleOdmError::Store {
        reason: err.to_string(),
    }
}

/// True when the error is a PostgreSQL deadlock (SQLSTATE 40P01).
pub(crate) fn is_deadlock(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c == "40P01").unwrap_or(false),
        _ => false,
    }
}
