//! Cluster registry operations.

use crate::rows::ClusterRow;
use crate::{store_error, MetadataStore};
use scaleodm_models::{Cluster, ScaleOdmError};

impl MetadataStore {
    /// Create the local cluster record if it does not exist yet. Idempotent;
    /// an existing row keeps its configured values.
    pub async fn init_local_cluster_record(&self, cluster_url: &str) -> Result<(), ScaleOdmError> {
        sqlx::query(
            "INSERT INTO scaleodm_clusters (cluster_url, max_concurrent_jobs, priority_weighting, last_heartbeat) \
             VALUES ($1, 10, 10, NOW()) \
             ON CONFLICT (cluster_url) DO NOTHING",
        )
        .bind(cluster_url)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    pub async fn list_clusters(&self) -> Result<Vec<Cluster>, ScaleOdmError> {
        let rows = sqlx::query_as::<_, ClusterRow>(
            "SELECT cluster_url, max_concurrent_jobs, priority_weighting, last_heartbeat \
             FROM scaleodm_clusters",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Upsert capacity details for a cluster.
    pub async fn update_cluster_details(
        &self,
        cluster_url: &str,
        max_concurrent_jobs: i32,
        priority_weighting: i32,
    ) -> Result<(), ScaleOdmError> {
        sqlx::query(
            "INSERT INTO scaleodm_clusters (cluster_url, max_concurrent_jobs, priority_weighting, last_heartbeat) \
             VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (cluster_url) DO UPDATE SET \
                 max_concurrent_jobs = EXCLUDED.max_concurrent_jobs, \
                 priority_weighting = EXCLUDED.priority_weighting, \
                 last_heartbeat = NOW()",
        )
        .bind(cluster_url)
        .bind(max_concurrent_jobs)
        .bind(priority_weighting)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    /// Record a heartbeat, inserting the cluster with defaults when missing.
    pub async fn update_cluster_heartbeat(&self, cluster_url: &str) -> Result<(), ScaleOdmError> {
        sqlx::query(
            "INSERT INTO scaleodm_clusters (cluster_url, max_concurrent_jobs, priority_weighting, last_heartbeat) \
             VALUES ($1, 10, 10, NOW()) \
             ON CONFLICT (cluster_url) DO UPDATE SET last_heartbeat = NOW()",
        )
        .bind(cluster_url)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    /// Return `(max_concurrent_jobs, active_jobs)` for a cluster, where a job
    /// counts as active while claimed or running. Errors when the cluster is
    /// unknown.
    pub async fn get_cluster_capacity(
        &self,
        cluster_url: &str,
    ) -> Result<(i32, i64), ScaleOdmError> {
        let row: Option<(i32, i64)> = sqlx::query_as(
            "SELECT c.max_concurrent_jobs, COUNT(j.id) AS active_jobs \
             FROM scaleodm_clusters c \
             LEFT JOIN scaleodm_job_metadata j \
                 ON j.cluster_url = c.cluster_url \
                 AND j.job_status IN ('claimed', 'running') \
             WHERE c.cluster_url = $1 \
             GROUP BY c.max_concurrent_jobs",
        )
        .bind(cluster_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.ok_or_else(|| ScaleOdmError::Store {
            reason: format!("cluster not found: {cluster_url}"),
        })
    }
}
