//! Application state shared across all handlers.

use crate::config::AppConfig;
use crate::orchestrator::TaskOrchestrator;
use scaleodm_s3::{BrokerConfig, CredentialBroker, ObjectStorage};
use scaleodm_storage::MetadataStore;
use scaleodm_workflows::WorkflowEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TaskOrchestrator>,
    pub store: MetadataStore,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire the collaborators together. The store, engine, and S3 client are
    /// process-wide and safe for concurrent use; nothing else is shared.
    pub fn new(store: MetadataStore, engine: Arc<dyn WorkflowEngine>, config: AppConfig) -> Self {
        let config = Arc::new(config);

        let broker = CredentialBroker::new(BrokerConfig {
            access_key: config.s3_access_key.clone(),
            secret_key: config.s3_secret_key.clone(),
            sts_endpoint: config.s3_sts_endpoint.clone(),
            sts_role_arn: config.s3_sts_role_arn.clone(),
        });
        let storage = ObjectStorage::new(
            &config.s3_endpoint,
            &config.s3_access_key,
            &config.s3_secret_key,
            "us-east-1",
        );

        let orchestrator = Arc::new(TaskOrchestrator::new(
            store.clone(),
            engine,
            broker,
            storage,
            config.clone(),
        ));

        Self {
            orchestrator,
            store,
            config,
        }
    }
}
