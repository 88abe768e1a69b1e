//! Read-path reconciliation of engine state into the metadata store.
//!
//! Errors here are logged and swallowed. The metadata row is authoritative
//! for clients; a reconciliation hiccup must never fail a read.

use scaleodm_models::WorkflowPhase;
use scaleodm_storage::MetadataStore;
use scaleodm_workflows::{workflow_name, workflow_phase, Workflow};
use std::collections::BTreeMap;
use tracing::warn;

/// Pull the workflow's phase and annotations into the metadata row.
pub async fn reconcile_workflow(store: &MetadataStore, workflow: &Workflow) {
    let name = workflow_name(workflow);
    let phase = workflow_phase(workflow);
    let status = phase.job_status();

    let error_message = match phase {
        WorkflowPhase::Failed | WorkflowPhase::Error => workflow
            .status
            .as_ref()
            .and_then(|s| s.message.clone()),
        _ => None,
    };

    if let Err(e) = store
        .update_job_status(name, status, error_message.as_deref())
        .await
    {
        warn!(workflow = name, error = %e, "failed to reconcile job status");
    }

    let annotations = engine_annotations(workflow);
    if annotations.is_empty() {
        return;
    }
    if let Err(e) = store.update_job_metadata(name, &annotations).await {
        warn!(workflow = name, error = %e, "failed to persist engine annotations");
    }
}

fn engine_annotations(workflow: &Workflow) -> BTreeMap<String, serde_json::Value> {
    let mut annotations = BTreeMap::new();

    if let Some(namespace) = &workflow.metadata.namespace {
        annotations.insert("argo_namespace".to_string(), serde_json::json!(namespace));
    }
    if let Some(uid) = &workflow.metadata.uid {
        annotations.insert("argo_uid".to_string(), serde_json::json!(uid));
    }
    if let Some(status) = &workflow.status {
        if let Some(progress) = &status.progress {
            annotations.insert("progress".to_string(), serde_json::json!(progress));
        }
        if let Some(duration) = &status.resources_duration {
            annotations.insert("resources_duration".to_string(), serde_json::json!(duration));
        }
    }

    annotations
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaleodm_workflows::{WorkflowSpec, WorkflowStatus};

    #[test]
    fn annotations_capture_engine_details() {
        let mut workflow = Workflow::new("odm-pipeline-x", WorkflowSpec::default());
        workflow.metadata.namespace = Some("argo".to_string());
        workflow.metadata.uid = Some("uid-123".to_string());
        workflow.status = Some(WorkflowStatus {
            phase: Some("Running".to_string()),
            progress: Some("1/4".to_string()),
            resources_duration: Some([("cpu".to_string(), 12)].into_iter().collect()),
            ..Default::default()
        });

        let annotations = engine_annotations(&workflow);
        assert_eq!(annotations["argo_namespace"], serde_json::json!("argo"));
        assert_eq!(annotations["argo_uid"], serde_json::json!("uid-123"));
        assert_eq!(annotations["progress"], serde_json::json!("1/4"));
        assert!(annotations.contains_key("resources_duration"));
    }
}
