//! Argo Workflow custom resource definitions.
//!
//! Only the fields the control plane reads or writes are modeled; everything
//! else passes through the API server untouched. Core container/volume types
//! come from `k8s-openapi` so the manifests serialize exactly as kubectl
//! would produce them.

use k8s_openapi::api::core::v1::{Container, Volume, VolumeMount};
use kube::CustomResource;
use scaleodm_models::WorkflowPhase;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spec of an `argoproj.io/v1alpha1` Workflow.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "Workflow",
    namespaced,
    status = "WorkflowStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<Template>,
}

/// A single workflow template. The ODM pipeline uses one template holding a
/// container set with a shared scratch volume.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_set: Option<ContainerSetTemplate>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSetTemplate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    pub containers: Vec<ContainerNode>,
}

/// A container within a container set, with explicit dependencies forming
/// the download → process → upload → cleanup chain.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContainerNode {
    #[serde(flatten)]
    pub container: Container,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// Observed state reported by the engine.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nodes: BTreeMap<String, NodeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources_duration: Option<BTreeMap<String, i64>>,
}

/// Per-node status; pod nodes carry the pod name in `id`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

/// The engine-assigned name of a workflow, empty before submission.
pub fn workflow_name(workflow: &Workflow) -> &str {
    workflow.metadata.name.as_deref().unwrap_or_default()
}

/// The current phase, `Unknown` when the engine has not reported one yet.
pub fn workflow_phase(workflow: &Workflow) -> WorkflowPhase {
    workflow
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(WorkflowPhase::parse)
        .unwrap_or(WorkflowPhase::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_deserializes_from_argo_shape() {
        let raw = serde_json::json!({
            "phase": "Running",
            "message": "child pending",
            "progress": "1/4",
            "nodes": {
                "odm-pipeline-abc12": {
                    "id": "odm-pipeline-abc12",
                    "name": "odm-pipeline-abc12",
                    "type": "Pod",
                    "phase": "Running"
                }
            },
            "resourcesDuration": {"cpu": 12, "memory": 34}
        });
        let status: WorkflowStatus = serde_json::from_value(raw).unwrap();
        assert_eq!(status.phase.as_deref(), Some("Running"));
        assert_eq!(status.nodes.len(), 1);
        assert_eq!(status.nodes["odm-pipeline-abc12"].node_type, "Pod");
        assert_eq!(status.resources_duration.unwrap()["cpu"], 12);
    }

    #[test]
    fn phase_helper_defaults_to_unknown() {
        let wf = Workflow::new("odm-pipeline-x", WorkflowSpec::default());
        assert_eq!(workflow_phase(&wf), WorkflowPhase::Unknown);
        assert_eq!(workflow_name(&wf), "odm-pipeline-x");
    }

    #[test]
    fn container_node_flattens_container_fields() {
        let node = ContainerNode {
            container: Container {
                name: "download".to_string(),
                image: Some("docker.io/rclone/rclone:1".to_string()),
                ..Default::default()
            },
            dependencies: vec![],
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["name"], "download");
        assert_eq!(json["image"], "docker.io/rclone/rclone:1");
        assert!(json.get("dependencies").is_none());
    }
}
