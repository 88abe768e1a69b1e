//! The workflow engine client.
//!
//! `WorkflowEngine` is the seam the orchestrator talks through; `ArgoEngine`
//! is the one concrete implementation, speaking to Argo Workflows through the
//! Kubernetes API. Tests substitute an in-memory fake.

use crate::resource::{workflow_name, workflow_phase, Workflow};
use anyhow::Context;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, ListParams, LogParams, PostParams, WatchEvent, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use scaleodm_models::ScaleOdmError;
use std::fmt::Write as _;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Deadline for control-plane calls against the engine.
const ENGINE_TIMEOUT: Duration = Duration::from_secs(10);
/// Submission carries the full manifest and may be slower under admission load.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
/// Pause before re-establishing a prematurely closed watch.
const WATCH_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Label Argo puts on every pod belonging to a workflow.
const WORKFLOW_POD_LABEL: &str = "workflows.argoproj.io/workflow";

/// Error from the watch path, carrying the freshest state when the watch was
/// interrupted by cancellation.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("watch canceled before the workflow reached a terminal phase")]
    Interrupted { last_seen: Option<Box<Workflow>> },
    #[error(transparent)]
    Engine(#[from] ScaleOdmError),
}

/// Operations the orchestrator needs from the workflow engine.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Submit a workflow; returns it with the engine-assigned name.
    async fn submit(&self, workflow: Workflow) -> Result<Workflow, ScaleOdmError>;

    async fn get(&self, name: &str) -> Result<Workflow, ScaleOdmError>;

    async fn list(&self) -> Result<Vec<Workflow>, ScaleOdmError>;

    async fn delete(&self, name: &str) -> Result<(), ScaleOdmError>;

    /// Concatenated console output of the workflow's pods, with one header
    /// per pod and per container. Per-container failures are reported inline.
    async fn pod_logs(&self, workflow: &Workflow) -> Result<String, ScaleOdmError>;

    /// Block until the workflow reaches a terminal phase, reconnecting when
    /// the engine's watch channel closes early. On cancellation a last-chance
    /// fetch runs and the freshest state rides along with the error.
    async fn watch_until_terminal(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Workflow, WatchError>;
}

/// Argo Workflows client backed by the Kubernetes API.
#[derive(Clone)]
pub struct ArgoEngine {
    workflows: Api<Workflow>,
    pods: Api<Pod>,
    namespace: String,
}

impl ArgoEngine {
    /// Connect using the kubeconfig at `kubeconfig_path`, or the in-cluster
    /// service account when the path is empty.
    pub async fn connect(kubeconfig_path: &str, namespace: &str) -> anyhow::Result<Self> {
        let config = if kubeconfig_path.is_empty() {
            Config::incluster().context("in-cluster Kubernetes config unavailable")?
        } else {
            let kubeconfig = Kubeconfig::read_from(kubeconfig_path)
                .with_context(|| format!("failed to read kubeconfig at {kubeconfig_path}"))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("failed to build Kubernetes config from kubeconfig")?
        };
        let client = Client::try_from(config).context("failed to create Kubernetes client")?;
        info!(namespace = namespace, "connected to workflow engine");

        Ok(Self {
            workflows: Api::namespaced(client.clone(), namespace),
            pods: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn fetch(&self, name: &str) -> Result<Workflow, ScaleOdmError> {
        let result = tokio::time::timeout(ENGINE_TIMEOUT, self.workflows.get(name))
            .await
            .map_err(|_| timeout_error("get workflow"))?;
        result.map_err(|e| engine_error(name, e))
    }

    /// Append one pod's per-container logs, headers included. Stream failures
    /// are recorded inline and skipped so one broken container never hides
    /// the rest of the output.
    async fn append_pod_logs(&self, pod_name: &str, node_name: &str, out: &mut String) {
        let _ = writeln!(out, "\n=== Logs for node: {node_name} ===");

        let pod = match self.pods.get(pod_name).await {
            Ok(pod) => pod,
            Err(e) => {
                let _ = writeln!(out, "Warning: failed to get pod {pod_name}: {e}");
                return;
            }
        };

        let containers = pod
            .spec
            .map(|spec| spec.containers)
            .unwrap_or_default();
        for container in containers {
            let _ = writeln!(out, "\n--- Container: {} ---", container.name);
            let params = LogParams {
                container: Some(container.name.clone()),
                ..Default::default()
            };
            match self.pods.logs(pod_name, &params).await {
                Ok(logs) => out.push_str(&logs),
                Err(e) => {
                    let _ = writeln!(
                        out,
                        "Warning: failed to get logs for container {}: {e}",
                        container.name
                    );
                }
            }
        }
    }

    /// One last get after cancellation so callers see the freshest state.
    async fn interrupted(&self, name: &str) -> WatchError {
        let last_seen = self.fetch(name).await.ok().map(Box::new);
        WatchError::Interrupted { last_seen }
    }
}

#[async_trait]
impl WorkflowEngine for ArgoEngine {
    async fn submit(&self, mut workflow: Workflow) -> Result<Workflow, ScaleOdmError> {
        workflow.metadata.namespace = Some(self.namespace.clone());
        let created = tokio::time::timeout(
            SUBMIT_TIMEOUT,
            self.workflows.create(&PostParams::default(), &workflow),
        )
        .await
        .map_err(|_| timeout_error("submit workflow"))?
        .map_err(|e| ScaleOdmError::Engine {
            reason: format!("failed to create workflow: {e}"),
        })?;

        info!(workflow = workflow_name(&created), "submitted workflow");
        Ok(created)
    }

    async fn get(&self, name: &str) -> Result<Workflow, ScaleOdmError> {
        self.fetch(name).await
    }

    async fn list(&self) -> Result<Vec<Workflow>, ScaleOdmError> {
        let result = tokio::time::timeout(
            ENGINE_TIMEOUT,
            self.workflows.list(&ListParams::default()),
        )
        .await
        .map_err(|_| timeout_error("list workflows"))?;

        result
            .map(|list| list.items)
            .map_err(|e| ScaleOdmError::Engine {
                reason: format!("failed to list workflows: {e}"),
            })
    }

    async fn delete(&self, name: &str) -> Result<(), ScaleOdmError> {
        let result = tokio::time::timeout(
            ENGINE_TIMEOUT,
            self.workflows.delete(name, &DeleteParams::default()),
        )
        .await
        .map_err(|_| timeout_error("delete workflow"))?;

        result.map(|_| ()).map_err(|e| engine_error(name, e))
    }

    async fn pod_logs(&self, workflow: &Workflow) -> Result<String, ScaleOdmError> {
        let name = workflow_name(workflow);
        let mut out = String::new();

        let params = ListParams::default().labels(&format!("{WORKFLOW_POD_LABEL}={name}"));
        let mut pods = self
            .pods
            .list(&params)
            .await
            .map_err(|e| ScaleOdmError::Engine {
                reason: format!("failed to list workflow pods: {e}"),
            })?
            .items;

        if !pods.is_empty() {
            pods.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
            for pod in &pods {
                let pod_name = pod.metadata.name.as_deref().unwrap_or_default();
                self.append_pod_logs(pod_name, pod_name, &mut out).await;
            }
            return Ok(out);
        }

        // No labelled pods returned; fall back to the node list the engine
        // recorded on the workflow status.
        if let Some(status) = &workflow.status {
            for (node_name, node) in &status.nodes {
                if node.node_type != "Pod" {
                    continue;
                }
                self.append_pod_logs(&node.id, node_name, &mut out).await;
            }
        }

        Ok(out)
    }

    async fn watch_until_terminal(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Workflow, WatchError> {
        let mut last_seen = self.fetch(name).await?;
        if workflow_phase(&last_seen).is_terminal() {
            return Ok(last_seen);
        }

        let params = WatchParams::default().fields(&format!("metadata.name={name}"));
        loop {
            if cancel.is_cancelled() {
                return Err(self.interrupted(name).await);
            }

            let mut stream = self
                .workflows
                .watch(&params, "0")
                .await
                .map_err(|e| WatchError::Engine(engine_error(name, e)))?
                .boxed();

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(self.interrupted(name).await),
                    event = stream.try_next() => match event {
                        Ok(Some(WatchEvent::Added(wf) | WatchEvent::Modified(wf))) => {
                            if workflow_phase(&wf).is_terminal() {
                                return Ok(wf);
                            }
                        }
                        Ok(Some(WatchEvent::Deleted(_))) => {
                            return Err(WatchError::Engine(ScaleOdmError::WorkflowNotFound {
                                name: name.to_string(),
                            }));
                        }
                        Ok(Some(_)) => {}
                        Ok(None) => break,
                        Err(e) => {
                            warn!(workflow = name, error = %e, "watch stream error, reconnecting");
                            break;
                        }
                    }
                }
            }

            // The watch channel closed early. Confirm the current state, then
            // reconnect after a short pause.
            match self.fetch(name).await {
                Ok(wf) if workflow_phase(&wf).is_terminal() => return Ok(wf),
                Ok(wf) => last_seen = wf,
                Err(e) => return Err(WatchError::Engine(e)),
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(WatchError::Interrupted {
                        last_seen: Some(Box::new(last_seen.clone())),
                    });
                }
                _ = tokio::time::sleep(WATCH_RECONNECT_DELAY) => {}
            }
        }
    }
}

fn timeout_error(operation: &str) -> ScaleOdmError {
    ScaleOdmError::EngineUnavailable {
        reason: format!("timed out waiting for the workflow engine ({operation})"),
    }
}

/// Translate a Kubernetes API error, distinguishing a missing workflow from
/// every other engine failure.
fn engine_error(name: &str, err: kube::Error) -> ScaleOdmError {
    match err {
        kube::Error::Api(ref response) if response.code == 404 => ScaleOdmError::WorkflowNotFound {
            name: name.to_string(),
        },
        other => ScaleOdmError::Engine {
            reason: other.to_string(),
        },
    }
}
