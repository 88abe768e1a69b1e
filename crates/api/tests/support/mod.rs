//! Shared test support: an in-memory workflow engine standing in for Argo.
#![allow(dead_code)]

use async_trait::async_trait;
use scaleodm_models::ScaleOdmError;
use scaleodm_workflows::{
    workflow_name, workflow_phase, WatchError, Workflow, WorkflowEngine, WorkflowStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// In-memory engine: workflows live in a map, phases are set by the test.
#[derive(Default)]
pub struct FakeEngine {
    workflows: Mutex<HashMap<String, Workflow>>,
    logs: Mutex<HashMap<String, String>>,
    counter: AtomicU64,
    pub fail_submit: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_phase(&self, name: &str, phase: &str, message: Option<&str>) {
        let mut workflows = self.workflows.lock().unwrap();
        let workflow = workflows.get_mut(name).expect("unknown workflow");
        let status = workflow.status.get_or_insert_with(WorkflowStatus::default);
        status.phase = Some(phase.to_string());
        status.message = message.map(str::to_string);
    }

    pub fn set_logs(&self, name: &str, logs: &str) {
        self.logs.lock().unwrap().insert(name.to_string(), logs.to_string());
    }

    /// Simulate the engine garbage-collecting a workflow.
    pub fn reap(&self, name: &str) {
        self.workflows.lock().unwrap().remove(name);
    }

    pub fn workflow_count(&self) -> usize {
        self.workflows.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkflowEngine for FakeEngine {
    async fn submit(&self, mut workflow: Workflow) -> Result<Workflow, ScaleOdmError> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(ScaleOdmError::Engine {
                reason: "submit rejected by test".to_string(),
            });
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let prefix = workflow
            .metadata
            .generate_name
            .clone()
            .unwrap_or_else(|| "odm-pipeline-".to_string());
        let name = format!("{prefix}{n:05}");
        workflow.metadata.name = Some(name.clone());
        workflow.status = Some(WorkflowStatus {
            phase: Some("Pending".to_string()),
            ..Default::default()
        });

        self.workflows.lock().unwrap().insert(name, workflow.clone());
        Ok(workflow)
    }

    async fn get(&self, name: &str) -> Result<Workflow, ScaleOdmError> {
        self.workflows
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ScaleOdmError::WorkflowNotFound {
                name: name.to_string(),
            })
    }

    async fn list(&self) -> Result<Vec<Workflow>, ScaleOdmError> {
        Ok(self.workflows.lock().unwrap().values().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<(), ScaleOdmError> {
        self.workflows
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ScaleOdmError::WorkflowNotFound {
                name: name.to_string(),
            })
    }

    async fn pod_logs(&self, workflow: &Workflow) -> Result<String, ScaleOdmError> {
        let name = workflow_name(workflow);
        Ok(self
            .logs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_else(|| format!("=== Logs for node: {name} ===\n")))
    }

    async fn watch_until_terminal(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Workflow, WatchError> {
        loop {
            if cancel.is_cancelled() {
                let last_seen = self.get(name).await.ok().map(Box::new);
                return Err(WatchError::Interrupted { last_seen });
            }
            let workflow = self.get(name).await.map_err(WatchError::Engine)?;
            if workflow_phase(&workflow).is_terminal() {
                return Ok(workflow);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
