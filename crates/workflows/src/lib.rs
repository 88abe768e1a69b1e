//! Workflow engine integration: the Argo Workflow resource model, the
//! pipeline builder, and the engine client used by the orchestrator.

pub mod builder;
pub mod engine;
pub mod resource;
pub mod scripts;

pub use builder::{template_for, PipelineConfig, PipelineTemplate, StandardPipeline};
pub use engine::{ArgoEngine, WatchError, WorkflowEngine};
pub use resource::{
    workflow_name, workflow_phase, ContainerNode, ContainerSetTemplate, NodeStatus, Template,
    Workflow, WorkflowSpec, WorkflowStatus,
};
