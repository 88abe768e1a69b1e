//! End-to-end orchestrator scenarios against the in-memory engine and a real
//! PostgreSQL. Skipped when `SCALEODM_TEST_DATABASE_URL` is unset.

mod support;

use scaleodm_api::{AppConfig, TaskOrchestrator};
use scaleodm_models::{JobStatus, ScaleOdmError, TaskNewRequest};
use scaleodm_s3::{BrokerConfig, CredentialBroker, ObjectStorage};
use scaleodm_storage::MetadataStore;
use scaleodm_workflows::WorkflowEngine;
use std::sync::Arc;
use support::FakeEngine;

const CLUSTER_URL: &str = "http://localhost:31100";

fn test_config(database_url: &str, with_env_creds: bool) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        s3_endpoint: "http://localhost:9000".to_string(),
        s3_access_key: if with_env_creds { "env-key".into() } else { String::new() },
        s3_secret_key: if with_env_creds { "env-secret".into() } else { String::new() },
        s3_sts_endpoint: String::new(),
        s3_sts_role_arn: String::new(),
        odm_image: "docker.io/opendronemap/odm:3.5.6".to_string(),
        cluster_url: CLUSTER_URL.to_string(),
        namespace: "argo".to_string(),
        kubeconfig_path: String::new(),
    }
}

async fn setup(with_env_creds: bool) -> Option<(Arc<FakeEngine>, TaskOrchestrator, MetadataStore)> {
    let url = std::env::var("SCALEODM_TEST_DATABASE_URL").ok()?;
    let store = MetadataStore::connect(&url).await.expect("connect failed");
    store.init_schema().await.expect("schema init failed");
    store
        .init_local_cluster_record(CLUSTER_URL)
        .await
        .expect("cluster record failed");

    let config = Arc::new(test_config(&url, with_env_creds));
    let engine = Arc::new(FakeEngine::new());
    let broker = CredentialBroker::new(BrokerConfig {
        access_key: config.s3_access_key.clone(),
        secret_key: config.s3_secret_key.clone(),
        sts_endpoint: String::new(),
        sts_role_arn: String::new(),
    });
    let storage = ObjectStorage::new(
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
        "us-east-1",
    );

    let orchestrator = TaskOrchestrator::new(
        store.clone(),
        engine.clone(),
        broker,
        storage,
        config,
    );
    Some((engine, orchestrator, store))
}

fn submission() -> TaskNewRequest {
    TaskNewRequest {
        name: Some("p".to_string()),
        read_s3_path: Some("s3://b/in".to_string()),
        options: Some("[{\"name\":\"fast-orthophoto\",\"value\":true}]".to_string()),
        s3_access_key_id: Some("k".to_string()),
        s3_secret_access_key: Some("s".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn happy_path_submission() {
    let Some((engine, orchestrator, store)) = setup(true).await else { return };

    let response = orchestrator.submit(submission()).await.unwrap();
    assert!(response.uuid.starts_with("odm-pipeline-"));

    let job = store.get_job(&response.uuid).await.unwrap().unwrap();
    assert_eq!(job.job_status, JobStatus::Queued);
    assert_eq!(job.read_s3_path, "s3://b/in/");
    assert_eq!(job.write_s3_path, "s3://b/in/output/");
    assert_eq!(job.odm_flags, vec!["--fast-orthophoto"]);
    assert_eq!(job.cluster_url, CLUSTER_URL);

    // One workflow exists in the engine under the same name.
    assert!(engine.get(&response.uuid).await.is_ok());

    orchestrator.remove(&response.uuid).await.unwrap();
}

#[tokio::test]
async fn submission_without_options_uses_default_flags() {
    let Some((_, orchestrator, store)) = setup(true).await else { return };

    let mut request = submission();
    request.options = None;
    let response = orchestrator.submit(request).await.unwrap();

    let job = store.get_job(&response.uuid).await.unwrap().unwrap();
    assert_eq!(job.odm_flags, vec!["--fast-orthophoto"]);

    orchestrator.remove(&response.uuid).await.unwrap();
}

#[tokio::test]
async fn info_survives_engine_garbage_collection() {
    let Some((engine, orchestrator, _store)) = setup(true).await else { return };
    let uuid = orchestrator.submit(submission()).await.unwrap().uuid;

    engine.reap(&uuid);

    let info = orchestrator.info(&uuid, 0).await.unwrap();
    assert_eq!(info.status.code, 10);
    assert_eq!(info.images_count, 0);
    assert_eq!(info.options.len(), 1);
    assert_eq!(info.options[0].name, "fast-orthophoto");
    assert_eq!(info.options[0].value, serde_json::json!(true));
    assert_eq!(info.name, "p");

    // Reaped workflows disappear from list but stay readable via info.
    let listed = orchestrator.list(None).await.unwrap();
    assert!(!listed.iter().any(|t| t.uuid == uuid));
}

#[tokio::test]
async fn info_reconciles_engine_phase() {
    let Some((engine, orchestrator, store)) = setup(true).await else { return };
    let uuid = orchestrator.submit(submission()).await.unwrap().uuid;

    engine.set_phase(&uuid, "Running", None);
    let info = orchestrator.info(&uuid, 0).await.unwrap();
    assert_eq!(info.status.code, 20);
    assert_eq!(info.progress, 50);

    let job = store.get_job(&uuid).await.unwrap().unwrap();
    assert_eq!(job.job_status, JobStatus::Running);
    let started_at = job.started_at.expect("started_at should be set");

    engine.set_phase(&uuid, "Succeeded", None);
    let info = orchestrator.info(&uuid, 0).await.unwrap();
    assert_eq!(info.status.code, 40);
    assert_eq!(info.progress, 100);
    assert!(info.processing_time >= 0);

    let job = store.get_job(&uuid).await.unwrap().unwrap();
    assert_eq!(job.job_status, JobStatus::Completed);
    assert!(job.completed_at.is_some());
    // First transition into running owns the timestamp forever.
    assert_eq!(job.started_at, Some(started_at));

    orchestrator.remove(&uuid).await.unwrap();
}

#[tokio::test]
async fn failed_workflow_records_engine_message() {
    let Some((engine, orchestrator, store)) = setup(true).await else { return };
    let uuid = orchestrator.submit(submission()).await.unwrap().uuid;

    engine.set_phase(&uuid, "Error", Some("image pull backoff"));
    let info = orchestrator.info(&uuid, 0).await.unwrap();
    assert_eq!(info.status.code, 30);

    let job = store.get_job(&uuid).await.unwrap().unwrap();
    assert_eq!(job.job_status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("image pull backoff"));

    orchestrator.remove(&uuid).await.unwrap();
}

#[tokio::test]
async fn cancel_then_remove() {
    let Some((engine, orchestrator, store)) = setup(true).await else { return };
    let uuid = orchestrator.submit(submission()).await.unwrap().uuid;

    let response = orchestrator.cancel(&uuid).await.unwrap();
    assert!(response.success);
    assert!(matches!(
        engine.get(&uuid).await,
        Err(ScaleOdmError::WorkflowNotFound { .. })
    ));

    let job = store.get_job(&uuid).await.unwrap().unwrap();
    assert_eq!(job.job_status, JobStatus::Failed);

    // In-process cancellations surface as CANCELED on the wire.
    let info = orchestrator.info(&uuid, 0).await.unwrap();
    assert_eq!(info.status.code, 50);

    // Canceling again is a 404: the engine object is gone.
    assert!(matches!(
        orchestrator.cancel(&uuid).await,
        Err(ScaleOdmError::WorkflowNotFound { .. })
    ));

    let response = orchestrator.remove(&uuid).await.unwrap();
    assert!(response.success);
    assert!(store.get_job(&uuid).await.unwrap().is_none());

    // A second remove is a not-found error.
    assert!(matches!(
        orchestrator.remove(&uuid).await,
        Err(ScaleOdmError::TaskNotFound { .. })
    ));
}

#[tokio::test]
async fn rejected_submissions_create_nothing() {
    let Some((engine, orchestrator, _store)) = setup(true).await else { return };
    let before = engine.workflow_count();

    let mut http_zip = TaskNewRequest::default();
    http_zip.zipurl = Some("https://example.com/x.zip".to_string());
    http_zip.s3_access_key_id = Some("k".to_string());
    http_zip.s3_secret_access_key = Some("s".to_string());
    assert!(matches!(
        orchestrator.submit(http_zip).await,
        Err(ScaleOdmError::Validation { .. })
    ));

    let mut bad_options = submission();
    bad_options.options = Some("not json".to_string());
    assert!(matches!(
        orchestrator.submit(bad_options).await,
        Err(ScaleOdmError::Validation { .. })
    ));

    assert_eq!(engine.workflow_count(), before);
}

#[tokio::test]
async fn submission_without_credentials_fails() {
    let Some((engine, orchestrator, _store)) = setup(false).await else { return };
    let before = engine.workflow_count();

    let mut request = submission();
    request.s3_access_key_id = None;
    request.s3_secret_access_key = None;
    assert!(matches!(
        orchestrator.submit(request).await,
        Err(ScaleOdmError::CredentialMissing { .. })
    ));
    assert_eq!(engine.workflow_count(), before);
}

#[tokio::test]
async fn engine_submit_failure_writes_no_metadata() {
    let Some((engine, orchestrator, store)) = setup(true).await else { return };
    let project = format!("p-{}", uuid::Uuid::new_v4().simple());

    engine
        .fail_submit
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let mut request = submission();
    request.name = Some(project.clone());
    assert!(matches!(
        orchestrator.submit(request).await,
        Err(ScaleOdmError::Engine { .. })
    ));

    let jobs = store.list_jobs(None, Some(&project), None).await.unwrap();
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn restart_reuses_stored_flags() {
    let Some((engine, orchestrator, store)) = setup(true).await else { return };
    let uuid = orchestrator.submit(submission()).await.unwrap().uuid;

    let response = orchestrator.restart(&uuid, None).await.unwrap();
    assert!(response.success);

    // The old identity is gone; a fresh workflow carries the same flags.
    assert!(store.get_job(&uuid).await.unwrap().is_none());
    let replacement = engine
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|wf| scaleodm_workflows::workflow_name(&wf).to_string())
        .find(|name| name != &uuid)
        .expect("replacement workflow should exist");

    let job = store.get_job(&replacement).await.unwrap().unwrap();
    assert_eq!(job.odm_flags, vec!["--fast-orthophoto"]);
    assert_eq!(job.job_status, JobStatus::Queued);

    orchestrator.remove(&replacement).await.unwrap();
}

#[tokio::test]
async fn output_streams_pod_logs_while_engine_knows_the_workflow() {
    let Some((engine, orchestrator, _store)) = setup(true).await else { return };
    let uuid = orchestrator.submit(submission()).await.unwrap().uuid;

    engine.set_logs(&uuid, "line zero\nline one\nline two");
    let output = orchestrator.output(&uuid, 0).await.unwrap();
    assert_eq!(output, "line zero\nline one\nline two");

    // line=N returns only lines [N, end).
    let output = orchestrator.output(&uuid, 2).await.unwrap();
    assert_eq!(output, "line two");

    let info = orchestrator.info(&uuid, 1).await.unwrap();
    assert_eq!(
        info.output,
        Some(vec!["line one".to_string(), "line two".to_string()])
    );

    orchestrator.remove(&uuid).await.unwrap();
}

#[tokio::test]
async fn line_cursor_at_or_past_the_end_returns_everything() {
    let Some((engine, orchestrator, _store)) = setup(true).await else { return };
    let uuid = orchestrator.submit(submission()).await.unwrap().uuid;

    engine.set_logs(&uuid, "line zero\nline one\nline two");

    // Three segments; a cursor at or past the count leaves the output whole.
    let output = orchestrator.output(&uuid, 3).await.unwrap();
    assert_eq!(output, "line zero\nline one\nline two");
    let output = orchestrator.output(&uuid, 10).await.unwrap();
    assert_eq!(output, "line zero\nline one\nline two");

    // On info the field stays unset instead.
    let info = orchestrator.info(&uuid, 3).await.unwrap();
    assert!(info.output.is_none());
    let info = orchestrator.info(&uuid, 10).await.unwrap();
    assert!(info.output.is_none());

    orchestrator.remove(&uuid).await.unwrap();
}

#[tokio::test]
async fn trailing_newline_counts_as_a_segment() {
    let Some((engine, orchestrator, _store)) = setup(true).await else { return };
    let uuid = orchestrator.submit(submission()).await.unwrap().uuid;

    // "line zero\nline one\n" splits into three segments, the last empty.
    engine.set_logs(&uuid, "line zero\nline one\n");

    let output = orchestrator.output(&uuid, 2).await.unwrap();
    assert_eq!(output, "");
    let output = orchestrator.output(&uuid, 3).await.unwrap();
    assert_eq!(output, "line zero\nline one\n");

    let info = orchestrator.info(&uuid, 2).await.unwrap();
    assert_eq!(info.output, Some(vec![String::new()]));
    let info = orchestrator.info(&uuid, 3).await.unwrap();
    assert!(info.output.is_none());

    orchestrator.remove(&uuid).await.unwrap();
}

#[tokio::test]
async fn output_for_unknown_task_is_not_found() {
    let Some((_, orchestrator, _)) = setup(true).await else { return };
    assert!(matches!(
        orchestrator.output("odm-pipeline-missing", 0).await,
        Err(ScaleOdmError::TaskNotFound { .. })
    ));
}
