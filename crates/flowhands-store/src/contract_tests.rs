//! Behavior every store must share. Each check runs against the in-memory
//! store and the SQLite store.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use flowhands_protocols::error::PersistenceError;
use flowhands_protocols::record::{
    RunRecord, RunStatus, StatusUpdate, StepCompletion, StepRecord, StepStatus, SuspensionRecord,
    SuspensionStatus,
};
use flowhands_protocols::store::{FlowStore, RunStore, SuspensionStore};

use crate::{MemoryStore, SqliteStore};

fn completion(run_id: &str, step_index: u32, duration_ms: u64) -> StepCompletion {
    StepCompletion {
        run_id: run_id.to_string(),
        step_index,
        event_type: "step_completed".to_string(),
        event_data: json!({"emitted": ["stop"]}),
        completed_at: Utc::now(),
        duration_ms,
    }
}

fn suspension(workflow_id: &str, run_id: &str) -> SuspensionRecord {
    let now = Utc::now();
    SuspensionRecord {
        workflow_id: workflow_id.to_string(),
        run_id: run_id.to_string(),
        flow_id: "confirm_flow".to_string(),
        session_id: Some("s-1".to_string()),
        prompt: "Proceed? (yes/no)".to_string(),
        operator: "operator".to_string(),
        snapshot: json!({"version": 1, "flow": "confirm_flow", "state": {}}),
        status: SuspensionStatus::PendingInput,
        created_at: now,
        updated_at: now,
    }
}

async fn check_run_lifecycle(store: &dyn FlowStore) {
    let run = RunRecord::new("echo_flow", Some("s-1".to_string()), json!({"name": "Ada"}));
    store.create_run(&run).await.unwrap();
    assert!(matches!(
        store.create_run(&run).await,
        Err(PersistenceError::Duplicate(_))
    ));

    let stored = store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Pending);
    assert_eq!(stored.input, json!({"name": "Ada"}));
    assert_eq!(stored.session_id.as_deref(), Some("s-1"));

    store
        .update_run_status(&run.id, &StatusUpdate::new(RunStatus::Running))
        .await
        .unwrap();
    store
        .update_run_status(&run.id, &StatusUpdate::new(RunStatus::HitlPending))
        .await
        .unwrap();
    let parked = store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(parked.status, RunStatus::HitlPending);
    assert!(parked.completed_at.is_none());

    store
        .update_run_status(
            &run.id,
            &StatusUpdate::completed(json!("Hello, Ada")).with_metadata("total_steps", json!(2)),
        )
        .await
        .unwrap();
    let done = store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(done.status, RunStatus::Completed);
    assert_eq!(done.result, Some(json!("Hello, Ada")));
    assert!(done.completed_at.is_some());
    assert_eq!(done.metadata["total_steps"], 2);

    let err = store
        .update_run_status(&run.id, &StatusUpdate::new(RunStatus::Cancelled))
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidTransition { .. }));

    assert!(store.get_run("missing").await.unwrap().is_none());
    assert!(matches!(
        store
            .update_run_status("missing", &StatusUpdate::new(RunStatus::Running))
            .await,
        Err(PersistenceError::NotFound(_))
    ));
}

async fn check_failed_and_cancelled(store: &dyn FlowStore) {
    let failed = RunRecord::new("echo_flow", None, json!({}));
    store.create_run(&failed).await.unwrap();
    store
        .update_run_status(&failed.id, &StatusUpdate::failed("Missing input: name"))
        .await
        .unwrap();
    let stored = store.get_run(&failed.id).await.unwrap().unwrap();
    assert_eq!(stored.error.as_deref(), Some("Missing input: name"));
    assert!(stored.completed_at.is_some());
    assert!(stored.result.is_none());

    let cancelled = RunRecord::new("echo_flow", None, json!({}));
    store.create_run(&cancelled).await.unwrap();
    store
        .update_run_status(
            &cancelled.id,
            &StatusUpdate::new(RunStatus::Cancelled).with_metadata("cancelled_at_step", json!(3)),
        )
        .await
        .unwrap();
    let stored = store.get_run(&cancelled.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Cancelled);
    assert!(stored.completed_at.is_none());
    assert_eq!(stored.metadata["cancelled_at_step"], 3);
}

async fn check_steps(store: &dyn FlowStore) {
    let run_id = "run-steps";
    store
        .append_step(&StepRecord::started(run_id, "greet", 1, "step_started", json!({})))
        .await
        .unwrap();
    store
        .append_step(&StepRecord::started(run_id, "start", 0, "step_started", json!({"step": "start"})))
        .await
        .unwrap();
    assert!(matches!(
        store
            .append_step(&StepRecord::started(run_id, "again", 1, "step_started", json!({})))
            .await,
        Err(PersistenceError::Duplicate(_))
    ));

    store.complete_step(&completion(run_id, 0, 5)).await.unwrap();
    assert!(matches!(
        store.complete_step(&completion(run_id, 7, 1)).await,
        Err(PersistenceError::NotFound(_))
    ));

    let steps = store.list_steps(run_id).await.unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].step_name, "start");
    assert_eq!(steps[0].status, StepStatus::Completed);
    assert_eq!(steps[0].duration_ms, Some(5));
    assert_eq!(steps[0].event_data, json!({"emitted": ["stop"]}));
    assert!(steps[0].completed_at.is_some());
    assert_eq!(steps[1].step_name, "greet");
    assert_eq!(steps[1].status, StepStatus::Started);
    assert!(steps[1].duration_ms.is_none());

    assert!(store.list_steps("unknown").await.unwrap().is_empty());
}

async fn check_suspensions(store: &dyn FlowStore) {
    let record = suspension("wf-1", "run-1");
    store.save_suspension(&record).await.unwrap();

    let stored = store.get_suspension("wf-1").await.unwrap().unwrap();
    assert_eq!(stored.prompt, "Proceed? (yes/no)");
    assert_eq!(stored.snapshot, record.snapshot);
    assert_eq!(stored.status, SuspensionStatus::PendingInput);

    store
        .update_suspension_status("wf-1", SuspensionStatus::Completed)
        .await
        .unwrap();
    let stored = store.get_suspension("wf-1").await.unwrap().unwrap();
    assert_eq!(stored.status, SuspensionStatus::Completed);
    assert!(stored.updated_at >= stored.created_at);

    assert!(matches!(
        store
            .update_suspension_status("wf-missing", SuspensionStatus::Expired)
            .await,
        Err(PersistenceError::NotFound(_))
    ));

    let mut replaced = suspension("wf-1", "run-2");
    replaced.prompt = "Approve?".to_string();
    store.save_suspension(&replaced).await.unwrap();
    let stored = store.get_suspension("wf-1").await.unwrap().unwrap();
    assert_eq!(stored.run_id, "run-2");
    assert_eq!(stored.status, SuspensionStatus::PendingInput);

    assert!(store.delete_suspension("wf-1").await.unwrap());
    assert!(!store.delete_suspension("wf-1").await.unwrap());
    assert!(store.get_suspension("wf-1").await.unwrap().is_none());
}

async fn check_claims(store: &dyn FlowStore) {
    store
        .save_suspension(&suspension("wf-claim", "run-1"))
        .await
        .unwrap();

    assert!(store.claim_suspension("wf-claim").await.unwrap());
    assert!(!store.claim_suspension("wf-claim").await.unwrap());
    let stored = store.get_suspension("wf-claim").await.unwrap().unwrap();
    assert_eq!(stored.status, SuspensionStatus::Completed);

    // Only pending records can be claimed.
    store
        .save_suspension(&suspension("wf-failed", "run-1"))
        .await
        .unwrap();
    store
        .update_suspension_status("wf-failed", SuspensionStatus::Failed)
        .await
        .unwrap();
    assert!(!store.claim_suspension("wf-failed").await.unwrap());
    let stored = store.get_suspension("wf-failed").await.unwrap().unwrap();
    assert_eq!(stored.status, SuspensionStatus::Failed);

    assert!(!store.claim_suspension("wf-missing").await.unwrap());
}

async fn check_all(store: &dyn FlowStore) {
    check_run_lifecycle(store).await;
    check_failed_and_cancelled(store).await;
    check_steps(store).await;
    check_suspensions(store).await;
    check_claims(store).await;
}

#[tokio::test]
async fn test_memory_store_contract() {
    let store = MemoryStore::new();
    check_all(&store).await;
}

#[tokio::test]
async fn test_sqlite_in_memory_contract() {
    let store = SqliteStore::in_memory().await.unwrap();
    check_all(&store).await;
}

#[tokio::test]
async fn test_sqlite_file_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("flows.db")).await.unwrap();
    check_all(&store).await;
}

#[tokio::test]
async fn test_sqlite_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flows.db");

    let run = RunRecord::new("confirm_flow", None, json!({}));
    {
        let store = SqliteStore::open(&path).await.unwrap();
        store.create_run(&run).await.unwrap();
        store
            .update_run_status(&run.id, &StatusUpdate::new(RunStatus::HitlPending))
            .await
            .unwrap();
        store
            .append_step(&StepRecord::started(&run.id, "ask", 0, "step_started", json!({})))
            .await
            .unwrap();
        store
            .save_suspension(&suspension("wf-9", &run.id))
            .await
            .unwrap();
    }

    let store = SqliteStore::open(&path).await.unwrap();
    let stored = store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::HitlPending);
    assert_eq!(store.list_steps(&run.id).await.unwrap().len(), 1);
    let parked = store.get_suspension("wf-9").await.unwrap().unwrap();
    assert_eq!(parked.run_id, run.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_claim_has_single_winner() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("flows.db")).await.unwrap());
    store
        .save_suspension(&suspension("wf-race", "run-1"))
        .await
        .unwrap();

    let claims: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.claim_suspension("wf-race").await.unwrap() })
        })
        .collect();
    let mut winners = 0;
    for claim in claims {
        if claim.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
