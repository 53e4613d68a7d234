use super::*;

use serde_json::json;

use flowhands_store::open_store;

use crate::test_flows;

fn runtime() -> FlowRuntime {
    FlowRuntime::in_memory(test_flows::registry())
}

async fn wait_for_status(runtime: &FlowRuntime, run_id: &str, status: RunStatus) -> RunRecord {
    for _ in 0..100 {
        runtime.flush().await;
        let run = runtime.get_run_status(run_id).await.unwrap();
        if run.status == status {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("run {} never reached {}", run_id, status);
}

#[tokio::test]
async fn test_start_echo() {
    let runtime = runtime();
    let outcome = runtime
        .start("echo_flow", json!({"name": "Ada"}), None)
        .await
        .unwrap();
    assert_eq!(outcome.status(), "completed");
    assert_eq!(outcome.result(), Some(&json!("Hello, Ada")));

    let run = runtime.get_run_status(outcome.run_id()).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.flow_id, "echo_flow");
    assert_eq!(run.input, json!({"name": "Ada"}));
    assert_eq!(run.metadata.get("total_steps"), Some(&json!(2)));

    let steps = runtime.get_run_steps(outcome.run_id()).await.unwrap();
    let indices: Vec<u32> = steps.iter().map(|s| s.step_index).collect();
    assert_eq!(indices, vec![0, 1]);
}

#[tokio::test]
async fn test_unknown_flow() {
    let runtime = runtime();
    let err = runtime.start("nope", json!({}), None).await.unwrap_err();
    assert!(matches!(err, FlowError::UnknownFlow(id) if id == "nope"));
}

#[tokio::test]
async fn test_unknown_run() {
    let runtime = runtime();
    assert!(matches!(
        runtime.get_run_status("missing").await,
        Err(FlowError::RunNotFound(_))
    ));
    assert!(matches!(
        runtime.get_run_steps("missing").await,
        Err(FlowError::RunNotFound(_))
    ));
}

#[tokio::test]
async fn test_missing_input_fails_run() {
    let runtime = runtime();
    let outcome = runtime.start("echo_flow", json!({}), None).await.unwrap();
    match outcome {
        RunOutcome::Failed { error, .. } => assert!(error.contains("name")),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_confirm_yes() {
    let runtime = runtime();
    let outcome = runtime
        .start("confirm_flow", json!({"operator": "alice"}), None)
        .await
        .unwrap();
    let descriptor = outcome.suspension().unwrap().clone();
    assert_eq!(descriptor.operator, "alice");

    let resumed = runtime
        .respond(&descriptor.workflow_id, "yes", Some("alice"))
        .await
        .unwrap();
    assert_eq!(resumed.result(), Some(&json!("Proceeded")));
    assert_eq!(resumed.run_id(), descriptor.run_id);

    let run = runtime.get_run_status(&descriptor.run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    let steps = runtime.get_run_steps(&descriptor.run_id).await.unwrap();
    let names: Vec<&str> = steps.iter().map(|s| s.step_name.as_str()).collect();
    assert_eq!(names, vec!["ask", "decide"]);
    assert_eq!(steps[1].step_index, 1);

    let record = runtime.suspension(&descriptor.workflow_id).await.unwrap();
    assert_eq!(record.status, SuspensionStatus::Completed);
}

#[tokio::test]
async fn test_confirm_no_without_operator() {
    let runtime = runtime();
    let outcome = runtime.start("confirm_flow", json!({}), None).await.unwrap();
    let descriptor = outcome.suspension().unwrap().clone();
    assert_eq!(descriptor.operator, "operator");

    let resumed = runtime
        .respond(&descriptor.workflow_id, "no", None)
        .await
        .unwrap();
    assert_eq!(resumed.result(), Some(&json!("Aborted")));
}

#[tokio::test]
async fn test_resuspend_issues_new_descriptor() {
    let runtime = runtime();
    let first = runtime
        .start("confirm_flow", json!({"operator": "alice"}), None)
        .await
        .unwrap()
        .suspension()
        .unwrap()
        .clone();

    let second = runtime
        .respond(&first.workflow_id, "again", None)
        .await
        .unwrap();
    let second = second.suspension().unwrap().clone();
    assert_ne!(second.workflow_id, first.workflow_id);
    assert_eq!(second.run_id, first.run_id);
    assert_eq!(second.prompt, "Really proceed?");
    assert_eq!(second.operator, "alice");

    let run = runtime.get_run_status(&first.run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::HitlPending);

    // The first descriptor has been consumed.
    let stale = runtime
        .respond(&first.workflow_id, "yes", None)
        .await
        .unwrap_err();
    assert!(matches!(stale, FlowError::NotSuspended { .. }));

    let done = runtime
        .respond(&second.workflow_id, "yes", None)
        .await
        .unwrap();
    assert_eq!(done.result(), Some(&json!("Proceeded")));
}

#[tokio::test]
async fn test_operator_mismatch() {
    let runtime = runtime();
    let descriptor = runtime
        .start("confirm_flow", json!({"operator": "alice"}), None)
        .await
        .unwrap()
        .suspension()
        .unwrap()
        .clone();

    let err = runtime
        .respond(&descriptor.workflow_id, "yes", Some("mallory"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FlowError::SuspensionMismatch { ref expected, ref actual }
            if expected == "alice" && actual == "mallory"
    ));

    // Still answerable by the right operator.
    let record = runtime.suspension(&descriptor.workflow_id).await.unwrap();
    assert_eq!(record.status, SuspensionStatus::PendingInput);
}

#[tokio::test]
async fn test_respond_unknown_workflow() {
    let runtime = runtime();
    let err = runtime.respond("missing", "yes", None).await.unwrap_err();
    assert!(matches!(err, FlowError::SuspensionNotFound(_)));
}

#[tokio::test]
async fn test_resume_from_snapshot() {
    let runtime = runtime();
    let descriptor = runtime
        .start("confirm_flow", json!({"operator": "alice"}), None)
        .await
        .unwrap()
        .suspension()
        .unwrap()
        .clone();

    let outcome = runtime
        .resume(&descriptor.snapshot, "yes", "alice", None)
        .await
        .unwrap();
    assert_eq!(outcome.result(), Some(&json!("Proceeded")));

    // A finished run cannot be resumed again.
    let err = runtime
        .resume(&descriptor.snapshot, "yes", "alice", None)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::NotSuspended { .. }));
}

#[tokio::test]
async fn test_resume_consumes_suspension_record() {
    let runtime = runtime();
    let descriptor = runtime
        .start("confirm_flow", json!({"operator": "alice"}), None)
        .await
        .unwrap()
        .suspension()
        .unwrap()
        .clone();

    runtime
        .resume(&descriptor.snapshot, "yes", "alice", None)
        .await
        .unwrap();
    let record = runtime.suspension(&descriptor.workflow_id).await.unwrap();
    assert_eq!(record.status, SuspensionStatus::Completed);

    let err = runtime
        .respond(&descriptor.workflow_id, "no", None)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::NotSuspended { .. }));
}

#[tokio::test]
async fn test_superseded_snapshot_rejected() {
    let runtime = runtime();
    let first = runtime
        .start("confirm_flow", json!({"operator": "alice"}), None)
        .await
        .unwrap()
        .suspension()
        .unwrap()
        .clone();

    let second = runtime
        .resume(&first.snapshot, "again", "alice", None)
        .await
        .unwrap()
        .suspension()
        .unwrap()
        .clone();
    assert_ne!(second.workflow_id, first.workflow_id);

    // The run is parked again, but on the second suspension.
    let err = runtime
        .resume(&first.snapshot, "yes", "alice", None)
        .await
        .unwrap_err();
    match err {
        FlowError::NotSuspended { workflow_id, status } => {
            assert_eq!(workflow_id, first.workflow_id);
            assert_eq!(status, "superseded");
        }
        other => panic!("unexpected error: {other}"),
    }
    let record = runtime.suspension(&second.workflow_id).await.unwrap();
    assert_eq!(record.status, SuspensionStatus::PendingInput);

    let done = runtime
        .resume(&second.snapshot, "yes", "alice", None)
        .await
        .unwrap();
    assert_eq!(done.result(), Some(&json!("Proceeded")));
}

#[tokio::test]
async fn test_resume_of_running_run_rejected() {
    let runtime = runtime();
    let descriptor = runtime
        .start("confirm_flow", json!({}), None)
        .await
        .unwrap()
        .suspension()
        .unwrap()
        .clone();

    let live = runtime
        .respond_stream(&descriptor.workflow_id, "again", None)
        .await
        .unwrap();
    runtime.flush().await;
    let run = runtime.get_run_status(&descriptor.run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Running);

    let err = runtime
        .resume(&descriptor.snapshot, "yes", "operator", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FlowError::NotSuspended { ref status, .. } if status == "running"
    ));

    let outcome = live.drain().await.unwrap();
    assert_eq!(outcome.status(), "suspended");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_respond_has_single_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flows.db");
    let runtime = FlowRuntime::new(
        test_flows::registry(),
        open_store(Some(path.as_path())).await,
        Arc::new(InMemoryMemoryProvider::new()),
        &Config::default(),
    );
    let descriptor = runtime
        .start("confirm_flow", json!({}), None)
        .await
        .unwrap()
        .suspension()
        .unwrap()
        .clone();

    let (yes, no) = tokio::join!(
        runtime.respond(&descriptor.workflow_id, "yes", None),
        runtime.respond(&descriptor.workflow_id, "no", None),
    );
    let (winner, loser) = match (yes, no) {
        (Ok(outcome), Err(e)) | (Err(e), Ok(outcome)) => (outcome, e),
        (yes, no) => panic!("expected exactly one winner, got {:?} and {:?}", yes, no),
    };
    assert_eq!(winner.status(), "completed");
    assert!(matches!(loser, FlowError::NotSuspended { .. }));

    let steps = runtime.get_run_steps(&descriptor.run_id).await.unwrap();
    let names: Vec<&str> = steps.iter().map(|s| s.step_name.as_str()).collect();
    assert_eq!(names, vec!["ask", "decide"]);
}

#[tokio::test]
async fn test_resume_foreign_snapshot_creates_run() {
    let origin = runtime();
    let descriptor = origin
        .start("confirm_flow", json!({}), None)
        .await
        .unwrap()
        .suspension()
        .unwrap()
        .clone();

    let other = runtime();
    let outcome = other
        .resume(&descriptor.snapshot, "yes", "operator", None)
        .await
        .unwrap();
    assert_eq!(outcome.result(), Some(&json!("Proceeded")));

    let run = other.get_run_status(&descriptor.run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.flow_id, "confirm_flow");
}

#[tokio::test]
async fn test_resume_invalid_snapshot() {
    let runtime = runtime();
    let err = runtime
        .resume(&json!({"bogus": true}), "yes", "operator", None)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::InvalidSnapshot(_)));
}

#[tokio::test]
async fn test_async_run_completes() {
    let runtime = Arc::new(runtime());
    let run_id = runtime
        .start_async("echo_flow", json!({"name": "Ada"}), None)
        .await
        .unwrap();

    let run = wait_for_status(&runtime, &run_id, RunStatus::Completed).await;
    assert_eq!(run.result, Some(json!("Hello, Ada")));
    assert_eq!(runtime.active_runs(), 0);
    assert!(!runtime.cancel(&run_id));
}

#[tokio::test]
async fn test_cancel_async_run() {
    let runtime = Arc::new(runtime());
    let run_id = runtime
        .start_async("slow_flow", json!({}), None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(runtime.cancel(&run_id));
    let run = wait_for_status(&runtime, &run_id, RunStatus::Cancelled).await;
    assert!(run.metadata.contains_key("cancelled_at_step"));
    assert!(run.result.is_none());

    let steps = runtime.get_run_steps(&run_id).await.unwrap();
    assert!(steps.len() < 7);
}

#[tokio::test]
async fn test_session_memory_and_clear() {
    let memory = Arc::new(InMemoryMemoryProvider::new());
    let runtime = FlowRuntime::new(
        test_flows::registry(),
        Arc::new(MemoryStore::new()),
        memory.clone(),
        &Config::default(),
    );

    runtime
        .start("echo_flow", json!({"name": "Ada"}), Some("s-1".to_string()))
        .await
        .unwrap();
    let handle = memory.get_handle("s-1", "echo_flow").await.unwrap();
    let contents: Vec<String> = handle
        .history()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["start", "greet"]);

    // No session, no memory.
    runtime
        .start("echo_flow", json!({"name": "Bob"}), None)
        .await
        .unwrap();
    assert_eq!(memory.len(), 1);

    assert!(runtime.clear_session("echo_flow", "s-1").await.unwrap());
    assert!(!runtime.clear_session("echo_flow", "s-1").await.unwrap());
    assert!(matches!(
        runtime.clear_session("nope", "s-1").await,
        Err(FlowError::UnknownFlow(_))
    ));
}

#[tokio::test]
async fn test_list_flows() {
    let runtime = runtime();
    let ids: Vec<String> = runtime.list_flows().into_iter().map(|f| f.id).collect();
    assert!(ids.contains(&"echo_flow".to_string()));
    assert!(ids.contains(&"confirm_flow".to_string()));
}

#[tokio::test]
async fn test_durable_resume_across_runtimes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flows.db");

    let descriptor = {
        let store = open_store(Some(path.as_path())).await;
        assert_eq!(store.id(), "sqlite");
        let runtime = FlowRuntime::new(
            test_flows::registry(),
            store,
            Arc::new(InMemoryMemoryProvider::new()),
            &Config::default(),
        );
        runtime
            .start("confirm_flow", json!({"operator": "alice"}), None)
            .await
            .unwrap()
            .suspension()
            .unwrap()
            .clone()
    };

    let runtime = FlowRuntime::new(
        test_flows::registry(),
        open_store(Some(path.as_path())).await,
        Arc::new(InMemoryMemoryProvider::new()),
        &Config::default(),
    );
    let outcome = runtime
        .respond(&descriptor.workflow_id, "yes", Some("alice"))
        .await
        .unwrap();
    assert_eq!(outcome.result(), Some(&json!("Proceeded")));

    let run = runtime.get_run_status(&descriptor.run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(runtime.get_run_steps(&descriptor.run_id).await.unwrap().len(), 2);
}
