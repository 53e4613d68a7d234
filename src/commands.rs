//! One-shot CLI commands. Each prints JSON on stdout.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use flowhands_runtime::FlowRuntime;

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn parse_input(raw: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let input: Value = serde_json::from_str(raw)?;
    if !input.is_object() {
        return Err(format!("input must be a JSON object, got: {}", raw).into());
    }
    Ok(input)
}

pub(crate) fn list_flows(runtime: &FlowRuntime) -> Result<(), Box<dyn std::error::Error>> {
    let mut flows = runtime.list_flows();
    flows.sort_by(|a, b| a.id.cmp(&b.id));
    print_json(&flows)
}

pub(crate) async fn run_flow(
    runtime: &Arc<FlowRuntime>,
    flow_id: &str,
    input: &str,
    session: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let input = parse_input(input)?;
    let outcome = runtime.start(flow_id, input, session).await?;
    runtime.flush().await;
    print_json(&outcome)
}

pub(crate) async fn respond(
    runtime: &Arc<FlowRuntime>,
    workflow_id: &str,
    response: &str,
    operator: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = runtime.respond(workflow_id, response, operator).await?;
    runtime.flush().await;
    print_json(&outcome)
}

pub(crate) async fn status(
    runtime: &Arc<FlowRuntime>,
    run_id: &str,
    steps: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let run = runtime.get_run_status(run_id).await?;
    let mut value = serde_json::to_value(&run)?;
    if steps {
        let steps = runtime.get_run_steps(run_id).await?;
        value["steps"] = serde_json::to_value(&steps)?;
    }
    print_json(&value)
}
