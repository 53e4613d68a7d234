//! Cooperative single-run driver.
//!
//! A [`RunDriver`] owns one run's context and advances it lazily: each call
//! to [`RunDriver::next`] does just enough work to produce the next
//! observable event. Events are routed strictly FIFO, one step invocation at
//! a time, so a run never executes a step concurrently with itself.
//!
//! States: `Idle -> Running -> {Suspended, Completed, Failed}`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use flowhands_protocols::error::{RunError, StepError};
use flowhands_protocols::event::{
    Event, FlowEvent, HumanResponseEvent, InputRequiredEvent, StartEvent,
};
use flowhands_protocols::observable::ObservableEvent;

use crate::context::{Context, Invocation, Resources};
use crate::graph::FlowGraph;

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
    Suspended,
    Completed,
    Failed,
}

/// A parked run: what the operator is asked and how to pick it back up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suspension {
    pub workflow_id: String,
    pub prompt: String,
    pub operator: String,
    pub snapshot: serde_json::Value,
}

/// How a driver finished.
#[derive(Debug, Clone, PartialEq)]
pub enum DriveResult {
    Completed(serde_json::Value),
    Suspended(Suspension),
    Failed(String),
}

pub struct RunDriver<E: FlowEvent> {
    graph: Arc<FlowGraph<E>>,
    ctx: Context<E>,
    timeout: Duration,
    state: DriverState,
    buffer: VecDeque<ObservableEvent>,
    outcome: Option<DriveResult>,
}

impl<E: FlowEvent> RunDriver<E> {
    /// Prepare a fresh run whose queue holds only the start event.
    pub fn start(
        graph: Arc<FlowGraph<E>>,
        run_id: impl Into<String>,
        input: serde_json::Value,
        session_id: Option<String>,
        resources: Resources,
        timeout: Duration,
    ) -> Self {
        let mut ctx = Context::new(run_id, session_id.clone());
        ctx.attach_resources(resources);
        ctx.enqueue(Event::Start(StartEvent { input, session_id }));
        Self::from_context(graph, ctx, timeout)
    }

    /// Restore a suspended run and inject the operator's response.
    ///
    /// The response goes to the head of the ready queue, right after the
    /// event that triggered the suspension. Invocations that were already
    /// resolved when the run parked still run first.
    pub fn resume(
        graph: Arc<FlowGraph<E>>,
        snapshot: &serde_json::Value,
        response: HumanResponseEvent,
        resources: Resources,
        timeout: Duration,
    ) -> Result<Self, RunError> {
        let mut ctx = Context::restore(graph.name(), snapshot)?;
        ctx.attach_resources(resources);
        ctx.enqueue_front(Event::HumanResponse(response));
        Ok(Self::from_context(graph, ctx, timeout))
    }

    pub fn from_context(graph: Arc<FlowGraph<E>>, ctx: Context<E>, timeout: Duration) -> Self {
        Self {
            graph,
            ctx,
            timeout,
            state: DriverState::Idle,
            buffer: VecDeque::new(),
            outcome: None,
        }
    }

    pub fn run_id(&self) -> &str {
        self.ctx.run_id()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn context(&self) -> &Context<E> {
        &self.ctx
    }

    /// Ordinal of the next step invocation; equals invocations so far.
    pub fn steps_invoked(&self) -> u32 {
        self.ctx.next_index()
    }

    pub fn outcome(&self) -> Option<&DriveResult> {
        self.outcome.as_ref()
    }

    pub fn take_outcome(&mut self) -> Option<DriveResult> {
        self.outcome.take()
    }

    /// Advance until the next observable event. `None` once the run has
    /// finished and every buffered event was handed out.
    pub async fn next(&mut self) -> Option<ObservableEvent> {
        loop {
            if let Some(event) = self.buffer.pop_front() {
                return Some(event);
            }
            if self.is_finished() {
                return None;
            }
            self.advance().await;
        }
    }

    /// Drive to the end, collecting every observable event.
    pub async fn run_to_end(&mut self) -> (Vec<ObservableEvent>, DriveResult) {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        let result = self
            .outcome
            .clone()
            .unwrap_or_else(|| DriveResult::Failed(RunError::NoTerminalEvent.to_string()));
        (events, result)
    }

    fn is_finished(&self) -> bool {
        matches!(
            self.state,
            DriverState::Suspended | DriverState::Completed | DriverState::Failed
        )
    }

    async fn advance(&mut self) {
        self.state = DriverState::Running;

        if self.ctx.active_ms >= self.timeout.as_millis() as u64 {
            self.fail(RunError::Timeout(self.timeout.as_secs()));
            return;
        }

        if let Some(invocation) = self.ctx.pending.pop_front() {
            self.invoke(invocation).await;
            return;
        }

        match self.ctx.queue.pop_front() {
            Some(Event::Stop(stop)) => {
                info!(run_id = %self.ctx.run_id(), "Run completed");
                self.buffer.push_back(ObservableEvent::Stopped {
                    result: stop.result.clone(),
                });
                self.outcome = Some(DriveResult::Completed(stop.result));
                self.state = DriverState::Completed;
            }
            Some(event) => {
                let key = event.key();
                let consumers = self.graph.resolve(key);
                if consumers.is_empty() {
                    self.fail(RunError::Undeliverable(key.to_string()));
                    return;
                }
                for &index in consumers {
                    if let Some(step) = self.graph.step(index) {
                        self.ctx.pending.push_back(Invocation {
                            step: step.name().to_string(),
                            event: event.clone(),
                        });
                    }
                }
            }
            None => self.fail(RunError::NoTerminalEvent),
        }
    }

    async fn invoke(&mut self, invocation: Invocation<E>) {
        let Some(position) = self.graph.index_of(&invocation.step) else {
            self.fail(RunError::InvalidSnapshot(format!(
                "unknown step '{}'",
                invocation.step
            )));
            return;
        };
        let Some(step) = self.graph.step(position).cloned() else {
            return;
        };

        let index = self.ctx.begin_invocation(&invocation.step);
        self.buffer.push_back(ObservableEvent::StepStarted {
            step: invocation.step.clone(),
            index,
            details: invocation.event.key().to_string(),
        });
        debug!(run_id = %self.ctx.run_id(), step = %invocation.step, index, "Invoking step");

        let budget = self
            .timeout
            .saturating_sub(Duration::from_millis(self.ctx.active_ms));
        let started = Instant::now();
        let (result, progress) = {
            let mut step_ctx = self.ctx.step_context(&invocation.step);
            let result =
                tokio::time::timeout(budget, step.run(&mut step_ctx, invocation.event)).await;
            (result, step_ctx.into_progress())
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        self.ctx.active_ms += duration_ms;
        self.buffer.extend(progress);

        let name = invocation.step;
        let events = match result {
            Err(_) => {
                self.push_completed(&name, index, "timeout", serde_json::json!({}), duration_ms);
                self.fail(RunError::Timeout(self.timeout.as_secs()));
                return;
            }
            Ok(Err(e)) => {
                self.push_completed(
                    &name,
                    index,
                    "failed",
                    serde_json::json!({ "error": e.to_string() }),
                    duration_ms,
                );
                self.fail(RunError::Step { step: name, source: e });
                return;
            }
            Ok(Ok(events)) => events,
        };

        if let Some(bad) = events.iter().find(|e| !self.graph.declares(position, e.key())) {
            let source = StepError::UndeclaredEvent {
                step: name.clone(),
                event: bad.key().to_string(),
            };
            self.push_completed(
                &name,
                index,
                "failed",
                serde_json::json!({ "error": source.to_string() }),
                duration_ms,
            );
            self.fail(RunError::Step { step: name, source });
            return;
        }

        let emitted: Vec<&'static str> = events.iter().map(|e| e.key().as_str()).collect();
        let mut request: Option<InputRequiredEvent> = None;
        for event in events {
            match event {
                Event::InputRequired(req) if request.is_none() => request = Some(req),
                Event::InputRequired(req) => {
                    warn!(step = %name, prompt = %req.prompt, "Ignoring extra input request");
                }
                other => self.ctx.enqueue(other),
            }
        }

        let status = if request.is_some() { "suspended" } else { "success" };
        self.push_completed(
            &name,
            index,
            status,
            serde_json::json!({ "emitted": emitted }),
            duration_ms,
        );

        if let Some(req) = request {
            self.suspend(req);
        }
    }

    fn push_completed(
        &mut self,
        step: &str,
        index: u32,
        status: &str,
        data: serde_json::Value,
        duration_ms: u64,
    ) {
        self.buffer.push_back(ObservableEvent::StepCompleted {
            step: step.to_string(),
            index,
            status: status.to_string(),
            data,
            duration_ms,
        });
    }

    fn suspend(&mut self, request: InputRequiredEvent) {
        let workflow_id = uuid::Uuid::new_v4().to_string();
        let snapshot = match self.ctx.suspension_snapshot(self.graph.name(), &workflow_id) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        info!(
            run_id = %self.ctx.run_id(),
            workflow_id = %workflow_id,
            operator = %request.operator,
            "Run suspended awaiting input"
        );

        self.buffer.push_back(ObservableEvent::InputRequired {
            prompt: request.prompt.clone(),
            operator: request.operator.clone(),
            workflow_id: workflow_id.clone(),
        });
        self.outcome = Some(DriveResult::Suspended(Suspension {
            workflow_id,
            prompt: request.prompt,
            operator: request.operator,
            snapshot,
        }));
        self.state = DriverState::Suspended;
    }

    fn fail(&mut self, error: RunError) {
        warn!(run_id = %self.ctx.run_id(), error = %error, "Run failed");
        self.outcome = Some(DriveResult::Failed(error.to_string()));
        self.state = DriverState::Failed;
    }
}
