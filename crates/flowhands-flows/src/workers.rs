//! Offline step workers.
//!
//! The built-in flows run without a model backend. [`EchoWorker`] turns the
//! prompt into deterministic text, [`ScriptedWorker`] replays canned answers.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;

use flowhands_protocols::error::WorkerError;
use flowhands_protocols::worker::{StepWorker, TextStream, WorkerOutput, WorkerRequest};

/// Answers with the first line of the prompt, prefixed by the worker id.
///
/// Streams its answer word by word.
pub struct EchoWorker {
    id: String,
}

impl EchoWorker {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    fn answer(&self, request: &WorkerRequest) -> String {
        let headline = request.prompt.lines().next().unwrap_or_default().trim();
        format!("[{}] {}", self.id, headline)
    }
}

#[async_trait]
impl StepWorker for EchoWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, request: WorkerRequest) -> Result<WorkerOutput, WorkerError> {
        Ok(WorkerOutput::Text(self.answer(&request)))
    }

    async fn invoke_stream(&self, request: WorkerRequest) -> Result<TextStream, WorkerError> {
        let answer = self.answer(&request);
        let mut chunks = Vec::new();
        for (i, word) in answer.split(' ').enumerate() {
            let chunk = if i == 0 { word.to_string() } else { format!(" {}", word) };
            chunks.push(Ok(chunk));
        }
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// Replays queued outputs in order, then repeats the fallback.
///
/// Every prompt it receives is recorded.
pub struct ScriptedWorker {
    id: String,
    script: Mutex<VecDeque<WorkerOutput>>,
    fallback: Option<WorkerOutput>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedWorker {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, output: WorkerOutput) -> Self {
        self.script.lock().push_back(output);
        self
    }

    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.then(WorkerOutput::Text(text.into()))
    }

    pub fn or_else(mut self, output: WorkerOutput) -> Self {
        self.fallback = Some(output);
        self
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl StepWorker for ScriptedWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, request: WorkerRequest) -> Result<WorkerOutput, WorkerError> {
        self.prompts.lock().push(request.prompt);
        if let Some(output) = self.script.lock().pop_front() {
            return Ok(output);
        }
        self.fallback
            .clone()
            .ok_or_else(|| WorkerError::Unavailable(format!("{}: script exhausted", self.id)))
    }
}
