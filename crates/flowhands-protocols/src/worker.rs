//! Step worker capability.
//!
//! A step reaches language-model or tool backends through this trait. The
//! runtime never looks inside; a worker may call a model, a calculator or
//! nothing at all.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// Stream of incremental text chunks.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, WorkerError>> + Send>>;

/// Request handed to a worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub prompt: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl WorkerRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        self.args = args;
        self
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }
}

/// Worker output: free text or a structured result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum WorkerOutput {
    Text(String),
    Structured(serde_json::Value),
}

impl WorkerOutput {
    /// Render the output as text. Structured values are JSON-encoded.
    pub fn into_text(self) -> String {
        match self {
            WorkerOutput::Text(text) => text,
            WorkerOutput::Structured(value) => value.to_string(),
        }
    }
}

#[async_trait]
pub trait StepWorker: Send + Sync {
    /// Returns the worker ID.
    fn id(&self) -> &str;

    /// Run the worker to completion.
    async fn invoke(&self, request: WorkerRequest) -> Result<WorkerOutput, WorkerError>;

    /// Streaming variant. Defaults to a single chunk holding the full output.
    async fn invoke_stream(&self, request: WorkerRequest) -> Result<TextStream, WorkerError> {
        let text = self.invoke(request).await?.into_text();
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct Upper;

    #[async_trait]
    impl StepWorker for Upper {
        fn id(&self) -> &str {
            "upper"
        }

        async fn invoke(&self, request: WorkerRequest) -> Result<WorkerOutput, WorkerError> {
            Ok(WorkerOutput::Text(request.prompt.to_uppercase()))
        }
    }

    #[tokio::test]
    async fn test_default_stream_yields_one_chunk() {
        let worker = Upper;
        let chunks: Vec<_> = worker
            .invoke_stream(WorkerRequest::new("hello"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap(), "HELLO");
    }

    #[test]
    fn test_structured_into_text() {
        let output = WorkerOutput::Structured(serde_json::json!({"approved": true}));
        assert_eq!(output.into_text(), r#"{"approved":true}"#);
    }
}
