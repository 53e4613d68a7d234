//! Story flows.
//!
//! `story_flow` researches a topic and writes an article. `story_critic_flow`
//! adds a critic that sends the article back for rewrites until it is
//! approved or [`MAX_ATTEMPTS`] drafts have been reviewed. The attempt
//! counter travels in the routing events, so the loop stays bounded without
//! any help from the scheduler.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use flowhands_core::context::StepContext;
use flowhands_core::flow::FlowDefinition;
use flowhands_core::graph::{FlowGraph, Step};
use flowhands_protocols::error::{DefinitionError, StepError};
use flowhands_protocols::event::{Event, EventKey, FlowEvent};
use flowhands_protocols::memory::MemoryMessage;
use flowhands_protocols::worker::{StepWorker, WorkerOutput, WorkerRequest};

use crate::workers::{EchoWorker, ScriptedWorker};

pub const STORY_FLOW: &str = "story_flow";
pub const STORY_CRITIC_FLOW: &str = "story_critic_flow";

/// Drafts the critic reviews before the best effort is returned.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoryEvent {
    ResearchComplete {
        topic: String,
        research: String,
    },
    ArticleWritten {
        topic: String,
        research: String,
        article: String,
        attempt: u32,
    },
    CriticFeedback {
        topic: String,
        research: String,
        article: String,
        feedback: String,
        attempt: u32,
    },
}

impl FlowEvent for StoryEvent {
    fn tag(&self) -> &'static str {
        match self {
            StoryEvent::ResearchComplete { .. } => "research_complete",
            StoryEvent::ArticleWritten { .. } => "article_written",
            StoryEvent::CriticFeedback { .. } => "critic_feedback",
        }
    }
}

const RESEARCH_COMPLETE: EventKey = EventKey::Flow("research_complete");
const ARTICLE_WRITTEN: EventKey = EventKey::Flow("article_written");
const CRITIC_FEEDBACK: EventKey = EventKey::Flow("critic_feedback");

/// Workers used by the story steps.
#[derive(Clone)]
pub struct StoryWorkers {
    pub research: Arc<dyn StepWorker>,
    pub writer: Arc<dyn StepWorker>,
    pub critic: Arc<dyn StepWorker>,
}

impl StoryWorkers {
    /// Deterministic workers that need no backend. The critic approves
    /// every draft.
    pub fn offline() -> Self {
        Self {
            research: Arc::new(EchoWorker::new("research")),
            writer: Arc::new(EchoWorker::new("writer")),
            critic: Arc::new(ScriptedWorker::new("critic").or_else(WorkerOutput::Structured(
                json!({"approved": true, "score": 8, "feedback": "Meets the guidelines"}),
            ))),
        }
    }
}

/// The critic's verdict on one draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub score: serde_json::Value,
    #[serde(default = "default_feedback")]
    pub feedback: String,
}

fn default_feedback() -> String {
    "No specific feedback provided".to_string()
}

impl Critique {
    /// Read a verdict from worker output. Text is searched for its outermost
    /// JSON object; anything unreadable counts as a rejection carrying the
    /// raw text as feedback.
    pub fn parse(output: WorkerOutput) -> Self {
        let text = match output {
            WorkerOutput::Structured(value) => {
                return serde_json::from_value(value.clone())
                    .unwrap_or_else(|_| Self::rejected(value.to_string()));
            }
            WorkerOutput::Text(text) => text,
        };
        let parsed = match (text.find('{'), text.rfind('}')) {
            (Some(start), Some(end)) if end > start => {
                serde_json::from_str::<Critique>(&text[start..=end]).ok()
            }
            _ => None,
        };
        parsed.unwrap_or_else(|| Self::rejected(text))
    }

    fn rejected(feedback: String) -> Self {
        Self {
            approved: false,
            score: json!(0),
            feedback,
        }
    }
}

async fn remember(ctx: &StepContext<'_>, role: &str, content: &str) -> Result<(), StepError> {
    if let Some(memory) = ctx.memory() {
        memory.put(MemoryMessage::new(role, content)).await?;
    }
    Ok(())
}

/// Invoke a worker in streaming mode, surfacing every chunk as progress.
async fn stream_text(
    worker: &dyn StepWorker,
    request: WorkerRequest,
    ctx: &mut StepContext<'_>,
) -> Result<String, StepError> {
    let mut chunks = worker.invoke_stream(request).await?;
    let mut text = String::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        ctx.write_event_to_stream("chunk", json!({ "text": chunk }));
        text.push_str(&chunk);
    }
    Ok(text)
}

fn request(ctx: &StepContext<'_>, prompt: String) -> WorkerRequest {
    WorkerRequest::new(prompt).with_session(ctx.session_id().map(str::to_string))
}

fn writing_prompt(topic: &str, research: &str) -> String {
    format!(
        "Write a news article about: {topic}\n\n\
         Research notes:\n{research}\n\n\
         Keep it under 500 words, use only facts from the notes, \
         and open with a headline."
    )
}

struct ResearchStep {
    worker: Arc<dyn StepWorker>,
}

#[async_trait]
impl Step<StoryEvent> for ResearchStep {
    fn name(&self) -> &str {
        "research"
    }

    fn accepts(&self) -> Vec<EventKey> {
        vec![EventKey::Start]
    }

    fn emits(&self) -> Vec<EventKey> {
        vec![RESEARCH_COMPLETE]
    }

    async fn run(
        &self,
        ctx: &mut StepContext<'_>,
        event: Event<StoryEvent>,
    ) -> Result<Vec<Event<StoryEvent>>, StepError> {
        let Event::Start(start) = event else {
            return Ok(vec![]);
        };
        let topic = start
            .input_str("topic")
            .ok_or_else(|| StepError::MissingInput("topic".to_string()))?
            .to_string();
        info!(run_id = %ctx.run_id(), %topic, "Researching topic");

        remember(ctx, "user", &topic).await?;
        let prompt = format!(
            "Research this topic for a news article: {topic}\n\n\
             Gather key facts, recent developments and relevant context."
        );
        let research = self
            .worker
            .invoke(request(ctx, prompt))
            .await?
            .into_text();
        remember(ctx, "assistant", &research).await?;

        ctx.write_event_to_stream(
            "research",
            json!({ "topic": topic, "research_length": research.chars().count() }),
        );
        Ok(vec![Event::Flow(StoryEvent::ResearchComplete { topic, research })])
    }
}

/// First draft. Either finishes the run or hands the draft to the critic.
struct WriteStep {
    worker: Arc<dyn StepWorker>,
    reviewed: bool,
}

#[async_trait]
impl Step<StoryEvent> for WriteStep {
    fn name(&self) -> &str {
        "write"
    }

    fn accepts(&self) -> Vec<EventKey> {
        vec![RESEARCH_COMPLETE]
    }

    fn emits(&self) -> Vec<EventKey> {
        if self.reviewed {
            vec![ARTICLE_WRITTEN]
        } else {
            vec![EventKey::Stop]
        }
    }

    async fn run(
        &self,
        ctx: &mut StepContext<'_>,
        event: Event<StoryEvent>,
    ) -> Result<Vec<Event<StoryEvent>>, StepError> {
        let Event::Flow(StoryEvent::ResearchComplete { topic, research }) = event else {
            return Ok(vec![]);
        };
        let prompt = writing_prompt(&topic, &research);
        let article = stream_text(self.worker.as_ref(), request(ctx, prompt), ctx).await?;
        remember(ctx, "assistant", &article).await?;

        ctx.write_event_to_stream(
            "article",
            json!({ "topic": topic, "article_length": article.chars().count(), "attempt": 1 }),
        );
        if !self.reviewed {
            return Ok(vec![Event::stop(article)]);
        }
        Ok(vec![Event::Flow(StoryEvent::ArticleWritten {
            topic,
            research,
            article,
            attempt: 1,
        })])
    }
}

struct RewriteStep {
    worker: Arc<dyn StepWorker>,
}

#[async_trait]
impl Step<StoryEvent> for RewriteStep {
    fn name(&self) -> &str {
        "rewrite"
    }

    fn accepts(&self) -> Vec<EventKey> {
        vec![CRITIC_FEEDBACK]
    }

    fn emits(&self) -> Vec<EventKey> {
        vec![ARTICLE_WRITTEN]
    }

    async fn run(
        &self,
        ctx: &mut StepContext<'_>,
        event: Event<StoryEvent>,
    ) -> Result<Vec<Event<StoryEvent>>, StepError> {
        let Event::Flow(StoryEvent::CriticFeedback {
            topic,
            research,
            article,
            feedback,
            attempt,
        }) = event
        else {
            return Ok(vec![]);
        };
        let attempt = attempt + 1;
        debug!(run_id = %ctx.run_id(), attempt, "Rewriting article");

        let prompt = format!(
            "Rewrite this news article to address the editor's feedback.\n\n\
             Current article:\n{article}\n\n\
             Feedback:\n{feedback}\n\n{}",
            writing_prompt(&topic, &research)
        );
        let article = stream_text(self.worker.as_ref(), request(ctx, prompt), ctx).await?;
        remember(ctx, "assistant", &article).await?;

        ctx.write_event_to_stream(
            "article",
            json!({ "topic": topic, "article_length": article.chars().count(), "attempt": attempt }),
        );
        Ok(vec![Event::Flow(StoryEvent::ArticleWritten {
            topic,
            research,
            article,
            attempt,
        })])
    }
}

struct CritiqueStep {
    worker: Arc<dyn StepWorker>,
}

#[async_trait]
impl Step<StoryEvent> for CritiqueStep {
    fn name(&self) -> &str {
        "critique"
    }

    fn accepts(&self) -> Vec<EventKey> {
        vec![ARTICLE_WRITTEN]
    }

    fn emits(&self) -> Vec<EventKey> {
        vec![EventKey::Stop, CRITIC_FEEDBACK]
    }

    async fn run(
        &self,
        ctx: &mut StepContext<'_>,
        event: Event<StoryEvent>,
    ) -> Result<Vec<Event<StoryEvent>>, StepError> {
        let Event::Flow(StoryEvent::ArticleWritten {
            topic,
            research,
            article,
            attempt,
        }) = event
        else {
            return Ok(vec![]);
        };

        let prompt = format!(
            "Review this article against the editorial guidelines.\n\n\
             Research notes:\n{research}\n\nArticle:\n{article}\n\n\
             Respond with JSON: {{\"approved\": bool, \"score\": 1-10, \"feedback\": \"...\"}}"
        );
        let critique = Critique::parse(self.worker.invoke(request(ctx, prompt)).await?);
        info!(
            run_id = %ctx.run_id(),
            approved = critique.approved,
            score = %critique.score,
            attempt,
            "Article reviewed"
        );

        if critique.approved {
            ctx.write_event_to_stream(
                "critique",
                json!({ "status": "approved", "attempt": attempt, "score": critique.score }),
            );
            return Ok(vec![Event::stop(json!({
                "article": article,
                "attempts": attempt,
                "approved": true,
                "score": critique.score,
            }))]);
        }

        if attempt >= MAX_ATTEMPTS {
            warn!(run_id = %ctx.run_id(), attempt, "Attempt budget spent, returning best effort");
            ctx.write_event_to_stream(
                "critique",
                json!({
                    "status": "max_attempts_reached",
                    "attempt": attempt,
                    "score": critique.score,
                    "feedback": critique.feedback,
                }),
            );
            return Ok(vec![Event::stop(json!({
                "article": article,
                "attempts": attempt,
                "approved": false,
                "score": critique.score,
                "final_feedback": critique.feedback,
            }))]);
        }

        ctx.write_event_to_stream(
            "critique",
            json!({
                "status": "rejected",
                "attempt": attempt,
                "score": critique.score,
                "feedback": critique.feedback,
            }),
        );
        Ok(vec![Event::Flow(StoryEvent::CriticFeedback {
            topic,
            research,
            article,
            feedback: critique.feedback,
            attempt,
        })])
    }
}

pub fn story_flow(workers: &StoryWorkers) -> Result<FlowDefinition<StoryEvent>, DefinitionError> {
    let graph = FlowGraph::builder(STORY_FLOW)
        .step(ResearchStep {
            worker: Arc::clone(&workers.research),
        })
        .step(WriteStep {
            worker: Arc::clone(&workers.writer),
            reviewed: false,
        })
        .build()?;
    Ok(FlowDefinition::new(
        graph,
        "Researches a topic and writes a news article about it",
    ))
}

pub fn story_critic_flow(
    workers: &StoryWorkers,
) -> Result<FlowDefinition<StoryEvent>, DefinitionError> {
    let graph = FlowGraph::builder(STORY_CRITIC_FLOW)
        .step(ResearchStep {
            worker: Arc::clone(&workers.research),
        })
        .step(WriteStep {
            worker: Arc::clone(&workers.writer),
            reviewed: true,
        })
        .step(CritiqueStep {
            worker: Arc::clone(&workers.critic),
        })
        .step(RewriteStep {
            worker: Arc::clone(&workers.writer),
        })
        .build()?;
    Ok(FlowDefinition::new(
        graph,
        "Researches a topic, writes an article and revises it on critic feedback, \
         at most three drafts",
    ))
}

#[cfg(test)]
#[path = "story_tests.rs"]
mod tests;
