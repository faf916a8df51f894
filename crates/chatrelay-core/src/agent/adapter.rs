//! Agent stream adapter
//!
//! The agent itself is an opaque collaborator behind [`AgentInvoker`]: given a
//! request it produces a stream of `{content?, tool_calls?}` chunks. The
//! [`AgentStreamAdapter`] turns that into a stream of [`Fragment`]s that always
//! ends with exactly one terminal fragment (`Done` or `Failure`).

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// One chunk of agent output as produced by the agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<serde_json::Value>>,
}

impl AgentChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    pub fn tool_call(call: serde_json::Value) -> Self {
        Self {
            content: None,
            tool_calls: Some(vec![call]),
        }
    }

    /// Split the chunk into fragments: the text delta first, then one
    /// fragment per tool call. Empty text and null tool calls yield nothing.
    pub fn into_fragments(self) -> Vec<Fragment> {
        let mut fragments = Vec::new();

        if let Some(text) = self.content.filter(|t| !t.is_empty()) {
            fragments.push(Fragment::ContentDelta(text));
        }

        for call in self.tool_calls.unwrap_or_default() {
            match call {
                serde_json::Value::Null => {}
                serde_json::Value::String(raw) => fragments.push(Fragment::ToolFragment(raw)),
                other => fragments.push(Fragment::ToolFragment(other.to_string())),
            }
        }

        fragments
    }
}

/// Stream of chunks returned by an agent invocation
pub type ChunkStream = BoxStream<'static, Result<AgentChunk>>;

/// Incremental unit of agent output, before wire encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Newly produced text, not yet accumulated
    ContentDelta(String),
    /// Opaque tool payload (JSON text or plain text)
    ToolFragment(String),
    /// The invocation finished normally
    Done,
    /// The invocation failed
    Failure(String),
}

impl Fragment {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failure(_))
    }
}

/// Stream of fragments for a single invocation
pub type FragmentStream = BoxStream<'static, Fragment>;

/// An agent that can be invoked with a user request
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Start one invocation. Dropping the returned stream abandons it.
    async fn invoke(&self, request: &str, session_id: &str) -> Result<ChunkStream>;
}

/// Wraps an [`AgentInvoker`] and normalizes its output into fragments
#[derive(Clone)]
pub struct AgentStreamAdapter {
    invoker: Arc<dyn AgentInvoker>,
}

impl AgentStreamAdapter {
    pub fn new(invoker: Arc<dyn AgentInvoker>) -> Self {
        Self { invoker }
    }

    pub fn agent_name(&self) -> &'static str {
        self.invoker.name()
    }

    /// Invoke the agent and return its fragment stream.
    ///
    /// Never fails: a failed invocation becomes a stream holding a single
    /// `Failure` fragment.
    pub async fn open(&self, request: &str, session_id: &str) -> FragmentStream {
        debug!(
            "Invoking agent {} for session {}",
            self.invoker.name(),
            session_id
        );
        match self.invoker.invoke(request, session_id).await {
            Ok(chunks) => Self::fragments(chunks),
            Err(e) => {
                warn!("Agent {} failed to start: {}", self.invoker.name(), e);
                stream::once(async move { Fragment::Failure(e.to_string()) }).boxed()
            }
        }
    }

    /// Flatten chunks into fragments and append the terminal fragment.
    pub fn fragments(chunks: ChunkStream) -> FragmentStream {
        let state = (chunks, VecDeque::new(), false);
        stream::unfold(state, |(mut chunks, mut pending, mut finished)| async move {
            loop {
                if let Some(fragment) = pending.pop_front() {
                    return Some((fragment, (chunks, pending, finished)));
                }
                if finished {
                    return None;
                }
                match chunks.next().await {
                    Some(Ok(chunk)) => pending.extend(chunk.into_fragments()),
                    Some(Err(e)) => {
                        pending.push_back(Fragment::Failure(e.to_string()));
                        finished = true;
                    }
                    None => {
                        pending.push_back(Fragment::Done);
                        finished = true;
                    }
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, Error};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn chunk_stream(items: Vec<Result<AgentChunk>>) -> ChunkStream {
        stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn test_fragments_end_with_done() {
        let chunks = chunk_stream(vec![
            Ok(AgentChunk::text("He")),
            Ok(AgentChunk::text("")),
            Ok(AgentChunk::text("llo")),
        ]);

        let fragments: Vec<_> = AgentStreamAdapter::fragments(chunks).collect().await;
        assert_eq!(
            fragments,
            vec![
                Fragment::ContentDelta("He".to_string()),
                Fragment::ContentDelta("llo".to_string()),
                Fragment::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_only_chunk_and_mid_stream_failure() {
        let chunks = chunk_stream(vec![
            Ok(AgentChunk::tool_call(json!({"name": "swap"}))),
            Err(Error::Agent(AgentError::InvocationFailed("rate limited".to_string()))),
            Ok(AgentChunk::text("never seen")),
        ]);

        let fragments: Vec<_> = AgentStreamAdapter::fragments(chunks).collect().await;
        assert_eq!(fragments.len(), 2);
        assert_eq!(
            fragments[0],
            Fragment::ToolFragment(r#"{"name":"swap"}"#.to_string())
        );
        match &fragments[1] {
            Fragment::Failure(reason) => assert!(reason.contains("rate limited")),
            other => panic!("Expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_chunk_with_text_and_tool_calls() {
        let chunk = AgentChunk {
            content: Some("Swapping".to_string()),
            tool_calls: Some(vec![json!("done"), serde_json::Value::Null]),
        };
        assert_eq!(
            chunk.into_fragments(),
            vec![
                Fragment::ContentDelta("Swapping".to_string()),
                Fragment::ToolFragment("done".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_invocation_yields_single_failure() {
        let mut invoker = MockAgentInvoker::new();
        invoker.expect_name().return_const("mock");
        invoker.expect_invoke().returning(|_, _| {
            Err(Error::Agent(AgentError::StartFailed("no such agent".to_string())))
        });

        let adapter = AgentStreamAdapter::new(Arc::new(invoker));
        let fragments: Vec<_> = adapter.open("hi", "s1").await.collect().await;
        assert_eq!(fragments.len(), 1);
        assert!(matches!(&fragments[0], Fragment::Failure(r) if r.contains("no such agent")));
    }
}
