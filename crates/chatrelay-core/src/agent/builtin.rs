//! Built-in agents that need no external process

use super::adapter::{AgentChunk, AgentInvoker, ChunkStream};
use crate::error::{AgentError, Error, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::time::Duration;

/// Demo agent that streams the request back word by word
pub struct EchoAgent {
    chunk_delay: Duration,
}

impl EchoAgent {
    pub fn new() -> Self {
        Self {
            chunk_delay: Duration::from_millis(50),
        }
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    fn reply_words(request: &str) -> Vec<String> {
        let reply = format!("You said: {}", request.trim());
        let mut words = Vec::new();
        for (i, word) in reply.split_whitespace().enumerate() {
            if i == 0 {
                words.push(word.to_string());
            } else {
                words.push(format!(" {}", word));
            }
        }
        words
    }
}

impl Default for EchoAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentInvoker for EchoAgent {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn invoke(&self, request: &str, _session_id: &str) -> Result<ChunkStream> {
        let delay = self.chunk_delay;
        let words = Self::reply_words(request);
        Ok(stream::iter(words)
            .then(move |word| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(AgentChunk::text(word))
            })
            .boxed())
    }
}

/// Agent that replays a fixed script, optionally ending in a failure
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    chunks: Vec<AgentChunk>,
    failure: Option<String>,
}

impl ScriptedAgent {
    pub fn new(chunks: Vec<AgentChunk>) -> Self {
        Self {
            chunks,
            failure: None,
        }
    }

    /// Fail after the scripted chunks have been produced
    pub fn with_failure(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }
}

#[async_trait]
impl AgentInvoker for ScriptedAgent {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn invoke(&self, _request: &str, _session_id: &str) -> Result<ChunkStream> {
        let chunks = self.chunks.clone().into_iter().map(Ok);
        let failure = self
            .failure
            .clone()
            .map(|reason| Err(Error::Agent(AgentError::InvocationFailed(reason))));
        Ok(stream::iter(chunks.chain(failure)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_echo_streams_words() {
        let agent = EchoAgent::new().with_chunk_delay(Duration::ZERO);
        let chunks: Vec<AgentChunk> = agent
            .invoke("swap 5 tokens", "s1")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let text: String = chunks.into_iter().filter_map(|c| c.content).collect();
        assert_eq!(text, "You said: swap 5 tokens");
    }

    #[tokio::test(start_paused = true)]
    async fn test_echo_waits_between_chunks() {
        let agent = EchoAgent::new().with_chunk_delay(Duration::from_millis(50));
        let mut chunks = agent.invoke("hi", "s1").await.unwrap();

        let mut next = tokio_test::task::spawn(chunks.next());
        tokio_test::assert_pending!(next.poll());
        tokio::time::advance(Duration::from_millis(50)).await;
        let chunk = tokio_test::assert_ready!(next.poll());
        assert_eq!(chunk.unwrap().unwrap(), AgentChunk::text("You"));
    }

    #[tokio::test]
    async fn test_scripted_agent_fails_after_script() {
        let agent = ScriptedAgent::new(vec![AgentChunk::text("partial")]).with_failure("boom");
        let results: Vec<_> = agent.invoke("x", "s1").await.unwrap().collect().await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            &results[1],
            Err(Error::Agent(AgentError::InvocationFailed(r))) if r == "boom"
        ));
    }
}
