//! Agent backed by an external process speaking NDJSON over stdin/stdout
//!
//! Each invocation spawns the configured command, writes the request as one
//! JSON line to its stdin and reads `{content?, tool_calls?}` chunks, one JSON
//! object per stdout line. The child is killed when the stream is dropped.

use super::adapter::{AgentChunk, AgentInvoker, ChunkStream};
use crate::error::{AgentError, Error, Result};
use crate::types::ClientRequest;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Process agent configuration
#[derive(Debug, Clone, Default)]
pub struct ProcessAgent {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<String>,
}

impl ProcessAgent {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_cwd(mut self, cwd: Option<String>) -> Self {
        self.cwd = cwd;
        self
    }

    fn spawn(&self) -> Result<Child> {
        debug!(
            "Spawning agent: {} {:?} (cwd: {:?})",
            self.command, self.args, self.cwd
        );

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        cmd.spawn().map_err(|e| {
            Error::Agent(AgentError::StartFailed(format!(
                "Failed to spawn agent process: {}",
                e
            )))
        })
    }
}

/// Log the agent's stderr and keep its last non-empty line for exit reports.
///
/// The pipe must be read continuously or a chatty agent blocks on write.
fn watch_stderr(stderr: ChildStderr) -> JoinHandle<Option<String>> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut last = None;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    warn!("Agent stderr: {}", line.trim_end());
                    last = Some(line.trim().to_string());
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped reading agent stderr: {}", e);
                    break;
                }
            }
        }
        last
    })
}

/// Reader state carried through the chunk stream. Owns the child so that
/// dropping the stream kills the process.
struct ProcessOutput {
    lines: Lines<BufReader<ChildStdout>>,
    child: Child,
    stderr: Option<JoinHandle<Option<String>>>,
    finished: bool,
}

impl ProcessOutput {
    /// Last stderr line, available once the child has exited and the pipe closed
    async fn last_stderr_line(&mut self) -> Option<String> {
        self.stderr.take()?.await.ok().flatten()
    }

    async fn next_chunk(&mut self) -> Option<Result<AgentChunk>> {
        if self.finished {
            return None;
        }

        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    trace!("Agent stdout: {}", trimmed);
                    match serde_json::from_str::<AgentChunk>(trimmed) {
                        Ok(chunk) => return Some(Ok(chunk)),
                        Err(e) => {
                            let snippet = trimmed.chars().take(300).collect::<String>();
                            debug!("Ignoring non-JSON agent output ({}): {}", e, snippet);
                        }
                    }
                }
                Ok(None) => {
                    self.finished = true;
                    return match self.child.wait().await {
                        Ok(status) if status.success() => {
                            debug!("Agent process exited cleanly");
                            None
                        }
                        Ok(status) => {
                            let detail = match self.last_stderr_line().await {
                                Some(line) => format!("{} ({})", status, line),
                                None => status.to_string(),
                            };
                            Some(Err(Error::Agent(AgentError::Exited(detail))))
                        }
                        Err(e) => Some(Err(e.into())),
                    };
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(Error::Agent(AgentError::InvocationFailed(format!(
                        "Error reading agent stdout: {}",
                        e
                    )))));
                }
            }
        }
    }
}

#[async_trait]
impl AgentInvoker for ProcessAgent {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn invoke(&self, request: &str, session_id: &str) -> Result<ChunkStream> {
        let mut child = self.spawn()?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            Error::Agent(AgentError::StartFailed("Failed to capture stdin".to_string()))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::Agent(AgentError::StartFailed("Failed to capture stdout".to_string()))
        })?;
        let stderr = child.stderr.take().map(watch_stderr);

        let line = serde_json::to_string(&ClientRequest::new(request, session_id))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        // Closing stdin signals end of input to the agent.
        drop(stdin);

        let output = ProcessOutput {
            lines: BufReader::new(stdout).lines(),
            child,
            stderr,
            finished: false,
        };

        Ok(stream::unfold(output, |mut output| async move {
            output.next_chunk().await.map(|chunk| (chunk, output))
        })
        .boxed())
    }
}
