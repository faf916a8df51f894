//! Agent stream adapter and agent implementations
//!
//! This module handles:
//! - The `AgentInvoker` boundary to the opaque agent
//! - Normalizing agent chunks into fragments (`AgentStreamAdapter`)
//! - Built-in echo/scripted agents and the external process agent

mod adapter;
mod builtin;
mod process;

pub use adapter::{
    AgentChunk, AgentInvoker, AgentStreamAdapter, ChunkStream, Fragment, FragmentStream,
};
pub use builtin::{EchoAgent, ScriptedAgent};
pub use process::ProcessAgent;

use crate::config::{AgentKind, ServerConfig};
use crate::error::{ConfigError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Build the agent selected by the server configuration
pub fn from_config(config: &ServerConfig) -> Result<Arc<dyn AgentInvoker>> {
    match config.agent {
        AgentKind::Echo => Ok(Arc::new(
            EchoAgent::new().with_chunk_delay(Duration::from_millis(config.echo_delay_ms)),
        )),
        AgentKind::Process => {
            let process = config.process.as_ref().ok_or_else(|| ConfigError::Invalid {
                key: "server.process".to_string(),
                reason: "required when server.agent = \"process\"".to_string(),
            })?;
            Ok(Arc::new(
                ProcessAgent::new(process.command.clone())
                    .with_args(process.args.clone())
                    .with_env(process.env.clone())
                    .with_cwd(process.cwd.clone()),
            ))
        }
    }
}
