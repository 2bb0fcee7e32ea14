//! Subprocess model backend.
//!
//! `CommandBackend` runs a local model CLI (for example `ollama run llama3`
//! or `claude -p`) once per request and reads the answer from stdout. A JSON
//! envelope with `result` and token counters is unwrapped when present;
//! otherwise stdout is the answer.

use super::{BackendReply, BackendRequest, ModelBackend};
use crate::core::Usage;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Default timeout for one model invocation (2 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Argument replaced by the rendered prompt.
const PROMPT_PLACEHOLDER: &str = "{prompt}";

/// Envelope some CLIs print with `--output-format json`.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    subtype: Option<String>,
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Debug, Deserialize)]
struct RawUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct CommandBackend {
    id: String,
    binary: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandBackend {
    /// Build from a command line such as `"ollama run llama3"`.
    ///
    /// The prompt replaces a `{prompt}` argument, or is appended last.
    ///
    /// # Errors
    ///
    /// Returns an error if the command line is empty or the binary cannot be found.
    pub fn from_command_line(id: &str, command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config(format!("backend {} has an empty command", id)))?;
        let binary = which::which(&program)
            .map_err(|_| Error::Config(format!("backend {}: {} not found on PATH", id, program)))?;
        Ok(Self::with_binary(id, binary, parts.collect()))
    }

    /// Create a backend for a specific binary path.
    pub fn with_binary(id: &str, binary: PathBuf, args: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            binary,
            args,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arguments for one invocation with `prompt` substituted in.
    pub fn arguments(&self, prompt: &str) -> Vec<String> {
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg == PROMPT_PLACEHOLDER {
                    substituted = true;
                    prompt.to_string()
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(prompt.to_string());
        }
        args
    }

    /// Interpret a finished process's stdout.
    pub fn parse_stdout(id: &str, stdout: &str) -> Result<BackendReply> {
        if let Ok(raw) = serde_json::from_str::<RawEnvelope>(stdout.trim()) {
            let usage = raw
                .usage
                .map(|u| Usage {
                    prompt_tokens: u.input_tokens,
                    completion_tokens: u.output_tokens,
                    latency_ms: 0,
                })
                .unwrap_or_default();
            let failed = raw.subtype.as_deref() == Some("error") || raw.error.is_some();
            if failed {
                return Err(Error::Backend {
                    backend: id.to_string(),
                    message: raw.error.or(raw.result).unwrap_or_default(),
                });
            }
            if let Some(result) = raw.result {
                return Ok(BackendReply {
                    text: result,
                    usage,
                });
            }
        }

        let text = stdout.trim();
        if text.is_empty() {
            return Err(Error::Backend {
                backend: id.to_string(),
                message: "empty output".to_string(),
            });
        }
        Ok(BackendReply::new(text.to_string()))
    }
}

#[async_trait]
impl ModelBackend for CommandBackend {
    async fn generate(&self, request: BackendRequest) -> Result<BackendReply> {
        let started = Instant::now();
        let prompt = request.render();

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.binary)
                .args(self.arguments(&prompt))
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| Error::Timeout {
            backend: self.id.clone(),
            timeout: self.timeout,
        })?
        .map_err(|e| Error::Backend {
            backend: self.id.clone(),
            message: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                format!(
                    "exited with code {}",
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            return Err(Error::Backend {
                backend: self.id.clone(),
                message,
            });
        }

        let mut reply = Self::parse_stdout(&self.id, &stdout)?;
        reply.usage.latency_ms = started.elapsed().as_millis() as u64;
        Ok(reply)
    }
}
