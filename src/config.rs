use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{BackendDescriptor, CapabilityTier, CommandBackend, OfflineBackend};
use crate::core::NodeId;
use crate::orchestration::{ExecutionSettings, RetryPolicy, DEFAULT_CALL_TIMEOUT_SECS};
use crate::router::RoutingPolicy;
use crate::{Error, Result};

/// Id of the backend used when none is configured.
pub const OFFLINE_BACKEND_ID: &str = "offline";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Policy used when a brief does not name one.
    pub default_policy: RoutingPolicy,
    pub retry: RetryPolicy,
    pub call_timeout_secs: u64,
    pub request_deadline_secs: Option<u64>,
    pub backends: Vec<BackendConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_policy: RoutingPolicy::default(),
            retry: RetryPolicy::default(),
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            request_deadline_secs: None,
            backends: Vec::new(),
        }
    }
}

/// One `[[backends]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    pub id: String,
    pub tier: CapabilityTier,
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
    /// Model CLI to run, e.g. `"ollama run llama3"`. Absent means the
    /// built-in offline generator.
    #[serde(default)]
    pub command: Option<String>,
    /// Nodes this backend may serve; absent serves all of them.
    #[serde(default)]
    pub tasks: Option<Vec<NodeId>>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl BackendConfig {
    /// Build the runtime descriptor, resolving the command on PATH.
    pub fn build(&self) -> Result<BackendDescriptor> {
        let timeout = self.timeout_secs.map(Duration::from_secs);
        let mut descriptor = match &self.command {
            Some(command) => {
                let mut backend = CommandBackend::from_command_line(&self.id, command)?;
                if let Some(timeout) = timeout {
                    backend = backend.with_timeout(timeout);
                }
                BackendDescriptor::new(&self.id, self.tier, Arc::new(backend))
            }
            None => BackendDescriptor::new(&self.id, self.tier, Arc::new(OfflineBackend::new())),
        }
        .with_cost(self.cost_per_1k_tokens);
        if self.local {
            descriptor = descriptor.local();
        }
        if let Some(tasks) = &self.tasks {
            descriptor = descriptor.serving(tasks.iter().copied());
        }
        if let Some(timeout) = timeout {
            descriptor = descriptor.with_timeout(timeout);
        }
        Ok(descriptor)
    }
}

impl Config {
    pub fn deckflow_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".deckflow"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::deckflow_dir()?.join("deckflow.toml"))
    }

    /// Load `~/.deckflow/deckflow.toml`, or defaults if it does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading config");
        if !path.exists() {
            tracing::debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        tracing::debug!(
            policy = %config.default_policy,
            backends = config.backends.len(),
            "config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::deckflow_dir()?;
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot serialize config: {}", e)))?;
        fs::write(path, text)?;
        tracing::debug!(path = %path.display(), "config saved");
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        if self.call_timeout_secs == 0 {
            return Err(Error::Config("call_timeout_secs must be positive".to_string()));
        }
        if self.request_deadline_secs == Some(0) {
            return Err(Error::Config("request_deadline_secs must be positive".to_string()));
        }
        for backend in &self.backends {
            if !backend.cost_per_1k_tokens.is_finite() || backend.cost_per_1k_tokens < 0.0 {
                return Err(Error::Config(format!(
                    "backend {} has invalid cost_per_1k_tokens {}",
                    backend.id, backend.cost_per_1k_tokens
                )));
            }
        }
        Ok(())
    }

    pub fn execution_settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            retry: self.retry,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            request_deadline: self.request_deadline_secs.map(Duration::from_secs),
        }
    }

    /// Configured backends, or the single local offline backend.
    pub fn effective_backends(&self) -> Vec<BackendConfig> {
        if !self.backends.is_empty() {
            return self.backends.clone();
        }
        vec![BackendConfig {
            id: OFFLINE_BACKEND_ID.to_string(),
            tier: CapabilityTier::Standard,
            local: true,
            cost_per_1k_tokens: 0.0,
            command: None,
            tasks: None,
            timeout_secs: None,
        }]
    }
}
