use crate::core::NodeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backend {backend} failed: {message}")]
    Backend { backend: String, message: String },

    #[error("Backend {backend} timed out after {timeout:?}")]
    Timeout {
        backend: String,
        timeout: std::time::Duration,
    },

    #[error("Unparseable output from {node}: {message}")]
    Parse { node: NodeId, message: String },

    #[error("Invalid output from {node}: {message}")]
    OutputInvalid { node: NodeId, message: String },

    #[error("No backend can serve {node} under policy {policy}")]
    Routing { node: NodeId, policy: String },

    #[error("Node {node} aborted: dependency {dependency} did not succeed")]
    DependencyAborted { node: NodeId, dependency: NodeId },

    #[error("Validator {node} could not run: {message}")]
    QaValidator { node: NodeId, message: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Dependency graph contains a cycle through {0}")]
    Cycle(String),

    #[error("Context already holds a value for {0}")]
    ContextConflict(NodeId),

    #[error("Agent registry incomplete: no agent for {0}")]
    RegistryIncomplete(NodeId),

    #[error("Agent not found: {0}")]
    AgentNotFound(NodeId),

    #[error("Required node {node} failed: {source}")]
    NodeFailed {
        node: NodeId,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Transient failures worth another attempt on the same or a fallback backend.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Backend { .. }
                | Error::Timeout { .. }
                | Error::Parse { .. }
                | Error::OutputInvalid { .. }
        )
    }

    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) | Error::Json(_) | Error::TomlParse(_) | Error::NoHomeDir => "io",
            Error::Config(_) => "config",
            Error::Validation(_) => "validation",
            Error::Backend { .. } | Error::Timeout { .. } => "backend",
            Error::Parse { .. } | Error::OutputInvalid { .. } => "output",
            Error::Routing { .. } => "routing",
            Error::DependencyAborted { .. } => "dependency_aborted",
            Error::QaValidator { .. } => "qa_validator",
            Error::Cancelled => "cancelled",
            Error::Cycle(_) => "cycle",
            Error::ContextConflict(_) => "context_conflict",
            Error::RegistryIncomplete(_) | Error::AgentNotFound(_) => "registry",
            Error::NodeFailed { .. } => "node_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
