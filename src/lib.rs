pub mod agents;
pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod quality;
pub mod request;
pub mod router;

pub use bootstrap::Engine;
pub use config::Config;
pub use error::{Error, Result};
pub use orchestration::{Orchestrator, PipelineEvent, PipelineOutcome};
pub use quality::QualityReport;
pub use request::{DeckRequest, FeatureFlags, RequestId};
pub use router::RoutingPolicy;
