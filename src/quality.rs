//! Quality report aggregation.
//!
//! Validators run concurrently and each returns its own finding list. At the
//! join barrier the lists are appended to the report in completion order;
//! each validator's internal order is preserved as-is.

use crate::core::NodeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub source: NodeId,
    pub message: String,
    /// Zero-based slide the finding refers to, if any.
    #[serde(default)]
    pub slide: Option<usize>,
    /// Set on findings that report a validator which could not run.
    #[serde(default)]
    pub meta: bool,
}

impl Finding {
    pub fn new(source: NodeId, severity: Severity, message: &str) -> Self {
        Self {
            severity,
            source,
            message: message.to_string(),
            slide: None,
            meta: false,
        }
    }

    pub fn on_slide(mut self, slide: usize) -> Self {
        self.slide = Some(slide);
        self
    }

    /// High-severity note that `source` produced no findings because it failed.
    pub fn validator_unavailable(source: NodeId, reason: &str) -> Self {
        Self {
            severity: Severity::High,
            source,
            message: format!("validator unavailable: {}", reason),
            slide: None,
            meta: true,
        }
    }
}

/// Outcome of one validator at the join barrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ValidatorOutcome {
    Completed { findings: usize },
    Unavailable { reason: String },
    NotRun { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    pub findings: Vec<Finding>,
    /// Per-validator outcome, in merge order.
    pub validators: Vec<(NodeId, ValidatorOutcome)>,
}

impl QualityReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a validator's findings, keeping their order.
    pub fn merge(&mut self, source: NodeId, findings: Vec<Finding>) {
        let count = findings.len();
        self.findings.extend(findings);
        self.validators
            .push((source, ValidatorOutcome::Completed { findings: count }));
    }

    /// Record a validator that failed to run.
    pub fn merge_unavailable(&mut self, source: NodeId, reason: &str) {
        self.findings
            .push(Finding::validator_unavailable(source, reason));
        self.validators.push((
            source,
            ValidatorOutcome::Unavailable {
                reason: reason.to_string(),
            },
        ));
    }

    /// Record a validator that never started (aborted or cancelled).
    pub fn mark_not_run(&mut self, source: NodeId, reason: &str) {
        self.validators.push((
            source,
            ValidatorOutcome::NotRun {
                reason: reason.to_string(),
            },
        ));
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    /// Meta-findings for validators that could not run.
    pub fn unavailable_validators(&self) -> Vec<NodeId> {
        self.findings
            .iter()
            .filter(|f| f.meta)
            .map(|f| f.source)
            .collect()
    }

    pub fn findings_from(&self, source: NodeId) -> Vec<&Finding> {
        self.findings.iter().filter(|f| f.source == source).collect()
    }

    /// Number of validators that returned a real finding set.
    pub fn completed_validators(&self) -> usize {
        self.validators
            .iter()
            .filter(|(_, outcome)| matches!(outcome, ValidatorOutcome::Completed { .. }))
            .count()
    }
}
