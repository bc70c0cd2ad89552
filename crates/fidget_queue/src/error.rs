use fidget_core::TargetId;
use std::fmt;
use thiserror::Error;

use crate::queued::MessageHandle;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("message {0} is not queued")]
    NotFound(MessageHandle),

    #[error("action for message {handle} on {target} failed: {source:#}")]
    ActionDispatch {
        handle: MessageHandle,
        target: TargetId,
        #[source]
        source: anyhow::Error,
        /// Sense, perception and filter failures seen earlier in the same tick.
        diagnostics: Vec<PredicateFailure>,
    },
}

/// Where in the eligibility pipeline a callback failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Sense,
    Perception,
    Filter,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureStage::Sense => "sense",
            FailureStage::Perception => "perception",
            FailureStage::Filter => "filter",
        };
        f.write_str(s)
    }
}

/// A callback failure observed during a tick.
///
/// The affected message is skipped for that tick only; the failure is
/// reported, not propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateFailure {
    pub handle: MessageHandle,
    pub label: Option<String>,
    pub stage: FailureStage,
    /// Name of the condition, perceiver or filter that failed.
    pub source: String,
    pub error: String,
}

impl fmt::Display for PredicateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.handle)?;
        if let Some(label) = &self.label {
            write!(f, " ({})", label)?;
        }
        write!(f, " {} '{}' failed: {}", self.stage, self.source, self.error)
    }
}
