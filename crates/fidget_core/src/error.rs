use thiserror::Error;

use crate::message::MessageKind;

/// Reasons a [`crate::Message`] cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    #[error("weight must be a positive 32-bit integer, got {got}")]
    InvalidWeight { got: i64 },

    #[error("message has no weight; pass one explicitly or use a preset constructor")]
    MissingWeight,

    #[error("message has no target")]
    MissingTarget,

    #[error("message has no action")]
    MissingAction,

    #[error("{kind:?} message needs at least {needed} sense condition(s), got {got}")]
    MissingSense {
        kind: MessageKind,
        needed: usize,
        got: usize,
    },

    #[error("{kind:?} message accepts at most {max} sense condition(s), got {got}")]
    TooManySenses {
        kind: MessageKind,
        max: usize,
        got: usize,
    },

    #[error("dual point-of-view message needs a secondary object")]
    MissingSecondaryTarget,
}
