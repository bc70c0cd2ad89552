//! # Fidget Queue
//!
//! A single-process scheduler for ambient behaviour ("fidgets") in a live
//! simulation. Objects queue short messages for themselves; each tick the
//! daemon picks at most one eligible message per target and runs it.
//!
//! ## Tick cycle
//!
//! 1. Gather the messages queued for the target
//! 2. Drop those whose sense gate or point-of-view gate fails
//! 3. Drop those any global filter vetoes
//! 4. Draw one winner with probability proportional to weight
//! 5. Run its action; the message stays queued for later ticks
//!
//! Randomness comes from a seedable RNG, so whole runs can be replayed.

mod daemon;
mod error;
mod evaluator;
mod filter;
mod queued;
mod report;
mod selector;

pub use daemon::{MessageQueueDaemon, TickReport};
pub use error::{FailureStage, PredicateFailure, QueueError};
pub use evaluator::{Eligibility, Ineligible};
pub use filter::{FilterRegistry, FilterVerdict};
pub use queued::{MessageHandle, QueuedMessage};
pub use report::{
    CountReporter, LabelCountReporter, MessageIter, Reporter, TargetCountReporter, WeightReporter,
};
pub use selector::Selector;
