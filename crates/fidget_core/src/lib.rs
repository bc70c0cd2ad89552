//! # Fidget Core
//!
//! Shared vocabulary for the fidget queue: the [`Message`] a simulation object
//! queues for itself, the sense and visibility gates that decide whether it
//! may fire, and the collaborator traits the daemon consumes.
//!
//! ## Collaborators
//!
//! The queue never owns simulation objects. It talks to the outside world
//! through three seams:
//!
//! - [`Condition`]: a sense predicate evaluated at selection time
//! - [`Action`]: the behaviour invoked when a message wins a tick
//! - [`Perceiver`]: the observer subsystem answering "can anyone see this?"
//!
//! Global vetoes are expressed with the [`Filter`] trait.

pub mod config;
pub mod error;
pub mod message;

pub use config::{FidgetConfig, QueueConfig, SelectionPolicy, WeightPresets};
pub use error::ConstructionError;
pub use message::{
    Action, Condition, Message, MessageBuilder, MessageKind, SenseGate, Visibility,
    AFTER_WEIGHT, BEFORE_WEIGHT, DEFAULT_WEIGHT,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a simulation object that owns queued messages.
///
/// The daemon only ever looks targets up by id; it never holds the object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TargetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Observer/visibility subsystem consulted by point-of-view gated messages.
///
/// Implementations answer whether at least one valid observer can currently
/// perceive the given object. Errors are treated as "not perceived" for the
/// current tick and surfaced as diagnostics.
pub trait Perceiver: Send + Sync {
    fn can_perceive(&self, target: &TargetId) -> anyhow::Result<bool>;

    /// Name used in diagnostics and logs.
    fn name(&self) -> &str {
        "perceiver"
    }
}

/// Global veto applied to every candidate message after its own sense gate.
pub trait Filter: Send + Sync {
    /// Return `Ok(false)` to suppress the message for this tick.
    fn allows(&self, message: &Message) -> anyhow::Result<bool>;

    fn name(&self) -> &str {
        "filter"
    }
}

/// A [`Filter`] backed by a closure.
pub struct FnFilter<F> {
    name: String,
    check: F,
}

impl<F> FnFilter<F>
where
    F: Fn(&Message) -> anyhow::Result<bool> + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> Filter for FnFilter<F>
where
    F: Fn(&Message) -> anyhow::Result<bool> + Send + Sync,
{
    fn allows(&self, message: &Message) -> anyhow::Result<bool> {
        (self.check)(message)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_id_display_and_conversions() {
        let a = TargetId::from("bob");
        let b = TargetId::new(String::from("bob"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "bob");
        assert_eq!(a.as_str(), "bob");
    }

    #[test]
    fn test_fn_filter_delegates_to_closure() {
        let filter = FnFilter::new("no-bob", |m: &Message| Ok(m.target().as_str() != "bob"));
        let msg = Message::default_fidget("bob", |_| Ok(())).unwrap();
        assert!(!filter.allows(&msg).unwrap());
        assert_eq!(filter.name(), "no-bob");

        let other = Message::default_fidget("alice", |_| Ok(())).unwrap();
        assert!(filter.allows(&other).unwrap());
    }
}
