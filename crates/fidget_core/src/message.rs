//! Queued message model.
//!
//! A [`Message`] pairs a target with an action, a selection weight, a sense
//! gate and a visibility mode. Messages are immutable once built; the daemon
//! keeps its own bookkeeping next to them.

use std::fmt;
use std::sync::Arc;

use crate::error::ConstructionError;
use crate::TargetId;

/// Weight of an ordinary ambient fidget.
pub const DEFAULT_WEIGHT: u32 = 50;
/// Weight of a fidget meant to win ahead of the ordinary ones.
pub const BEFORE_WEIGHT: u32 = 100;
/// Weight of a fidget that should almost never beat the others.
pub const AFTER_WEIGHT: u32 = 1;

type CheckFn = dyn Fn(&TargetId) -> anyhow::Result<bool> + Send + Sync;
type PerformFn = dyn Fn(&TargetId) -> anyhow::Result<()> + Send + Sync;

/// A named sense predicate, evaluated against the message target each tick.
#[derive(Clone)]
pub struct Condition {
    name: String,
    check: Arc<CheckFn>,
}

impl Condition {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&TargetId) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check(&self, target: &TargetId) -> anyhow::Result<bool> {
        (self.check)(target)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition").field("name", &self.name).finish()
    }
}

/// Behaviour invoked on the target when a message wins a tick.
#[derive(Clone)]
pub struct Action {
    perform: Arc<PerformFn>,
}

impl Action {
    pub fn new<F>(perform: F) -> Self
    where
        F: Fn(&TargetId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            perform: Arc::new(perform),
        }
    }

    pub fn perform(&self, target: &TargetId) -> anyhow::Result<()> {
        (self.perform)(target)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Action(..)")
    }
}

/// Sense gate, by predicate arity.
#[derive(Debug, Clone)]
pub enum SenseGate {
    /// No predicate: always eligible.
    Always,
    /// Eligible iff the condition holds.
    One(Condition),
    /// Eligible iff either condition holds.
    Either(Condition, Condition),
}

impl SenseGate {
    pub fn arity(&self) -> usize {
        match self {
            SenseGate::Always => 0,
            SenseGate::One(_) => 1,
            SenseGate::Either(_, _) => 2,
        }
    }

    /// Conditions in evaluation order.
    pub fn conditions(&self) -> Vec<&Condition> {
        match self {
            SenseGate::Always => Vec::new(),
            SenseGate::One(a) => vec![a],
            SenseGate::Either(a, b) => vec![a, b],
        }
    }
}

/// Whether dispatch additionally requires an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// Fires whether or not anyone is watching.
    Global,
    /// Some observer must perceive the target.
    PointOfView,
    /// Some observer must perceive the target or the named second object.
    DualPointOfView(TargetId),
}

/// Construction variant. Determines how many sense conditions are required
/// and which visibility gate applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Plain,
    Sensed,
    DualSensed,
    PointOfView,
    DualPointOfView,
}

impl MessageKind {
    /// Inclusive (min, max) number of sense conditions.
    fn sense_bounds(self) -> (usize, usize) {
        match self {
            MessageKind::Plain => (0, 0),
            MessageKind::Sensed => (1, 1),
            MessageKind::DualSensed => (2, 2),
            MessageKind::PointOfView | MessageKind::DualPointOfView => (1, 2),
        }
    }
}

/// One candidate ambient action for a target.
///
/// Not `Clone`: each message handed to the daemon is a distinct object and
/// can only be queued once.
#[derive(Debug)]
pub struct Message {
    target: TargetId,
    weight: u32,
    sense: SenseGate,
    visibility: Visibility,
    action: Action,
    label: Option<String>,
}

impl Message {
    pub fn builder(kind: MessageKind) -> MessageBuilder {
        MessageBuilder::new(kind)
    }

    /// Plain fidget with an explicit weight.
    pub fn weighted<F>(
        target: impl Into<TargetId>,
        weight: i64,
        action: F,
    ) -> Result<Self, ConstructionError>
    where
        F: Fn(&TargetId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::builder(MessageKind::Plain)
            .target(target)
            .weight(weight)
            .action(action)
            .build()
    }

    /// Plain fidget at [`DEFAULT_WEIGHT`].
    pub fn default_fidget<F>(target: impl Into<TargetId>, action: F) -> Result<Self, ConstructionError>
    where
        F: Fn(&TargetId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::weighted(target, i64::from(DEFAULT_WEIGHT), action)
    }

    /// Plain fidget at [`BEFORE_WEIGHT`].
    pub fn fidget_before<F>(target: impl Into<TargetId>, action: F) -> Result<Self, ConstructionError>
    where
        F: Fn(&TargetId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::weighted(target, i64::from(BEFORE_WEIGHT), action)
    }

    /// Plain fidget at [`AFTER_WEIGHT`].
    pub fn fidget_after<F>(target: impl Into<TargetId>, action: F) -> Result<Self, ConstructionError>
    where
        F: Fn(&TargetId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::weighted(target, i64::from(AFTER_WEIGHT), action)
    }

    /// Single-sense fidget.
    pub fn fidget_sense<S, F>(
        target: impl Into<TargetId>,
        weight: i64,
        sense: S,
        action: F,
    ) -> Result<Self, ConstructionError>
    where
        S: Fn(&TargetId) -> anyhow::Result<bool> + Send + Sync + 'static,
        F: Fn(&TargetId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::builder(MessageKind::Sensed)
            .target(target)
            .weight(weight)
            .sense(sense)
            .action(action)
            .build()
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn sense(&self) -> &SenseGate {
        &self.sense
    }

    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn kind(&self) -> MessageKind {
        match (&self.visibility, &self.sense) {
            (Visibility::DualPointOfView(_), _) => MessageKind::DualPointOfView,
            (Visibility::PointOfView, _) => MessageKind::PointOfView,
            (Visibility::Global, SenseGate::Always) => MessageKind::Plain,
            (Visibility::Global, SenseGate::One(_)) => MessageKind::Sensed,
            (Visibility::Global, SenseGate::Either(_, _)) => MessageKind::DualSensed,
        }
    }

    /// Run the action against this message's target.
    pub fn perform(&self) -> anyhow::Result<()> {
        self.action.perform(&self.target)
    }
}

/// Builder for [`Message`]. Every field is named; nothing is defaulted
/// except the label.
#[derive(Debug)]
pub struct MessageBuilder {
    kind: MessageKind,
    target: Option<TargetId>,
    weight: Option<i64>,
    senses: Vec<Condition>,
    secondary: Option<TargetId>,
    action: Option<Action>,
    label: Option<String>,
}

impl MessageBuilder {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            target: None,
            weight: None,
            senses: Vec::new(),
            secondary: None,
            action: None,
            label: None,
        }
    }

    pub fn target(mut self, target: impl Into<TargetId>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn weight(mut self, weight: i64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Add an anonymous sense condition.
    pub fn sense<F>(self, check: F) -> Self
    where
        F: Fn(&TargetId) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        let name = format!("sense#{}", self.senses.len() + 1);
        self.condition(Condition::new(name, check))
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.senses.push(condition);
        self
    }

    /// Second object for [`MessageKind::DualPointOfView`].
    pub fn also_observed(mut self, other: impl Into<TargetId>) -> Self {
        self.secondary = Some(other.into());
        self
    }

    pub fn action<F>(mut self, perform: F) -> Self
    where
        F: Fn(&TargetId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.action = Some(Action::new(perform));
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn build(self) -> Result<Message, ConstructionError> {
        let target = self
            .target
            .filter(|t| !t.as_str().is_empty())
            .ok_or(ConstructionError::MissingTarget)?;
        let action = self.action.ok_or(ConstructionError::MissingAction)?;

        let raw = self.weight.ok_or(ConstructionError::MissingWeight)?;
        let weight = u32::try_from(raw)
            .ok()
            .filter(|w| *w > 0)
            .ok_or(ConstructionError::InvalidWeight { got: raw })?;

        let (min, max) = self.kind.sense_bounds();
        let got = self.senses.len();
        if got < min {
            return Err(ConstructionError::MissingSense {
                kind: self.kind,
                needed: min,
                got,
            });
        }
        if got > max {
            return Err(ConstructionError::TooManySenses {
                kind: self.kind,
                max,
                got,
            });
        }

        let mut senses = self.senses.into_iter();
        let sense = match (senses.next(), senses.next()) {
            (None, _) => SenseGate::Always,
            (Some(a), None) => SenseGate::One(a),
            (Some(a), Some(b)) => SenseGate::Either(a, b),
        };

        let visibility = match self.kind {
            MessageKind::Plain | MessageKind::Sensed | MessageKind::DualSensed => Visibility::Global,
            MessageKind::PointOfView => Visibility::PointOfView,
            MessageKind::DualPointOfView => Visibility::DualPointOfView(
                self.secondary
                    .ok_or(ConstructionError::MissingSecondaryTarget)?,
            ),
        };

        Ok(Message {
            target,
            weight,
            sense,
            visibility,
            action,
            label: self.label,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &TargetId) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_presets() {
        assert_eq!(Message::default_fidget("t", noop).unwrap().weight(), 50);
        assert_eq!(Message::fidget_before("t", noop).unwrap().weight(), 100);
        assert_eq!(Message::fidget_after("t", noop).unwrap().weight(), 1);
    }

    #[test]
    fn test_plain_message_kind() {
        let msg = Message::weighted("t", 7, noop).unwrap();
        assert_eq!(msg.kind(), MessageKind::Plain);
        assert_eq!(msg.sense().arity(), 0);
        assert_eq!(msg.visibility(), &Visibility::Global);
    }

    #[test]
    fn test_zero_and_negative_weight_rejected() {
        let err = Message::weighted("t", 0, noop).unwrap_err();
        assert_eq!(err, ConstructionError::InvalidWeight { got: 0 });

        let err = Message::weighted("t", -5, noop).unwrap_err();
        assert_eq!(err, ConstructionError::InvalidWeight { got: -5 });

        let too_big = i64::from(u32::MAX) + 1;
        assert!(matches!(
            Message::weighted("t", too_big, noop),
            Err(ConstructionError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn test_missing_target_and_action() {
        let err = Message::builder(MessageKind::Plain)
            .weight(10)
            .action(noop)
            .build()
            .unwrap_err();
        assert_eq!(err, ConstructionError::MissingTarget);

        let err = Message::weighted("", 10, noop).unwrap_err();
        assert_eq!(err, ConstructionError::MissingTarget);

        let err = Message::builder(MessageKind::Plain)
            .target("t")
            .weight(10)
            .build()
            .unwrap_err();
        assert_eq!(err, ConstructionError::MissingAction);

        let err = Message::builder(MessageKind::Plain)
            .target("t")
            .action(noop)
            .build()
            .unwrap_err();
        assert_eq!(err, ConstructionError::MissingWeight);
    }

    #[test]
    fn test_sensed_requires_condition() {
        let err = Message::builder(MessageKind::Sensed)
            .target("t")
            .weight(10)
            .action(noop)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::MissingSense { needed: 1, got: 0, .. }
        ));
    }

    #[test]
    fn test_dual_sensed_needs_two() {
        let err = Message::builder(MessageKind::DualSensed)
            .target("t")
            .weight(10)
            .sense(|_| Ok(true))
            .action(noop)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConstructionError::MissingSense { needed: 2, got: 1, .. }));

        let msg = Message::builder(MessageKind::DualSensed)
            .target("t")
            .weight(10)
            .sense(|_| Ok(false))
            .sense(|_| Ok(true))
            .action(noop)
            .build()
            .unwrap();
        assert_eq!(msg.kind(), MessageKind::DualSensed);
        let names: Vec<_> = msg.sense().conditions().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["sense#1", "sense#2"]);
    }

    #[test]
    fn test_plain_rejects_senses() {
        let err = Message::builder(MessageKind::Plain)
            .target("t")
            .weight(10)
            .sense(|_| Ok(true))
            .action(noop)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConstructionError::TooManySenses { max: 0, got: 1, .. }));
    }

    #[test]
    fn test_point_of_view_variants() {
        let pov = Message::builder(MessageKind::PointOfView)
            .target("t")
            .weight(10)
            .sense(|_| Ok(true))
            .action(noop)
            .build()
            .unwrap();
        assert_eq!(pov.kind(), MessageKind::PointOfView);
        assert_eq!(pov.visibility(), &Visibility::PointOfView);

        let err = Message::builder(MessageKind::PointOfView)
            .target("t")
            .weight(10)
            .action(noop)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConstructionError::MissingSense { .. }));

        let err = Message::builder(MessageKind::DualPointOfView)
            .target("t")
            .weight(10)
            .sense(|_| Ok(true))
            .action(noop)
            .build()
            .unwrap_err();
        assert_eq!(err, ConstructionError::MissingSecondaryTarget);

        let dual = Message::builder(MessageKind::DualPointOfView)
            .target("t")
            .weight(10)
            .sense(|_| Ok(true))
            .sense(|_| Ok(true))
            .also_observed("door")
            .action(noop)
            .build()
            .unwrap();
        assert_eq!(dual.kind(), MessageKind::DualPointOfView);
        assert_eq!(dual.visibility(), &Visibility::DualPointOfView(TargetId::from("door")));
    }

    #[test]
    fn test_fidget_sense_and_perform() {
        let msg = Message::fidget_sense("cat", 30, |t| Ok(t.as_str() == "cat"), |t| {
            anyhow::ensure!(t.as_str() == "cat", "wrong target");
            Ok(())
        })
        .unwrap();
        assert_eq!(msg.kind(), MessageKind::Sensed);
        match msg.sense() {
            SenseGate::One(c) => assert!(c.check(msg.target()).unwrap()),
            other => panic!("Expected single sense, got {:?}", other),
        }
        assert!(msg.perform().is_ok());
    }

    #[test]
    fn test_label() {
        let msg = Message::builder(MessageKind::Plain)
            .target("t")
            .weight(1)
            .action(noop)
            .label("scratches head")
            .build()
            .unwrap();
        assert_eq!(msg.label(), Some("scratches head"));
    }
}
