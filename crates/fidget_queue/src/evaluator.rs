//! Per-tick eligibility of a single message.
//!
//! A message is eligible when its sense gate holds and, for point-of-view
//! variants, some observer perceives its target (or the second object of a
//! dual point-of-view message). Conditions are short-circuited in order: the
//! first one to return `true` wins, the first one to fail makes the message
//! ineligible for this tick.

use fidget_core::{Message, Perceiver, SenseGate, TargetId, Visibility};

use crate::error::FailureStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    /// Every sense condition returned false.
    SenseFalse,
    /// A perceiver is attached but nobody can perceive the subject(s).
    NotPerceived,
    /// Point-of-view message, but the daemon has no perceiver.
    NoPerceiver,
}

#[derive(Debug)]
pub enum Eligibility {
    Eligible,
    Ineligible(Ineligible),
    Failed {
        stage: FailureStage,
        source: String,
        error: anyhow::Error,
    },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Evaluate a message's sense gate, then its visibility gate.
pub fn evaluate(message: &Message, perceiver: Option<&dyn Perceiver>) -> Eligibility {
    match check_sense(message.sense(), message.target()) {
        Eligibility::Eligible => {}
        other => return other,
    }
    check_visibility(message.visibility(), message.target(), perceiver)
}

fn check_sense(gate: &SenseGate, target: &TargetId) -> Eligibility {
    if matches!(gate, SenseGate::Always) {
        return Eligibility::Eligible;
    }
    for condition in gate.conditions() {
        match condition.check(target) {
            Ok(true) => return Eligibility::Eligible,
            Ok(false) => {}
            Err(error) => {
                return Eligibility::Failed {
                    stage: FailureStage::Sense,
                    source: condition.name().to_string(),
                    error,
                }
            }
        }
    }
    Eligibility::Ineligible(Ineligible::SenseFalse)
}

fn check_visibility(
    visibility: &Visibility,
    target: &TargetId,
    perceiver: Option<&dyn Perceiver>,
) -> Eligibility {
    let subjects: Vec<&TargetId> = match visibility {
        Visibility::Global => return Eligibility::Eligible,
        Visibility::PointOfView => vec![target],
        Visibility::DualPointOfView(other) => vec![target, other],
    };
    let Some(perceiver) = perceiver else {
        return Eligibility::Ineligible(Ineligible::NoPerceiver);
    };
    for subject in subjects {
        match perceiver.can_perceive(subject) {
            Ok(true) => return Eligibility::Eligible,
            Ok(false) => {}
            Err(error) => {
                return Eligibility::Failed {
                    stage: FailureStage::Perception,
                    source: perceiver.name().to_string(),
                    error,
                }
            }
        }
    }
    Eligibility::Ineligible(Ineligible::NotPerceived)
}
