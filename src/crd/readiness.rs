//! Readiness Aggregation
//!
//! Whole-system readiness is derived from the condition store against an
//! explicit table of condition types. Nothing here is stored: the `Ready`
//! condition written by [`ReadinessPolicy::summarize`] is a display mirror and
//! is never consulted by the predicate itself.

use super::condition::{
    reasons, Condition, ConditionSeverity, ConditionStatus, ConditionType, Conditions,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Requirement Table
// =============================================================================

/// Whether a sub-system condition gates overall readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Must be True for the control plane to be ready
    Required,
    /// Tracked and displayed, but excluded from the aggregate until the
    /// named prerequisite lands
    Deferred { reason: &'static str },
}

/// Readiness requirements of the control plane.
pub const CONTROL_PLANE_READINESS: &[(ConditionType, Requirement)] = &[
    (ConditionType::RabbitMqReady, Requirement::Required),
    (ConditionType::MariaDbReady, Requirement::Required),
    (ConditionType::KeystoneApiReady, Requirement::Required),
    (ConditionType::PlacementApiReady, Requirement::Required),
    (ConditionType::GlanceReady, Requirement::Required),
    (
        ConditionType::CinderReady,
        Requirement::Deferred {
            reason: "waiting on RabbitMQ transport URL integration",
        },
    ),
];

// =============================================================================
// Readiness State
// =============================================================================

/// Derived readiness of the composite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadinessState {
    #[default]
    NotReady,
    Ready,
}

impl ReadinessState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessState::Ready)
    }
}

impl From<bool> for ReadinessState {
    fn from(ready: bool) -> Self {
        if ready {
            ReadinessState::Ready
        } else {
            ReadinessState::NotReady
        }
    }
}

impl std::fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadinessState::NotReady => write!(f, "NotReady"),
            ReadinessState::Ready => write!(f, "Ready"),
        }
    }
}

// =============================================================================
// Readiness Policy
// =============================================================================

/// Which conditions must all be True for the composite to be ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessPolicy {
    entries: BTreeMap<ConditionType, Requirement>,
}

impl ReadinessPolicy {
    /// Policy built from [`CONTROL_PLANE_READINESS`]
    pub fn control_plane() -> Self {
        Self::from_table(CONTROL_PLANE_READINESS)
    }

    pub fn from_table(table: &[(ConditionType, Requirement)]) -> Self {
        Self {
            entries: table.iter().copied().collect(),
        }
    }

    /// Make a condition type mandatory
    pub fn require(mut self, condition_type: ConditionType) -> Self {
        self.entries.insert(condition_type, Requirement::Required);
        self
    }

    /// Keep tracking a condition type but exclude it from the aggregate
    pub fn defer(mut self, condition_type: ConditionType, reason: &'static str) -> Self {
        self.entries
            .insert(condition_type, Requirement::Deferred { reason });
        self
    }

    pub fn requirement(&self, condition_type: ConditionType) -> Option<Requirement> {
        self.entries.get(&condition_type).copied()
    }

    pub fn is_required(&self, condition_type: ConditionType) -> bool {
        matches!(self.requirement(condition_type), Some(Requirement::Required))
    }

    /// Required condition types, in canonical enum order
    pub fn required(&self) -> impl Iterator<Item = ConditionType> + '_ {
        self.entries
            .iter()
            .filter(|(t, r)| **r == Requirement::Required && **t != ConditionType::Ready)
            .map(|(t, _)| *t)
    }

    /// Deferred condition types with the reason they are excluded
    pub fn deferred(&self) -> impl Iterator<Item = (ConditionType, &'static str)> + '_ {
        self.entries.iter().filter_map(|(t, r)| match r {
            Requirement::Deferred { reason } => Some((*t, *reason)),
            Requirement::Required => None,
        })
    }

    /// Every tracked type, required or deferred
    pub fn tracked(&self) -> impl Iterator<Item = ConditionType> + '_ {
        self.entries.keys().copied()
    }

    /// True iff every required condition is present and True
    pub fn is_ready(&self, conditions: &Conditions) -> bool {
        self.required().all(|t| conditions.is_true(t))
    }

    /// Required conditions that are absent, False or Unknown
    pub fn unmet(&self, conditions: &Conditions) -> Vec<ConditionType> {
        self.required().filter(|t| !conditions.is_true(*t)).collect()
    }

    pub fn evaluate(&self, conditions: &Conditions) -> ReadinessState {
        self.is_ready(conditions).into()
    }

    /// Write the `Ready` summary condition and return the derived state.
    ///
    /// When not ready, the first unmet False condition is mirrored; if the
    /// unmet ones are only absent or Unknown the summary is Unknown.
    pub fn summarize(&self, conditions: &mut Conditions) -> ReadinessState {
        let unmet = self.unmet(conditions);
        if unmet.is_empty() {
            conditions.mark_true(ConditionType::Ready, "Setup complete");
            return ReadinessState::Ready;
        }

        let failing = unmet
            .iter()
            .filter_map(|t| conditions.get(*t))
            .find(|c| c.status == ConditionStatus::False)
            .cloned();

        let summary = match failing {
            Some(source) => Condition::new(
                ConditionType::Ready,
                ConditionStatus::False,
                source.reason.clone(),
                summary_message(&source),
            )
            .with_severity(source.severity.unwrap_or(ConditionSeverity::Warning)),
            None => Condition::new(
                ConditionType::Ready,
                ConditionStatus::Unknown,
                reasons::INIT,
                format!("Waiting for {}", join_types(&unmet)),
            ),
        };
        conditions.set(summary);
        ReadinessState::NotReady
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::control_plane()
    }
}

fn summary_message(source: &Condition) -> String {
    if source.message.is_empty() {
        format!("{} is False", source.condition_type)
    } else {
        format!("{}: {}", source.condition_type, source.message)
    }
}

fn join_types(types: &[ConditionType]) -> String {
    types
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
