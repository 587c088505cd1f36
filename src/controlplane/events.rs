//! Readiness Events
//!
//! Events emitted by the readiness board for external consumers to react to
//! control plane readiness changes.

use crate::crd::{ConditionType, ReadinessState};
use crate::domain::ObjectKey;
use serde::{Deserialize, Serialize};

/// Events emitted by the readiness board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadinessEvent {
    /// First snapshot published for a control plane
    Observed {
        key: ObjectKey,
        state: ReadinessState,
    },

    /// Last required condition flipped to True
    BecameReady { key: ObjectKey },

    /// A required condition left True
    BecameNotReady {
        key: ObjectKey,
        unmet: Vec<ConditionType>,
    },

    /// The control plane was deleted
    Removed { key: ObjectKey },
}

impl ReadinessEvent {
    /// Get the control plane this event is about
    pub fn key(&self) -> &ObjectKey {
        match self {
            ReadinessEvent::Observed { key, .. } => key,
            ReadinessEvent::BecameReady { key } => key,
            ReadinessEvent::BecameNotReady { key, .. } => key,
            ReadinessEvent::Removed { key } => key,
        }
    }

    /// Check if this event changes the readiness state
    pub fn is_transition(&self) -> bool {
        matches!(
            self,
            ReadinessEvent::BecameReady { .. } | ReadinessEvent::BecameNotReady { .. }
        )
    }
}
