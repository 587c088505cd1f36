//! Readiness Board
//!
//! Latest readiness snapshot of every reconciled control plane, shared with
//! status displays and the REST API. Snapshots are immutable and swapped
//! whole, so a reader sees either the previous or the next snapshot of an
//! object, never a mix.

use super::events::ReadinessEvent;
use crate::crd::{ConditionType, Conditions, ReadinessState};
use crate::domain::ObjectKey;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacity of the event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time readiness of one control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessSnapshot {
    pub key: ObjectKey,
    pub state: ReadinessState,
    /// Required conditions that are not True
    pub unmet: Vec<ConditionType>,
    pub conditions: Conditions,
    pub observed_generation: Option<i64>,
    pub observed_at: DateTime<Utc>,
}

impl ReadinessSnapshot {
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }
}

// =============================================================================
// Readiness Board
// =============================================================================

/// Concurrent map of readiness snapshots with change notifications
pub struct ReadinessBoard {
    entries: DashMap<ObjectKey, Arc<ReadinessSnapshot>>,
    event_sender: broadcast::Sender<ReadinessEvent>,
}

impl ReadinessBoard {
    pub fn new() -> Arc<Self> {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            entries: DashMap::new(),
            event_sender,
        })
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<ReadinessEvent> {
        self.event_sender.subscribe()
    }

    /// Replace the snapshot for its key.
    ///
    /// Returns the event emitted, if the publish was a first observation or a
    /// readiness transition.
    pub fn publish(&self, snapshot: ReadinessSnapshot) -> Option<ReadinessEvent> {
        let key = snapshot.key.clone();
        let state = snapshot.state;
        let unmet = snapshot.unmet.clone();

        let previous = self.entries.insert(key.clone(), Arc::new(snapshot));

        let event = match previous.map(|p| p.state) {
            None => Some(ReadinessEvent::Observed { key, state }),
            Some(prev) if prev == state => None,
            Some(_) => Some(match state {
                ReadinessState::Ready => ReadinessEvent::BecameReady { key },
                ReadinessState::NotReady => ReadinessEvent::BecameNotReady { key, unmet },
            }),
        };

        if let Some(event) = &event {
            if event.is_transition() {
                info!("Control plane {} is now {}", event.key(), state);
            } else {
                debug!("Control plane {} observed as {}", event.key(), state);
            }
            // No receivers is fine
            let _ = self.event_sender.send(event.clone());
        }
        event
    }

    pub fn get(&self, key: &ObjectKey) -> Option<Arc<ReadinessSnapshot>> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// All snapshots sorted by key
    pub fn list(&self) -> Vec<Arc<ReadinessSnapshot>> {
        let mut snapshots: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    pub fn remove(&self, key: &ObjectKey) -> Option<Arc<ReadinessSnapshot>> {
        let removed = self.entries.remove(key).map(|(_, snapshot)| snapshot);
        if removed.is_some() {
            let _ = self
                .event_sender
                .send(ReadinessEvent::Removed { key: key.clone() });
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ready_count(&self) -> usize {
        self.entries.iter().filter(|e| e.value().is_ready()).count()
    }
}
