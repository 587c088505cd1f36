//! Domain Ports - Core trait definitions for the control plane operator
//!
//! These traits define the boundaries between readiness aggregation and the
//! resource-management framework that persists objects and hosts the
//! sub-resources. Adapters implement these traits to provide concrete
//! functionality.

use crate::crd::{ConditionStatus, OpenStackControlPlane, Subsystem};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Object Key
// =============================================================================

/// Identity of a namespaced object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// =============================================================================
// Sub-resource Observation
// =============================================================================

/// Readiness condition as published by a sub-resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedCondition {
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
}

/// What a probe saw when looking at a sub-resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubsystemObservation {
    /// The sub-resource does not exist
    Missing,
    /// The sub-resource exists but has not published its readiness condition
    Pending,
    /// The sub-resource's readiness condition
    Reported(ObservedCondition),
}

// =============================================================================
// Control Plane Store Port
// =============================================================================

/// Port for persisting control plane objects.
///
/// Writes carry the object's `resourceVersion`; a write based on a stale
/// version must fail with [`crate::Error::Conflict`] rather than overwrite.
#[async_trait]
pub trait ControlPlaneStore: Send + Sync {
    /// Fetch the current object, `None` once deleted
    async fn get(&self, key: &ObjectKey) -> Result<Option<OpenStackControlPlane>>;

    /// List objects, across all namespaces when `namespace` is `None`
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<OpenStackControlPlane>>;

    /// Replace the status subresource, returning the stored object
    async fn replace_status(&self, control_plane: &OpenStackControlPlane) -> Result<OpenStackControlPlane>;
}

// =============================================================================
// Subsystem Probe Port
// =============================================================================

/// Port for reading a sub-resource's published readiness
#[async_trait]
pub trait SubsystemProbe: Send + Sync {
    /// Observe the sub-system instance belonging to the control plane in `namespace`
    async fn observe(&self, namespace: &str, subsystem: Subsystem) -> Result<SubsystemObservation>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ControlPlaneStoreRef = Arc<dyn ControlPlaneStore>;
pub type SubsystemProbeRef = Arc<dyn SubsystemProbe>;
