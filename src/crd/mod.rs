//! Custom Resource Definitions for the OpenStack operator
//!
//! This module contains:
//! - OpenStackControlPlane: composite resource for the control plane services
//! - Conditions: the status condition store
//! - ReadinessPolicy: aggregation of sub-system conditions into readiness
//! - Subsystem / ServiceTemplate: the managed services and their templates
//! - Scheme: explicit CRD registration

pub mod condition;
pub mod control_plane;
pub mod readiness;
pub mod scheme;
pub mod subsystem;

pub use condition::*;
pub use control_plane::*;
pub use readiness::*;
pub use scheme::*;
pub use subsystem::*;

// Re-export common types for convenience
pub use chrono::{DateTime, Utc};
