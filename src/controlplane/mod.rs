//! Control Plane Module
//!
//! Reconciles `OpenStackControlPlane` objects: observes the sub-systems,
//! aggregates their readiness, persists status and publishes snapshots for
//! the REST API and metrics.

pub mod api;
pub mod board;
pub mod controller;
pub mod events;
pub mod kubernetes;
pub mod metrics;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod testing;

pub use api::*;
pub use board::*;
pub use controller::{
    backoff_delay, error_policy, reconcile, run, Context, ControllerConfig, Diagnostics,
};
pub use events::*;
pub use kubernetes::*;
pub use metrics::*;
pub use reconciler::*;
