//! OpenStack Operator - Control Plane Readiness
//!
//! A Kubernetes operator that aggregates the OpenStack control plane services
//! (Keystone, Placement, Glance, Cinder, MariaDB, RabbitMQ) into one
//! `OpenStackControlPlane` resource whose status reports per-service
//! conditions and a single readiness verdict.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                        OpenStackControlPlane (CRD)                           │
//! │          spec: service templates      status: conditions[Ready, ...]        │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │   Controller    │  │   Reconciler    │  │    Readiness Policy         │  │
//! │  │  (kube runtime) │─▶│  observe/ingest │─▶│  required table + summary   │  │
//! │  └─────────────────┘  └────────┬────────┘  └─────────────────────────────┘  │
//! │                                │                                             │
//! │                    ┌───────────┴───────────┐                                │
//! │                    │   Readiness Board     │──▶ REST API / metrics          │
//! │                    └───────────────────────┘                                │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                              Sub-systems                                     │
//! │   KeystoneAPI   PlacementAPI   Glance   Cinder   MariaDB   RabbitmqCluster   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: Reconciler, controller, readiness board and APIs
//! - [`crd`]: Custom Resource Definitions, conditions and readiness policy
//! - [`domain`]: Ports to the resource-management framework
//! - [`error`]: Error types and handling

pub mod controlplane;
pub mod crd;
pub mod domain;
pub mod error;

// Re-export commonly used types
pub use controlplane::{
    ApiServer, ApiServerConfig, Context, ControllerConfig, KubeControlPlaneStore,
    KubeSubsystemProbe, Metrics, ReadinessBoard, ReadinessEvent, ReadinessSnapshot, Reconciler,
};

pub use crd::{
    Condition, ConditionSeverity, ConditionStatus, ConditionType, Conditions,
    OpenStackControlPlane, OpenStackControlPlaneSpec, OpenStackControlPlaneStatus,
    ReadinessPolicy, ReadinessState, Requirement, Scheme, ServiceTemplate, Subsystem,
};

pub use domain::ports::{
    ControlPlaneStore, ObjectKey, ObservedCondition, SubsystemObservation, SubsystemProbe,
};

pub use error::{Error, ErrorAction, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
