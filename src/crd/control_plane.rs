//! OpenStackControlPlane CRD
//!
//! Composite resource aggregating the identity, placement, image,
//! block-storage, database and messaging services of an OpenStack deployment
//! into one desired/observed state record.

use super::condition::Conditions;
use super::readiness::{ReadinessPolicy, ReadinessState};
use super::subsystem::{ServiceTemplate, Subsystem};
use crate::domain::ObjectKey;
use crate::error::Result;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// OpenStackControlPlane CRD
// =============================================================================

/// OpenStackControlPlane is the desired state of an OpenStack control plane.
/// Each sub-system is rendered from its template and reconciled by its own
/// operator; this resource only aggregates their readiness.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "core.openstack.org",
    version = "v1beta1",
    kind = "OpenStackControlPlane",
    plural = "openstackcontrolplanes",
    shortname = "osctlplane",
    shortname = "osctlplanes",
    status = "OpenStackControlPlaneStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name": "Status", "type": "string", "description": "Status", "jsonPath": ".status.conditions[0].status"}"#,
    printcolumn = r#"{"name": "Message", "type": "string", "description": "Message", "jsonPath": ".status.conditions[0].message"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct OpenStackControlPlaneSpec {
    /// Secret holding the service passwords
    #[serde(default)]
    pub secret: String,

    /// Storage class used for persistent volumes
    #[serde(default)]
    pub storage_class: String,

    /// Node selector for the control plane services
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Overrides for the Keystone API service
    #[serde(default)]
    pub keystone_template: ServiceTemplate,

    /// Overrides for the Placement API
    #[serde(default)]
    pub placement_template: ServiceTemplate,

    /// Overrides for the Glance service
    #[serde(default)]
    pub glance_template: ServiceTemplate,

    /// Overrides for Cinder
    #[serde(default)]
    pub cinder_template: ServiceTemplate,

    /// Overrides for the MariaDB instance
    #[serde(default)]
    pub mariadb_template: ServiceTemplate,

    /// Overrides for the RabbitMQ cluster
    #[serde(default)]
    pub rabbitmq_template: ServiceTemplate,
}

// =============================================================================
// Status
// =============================================================================

/// Observed state of the OpenStackControlPlane
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenStackControlPlaneStatus {
    /// Conditions, `Ready` summary first
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,

    /// Spec generation the conditions were computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

// =============================================================================
// Implementations
// =============================================================================

impl OpenStackControlPlaneSpec {
    /// Template for a sub-system
    pub fn template(&self, subsystem: Subsystem) -> &ServiceTemplate {
        match subsystem {
            Subsystem::Keystone => &self.keystone_template,
            Subsystem::Placement => &self.placement_template,
            Subsystem::Glance => &self.glance_template,
            Subsystem::Cinder => &self.cinder_template,
            Subsystem::MariaDb => &self.mariadb_template,
            Subsystem::RabbitMq => &self.rabbitmq_template,
        }
    }

    /// Check every template against the schema versions this operator supports
    pub fn check_templates(&self) -> Result<()> {
        for subsystem in Subsystem::ALL {
            self.template(subsystem).check_compatible(subsystem)?;
        }
        Ok(())
    }
}

impl OpenStackControlPlane {
    /// Ready to serve requests under the default readiness policy
    pub fn is_ready(&self) -> bool {
        self.is_ready_with(&ReadinessPolicy::control_plane())
    }

    pub fn is_ready_with(&self, policy: &ReadinessPolicy) -> bool {
        self.status
            .as_ref()
            .map(|s| policy.is_ready(&s.conditions))
            .unwrap_or(false)
    }

    pub fn readiness(&self, policy: &ReadinessPolicy) -> ReadinessState {
        self.is_ready_with(policy).into()
    }

    /// Conditions, empty when no status has been written yet
    pub fn conditions(&self) -> Conditions {
        self.status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default()
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace().unwrap_or_default(), self.name_any())
    }
}
