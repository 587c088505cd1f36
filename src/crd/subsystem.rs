//! Managed Sub-systems
//!
//! Catalogue of the OpenStack services a control plane aggregates, and the
//! opaque, version-tagged templates that carry their configuration.

use super::condition::ConditionType;
use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Subsystem Catalogue
// =============================================================================

/// An independently reconciled service owned by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Keystone,
    Placement,
    Glance,
    Cinder,
    MariaDb,
    RabbitMq,
}

impl Subsystem {
    pub const ALL: [Subsystem; 6] = [
        Subsystem::Keystone,
        Subsystem::Placement,
        Subsystem::Glance,
        Subsystem::Cinder,
        Subsystem::MariaDb,
        Subsystem::RabbitMq,
    ];

    /// Condition this sub-system feeds in the control plane status
    pub fn condition_type(&self) -> ConditionType {
        match self {
            Subsystem::Keystone => ConditionType::KeystoneApiReady,
            Subsystem::Placement => ConditionType::PlacementApiReady,
            Subsystem::Glance => ConditionType::GlanceReady,
            Subsystem::Cinder => ConditionType::CinderReady,
            Subsystem::MariaDb => ConditionType::MariaDbReady,
            Subsystem::RabbitMq => ConditionType::RabbitMqReady,
        }
    }

    /// Kind of the sub-resource
    pub fn kind(&self) -> &'static str {
        match self {
            Subsystem::Keystone => "KeystoneAPI",
            Subsystem::Placement => "PlacementAPI",
            Subsystem::Glance => "Glance",
            Subsystem::Cinder => "Cinder",
            Subsystem::MariaDb => "MariaDB",
            Subsystem::RabbitMq => "RabbitmqCluster",
        }
    }

    pub fn group(&self) -> &'static str {
        match self {
            Subsystem::Keystone => "keystone.openstack.org",
            Subsystem::Placement => "placement.openstack.org",
            Subsystem::Glance => "glance.openstack.org",
            Subsystem::Cinder => "cinder.openstack.org",
            Subsystem::MariaDb => "mariadb.openstack.org",
            Subsystem::RabbitMq => "rabbitmq.com",
        }
    }

    /// Schema version this operator understands
    pub fn version(&self) -> &'static str {
        "v1beta1"
    }

    pub fn plural(&self) -> &'static str {
        match self {
            Subsystem::Keystone => "keystoneapis",
            Subsystem::Placement => "placementapis",
            Subsystem::Glance => "glances",
            Subsystem::Cinder => "cinders",
            Subsystem::MariaDb => "mariadbs",
            Subsystem::RabbitMq => "rabbitmqclusters",
        }
    }

    /// `group/version` as written in `apiVersion`
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group(), self.version())
    }

    /// Name of the sub-resource instance inside the control plane namespace
    pub fn instance_name(&self) -> &'static str {
        match self {
            Subsystem::Keystone => "keystone",
            Subsystem::Placement => "placement",
            Subsystem::Glance => "glance",
            Subsystem::Cinder => "cinder",
            Subsystem::MariaDb => "openstack",
            Subsystem::RabbitMq => "rabbitmq",
        }
    }

    /// Condition type the sub-resource publishes to signal readiness
    pub fn readiness_condition(&self) -> &'static str {
        match self {
            Subsystem::RabbitMq => "ClusterAvailable",
            _ => "Ready",
        }
    }
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subsystem::Keystone => write!(f, "keystone"),
            Subsystem::Placement => write!(f, "placement"),
            Subsystem::Glance => write!(f, "glance"),
            Subsystem::Cinder => write!(f, "cinder"),
            Subsystem::MariaDb => write!(f, "mariadb"),
            Subsystem::RabbitMq => write!(f, "rabbitmq"),
        }
    }
}

// =============================================================================
// Service Template
// =============================================================================

/// Configuration overrides for one sub-system.
///
/// The embedded spec is passed through untouched to the sub-system's own
/// operator; only its schema version tag is checked here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTemplate {
    /// Schema version the embedded spec was written for, e.g.
    /// `keystone.openstack.org/v1beta1`. Defaults to the supported version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Sub-system spec overrides
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub spec: serde_json::Map<String, serde_json::Value>,
}

impl ServiceTemplate {
    pub fn new(spec: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            api_version: None,
            spec,
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    /// Reject templates written against a schema this operator does not speak
    pub fn check_compatible(&self, subsystem: Subsystem) -> Result<()> {
        let expected = subsystem.api_version();
        match &self.api_version {
            Some(found) if *found != expected => Err(Error::IncompatibleTemplate {
                subsystem: subsystem.kind().to_string(),
                found: found.clone(),
                expected,
            }),
            _ => Ok(()),
        }
    }
}

/// Schema for opaque objects the API server must store verbatim
fn preserve_unknown_fields(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    let mut schema = schemars::schema::SchemaObject {
        instance_type: Some(schemars::schema::InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".into(),
        serde_json::Value::Bool(true),
    );
    schemars::schema::Schema::Object(schema)
}
