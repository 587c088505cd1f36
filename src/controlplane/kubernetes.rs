//! Kubernetes Adapters
//!
//! Implementations of the domain ports against the Kubernetes API: the
//! control plane store over the typed `OpenStackControlPlane` API, and the
//! sub-system probe over untyped sub-resources.

use crate::crd::{ConditionStatus, OpenStackControlPlane, Scheme, Subsystem};
use crate::domain::{ControlPlaneStore, ObjectKey, ObservedCondition, SubsystemObservation, SubsystemProbe};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::discovery::ApiResource;
use kube::Client;
use serde::Deserialize;
use tracing::{debug, info};

const KIND: &str = "OpenStackControlPlane";

// =============================================================================
// Control Plane Store
// =============================================================================

pub struct KubeControlPlaneStore {
    client: Client,
    field_manager: String,
}

impl KubeControlPlaneStore {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api(&self, namespace: &str) -> Api<OpenStackControlPlane> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ControlPlaneStore for KubeControlPlaneStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<OpenStackControlPlane>> {
        match self.api(&key.namespace).get(&key.name).await {
            Ok(control_plane) => Ok(Some(control_plane)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<OpenStackControlPlane>> {
        let api: Api<OpenStackControlPlane> = match namespace {
            Some(ns) => self.api(ns),
            None => Api::all(self.client.clone()),
        };
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn replace_status(&self, control_plane: &OpenStackControlPlane) -> Result<OpenStackControlPlane> {
        let key = control_plane.key();
        let params = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        let body = serde_json::to_vec(control_plane)?;

        match self
            .api(&key.namespace)
            .replace_status(&key.name, &params, body)
            .await
        {
            Ok(stored) => Ok(stored),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(Error::Conflict {
                kind: KIND.to_string(),
                name: key.to_string(),
            }),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(Error::ResourceNotFound {
                kind: KIND.to_string(),
                name: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Sub-system Probe
// =============================================================================

/// Reads the readiness condition a sub-system operator publishes on its
/// resource
pub struct KubeSubsystemProbe {
    client: Client,
}

impl KubeSubsystemProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// API resource descriptor for a sub-system's kind
pub fn api_resource(subsystem: Subsystem) -> ApiResource {
    ApiResource {
        group: subsystem.group().to_string(),
        version: subsystem.version().to_string(),
        api_version: subsystem.api_version(),
        kind: subsystem.kind().to_string(),
        plural: subsystem.plural().to_string(),
    }
}

#[async_trait]
impl SubsystemProbe for KubeSubsystemProbe {
    async fn observe(&self, namespace: &str, subsystem: Subsystem) -> Result<SubsystemObservation> {
        let resource = api_resource(subsystem);
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &resource);

        match api.get(subsystem.instance_name()).await {
            Ok(object) => {
                let observation = parse_observation(subsystem, &object.data)?;
                debug!("{}/{} observed as {:?}", namespace, subsystem, observation);
                Ok(observation)
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(SubsystemObservation::Missing),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Deserialize)]
struct PublishedCondition {
    #[serde(rename = "type")]
    condition_type: String,
    status: ConditionStatus,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

/// Extract the readiness condition from a sub-resource document
pub fn parse_observation(subsystem: Subsystem, data: &serde_json::Value) -> Result<SubsystemObservation> {
    let malformed = |reason: String| Error::MalformedStatus {
        kind: subsystem.kind().to_string(),
        name: subsystem.instance_name().to_string(),
        reason,
    };

    let conditions = match data.get("status").and_then(|s| s.get("conditions")) {
        None | Some(serde_json::Value::Null) => return Ok(SubsystemObservation::Pending),
        Some(conditions) => conditions,
    };

    let conditions: Vec<PublishedCondition> = serde_json::from_value(conditions.clone())
        .map_err(|e| malformed(format!("status.conditions: {}", e)))?;

    Ok(conditions
        .into_iter()
        .find(|c| c.condition_type == subsystem.readiness_condition())
        .map(|c| {
            SubsystemObservation::Reported(ObservedCondition {
                status: c.status,
                reason: c.reason,
                message: c.message,
            })
        })
        .unwrap_or(SubsystemObservation::Pending))
}

// =============================================================================
// CRD Installation
// =============================================================================

/// Server-side apply every definition in the scheme
pub async fn install_crds(client: Client, scheme: &Scheme, field_manager: &str) -> Result<()> {
    let api: Api<CustomResourceDefinition> = Api::all(client);
    let params = PatchParams::apply(field_manager).force();

    for crd in scheme.definitions() {
        let name = crd
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::Internal("CRD without a name".to_string()))?;
        api.patch(&name, &params, &Patch::Apply(crd)).await?;
        info!("Installed CRD {}", name);
    }
    Ok(())
}
