//! In-memory implementations of the domain ports for tests

use crate::crd::{ConditionStatus, OpenStackControlPlane, OpenStackControlPlaneSpec, Subsystem};
use crate::domain::{
    ControlPlaneStore, ObjectKey, ObservedCondition, SubsystemObservation, SubsystemProbe,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use kube::api::ObjectMeta;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<ObjectKey, OpenStackControlPlane>>,
    pub writes: AtomicUsize,
}

impl MemoryStore {
    /// Store an object at resourceVersion 1 and return the stored copy
    pub fn insert(&self, mut control_plane: OpenStackControlPlane) -> OpenStackControlPlane {
        control_plane.metadata.resource_version = Some("1".into());
        self.objects
            .lock()
            .insert(control_plane.key(), control_plane.clone());
        control_plane
    }

    /// Simulate another writer bumping the resourceVersion
    pub fn touch(&self, key: &ObjectKey) {
        if let Some(cp) = self.objects.lock().get_mut(key) {
            cp.metadata.resource_version = Some(bump(&cp.metadata.resource_version));
        }
    }

    /// Simulate a user edit, bumping the resourceVersion
    pub fn edit(&self, key: &ObjectKey, f: impl FnOnce(&mut OpenStackControlPlane)) {
        if let Some(cp) = self.objects.lock().get_mut(key) {
            f(cp);
            cp.metadata.resource_version = Some(bump(&cp.metadata.resource_version));
        }
    }

    pub fn delete(&self, key: &ObjectKey) {
        self.objects.lock().remove(key);
    }

    pub fn stored(&self, key: &ObjectKey) -> OpenStackControlPlane {
        self.objects.lock().get(key).cloned().unwrap()
    }
}

fn bump(version: &Option<String>) -> String {
    let current: u64 = version.as_deref().unwrap_or("0").parse().unwrap();
    (current + 1).to_string()
}

#[async_trait]
impl ControlPlaneStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<OpenStackControlPlane>> {
        Ok(self.objects.lock().get(key).cloned())
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<OpenStackControlPlane>> {
        Ok(self
            .objects
            .lock()
            .values()
            .filter(|cp| namespace.map_or(true, |ns| cp.key().namespace == ns))
            .cloned()
            .collect())
    }

    async fn replace_status(&self, control_plane: &OpenStackControlPlane) -> Result<OpenStackControlPlane> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let key = control_plane.key();
        let mut objects = self.objects.lock();
        let stored = objects.get_mut(&key).ok_or_else(|| Error::ResourceNotFound {
            kind: "OpenStackControlPlane".into(),
            name: key.to_string(),
        })?;
        if stored.metadata.resource_version != control_plane.metadata.resource_version {
            return Err(Error::Conflict {
                kind: "OpenStackControlPlane".into(),
                name: key.to_string(),
            });
        }
        stored.status = control_plane.status.clone();
        stored.metadata.resource_version = Some(bump(&stored.metadata.resource_version));
        Ok(stored.clone())
    }
}

#[derive(Default)]
pub struct StaticProbe {
    observations: Mutex<HashMap<Subsystem, SubsystemObservation>>,
    pub malformed: Mutex<Option<Subsystem>>,
}

impl StaticProbe {
    pub fn all_ready() -> Self {
        let probe = Self::default();
        for subsystem in Subsystem::ALL {
            probe.report(subsystem, ConditionStatus::True, "Ready", "Setup complete");
        }
        probe
    }

    pub fn report(&self, subsystem: Subsystem, status: ConditionStatus, reason: &str, message: &str) {
        self.set(
            subsystem,
            SubsystemObservation::Reported(ObservedCondition {
                status,
                reason: reason.into(),
                message: message.into(),
            }),
        );
    }

    pub fn set(&self, subsystem: Subsystem, observation: SubsystemObservation) {
        self.observations.lock().insert(subsystem, observation);
    }
}

#[async_trait]
impl SubsystemProbe for StaticProbe {
    async fn observe(&self, _namespace: &str, subsystem: Subsystem) -> Result<SubsystemObservation> {
        if *self.malformed.lock() == Some(subsystem) {
            return Err(Error::MalformedStatus {
                kind: subsystem.kind().into(),
                name: subsystem.instance_name().into(),
                reason: "status.conditions is not a list".into(),
            });
        }
        Ok(self
            .observations
            .lock()
            .get(&subsystem)
            .cloned()
            .unwrap_or(SubsystemObservation::Missing))
    }
}

pub fn control_plane(name: &str) -> OpenStackControlPlane {
    OpenStackControlPlane {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some("openstack".into()),
            generation: Some(3),
            ..Default::default()
        },
        spec: OpenStackControlPlaneSpec {
            secret: "osp-secret".into(),
            storage_class: "local-storage".into(),
            ..Default::default()
        },
        status: None,
    }
}
