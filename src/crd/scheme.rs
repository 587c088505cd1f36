//! CRD Registration
//!
//! The hosting process builds the scheme once at startup and hands it to
//! whatever needs the definitions: `crdgen` prints them, the installer
//! applies them. Nothing reads a process-wide registry at runtime.

use super::OpenStackControlPlane;
use crate::error::Result;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

/// Set of custom resource definitions served by this operator
#[derive(Debug, Clone, Default)]
pub struct Scheme {
    definitions: Vec<CustomResourceDefinition>,
}

impl Scheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom resource type; registering twice is a no-op
    pub fn register<K: CustomResourceExt>(mut self) -> Self {
        let name = K::crd_name();
        if !self.contains(name) {
            self.definitions.push(K::crd());
        }
        self
    }

    pub fn contains(&self, crd_name: &str) -> bool {
        self.definitions
            .iter()
            .any(|crd| crd.metadata.name.as_deref() == Some(crd_name))
    }

    pub fn definitions(&self) -> &[CustomResourceDefinition] {
        &self.definitions
    }

    /// Multi-document YAML, one CRD per document
    pub fn to_yaml(&self) -> Result<String> {
        let mut out = String::new();
        for crd in &self.definitions {
            out.push_str("---\n");
            out.push_str(&serde_yaml::to_string(crd)?);
        }
        Ok(out)
    }
}

/// Scheme with every type this operator owns
pub fn scheme() -> Scheme {
    Scheme::new().register::<OpenStackControlPlane>()
}
