pub mod chaospod;
pub mod foo;

pub use chaospod::{ChaosPod, ChaosPodSpec, ChaosPodStatus};
pub use foo::{Foo, FooSpec, FooStatus, DEFAULT_FOO_IMAGE};

use crate::{GroupVersionKind, ResourceKey, ResourceVersion};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Namespace assigned to namespaced resources that do not declare one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Name checks shared by every kind
pub fn validate_base(metadata: &ObjectMeta) -> Result<(), ResourceError> {
    match &metadata.name {
        None => Err(ResourceError::MissingField("metadata.name".to_string())),
        Some(name) if !is_valid_name(name) => Err(ResourceError::InvalidName(name.clone())),
        Some(_) => Ok(()),
    }
}

/// Trait for resources the controller reads and writes
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// API version, e.g. "v1" or "apps/v1"
    const API_VERSION: &'static str;

    /// Kind, e.g. "Pod"
    const KIND: &'static str;

    /// Whether instances live inside a namespace
    const NAMESPACED: bool = true;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn gvk() -> GroupVersionKind {
        GroupVersionKind::from_api_version_kind(Self::API_VERSION, Self::KIND)
    }

    /// Build the key of an instance of this kind
    fn key_for(namespace: &str, name: &str) -> ResourceKey {
        if Self::NAMESPACED {
            ResourceKey::new(Self::gvk(), namespace, name)
        } else {
            ResourceKey::cluster_scoped(Self::gvk(), name)
        }
    }

    /// Key of this object; unnamespaced objects land in [`DEFAULT_NAMESPACE`]
    fn resource_key(&self) -> Result<ResourceKey, ResourceError> {
        let metadata = self.metadata();
        let name = metadata
            .name
            .as_deref()
            .ok_or_else(|| ResourceError::MissingField("metadata.name".to_string()))?;
        let namespace = metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);

        Ok(Self::key_for(namespace, name))
    }

    /// Commit that last wrote this object, if it has been stored
    fn resource_version(&self) -> Option<ResourceVersion> {
        self.metadata()
            .resource_version
            .as_ref()
            .map(ResourceVersion::new)
    }

    fn set_resource_version(&mut self, version: ResourceVersion) {
        self.metadata_mut().resource_version = Some(version.into_inner());
    }

    fn uid(&self) -> Option<String> {
        self.metadata().uid.clone()
    }

    /// Structural checks run before the object is stored or reconciled
    fn validate(&self) -> Result<(), ResourceError> {
        validate_base(self.metadata())
    }
}

/// Resource-related errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid resource name: {0}")]
    InvalidName(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Validate a resource name (DNS-1123 subdomain)
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    let starts_ok = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let ends_ok = name
        .chars()
        .last()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());

    starts_ok
        && ends_ok
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
}

impl Resource for Pod {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "Pod";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn validate(&self) -> Result<(), ResourceError> {
        validate_base(&self.metadata)?;

        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| ResourceError::MissingField("spec".to_string()))?;
        if spec.containers.is_empty() {
            return Err(ResourceError::ValidationFailed(
                "Pod must have at least one container".to_string(),
            ));
        }

        Ok(())
    }
}

impl Resource for Deployment {
    const API_VERSION: &'static str = "apps/v1";
    const KIND: &'static str = "Deployment";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
