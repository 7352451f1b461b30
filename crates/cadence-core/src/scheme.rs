//! Scheme registry mapping API versions and kinds to concrete resource types.
//!
//! A scheme is assembled once at startup, then installed as the process-wide
//! registry with [`Scheme::install`]. After installation it is read-only.

use crate::resources::{ChaosPod, Foo, Resource, DEFAULT_NAMESPACE};
use crate::{CadenceError, GroupVersionKind, ResourceKey, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

static GLOBAL_SCHEME: OnceLock<Scheme> = OnceLock::new();

/// Registration details for one kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindInfo {
    pub gvk: GroupVersionKind,
    pub namespaced: bool,
}

/// Registry of known resource kinds, keyed by (apiVersion, kind)
#[derive(Debug, Clone, Default)]
pub struct Scheme {
    kinds: HashMap<(String, String), KindInfo>,
}

impl Scheme {
    /// Create an empty scheme
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheme with every kind the controllers know about
    pub fn with_defaults() -> Result<Self> {
        let mut scheme = Self::new();
        scheme.register::<Pod>()?;
        scheme.register::<Deployment>()?;
        scheme.register::<ChaosPod>()?;
        scheme.register::<Foo>()?;
        Ok(scheme)
    }

    /// Register a resource type
    pub fn register<T: Resource>(&mut self) -> Result<()> {
        let entry = (T::API_VERSION.to_string(), T::KIND.to_string());
        if self.kinds.contains_key(&entry) {
            return Err(CadenceError::duplicate_kind(T::KIND));
        }

        debug!("Registering kind {}/{}", T::API_VERSION, T::KIND);
        self.kinds.insert(
            entry,
            KindInfo {
                gvk: T::gvk(),
                namespaced: T::NAMESPACED,
            },
        );
        Ok(())
    }

    /// Look up a registered kind
    pub fn lookup(&self, api_version: &str, kind: &str) -> Option<&KindInfo> {
        self.kinds
            .get(&(api_version.to_string(), kind.to_string()))
    }

    /// Check whether `T` has been registered
    pub fn recognizes<T: Resource>(&self) -> bool {
        self.lookup(T::API_VERSION, T::KIND).is_some()
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Resolve the key of a raw object (e.g. a manifest document)
    pub fn key_of(&self, object: &serde_json::Value) -> Result<ResourceKey> {
        let api_version = object
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let kind = object
            .get("kind")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let info = self
            .lookup(api_version, kind)
            .ok_or_else(|| CadenceError::invalid_kind(api_version, kind))?;

        let name = object
            .pointer("/metadata/name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                CadenceError::invalid_resource(
                    format!("{}/{} has no metadata.name", api_version, kind),
                    "Give every object a metadata.name",
                )
            })?;

        if info.namespaced {
            let namespace = object
                .pointer("/metadata/namespace")
                .and_then(|v| v.as_str())
                .unwrap_or(DEFAULT_NAMESPACE);
            Ok(ResourceKey::new(info.gvk.clone(), namespace, name))
        } else {
            Ok(ResourceKey::cluster_scoped(info.gvk.clone(), name))
        }
    }

    /// Resolve the key an owner reference points at.
    ///
    /// Owner references are namespace-local, so namespaced owners live in the
    /// dependent's namespace.
    pub fn owner_key(
        &self,
        owner: &OwnerReference,
        dependent_namespace: &str,
    ) -> Option<ResourceKey> {
        let info = self.lookup(&owner.api_version, &owner.kind)?;
        if info.namespaced {
            Some(ResourceKey::new(
                info.gvk.clone(),
                dependent_namespace,
                owner.name.as_str(),
            ))
        } else {
            Some(ResourceKey::cluster_scoped(info.gvk.clone(), owner.name.as_str()))
        }
    }

    /// Install this scheme as the process-wide registry
    pub fn install(self) -> Result<&'static Scheme> {
        GLOBAL_SCHEME
            .set(self)
            .map_err(|_| CadenceError::SchemeAlreadyInstalled)?;
        GLOBAL_SCHEME
            .get()
            .ok_or_else(|| CadenceError::internal_error("Scheme missing after install"))
    }

    /// The installed process-wide registry, if any
    pub fn global() -> Option<&'static Scheme> {
        GLOBAL_SCHEME.get()
    }
}
