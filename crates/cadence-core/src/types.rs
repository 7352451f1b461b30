use serde::{Deserialize, Serialize};
use std::fmt;

/// API group, version and kind of a resource type.
///
/// The core group is the empty string, so `v1` Pods have `group == ""`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    /// Split an `apiVersion` such as `apps/v1` or `v1`
    pub fn from_api_version_kind(api_version: &str, kind: &str) -> Self {
        let (group, version) = api_version.split_once('/').unwrap_or(("", api_version));
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    /// The `apiVersion` field value for this kind
    pub fn api_version(&self) -> String {
        match self.group.as_str() {
            "" => self.version.clone(),
            group => format!("{}/{}", group, self.version),
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

/// Identity of one object: kind, namespace and name.
///
/// Reconcile passes are keyed by this; two keys are equal exactly when they
/// name the same stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub gvk: GroupVersionKind,
    /// Empty for cluster-scoped kinds
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(gvk: GroupVersionKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            gvk,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn cluster_scoped(gvk: GroupVersionKind, name: impl Into<String>) -> Self {
        Self::new(gvk, String::new(), name)
    }

    pub fn is_namespaced(&self) -> bool {
        !self.namespace.is_empty()
    }

    /// Key under which the object is stored, e.g. `apps/v1/Deployment/default/web`
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.gvk)?;
        if self.is_namespaced() {
            write!(f, "/{}", self.namespace)?;
        }
        write!(f, "/{}", self.name)
    }
}

/// Opaque `metadata.resourceVersion`; the id of the commit that last wrote
/// the object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVersion(String);

impl ResourceVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_version_round_trips_through_gvk() {
        for (api_version, group, version) in [
            ("v1", "", "v1"),
            ("apps/v1", "apps", "v1"),
            ("samplecontroller.k8s.io/v1alpha1", "samplecontroller.k8s.io", "v1alpha1"),
        ] {
            let gvk = GroupVersionKind::from_api_version_kind(api_version, "Kind");
            assert_eq!(gvk.group, group);
            assert_eq!(gvk.version, version);
            assert_eq!(gvk.api_version(), api_version);
        }
    }

    #[test]
    fn test_storage_key_layout() {
        let pod = GroupVersionKind::from_api_version_kind("v1", "Pod");
        assert_eq!(
            ResourceKey::new(pod.clone(), "default", "chaos").storage_key(),
            "v1/Pod/default/chaos"
        );
        assert_eq!(
            ResourceKey::cluster_scoped(pod, "chaos").storage_key(),
            "v1/Pod/chaos"
        );

        let foo = GroupVersionKind::from_api_version_kind("samplecontroller.k8s.io/v1alpha1", "Foo");
        let key = ResourceKey::new(foo, "team-a", "example");
        assert_eq!(
            key.to_string(),
            "samplecontroller.k8s.io/v1alpha1/Foo/team-a/example"
        );
    }

    #[test]
    fn test_resource_version_is_a_bare_string() {
        let version = ResourceVersion::new("c0ffee");
        assert_eq!(serde_json::to_string(&version).unwrap(), "\"c0ffee\"");
        assert_eq!(version.as_str(), "c0ffee");
    }
}
