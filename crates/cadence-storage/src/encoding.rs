use cadence_core::ResourceKey;
use std::fmt;

/// Key encoder for storage keys
pub struct KeyEncoder;

impl KeyEncoder {
    /// Encode a resource key: {api_version}/{kind}/{namespace}/{name}
    /// For cluster-scoped: {api_version}/{kind}/{name}
    pub fn encode_resource_key(key: &ResourceKey) -> String {
        key.storage_key()
    }

    /// Encode a prefix for scanning resources of a kind, optionally within a namespace
    pub fn encode_prefix(api_version: &str, kind: &str, namespace: Option<&str>) -> String {
        if let Some(ns) = namespace {
            format!("{}/{}/{}/", api_version, kind, ns)
        } else {
            format!("{}/{}/", api_version, kind)
        }
    }
}

/// Index key types for secondary indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexKey {
    /// Index by owner UID: owner/{owner_uid}/{dependent storage key}
    ///
    /// The entry's value is the dependent's storage key.
    Owner {
        owner_uid: String,
        dependent_key: String,
    },

    /// Index by UID: uid/{uid}
    ///
    /// The entry's value is the object's storage key.
    Uid { uid: String },
}

impl IndexKey {
    /// Encode the index key to a string
    pub fn encode(&self) -> String {
        match self {
            IndexKey::Owner {
                owner_uid,
                dependent_key,
            } => format!("owner/{}/{}", owner_uid, dependent_key),
            IndexKey::Uid { uid } => format!("uid/{}", uid),
        }
    }

    /// Encode a prefix for scanning the dependents of one owner
    pub fn encode_prefix_for_owner(owner_uid: &str) -> String {
        format!("owner/{}/", owner_uid)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::GroupVersionKind;

    #[test]
    fn test_encode_resource_key() {
        let gvk = GroupVersionKind::from_api_version_kind("v1", "Pod");
        let key = ResourceKey::new(gvk, "default", "nginx");
        assert_eq!(KeyEncoder::encode_resource_key(&key), "v1/Pod/default/nginx");

        let gvk = GroupVersionKind::from_api_version_kind("chaosapps.metamagical.io/v1", "ChaosPod");
        let key = ResourceKey::new(gvk, "default", "chaos");
        assert_eq!(
            KeyEncoder::encode_resource_key(&key),
            "chaosapps.metamagical.io/v1/ChaosPod/default/chaos"
        );
    }

    #[test]
    fn test_encode_prefix() {
        assert_eq!(
            KeyEncoder::encode_prefix("v1", "Pod", Some("default")),
            "v1/Pod/default/"
        );
        assert_eq!(
            KeyEncoder::encode_prefix("apps/v1", "Deployment", None),
            "apps/v1/Deployment/"
        );
    }

    #[test]
    fn test_index_key_owner() {
        let key = IndexKey::Owner {
            owner_uid: "1234".to_string(),
            dependent_key: "v1/Pod/default/chaos".to_string(),
        };
        assert_eq!(key.encode(), "owner/1234/v1/Pod/default/chaos");
        assert!(key
            .encode()
            .starts_with(&IndexKey::encode_prefix_for_owner("1234")));
    }

    #[test]
    fn test_index_key_uid() {
        let key = IndexKey::Uid {
            uid: "1234".to_string(),
        };
        assert_eq!(key.to_string(), "uid/1234");
    }
}
