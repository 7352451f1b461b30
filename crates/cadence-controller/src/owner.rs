//! Owner-reference linking.
//!
//! Children carry a controller owner reference naming their owner's kind,
//! name and uid. The store garbage-collects children by that uid, and the
//! dispatcher routes child events back to the owner through it.

use crate::{ReconcileError, Result};
use cadence_core::resources::DEFAULT_NAMESPACE;
use cadence_core::{OwnerReference, Resource, ResourceKey, Scheme};

/// Controller reference pointing at `owner`
pub fn owner_reference<O: Resource>(owner: &O) -> Result<OwnerReference> {
    let metadata = owner.metadata();
    let name = metadata.name.clone().unwrap_or_default();
    let uid = metadata
        .uid
        .clone()
        .ok_or_else(|| ReconcileError::missing_owner_uid(format!("{}/{}", O::KIND, name)))?;

    Ok(OwnerReference {
        api_version: O::API_VERSION.to_string(),
        kind: O::KIND.to_string(),
        name,
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// The controller among a set of owner references
pub fn controller_ref(references: &[OwnerReference]) -> Option<&OwnerReference> {
    references.iter().find(|r| r.controller == Some(true))
}

/// The controller owner reference of `child`, if any
pub fn controller_of<T: Resource>(child: &T) -> Option<&OwnerReference> {
    controller_ref(child.metadata().owner_references.as_deref()?)
}

/// Whether `child` is controlled by exactly this `owner` instance
pub fn is_controlled_by<O: Resource, T: Resource>(owner: &O, child: &T) -> bool {
    match (controller_of(child), owner.uid()) {
        (Some(reference), Some(uid)) => reference.uid == uid,
        _ => false,
    }
}

/// Stamp `child` with a controller reference to `owner`.
///
/// Linking twice to the same owner is a no-op. A child controlled by any
/// other owner is never relinked.
pub fn link<O: Resource, T: Resource>(owner: &O, mut child: T) -> Result<T> {
    let reference = owner_reference(owner)?;

    if let Some(existing) = controller_of(&child) {
        if existing.uid == reference.uid {
            return Ok(child);
        }
        return Err(ReconcileError::link_conflict(
            describe(&child),
            format!("{}/{} ({})", reference.kind, reference.name, reference.uid),
            format!("{}/{} ({})", existing.kind, existing.name, existing.uid),
        ));
    }

    child
        .metadata_mut()
        .owner_references
        .get_or_insert_with(Vec::new)
        .push(reference);
    Ok(child)
}

/// Key of the object controlling `child`, if its kind is registered
pub fn owner_key_of<T: Resource>(child: &T, scheme: &Scheme) -> Option<ResourceKey> {
    let reference = controller_of(child)?;
    let namespace = child
        .metadata()
        .namespace
        .as_deref()
        .unwrap_or(DEFAULT_NAMESPACE);
    scheme.owner_key(reference, namespace)
}

fn describe<T: Resource>(object: &T) -> String {
    match object.resource_key() {
        Ok(key) => key.to_string(),
        Err(_) => format!("unnamed {}", T::KIND),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use cadence_core::{ChaosPod, ChaosPodSpec, Pod};

    fn stored_chaospod(name: &str, uid: &str) -> ChaosPod {
        let mut chaos = ChaosPod::new("default", name, ChaosPodSpec::default());
        chaos.metadata.uid = Some(uid.to_string());
        chaos
    }

    fn pod(name: &str) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some("default".to_string());
        pod
    }

    #[test]
    fn test_owner_reference_fields() {
        let owner = stored_chaospod("chaos", "uid-1");
        let reference = owner_reference(&owner).unwrap();
        assert_eq!(reference.api_version, "chaosapps.metamagical.io/v1");
        assert_eq!(reference.kind, "ChaosPod");
        assert_eq!(reference.name, "chaos");
        assert_eq!(reference.uid, "uid-1");
        assert_eq!(reference.controller, Some(true));
        assert_eq!(reference.block_owner_deletion, Some(true));
    }

    #[test]
    fn test_owner_without_uid_cannot_link() {
        let owner = ChaosPod::new("default", "chaos", ChaosPodSpec::default());
        let err = link(&owner, pod("chaos")).unwrap_err();
        assert!(matches!(err, ReconcileError::MissingOwnerUid { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidSpec);
    }

    #[test]
    fn test_link_is_idempotent() {
        let owner = stored_chaospod("chaos", "uid-1");
        let once = link(&owner, pod("chaos")).unwrap();
        let twice = link(&owner, once.clone()).unwrap();

        assert_eq!(once, twice);
        assert_eq!(once.metadata.owner_references.as_ref().unwrap().len(), 1);
        assert!(is_controlled_by(&owner, &twice));
    }

    #[test]
    fn test_link_refuses_foreign_controller() {
        let first = stored_chaospod("chaos", "uid-1");
        let second = stored_chaospod("chaos", "uid-2");

        let claimed = link(&first, pod("chaos")).unwrap();
        let err = link(&second, claimed.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LinkConflict);

        // Original link untouched
        assert_eq!(controller_of(&claimed).unwrap().uid, "uid-1");
        assert!(!is_controlled_by(&second, &claimed));
    }

    #[test]
    fn test_non_controller_references_are_kept() {
        let owner = stored_chaospod("chaos", "uid-1");
        let mut child = pod("chaos");
        child.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            name: "settings".to_string(),
            uid: "uid-cm".to_string(),
            controller: None,
            block_owner_deletion: None,
        }]);

        let linked = link(&owner, child).unwrap();
        let references = linked.metadata.owner_references.as_ref().unwrap();
        assert_eq!(references.len(), 2);
        assert_eq!(controller_of(&linked).unwrap().uid, "uid-1");
    }

    #[test]
    fn test_owner_key_of_resolves_through_scheme() {
        let scheme = Scheme::with_defaults().unwrap();
        let owner = stored_chaospod("chaos", "uid-1");
        let child = link(&owner, pod("chaos")).unwrap();

        assert_eq!(
            owner_key_of(&child, &scheme),
            Some(ChaosPod::key_for("default", "chaos"))
        );
        assert_eq!(owner_key_of(&pod("orphan"), &scheme), None);
    }
}
