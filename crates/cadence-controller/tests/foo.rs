mod common;

use async_trait::async_trait;
use cadence_controller::{Action, Engine, ErrorKind, FooPolicy};
use cadence_core::{Deployment, Foo, FooSpec, Resource, ResourceKey};
use cadence_store::{ClusterClient, ClusterStore};
use common::Harness;
use std::sync::Arc;

async fn get_deployment(h: &Harness, name: &str) -> Option<Deployment> {
    h.store.get(&Deployment::key_for("default", name)).await.ok()
}

fn replicas(deployment: &Deployment) -> Option<i32> {
    deployment.spec.as_ref().and_then(|s| s.replicas)
}

fn image(deployment: &Deployment) -> Option<String> {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|s| s.containers.first())
        .and_then(|c| c.image.clone())
}

#[tokio::test]
async fn test_foo_creates_owned_deployment() {
    let h = Harness::new();
    let engine = h.engine(FooPolicy);
    let spec = FooSpec::new("example-deploy")
        .with_replicas(2)
        .with_image("nginx:latest");
    let owner = h
        .store
        .create(Foo::new("default", "example", spec))
        .await
        .unwrap();

    let action = engine
        .reconcile_key(&Foo::key_for("default", "example"))
        .await
        .unwrap();
    assert_eq!(action, Action::None);

    let deployment = get_deployment(&h, "example-deploy").await.unwrap();
    assert_eq!(replicas(&deployment), Some(2));
    assert_eq!(image(&deployment).as_deref(), Some("nginx:latest"));

    let references = deployment.metadata.owner_references.unwrap();
    assert_eq!(references.len(), 1);
    assert_eq!(references[0].kind, "Foo");
    assert_eq!(references[0].name, "example");
    assert_eq!(references[0].uid, owner.metadata.uid.unwrap());
    assert_eq!(references[0].controller, Some(true));
}

#[tokio::test]
async fn test_defaults_apply_when_unset() {
    let h = Harness::new();
    let engine = h.engine(FooPolicy);
    h.store
        .create(Foo::new("default", "example", FooSpec::new("example-deploy")))
        .await
        .unwrap();

    engine
        .reconcile_key(&Foo::key_for("default", "example"))
        .await
        .unwrap();

    let deployment = get_deployment(&h, "example-deploy").await.unwrap();
    assert_eq!(replicas(&deployment), Some(1));
    assert_eq!(image(&deployment).as_deref(), Some("nginx:latest"));
}

#[tokio::test]
async fn test_converged_pass_writes_nothing() {
    let h = Harness::new();
    let engine = h.engine(FooPolicy);
    let key = Foo::key_for("default", "example");
    h.store
        .create(Foo::new(
            "default",
            "example",
            FooSpec::new("example-deploy").with_replicas(2),
        ))
        .await
        .unwrap();
    engine.reconcile_key(&key).await.unwrap();

    let head = h.head();
    assert_eq!(engine.reconcile_key(&key).await.unwrap(), Action::None);
    assert_eq!(engine.reconcile_key(&key).await.unwrap(), Action::None);
    assert_eq!(h.head(), head);
}

#[tokio::test]
async fn test_drift_is_corrected() {
    let h = Harness::new();
    let engine = h.engine(FooPolicy);
    let key = Foo::key_for("default", "example");
    h.store
        .create(Foo::new(
            "default",
            "example",
            FooSpec::new("example-deploy").with_replicas(2),
        ))
        .await
        .unwrap();
    engine.reconcile_key(&key).await.unwrap();

    let mut tampered = get_deployment(&h, "example-deploy").await.unwrap();
    let uid = tampered.metadata.uid.clone();
    tampered.spec.as_mut().unwrap().replicas = Some(5);
    h.store.update(tampered).await.unwrap();

    assert_eq!(engine.reconcile_key(&key).await.unwrap(), Action::None);
    let repaired = get_deployment(&h, "example-deploy").await.unwrap();
    assert_eq!(replicas(&repaired), Some(2));
    assert_eq!(repaired.metadata.uid, uid, "drift is fixed in place");

    // Spec change on the owner flows through as well
    let mut owner: Foo = h.store.get(&key).await.unwrap();
    owner.spec.image = Some("nginx:1.27".to_string());
    h.store.update(owner).await.unwrap();
    engine.reconcile_key(&key).await.unwrap();
    let updated = get_deployment(&h, "example-deploy").await.unwrap();
    assert_eq!(image(&updated).as_deref(), Some("nginx:1.27"));
}

#[tokio::test]
async fn test_status_mirrors_deployment() {
    let h = Harness::new();
    let engine = h.engine(FooPolicy);
    let key = Foo::key_for("default", "example");
    h.store
        .create(Foo::new(
            "default",
            "example",
            FooSpec::new("example-deploy").with_replicas(2),
        ))
        .await
        .unwrap();
    engine.reconcile_key(&key).await.unwrap();

    let owner: Foo = h.store.get(&key).await.unwrap();
    assert_eq!(owner.status.unwrap().available_replicas, 0);

    let mut deployment = get_deployment(&h, "example-deploy").await.unwrap();
    deployment.status = Some(Default::default());
    deployment.status.as_mut().unwrap().available_replicas = Some(2);
    h.store.update(deployment).await.unwrap();

    engine.reconcile_key(&key).await.unwrap();
    let owner: Foo = h.store.get(&key).await.unwrap();
    assert_eq!(owner.status.unwrap().available_replicas, 2);
}

#[tokio::test]
async fn test_missing_foo_is_a_no_op() {
    let h = Harness::new();
    let engine = h.engine(FooPolicy);
    let head = h.head();

    let action = engine
        .reconcile_key(&Foo::key_for("default", "missing"))
        .await
        .unwrap();
    assert_eq!(action, Action::None);
    assert_eq!(h.head(), head);
}

#[tokio::test]
async fn test_shared_deployment_name_is_a_link_conflict() {
    let h = Harness::new();
    let engine = h.engine(FooPolicy);
    let first = h
        .store
        .create(Foo::new("default", "first", FooSpec::new("shared")))
        .await
        .unwrap();
    h.store
        .create(Foo::new("default", "second", FooSpec::new("shared")))
        .await
        .unwrap();

    engine
        .reconcile_key(&Foo::key_for("default", "first"))
        .await
        .unwrap();
    let err = engine
        .reconcile_key(&Foo::key_for("default", "second"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LinkConflict);

    let deployment = get_deployment(&h, "shared").await.unwrap();
    assert_eq!(
        deployment.metadata.owner_references.unwrap()[0].uid,
        first.metadata.uid.unwrap()
    );
}

#[tokio::test]
async fn test_empty_deployment_name_is_invalid() {
    let h = Harness::new();
    let engine = h.engine(FooPolicy);
    h.store
        .create(Foo::new("default", "example", FooSpec::default()))
        .await
        .unwrap();

    let err = engine
        .reconcile_key(&Foo::key_for("default", "example"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSpec);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_deleting_foo_cascades_to_deployment() {
    let h = Harness::new();
    let engine = h.engine(FooPolicy);
    let key = Foo::key_for("default", "example");
    h.store
        .create(Foo::new("default", "example", FooSpec::new("example-deploy")))
        .await
        .unwrap();
    engine.reconcile_key(&key).await.unwrap();
    assert!(get_deployment(&h, "example-deploy").await.is_some());

    let owner: Foo = h.store.get(&key).await.unwrap();
    h.store.delete(&owner).await.unwrap();
    assert!(get_deployment(&h, "example-deploy").await.is_none());
}

#[tokio::test]
async fn test_stale_owner_write_is_a_conflict() {
    let h = Harness::new();
    let key = Foo::key_for("default", "example");
    h.store
        .create(Foo::new("default", "example", FooSpec::new("example-deploy")))
        .await
        .unwrap();

    let stale: Foo = h.store.get(&key).await.unwrap();
    let mut fresh = stale.clone();
    fresh.spec.replicas = Some(3);
    h.store.update(fresh).await.unwrap();

    let err = cadence_controller::ReconcileError::from(h.store.update(stale).await.unwrap_err());
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.is_retryable());
}

/// Store client that deletes `owner` right before any create goes through
struct OwnerDeletedBeforeCreate {
    inner: Arc<ClusterStore>,
    owner: ResourceKey,
}

#[async_trait]
impl ClusterClient for OwnerDeletedBeforeCreate {
    async fn get<T: Resource>(&self, key: &ResourceKey) -> cadence_store::Result<T> {
        self.inner.get(key).await
    }

    async fn create<T: Resource>(&self, resource: T) -> cadence_store::Result<T> {
        let owner: Foo = self.inner.get(&self.owner).await?;
        self.inner.delete(&owner).await?;
        self.inner.create(resource).await
    }

    async fn update<T: Resource>(&self, resource: T) -> cadence_store::Result<T> {
        self.inner.update(resource).await
    }

    async fn delete<T: Resource>(&self, resource: &T) -> cadence_store::Result<()> {
        self.inner.delete(resource).await
    }

    async fn list<T: Resource>(&self, namespace: Option<&str>) -> cadence_store::Result<Vec<T>> {
        self.inner.list(namespace).await
    }
}

#[tokio::test]
async fn test_owner_deleted_mid_pass_leaves_no_child() {
    let h = Harness::new();
    let key = Foo::key_for("default", "example");
    h.store
        .create(Foo::new("default", "example", FooSpec::new("example-deploy")))
        .await
        .unwrap();

    let client = Arc::new(OwnerDeletedBeforeCreate {
        inner: h.store.clone(),
        owner: key.clone(),
    });
    let engine = Engine::new(FooPolicy, client).with_clock(h.clock.clone());

    let err = engine.reconcile_key(&key).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.is_retryable());

    assert!(get_deployment(&h, "example-deploy").await.is_none());
    assert!(h.store.get::<Foo>(&key).await.is_err());

    // The retry sees the owner gone and stops
    let action = h.engine(FooPolicy).reconcile_key(&key).await.unwrap();
    assert_eq!(action, Action::None);
    assert!(get_deployment(&h, "example-deploy").await.is_none());
}
