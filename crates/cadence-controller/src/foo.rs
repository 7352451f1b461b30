use crate::engine::ManagedChild;
use cadence_core::k8s_openapi::api::apps::v1::DeploymentSpec;
use cadence_core::k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use cadence_core::k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use cadence_core::{Deployment, Foo, FooStatus, ObjectMeta};
use std::collections::BTreeMap;

/// Keeps one deployment per Foo matching its name, image and replica count
#[derive(Debug, Clone, Copy, Default)]
pub struct FooPolicy;

impl FooPolicy {
    /// Labels stamped on the deployment and its pods
    pub fn labels(owner: &Foo) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app".to_string(), "nginx".to_string()),
            (
                "controller".to_string(),
                owner.metadata.name.clone().unwrap_or_default(),
            ),
        ])
    }
}

impl ManagedChild for FooPolicy {
    type Owner = Foo;
    type Child = Deployment;

    const NAME: &'static str = "foo";

    fn child_name(&self, owner: &Foo) -> String {
        owner.spec.deployment_name.clone()
    }

    fn desired_child(&self, owner: &Foo) -> Deployment {
        let labels = Self::labels(owner);

        Deployment {
            metadata: ObjectMeta {
                name: Some(owner.spec.deployment_name.clone()),
                namespace: owner.metadata.namespace.clone(),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(owner.spec.desired_replicas()),
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "nginx".to_string(),
                            image: Some(owner.spec.desired_image().to_string()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    fn needs_update(&self, desired: &Deployment, observed: &Deployment) -> bool {
        desired.spec != observed.spec || desired.metadata.labels != observed.metadata.labels
    }

    fn apply_desired(&self, desired: Deployment, mut observed: Deployment) -> Deployment {
        observed.spec = desired.spec;
        observed.metadata.labels = desired.metadata.labels;
        observed
    }

    fn refresh_status(&self, owner: &mut Foo, child: Option<&Deployment>) {
        let available_replicas = child
            .and_then(|d| d.status.as_ref())
            .and_then(|s| s.available_replicas)
            .unwrap_or(0);
        owner.status = Some(FooStatus { available_replicas });
    }
}
