use super::{is_valid_name, validate_base, Resource, ResourceError};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Image used when a Foo does not name one
pub const DEFAULT_FOO_IMAGE: &str = "nginx:latest";

/// Desired state of a Foo
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FooSpec {
    /// Name of the deployment owned by this Foo
    #[serde(default)]
    pub deployment_name: String,

    /// Desired replica count (defaults to 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Container image (defaults to nginx:latest)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl FooSpec {
    pub fn new(deployment_name: impl Into<String>) -> Self {
        Self {
            deployment_name: deployment_name.into(),
            replicas: None,
            image: None,
        }
    }

    pub fn with_replicas(mut self, replicas: i32) -> Self {
        self.replicas = Some(replicas);
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Replica count after defaulting
    pub fn desired_replicas(&self) -> i32 {
        self.replicas.unwrap_or(1)
    }

    /// Image after defaulting
    pub fn desired_image(&self) -> &str {
        self.image.as_deref().unwrap_or(DEFAULT_FOO_IMAGE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FooStatus {
    #[serde(default)]
    pub available_replicas: i32,
}

/// A deployment described by name, image and replica count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Foo {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: FooSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FooStatus>,
}

impl Foo {
    pub fn new(namespace: &str, name: &str, spec: FooSpec) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec,
            ..Default::default()
        }
    }
}

impl Default for Foo {
    fn default() -> Self {
        Self {
            api_version: Self::API_VERSION.to_string(),
            kind: Self::KIND.to_string(),
            metadata: ObjectMeta::default(),
            spec: FooSpec::default(),
            status: None,
        }
    }
}

impl Resource for Foo {
    const API_VERSION: &'static str = "samplecontroller.k8s.io/v1alpha1";
    const KIND: &'static str = "Foo";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn validate(&self) -> Result<(), ResourceError> {
        validate_base(&self.metadata)?;

        if self.spec.deployment_name.is_empty() {
            return Err(ResourceError::MissingField(
                "spec.deploymentName".to_string(),
            ));
        }
        if !is_valid_name(&self.spec.deployment_name) {
            return Err(ResourceError::InvalidName(self.spec.deployment_name.clone()));
        }
        if self.spec.desired_replicas() < 0 {
            return Err(ResourceError::ValidationFailed(format!(
                "spec.replicas must not be negative, got {}",
                self.spec.desired_replicas()
            )));
        }
        if self.spec.desired_image().is_empty() {
            return Err(ResourceError::ValidationFailed(
                "spec.image must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foo_defaults() {
        let spec = FooSpec::new("web");
        assert_eq!(spec.desired_replicas(), 1);
        assert_eq!(spec.desired_image(), DEFAULT_FOO_IMAGE);
    }

    #[test]
    fn test_foo_deserializes_from_manifest_shape() {
        let foo: Foo = serde_json::from_value(serde_json::json!({
            "apiVersion": "samplecontroller.k8s.io/v1alpha1",
            "kind": "Foo",
            "metadata": {"name": "example", "namespace": "default"},
            "spec": {"deploymentName": "example-deploy", "replicas": 3}
        }))
        .unwrap();

        assert_eq!(foo.spec.deployment_name, "example-deploy");
        assert_eq!(foo.spec.desired_replicas(), 3);
        assert!(foo.status.is_none());
        assert!(foo.validate().is_ok());
    }

    #[test]
    fn test_foo_validation() {
        let missing = Foo::new("default", "example", FooSpec::default());
        assert_eq!(
            missing.validate(),
            Err(ResourceError::MissingField("spec.deploymentName".to_string()))
        );

        let bad_name = Foo::new("default", "example", FooSpec::new("Bad_Name"));
        assert!(matches!(
            bad_name.validate(),
            Err(ResourceError::InvalidName(_))
        ));

        let negative = Foo::new("default", "example", FooSpec::new("web").with_replicas(-1));
        assert!(matches!(
            negative.validate(),
            Err(ResourceError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_foo_status_field_name() {
        let mut foo = Foo::new("default", "example", FooSpec::new("web"));
        foo.status = Some(FooStatus {
            available_replicas: 2,
        });
        let value = serde_json::to_value(&foo).unwrap();
        assert_eq!(value["status"]["availableReplicas"], 2);
    }
}
