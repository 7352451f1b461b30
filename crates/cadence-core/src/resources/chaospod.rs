use super::{validate_base, Resource, ResourceError};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use serde::{Deserialize, Serialize};

/// Desired state of a ChaosPod
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaosPodSpec {
    /// Template of the pod kept alive until `next_stop`
    pub template: PodTemplateSpec,

    /// When the current pod must be stopped and replaced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_stop: Option<Time>,
}

/// Observed state of a ChaosPod.
///
/// Always reconstructable from the state of the cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaosPodStatus {
    /// Creation time of the pod currently running for this ChaosPod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<Time>,
}

/// A pod that is periodically stopped and recreated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaosPod {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ChaosPodSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ChaosPodStatus>,
}

impl ChaosPod {
    /// Create a ChaosPod in `namespace` with the given spec
    pub fn new(namespace: &str, name: &str, spec: ChaosPodSpec) -> Self {
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

impl Default for ChaosPod {
    fn default() -> Self {
        Self {
            api_version: Self::API_VERSION.to_string(),
            kind: Self::KIND.to_string(),
            metadata: ObjectMeta::default(),
            spec: ChaosPodSpec::default(),
            status: None,
        }
    }
}

impl Resource for ChaosPod {
    const API_VERSION: &'static str = "chaosapps.metamagical.io/v1";
    const KIND: &'static str = "ChaosPod";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn validate(&self) -> Result<(), ResourceError> {
        validate_base(&self.metadata)?;

        let pod_spec = self
            .spec
            .template
            .spec
            .as_ref()
            .ok_or_else(|| ResourceError::MissingField("spec.template.spec".to_string()))?;

        if pod_spec.containers.is_empty() {
            return Err(ResourceError::ValidationFailed(
                "spec.template must declare at least one container".to_string(),
            ));
        }

        if let Some(container) = pod_spec
            .containers
            .iter()
            .find(|c| c.image.as_deref().map_or(true, str::is_empty))
        {
            return Err(ResourceError::ValidationFailed(format!(
                "container '{}' in spec.template has no image",
                container.name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec};

    fn template(image: Option<&str>) -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: None,
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "main".to_string(),
                    image: image.map(str::to_string),
                    ..Default::default()
                }],
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_chaospod_serializes_contract_field_names() {
        let next_stop = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:10Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let mut chaos = ChaosPod::new(
            "default",
            "chaos",
            ChaosPodSpec {
                template: template(Some("nginx:latest")),
                next_stop: Some(Time(next_stop)),
            },
        );
        chaos.status = Some(ChaosPodStatus {
            last_run: Some(Time(next_stop)),
        });

        let value = serde_json::to_value(&chaos).unwrap();
        assert_eq!(value["apiVersion"], "chaosapps.metamagical.io/v1");
        assert_eq!(value["kind"], "ChaosPod");
        assert_eq!(value["spec"]["nextStop"], "2024-01-01T00:00:10Z");
        assert_eq!(value["status"]["lastRun"], "2024-01-01T00:00:10Z");
        assert!(value["spec"]["template"]["spec"]["containers"].is_array());
    }

    #[test]
    fn test_chaospod_validation() {
        let chaos = ChaosPod::new(
            "default",
            "chaos",
            ChaosPodSpec {
                template: template(Some("nginx:latest")),
                next_stop: None,
            },
        );
        assert!(chaos.validate().is_ok());

        let missing_image = ChaosPod::new(
            "default",
            "chaos",
            ChaosPodSpec {
                template: template(None),
                next_stop: None,
            },
        );
        assert!(matches!(
            missing_image.validate(),
            Err(ResourceError::ValidationFailed(_))
        ));

        let missing_spec = ChaosPod::new("default", "chaos", ChaosPodSpec::default());
        assert_eq!(
            missing_spec.validate(),
            Err(ResourceError::MissingField("spec.template.spec".to_string()))
        );
    }
}
