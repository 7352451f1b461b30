//! Cadence Core - Fundamental types and traits for the Cadence reconciliation controller
//!
//! This crate provides:
//! - Resource abstractions over k8s-openapi types and the custom resources
//!   managed by the controller (ChaosPod, Foo)
//! - Error types with miette diagnostics
//! - Type-safe resource keys and identifiers
//! - The process-wide scheme registry
//! - Manifest decoding

pub mod error;
pub mod events;
pub mod resources;
pub mod scheme;
pub mod types;

// Re-export commonly used types
pub use error::{CadenceError, Result};
pub use events::{ResourceEvent, WatchEventType};
pub use resources::{
    is_valid_name, ChaosPod, ChaosPodSpec, ChaosPodStatus, Foo, FooSpec, FooStatus, Resource,
    ResourceError, DEFAULT_FOO_IMAGE,
};
pub use scheme::{KindInfo, Scheme};
pub use types::{GroupVersionKind, ResourceKey, ResourceVersion};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::apps::v1::Deployment;
pub use k8s_openapi::api::core::v1::Pod;
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};

/// Split a multi-document YAML manifest into JSON values, skipping empty documents
pub fn documents_from_yaml(data: &str) -> Result<Vec<serde_json::Value>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(data) {
        let value = <serde_json::Value as serde::Deserialize>::deserialize(document).map_err(
            |e| {
                CadenceError::serialization_error(
                    format!("Failed to deserialize from YAML: {}", e),
                    Some(Box::new(e)),
                )
            },
        )?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}
