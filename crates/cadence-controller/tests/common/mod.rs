#![allow(dead_code)]

use cadence_controller::{Engine, ManagedChild, ManualClock};
use cadence_core::k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use cadence_core::{ChaosPod, ChaosPodSpec, ObjectMeta, Time};
use cadence_store::ClusterStore;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

/// Fixed starting point for every scenario
pub fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn secs(n: i64) -> TimeDelta {
    TimeDelta::seconds(n)
}

pub struct Harness {
    _dir: TempDir,
    pub store: Arc<ClusterStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = ClusterStore::open(dir.path().join("cadence.redb")).unwrap();
        Self {
            _dir: dir,
            store: Arc::new(store),
            clock: Arc::new(ManualClock::new(start())),
        }
    }

    pub fn engine<P: ManagedChild>(&self, policy: P) -> Engine<P, ClusterStore> {
        Engine::new(policy, self.store.clone())
            .with_clock(self.clock.clone())
            .with_seed(7)
    }

    /// Id of the latest commit, i.e. the last write of any kind
    pub fn head(&self) -> Option<String> {
        self.store
            .version_store()
            .get_head()
            .map(|commit| commit.id().to_string())
    }
}

pub fn chaospod(name: &str, next_stop: Option<DateTime<Utc>>) -> ChaosPod {
    ChaosPod::new(
        "default",
        name,
        ChaosPodSpec {
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(BTreeMap::from([("app".to_string(), name.to_string())])),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "main".to_string(),
                        image: Some("nginx:latest".to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            next_stop: next_stop.map(Time),
        },
    )
}
