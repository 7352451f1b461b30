use crate::engine::ManagedChild;
use crate::schedule::ScheduleRule;
use crate::Result;
use cadence_core::{ChaosPod, ChaosPodStatus, Pod, Time};
use chrono::{DateTime, Utc};

/// Keeps one pod per ChaosPod alive until `spec.nextStop`, then replaces it
#[derive(Debug, Clone, Default)]
pub struct ChaosPodPolicy {
    rule: ScheduleRule,
}

impl ChaosPodPolicy {
    /// Policy scheduling transitions with `rule`
    pub fn new(rule: ScheduleRule) -> Result<Self> {
        rule.validate()?;
        Ok(Self { rule })
    }

    pub fn rule(&self) -> &ScheduleRule {
        &self.rule
    }
}

impl ManagedChild for ChaosPodPolicy {
    type Owner = ChaosPod;
    type Child = Pod;

    const NAME: &'static str = "chaospod";

    fn child_name(&self, owner: &ChaosPod) -> String {
        owner.metadata.name.clone().unwrap_or_default()
    }

    fn desired_child(&self, owner: &ChaosPod) -> Pod {
        let template = owner.spec.template.clone();
        let mut metadata = template.metadata.unwrap_or_default();
        metadata.name = owner.metadata.name.clone();
        metadata.namespace = owner.metadata.namespace.clone();

        Pod {
            metadata,
            spec: template.spec,
            status: None,
        }
    }

    fn schedule(&self) -> Option<&ScheduleRule> {
        Some(&self.rule)
    }

    fn next_transition(&self, owner: &ChaosPod) -> Option<DateTime<Utc>> {
        owner.spec.next_stop.as_ref().map(|t| t.0)
    }

    fn set_next_transition(&self, owner: &mut ChaosPod, at: DateTime<Utc>) {
        owner.spec.next_stop = Some(Time(at));
    }

    fn refresh_status(&self, owner: &mut ChaosPod, child: Option<&Pod>) {
        let last_run = child.and_then(|pod| pod.metadata.creation_timestamp.clone());
        if last_run.is_none() && owner.status.is_none() {
            return;
        }
        owner.status = Some(ChaosPodStatus { last_run });
    }
}
