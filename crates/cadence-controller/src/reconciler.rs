use crate::Result;
use async_trait::async_trait;
use cadence_core::{GroupVersionKind, ResourceKey};
use std::time::Duration;

/// Outcome of one reconcile pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Converged; wait for the next change
    None,
    /// Run again right away
    Requeue,
    /// Run again no earlier than the given delay
    RequeueAfter(Duration),
}

impl Action {
    /// Delay before the next pass, if one was requested
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Action::None => None,
            Action::Requeue => Some(Duration::ZERO),
            Action::RequeueAfter(delay) => Some(*delay),
        }
    }
}

/// One kind's reconcile logic, as seen by the dispatcher
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Kind whose keys are reconciled
    fn kind(&self) -> GroupVersionKind;

    /// Kinds of children whose events are routed to their owner
    fn owns(&self) -> Vec<GroupVersionKind>;

    /// Keys of every existing primary object
    async fn list_keys(&self) -> Result<Vec<ResourceKey>>;

    /// Bring the object at `key` one step closer to its desired state
    async fn reconcile(&self, key: &ResourceKey) -> Result<Action>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requeue_after() {
        assert_eq!(Action::None.requeue_after(), None);
        assert_eq!(Action::Requeue.requeue_after(), Some(Duration::ZERO));
        assert_eq!(
            Action::RequeueAfter(Duration::from_secs(3)).requeue_after(),
            Some(Duration::from_secs(3))
        );
    }
}
