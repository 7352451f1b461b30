//! Dispatcher driving one [`Reconciler`].
//!
//! Store events are routed to primary keys, keys flow through a
//! [`WorkQueue`], and a fixed pool of workers runs reconcile passes. Pass
//! outcomes decide when a key comes back.

use crate::backoff::{Backoff, BackoffConfig};
use crate::owner::controller_ref;
use crate::queue::WorkQueue;
use crate::reconciler::{Action, Reconciler};
use crate::{ReconcileError, Result};
use cadence_core::{GroupVersionKind, ResourceEvent, ResourceKey, Scheme};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Configuration for a controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of concurrent reconcile workers
    pub workers: usize,
    /// Failure backoff applied to retryable errors
    pub backoff: BackoffConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Event-driven runner for one reconciler
pub struct Controller<R: Reconciler> {
    reconciler: Arc<R>,
    scheme: Arc<Scheme>,
    kind: GroupVersionKind,
    owns: Vec<GroupVersionKind>,
    queue: Arc<WorkQueue>,
    backoff: Backoff,
    config: ControllerConfig,
}

impl<R: Reconciler> Controller<R> {
    pub fn new(reconciler: Arc<R>, scheme: Arc<Scheme>, config: ControllerConfig) -> Self {
        let kind = reconciler.kind();
        let owns = reconciler.owns();
        Self {
            reconciler,
            scheme,
            kind,
            owns,
            queue: Arc::new(WorkQueue::new()),
            backoff: Backoff::new(config.backoff),
            config,
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Run until `token` is cancelled.
    ///
    /// Every existing primary object is enqueued first; afterwards the
    /// controller follows `events`. A pass already running when the token
    /// fires is allowed to finish.
    pub async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<ResourceEvent>,
        token: CancellationToken,
    ) -> Result<()> {
        let workers = self.config.workers.max(1);
        info!(
            "Starting {} controller for {} with {} workers",
            self.reconciler.name(),
            self.kind,
            workers
        );

        self.resync().await;

        let mut tasks = JoinSet::new();
        for worker in 0..workers {
            let controller = self.clone();
            tasks.spawn(async move { controller.worker(worker).await });
        }

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("{} controller shutting down", self.reconciler.name());
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Some(key) = self.route(&event) {
                            debug!("Enqueueing {} after event on {}", key, event.resource_key);
                            self.queue.add(key);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(
                            "{} controller lagged {} events behind, resyncing",
                            self.reconciler.name(),
                            missed
                        );
                        self.resync().await;
                    }
                    Err(RecvError::Closed) => {
                        warn!("Event stream closed for {} controller", self.reconciler.name());
                        break;
                    }
                }
            }
        }

        self.queue.shutdown();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("{} worker task failed: {}", self.reconciler.name(), e);
            }
        }

        info!("{} controller stopped", self.reconciler.name());
        Ok(())
    }

    /// Enqueue every existing primary object
    pub async fn resync(&self) {
        match self.reconciler.list_keys().await {
            Ok(keys) => {
                debug!("Resync of {} found {} objects", self.reconciler.name(), keys.len());
                for key in keys {
                    self.queue.add(key);
                }
            }
            Err(e) => {
                error!("Resync of {} failed: {}", self.reconciler.name(), e);
            }
        }
    }

    /// Primary key affected by `event`, if any.
    ///
    /// Primary objects map to themselves; owned children map to their
    /// controller owner when that owner is of the primary kind.
    pub fn route(&self, event: &ResourceEvent) -> Option<ResourceKey> {
        if event.gvk == self.kind {
            return Some(event.resource_key.clone());
        }
        if !self.owns.contains(&event.gvk) {
            return None;
        }

        let references = event.owner_references();
        let owner = controller_ref(&references)?;
        self.scheme
            .owner_key(owner, &event.resource_key.namespace)
            .filter(|key| key.gvk == self.kind)
    }

    async fn worker(&self, id: usize) {
        debug!("{} worker {} started", self.reconciler.name(), id);
        while let Some(key) = self.queue.get().await {
            let outcome = self.reconciler.reconcile(&key).await;
            self.handle_outcome(&key, outcome);
            self.queue.done(&key);
        }
        debug!("{} worker {} stopped", self.reconciler.name(), id);
    }

    /// Requeue `key` according to the result of its pass
    pub fn handle_outcome(&self, key: &ResourceKey, outcome: Result<Action>) {
        match outcome {
            Ok(action) => {
                self.backoff.forget(key);
                if let Some(delay) = action.requeue_after() {
                    debug!("Requeueing {} in {:?}", key, delay);
                    self.queue.add_after(key.clone(), delay);
                }
            }
            Err(e) if e.is_retryable() => {
                let delay = self.backoff.next_delay(key);
                warn!(
                    "Reconcile of {} failed ({}), retrying in {:?}: {}",
                    key,
                    e.kind(),
                    delay,
                    e
                );
                self.queue.add_after(key.clone(), delay);
            }
            Err(e) => {
                self.backoff.forget(key);
                log_terminal(self.reconciler.name(), key, &e);
            }
        }
    }
}

fn log_terminal(controller: &str, key: &ResourceKey, err: &ReconcileError) {
    error!(
        "{}: reconcile of {} failed ({}), not retrying until the object changes: {}",
        controller,
        key,
        err.kind(),
        err
    );
}
