//! Generic reconcile engine.
//!
//! One pass reads the owner and its child fresh from the store, performs at
//! most one child mutation, then writes the owner back only if its spec or
//! status changed. Nothing is retried here; every failure goes back to the
//! dispatcher.

use crate::clock::{Clock, SystemClock};
use crate::owner::link;
use crate::reconciler::{Action, Reconciler};
use crate::schedule::{delay_until, has_passed, next_transition, ScheduleRule, REQUEUE_GUARD};
use crate::{ReconcileError, Result};
use async_trait::async_trait;
use cadence_core::resources::DEFAULT_NAMESPACE;
use cadence_core::{GroupVersionKind, Resource, ResourceKey};
use cadence_store::ClusterClient;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-kind policy plugged into [`Engine`]
pub trait ManagedChild: Send + Sync + 'static {
    /// Kind declaring the desired state
    type Owner: Resource + PartialEq;
    /// Kind created and maintained for each owner
    type Child: Resource;

    /// Short name used in logs
    const NAME: &'static str;

    /// Name of the child of `owner`; the child lives in the owner's namespace
    fn child_name(&self, owner: &Self::Owner) -> String;

    /// Child built from the owner's desired state, without owner reference
    fn desired_child(&self, owner: &Self::Owner) -> Self::Child;

    /// Whether an existing child has drifted from `desired`
    fn needs_update(&self, _desired: &Self::Child, _observed: &Self::Child) -> bool {
        false
    }

    /// Apply the desired shape onto the observed child, keeping its identity
    fn apply_desired(&self, _desired: Self::Child, observed: Self::Child) -> Self::Child {
        observed
    }

    /// Rule for the owner's next scheduled transition, if it has one
    fn schedule(&self) -> Option<&ScheduleRule> {
        None
    }

    /// The owner's current scheduled transition
    fn next_transition(&self, _owner: &Self::Owner) -> Option<DateTime<Utc>> {
        None
    }

    fn set_next_transition(&self, _owner: &mut Self::Owner, _at: DateTime<Utc>) {}

    /// Recompute the owner's observed status from its child
    fn refresh_status(&self, owner: &mut Self::Owner, child: Option<&Self::Child>);
}

/// Reconcile engine for one owner kind
pub struct Engine<P: ManagedChild, C: ClusterClient> {
    policy: P,
    client: Arc<C>,
    clock: Arc<dyn Clock>,
    rng: parking_lot::Mutex<StdRng>,
}

impl<P: ManagedChild, C: ClusterClient> Engine<P, C> {
    /// Engine on wall-clock time with an OS-seeded generator
    pub fn new(policy: P, client: Arc<C>) -> Self {
        Self {
            policy,
            client,
            clock: Arc::new(SystemClock),
            rng: parking_lot::Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seed the schedule generator for reproducible transitions
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    fn child_key(&self, owner: &P::Owner) -> ResourceKey {
        let namespace = owner
            .metadata()
            .namespace
            .as_deref()
            .unwrap_or(DEFAULT_NAMESPACE);
        P::Child::key_for(namespace, &self.policy.child_name(owner))
    }

    fn schedule_after(&self, now: DateTime<Utc>, rule: &ScheduleRule) -> DateTime<Utc> {
        let mut rng = self.rng.lock();
        next_transition(now, rule, &mut *rng)
    }

    /// Run one pass for `key`
    pub async fn reconcile_key(&self, key: &ResourceKey) -> Result<Action> {
        let now = self.clock.now();

        let mut owner: P::Owner = match self.client.get(key).await {
            Ok(owner) => owner,
            Err(e) if e.is_not_found() => {
                debug!("{}: {} no longer exists", P::NAME, key);
                return Ok(Action::None);
            }
            Err(e) => return Err(e.into()),
        };

        owner
            .validate()
            .map_err(|e| ReconcileError::invalid_spec(key, e.to_string()))?;

        let before = owner.clone();
        let child_key = self.child_key(&owner);
        let observed = match self.client.get::<P::Child>(&child_key).await {
            Ok(child) => Some(child),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        let (action, current) = match observed {
            Some(child) => self.reconcile_existing(&mut owner, child, now).await?,
            None => self.create_child(&mut owner, now).await?,
        };

        self.policy.refresh_status(&mut owner, current.as_ref());
        if owner != before {
            debug!("{}: persisting {}", P::NAME, key);
            self.client.update(owner).await?;
        }

        Ok(action)
    }

    async fn reconcile_existing(
        &self,
        owner: &mut P::Owner,
        child: P::Child,
        now: DateTime<Utc>,
    ) -> Result<(Action, Option<P::Child>)> {
        let linked = link(&*owner, child.clone())?;
        if linked.metadata().owner_references != child.metadata().owner_references {
            info!("{}: adopting orphaned child {}", P::NAME, self.child_key(owner));
            let adopted = self.client.update(linked).await?;
            return Ok((Action::Requeue, Some(adopted)));
        }

        if let Some(rule) = self.policy.schedule() {
            return match self.policy.next_transition(owner) {
                Some(at) if !has_passed(now, at) => {
                    let delay = delay_until(now, at) + REQUEUE_GUARD;
                    debug!(
                        "{}: transition pending at {}, requeue in {:?}",
                        P::NAME, at, delay
                    );
                    Ok((Action::RequeueAfter(delay), Some(child)))
                }
                Some(at) => {
                    info!(
                        "{}: transition due at {} passed, deleting {}",
                        P::NAME,
                        at,
                        self.child_key(owner)
                    );
                    self.client.delete(&child).await?;

                    let next = self.schedule_after(now, rule);
                    self.policy.set_next_transition(owner, next);
                    Ok((Action::Requeue, None))
                }
                // A running child with no transition on record keeps running
                // until a freshly scheduled one; an unset stop is not read as
                // already passed.
                None => {
                    let next = self.schedule_after(now, rule);
                    warn!(
                        "{}: running child has no scheduled transition, scheduling one at {}",
                        P::NAME, next
                    );
                    self.policy.set_next_transition(owner, next);
                    Ok((
                        Action::RequeueAfter(delay_until(now, next) + REQUEUE_GUARD),
                        Some(child),
                    ))
                }
            };
        }

        let desired = self.policy.desired_child(owner);
        if !self.policy.needs_update(&desired, &child) {
            return Ok((Action::None, Some(child)));
        }

        info!(
            "{}: {} drifted from desired state, updating",
            P::NAME,
            self.child_key(owner)
        );
        let updated = self
            .client
            .update(self.policy.apply_desired(desired, child))
            .await?;
        Ok((Action::None, Some(updated)))
    }

    async fn create_child(
        &self,
        owner: &mut P::Owner,
        now: DateTime<Utc>,
    ) -> Result<(Action, Option<P::Child>)> {
        let child = link(&*owner, self.policy.desired_child(owner))?;
        info!("{}: creating {}", P::NAME, self.child_key(owner));
        let created = self.client.create(child).await?;

        if let Some(rule) = self.policy.schedule() {
            let pending = self
                .policy
                .next_transition(owner)
                .is_some_and(|at| !has_passed(now, at));
            if !pending {
                let next = self.schedule_after(now, rule);
                debug!("{}: next transition at {}", P::NAME, next);
                self.policy.set_next_transition(owner, next);
            }
        }

        Ok((Action::None, Some(created)))
    }
}

#[async_trait]
impl<P: ManagedChild, C: ClusterClient> Reconciler for Engine<P, C> {
    fn name(&self) -> &str {
        P::NAME
    }

    fn kind(&self) -> GroupVersionKind {
        P::Owner::gvk()
    }

    fn owns(&self) -> Vec<GroupVersionKind> {
        vec![P::Child::gvk()]
    }

    async fn list_keys(&self) -> Result<Vec<ResourceKey>> {
        let owners: Vec<P::Owner> = self.client.list(None).await?;
        Ok(owners
            .iter()
            .filter_map(|owner| owner.resource_key().ok())
            .collect())
    }

    async fn reconcile(&self, key: &ResourceKey) -> Result<Action> {
        self.reconcile_key(key).await
    }
}
