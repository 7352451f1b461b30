//! Cadence Controller - level-triggered reconciliation
//!
//! This crate provides:
//! - The generic reconcile engine and its two policies (ChaosPod, Foo)
//! - The scheduled-transition clock
//! - Owner-reference linking
//! - A reference dispatcher: work queue, failure backoff and worker pool

pub mod backoff;
pub mod chaospod;
pub mod clock;
pub mod controller;
pub mod engine;
pub mod error;
pub mod foo;
pub mod owner;
pub mod queue;
pub mod reconciler;
pub mod schedule;

pub use backoff::{Backoff, BackoffConfig};
pub use chaospod::ChaosPodPolicy;
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{Controller, ControllerConfig};
pub use engine::{Engine, ManagedChild};
pub use error::{ErrorKind, ReconcileError, Result};
pub use foo::FooPolicy;
pub use queue::WorkQueue;
pub use reconciler::{Action, Reconciler};
pub use schedule::{delay_until, has_passed, next_transition, ScheduleRule, REQUEUE_GUARD};
