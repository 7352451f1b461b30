//! Work queue with single-flight per key.
//!
//! A key is in at most one of three places: pending (waiting for a worker),
//! processing (handed out), or neither. Adding a key while it is processing
//! marks it dirty; `done` puts it back on the queue. Delayed adds sit in a
//! heap until their deadline and then go through the same path.

use cadence_core::ResourceKey;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

/// Entry in the delayed heap, ordered so the earliest deadline pops first
#[derive(Debug)]
struct Delayed {
    at: Instant,
    seq: u64,
    key: ResourceKey,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<ResourceKey>,
    dirty: HashSet<ResourceKey>,
    processing: HashSet<ResourceKey>,
    delayed: BinaryHeap<Delayed>,
    /// Earliest pending deadline per delayed key
    waiting: HashMap<ResourceKey, Instant>,
    seq: u64,
    shutting_down: bool,
}

impl QueueState {
    /// Returns true when the key became available to a worker
    fn insert(&mut self, key: ResourceKey) -> bool {
        if self.shutting_down || self.dirty.contains(&key) {
            return false;
        }
        self.dirty.insert(key.clone());
        if self.processing.contains(&key) {
            return false;
        }
        self.queue.push_back(key);
        true
    }

    /// Move every delayed entry whose deadline has passed onto the queue
    fn promote_due(&mut self, now: Instant) {
        while let Some(entry) = self.delayed.peek() {
            if entry.at > now {
                break;
            }
            let Some(entry) = self.delayed.pop() else {
                break;
            };
            // Superseded by an earlier deadline for the same key
            if self.waiting.get(&entry.key) != Some(&entry.at) {
                continue;
            }
            self.waiting.remove(&entry.key);
            self.insert(entry.key);
        }
    }
}

/// Rate-free work queue shared by a controller's workers
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `key` for processing
    pub fn add(&self, key: ResourceKey) {
        let added = self.state.lock().insert(key);
        if added {
            self.notify.notify_waiters();
        }
    }

    /// Enqueue `key` once `delay` has elapsed
    ///
    /// If the key is already waiting with an earlier deadline, the earlier
    /// one wins.
    pub fn add_after(&self, key: ResourceKey, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let at = Instant::now() + delay;
        {
            let mut state = self.state.lock();
            if state.shutting_down {
                return;
            }
            if state.waiting.get(&key).is_some_and(|existing| *existing <= at) {
                return;
            }
            trace!("Delaying {} by {:?}", key, delay);
            state.seq += 1;
            let seq = state.seq;
            state.waiting.insert(key.clone(), at);
            state.delayed.push(Delayed { at, seq, key });
        }
        // Waiting workers recompute their timer
        self.notify.notify_waiters();
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    ///
    /// The caller owns the key until it calls [`WorkQueue::done`].
    pub async fn get(&self) -> Option<ResourceKey> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_deadline = {
                let mut state = self.state.lock();
                if state.shutting_down {
                    return None;
                }
                state.promote_due(Instant::now());
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                state.delayed.peek().map(|entry| entry.at)
            };

            match next_deadline {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Release `key` after processing; re-queues it if it was added meanwhile
    pub fn done(&self, key: &ResourceKey) {
        let requeued = {
            let mut state = self.state.lock();
            state.processing.remove(key);
            if state.dirty.contains(key) && !state.shutting_down {
                state.queue.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_waiters();
        }
    }

    /// Stop handing out keys and wake every waiting worker
    pub fn shutdown(&self) {
        self.state.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    /// Keys ready for a worker
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys waiting for a deadline
    pub fn delayed_len(&self) -> usize {
        self.state.lock().waiting.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{Foo, Resource};
    use std::sync::Arc;

    fn key(name: &str) -> ResourceKey {
        Foo::key_for("default", name)
    }

    #[tokio::test]
    async fn test_add_is_deduplicated() {
        let queue = WorkQueue::new();
        queue.add(key("a"));
        queue.add(key("a"));
        queue.add(key("b"));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.get().await, Some(key("a")));
        assert_eq!(queue.get().await, Some(key("b")));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_key_is_not_handed_out_twice() {
        let queue = WorkQueue::new();
        queue.add(key("a"));
        let first = queue.get().await.unwrap();

        // Re-added while processing: held back until done
        queue.add(key("a"));
        assert!(queue.is_empty());

        queue.done(&first);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some(key("a")));
        queue.done(&key("a"));
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_keys_pop_in_deadline_order() {
        let queue = WorkQueue::new();
        queue.add_after(key("late"), Duration::from_secs(20));
        queue.add_after(key("early"), Duration::from_secs(10));
        assert!(queue.is_empty());
        assert_eq!(queue.delayed_len(), 2);

        let start = Instant::now();
        assert_eq!(queue.get().await, Some(key("early")));
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert_eq!(queue.get().await, Some(key("late")));
        assert!(start.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_wins() {
        let queue = WorkQueue::new();
        queue.add_after(key("a"), Duration::from_secs(30));
        queue.add_after(key("a"), Duration::from_secs(5));
        queue.add_after(key("a"), Duration::from_secs(60));
        assert_eq!(queue.delayed_len(), 1);

        let start = Instant::now();
        assert_eq!(queue.get().await, Some(key("a")));
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(30));
        queue.done(&key("a"));

        // The superseded entries never surface
        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(tokio::time::timeout(Duration::from_millis(10), queue.get())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_waiting_worker_wakes_on_add() {
        let queue = Arc::new(WorkQueue::new());
        let worker = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };

        tokio::task::yield_now().await;
        queue.add(key("a"));
        assert_eq!(worker.await.unwrap(), Some(key("a")));
    }

    #[tokio::test]
    async fn test_shutdown_releases_workers() {
        let queue = Arc::new(WorkQueue::new());
        let worker = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };

        tokio::task::yield_now().await;
        queue.shutdown();
        assert_eq!(worker.await.unwrap(), None);

        queue.add(key("a"));
        assert!(queue.is_empty());
        assert_eq!(queue.get().await, None);
    }
}
