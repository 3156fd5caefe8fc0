//! Cancellable keyed deadlines.
//!
//! A [`DeadlineRegistry`] holds at most one pending deadline per key. Each
//! deadline is a small tokio task that sleeps and then posts an
//! [`Expired`] notice on the registry's channel. The owner receives those
//! notices in its own `select!` loop and must pass each one through
//! [`DeadlineRegistry::confirm`] before acting on it:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* may arm or cancel */ }
//!         Some(expired) = expiry_rx.recv() => {
//!             if deadlines.confirm(&expired) {
//!                 evict(expired.key);
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! # Why confirm
//!
//! Cancelling aborts the sleeping task, but a task that already woke up
//! may have queued its notice before the abort landed. Every arm bumps a
//! generation counter, and `confirm` only accepts a notice whose
//! generation is still the armed one. A notice for a cancelled or
//! re-armed key is therefore dropped, and a vacated slot never sees a
//! stale expiry.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::trace;

// ---------------------------------------------------------------------------
// Expired
// ---------------------------------------------------------------------------

/// Notice that the deadline armed for `key` has elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired<K> {
    pub key: K,
    generation: u64,
}

// ---------------------------------------------------------------------------
// DeadlineRegistry
// ---------------------------------------------------------------------------

struct Armed {
    generation: u64,
    deadline: Instant,
    task: JoinHandle<()>,
}

/// One cancellable deadline per key.
///
/// Dropping the registry aborts every outstanding deadline.
pub struct DeadlineRegistry<K> {
    armed: HashMap<K, Armed>,
    next_generation: u64,
    tx: mpsc::UnboundedSender<Expired<K>>,
}

impl<K> DeadlineRegistry<K>
where
    K: Eq + Hash + Clone + Send + std::fmt::Debug + 'static,
{
    /// Creates a registry and the receiver its expiries arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Expired<K>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Self {
            armed: HashMap::new(),
            next_generation: 0,
            tx,
        };
        (registry, rx)
    }

    /// Arms (or re-arms) the deadline for `key` to fire `after` from now.
    ///
    /// Any deadline already armed for `key` is cancelled first.
    pub fn arm(&mut self, key: K, after: Duration) {
        self.cancel(&key);

        self.next_generation += 1;
        let generation = self.next_generation;
        let deadline = Instant::now() + after;
        let tx = self.tx.clone();
        let notice = Expired {
            key: key.clone(),
            generation,
        };

        let task = tokio::spawn(async move {
            time::sleep_until(deadline).await;
            // The receiver is gone only when the owner shut down.
            let _ = tx.send(notice);
        });

        trace!(?key, generation, ?after, "deadline armed");
        self.armed.insert(
            key,
            Armed {
                generation,
                deadline,
                task,
            },
        );
    }

    /// Cancels the deadline for `key`. Returns `false` if none was armed.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.armed.remove(key) {
            Some(armed) => {
                armed.task.abort();
                trace!(?key, generation = armed.generation, "deadline cancelled");
                true
            }
            None => false,
        }
    }

    /// Accepts an expiry notice if it belongs to the currently armed
    /// deadline for its key, disarming that key. Stale notices return
    /// `false` and leave the registry untouched.
    pub fn confirm(&mut self, expired: &Expired<K>) -> bool {
        match self.armed.get(&expired.key) {
            Some(armed) if armed.generation == expired.generation => {
                self.armed.remove(&expired.key);
                true
            }
            _ => {
                trace!(key = ?expired.key, "stale expiry ignored");
                false
            }
        }
    }

    /// Returns `true` if a deadline is pending for `key`.
    pub fn is_armed(&self, key: &K) -> bool {
        self.armed.contains_key(key)
    }

    /// Time left before `key` fires, or `None` if nothing is armed.
    pub fn remaining(&self, key: &K) -> Option<Duration> {
        self.armed
            .get(key)
            .map(|armed| armed.deadline.saturating_duration_since(Instant::now()))
    }

    /// Number of pending deadlines.
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    /// Cancels everything.
    pub fn clear(&mut self) {
        for (_, armed) in self.armed.drain() {
            armed.task.abort();
        }
    }
}

impl<K> Drop for DeadlineRegistry<K> {
    fn drop(&mut self) {
        for armed in self.armed.values() {
            armed.task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Jitter
// ---------------------------------------------------------------------------

/// A uniformly random duration in `[min, max]`, drawn from `rng`.
///
/// Used for the bot's simulated thinking time. If `max <= min`, returns
/// `min` without touching the generator.
pub fn jittered<R: Rng + ?Sized>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let span = (max - min).as_millis() as u64;
    min + Duration::from_millis(rng.random_range(0..=span))
}
