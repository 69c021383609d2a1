// Sensorhub - Sensor hub core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Bounded dispatch queue
//!
//! Every sensor node pushes into one [`DispatchQueue`]; the event
//! dispatcher is its only consumer. Producers never block: when the queue
//! is at capacity the configured [`DropPolicy`] decides which event is
//! lost and the drop counter is bumped.
//!
//! The queue mutex guards the queue storage only. Callers must not hold a
//! node or client lock while waiting in [`DispatchQueue::pop`].

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::event::Event;

/// What to do with an event pushed into a full queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropPolicy {
    /// Refuse the incoming event
    #[default]
    DropNewest,
    /// Evict the oldest queued event to make room
    DropOldest,
}

/// How many waiters are woken when the queue becomes non-empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WakePolicy {
    #[default]
    One,
    All,
}

/// Storage order of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueOrdering {
    /// Plain ring buffer
    #[default]
    Fifo,
    /// Heap keyed on arrival sequence
    Sequenced,
}

/// Dispatch queue configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum number of queued events
    pub capacity: usize,
    /// Overflow behavior
    pub drop_policy: DropPolicy,
    /// Consumer wake-up behavior
    pub wake: WakePolicy,
    /// Storage order
    pub ordering: QueueOrdering,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            drop_policy: DropPolicy::DropNewest,
            wake: WakePolicy::One,
            ordering: QueueOrdering::Fifo,
        }
    }
}

impl QueueConfig {
    /// Create a configuration with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Set the drop policy
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Set the wake policy
    pub fn wake(mut self, wake: WakePolicy) -> Self {
        self.wake = wake;
        self
    }

    /// Set the storage order
    pub fn ordering(mut self, ordering: QueueOrdering) -> Self {
        self.ordering = ordering;
        self
    }
}

struct SequencedEvent {
    seq: u64,
    event: Event,
}

impl PartialEq for SequencedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for SequencedEvent {}

impl PartialOrd for SequencedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for SequencedEvent {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.seq.cmp(&other.seq)
    }
}

enum Storage {
    Fifo(VecDeque<Event>),
    Sequenced(BinaryHeap<Reverse<SequencedEvent>>),
}

impl Storage {
    fn new(ordering: QueueOrdering, capacity: usize) -> Self {
        // Pre-allocate a bounded amount, large capacities grow on demand
        let initial = capacity.min(1024);
        match ordering {
            QueueOrdering::Fifo => Storage::Fifo(VecDeque::with_capacity(initial)),
            QueueOrdering::Sequenced => Storage::Sequenced(BinaryHeap::with_capacity(initial)),
        }
    }

    fn len(&self) -> usize {
        match self {
            Storage::Fifo(q) => q.len(),
            Storage::Sequenced(h) => h.len(),
        }
    }

    fn push(&mut self, seq: u64, event: Event) {
        match self {
            Storage::Fifo(q) => q.push_back(event),
            Storage::Sequenced(h) => h.push(Reverse(SequencedEvent { seq, event })),
        }
    }

    fn pop(&mut self) -> Option<Event> {
        match self {
            Storage::Fifo(q) => q.pop_front(),
            Storage::Sequenced(h) => h.pop().map(|Reverse(s)| s.event),
        }
    }
}

struct Inner {
    storage: Storage,
    next_seq: u64,
    closed: bool,
    high_water: usize,
}

/// Bounded multi-producer, single-consumer event queue
pub struct DispatchQueue {
    config: QueueConfig,
    inner: Mutex<Inner>,
    not_empty: Condvar,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl DispatchQueue {
    /// Create a queue with the given configuration
    pub fn new(config: QueueConfig) -> Self {
        let storage = Storage::new(config.ordering, config.capacity);
        Self {
            config,
            inner: Mutex::new(Inner {
                storage,
                next_seq: 0,
                closed: false,
                high_water: 0,
            }),
            not_empty: Condvar::new(),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Create a queue with default configuration and a custom capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(QueueConfig::with_capacity(capacity))
    }

    /// Enqueue an event without blocking.
    ///
    /// Returns `false` when the incoming event was refused (queue full
    /// under [`DropPolicy::DropNewest`], zero capacity, or queue closed).
    pub fn push(&self, event: Event) -> bool {
        let mut inner = self.inner.lock();

        if inner.closed {
            return false;
        }

        if inner.storage.len() >= self.config.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            match self.config.drop_policy {
                DropPolicy::DropNewest => {
                    log::warn!(
                        "dispatch queue full ({}), dropping {} from sensor {}",
                        self.config.capacity,
                        event.event_type,
                        event.sensor_id
                    );
                    return false;
                }
                DropPolicy::DropOldest => {
                    if inner.storage.pop().is_none() {
                        // capacity 0
                        return false;
                    }
                    log::warn!(
                        "dispatch queue full ({}), evicted oldest event",
                        self.config.capacity
                    );
                }
            }
        }

        let was_empty = inner.storage.len() == 0;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.storage.push(seq, event);
        let len = inner.storage.len();
        if len > inner.high_water {
            inner.high_water = len;
        }
        drop(inner);

        self.pushed.fetch_add(1, Ordering::Relaxed);

        if was_empty {
            match self.config.wake {
                WakePolicy::One => {
                    self.not_empty.notify_one();
                }
                WakePolicy::All => {
                    self.not_empty.notify_all();
                }
            }
        }
        true
    }

    /// Dequeue the next event, waiting until one is available.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<Event> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(event) = inner.storage.pop() {
                return Some(event);
            }
            if inner.closed {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Dequeue the next event, waiting at most `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Event> {
        let mut inner = self.inner.lock();
        if let Some(event) = inner.storage.pop() {
            return Some(event);
        }
        if inner.closed {
            return None;
        }
        let _ = self.not_empty.wait_for(&mut inner, timeout);
        inner.storage.pop()
    }

    /// Dequeue without waiting
    pub fn try_pop(&self) -> Option<Event> {
        self.inner.lock().storage.pop()
    }

    /// Close the queue and wake the consumer.
    ///
    /// Pushes are refused afterwards; queued events can still be popped.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.inner.lock().storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Queue configuration
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Number of events accepted so far
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Number of events lost to overflow
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Largest queue depth observed
    pub fn high_water(&self) -> usize {
        self.inner.lock().high_water
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("config", &self.config)
            .field("len", &self.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}
