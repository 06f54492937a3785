//! Priority load queue.
//!
//! Pending fetches are ordered by a three-level [`Priority`]:
//!
//! 1. **tier**: supplied by the caller, smaller is sooner. Dominates.
//! 2. **group**: recency-biased rank of the item's source image. Every source
//!    image of a newer batch outranks every source image of an older batch in
//!    the same tier; within a batch, the first source image seen wins.
//! 3. **order**: position of the key in the request batch. Final tie-break.
//!
//! The abort sentinel carries [`Priority::MIN`], so it is popped before
//! anything else already in the queue.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use super::cache::ObjectKey;

// =============================================================================
// Priority
// =============================================================================

/// Lexicographically ordered `(tier, group, order)` tuple. Lower pops first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority {
    /// Caller-supplied tier
    pub tier: i32,

    /// Source-image group rank
    pub group: i64,

    /// Position within the request batch
    pub order: u32,
}

impl Priority {
    /// The lowest possible priority tuple, reserved for the abort sentinel.
    pub const MIN: Priority = Priority {
        tier: i32::MIN,
        group: i64::MIN,
        order: 0,
    };

    pub fn new(tier: i32, group: i64, order: u32) -> Self {
        Self { tier, group, order }
    }
}

impl From<(i32, i64, u32)> for Priority {
    fn from((tier, group, order): (i32, i64, u32)) -> Self {
        Self::new(tier, group, order)
    }
}

// =============================================================================
// Queue Items
// =============================================================================

/// Work carried by a queue item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadJob {
    /// Fetch tile data for `key`
    Fetch {
        key: ObjectKey,
        display_whole_image: bool,
    },

    /// Wake the loader so it notices the abort flag
    Abort,
}

/// A prioritized entry in the load queue.
#[derive(Debug, Clone)]
pub struct LoadQueueItem {
    pub priority: Priority,
    pub job: LoadJob,
    seq: u64,
}

impl LoadQueueItem {
    /// The key to fetch, or `None` for the sentinel.
    pub fn key(&self) -> Option<&ObjectKey> {
        match &self.job {
            LoadJob::Fetch { key, .. } => Some(key),
            LoadJob::Abort => None,
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self.job, LoadJob::Abort)
    }
}

// Ordered by priority, then insertion order for exact ties.
impl PartialEq for LoadQueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for LoadQueueItem {}

impl PartialOrd for LoadQueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LoadQueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

// =============================================================================
// Group Ranks
// =============================================================================

/// Group ranks assigned to the source images of one request batch.
#[derive(Debug, Clone, Default)]
pub struct GroupRanks {
    ranks: HashMap<Arc<str>, i64>,
}

impl GroupRanks {
    /// Rank of `source`, if it was part of the batch.
    pub fn get(&self, source: &str) -> Option<i64> {
        self.ranks.get(source).copied()
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

// =============================================================================
// Load Queue
// =============================================================================

/// Min-priority queue of pending tile fetches.
///
/// Also owns the group counter that implements recency-first ordering across
/// request batches. Not synchronized on its own; the tile collection guards it
/// together with the cache.
#[derive(Debug, Default)]
pub struct LoadQueue {
    heap: BinaryHeap<Reverse<LoadQueueItem>>,
    group_counter: i64,
    next_seq: u64,
}

impl LoadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign group ranks to the distinct source images of a new batch.
    ///
    /// Sources are ranked in first-seen order. The counter only ever moves
    /// down, by the number of distinct sources, so every rank handed out here
    /// is lower than every rank handed out to an earlier batch.
    pub fn rank_batch<'a, I>(&mut self, sources: I) -> GroupRanks
    where
        I: IntoIterator<Item = &'a Arc<str>>,
    {
        let mut ranks = HashMap::new();
        let mut distinct = Vec::new();
        for source in sources {
            if !ranks.contains_key(source) {
                ranks.insert(Arc::clone(source), 0);
                distinct.push(Arc::clone(source));
            }
        }

        self.group_counter = self
            .group_counter
            .saturating_sub(distinct.len() as i64);
        for (offset, source) in distinct.iter().enumerate() {
            ranks.insert(Arc::clone(source), self.group_counter + offset as i64);
        }

        GroupRanks { ranks }
    }

    /// Queue a fetch of `key` at `priority`.
    pub fn enqueue(&mut self, priority: Priority, key: ObjectKey, display_whole_image: bool) {
        self.push(
            priority,
            LoadJob::Fetch {
                key,
                display_whole_image,
            },
        );
    }

    /// Queue the abort sentinel at [`Priority::MIN`].
    pub fn enqueue_abort(&mut self) {
        self.push(Priority::MIN, LoadJob::Abort);
    }

    fn push(&mut self, priority: Priority, job: LoadJob) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(LoadQueueItem { priority, job, seq }));
    }

    /// Remove and return the lowest-priority item.
    pub fn pop_min(&mut self) -> Option<LoadQueueItem> {
        self.heap.pop().map(|Reverse(item)| item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of queued fetches for `key`.
    pub fn pending(&self, key: &ObjectKey) -> usize {
        self.heap
            .iter()
            .filter(|Reverse(item)| item.key() == Some(key))
            .count()
    }

    /// Current value of the group counter.
    pub fn group_counter(&self) -> i64 {
        self.group_counter
    }
}

// =============================================================================
// Tests
// =============================================================================
