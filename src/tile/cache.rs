//! Weakly-held tile cache.
//!
//! This module maps object keys to tile entries that callers hold on to. The
//! cache itself only keeps [`Weak`] handles: once every caller has dropped its
//! [`TileEntry`], the entry is gone and a later request starts over from a
//! fresh placeholder.
//!
//! # Identity
//!
//! A [`TileEntry`] is a shared handle. Every caller that asks for the same key
//! while an entry is alive receives a clone of the *same* handle, so when the
//! loader writes fetched data into it, all of them observe the update without
//! looking the key up again.
//!
//! # Eviction
//!
//! There is no size bound and no LRU order. Dead slots are dropped when a
//! lookup stumbles on them, and the whole map is swept whenever it has grown
//! to twice its live size since the previous sweep.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde::{Deserialize, Serialize};

use super::buffer::ChannelBuffer;
use super::placeholder::Placeholder;

/// Map size below which the cache never runs a full sweep.
const MIN_PURGE_THRESHOLD: usize = 256;

// =============================================================================
// Object Key
// =============================================================================

/// Identifies a requestable tile.
///
/// `source` names the image the tile is cut from; requests are grouped by it
/// when ordering the load queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Source image identifier
    pub source: Arc<str>,

    /// Tile column within the source image
    pub x: u32,

    /// Tile row within the source image
    pub y: u32,
}

impl ObjectKey {
    /// Create a new object key.
    pub fn new(source: impl Into<Arc<str>>, x: u32, y: u32) -> Self {
        Self {
            source: source.into(),
            x,
            y,
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.x, self.y)
    }
}

impl FromStr for ObjectKey {
    type Err = String;

    /// Parse `source:x:y`. The source may itself contain colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, ':');
        let y = parts.next();
        let x = parts.next();
        let source = parts.next();

        match (source, x, y) {
            (Some(source), Some(x), Some(y)) if !source.is_empty() => {
                let x = x
                    .parse::<u32>()
                    .map_err(|e| format!("invalid tile column '{}': {}", x, e))?;
                let y = y
                    .parse::<u32>()
                    .map_err(|e| format!("invalid tile row '{}': {}", y, e))?;
                Ok(Self::new(source, x, y))
            }
            _ => Err(format!("expected <source>:<x>:<y>, got '{}'", s)),
        }
    }
}

// =============================================================================
// Tile Entry
// =============================================================================

struct TileSlot {
    key: ObjectKey,
    channel_count: usize,
    channels: RwLock<Vec<Arc<ChannelBuffer>>>,
    loaded: AtomicBool,
}

/// Shared handle to the per-channel buffers of one tile.
///
/// Holding a `TileEntry` keeps the tile in the cache. Contents start out as the
/// placeholder and are replaced in place by the loader once the real data
/// arrives; readers take snapshots with [`TileEntry::channels`].
#[derive(Clone)]
pub struct TileEntry {
    slot: Arc<TileSlot>,
}

impl TileEntry {
    fn new(key: ObjectKey, channels: Vec<Arc<ChannelBuffer>>) -> Self {
        Self {
            slot: Arc::new(TileSlot {
                key,
                channel_count: channels.len(),
                channels: RwLock::new(channels),
                loaded: AtomicBool::new(false),
            }),
        }
    }

    /// The key this entry was created for.
    pub fn key(&self) -> &ObjectKey {
        &self.slot.key
    }

    /// Number of channels. Fixed for the lifetime of the entry.
    pub fn channel_count(&self) -> usize {
        self.slot.channel_count
    }

    /// Snapshot of the current channel buffers.
    pub fn channels(&self) -> Vec<Arc<ChannelBuffer>> {
        self.slot
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current buffer of a single channel.
    pub fn channel(&self, index: usize) -> Option<Arc<ChannelBuffer>> {
        self.slot
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    /// Whether fetched data has been written into this entry.
    pub fn is_loaded(&self) -> bool {
        self.slot.loaded.load(Ordering::Acquire)
    }

    /// Whether two handles refer to the same entry.
    pub fn ptr_eq(a: &TileEntry, b: &TileEntry) -> bool {
        Arc::ptr_eq(&a.slot, &b.slot)
    }

    /// Overwrite every channel with fetched data, index by index.
    ///
    /// # Panics
    ///
    /// Panics if `data` does not have exactly one buffer per channel. A
    /// mismatch means the source and the configuration disagree, which is not
    /// recoverable.
    pub(crate) fn overwrite(&self, data: Vec<ChannelBuffer>) {
        assert_eq!(
            data.len(),
            self.slot.channel_count,
            "tile source returned {} channels for {}, configured for {}",
            data.len(),
            self.slot.key,
            self.slot.channel_count
        );

        let mut channels = self
            .slot
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for (slot, buffer) in channels.iter_mut().zip(data) {
            *slot = Arc::new(buffer);
        }
        self.slot.loaded.store(true, Ordering::Release);
    }

    fn downgrade(&self) -> Weak<TileSlot> {
        Arc::downgrade(&self.slot)
    }

    fn upgrade(weak: &Weak<TileSlot>) -> Option<Self> {
        weak.upgrade().map(|slot| Self { slot })
    }
}

impl fmt::Debug for TileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileEntry")
            .field("key", &self.slot.key)
            .field("channels", &self.slot.channel_count)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

/// Map from object key to weakly-held tile entries.
///
/// Not synchronized on its own: the tile collection keeps it behind the same
/// lock as the load queue so that "is it cached?" and "enqueue it" happen
/// atomically.
pub struct TileCache {
    entries: HashMap<ObjectKey, Weak<TileSlot>>,
    placeholder: Placeholder,
    purge_at: usize,
}

impl TileCache {
    /// Create an empty cache whose new entries start as `placeholder`.
    pub fn new(placeholder: Placeholder) -> Self {
        Self {
            entries: HashMap::new(),
            placeholder,
            purge_at: MIN_PURGE_THRESHOLD,
        }
    }

    /// The placeholder template used for new entries.
    pub fn placeholder(&self) -> &Placeholder {
        &self.placeholder
    }

    /// Look up a live entry.
    pub fn get(&self, key: &ObjectKey) -> Option<TileEntry> {
        self.entries.get(key).and_then(TileEntry::upgrade)
    }

    /// Check whether a live entry exists for `key`.
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.entries
            .get(key)
            .map(|weak| weak.strong_count() > 0)
            .unwrap_or(false)
    }

    /// Return the live entry for `key`, or create one from the placeholder.
    ///
    /// The boolean is `true` when a new entry was created.
    pub fn get_or_create(&mut self, key: &ObjectKey) -> (TileEntry, bool) {
        if let Some(entry) = self.get(key) {
            return (entry, false);
        }

        if self.entries.len() >= self.purge_at {
            self.purge();
            self.purge_at = (self.entries.len() * 2).max(MIN_PURGE_THRESHOLD);
        }

        let entry = TileEntry::new(key.clone(), self.placeholder.instantiate());
        self.entries.insert(key.clone(), entry.downgrade());
        (entry, true)
    }

    /// Drop every slot whose entry is no longer held by anyone.
    ///
    /// Returns the number of slots removed.
    pub fn purge(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, weak| weak.strong_count() > 0);
        before - self.entries.len()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Check if no live entry remains.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================
