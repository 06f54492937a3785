//! Tile collection: the entry point for loading tiles.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          TileCollection                          │
//! │                                                                  │
//! │   get_tiles() ──┐                                                │
//! │                 ▼                                                │
//! │   ┌───────────── state lock + condvar ──────────────┐            │
//! │   │  ┌──────────────┐          ┌────────────────┐   │            │
//! │   │  │  TileCache   │          │   LoadQueue    │   │            │
//! │   │  │ (weak slots) │          │ (min priority) │   │            │
//! │   │  └──────────────┘          └────────────────┘   │            │
//! │   └──────────────────────────────┬──────────────────┘            │
//! │                                  │ notify                        │
//! │                                  ▼                               │
//! │   ┌───────────── load lock (fetch fence) ───────────┐            │
//! │   │  loader thread: fetch ──► overwrite entry       │            │
//! │   └──────────────────────────────┬──────────────────┘            │
//! │                                  ▼                               │
//! │                        TileObserver::tile_updated                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callers never wait for a fetch. They get placeholder entries back right
//! away and learn about real data through their observer.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use crate::config::LoaderConfig;
use crate::error::LoaderError;
use crate::source::TileSource;

use super::cache::{ObjectKey, TileCache, TileEntry};
use super::loader;
use super::notify::{ObserverSet, TileObserver};
use super::placeholder::Placeholder;
use super::queue::{LoadQueue, Priority};

/// Name of the loader thread.
pub const LOADER_THREAD_NAME: &str = "tile-loader";

/// Tier used by [`TileCollection::get_tile`] and the CLI.
pub const DEFAULT_PRIORITY: i32 = 1;

// =============================================================================
// Loader State
// =============================================================================

/// Where the loader thread is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoaderState {
    /// Blocked on the condition variable, queue empty
    Waiting = 0,
    /// Fetching or writing back a tile
    Running = 1,
    /// Exited; never leaves this state
    Terminated = 2,
}

impl LoaderState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LoaderState::Waiting,
            1 => LoaderState::Running,
            _ => LoaderState::Terminated,
        }
    }
}

// =============================================================================
// Shared State
// =============================================================================

/// Queue and cache, always mutated together under one lock.
pub(crate) struct LoadState {
    pub(crate) queue: LoadQueue,
    pub(crate) cache: TileCache,
}

/// State shared between callers and the loader thread.
pub(crate) struct Shared {
    state: Mutex<LoadState>,
    pub(crate) cv: Condvar,
    load_lock: Mutex<()>,
    abort: AtomicBool,
    observers: Mutex<ObserverSet>,
    loader_state: AtomicU8,
}

impl Shared {
    fn new(placeholder: Placeholder) -> Self {
        Self {
            state: Mutex::new(LoadState {
                queue: LoadQueue::new(),
                cache: TileCache::new(placeholder),
            }),
            cv: Condvar::new(),
            load_lock: Mutex::new(()),
            abort: AtomicBool::new(false),
            observers: Mutex::new(ObserverSet::default()),
            loader_state: AtomicU8::new(LoaderState::Waiting as u8),
        }
    }

    // A poisoned lock only means the loader panicked on a channel mismatch;
    // the protected data is still consistent.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_fetch(&self) -> MutexGuard<'_, ()> {
        self.load_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    pub(crate) fn set_loader_state(&self, state: LoaderState) {
        self.loader_state.store(state as u8, Ordering::Release);
    }

    fn loader_state(&self) -> LoaderState {
        LoaderState::from_u8(self.loader_state.load(Ordering::Acquire))
    }

    /// Check whether `key` still has a live entry.
    pub(crate) fn is_cached(&self, key: &ObjectKey) -> bool {
        self.lock_state().cache.contains(key)
    }

    /// Live entry for `key`, if any.
    pub(crate) fn cached(&self, key: &ObjectKey) -> Option<TileEntry> {
        self.lock_state().cache.get(key)
    }

    /// Observers that are still listening.
    pub(crate) fn live_observers(&self) -> Vec<Arc<dyn TileObserver>> {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live()
    }
}

// =============================================================================
// Tile Collection
// =============================================================================

/// Priority-ordered, weakly cached tile loader.
///
/// Construct one per process at startup and share it (e.g. behind an `Arc`)
/// with everything that displays tiles. Shut it down with
/// [`abort`](Self::abort) followed by [`join`](Self::join); dropping the
/// collection aborts the loader without waiting for it.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use tile_loader::{ChannelObserver, LoaderConfig, ObjectKey, TileCollection, TileObserver};
///
/// let config = LoaderConfig::new(40, vec![1, 1, 1]);
/// let tiles = TileCollection::new(config, source)?;
///
/// let (observer, mut events) = ChannelObserver::new();
/// let observer: Arc<dyn TileObserver> = observer;
///
/// // Returns immediately with placeholder buffers
/// let entry = tiles.get_tile(&ObjectKey::new("plate1/A01.png", 0, 0), &observer, 1);
///
/// // Later, on the UI side
/// while let Some(event) = events.recv().await {
///     redraw(&event.key);
/// }
/// ```
pub struct TileCollection {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    config: LoaderConfig,
}

impl TileCollection {
    /// Create the collection and start its loader thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, or if the loader's
    /// runtime or thread cannot be created.
    pub fn new<S: TileSource>(config: LoaderConfig, source: S) -> Result<Self, LoaderError> {
        config.validate().map_err(LoaderError::InvalidConfig)?;

        let placeholder = Placeholder::new(config.tile_size, config.channel_count());
        let shared = Arc::new(Shared::new(placeholder));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(LoaderError::Runtime)?;

        let worker_shared = Arc::clone(&shared);
        let use_backend = config.use_imaging_backend;
        let handle = thread::Builder::new()
            .name(LOADER_THREAD_NAME.to_string())
            .spawn(move || loader::run(worker_shared, source, runtime, use_backend))
            .map_err(LoaderError::Spawn)?;

        info!(
            tile_size = config.tile_size,
            channels = config.channel_count(),
            imaging_backend = config.use_imaging_backend,
            "Tile collection started"
        );

        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
            config,
        })
    }

    /// The configuration this collection was built with.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Request a single tile. See [`get_tiles`](Self::get_tiles).
    pub fn get_tile(
        &self,
        key: &ObjectKey,
        observer: &Arc<dyn TileObserver>,
        priority: i32,
    ) -> TileEntry {
        let mut entries = self.get_tiles(std::slice::from_ref(key), observer, priority, false);
        // get_tiles returns exactly one entry per key
        entries.swap_remove(0)
    }

    /// Request tiles for `keys`, returning one entry per key in the same order.
    ///
    /// Entries already in the cache are returned as they are. Every other key
    /// gets a fresh placeholder entry and a queued fetch. `observer` is
    /// registered (once) to hear about every tile the loader finishes from
    /// now on.
    ///
    /// Fetch order: lower `priority` first; within a priority, keys from this
    /// call go before keys from earlier calls, grouped by source image in the
    /// order the images first appear in `keys`.
    ///
    /// Never blocks on a fetch.
    pub fn get_tiles(
        &self,
        keys: &[ObjectKey],
        observer: &Arc<dyn TileObserver>,
        priority: i32,
        display_whole_image: bool,
    ) -> Vec<TileEntry> {
        self.shared
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .register(observer);

        let mut entries = Vec::with_capacity(keys.len());
        let mut misses: Vec<(u32, &ObjectKey)> = Vec::new();

        let mut state = self.shared.lock_state();
        for (order, key) in keys.iter().enumerate() {
            let (entry, created) = state.cache.get_or_create(key);
            if created {
                misses.push((order as u32, key));
            }
            entries.push(entry);
        }

        let ranks = state
            .queue
            .rank_batch(misses.iter().map(|(_, key)| &key.source));
        for (order, key) in misses.iter().copied() {
            let group = ranks
                .get(&key.source)
                .unwrap_or_else(|| state.queue.group_counter());
            state.queue.enqueue(
                Priority::new(priority, group, order),
                key.clone(),
                display_whole_image,
            );
        }

        debug!(
            requested = keys.len(),
            queued = misses.len(),
            priority = priority,
            "Tiles requested"
        );

        self.shared.cv.notify_one();
        drop(state);

        entries
    }

    /// Ask the loader to stop.
    ///
    /// Queues the abort sentinel ahead of everything else and returns without
    /// waiting. A fetch already in progress is allowed to finish; no new fetch
    /// starts afterwards.
    pub fn abort(&self) {
        if self.shared.abort.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut state = self.shared.lock_state();
        state.queue.enqueue_abort();
        self.shared.cv.notify_all();
        drop(state);

        info!("Tile loader abort requested");
    }

    /// Wait for the loader thread to exit.
    ///
    /// Call [`abort`](Self::abort) first, otherwise this waits forever.
    /// Returns immediately if the thread was already joined.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::WorkerPanicked`] if the loader thread panicked.
    pub fn join(&self) -> Result<(), LoaderError> {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match handle {
            Some(handle) => handle.join().map_err(|payload| {
                let message = payload
                    .downcast_ref::<String>()
                    .cloned()
                    .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
                    .unwrap_or_else(|| "unknown panic".to_string());
                LoaderError::WorkerPanicked(message)
            }),
            None => Ok(()),
        }
    }

    /// Block until no fetch is in flight and keep the loader from starting
    /// another one while the guard is held.
    ///
    /// Tiles can still be requested while the guard is held.
    pub fn load_lock(&self) -> MutexGuard<'_, ()> {
        self.shared.lock_fetch()
    }

    /// Current state of the loader thread.
    pub fn state(&self) -> LoaderState {
        self.shared.loader_state()
    }

    /// Whether [`abort`](Self::abort) has been called.
    pub fn is_aborted(&self) -> bool {
        self.shared.abort_requested()
    }

    /// Number of items waiting in the load queue.
    pub fn queue_len(&self) -> usize {
        self.shared.lock_state().queue.len()
    }

    /// Number of queued fetches for `key`.
    pub fn pending(&self, key: &ObjectKey) -> usize {
        self.shared.lock_state().queue.pending(key)
    }

    /// Number of tile entries still held by someone.
    pub fn cached_len(&self) -> usize {
        self.shared.lock_state().cache.len()
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.shared
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for TileCollection {
    fn drop(&mut self) {
        self.abort();
    }
}
