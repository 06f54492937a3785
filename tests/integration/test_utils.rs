//! Test utilities for integration tests.
//!
//! This module provides a mock tile source with request tracking, a recording
//! observer, and helpers for steering the loader thread into known states.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use tile_loader::error::SourceError;
use tile_loader::source::TileSource;
use tile_loader::tile::{ChannelBuffer, ObjectKey, TileCollection, TileEntry, TileObserver};
use tile_loader::TileUpdatedEvent;

/// How long helpers wait for the loader before failing a test.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Mock Tile Source with Request Tracking
// =============================================================================

/// A mock tile source that records every fetch.
///
/// By default every key produces `channels` buffers filled with
/// [`MockTileSource::fill_value`]. Individual keys can be overridden to return
/// nothing or a custom response.
pub struct MockTileSource {
    tile_size: u32,
    channels: usize,
    overrides: Mutex<HashMap<ObjectKey, Option<Vec<ChannelBuffer>>>>,
    fetched: Mutex<Vec<(ObjectKey, bool)>>,
    gate: Option<Arc<Semaphore>>,
    fail_attach: bool,
    attach_count: AtomicUsize,
    detach_count: AtomicUsize,
    close_count: AtomicUsize,
}

impl MockTileSource {
    pub fn new(tile_size: u32, channels: usize) -> Self {
        Self {
            tile_size,
            channels,
            overrides: Mutex::new(HashMap::new()),
            fetched: Mutex::new(Vec::new()),
            gate: None,
            fail_attach: false,
            attach_count: AtomicUsize::new(0),
            detach_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
        }
    }

    /// Return no data for `key`.
    pub fn with_missing(self, key: ObjectKey) -> Self {
        self.overrides.lock().unwrap().insert(key, None);
        self
    }

    /// Return `buffers` for `key`.
    pub fn with_response(self, key: ObjectKey, buffers: Vec<ChannelBuffer>) -> Self {
        self.overrides.lock().unwrap().insert(key, Some(buffers));
        self
    }

    /// Make every fetch wait for a permit from [`MockTileSource::release`].
    pub fn with_gate(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Make `attach_backend` fail.
    pub fn with_failing_attach(mut self) -> Self {
        self.fail_attach = true;
        self
    }

    /// Let `n` gated fetches complete.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Sample value the default response uses for `key`.
    pub fn fill_value(key: &ObjectKey) -> f32 {
        ((key.x + key.y * 7) % 10) as f32 / 10.0 + 0.05
    }

    /// The buffers the default response produces for `key`.
    pub fn expected(&self, key: &ObjectKey) -> Vec<ChannelBuffer> {
        (0..self.channels)
            .map(|_| ChannelBuffer::filled(self.tile_size, self.tile_size, Self::fill_value(key)))
            .collect()
    }

    /// Keys in the order their fetches started.
    pub fn fetched_keys(&self) -> Vec<ObjectKey> {
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// `(key, display_whole_image)` for every fetch started.
    pub fn fetch_log(&self) -> Vec<(ObjectKey, bool)> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, key: &ObjectKey) -> usize {
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .count()
    }

    pub fn attach_count(&self) -> usize {
        self.attach_count.load(Ordering::SeqCst)
    }

    pub fn detach_count(&self) -> usize {
        self.detach_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TileSource for MockTileSource {
    async fn fetch(
        &self,
        key: &ObjectKey,
        display_whole_image: bool,
    ) -> Option<Vec<ChannelBuffer>> {
        self.fetched
            .lock()
            .unwrap()
            .push((key.clone(), display_whole_image));

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let overridden = self.overrides.lock().unwrap().get(key).cloned();
        match overridden {
            Some(response) => response,
            None => Some(self.expected(key)),
        }
    }

    fn attach_backend(&self) -> Result<(), SourceError> {
        self.attach_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_attach {
            return Err(SourceError::Backend("runtime unavailable".to_string()));
        }
        Ok(())
    }

    fn detach_backend(&self) -> Result<(), SourceError> {
        self.detach_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), SourceError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Recording Observer
// =============================================================================

/// Observer that records every event it receives.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObjectKey>>,
}

impl RecordingObserver {
    /// Create a recorder and the same observer as a trait object.
    pub fn new() -> (Arc<Self>, Arc<dyn TileObserver>) {
        let recorder = Arc::new(Self::default());
        let observer: Arc<dyn TileObserver> = recorder.clone();
        (recorder, observer)
    }

    pub fn events(&self) -> Vec<ObjectKey> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_for(&self, key: &ObjectKey) -> usize {
        self.events.lock().unwrap().iter().filter(|k| *k == key).count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl TileObserver for RecordingObserver {
    fn tile_updated(&self, event: TileUpdatedEvent) {
        self.events.lock().unwrap().push(event.key);
    }
}

// =============================================================================
// Loader Steering
// =============================================================================

/// Poll `condition` until it holds or [`WAIT_TIMEOUT`] passes.
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < WAIT_TIMEOUT {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Key used to park the loader.
pub fn blocker_key() -> ObjectKey {
    ObjectKey::new("blocker.png", 0, 0)
}

/// Park the loader on the load lock with the blocker tile in hand.
///
/// While the returned guard is held, the loader has popped the blocker and
/// cannot start any fetch, so everything requested afterwards stays queued in
/// priority order. Dropping the guard lets the loader continue with the
/// blocker first.
pub fn park_loader<'a>(
    tiles: &'a TileCollection,
    observer: &Arc<dyn TileObserver>,
) -> (MutexGuard<'a, ()>, TileEntry) {
    let fence = tiles.load_lock();
    let blocker = tiles.get_tile(&blocker_key(), observer, i32::MIN);
    assert!(
        wait_until(|| tiles.queue_len() == 0),
        "loader never picked up the blocker tile"
    );
    (fence, blocker)
}

/// Request a low-priority marker tile and wait until it is loaded.
///
/// Everything queued before it at a better priority has been handled once the
/// marker arrives.
pub fn drain(tiles: &TileCollection, observer: &Arc<dyn TileObserver>) -> TileEntry {
    let marker = tiles.get_tile(&ObjectKey::new("marker.png", 0, 0), observer, i32::MAX);
    assert!(
        wait_until(|| marker.is_loaded()),
        "loader never reached the marker tile"
    );
    marker
}

/// Compare an entry's current buffers with `expected`, element for element.
pub fn assert_entry_matches(entry: &TileEntry, expected: &[ChannelBuffer]) {
    let channels = entry.channels();
    assert_eq!(channels.len(), expected.len());
    for (actual, expected) in channels.iter().zip(expected) {
        assert_eq!(actual.as_ref(), expected);
    }
}

// =============================================================================
// Scratch Directories
// =============================================================================

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Fresh scratch directory under the system temp dir.
pub fn scratch_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "tile-loader-{}-{}-{}",
        prefix,
        std::process::id(),
        DIR_COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
