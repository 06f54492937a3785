//! Tile collection request tests.
//!
//! Tests verify:
//! - New keys come back as placeholders of the configured shape
//! - Duplicate requests share one entry and one queued fetch
//! - Cached entries are returned without queueing another fetch
//! - Observers register once

use std::sync::Arc;

use tile_loader::tile::{ObjectKey, TileCollection, TileEntry, PLACEHOLDER_FILL};
use tile_loader::LoaderConfig;

use super::test_utils::{
    assert_entry_matches, drain, park_loader, wait_until, MockTileSource, RecordingObserver,
};

fn collection(tile_size: u32, channels_per_image: Vec<u32>) -> (TileCollection, Arc<MockTileSource>) {
    let config = LoaderConfig::new(tile_size, channels_per_image);
    let source = Arc::new(MockTileSource::new(tile_size, config.channel_count()));
    let tiles = TileCollection::new(config, Arc::clone(&source)).unwrap();
    (tiles, source)
}

// =============================================================================
// Placeholders
// =============================================================================

#[test]
fn test_new_keys_return_icon_placeholders() {
    let (tiles, _source) = collection(16, vec![1, 1, 1]);
    let (_recorder, observer) = RecordingObserver::new();

    let _fence = tiles.load_lock();
    let keys = [ObjectKey::new("a.png", 0, 0), ObjectKey::new("a.png", 1, 0)];
    let entries = tiles.get_tiles(&keys, &observer, 1, false);

    assert_eq!(entries.len(), 2);
    for entry in &entries {
        assert!(!entry.is_loaded());
        assert_eq!(entry.channel_count(), 3);

        let channels = entry.channels();
        for buf in &channels {
            assert_eq!(buf.dimensions(), (16, 16));
            assert_eq!(buf.get(0, 0), Some(0.0));
        }
        // Channels of the icon variant are the same buffer
        assert!(Arc::ptr_eq(&channels[0], &channels[2]));
    }
}

#[test]
fn test_small_tiles_return_flat_placeholders() {
    let (tiles, _source) = collection(8, vec![2]);
    let (_recorder, observer) = RecordingObserver::new();

    let _fence = tiles.load_lock();
    let entry = tiles.get_tile(&ObjectKey::new("a.png", 0, 0), &observer, 1);

    let channels = entry.channels();
    assert_eq!(channels.len(), 2);
    for buf in &channels {
        assert_eq!(buf.dimensions(), (8, 8));
        assert!(buf.as_slice().iter().all(|&v| v == PLACEHOLDER_FILL));
    }
}

#[test]
fn test_entries_follow_request_order() {
    let (tiles, _source) = collection(4, vec![1]);
    let (_recorder, observer) = RecordingObserver::new();

    let keys: Vec<ObjectKey> = (0..5).map(|i| ObjectKey::new("img.png", i, 4 - i)).collect();
    let entries = tiles.get_tiles(&keys, &observer, 1, false);

    let returned: Vec<ObjectKey> = entries.iter().map(|e| e.key().clone()).collect();
    assert_eq!(returned, keys);
}

// =============================================================================
// Entry Sharing
// =============================================================================

#[test]
fn test_duplicate_requests_share_one_entry_and_one_fetch() {
    let (tiles, source) = collection(16, vec![1, 1, 1]);
    let (recorder, observer) = RecordingObserver::new();
    let key = ObjectKey::new("src1", 0, 0);

    let (fence, _blocker) = park_loader(&tiles, &observer);

    let first = tiles.get_tile(&key, &observer, 1);
    let second = tiles.get_tile(&key, &observer, 1);

    assert!(TileEntry::ptr_eq(&first, &second));
    assert_eq!(tiles.pending(&key), 1);

    drop(fence);
    assert!(wait_until(|| first.is_loaded()));
    drain(&tiles, &observer);

    assert_eq!(source.fetch_count(&key), 1);
    assert_eq!(recorder.count_for(&key), 1);
    assert!(second.is_loaded());
}

#[test]
fn test_duplicate_key_within_one_batch() {
    let (tiles, _source) = collection(4, vec![1]);
    let (_recorder, observer) = RecordingObserver::new();
    let key = ObjectKey::new("img.png", 2, 2);

    let (_fence, _blocker) = park_loader(&tiles, &observer);
    let entries = tiles.get_tiles(&[key.clone(), key.clone()], &observer, 1, false);

    assert!(TileEntry::ptr_eq(&entries[0], &entries[1]));
    assert_eq!(tiles.pending(&key), 1);
    assert_eq!(tiles.queue_len(), 1);
}

#[test]
fn test_cached_entry_is_not_requeued() {
    let (tiles, source) = collection(4, vec![1]);
    let (_recorder, observer) = RecordingObserver::new();
    let key = ObjectKey::new("img.png", 0, 0);

    let entry = tiles.get_tile(&key, &observer, 1);
    assert!(wait_until(|| entry.is_loaded()));

    let again = tiles.get_tile(&key, &observer, 1);

    assert!(TileEntry::ptr_eq(&entry, &again));
    assert!(again.is_loaded());
    assert_eq!(tiles.pending(&key), 0);

    drain(&tiles, &observer);
    assert_eq!(source.fetch_count(&key), 1);
}

#[test]
fn test_dropped_entry_is_requested_again() {
    let (tiles, source) = collection(4, vec![1]);
    let (_recorder, observer) = RecordingObserver::new();
    let key = ObjectKey::new("img.png", 0, 0);

    let entry = tiles.get_tile(&key, &observer, 1);
    assert!(wait_until(|| entry.is_loaded()));
    drop(entry);
    assert_eq!(tiles.cached_len(), 0);

    let fresh = tiles.get_tile(&key, &observer, 1);
    assert!(wait_until(|| fresh.is_loaded()));

    assert_eq!(source.fetch_count(&key), 2);
    assert_entry_matches(&fresh, &source.expected(&key));
}

// =============================================================================
// Observers
// =============================================================================

#[test]
fn test_observer_registers_once() {
    let (tiles, _source) = collection(4, vec![1]);
    let (recorder, observer) = RecordingObserver::new();

    let _first = tiles.get_tile(&ObjectKey::new("a.png", 0, 0), &observer, 1);
    let _second = tiles.get_tile(&ObjectKey::new("a.png", 1, 0), &observer, 1);
    assert_eq!(tiles.observer_count(), 1);

    drain(&tiles, &observer);

    // Each tile is reported once, not once per registration
    assert_eq!(recorder.count_for(&ObjectKey::new("a.png", 0, 0)), 1);
    assert_eq!(recorder.count_for(&ObjectKey::new("a.png", 1, 0)), 1);
}

#[test]
fn test_every_observer_hears_every_tile() {
    let (tiles, _source) = collection(4, vec![1]);
    let (first, first_observer) = RecordingObserver::new();
    let (second, second_observer) = RecordingObserver::new();
    let key = ObjectKey::new("a.png", 0, 0);

    let (fence, _blocker) = park_loader(&tiles, &first_observer);
    let _entry = tiles.get_tile(&key, &first_observer, 1);
    let _other = tiles.get_tile(&ObjectKey::new("b.png", 0, 0), &second_observer, 1);
    drop(fence);

    drain(&tiles, &first_observer);

    assert_eq!(tiles.observer_count(), 2);
    assert_eq!(first.count_for(&key), 1);
    assert_eq!(second.count_for(&key), 1);
}
