//! # Tile Loader
//!
//! An asynchronous, priority-ordered tile loader with a weakly-held cache.
//!
//! Callers ask for tiles by [`ObjectKey`] and get [`TileEntry`] handles back
//! immediately, filled with a "loading" placeholder. A single background
//! thread fetches the real data from a [`TileSource`], writes it into those
//! same entries in place, and tells every registered [`TileObserver`].
//!
//! ## Features
//!
//! - **Never blocks callers**: requests only take a short internal lock
//! - **Shared entries**: concurrent requests for one key share one entry and
//!   one fetch
//! - **Reference-driven eviction**: entries live exactly as long as someone
//!   holds them; fetches for dropped entries are skipped
//! - **Recency-first ordering**: within a priority tier, the latest request
//!   batch is served first
//! - **Cooperative shutdown**: [`TileCollection::abort`] stops the loader
//!   without waiting for it
//!
//! ## Architecture
//!
//! - [`tile`] - Cache, load queue, placeholders, loader thread and observers
//! - [`source`] - The tile source trait and an image-directory source
//! - [`config`] - Loader and CLI configuration
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tile_loader::{
//!     ChannelObserver, ImageDirSource, LoaderConfig, ObjectKey, TileCollection, TileObserver,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LoaderConfig::new(64, vec![3]);
//!     let source = ImageDirSource::from_config("/data/images", &config);
//!     let tiles = TileCollection::new(config, source)?;
//!
//!     let (observer, mut events) = ChannelObserver::new();
//!     let observer: Arc<dyn TileObserver> = observer;
//!
//!     let keys = [ObjectKey::new("plate1/A01.png", 0, 0)];
//!     let entries = tiles.get_tiles(&keys, &observer, 1, false);
//!
//!     if let Some(event) = events.recv().await {
//!         println!("{} ready: {}", event.key, entries[0].is_loaded());
//!     }
//!
//!     tiles.abort();
//!     tiles.join()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod source;
pub mod tile;

// Re-export commonly used types
pub use config::{Config, LoaderConfig, DEFAULT_TILE_SIZE};
pub use error::{LoaderError, ShapeError, SourceError};
pub use source::{ImageDirSource, TileSource};
pub use tile::{
    ChannelBuffer, ChannelObserver, LoadQueue, LoaderState, ObjectKey, Placeholder, Priority,
    TileCache, TileCollection, TileEntry, TileObserver, TileUpdatedEvent, DEFAULT_PRIORITY,
};
