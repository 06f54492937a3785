//! Tile loading layer.
//!
//! This module hands out tile entries immediately and fills them in from a
//! single background loader.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Callers (UI, exporters)          │
//! └────────────────────┬────────────────────┘
//!                      │ get_tiles()
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             TileCollection              │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │   LoadQueue     │  │
//! │  │ (weak slots, │  │ (tier, group,   │  │
//! │  │ placeholders)│  │  order)         │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ loader thread
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               TileSource                │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileCollection`]: Entry point; owns the cache, the queue and the loader
//! - [`TileCache`]: Weakly-held map from [`ObjectKey`] to [`TileEntry`]
//! - [`LoadQueue`]: Min-priority queue ordered by [`Priority`]
//! - [`Placeholder`]: "Loading" buffers shown until real data arrives
//! - [`TileObserver`]: Receives [`TileUpdatedEvent`]s from the loader
//!
//! # Example
//!
//! ```
//! use tile_loader::tile::{LoadQueue, ObjectKey, Priority};
//!
//! let mut queue = LoadQueue::new();
//! queue.enqueue(Priority::new(1, -3, 0), ObjectKey::new("b.png", 0, 0), false);
//! queue.enqueue(Priority::new(1, -5, 0), ObjectKey::new("a.png", 0, 0), false);
//!
//! let first = queue.pop_min().unwrap();
//! assert_eq!(first.key().unwrap().source.as_ref(), "a.png");
//! ```

mod buffer;
mod cache;
mod collection;
mod loader;
mod notify;
mod placeholder;
mod queue;

pub use buffer::ChannelBuffer;
pub use cache::{ObjectKey, TileCache, TileEntry};
pub use collection::{LoaderState, TileCollection, DEFAULT_PRIORITY, LOADER_THREAD_NAME};
pub use notify::{ChannelObserver, TileObserver, TileUpdatedEvent};
pub use placeholder::{Placeholder, ICON_SIZE, ICON_TILE_THRESHOLD, PLACEHOLDER_FILL};
pub use queue::{GroupRanks, LoadJob, LoadQueue, LoadQueueItem, Priority};
