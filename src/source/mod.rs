//! Tile sources.
//!
//! A [`TileSource`] is the collaborator that actually produces tile pixels for
//! an object key. The tile collection calls it from its loader thread, one
//! request at a time, and never concurrently with itself.
//!
//! # Lifecycle
//!
//! ```text
//!   loader thread starts
//!          │
//!          ├── attach_backend()      (only if the imaging backend is enabled)
//!          │
//!          ├── fetch() ... fetch()   (one at a time, may block)
//!          │
//!          ├── close()               (abort path only)
//!          │
//!          └── detach_backend()      (if attached, on every exit path)
//! ```
//!
//! [`ImageDirSource`] serves tiles cut from image files in a directory.

mod image_dir;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::tile::{ChannelBuffer, ObjectKey};

pub use image_dir::ImageDirSource;

/// Produces tile data for object keys.
#[async_trait]
pub trait TileSource: Send + Sync + 'static {
    /// Fetch the channel buffers for `key`.
    ///
    /// With `display_whole_image` the tile shows the entire source image
    /// rather than the object's neighbourhood. Returning `None` leaves the
    /// tile as it is; the loader does not retry.
    ///
    /// A returned list must contain exactly one buffer per configured channel.
    async fn fetch(&self, key: &ObjectKey, display_whole_image: bool)
        -> Option<Vec<ChannelBuffer>>;

    /// Start the external imaging backend. Called once on the loader thread
    /// before the first fetch, and only when the backend is enabled.
    fn attach_backend(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Stop the external imaging backend. Called on the loader thread as it
    /// exits, if [`attach_backend`](Self::attach_backend) succeeded.
    fn detach_backend(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Close any connection to the underlying data store.
    async fn close(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

#[async_trait]
impl<T: TileSource + ?Sized> TileSource for std::sync::Arc<T> {
    async fn fetch(
        &self,
        key: &ObjectKey,
        display_whole_image: bool,
    ) -> Option<Vec<ChannelBuffer>> {
        (**self).fetch(key, display_whole_image).await
    }

    fn attach_backend(&self) -> Result<(), SourceError> {
        (**self).attach_backend()
    }

    fn detach_backend(&self) -> Result<(), SourceError> {
        (**self).detach_backend()
    }

    async fn close(&self) -> Result<(), SourceError> {
        (**self).close().await
    }
}
