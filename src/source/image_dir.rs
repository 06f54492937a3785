//! Tile source backed by image files in a local directory.
//!
//! The `source` of an [`ObjectKey`] is a path relative to the directory. Tile
//! `(x, y)` is the `tile_size x tile_size` square starting at pixel
//! `(x * tile_size, y * tile_size)`; tiles on the right and bottom edges are
//! zero-padded. With `display_whole_image`, the whole image is scaled down to
//! one tile instead.
//!
//! Channel layouts map to image color types:
//!
//! | channels | layout           |
//! |----------|------------------|
//! | 1        | luma             |
//! | 2        | luma + alpha     |
//! | 3        | RGB              |
//! | 4        | RGBA             |

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Pixel};
use tracing::{debug, warn};

use crate::config::LoaderConfig;
use crate::error::SourceError;
use crate::tile::{ChannelBuffer, ObjectKey};

use super::TileSource;

/// Serves tiles cut from images stored under a root directory.
#[derive(Debug, Clone)]
pub struct ImageDirSource {
    root: PathBuf,
    tile_size: u32,
    channels: usize,
}

impl ImageDirSource {
    /// Create a source producing `channels` channels of
    /// `tile_size x tile_size` tiles from images under `root`.
    pub fn new(root: impl Into<PathBuf>, tile_size: u32, channels: usize) -> Self {
        Self {
            root: root.into(),
            tile_size,
            channels,
        }
    }

    /// Create a source matching a loader configuration.
    pub fn from_config(root: impl Into<PathBuf>, config: &LoaderConfig) -> Self {
        Self::new(root, config.tile_size, config.channel_count())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the tile for `key`, reporting why it could not be produced.
    pub async fn load(
        &self,
        key: &ObjectKey,
        display_whole_image: bool,
    ) -> Result<Vec<ChannelBuffer>, SourceError> {
        let path = self.resolve(&key.source)?;

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound(key.source.to_string())
            } else {
                SourceError::Io(format!("{}: {}", path.display(), e))
            }
        })?;

        let key = key.clone();
        let tile_size = self.tile_size;
        let channels = self.channels;

        tokio::task::spawn_blocking(move || {
            let image = image::load_from_memory(&bytes).map_err(|e| SourceError::Decode {
                source_id: key.source.to_string(),
                message: e.to_string(),
            })?;

            let region = if display_whole_image {
                image.resize_exact(tile_size, tile_size, FilterType::Triangle)
            } else {
                cut_tile(&image, &key, tile_size)?
            };

            split_image(&region, channels, tile_size)
        })
        .await
        .map_err(|e| SourceError::Io(format!("decode task failed: {}", e)))?
    }

    /// Map a key's source to a file under the root, refusing paths that
    /// would escape it.
    fn resolve(&self, source: &str) -> Result<PathBuf, SourceError> {
        let relative = Path::new(source);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(SourceError::NotFound(source.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl TileSource for ImageDirSource {
    async fn fetch(
        &self,
        key: &ObjectKey,
        display_whole_image: bool,
    ) -> Option<Vec<ChannelBuffer>> {
        match self.load(key, display_whole_image).await {
            Ok(channels) => {
                debug!(key = %key, "Read tile from image directory");
                Some(channels)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read tile");
                None
            }
        }
    }
}

/// Crop the tile at grid position `(key.x, key.y)`.
fn cut_tile(
    image: &DynamicImage,
    key: &ObjectKey,
    tile_size: u32,
) -> Result<DynamicImage, SourceError> {
    let (width, height) = (image.width(), image.height());
    let out_of_bounds = || SourceError::TileOutOfBounds {
        source_id: key.source.to_string(),
        x: key.x,
        y: key.y,
        width,
        height,
    };

    let left = key.x.checked_mul(tile_size).ok_or_else(out_of_bounds)?;
    let top = key.y.checked_mul(tile_size).ok_or_else(out_of_bounds)?;
    if left >= width || top >= height {
        return Err(out_of_bounds());
    }

    Ok(image.crop_imm(
        left,
        top,
        tile_size.min(width - left),
        tile_size.min(height - top),
    ))
}

/// Split `image` into `channels` zero-padded `tile_size x tile_size` buffers.
fn split_image(
    image: &DynamicImage,
    channels: usize,
    tile_size: u32,
) -> Result<Vec<ChannelBuffer>, SourceError> {
    match channels {
        1 => Ok(deinterleave(&image.to_luma32f(), tile_size)),
        2 => Ok(deinterleave(&image.to_luma_alpha32f(), tile_size)),
        3 => Ok(deinterleave(&image.to_rgb32f(), tile_size)),
        4 => Ok(deinterleave(&image.to_rgba32f(), tile_size)),
        n => Err(SourceError::UnsupportedChannels(n)),
    }
}

fn deinterleave<P>(image: &ImageBuffer<P, Vec<f32>>, tile_size: u32) -> Vec<ChannelBuffer>
where
    P: Pixel<Subpixel = f32>,
{
    let mut buffers: Vec<ChannelBuffer> = (0..P::CHANNEL_COUNT)
        .map(|_| ChannelBuffer::filled(tile_size, tile_size, 0.0))
        .collect();

    for (x, y, pixel) in image.enumerate_pixels() {
        for (buffer, &value) in buffers.iter_mut().zip(pixel.channels()) {
            buffer.set(x, y, value);
        }
    }

    buffers
}
