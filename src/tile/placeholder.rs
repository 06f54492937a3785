//! Placeholder tiles shown while real tile data is pending.
//!
//! # Variants
//!
//! - **Icon** (`tile_size > 13`): a 12x12 hourglass is drawn in the middle of
//!   the tile over a flat gray background. The top-left sample is forced to
//!   `0.0` so a renderer can tell "still loading" apart from real data whose
//!   darkest pixel happens to match the icon. All channels share one buffer.
//! - **Flat** (`tile_size <= 13`): the tile is too small for the icon, so each
//!   channel gets its own uniformly gray buffer.
//!
//! The template is built once when the collection is constructed and never
//! mutated afterwards. Each new tile entry receives a fresh *list* of `Arc`s
//! pointing at the template buffers; the loader replaces list items rather
//! than writing into the shared buffers.

use std::sync::Arc;

use super::buffer::ChannelBuffer;

/// Side length of the loading icon.
pub const ICON_SIZE: u32 = 12;

/// Background intensity of placeholder tiles.
pub const PLACEHOLDER_FILL: f32 = 0.1;

/// Tiles strictly larger than this get the icon variant.
pub const ICON_TILE_THRESHOLD: u32 = 13;

/// Hourglass drawn on large placeholder tiles.
#[rustfmt::skip]
const LOADING_ICON: [[f32; ICON_SIZE as usize]; ICON_SIZE as usize] = [
    [0.0, 0.0, 0.4, 0.9, 1.0, 1.0, 1.0, 1.0, 0.9, 0.4, 0.0, 0.0],
    [0.0, 0.0, 0.6, 1.0, 0.3, 0.4, 0.4, 0.3, 1.0, 0.6, 0.0, 0.0],
    [0.0, 0.0, 0.6, 0.8, 0.0, 0.0, 0.0, 0.0, 0.8, 0.6, 0.0, 0.0],
    [0.0, 0.0, 0.5, 1.0, 0.2, 0.0, 0.0, 0.2, 1.0, 0.5, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.8, 0.9, 0.0, 0.0, 0.9, 0.8, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 0.7, 0.9, 0.9, 0.7, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 0.7, 0.9, 0.9, 0.7, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.8, 0.9, 0.0, 0.0, 0.9, 0.8, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.5, 1.0, 0.2, 0.0, 0.0, 0.2, 1.0, 0.5, 0.0, 0.0],
    [0.0, 0.0, 0.6, 0.8, 0.0, 0.0, 0.0, 0.0, 0.8, 0.6, 0.0, 0.0],
    [0.0, 0.0, 0.6, 1.0, 0.3, 0.4, 0.4, 0.3, 1.0, 0.6, 0.0, 0.0],
    [0.0, 0.0, 0.4, 0.9, 1.0, 1.0, 1.0, 1.0, 0.9, 0.4, 0.0, 0.0],
];

/// Precomputed placeholder channels for one tile configuration.
#[derive(Debug, Clone)]
pub struct Placeholder {
    tile_size: u32,
    channels: Vec<Arc<ChannelBuffer>>,
}

impl Placeholder {
    /// Build the placeholder template for `channel_count` channels of
    /// `tile_size x tile_size` samples.
    pub fn new(tile_size: u32, channel_count: usize) -> Self {
        let channels = if tile_size > ICON_TILE_THRESHOLD {
            let icon = Arc::new(draw_loading_icon(tile_size));
            vec![icon; channel_count]
        } else {
            (0..channel_count)
                .map(|_| Arc::new(ChannelBuffer::filled(tile_size, tile_size, PLACEHOLDER_FILL)))
                .collect()
        };

        Self {
            tile_size,
            channels,
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Whether this template uses the loading icon.
    pub fn has_icon(&self) -> bool {
        self.tile_size > ICON_TILE_THRESHOLD
    }

    /// The template buffers.
    pub fn template(&self) -> &[Arc<ChannelBuffer>] {
        &self.channels
    }

    /// A fresh channel list for a new tile entry.
    ///
    /// The list is new; the buffers are shared with the template.
    pub fn instantiate(&self) -> Vec<Arc<ChannelBuffer>> {
        self.channels.clone()
    }
}

/// Draw the hourglass centred in a gray `tile_size x tile_size` buffer.
fn draw_loading_icon(tile_size: u32) -> ChannelBuffer {
    let mut buf = ChannelBuffer::filled(tile_size, tile_size, 0.0);
    let offset = tile_size / 2 - ICON_SIZE / 2;

    for (row, values) in LOADING_ICON.iter().enumerate() {
        for (col, &value) in values.iter().enumerate() {
            buf.set(offset + col as u32, offset + row as u32, value);
        }
    }

    for sample in buf.as_mut_slice() {
        if *sample == 0.0 {
            *sample = PLACEHOLDER_FILL;
        }
    }

    // Unloaded marker
    buf.set(0, 0, 0.0);
    buf
}
