//! Configuration management for the tile loader.
//!
//! Two layers:
//! - [`LoaderConfig`]: what a [`TileCollection`](crate::TileCollection) needs
//!   (tile size, channel layout, imaging backend switch)
//! - [`Config`]: the CLI, parsed by clap from arguments and `TILE_*`
//!   environment variables, and converted into a [`LoaderConfig`]
//!
//! # Example
//!
//! ```ignore
//! use tile_loader::config::Config;
//!
//! let config = Config::parse();
//! config.validate()?;
//! let loader_config = config.loader_config();
//! ```
//!
//! # Environment Variables
//!
//! - `TILE_IMAGE_DIR` - Directory holding the source images (required)
//! - `TILE_SIZE` - Tile side length in pixels (default: 50)
//! - `TILE_CHANNELS_PER_IMAGE` - Comma-separated channel counts (default: 1)
//! - `TILE_IMAGING_BACKEND` - Start the external imaging backend (default: false)
//! - `TILE_PRIORITY` - Priority tier for requested tiles (default: 1)
//! - `TILE_WAIT_SECS` - How long to wait for tiles before giving up (default: 30)

use std::path::PathBuf;

use clap::Parser;

use crate::tile::DEFAULT_PRIORITY;

// =============================================================================
// Default Values
// =============================================================================

/// Default tile side length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 50;

/// Largest accepted tile side length.
pub const MAX_TILE_SIZE: u32 = 4096;

/// Default time the CLI waits for outstanding tiles, in seconds.
pub const DEFAULT_WAIT_SECS: u64 = 30;

// =============================================================================
// Loader Configuration
// =============================================================================

/// Settings read once when a tile collection is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Tile side length in pixels
    pub tile_size: u32,

    /// Channel count of each image making up a tile; tiles carry their sum
    pub channels_per_image: Vec<u32>,

    /// Start the external imaging backend on the loader thread
    pub use_imaging_backend: bool,
}

impl LoaderConfig {
    /// Create a configuration with the imaging backend disabled.
    pub fn new(tile_size: u32, channels_per_image: Vec<u32>) -> Self {
        Self {
            tile_size,
            channels_per_image,
            use_imaging_backend: false,
        }
    }

    /// Enable or disable the external imaging backend.
    pub fn with_imaging_backend(mut self, enabled: bool) -> Self {
        self.use_imaging_backend = enabled;
        self
    }

    /// Total number of channels per tile.
    pub fn channel_count(&self) -> usize {
        self.channels_per_image.iter().map(|&c| c as usize).sum()
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_size == 0 || self.tile_size > MAX_TILE_SIZE {
            return Err(format!(
                "tile_size must be between 1 and {}, got {}",
                MAX_TILE_SIZE, self.tile_size
            ));
        }

        if self.channels_per_image.is_empty() {
            return Err("channels_per_image must list at least one image".to_string());
        }

        if self.channels_per_image.contains(&0) {
            return Err("channels_per_image entries must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_SIZE, vec![1])
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tile Loader - load tiles from an image directory in priority order.
///
/// Requests the given tiles, prints one JSON line per tile as it becomes
/// ready, then shuts the loader down.
#[derive(Parser, Debug, Clone)]
#[command(name = "tile-loader")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Source Configuration
    // =========================================================================
    /// Directory holding the source images.
    #[arg(long, env = "TILE_IMAGE_DIR")]
    pub image_dir: PathBuf,

    // =========================================================================
    // Tile Configuration
    // =========================================================================
    /// Tile side length in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "TILE_SIZE")]
    pub tile_size: u32,

    /// Channel count of each image (comma-separated, e.g. 1,1,1).
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "1",
        env = "TILE_CHANNELS_PER_IMAGE"
    )]
    pub channels_per_image: Vec<u32>,

    /// Start the external imaging backend on the loader thread.
    #[arg(long, default_value_t = false, env = "TILE_IMAGING_BACKEND")]
    pub imaging_backend: bool,

    // =========================================================================
    // Request Configuration
    // =========================================================================
    /// Priority tier for the requested tiles (lower loads sooner).
    #[arg(long, default_value_t = DEFAULT_PRIORITY, env = "TILE_PRIORITY")]
    pub priority: i32,

    /// Show the whole source image in each tile instead of a cut-out.
    #[arg(long, default_value_t = false)]
    pub whole_image: bool,

    /// Seconds to wait for outstanding tiles before giving up.
    #[arg(long, default_value_t = DEFAULT_WAIT_SECS, env = "TILE_WAIT_SECS")]
    pub wait_secs: u64,

    /// Tiles to load, as <source>:<x>:<y>.
    #[arg(required = true)]
    pub keys: Vec<String>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.loader_config().validate()?;

        if self.wait_secs == 0 {
            return Err("wait_secs must be greater than 0".to_string());
        }

        if self.keys.is_empty() {
            return Err("at least one tile key is required".to_string());
        }

        Ok(())
    }

    /// The loader settings carried by this configuration.
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig::new(self.tile_size, self.channels_per_image.clone())
            .with_imaging_backend(self.imaging_backend)
    }
}

// =============================================================================
// Tests
// =============================================================================
