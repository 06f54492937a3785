use thiserror::Error;

/// A channel buffer whose sample count does not match its dimensions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Buffer shape mismatch: {width}x{height} needs {expected} samples, got {actual}")]
pub struct ShapeError {
    pub width: u32,
    pub height: u32,
    pub expected: usize,
    pub actual: usize,
}

/// Errors raised by tile sources while producing tile data.
///
/// These never reach callers of the tile collection: a source maps them to an
/// absent tile and the placeholder stays in place.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Source image does not exist
    #[error("Source image not found: {0}")]
    NotFound(String),

    /// Filesystem or connection failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Image bytes could not be decoded
    #[error("Decode error for {source_id}: {message}")]
    Decode { source_id: String, message: String },

    /// Requested channel layout cannot be produced from the image
    #[error("Unsupported channel count: {0} (expected 1 to 4)")]
    UnsupportedChannels(usize),

    /// Requested tile lies outside the source image
    #[error("Tile ({x}, {y}) out of bounds for {source_id} ({width}x{height})")]
    TileOutOfBounds {
        source_id: String,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    /// Produced channel buffer has an inconsistent shape
    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    /// External imaging backend failed to start or stop
    #[error("Imaging backend error: {0}")]
    Backend(String),
}

/// Errors from starting or stopping the loader worker
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The loader configuration was rejected
    #[error("Invalid loader configuration: {0}")]
    InvalidConfig(String),

    /// The worker's async runtime could not be built
    #[error("Failed to build loader runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The worker thread could not be spawned
    #[error("Failed to spawn loader thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The worker thread panicked, usually on a channel count mismatch
    #[error("Loader thread panicked: {0}")]
    WorkerPanicked(String),
}
