//! Per-channel tile buffers.

use crate::error::ShapeError;

/// A single channel of tile data: a row-major 2D array of intensities.
///
/// Intensities are normalized to `[0, 1]` by the bundled sources, but the
/// loader itself never inspects values.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBuffer {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl ChannelBuffer {
    /// Create a buffer from row-major samples.
    ///
    /// Fails if `data.len() != width * height`.
    pub fn from_vec(width: u32, height: u32, data: Vec<f32>) -> Result<Self, ShapeError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(ShapeError {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Create a buffer with every sample set to `value`.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Sample at column `x`, row `y`, or `None` outside the buffer.
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Set the sample at column `x`, row `y`. Out-of-range writes are ignored.
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = y as usize * self.width as usize + x as usize;
        self.data[idx] = value;
    }

    /// Row-major samples.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable row-major samples.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Mean intensity, `0.0` for an empty buffer.
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }
}
