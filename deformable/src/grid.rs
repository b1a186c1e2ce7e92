//! # Sampling Grid Construction
//!
//! Builds the static part of a deformable convolution's sampling pattern: for every
//! output location and every kernel tap, the integer position an ordinary stride-1
//! `SAME` convolution would read from.
//!
//! Kernel offsets are centred on tap `floor((k - 1) / 2)` along each axis. For odd `k`
//! this is the middle tap; for even `k` the window extends one step further towards the
//! positive side (a 4-wide kernel covers offsets `-1..=2`). This convention is fixed.
//!
//! Grids depend only on `(kh, kw, H, W)`, so [`GridCache`] memoizes them.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use burn::{prelude::*, tensor::TensorData};

use crate::error::{DeformError, DeformResult};

/// Produces kernel offsets and base sampling grids for one kernel footprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridBuilder {
    kernel_size: [usize; 2],
}

impl GridBuilder {
    /// Creates a builder for a `[kh, kw]` kernel. Both sides must be non-zero.
    pub fn new(kernel_size: [usize; 2]) -> DeformResult<Self> {
        if kernel_size.contains(&0) {
            return Err(DeformError::InvalidConfiguration {
                reason: format!("kernel size must be non-zero, got {kernel_size:?}"),
            });
        }
        Ok(Self { kernel_size })
    }

    /// The `[kh, kw]` footprint.
    pub const fn kernel_size(&self) -> [usize; 2] {
        self.kernel_size
    }

    /// Number of taps in the footprint (`kh * kw`).
    pub const fn taps(&self) -> usize {
        self.kernel_size[0] * self.kernel_size[1]
    }

    /// Index of the tap mapped to offset zero along each axis.
    pub const fn center(&self) -> [usize; 2] {
        [(self.kernel_size[0] - 1) / 2, (self.kernel_size[1] - 1) / 2]
    }

    /// `(row, col)` offset of every tap relative to the output location, row-major.
    pub fn kernel_offsets(&self) -> Vec<[i64; 2]> {
        let [kh, kw] = self.kernel_size;
        let [ch, cw] = self.center();
        (0..kh)
            .flat_map(|a| (0..kw).map(move |b| [a as i64 - ch as i64, b as i64 - cw as i64]))
            .collect()
    }

    /// Kernel offsets repeated at every location of an `[H, W]` map: `[H, W, taps, 2]`.
    pub fn kernel_grid(&self, size: [usize; 2]) -> SamplingGrid {
        let offsets = self.kernel_offsets();
        self.fill(size, |_, _, tap| offsets[tap])
    }

    /// Absolute base coordinates `(i, j) + offset[k]` for an `[H, W]` map: `[H, W, taps, 2]`.
    pub fn base_grid(&self, size: [usize; 2]) -> SamplingGrid {
        let offsets = self.kernel_offsets();
        self.fill(size, |i, j, tap| {
            let [dr, dc] = offsets[tap];
            [i as i64 + dr, j as i64 + dc]
        })
    }

    fn fill(
        &self,
        size: [usize; 2],
        at: impl Fn(usize, usize, usize) -> [i64; 2],
    ) -> SamplingGrid {
        let [height, width] = size;
        let taps = self.taps();
        let mut values = Vec::with_capacity(height * width * taps * 2);
        for i in 0..height {
            for j in 0..width {
                for tap in 0..taps {
                    values.extend_from_slice(&at(i, j, tap));
                }
            }
        }
        SamplingGrid {
            shape: [height, width, taps, 2],
            values,
        }
    }
}

/// Host-side integer grid of shape `[H, W, taps, 2]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplingGrid {
    shape: [usize; 4],
    values: Vec<i64>,
}

impl SamplingGrid {
    /// `[H, W, taps, 2]`.
    pub const fn shape(&self) -> [usize; 4] {
        self.shape
    }

    /// Row-major values.
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// The `(row, col)` pair stored for one location and tap, if in range.
    pub fn get(&self, row: usize, col: usize, tap: usize) -> Option<[i64; 2]> {
        let [height, width, taps, _] = self.shape;
        if row >= height || col >= width || tap >= taps {
            return None;
        }
        let base = ((row * width + col) * taps + tap) * 2;
        Some([self.values[base], self.values[base + 1]])
    }

    /// Uploads the grid as a float tensor so it can be added to predicted offsets.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        let values: Vec<f32> = self.values.iter().map(|&v| v as f32).collect();
        Tensor::from_data(TensorData::new(values, self.shape), device)
    }
}

/// Cache key: kernel footprint plus feature-map size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridKey {
    pub kernel_size: [usize; 2],
    pub size: [usize; 2],
}

/// Memoizes base grids by [`GridKey`]. Clones share the same storage.
///
/// Entries are never evicted: each distinct `(kh, kw, H, W)` keeps an `H * W * kh * kw * 2`
/// grid alive until [`clear`](Self::clear) is called.
#[derive(Clone, Debug, Default)]
pub struct GridCache {
    grids: Arc<Mutex<HashMap<GridKey, Arc<SamplingGrid>>>>,
}

impl GridCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the base grid for `kernel_size` over an `[H, W]` map, building it on a miss.
    pub fn base_grid(
        &self,
        kernel_size: [usize; 2],
        size: [usize; 2],
    ) -> DeformResult<Arc<SamplingGrid>> {
        let key = GridKey { kernel_size, size };
        let mut grids = self.grids.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(grid) = grids.get(&key) {
            return Ok(Arc::clone(grid));
        }

        tracing::debug!(?kernel_size, ?size, "building base sampling grid");
        let grid = Arc::new(GridBuilder::new(kernel_size)?.base_grid(size));
        grids.insert(key, Arc::clone(&grid));
        Ok(grid)
    }

    /// Number of cached grids.
    pub fn len(&self) -> usize {
        self.grids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached grid. Grids already handed out stay valid.
    pub fn clear(&self) {
        self.grids.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
