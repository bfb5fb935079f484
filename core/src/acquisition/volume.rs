use crate::math::{Float3, Size3};
use crate::prelude::{SaftError, SaftResult};
use ndarray::{s, Array3};
use std::ops::{Index, IndexMut};

/// Geometry of a regular voxel grid: voxel counts, pitch and world centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub dims: Size3,
    pub res: Float3,
    pub center: Float3,
}

impl Grid {
    pub fn new(dims: Size3) -> Self {
        Self {
            dims,
            res: Float3::splat(1.0),
            center: Float3::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.dims.product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Side length along `axis`.
    pub fn length(&self, axis: usize) -> f32 {
        self.res[axis] * self.dims[axis] as f32
    }

    /// Lower edge of the first voxel along `axis`.
    pub fn min_pos(&self, axis: usize) -> f32 {
        self.center[axis] - self.length(axis) * 0.5
    }

    /// Upper edge of the last voxel along `axis`.
    pub fn max_pos(&self, axis: usize) -> f32 {
        self.center[axis] + self.length(axis) * 0.5
    }

    /// World coordinate of the centre of voxel `idx` along `axis`.
    pub fn position_along(&self, axis: usize, idx: usize) -> f32 {
        self.min_pos(axis) + self.res[axis] * (idx as f32 + 0.5)
    }

    pub fn position(&self, idx: Size3) -> Float3 {
        Float3::new([
            self.position_along(0, idx[0]),
            self.position_along(1, idx[1]),
            self.position_along(2, idx[2]),
        ])
    }

    /// Voxel whose centre is closest to `pos`, clamped into the grid.
    pub fn nearest_index(&self, axis: usize, pos: f32) -> usize {
        let dim = self.dims[axis];
        if dim == 0 {
            return 0;
        }
        let fractional = ((pos - self.min_pos(axis)) / self.res[axis] - 0.5).round();
        if fractional <= 0.0 {
            0
        } else {
            (fractional as usize).min(dim - 1)
        }
    }

    /// Splits a flattened index `x + nx * (y + ny * z)` into its components.
    pub fn unravel(&self, flat: usize) -> Size3 {
        let nx = self.dims[0];
        let ny = self.dims[1];
        Size3::new([flat % nx, (flat / nx) % ny, flat / (nx * ny)])
    }

    pub fn flat_index(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.dims[0] * (y + self.dims[1] * z)
    }
}

/// Dense voxel volume. Axis 0 varies fastest in memory; the backing array is
/// stored as `[z, y, x]` in standard layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    grid: Grid,
    data: Array3<f32>,
}

impl Volume {
    pub fn new(dims: Size3) -> Self {
        Self::with_grid(Grid::new(dims))
    }

    pub fn with_grid(grid: Grid) -> Self {
        let data = Array3::zeros((grid.dims[2], grid.dims[1], grid.dims[0]));
        Self { grid, data }
    }

    /// Builds a volume from samples already in flattened order.
    pub fn from_vec(grid: Grid, values: Vec<f32>) -> SaftResult<Self> {
        let expected = grid.len();
        let data = Array3::from_shape_vec((grid.dims[2], grid.dims[1], grid.dims[0]), values)
            .map_err(|err| {
                SaftError::InvalidArgument(format!(
                    "expected {} voxels for {:?}: {}",
                    expected,
                    grid.dims.as_array(),
                    err
                ))
            })?;
        Ok(Self { grid, data })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn dims(&self) -> Size3 {
        self.grid.dims
    }

    pub fn dim(&self, axis: usize) -> usize {
        self.grid.dims[axis]
    }

    pub fn res(&self) -> Float3 {
        self.grid.res
    }

    pub fn center(&self) -> Float3 {
        self.grid.center
    }

    pub fn set_res(&mut self, res: Float3) -> SaftResult<()> {
        if res.iter().any(|&r| !r.is_finite() || r <= 0.0) {
            return Err(SaftError::InvalidArgument(format!(
                "voxel pitch must be positive, got {:?}",
                res.as_array()
            )));
        }
        self.grid.res = res;
        Ok(())
    }

    pub fn set_center(&mut self, center: Float3) {
        self.grid.center = center;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<f32> {
        self.data.get([z, y, x]).copied()
    }

    /// Assigns `value` to every voxel.
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// Voxels in flattened order.
    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        self.data.iter()
    }

    pub fn as_slice(&self) -> SaftResult<&[f32]> {
        self.data
            .as_slice()
            .ok_or_else(|| SaftError::Internal("volume storage is not contiguous".into()))
    }

    pub fn as_slice_mut(&mut self) -> SaftResult<&mut [f32]> {
        self.data
            .as_slice_mut()
            .ok_or_else(|| SaftError::Internal("volume storage is not contiguous".into()))
    }

    pub fn length(&self, axis: usize) -> f32 {
        self.grid.length(axis)
    }

    pub fn min_pos(&self, axis: usize) -> f32 {
        self.grid.min_pos(axis)
    }

    pub fn max_pos(&self, axis: usize) -> f32 {
        self.grid.max_pos(axis)
    }

    pub fn position(&self, idx: Size3) -> Float3 {
        self.grid.position(idx)
    }

    pub fn min_value(&self) -> Option<f32> {
        self.data.iter().copied().reduce(f32::min)
    }

    pub fn max_value(&self) -> Option<f32> {
        self.data.iter().copied().reduce(f32::max)
    }

    /// Index and value of the largest voxel.
    pub fn argmax(&self) -> Option<(Size3, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (flat, &value) in self.data.iter().enumerate() {
            if best.map_or(true, |(_, current)| value > current) {
                best = Some((flat, value));
            }
        }
        best.map(|(flat, value)| (self.grid.unravel(flat), value))
    }

    /// Copies the inclusive index box `[lo, hi]` into a new volume whose first
    /// voxel sits where `lo` sat in this one.
    pub fn sub_volume(&self, lo: Size3, hi: Size3) -> SaftResult<Volume> {
        for axis in 0..3 {
            if hi[axis] < lo[axis] || hi[axis] >= self.grid.dims[axis] {
                return Err(SaftError::InvalidRange(format!(
                    "index range {}..={} invalid for axis {} of length {}",
                    lo[axis], hi[axis], axis, self.grid.dims[axis]
                )));
            }
        }

        let data = self
            .data
            .slice(s![lo[2]..=hi[2], lo[1]..=hi[1], lo[0]..=hi[0]])
            .to_owned();
        let dims = Size3::new([
            hi[0] - lo[0] + 1,
            hi[1] - lo[1] + 1,
            hi[2] - lo[2] + 1,
        ]);
        let mut center = Float3::default();
        for axis in 0..3 {
            let first = self.grid.position_along(axis, lo[axis]);
            center[axis] = first + self.grid.res[axis] * (dims[axis] as f32 - 1.0) * 0.5;
        }

        Ok(Volume {
            grid: Grid {
                dims,
                res: self.grid.res,
                center,
            },
            data,
        })
    }
}

impl Index<(usize, usize, usize)> for Volume {
    type Output = f32;

    fn index(&self, (x, y, z): (usize, usize, usize)) -> &f32 {
        &self.data[[z, y, x]]
    }
}

impl IndexMut<(usize, usize, usize)> for Volume {
    fn index_mut(&mut self, (x, y, z): (usize, usize, usize)) -> &mut f32 {
        &mut self.data[[z, y, x]]
    }
}
