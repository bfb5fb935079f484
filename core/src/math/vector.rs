use std::ops::{Add, Div, Index, IndexMut, Mul, Sub};

/// Fixed-size tuple of `N` scalars used for positions, resolutions and sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedVector<T, const N: usize> {
    data: [T; N],
}

pub type Float3 = FixedVector<f32, 3>;
/// RGBA colours and homogeneous coordinates.
pub type Float4 = FixedVector<f32, 4>;
pub type Size3 = FixedVector<usize, 3>;

impl<T: Copy, const N: usize> FixedVector<T, N> {
    pub const fn new(data: [T; N]) -> Self {
        Self { data }
    }

    /// Sets every component to `value`.
    pub fn splat(value: T) -> Self {
        Self { data: [value; N] }
    }

    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    pub fn as_array(&self) -> &[T; N] {
        &self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    fn zip_with(self, rhs: Self, op: impl Fn(T, T) -> T) -> Self {
        let mut data = self.data;
        for (lhs, rhs) in data.iter_mut().zip(rhs.data) {
            *lhs = op(*lhs, rhs);
        }
        Self { data }
    }

    fn map(self, op: impl Fn(T) -> T) -> Self {
        let mut data = self.data;
        for value in &mut data {
            *value = op(*value);
        }
        Self { data }
    }
}

impl<T: Copy + Default, const N: usize> Default for FixedVector<T, N> {
    fn default() -> Self {
        Self::splat(T::default())
    }
}

impl<T, const N: usize> From<[T; N]> for FixedVector<T, N> {
    fn from(data: [T; N]) -> Self {
        Self { data }
    }
}

impl<T, const N: usize> Index<usize> for FixedVector<T, N> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.data[index]
    }
}

impl<T, const N: usize> IndexMut<usize> for FixedVector<T, N> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.data[index]
    }
}

impl<T: Copy + Add<Output = T>, const N: usize> Add for FixedVector<T, N> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.zip_with(rhs, |a, b| a + b)
    }
}

impl<T: Copy + Sub<Output = T>, const N: usize> Sub for FixedVector<T, N> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.zip_with(rhs, |a, b| a - b)
    }
}

impl<T: Copy + Mul<Output = T>, const N: usize> Mul<T> for FixedVector<T, N> {
    type Output = Self;

    fn mul(self, rhs: T) -> Self {
        self.map(|a| a * rhs)
    }
}

impl<T: Copy + Div<Output = T>, const N: usize> Div<T> for FixedVector<T, N> {
    type Output = Self;

    fn div(self, rhs: T) -> Self {
        self.map(|a| a / rhs)
    }
}

impl<const N: usize> FixedVector<f32, N> {
    pub fn dot(&self, other: &Self) -> f32 {
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Euclidean length.
    pub fn norm(&self) -> f32 {
        self.dot(self).sqrt()
    }
}

impl<const N: usize> FixedVector<usize, N> {
    /// Product of all components, i.e. the element count of a grid with these dims.
    pub fn product(&self) -> usize {
        self.data.iter().product()
    }
}
