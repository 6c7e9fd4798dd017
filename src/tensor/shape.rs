use crate::error::{KernelError, Result};

/// Ordered dimension sizes of a tensor; row-major, last axis fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: &[usize]) -> Result<Self> {
        if dims.is_empty() {
            return Err(KernelError::shape("tensor rank", 1, 0));
        }
        if let Some(&zero) = dims.iter().find(|&&d| d == 0) {
            return Err(KernelError::shape("dimension size", 1, zero));
        }
        Ok(Self { dims: dims.to_vec() })
    }

    #[inline]
    pub fn num_dims(&self) -> usize { self.dims.len() }

    #[inline]
    pub fn dims(&self) -> &[usize] { &self.dims }

    pub fn num_elements(&self) -> usize { self.dims.iter().product() }

    /// Dimension `axis`, or 1 past the tensor's rank.
    #[inline]
    pub fn dim(&self, axis: usize) -> usize { self.dims.get(axis).copied().unwrap_or(1) }

    /// Row-major offset of `index`. Indices shorter than the rank are padded
    /// with zeros on the right, so `t.get(&[b, o])` addresses `t[b, o, 0, 0]`.
    /// Extra trailing indices must be zero.
    pub fn offset(&self, index: &[usize]) -> Result<usize> {
        let oob = || KernelError::IndexOutOfBounds { index: index.to_vec(), shape: self.dims.clone() };
        if index.len() > self.dims.len() && index[self.dims.len()..].iter().any(|&i| i != 0) {
            return Err(oob());
        }
        let mut off = 0usize;
        for (axis, &d) in self.dims.iter().enumerate() {
            let i = index.get(axis).copied().unwrap_or(0);
            if i >= d { return Err(oob()); }
            off = off * d + i;
        }
        Ok(off)
    }
}

impl std::ops::Index<usize> for Shape {
    type Output = usize;
    fn index(&self, axis: usize) -> &usize { &self.dims[axis] }
}
