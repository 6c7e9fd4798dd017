pub mod element;
pub mod paging;
pub mod shape;
pub mod store;

pub use element::Element;
pub use paging::PageFile;
pub use shape::Shape;
pub use store::{ElementStore, PagedStore};

use crate::error::{KernelError, Result};
use crate::quant::QuantizationParams;

/// Shaped element storage with its quantization mapping.
pub struct Tensor<T: Element> {
    shape: Shape,
    params: QuantizationParams,
    store: Box<dyn ElementStore<T>>,
}

impl<T: Element> Tensor<T> {
    /// Wrap any store; its length must equal the shape's element count.
    pub fn with_store(dims: &[usize], params: QuantizationParams, store: Box<dyn ElementStore<T>>) -> Result<Self> {
        let shape = Shape::new(dims)?;
        if store.len() != shape.num_elements() {
            return Err(KernelError::shape("storage length", shape.num_elements(), store.len()));
        }
        Ok(Self { shape, params, store })
    }

    pub fn from_vec(dims: &[usize], data: Vec<T>, params: QuantizationParams) -> Result<Self> {
        Self::with_store(dims, params, Box::new(data))
    }

    pub fn zeros(dims: &[usize], params: QuantizationParams) -> Result<Self> {
        let shape = Shape::new(dims)?;
        let data = vec![T::default(); shape.num_elements()];
        Ok(Self { shape, params, store: Box::new(data) })
    }

    /// Tensor whose elements live in a page file, `capacity` elements cached.
    pub fn paged<P: AsRef<std::path::Path>>(
        dims: &[usize],
        params: QuantizationParams,
        path: P,
        capacity: usize,
    ) -> Result<Self> {
        let shape = Shape::new(dims)?;
        let store = PagedStore::<T>::create(path, shape.num_elements(), capacity)?;
        Ok(Self { shape, params, store: Box::new(store) })
    }

    #[inline]
    pub fn shape(&self) -> &Shape { &self.shape }

    #[inline]
    pub fn quantization_params(&self) -> &QuantizationParams { &self.params }

    #[inline]
    pub fn len(&self) -> usize { self.store.len() }

    pub fn is_empty(&self) -> bool { self.store.is_empty() }

    /// Element at a (possibly shorter than rank) index, e.g. `t.get(&[b, d])`.
    #[inline]
    pub fn get(&self, index: &[usize]) -> Result<T> { self.store.get(self.shape.offset(index)?) }

    #[inline]
    pub fn set(&mut self, index: &[usize], value: T) -> Result<()> {
        let off = self.shape.offset(index)?;
        self.store.set(off, value)
    }

    /// Element at a flat row-major offset.
    #[inline]
    pub fn get_flat(&self, offset: usize) -> Result<T> { self.store.get(offset) }

    pub fn sync(&mut self) -> Result<()> { self.store.sync() }

    /// Read every element in row-major order.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        (0..self.store.len()).map(|i| self.store.get(i)).collect()
    }
}

impl<T: Element> std::fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor").field("shape", &self.shape.dims()).field("params", &self.params).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_length_must_match_shape() {
        let err = Tensor::from_vec(&[2, 3], vec![0i8; 5], QuantizationParams::per_tensor(1.0, 0).unwrap()).unwrap_err();
        assert!(matches!(err, KernelError::ShapeMismatch { expected: 6, found: 5, .. }));
    }

    #[test]
    fn get_and_set_by_index() {
        let mut t = Tensor::<i8>::zeros(&[2, 3], QuantizationParams::per_tensor(0.5, 0).unwrap()).unwrap();
        t.set(&[1, 2], 42).unwrap();
        assert_eq!(t.get(&[1, 2, 0, 0]).unwrap(), 42);
        assert_eq!(t.to_vec().unwrap(), vec![0, 0, 0, 0, 0, 42]);
        assert!(t.get(&[2, 0]).is_err());
    }
}
