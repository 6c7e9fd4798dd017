use std::io;
use thiserror::Error;

/// Failures surfaced by tensors, paging and the dense kernels.
///
/// A kernel call that returns an error leaves the output tensor's contents
/// undefined; callers must not read it.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("shape mismatch: {what} (expected {expected}, found {found})")]
    ShapeMismatch { what: &'static str, expected: usize, found: usize },

    #[error("index {index:?} out of bounds for shape {shape:?}")]
    IndexOutOfBounds { index: Vec<usize>, shape: Vec<usize> },

    #[error("invalid quantization params: {0}")]
    InvalidQuantization(String),

    #[error("invalid output stage: {0}")]
    InvalidOutputStage(String),

    #[error("buffer too small: need {needed} elements, got {got}")]
    BufferTooSmall { needed: usize, got: usize },

    #[error("short {op} on page file: expected {expected} bytes, got {got}")]
    ShortTransfer { op: &'static str, expected: usize, got: usize },

    #[error("page file i/o: {0}")]
    Storage(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, KernelError>;

impl KernelError {
    pub(crate) fn shape(what: &'static str, expected: usize, found: usize) -> Self {
        KernelError::ShapeMismatch { what, expected, found }
    }
}
