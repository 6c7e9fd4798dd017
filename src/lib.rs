// Quantized fully-connected inference: int8 kernels, float reference, paged tensors
pub mod error;
pub mod kernel;
pub mod layer;
pub mod parity;
pub mod quant;
pub mod tensor;

// Re-exports kept minimal for callers driving a single layer
pub use error::{KernelError, Result};
pub use kernel::{fully_connected, fully_connected_reference, fully_connected_with_bias};
pub use quant::{OutputStage, QuantizationParams};
pub use tensor::Tensor;
