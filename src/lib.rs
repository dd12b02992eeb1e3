pub mod error;
pub mod metadata;
pub mod model;
pub mod quant;
pub mod reader;
pub mod tensor;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::GgufError;
pub use metadata::{Metadata, MetadataValue, ValueType};
pub use model::{Header, LoadOptions, Model, DEFAULT_ALIGNMENT, GGUF_MAGIC};
pub use tensor::{Tensor, TensorData, TensorDirectory, TensorInfo};
pub use types::{ElementType, TensorType};
