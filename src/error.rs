use std::path::PathBuf;

use thiserror::Error;

use crate::types::TensorType;

#[derive(Error, Debug)]
pub enum GgufError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("invalid magic number: expected 0x46554747, got 0x{0:08X}")]
    InvalidMagic(u32),

    #[error("unsupported GGUF version: {0}")]
    UnsupportedVersion(u32),

    #[error("unknown metadata value type: {0}")]
    UnknownMetadataType(u32),

    #[error("unknown tensor type: {0}")]
    UnknownTensorType(u32),

    #[error("no dequantization kernel for {0}")]
    UnsupportedQuant(TensorType),

    #[error("element count {n_elements} is not a multiple of the {dtype} block size")]
    InvalidSize { dtype: TensorType, n_elements: u64 },

    #[error("tensor not found: {0}")]
    TensorNotFound(String),

    #[error("truncated input reading {context}: {need} bytes required")]
    Truncated { context: &'static str, need: usize },

    #[error("missing metadata key: {0}")]
    MissingKey(String),

    #[error("GGUF parse error: {0}")]
    Parse(String),
}
