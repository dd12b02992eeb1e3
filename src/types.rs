// GGML tensor type registry: ids, block geometry, exact byte sizing.

use serde::Serialize;

use crate::error::GgufError;

/// Number of elements per K-quant super-block.
pub const QK_K: usize = 256;

/// Tensor data types that can appear in a GGUF file.
///
/// The discriminant values match the GGML type IDs from the GGUF spec.
/// Every listed id parses; only a subset has a dequantization kernel
/// (see `quant`), the rest fail later with `UnsupportedQuant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum TensorType {
    F32 = 0,
    F16 = 1,
    Q4_0 = 2,
    Q4_1 = 3,
    // Q4_2 = 4 (removed)
    // Q4_3 = 5 (removed)
    Q5_0 = 6,
    Q5_1 = 7,
    Q8_0 = 8,
    Q8_1 = 9,
    Q2K = 10,
    Q3K = 11,
    Q4K = 12,
    Q5K = 13,
    Q6K = 14,
    Q8K = 15,
    IQ2XXS = 16,
    IQ2XS = 17,
    IQ3XXS = 18,
    IQ1S = 19,
    IQ4NL = 20,
    IQ3S = 21,
    IQ2S = 22,
    IQ4XS = 23,
    I8 = 24,
    I16 = 25,
    I32 = 26,
    I64 = 27,
    F64 = 28,
    IQ1M = 29,
    BF16 = 30,
}

/// Element type of an unquantized tensor.
///
/// Tags without a native element type are block-quantized and must go
/// through a dequantization kernel to become numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    F32,
    F16,
    BF16,
    F64,
    I8,
    I16,
    I32,
    I64,
}

impl TensorType {
    /// Convert a raw u32 from the GGUF file into a `TensorType`.
    pub fn from_u32(v: u32) -> Result<Self, GgufError> {
        match v {
            0 => Ok(Self::F32),
            1 => Ok(Self::F16),
            2 => Ok(Self::Q4_0),
            3 => Ok(Self::Q4_1),
            6 => Ok(Self::Q5_0),
            7 => Ok(Self::Q5_1),
            8 => Ok(Self::Q8_0),
            9 => Ok(Self::Q8_1),
            10 => Ok(Self::Q2K),
            11 => Ok(Self::Q3K),
            12 => Ok(Self::Q4K),
            13 => Ok(Self::Q5K),
            14 => Ok(Self::Q6K),
            15 => Ok(Self::Q8K),
            16 => Ok(Self::IQ2XXS),
            17 => Ok(Self::IQ2XS),
            18 => Ok(Self::IQ3XXS),
            19 => Ok(Self::IQ1S),
            20 => Ok(Self::IQ4NL),
            21 => Ok(Self::IQ3S),
            22 => Ok(Self::IQ2S),
            23 => Ok(Self::IQ4XS),
            24 => Ok(Self::I8),
            25 => Ok(Self::I16),
            26 => Ok(Self::I32),
            27 => Ok(Self::I64),
            28 => Ok(Self::F64),
            29 => Ok(Self::IQ1M),
            30 => Ok(Self::BF16),
            _ => Err(GgufError::UnknownTensorType(v)),
        }
    }

    /// Number of elements per quantization block.
    ///
    /// For non-quantized types (F32, F16, etc.) the block size is 1.
    pub fn block_size(self) -> usize {
        match self {
            Self::F32 | Self::F16 | Self::BF16 | Self::F64 => 1,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 => 1,
            Self::Q4_0 | Self::Q4_1 | Self::Q5_0 | Self::Q5_1 => 32,
            Self::Q8_0 | Self::Q8_1 => 32,
            Self::IQ4NL => 32,
            // K-quant super-blocks use 256 elements
            Self::Q2K | Self::Q3K | Self::Q4K | Self::Q5K | Self::Q6K | Self::Q8K => QK_K,
            Self::IQ2XXS
            | Self::IQ2XS
            | Self::IQ3XXS
            | Self::IQ1S
            | Self::IQ3S
            | Self::IQ2S
            | Self::IQ4XS
            | Self::IQ1M => QK_K,
        }
    }

    /// Size in bytes of one quantization block.
    ///
    /// For non-quantized types this is the size of a single element.
    pub fn bytes_per_block(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F16 => 2,
            Self::BF16 => 2,
            Self::F64 => 8,
            Self::I8 => 1,
            Self::I16 => 2,
            Self::I32 => 4,
            Self::I64 => 8,
            Self::Q4_0 => 18, // f16 + 16 bytes
            Self::Q4_1 => 20, // 2*f16 + 16 bytes
            Self::Q5_0 => 22, // f16 + 4 + 16 bytes
            Self::Q5_1 => 24, // 2*f16 + 4 + 16 bytes
            Self::Q8_0 => 34, // f16 + 32 bytes
            Self::Q8_1 => 36, // 2*f16 + 32 bytes
            // K-quant sizes (QK_K = 256)
            Self::Q2K => 2 * 2 + QK_K / 16 + QK_K / 4, // 84
            Self::Q3K => 2 + QK_K / 4 + QK_K / 8 + 12, // 110
            Self::Q4K => 2 * 2 + 12 + QK_K / 2,        // 144
            Self::Q5K => 2 * 2 + 12 + QK_K / 8 + QK_K / 2, // 176
            Self::Q6K => 2 + QK_K / 16 + 3 * QK_K / 4, // 210
            Self::Q8K => 4 + QK_K + QK_K / 16 * 2,     // 292
            // IQ sizes per the reference kernels (parse-only here)
            Self::IQ2XXS => 2 + QK_K / 8 * 2,               // 66
            Self::IQ2XS => 2 + QK_K / 8 * 2 + QK_K / 32,    // 74
            Self::IQ3XXS => 2 + QK_K / 4 + QK_K / 8,        // 98
            Self::IQ1S => 2 + QK_K / 8 + QK_K / 16,         // 50
            Self::IQ4NL => 2 + 16,                          // 18
            Self::IQ3S => 2 + QK_K / 4 + QK_K / 8 + QK_K / 32 + 4, // 110
            Self::IQ2S => 2 + QK_K / 4 + QK_K / 16,         // 82
            Self::IQ4XS => 2 + 2 + QK_K / 64 + QK_K / 2,    // 136
            Self::IQ1M => QK_K / 8 + QK_K / 16 + QK_K / 32, // 56
        }
    }

    /// Exact on-disk byte size for `n_elements` values of this type.
    ///
    /// Fails with `InvalidSize` when the element count does not fill
    /// whole blocks; GGUF tensors are always block-aligned.
    pub fn byte_size_for(self, n_elements: u64) -> Result<u64, GgufError> {
        let bs = self.block_size() as u64;
        if n_elements % bs != 0 {
            return Err(GgufError::InvalidSize {
                dtype: self,
                n_elements,
            });
        }
        Ok(n_elements / bs * self.bytes_per_block() as u64)
    }

    /// The native element type for unquantized tags, or `None` for
    /// block-quantized tags that must be dequantized.
    pub fn native_element_type(self) -> Option<ElementType> {
        match self {
            Self::F32 => Some(ElementType::F32),
            Self::F16 => Some(ElementType::F16),
            Self::BF16 => Some(ElementType::BF16),
            Self::F64 => Some(ElementType::F64),
            Self::I8 => Some(ElementType::I8),
            Self::I16 => Some(ElementType::I16),
            Self::I32 => Some(ElementType::I32),
            Self::I64 => Some(ElementType::I64),
            _ => None,
        }
    }

    /// Whether this tag is block-quantized.
    pub fn is_quantized(self) -> bool {
        self.native_element_type().is_none()
    }

    /// Human-readable name for the tensor type.
    pub fn name(self) -> &'static str {
        match self {
            Self::F32 => "F32",
            Self::F16 => "F16",
            Self::Q4_0 => "Q4_0",
            Self::Q4_1 => "Q4_1",
            Self::Q5_0 => "Q5_0",
            Self::Q5_1 => "Q5_1",
            Self::Q8_0 => "Q8_0",
            Self::Q8_1 => "Q8_1",
            Self::Q2K => "Q2_K",
            Self::Q3K => "Q3_K",
            Self::Q4K => "Q4_K",
            Self::Q5K => "Q5_K",
            Self::Q6K => "Q6_K",
            Self::Q8K => "Q8_K",
            Self::IQ2XXS => "IQ2_XXS",
            Self::IQ2XS => "IQ2_XS",
            Self::IQ3XXS => "IQ3_XXS",
            Self::IQ1S => "IQ1_S",
            Self::IQ4NL => "IQ4_NL",
            Self::IQ3S => "IQ3_S",
            Self::IQ2S => "IQ2_S",
            Self::IQ4XS => "IQ4_XS",
            Self::I8 => "I8",
            Self::I16 => "I16",
            Self::I32 => "I32",
            Self::I64 => "I64",
            Self::F64 => "F64",
            Self::IQ1M => "IQ1_M",
            Self::BF16 => "BF16",
        }
    }
}

impl std::fmt::Display for TensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
