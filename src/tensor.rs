// Tensor directory parsing and the decoded-tensor output model.

use std::collections::HashMap;
use std::io::Read;

use tracing::debug;

use crate::error::GgufError;
use crate::quant;
use crate::reader::{read_string, read_u32, read_u64};
use crate::types::{ElementType, TensorType};

// ---------------------------------------------------------------------------
// TensorInfo / TensorDirectory
// ---------------------------------------------------------------------------

/// Descriptor for a single tensor stored in a GGUF file.
///
/// `shape` is row-major, outermost dimension first — the reverse of the
/// on-disk dim order (GGUF stores the innermost dimension first). The
/// `offset` is relative to the start of the tensor data section, not the
/// start of the file.
#[derive(Debug, Clone)]
pub struct TensorInfo {
    /// Tensor name (e.g. "blk.0.attn_q.weight").
    pub name: String,
    /// Row-major shape, outermost first.
    pub shape: Vec<u64>,
    /// Data type (quantization format).
    pub dtype: TensorType,
    /// Byte offset relative to the data section start.
    pub offset: u64,
    /// Exact on-disk byte size, derived from shape and dtype.
    pub byte_size: u64,
}

impl TensorInfo {
    /// Total number of logical elements in the tensor.
    pub fn n_elements(&self) -> u64 {
        self.shape.iter().product::<u64>().max(1)
    }
}

/// The tensor directory of a GGUF file: name → descriptor, names unique,
/// file order preserved for deterministic eager decoding.
#[derive(Debug, Clone, Default)]
pub struct TensorDirectory {
    entries: Vec<TensorInfo>,
    index: HashMap<String, usize>,
}

impl TensorDirectory {
    pub fn insert(&mut self, info: TensorInfo) {
        match self.index.get(&info.name) {
            Some(&i) => self.entries[i] = info,
            None => {
                self.index.insert(info.name.clone(), self.entries.len());
                self.entries.push(info);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&TensorInfo> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptors in file order.
    pub fn iter(&self) -> impl Iterator<Item = &TensorInfo> {
        self.entries.iter()
    }

    /// Tensor names in file order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|info| info.name.as_str())
    }
}

/// Read `n_tensors` tensor-info entries.
///
/// On-disk dims are innermost-first; the stored shape is their reversal.
pub fn read_tensor_directory<R: Read>(
    r: &mut R,
    n_tensors: u64,
    version: u32,
) -> Result<TensorDirectory, GgufError> {
    let mut directory = TensorDirectory::default();
    for i in 0..n_tensors {
        let name = read_string(r, version)?;
        let n_dims = read_u32(r)?;
        let mut shape = Vec::with_capacity(n_dims as usize);
        for _ in 0..n_dims {
            shape.push(read_u64(r)?);
        }
        shape.reverse();
        let dtype = TensorType::from_u32(read_u32(r)?)?;
        let offset = read_u64(r)?;
        let n_elements = shape.iter().product::<u64>().max(1);
        let byte_size = dtype.byte_size_for(n_elements)?;

        debug!(
            "tensor[{}]: {} shape={:?} dtype={} offset={} bytes={}",
            i, name, shape, dtype, offset, byte_size
        );
        directory.insert(TensorInfo {
            name,
            shape,
            dtype,
            offset,
            byte_size,
        });
    }
    Ok(directory)
}

// ---------------------------------------------------------------------------
// Tensor / TensorData
// ---------------------------------------------------------------------------

/// Element buffer of a materialized tensor.
///
/// Quantized tensors decode to `F32`; with dequantization disabled they
/// surface as `Raw` packed bytes instead. Natively-numeric tensors keep
/// their element width.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    F16(Vec<half::f16>),
    BF16(Vec<half::bf16>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    Raw(Vec<u8>),
}

impl TensorData {
    /// Number of elements (bytes for `Raw`).
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::F16(v) => v.len(),
            Self::BF16(v) => v.len(),
            Self::I8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::Raw(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The f32 buffer, if this tensor was decoded to f32.
    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Self::F32(v) => Some(v),
            _ => None,
        }
    }

    /// The raw packed bytes, if dequantization was skipped.
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            Self::Raw(v) => Some(v),
            _ => None,
        }
    }
}

/// A materialized tensor: descriptor plus decoded element buffer.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub name: String,
    /// Row-major shape, outermost first.
    pub shape: Vec<u64>,
    /// On-disk type the data was decoded from.
    pub dtype: TensorType,
    pub data: TensorData,
}

impl Tensor {
    pub fn n_elements(&self) -> u64 {
        self.shape.iter().product::<u64>().max(1)
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn le_elements<T, const W: usize>(data: &[u8], decode: impl Fn([u8; W]) -> T) -> Vec<T> {
    data.chunks_exact(W)
        .map(|c| {
            let mut buf = [0u8; W];
            buf.copy_from_slice(c);
            decode(buf)
        })
        .collect()
}

/// Decode a tensor's packed bytes into its element buffer.
///
/// `dequantize` controls quantized tags only: natively-numeric tensors
/// always come back typed. F16 and BF16 count as quantized for this
/// purpose in the sense that dequantization widens them to f32.
pub fn decode_tensor(
    info: &TensorInfo,
    data: &[u8],
    dequantize: bool,
) -> Result<Tensor, GgufError> {
    let n_elements = info.n_elements();
    if (data.len() as u64) < info.byte_size {
        return Err(GgufError::Truncated {
            context: "tensor data",
            need: info.byte_size as usize,
        });
    }
    let data = &data[..info.byte_size as usize];

    let payload = match info.dtype.native_element_type() {
        Some(ElementType::F32) => TensorData::F32(le_elements(data, f32::from_le_bytes)),
        Some(ElementType::F64) => TensorData::F64(le_elements(data, f64::from_le_bytes)),
        Some(ElementType::I8) => TensorData::I8(data.iter().map(|&b| b as i8).collect()),
        Some(ElementType::I16) => TensorData::I16(le_elements(data, i16::from_le_bytes)),
        Some(ElementType::I32) => TensorData::I32(le_elements(data, i32::from_le_bytes)),
        Some(ElementType::I64) => TensorData::I64(le_elements(data, i64::from_le_bytes)),
        Some(ElementType::F16) => {
            if dequantize {
                TensorData::F32(quant::dequantize(info.dtype, data, n_elements)?)
            } else {
                TensorData::F16(le_elements(data, half::f16::from_le_bytes))
            }
        }
        Some(ElementType::BF16) => {
            if dequantize {
                TensorData::F32(quant::dequantize(info.dtype, data, n_elements)?)
            } else {
                TensorData::BF16(le_elements(data, half::bf16::from_le_bytes))
            }
        }
        None => {
            if dequantize {
                TensorData::F32(quant::dequantize(info.dtype, data, n_elements)?)
            } else {
                TensorData::Raw(data.to_vec())
            }
        }
    };

    Ok(Tensor {
        name: info.name.clone(),
        shape: info.shape.clone(),
        dtype: info.dtype,
        data: payload,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
