// Test fixture encoder: assembles GGUF v2/v3 byte images in memory.
//
// The inverse of the parser, for round-trip tests only. Strings follow
// the version rule (u32 lengths in v2, u64 in v3), tensor payloads are
// laid out at aligned offsets, and nested arrays re-declare their
// element type exactly as the recursive encoding requires.

use std::path::PathBuf;

use crate::metadata::{MetadataValue, ValueType};
use crate::model::align_up;
use crate::quant::f32_to_f16;
use crate::types::TensorType;

enum TensorEntry {
    /// Payload-bearing tensor; offset assigned during build.
    Data {
        name: String,
        dims_on_disk: Vec<u64>,
        dtype: TensorType,
        data: Vec<u8>,
    },
    /// Directory entry only, with an explicit offset and no payload.
    Raw {
        name: String,
        dims_on_disk: Vec<u64>,
        dtype: TensorType,
        offset: u64,
    },
}

pub struct FixtureBuilder {
    version: u32,
    alignment: u64,
    kvs: Vec<(String, MetadataValue)>,
    tensors: Vec<TensorEntry>,
}

impl FixtureBuilder {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            alignment: 32,
            kvs: Vec::new(),
            tensors: Vec::new(),
        }
    }

    /// Alignment used for the data-section layout. Callers who want the
    /// parser to agree must also add the `general.alignment` kv.
    pub fn alignment(mut self, alignment: u64) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn kv(mut self, key: &str, value: MetadataValue) -> Self {
        self.kvs.push((key.to_string(), value));
        self
    }

    /// Add a tensor with payload; its offset is the next aligned slot.
    pub fn tensor(
        mut self,
        name: &str,
        dims_on_disk: &[u64],
        dtype: TensorType,
        data: Vec<u8>,
    ) -> Self {
        self.tensors.push(TensorEntry::Data {
            name: name.to_string(),
            dims_on_disk: dims_on_disk.to_vec(),
            dtype,
            data,
        });
        self
    }

    /// Add a directory entry without writing any payload bytes.
    pub fn raw_tensor_entry(
        mut self,
        name: &str,
        dims_on_disk: &[u64],
        dtype: TensorType,
        offset: u64,
    ) -> Self {
        self.tensors.push(TensorEntry::Raw {
            name: name.to_string(),
            dims_on_disk: dims_on_disk.to_vec(),
            dtype,
            offset,
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        // Assign offsets to payload-bearing tensors first.
        let mut offsets = Vec::with_capacity(self.tensors.len());
        let mut cursor = 0u64;
        for entry in &self.tensors {
            match entry {
                TensorEntry::Data { data, .. } => {
                    let offset = align_up(cursor, self.alignment);
                    cursor = offset + data.len() as u64;
                    offsets.push(offset);
                }
                TensorEntry::Raw { offset, .. } => offsets.push(*offset),
            }
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(&crate::model::GGUF_MAGIC.to_le_bytes());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&(self.tensors.len() as u64).to_le_bytes());
        buf.extend_from_slice(&(self.kvs.len() as u64).to_le_bytes());

        for (key, value) in &self.kvs {
            write_string(&mut buf, key, self.version);
            buf.extend_from_slice(&(value_type_of(value) as u32).to_le_bytes());
            write_value(&mut buf, value, self.version);
        }

        for (entry, &offset) in self.tensors.iter().zip(&offsets) {
            let (name, dims, dtype) = match entry {
                TensorEntry::Data {
                    name,
                    dims_on_disk,
                    dtype,
                    ..
                } => (name, dims_on_disk, dtype),
                TensorEntry::Raw {
                    name,
                    dims_on_disk,
                    dtype,
                    ..
                } => (name, dims_on_disk, dtype),
            };
            write_string(&mut buf, name, self.version);
            buf.extend_from_slice(&(dims.len() as u32).to_le_bytes());
            for &d in dims {
                buf.extend_from_slice(&d.to_le_bytes());
            }
            buf.extend_from_slice(&(*dtype as u32).to_le_bytes());
            buf.extend_from_slice(&offset.to_le_bytes());
        }

        // Pad to the aligned data base, then lay out payloads.
        let data_base = align_up(buf.len() as u64, self.alignment);
        buf.resize(data_base as usize, 0);
        for (entry, &offset) in self.tensors.iter().zip(&offsets) {
            if let TensorEntry::Data { data, .. } = entry {
                buf.resize((data_base + offset) as usize, 0);
                buf.extend_from_slice(data);
            }
        }
        buf
    }

    /// Build and write to a uniquely named file in the temp directory.
    pub fn write_temp(self, stem: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("strata_gguf_test_{}.gguf", stem));
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

fn value_type_of(value: &MetadataValue) -> ValueType {
    match value {
        MetadataValue::U8(_) => ValueType::Uint8,
        MetadataValue::I8(_) => ValueType::Int8,
        MetadataValue::U16(_) => ValueType::Uint16,
        MetadataValue::I16(_) => ValueType::Int16,
        MetadataValue::U32(_) => ValueType::Uint32,
        MetadataValue::I32(_) => ValueType::Int32,
        MetadataValue::U64(_) => ValueType::Uint64,
        MetadataValue::I64(_) => ValueType::Int64,
        MetadataValue::F32(_) => ValueType::Float32,
        MetadataValue::F64(_) => ValueType::Float64,
        MetadataValue::Bool(_) => ValueType::Bool,
        MetadataValue::String(_) => ValueType::String,
        MetadataValue::Array(_, _) => ValueType::Array,
    }
}

fn write_string(buf: &mut Vec<u8>, s: &str, version: u32) {
    if version == 2 {
        buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    } else {
        buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
    }
    buf.extend_from_slice(s.as_bytes());
}

fn write_value(buf: &mut Vec<u8>, value: &MetadataValue, version: u32) {
    match value {
        MetadataValue::U8(v) => buf.push(*v),
        MetadataValue::I8(v) => buf.push(*v as u8),
        MetadataValue::U16(v) => buf.extend_from_slice(&v.to_le_bytes()),
        MetadataValue::I16(v) => buf.extend_from_slice(&v.to_le_bytes()),
        MetadataValue::U32(v) => buf.extend_from_slice(&v.to_le_bytes()),
        MetadataValue::I32(v) => buf.extend_from_slice(&v.to_le_bytes()),
        MetadataValue::U64(v) => buf.extend_from_slice(&v.to_le_bytes()),
        MetadataValue::I64(v) => buf.extend_from_slice(&v.to_le_bytes()),
        MetadataValue::F32(v) => buf.extend_from_slice(&v.to_le_bytes()),
        MetadataValue::F64(v) => buf.extend_from_slice(&v.to_le_bytes()),
        MetadataValue::Bool(v) => buf.push(u8::from(*v)),
        MetadataValue::String(s) => write_string(buf, s, version),
        MetadataValue::Array(elem_type, items) => {
            buf.extend_from_slice(&(*elem_type as u32).to_le_bytes());
            buf.extend_from_slice(&(items.len() as u64).to_le_bytes());
            for item in items {
                write_value(buf, item, version);
            }
        }
    }
}

/// Pack Q4_0 blocks from signed quants in [-8, 7].
///
/// `quants.len()` must be a multiple of 32; the first 16 values of each
/// block land in the low nibbles, the next 16 in the high nibbles.
pub fn q4_0_payload(scale: f32, quants: &[i8]) -> Vec<u8> {
    assert!(quants.len() % 32 == 0);
    let mut buf = Vec::new();
    for block in quants.chunks_exact(32) {
        buf.extend_from_slice(&f32_to_f16(scale).to_le_bytes());
        for j in 0..16 {
            let low = (block[j] + 8) as u8;
            let high = (block[j + 16] + 8) as u8;
            buf.push(low | (high << 4));
        }
    }
    buf
}

/// Pack Q8_0 blocks from signed quants.
///
/// `quants.len()` must be a multiple of 32.
pub fn q8_0_payload(scale: f32, quants: &[i8]) -> Vec<u8> {
    assert!(quants.len() % 32 == 0);
    let mut buf = Vec::new();
    for block in quants.chunks_exact(32) {
        buf.extend_from_slice(&f32_to_f16(scale).to_le_bytes());
        buf.extend(block.iter().map(|&q| q as u8));
    }
    buf
}
