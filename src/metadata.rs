// KV metadata: 13-way tagged values, order-preserving map, sequential decoder.

use std::collections::HashMap;
use std::io::Read;

use serde::Serialize;
use tracing::debug;

use crate::error::GgufError;
use crate::reader::{
    read_bool, read_f32, read_f64, read_i16, read_i32, read_i64, read_i8, read_string, read_u16,
    read_u32, read_u64, read_u8,
};

/// Largest metadata array the parser will accept.
const MAX_ARRAY_LEN: u64 = 100_000_000;

// ---------------------------------------------------------------------------
// ValueType — KV value type IDs
// ---------------------------------------------------------------------------

/// GGUF KV value type IDs (matches gguf_type enum in gguf.h).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum ValueType {
    Uint8 = 0,
    Int8 = 1,
    Uint16 = 2,
    Int16 = 3,
    Uint32 = 4,
    Int32 = 5,
    Float32 = 6,
    Bool = 7,
    String = 8,
    Array = 9,
    Uint64 = 10,
    Int64 = 11,
    Float64 = 12,
}

impl ValueType {
    pub fn from_u32(v: u32) -> Result<Self, GgufError> {
        match v {
            0 => Ok(Self::Uint8),
            1 => Ok(Self::Int8),
            2 => Ok(Self::Uint16),
            3 => Ok(Self::Int16),
            4 => Ok(Self::Uint32),
            5 => Ok(Self::Int32),
            6 => Ok(Self::Float32),
            7 => Ok(Self::Bool),
            8 => Ok(Self::String),
            9 => Ok(Self::Array),
            10 => Ok(Self::Uint64),
            11 => Ok(Self::Int64),
            12 => Ok(Self::Float64),
            _ => Err(GgufError::UnknownMetadataType(v)),
        }
    }
}

// ---------------------------------------------------------------------------
// MetadataValue — typed metadata values
// ---------------------------------------------------------------------------

/// A typed value from a GGUF key-value pair.
///
/// Arrays are homogeneous and carry their element type tag; the element
/// tag may itself be `Array`, in which case every nested array re-declares
/// its own inner element type on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MetadataValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
    Array(ValueType, Vec<MetadataValue>),
}

impl MetadataValue {
    /// Human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::U8(_) => "U8",
            Self::I8(_) => "I8",
            Self::U16(_) => "U16",
            Self::I16(_) => "I16",
            Self::U32(_) => "U32",
            Self::I32(_) => "I32",
            Self::U64(_) => "U64",
            Self::I64(_) => "I64",
            Self::F32(_) => "F32",
            Self::F64(_) => "F64",
            Self::Bool(_) => "Bool",
            Self::String(_) => "String",
            Self::Array(_, _) => "Array",
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata — order-preserving key/value map
// ---------------------------------------------------------------------------

/// The metadata mapping of a GGUF file.
///
/// Iteration yields entries in file order. A duplicate key replaces the
/// earlier value in place (last value wins, first position kept), so
/// iteration stays deterministic.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: Vec<(String, MetadataValue)>,
    index: HashMap<String, usize>,
}

impl Metadata {
    pub fn insert(&mut self, key: String, value: MetadataValue) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// Get a raw metadata value by key.
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in file order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    // -- Typed getters ------------------------------------------------------

    /// Get a string metadata value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(MetadataValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get a u32 metadata value.
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        match self.get(key) {
            Some(MetadataValue::U32(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get a u64 metadata value.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key) {
            Some(MetadataValue::U64(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get an i32 metadata value.
    pub fn get_i32(&self, key: &str) -> Option<i32> {
        match self.get(key) {
            Some(MetadataValue::I32(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get an f32 metadata value.
    pub fn get_f32(&self, key: &str) -> Option<f32> {
        match self.get(key) {
            Some(MetadataValue::F32(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get a bool metadata value.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(MetadataValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get a string array metadata value.
    pub fn get_str_array(&self, key: &str) -> Option<Vec<&str>> {
        match self.get(key) {
            Some(MetadataValue::Array(_, arr)) => {
                let mut result = Vec::with_capacity(arr.len());
                for item in arr {
                    match item {
                        MetadataValue::String(s) => result.push(s.as_str()),
                        _ => return None,
                    }
                }
                Some(result)
            }
            _ => None,
        }
    }

    /// Get an f32 array metadata value.
    pub fn get_f32_array(&self, key: &str) -> Option<Vec<f32>> {
        match self.get(key) {
            Some(MetadataValue::Array(_, arr)) => {
                let mut result = Vec::with_capacity(arr.len());
                for item in arr {
                    match item {
                        MetadataValue::F32(v) => result.push(*v),
                        _ => return None,
                    }
                }
                Some(result)
            }
            _ => None,
        }
    }

    /// Get a required string value, returning an error if missing.
    pub fn require_str(&self, key: &str) -> Result<&str, GgufError> {
        self.get_str(key)
            .ok_or_else(|| GgufError::MissingKey(key.to_string()))
    }

    /// Get a required u32 value, returning an error if missing.
    pub fn require_u32(&self, key: &str) -> Result<u32, GgufError> {
        self.get_u32(key)
            .ok_or_else(|| GgufError::MissingKey(key.to_string()))
    }

    /// Get a required f32 value, returning an error if missing.
    pub fn require_f32(&self, key: &str) -> Result<f32, GgufError> {
        self.get_f32(key)
            .ok_or_else(|| GgufError::MissingKey(key.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Read `n_kv` key/value pairs.
///
/// Purely sequential; never looks ahead, never seeks.
pub fn read_metadata<R: Read>(
    r: &mut R,
    n_kv: u64,
    version: u32,
) -> Result<Metadata, GgufError> {
    let mut metadata = Metadata::default();
    for i in 0..n_kv {
        let key = read_string(r, version)?;
        let value_type = ValueType::from_u32(read_u32(r)?)?;
        let value = read_value(r, value_type, version)?;
        debug!("kv[{}]: {} = {}", i, key, value.type_name());
        metadata.insert(key, value);
    }
    Ok(metadata)
}

/// Read a single value of the given type.
pub fn read_value<R: Read>(
    r: &mut R,
    vtype: ValueType,
    version: u32,
) -> Result<MetadataValue, GgufError> {
    match vtype {
        ValueType::Uint8 => Ok(MetadataValue::U8(read_u8(r)?)),
        ValueType::Int8 => Ok(MetadataValue::I8(read_i8(r)?)),
        ValueType::Uint16 => Ok(MetadataValue::U16(read_u16(r)?)),
        ValueType::Int16 => Ok(MetadataValue::I16(read_i16(r)?)),
        ValueType::Uint32 => Ok(MetadataValue::U32(read_u32(r)?)),
        ValueType::Int32 => Ok(MetadataValue::I32(read_i32(r)?)),
        ValueType::Float32 => Ok(MetadataValue::F32(read_f32(r)?)),
        ValueType::Bool => Ok(MetadataValue::Bool(read_bool(r)?)),
        ValueType::String => Ok(MetadataValue::String(read_string(r, version)?)),
        ValueType::Uint64 => Ok(MetadataValue::U64(read_u64(r)?)),
        ValueType::Int64 => Ok(MetadataValue::I64(read_i64(r)?)),
        ValueType::Float64 => Ok(MetadataValue::F64(read_f64(r)?)),
        ValueType::Array => {
            let elem_type = ValueType::from_u32(read_u32(r)?)?;
            let count = read_u64(r)?;
            if count > MAX_ARRAY_LEN {
                return Err(GgufError::Parse(format!(
                    "array with {} elements is suspiciously large",
                    count
                )));
            }
            let mut elements = Vec::with_capacity(count as usize);
            for _ in 0..count {
                elements.push(read_value(r, elem_type, version)?);
            }
            Ok(MetadataValue::Array(elem_type, elements))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
