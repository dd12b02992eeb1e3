// Loader façade: header parsing, alignment bookkeeping, eager and lazy access.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::GgufError;
use crate::metadata::{read_metadata, Metadata, MetadataValue};
use crate::tensor::{decode_tensor, read_tensor_directory, Tensor, TensorDirectory};

/// GGUF magic number: ASCII "GGUF" as a little-endian u32.
pub const GGUF_MAGIC: u32 = 0x4655_4747;

/// Default alignment for the tensor data section (bytes).
pub const DEFAULT_ALIGNMENT: u64 = 32;

// Sanity caps on the header counts; a file claiming more than this is
// corrupt or hostile, not a model.
const MAX_TENSORS: u64 = 1_000_000;
const MAX_KV: u64 = 10_000_000;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// The fixed 24-byte GGUF header: magic, version, entity counts.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Header {
    /// Container version, 2 or 3.
    pub version: u32,
    pub tensor_count: u64,
    pub metadata_kv_count: u64,
}

/// Parse the magic, version and counts at the start of the file.
pub fn read_header<R: Read>(r: &mut R) -> Result<Header, GgufError> {
    let magic = crate::reader::read_u32(r)?;
    if magic != GGUF_MAGIC {
        return Err(GgufError::InvalidMagic(magic));
    }
    let version = crate::reader::read_u32(r)?;
    if version != 2 && version != 3 {
        return Err(GgufError::UnsupportedVersion(version));
    }
    let tensor_count = crate::reader::read_u64(r)?;
    let metadata_kv_count = crate::reader::read_u64(r)?;
    if tensor_count > MAX_TENSORS {
        return Err(GgufError::Parse(format!(
            "tensor count {} exceeds maximum {}",
            tensor_count, MAX_TENSORS
        )));
    }
    if metadata_kv_count > MAX_KV {
        return Err(GgufError::Parse(format!(
            "metadata count {} exceeds maximum {}",
            metadata_kv_count, MAX_KV
        )));
    }
    Ok(Header {
        version,
        tensor_count,
        metadata_kv_count,
    })
}

// ---------------------------------------------------------------------------
// LoadOptions
// ---------------------------------------------------------------------------

/// Configuration for `Model::load`.
pub struct LoadOptions {
    /// Parse structure only; defer tensor-data reads to `fetch`.
    pub lazy: bool,
    /// Expand quantized (and half-precision) tensors to f32. When false,
    /// quantized tensors surface as raw packed bytes.
    pub dequantize: bool,
    /// Predicate over tensor names; rejected tensors stay in the
    /// directory but their data is skipped during eager load.
    pub tensor_filter: Option<Box<dyn Fn(&str) -> bool>>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            lazy: false,
            dequantize: true,
            tensor_filter: None,
        }
    }
}

impl std::fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadOptions")
            .field("lazy", &self.lazy)
            .field("dequantize", &self.dequantize)
            .field("tensor_filter", &self.tensor_filter.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// A parsed GGUF file: metadata, tensor directory, and — eagerly or on
/// demand — materialized tensors.
///
/// Eager models own their decoded tensors and hold no file handle. Lazy
/// models retain only the source path; each `fetch` opens the file,
/// performs one positioned read, and closes it before returning, so
/// concurrent fetches against a shared model are safe.
pub struct Model {
    header: Header,
    metadata: Metadata,
    directory: TensorDirectory,
    tensors: HashMap<String, Tensor>,
    path: Option<PathBuf>,
    data_offset: u64,
    dequantize: bool,
}

impl Model {
    /// Read and parse a GGUF file.
    ///
    /// In eager mode (default) the whole file is read into memory once,
    /// every directory entry passing the filter is decoded, and the
    /// buffer is released before returning. In lazy mode only the
    /// structural prefix is read.
    pub fn load(path: impl AsRef<Path>, options: LoadOptions) -> Result<Self, GgufError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GgufError::FileNotFound(path.to_path_buf()));
        }
        info!("loading GGUF file: {}", path.display());

        if options.lazy {
            let mut reader = BufReader::new(File::open(path)?);
            let (header, metadata, directory, data_offset) = parse_structure(&mut reader)?;
            return Ok(Model {
                header,
                metadata,
                directory,
                tensors: HashMap::new(),
                path: Some(path.to_path_buf()),
                data_offset,
                dequantize: options.dequantize,
            });
        }

        let bytes = std::fs::read(path)?;
        let mut cursor = Cursor::new(bytes.as_slice());
        let (header, metadata, directory, data_offset) = parse_structure(&mut cursor)?;

        let mut tensors = HashMap::with_capacity(directory.len());
        for tensor_info in directory.iter() {
            if let Some(filter) = &options.tensor_filter {
                if !filter(&tensor_info.name) {
                    debug!("skipping filtered tensor {}", tensor_info.name);
                    continue;
                }
            }
            let start = data_offset + tensor_info.offset;
            let end = start + tensor_info.byte_size;
            if end > bytes.len() as u64 {
                // Same condition the lazy path hits as a short positioned read.
                return Err(GgufError::Truncated {
                    context: "tensor data",
                    need: tensor_info.byte_size as usize,
                });
            }
            let tensor = decode_tensor(
                tensor_info,
                &bytes[start as usize..end as usize],
                options.dequantize,
            )?;
            tensors.insert(tensor_info.name.clone(), tensor);
        }

        Ok(Model {
            header,
            metadata,
            directory,
            tensors,
            path: None,
            data_offset,
            dequantize: options.dequantize,
        })
    }

    /// Parse structure only: metadata and tensor directory, no tensor
    /// bytes. Equivalent to a lazy load that fetches nothing.
    pub fn peek(path: impl AsRef<Path>) -> Result<Self, GgufError> {
        Self::load(
            path,
            LoadOptions {
                lazy: true,
                tensor_filter: Some(Box::new(|_| false)),
                ..Default::default()
            },
        )
    }

    /// Materialize a tensor by name.
    ///
    /// Lazy models read exactly `byte_size` bytes at the tensor's
    /// absolute offset through a file handle scoped to this call. Eager
    /// models return a clone from the materialized map; use `tensors()`
    /// for zero-copy access instead.
    pub fn fetch(&self, name: &str) -> Result<Tensor, GgufError> {
        if let Some(tensor) = self.tensors.get(name) {
            return Ok(tensor.clone());
        }
        let info = self
            .directory
            .get(name)
            .ok_or_else(|| GgufError::TensorNotFound(name.to_string()))?;
        let path = match &self.path {
            Some(p) => p,
            // Eager model whose filter skipped this tensor.
            None => return Err(GgufError::TensorNotFound(name.to_string())),
        };

        debug!(
            "fetching tensor {} ({} bytes at offset {})",
            name,
            info.byte_size,
            self.data_offset + info.offset
        );
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(self.data_offset + info.offset))?;
        let mut buf = vec![0u8; info.byte_size as usize];
        file.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                GgufError::Truncated {
                    context: "tensor data",
                    need: info.byte_size as usize,
                }
            } else {
                GgufError::Io(e)
            }
        })?;
        drop(file);

        decode_tensor(info, &buf, self.dequantize)
    }

    // -- Accessors ----------------------------------------------------------

    pub fn header(&self) -> Header {
        self.header
    }

    /// Container version, 2 or 3.
    pub fn version(&self) -> u32 {
        self.header.version
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn directory(&self) -> &TensorDirectory {
        &self.directory
    }

    /// Tensors materialized during an eager load.
    pub fn tensors(&self) -> &HashMap<String, Tensor> {
        &self.tensors
    }

    /// Every tensor name in the directory, in file order.
    pub fn tensor_names(&self) -> impl Iterator<Item = &str> {
        self.directory.names()
    }

    /// Absolute file offset where the tensor data section starts.
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    /// Whether tensor data is deferred to `fetch`.
    pub fn is_lazy(&self) -> bool {
        self.path.is_some()
    }

    /// Source path, retained only by lazy models.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("version", &self.header.version)
            .field("n_metadata", &self.metadata.len())
            .field("n_tensors", &self.directory.len())
            .field("n_materialized", &self.tensors.len())
            .field("data_offset", &self.data_offset)
            .field("lazy", &self.is_lazy())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Structure parsing
// ---------------------------------------------------------------------------

fn parse_structure<R: Read + Seek>(
    r: &mut R,
) -> Result<(Header, Metadata, TensorDirectory, u64), GgufError> {
    let header = read_header(r)?;
    debug!(
        "GGUF v{}: {} tensors, {} kv pairs",
        header.version, header.tensor_count, header.metadata_kv_count
    );

    let metadata = read_metadata(r, header.metadata_kv_count, header.version)?;
    let alignment = effective_alignment(&metadata);
    let directory = read_tensor_directory(r, header.tensor_count, header.version)?;

    // The data section starts at the next alignment boundary after the
    // tensor-info array.
    let end_of_prefix = r.stream_position()?;
    let data_offset = align_up(end_of_prefix, alignment);
    debug!(
        "data section starts at offset {} (directory ended at {}, alignment {})",
        data_offset, end_of_prefix, alignment
    );

    Ok((header, metadata, directory, data_offset))
}

/// The alignment in effect for the data section.
///
/// `general.alignment` wins when present as a positive U32 or U64;
/// anything else (missing, zero, or a non-integer type) falls back to
/// the 32-byte default.
fn effective_alignment(metadata: &Metadata) -> u64 {
    match metadata.get("general.alignment") {
        Some(MetadataValue::U32(a)) if *a > 0 => u64::from(*a),
        Some(MetadataValue::U64(a)) if *a > 0 => *a,
        _ => DEFAULT_ALIGNMENT,
    }
}

/// Round `offset` up to the next multiple of `alignment`.
pub fn align_up(offset: u64, alignment: u64) -> u64 {
    let remainder = offset % alignment;
    if remainder == 0 {
        offset
    } else {
        offset + (alignment - remainder)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
