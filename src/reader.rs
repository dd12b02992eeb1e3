// Little-endian primitive decoders shared by the metadata and tensor-info parsers.

use std::io::Read;

use crate::error::GgufError;

/// Longest string the parser will accept (keys, values, tensor names).
const MAX_STRING_LEN: u64 = 1_000_000;

/// Fill `buf` from the reader, mapping a short read to `Truncated`.
fn fill<R: Read>(r: &mut R, buf: &mut [u8], context: &'static str) -> Result<(), GgufError> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            GgufError::Truncated {
                context,
                need: buf.len(),
            }
        } else {
            GgufError::Io(e)
        }
    })
}

/// Read a single byte as u8.
pub fn read_u8<R: Read>(r: &mut R) -> Result<u8, GgufError> {
    let mut buf = [0u8; 1];
    fill(r, &mut buf, "u8")?;
    Ok(buf[0])
}

/// Read a single byte as i8.
pub fn read_i8<R: Read>(r: &mut R) -> Result<i8, GgufError> {
    let mut buf = [0u8; 1];
    fill(r, &mut buf, "i8")?;
    Ok(buf[0] as i8)
}

/// Read a little-endian u16.
pub fn read_u16<R: Read>(r: &mut R) -> Result<u16, GgufError> {
    let mut buf = [0u8; 2];
    fill(r, &mut buf, "u16")?;
    Ok(u16::from_le_bytes(buf))
}

/// Read a little-endian i16.
pub fn read_i16<R: Read>(r: &mut R) -> Result<i16, GgufError> {
    let mut buf = [0u8; 2];
    fill(r, &mut buf, "i16")?;
    Ok(i16::from_le_bytes(buf))
}

/// Read a little-endian u32.
pub fn read_u32<R: Read>(r: &mut R) -> Result<u32, GgufError> {
    let mut buf = [0u8; 4];
    fill(r, &mut buf, "u32")?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a little-endian i32.
pub fn read_i32<R: Read>(r: &mut R) -> Result<i32, GgufError> {
    let mut buf = [0u8; 4];
    fill(r, &mut buf, "i32")?;
    Ok(i32::from_le_bytes(buf))
}

/// Read a little-endian u64.
pub fn read_u64<R: Read>(r: &mut R) -> Result<u64, GgufError> {
    let mut buf = [0u8; 8];
    fill(r, &mut buf, "u64")?;
    Ok(u64::from_le_bytes(buf))
}

/// Read a little-endian i64.
pub fn read_i64<R: Read>(r: &mut R) -> Result<i64, GgufError> {
    let mut buf = [0u8; 8];
    fill(r, &mut buf, "i64")?;
    Ok(i64::from_le_bytes(buf))
}

/// Read a little-endian f32.
pub fn read_f32<R: Read>(r: &mut R) -> Result<f32, GgufError> {
    let mut buf = [0u8; 4];
    fill(r, &mut buf, "f32")?;
    Ok(f32::from_le_bytes(buf))
}

/// Read a little-endian f64.
pub fn read_f64<R: Read>(r: &mut R) -> Result<f64, GgufError> {
    let mut buf = [0u8; 8];
    fill(r, &mut buf, "f64")?;
    Ok(f64::from_le_bytes(buf))
}

/// Read a GGUF bool: one byte, zero is false, anything else true.
pub fn read_bool<R: Read>(r: &mut R) -> Result<bool, GgufError> {
    Ok(read_i8(r)? != 0)
}

/// Read a GGUF string: length prefix + raw UTF-8 bytes (no null terminator).
///
/// The prefix width depends on the container version: v2 uses a u32
/// length, v3 a u64. This applies to every string in the file — metadata
/// keys, string values, and tensor names alike.
pub fn read_string<R: Read>(r: &mut R, version: u32) -> Result<String, GgufError> {
    let len = if version == 2 {
        u64::from(read_u32(r)?)
    } else {
        read_u64(r)?
    };
    if len > MAX_STRING_LEN {
        return Err(GgufError::Parse(format!(
            "string length {} is suspiciously large",
            len
        )));
    }
    let mut buf = vec![0u8; len as usize];
    fill(r, &mut buf, "string bytes")?;
    String::from_utf8(buf).map_err(|e| GgufError::Parse(format!("invalid UTF-8: {}", e)))
}
