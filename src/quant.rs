// Quantization block formats and dequantization kernels (Q4_0, Q8_0, Q4_K, Q6_K, F16, BF16).

use crate::error::GgufError;
use crate::types::{TensorType, QK_K};

/// Size of the packed scale/min array in Q4_K blocks.
pub const K_SCALE_SIZE: usize = 12;

/// Number of elements per Q4_0 block.
pub const QK4_0: usize = 32;

/// Number of elements per Q8_0 block.
pub const QK8_0: usize = 32;

// ---------------------------------------------------------------------------
// Block layouts
// ---------------------------------------------------------------------------

/// Q4_0 block: 4-bit quantization with a single f16 scale factor.
///
/// Layout: `d: f16 (2 bytes) | qs: [u8; 16] (16 bytes)` = 18 bytes total.
/// Each byte in `qs` stores two 4-bit values. The low nibble maps to the
/// first half of the block (indices 0..16) and the high nibble to the
/// second half (indices 16..32).
/// Dequantization: `y[j]      = (low_nibble  - 8) * d`
///                 `y[j + 16] = (high_nibble - 8) * d`
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct BlockQ4_0 {
    /// Scale factor stored as IEEE 754 half-precision (f16) bits.
    pub d: u16,
    /// 16 bytes of packed 4-bit quantized values (32 values total).
    pub qs: [u8; 16],
}

const _: () = assert!(std::mem::size_of::<BlockQ4_0>() == 18);

/// Q8_0 block: 8-bit quantization with a single f16 scale factor.
///
/// Layout: `d: f16 (2 bytes) | qs: [i8; 32] (32 bytes)` = 34 bytes total.
/// Dequantization: `y[i] = f16_to_f32(d) * qs[i]`
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct BlockQ8_0 {
    /// Scale factor stored as IEEE 754 half-precision (f16) bits.
    pub d: u16,
    /// 32 quantized values.
    pub qs: [i8; 32],
}

const _: () = assert!(std::mem::size_of::<BlockQ8_0>() == 34);

/// Q4_K block: 4-bit K-quant with 6-bit packed scales and mins.
///
/// 8 sub-blocks of 32 values each. Scales and mins are quantized with 6
/// bits and packed into 12 bytes.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct BlockQ4K {
    pub d: u16,
    pub dmin: u16,
    pub scales: [u8; K_SCALE_SIZE],
    pub qs: [u8; QK_K / 2],
}

const _: () = assert!(std::mem::size_of::<BlockQ4K>() == 144);

/// Q6_K block: 6-bit K-quant with 8-bit signed scales, no mins.
///
/// 16 sub-blocks of 16 values each. Each value is 6 bits: 4 bits in ql,
/// 2 bits in qh.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct BlockQ6K {
    pub ql: [u8; QK_K / 2],
    pub qh: [u8; QK_K / 4],
    pub scales: [i8; QK_K / 16],
    pub d: u16,
}

const _: () = assert!(std::mem::size_of::<BlockQ6K>() == 210);

// ---------------------------------------------------------------------------
// Half-precision conversion
// ---------------------------------------------------------------------------

/// Convert 16-bit IEEE 754 half-precision bits to a 32-bit float.
///
/// The `half` crate handles the subnormal, signed-zero, infinity and NaN
/// cases bit-exactly.
pub fn f16_to_f32(bits: u16) -> f32 {
    half::f16::from_bits(bits).to_f32()
}

/// Convert a 32-bit float to 16-bit IEEE 754 half-precision bits.
pub fn f32_to_f16(value: f32) -> u16 {
    half::f16::from_f32(value).to_bits()
}

/// Convert 16-bit bfloat16 bits to a 32-bit float (low 16 bits zero-padded).
pub fn bf16_to_f32(bits: u16) -> f32 {
    half::bf16::from_bits(bits).to_f32()
}

/// Convert a 32-bit float to bfloat16 bits.
pub fn f32_to_bf16(value: f32) -> u16 {
    half::bf16::from_f32(value).to_bits()
}

// ---------------------------------------------------------------------------
// K-quant scale extraction
// ---------------------------------------------------------------------------

/// Extract 6-bit scale and min values from the packed Q4_K scales array.
///
/// Ported from the reference `get_scale_min_k4()`. The 12-byte scales
/// array packs 8 pairs of (scale, min) using 6 bits each.
#[inline]
pub fn get_scale_min_k4(j: usize, scales: &[u8; K_SCALE_SIZE]) -> (u8, u8) {
    if j < 4 {
        (scales[j] & 63, scales[j + 4] & 63)
    } else {
        (
            (scales[j + 4] & 0xF) | ((scales[j - 4] >> 6) << 4),
            (scales[j + 4] >> 4) | ((scales[j] >> 6) << 4),
        )
    }
}

// ---------------------------------------------------------------------------
// Kernels
// ---------------------------------------------------------------------------

/// Dequantize a slice of Q4_0 blocks into f32 values.
///
/// Each nibble is an unsigned value in [0, 15] shifted to signed by
/// subtracting 8, then scaled by `d`. Output length = `blocks.len() * 32`.
pub fn dequantize_q4_0(blocks: &[BlockQ4_0]) -> Vec<f32> {
    let mut output = Vec::with_capacity(blocks.len() * QK4_0);
    for block in blocks {
        let d = f16_to_f32(block.d);
        // Exact layout of the reference dequantize_row_q4_0:
        //   y[i*qk + j + 0]    = ((qs[j] & 0x0F) - 8) * d
        //   y[i*qk + j + qk/2] = ((qs[j] >> 4)   - 8) * d
        let mut tmp = [0.0f32; QK4_0];
        for j in 0..QK4_0 / 2 {
            let low = (block.qs[j] & 0x0F) as i32 - 8;
            let high = (block.qs[j] >> 4) as i32 - 8;
            tmp[j] = low as f32 * d;
            tmp[j + QK4_0 / 2] = high as f32 * d;
        }
        output.extend_from_slice(&tmp);
    }
    output
}

/// Dequantize a slice of Q8_0 blocks into f32 values.
///
/// Each block of 32 quantized i8 values is scaled by its f16 delta `d`.
pub fn dequantize_q8_0(blocks: &[BlockQ8_0]) -> Vec<f32> {
    let mut output = Vec::with_capacity(blocks.len() * QK8_0);
    for block in blocks {
        let d = f16_to_f32(block.d);
        for &q in &block.qs {
            output.push(d * q as f32);
        }
    }
    output
}

/// Dequantize a slice of Q4_K blocks into f32 values.
///
/// 8 sub-blocks of 32 values each, 4-bit quants with 6-bit packed
/// scales/mins: `y = d * scale * nibble - dmin * min_val`
pub fn dequantize_q4_k(blocks: &[BlockQ4K]) -> Vec<f32> {
    let mut output = Vec::with_capacity(blocks.len() * QK_K);
    for block in blocks {
        let d = f16_to_f32(block.d);
        let dmin = f16_to_f32(block.dmin);
        let q = &block.qs;

        let mut is = 0usize;
        let mut q_offset = 0usize;
        for _j in 0..4 {
            // 64 values per iteration (two sub-blocks of 32)
            let (sc1, m1) = get_scale_min_k4(is, &block.scales);
            let d1 = d * sc1 as f32;
            let m1 = dmin * m1 as f32;
            let (sc2, m2) = get_scale_min_k4(is + 1, &block.scales);
            let d2 = d * sc2 as f32;
            let m2 = dmin * m2 as f32;

            for l in 0..32 {
                output.push(d1 * (q[q_offset + l] & 0xF) as f32 - m1);
            }
            for l in 0..32 {
                output.push(d2 * (q[q_offset + l] >> 4) as f32 - m2);
            }
            q_offset += 32;
            is += 2;
        }
    }
    output
}

/// Dequantize a slice of Q6_K blocks into f32 values.
///
/// 6-bit quants with 8-bit signed scales, no mins:
/// `y = d * scale * (q_6bit - 32)`
pub fn dequantize_q6_k(blocks: &[BlockQ6K]) -> Vec<f32> {
    let mut output = Vec::with_capacity(blocks.len() * QK_K);
    for block in blocks {
        let d = f16_to_f32(block.d);
        let ql = &block.ql;
        let qh = &block.qh;
        let sc = &block.scales;

        let mut buf = [0.0f32; QK_K];
        let mut ql_offset = 0usize;
        let mut qh_offset = 0usize;
        let mut sc_offset = 0usize;
        let mut out_offset = 0usize;

        for _n in 0..2 {
            // 128 values per iteration
            for l in 0..32 {
                let is = l / 16;
                let q1 = ((ql[ql_offset + l] & 0xF) | ((qh[qh_offset + l] & 3) << 4)) as i32 - 32;
                let q2 = ((ql[ql_offset + l + 32] & 0xF) | (((qh[qh_offset + l] >> 2) & 3) << 4))
                    as i32
                    - 32;
                let q3 =
                    ((ql[ql_offset + l] >> 4) | (((qh[qh_offset + l] >> 4) & 3) << 4)) as i32 - 32;
                let q4 = ((ql[ql_offset + l + 32] >> 4) | (((qh[qh_offset + l] >> 6) & 3) << 4))
                    as i32
                    - 32;

                buf[out_offset + l] = d * sc[sc_offset + is] as f32 * q1 as f32;
                buf[out_offset + l + 32] = d * sc[sc_offset + is + 2] as f32 * q2 as f32;
                buf[out_offset + l + 64] = d * sc[sc_offset + is + 4] as f32 * q3 as f32;
                buf[out_offset + l + 96] = d * sc[sc_offset + is + 6] as f32 * q4 as f32;
            }
            ql_offset += 64;
            qh_offset += 32;
            sc_offset += 8;
            out_offset += 128;
        }
        output.extend_from_slice(&buf);
    }
    output
}

// ---------------------------------------------------------------------------
// Byte-slice block views
// ---------------------------------------------------------------------------

macro_rules! bytes_as_blocks {
    ($name:ident, $block:ty, $tag:expr) => {
        /// Interpret a byte slice as a slice of packed blocks.
        ///
        /// Returns an error if the byte length is not a multiple of the
        /// block size.
        pub fn $name(data: &[u8]) -> Result<&[$block], GgufError> {
            let block_bytes = std::mem::size_of::<$block>();
            if data.len() % block_bytes != 0 {
                return Err(GgufError::Parse(format!(
                    "{} data length {} is not a multiple of block size {}",
                    $tag,
                    data.len(),
                    block_bytes
                )));
            }
            let n_blocks = data.len() / block_bytes;
            // SAFETY: the block type is repr(C, packed) with no padding, so
            // any bit pattern is valid and no alignment is required. The
            // length check above guarantees the slice covers whole blocks.
            let blocks =
                unsafe { std::slice::from_raw_parts(data.as_ptr() as *const $block, n_blocks) };
            Ok(blocks)
        }
    };
}

bytes_as_blocks!(bytes_as_q4_0_blocks, BlockQ4_0, "Q4_0");
bytes_as_blocks!(bytes_as_q8_0_blocks, BlockQ8_0, "Q8_0");
bytes_as_blocks!(bytes_as_q4_k_blocks, BlockQ4K, "Q4_K");
bytes_as_blocks!(bytes_as_q6_k_blocks, BlockQ6K, "Q6_K");

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Expand `n_elements` packed values of `dtype` into f32.
///
/// Covers the f32-producing kernels: F32 (pass-through), F16, BF16,
/// Q4_0, Q8_0, Q4_K and Q6_K. Every other tag — including the quantized
/// formats the registry can size but not decode — fails with
/// `UnsupportedQuant`.
pub fn dequantize(dtype: TensorType, data: &[u8], n_elements: u64) -> Result<Vec<f32>, GgufError> {
    let bs = dtype.block_size() as u64;
    if n_elements % bs != 0 {
        return Err(GgufError::InvalidSize { dtype, n_elements });
    }
    let n_blocks = (n_elements / bs) as usize;
    let need = n_blocks * dtype.bytes_per_block();
    if data.len() < need {
        return Err(GgufError::Truncated {
            context: dtype.name(),
            need,
        });
    }
    let data = &data[..need];

    match dtype {
        TensorType::F32 => Ok(data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()),
        TensorType::F16 => Ok(data
            .chunks_exact(2)
            .map(|c| f16_to_f32(u16::from_le_bytes([c[0], c[1]])))
            .collect()),
        TensorType::BF16 => Ok(data
            .chunks_exact(2)
            .map(|c| bf16_to_f32(u16::from_le_bytes([c[0], c[1]])))
            .collect()),
        TensorType::Q4_0 => Ok(dequantize_q4_0(bytes_as_q4_0_blocks(data)?)),
        TensorType::Q8_0 => Ok(dequantize_q8_0(bytes_as_q8_0_blocks(data)?)),
        TensorType::Q4K => Ok(dequantize_q4_k(bytes_as_q4_k_blocks(data)?)),
        TensorType::Q6K => Ok(dequantize_q6_k(bytes_as_q6_k_blocks(data)?)),
        other => Err(GgufError::UnsupportedQuant(other)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
