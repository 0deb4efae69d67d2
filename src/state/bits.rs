//! Bit-level access to state memory
//!
//! All multi-byte fields are little-endian. Bit fields may start at any bit
//! and span up to 64 bits. Out-of-range bytes read as zero and are never
//! written.

/// A contiguous range of bits, relative to the start of a device's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitRegion {
    pub bit_start: u32,
    pub bit_len: u32,
}

impl BitRegion {
    pub fn new(bit_start: u32, bit_len: u32) -> Self {
        Self { bit_start, bit_len }
    }

    /// Region covering whole bytes
    pub fn from_bytes(byte_offset: u32, byte_len: u32) -> Self {
        Self::new(byte_offset * 8, byte_len * 8)
    }

    pub fn bit_end(&self) -> u32 {
        self.bit_start + self.bit_len
    }

    pub fn is_empty(&self) -> bool {
        self.bit_len == 0
    }

    /// Intersection of two regions, if any
    pub fn overlap(&self, other: &BitRegion) -> Option<BitRegion> {
        let start = self.bit_start.max(other.bit_start);
        let end = self.bit_end().min(other.bit_end());
        if start < end {
            Some(BitRegion::new(start, end - start))
        } else {
            None
        }
    }
}

fn mask(size_in_bits: u32) -> u64 {
    if size_in_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << size_in_bits) - 1
    }
}

/// Read `size_in_bits` (1..=64) bits starting at `byte_offset`/`bit_offset`
pub fn read_bits(buf: &[u8], byte_offset: usize, bit_offset: u32, size_in_bits: u32) -> u64 {
    if size_in_bits == 0 {
        return 0;
    }
    let size = size_in_bits.min(64);
    let start_bit = byte_offset * 8 + bit_offset as usize;
    let first_byte = start_bit / 8;
    let shift = (start_bit % 8) as u32;
    let byte_count = (shift + size).div_ceil(8) as usize;

    let mut acc: u128 = 0;
    for i in 0..byte_count {
        let byte = buf.get(first_byte + i).copied().unwrap_or(0);
        acc |= (byte as u128) << (8 * i);
    }

    ((acc >> shift) as u64) & mask(size)
}

/// Write the low `size_in_bits` bits of `value`, leaving neighbouring bits intact
pub fn write_bits(
    buf: &mut [u8],
    byte_offset: usize,
    bit_offset: u32,
    size_in_bits: u32,
    value: u64,
) {
    if size_in_bits == 0 {
        return;
    }
    let size = size_in_bits.min(64);
    let start_bit = byte_offset * 8 + bit_offset as usize;
    let first_byte = start_bit / 8;
    let shift = (start_bit % 8) as u32;
    let byte_count = (shift + size).div_ceil(8) as usize;

    let mut acc: u128 = 0;
    for i in 0..byte_count {
        let byte = buf.get(first_byte + i).copied().unwrap_or(0);
        acc |= (byte as u128) << (8 * i);
    }

    let field_mask = (mask(size) as u128) << shift;
    acc = (acc & !field_mask) | (((value & mask(size)) as u128) << shift);

    for i in 0..byte_count {
        if let Some(byte) = buf.get_mut(first_byte + i) {
            *byte = (acc >> (8 * i)) as u8;
        }
    }
}

/// Read an N-bit excess-K field as a signed integer (K = 2^(N-1))
pub fn read_excess_k(buf: &[u8], byte_offset: usize, bit_offset: u32, size_in_bits: u32) -> i64 {
    let size = size_in_bits.clamp(1, 63);
    let raw = read_bits(buf, byte_offset, bit_offset, size) as i64;
    raw - (1i64 << (size - 1))
}

/// Write a signed integer as an N-bit excess-K field, saturating at the field's range
pub fn write_excess_k(
    buf: &mut [u8],
    byte_offset: usize,
    bit_offset: u32,
    size_in_bits: u32,
    value: i64,
) {
    let size = size_in_bits.clamp(1, 63);
    let k = 1i64 << (size - 1);
    let stored = (value + k).clamp(0, mask(size) as i64);
    write_bits(buf, byte_offset, bit_offset, size, stored as u64);
}

/// Whether the bits of `region` differ between two state images
pub fn regions_differ(old: &[u8], new: &[u8], region: BitRegion) -> bool {
    let mut bit = region.bit_start;
    let end = region.bit_end();
    while bit < end {
        let chunk = (end - bit).min(64);
        let byte_offset = (bit / 8) as usize;
        let bit_offset = bit % 8;
        let before = read_bits(old, byte_offset, bit_offset, chunk);
        if before != read_bits(new, byte_offset, bit_offset, chunk) {
            return true;
        }
        bit += chunk;
    }
    false
}

// Normalized conversions.
//
// Integers map linearly onto [0,1] with `min -> 0.0` and `max -> 1.0`. The
// division happens in f64 and the result is rounded to f32 once. Writing
// clamps to [0,1] and rounds to the nearest integer, so any integer of at most
// 24 significant bits survives a read/write cycle unchanged.

/// Map an unsigned value in `[0, max]` onto `[0,1]`
pub fn uint_to_normalized(value: u64, max: u64) -> f32 {
    if max == 0 {
        return 0.0;
    }
    (value.min(max) as f64 / max as f64) as f32
}

/// Inverse of [`uint_to_normalized`]
pub fn normalized_to_uint(value: f32, max: u64) -> u64 {
    let clamped = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) as f64 };
    (clamped * max as f64).round() as u64
}

/// Map a signed value in `[min, max]` onto `[0,1]`
pub fn int_to_normalized(value: i64, min: i64, max: i64) -> f32 {
    if max <= min {
        return 0.0;
    }
    let value = value.clamp(min, max);
    ((value as f64 - min as f64) / (max as f64 - min as f64)) as f32
}

/// Inverse of [`int_to_normalized`]
pub fn normalized_to_int(value: f32, min: i64, max: i64) -> i64 {
    let clamped = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) as f64 };
    let range = max as f64 - min as f64;
    ((min as f64 + clamped * range).round() as i64).clamp(min, max)
}
