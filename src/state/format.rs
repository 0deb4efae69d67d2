//! Value formats and state blocks
//!
//! A [`StateBlock`] locates a control's value inside its device's state and
//! says how the raw bits become a float.

use serde::{Deserialize, Serialize};

use super::bits::{
    int_to_normalized, normalized_to_int, normalized_to_uint, read_bits, uint_to_normalized,
    write_bits, BitRegion,
};

/// Storage format of a control value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFormat {
    /// Unsigned bit field. One bit reads as 0/1, wider fields as [0,1]
    Bit,
    /// Excess-K bit field. One bit reads as -1/1, wider fields as [-1,1]
    SBit,
    Byte,
    SByte,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl StateFormat {
    /// Natural size of byte-based formats (bit fields have none)
    pub fn natural_size_in_bits(self) -> Option<u32> {
        match self {
            Self::Bit | Self::SBit => None,
            Self::Byte | Self::SByte => Some(8),
            Self::Short | Self::UShort => Some(16),
            Self::Int | Self::UInt | Self::Float => Some(32),
            Self::Double => Some(64),
        }
    }
}

/// Location and format of a value within a device's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct StateBlock {
    pub byte_offset: u32,
    #[serde(default)]
    pub bit_offset: u32,
    pub size_in_bits: u32,
    pub format: StateFormat,
}

impl StateBlock {
    /// Block with the natural size of a byte-based format
    pub fn new(byte_offset: u32, format: StateFormat) -> Self {
        Self {
            byte_offset,
            bit_offset: 0,
            size_in_bits: format.natural_size_in_bits().unwrap_or(1),
            format,
        }
    }

    /// Single-bit button
    pub fn bit(byte_offset: u32, bit_offset: u32) -> Self {
        Self::bits(byte_offset, bit_offset, 1, StateFormat::Bit)
    }

    /// Bit field of arbitrary width (`Bit` or `SBit`)
    pub fn bits(byte_offset: u32, bit_offset: u32, size_in_bits: u32, format: StateFormat) -> Self {
        Self {
            byte_offset: byte_offset + bit_offset / 8,
            bit_offset: bit_offset % 8,
            size_in_bits,
            format,
        }
    }

    /// Bits covered by this block, relative to the device's state
    pub fn region(&self) -> BitRegion {
        BitRegion::new(self.byte_offset * 8 + self.bit_offset, self.size_in_bits)
    }

    /// One past the last byte touched
    pub fn byte_end(&self) -> u32 {
        (self.byte_offset * 8 + self.bit_offset + self.size_in_bits).div_ceil(8)
    }

    fn offset(&self) -> usize {
        self.byte_offset as usize
    }

    fn raw(&self, state: &[u8]) -> u64 {
        read_bits(state, self.offset(), self.bit_offset, self.size_in_bits)
    }

    fn set_raw(&self, state: &mut [u8], value: u64) {
        write_bits(state, self.offset(), self.bit_offset, self.size_in_bits, value);
    }

    fn field_max(&self) -> u64 {
        if self.size_in_bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.size_in_bits) - 1
        }
    }

    /// Decode the block as a float
    pub fn read_f32(&self, state: &[u8]) -> f32 {
        match self.format {
            StateFormat::Bit => {
                if self.size_in_bits == 1 {
                    self.raw(state) as f32
                } else {
                    uint_to_normalized(self.raw(state), self.field_max())
                }
            }
            StateFormat::SBit => {
                if self.size_in_bits == 1 {
                    if self.raw(state) != 0 { 1.0 } else { -1.0 }
                } else {
                    uint_to_normalized(self.raw(state), self.field_max()) * 2.0 - 1.0
                }
            }
            StateFormat::Byte => uint_to_normalized(self.raw(state), u8::MAX as u64),
            StateFormat::SByte => {
                signed(self.raw(state) as u8 as i8 as i64, i8::MIN as i64, i8::MAX as i64)
            }
            StateFormat::Short => {
                signed(self.raw(state) as u16 as i16 as i64, i16::MIN as i64, i16::MAX as i64)
            }
            StateFormat::UShort => uint_to_normalized(self.raw(state), u16::MAX as u64),
            StateFormat::Int => {
                signed(self.raw(state) as u32 as i32 as i64, i32::MIN as i64, i32::MAX as i64)
            }
            StateFormat::UInt => uint_to_normalized(self.raw(state), u32::MAX as u64),
            StateFormat::Float => f32::from_bits(self.raw(state) as u32),
            StateFormat::Double => f64::from_bits(self.raw(state)) as f32,
        }
    }

    /// Encode a float into the block
    pub fn write_f32(&self, state: &mut [u8], value: f32) {
        let raw = match self.format {
            StateFormat::Bit => {
                if self.size_in_bits == 1 {
                    u64::from(value >= 0.5)
                } else {
                    normalized_to_uint(value, self.field_max())
                }
            }
            StateFormat::SBit => {
                if self.size_in_bits == 1 {
                    u64::from(value >= 0.0)
                } else {
                    normalized_to_uint(value * 0.5 + 0.5, self.field_max())
                }
            }
            StateFormat::Byte => normalized_to_uint(value, u8::MAX as u64),
            StateFormat::SByte => {
                let v = normalized_to_int(value * 0.5 + 0.5, i8::MIN as i64, i8::MAX as i64);
                v as i8 as u8 as u64
            }
            StateFormat::Short => {
                let v = normalized_to_int(value * 0.5 + 0.5, i16::MIN as i64, i16::MAX as i64);
                v as i16 as u16 as u64
            }
            StateFormat::UShort => normalized_to_uint(value, u16::MAX as u64),
            StateFormat::Int => {
                let v = normalized_to_int(value * 0.5 + 0.5, i32::MIN as i64, i32::MAX as i64);
                v as i32 as u32 as u64
            }
            StateFormat::UInt => normalized_to_uint(value, u32::MAX as u64),
            StateFormat::Float => value.to_bits() as u64,
            StateFormat::Double => (value as f64).to_bits(),
        };
        self.set_raw(state, raw);
    }
}

fn signed(value: i64, min: i64, max: i64) -> f32 {
    int_to_normalized(value, min, max) * 2.0 - 1.0
}
