use serde::{Deserialize, Serialize};

/// Initial travel-angle cell value; any real angle compares below it.
pub const TRAVEL_ANGLE_EMPTY: u32 = u32::MAX;

/// Bit pattern of `max(value, 0)`. Non-negative floats keep their order when
/// compared as `u32`, which lets the kernel use integer atomics.
pub fn encode_ordered_f32(value: f32) -> u32 {
    value.max(0.0).to_bits()
}

pub fn decode_ordered_f32(bits: u32) -> f32 {
    f32::from_bits(bits)
}

/// How a layer buffer element is read back as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferEncoding {
    #[default]
    FloatBits,
    UnsignedInteger,
}

impl BufferEncoding {
    pub fn gpu_index(self) -> u32 {
        match self {
            BufferEncoding::FloatBits => 0,
            BufferEncoding::UnsignedInteger => 1,
        }
    }

    /// `TRAVEL_ANGLE_EMPTY` decodes to `empty_value`.
    pub fn decode(self, bits: u32, empty_value: f32) -> f32 {
        if bits == TRAVEL_ANGLE_EMPTY {
            return empty_value;
        }
        match self {
            BufferEncoding::FloatBits => f32::from_bits(bits),
            BufferEncoding::UnsignedInteger => bits as f32,
        }
    }
}
