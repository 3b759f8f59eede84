use crate::encoding::BufferEncoding;

pub const RAMP_BIN_COUNT: usize = 20;

pub const RAMP_PALETTE: [[u8; 3]; RAMP_BIN_COUNT] = [
    [0x40, 0x40, 0x43],
    [0x45, 0x44, 0x55],
    [0x50, 0x4A, 0x6B],
    [0x5E, 0x4C, 0x83],
    [0x6F, 0x4B, 0x96],
    [0x7F, 0x4F, 0x9D],
    [0x90, 0x55, 0xA1],
    [0x9F, 0x5B, 0xA1],
    [0xB0, 0x61, 0xA1],
    [0xC0, 0x66, 0x9D],
    [0xD1, 0x6B, 0x97],
    [0xE0, 0x73, 0x91],
    [0xEE, 0x7E, 0x89],
    [0xF7, 0x8E, 0x85],
    [0xFC, 0xA1, 0x87],
    [0xFE, 0xB3, 0x8F],
    [0xFE, 0xC7, 0x9C],
    [0xFE, 0xD9, 0xAB],
    [0xFE, 0xEC, 0xBC],
    [0xFD, 0xFE, 0xCF],
];

/// Palette as normalized floats, in the layout the colourise shader binds.
pub fn palette_rgba_f32() -> [[f32; 4]; RAMP_BIN_COUNT] {
    RAMP_PALETTE.map(|[r, g, b]| {
        [
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            1.0,
        ]
    })
}

/// Clamps `value` into `bounds` and maps it to `[0, 1]`. Degenerate bounds
/// give 0.
pub fn normalize_to_bounds(value: f32, bounds: (f32, f32)) -> f32 {
    let (min, max) = bounds;
    if max <= min {
        return 0.0;
    }
    (value.clamp(min, max) - min) / (max - min)
}

pub fn ramp_bin(t: f32) -> usize {
    let last = RAMP_BIN_COUNT - 1;
    ((t * last as f32).floor().max(0.0) as usize).min(last)
}

pub fn ramp_color(t: f32, interpolate: bool) -> [f32; 3] {
    let palette = palette_rgba_f32();
    let index = ramp_bin(t);
    let lower = palette[index];
    if !interpolate || index + 1 >= RAMP_BIN_COUNT {
        return [lower[0], lower[1], lower[2]];
    }
    let upper = palette[index + 1];
    let fraction = t * (RAMP_BIN_COUNT - 1) as f32 - index as f32;
    std::array::from_fn(|channel| {
        lower[channel] * (1.0 - fraction) + upper[channel] * fraction
    })
}

/// Hermite smoothstep as defined by WGSL. Equal edges act as a step.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Colorize {
    pub color_bounds: (f32, f32),
    pub transparency_bounds: (f32, f32),
    pub interpolate: bool,
    pub color_encoding: BufferEncoding,
    pub transparency_encoding: BufferEncoding,
}

impl Colorize {
    /// Colour of one texel. Without a transparency value the alpha is 1.
    pub fn texel(&self, color_bits: u32, transparency_bits: Option<u32>) -> [f32; 4] {
        let value = self
            .color_encoding
            .decode(color_bits, self.color_bounds.0);
        let t = normalize_to_bounds(value, self.color_bounds);
        let [r, g, b] = ramp_color(t, self.interpolate);
        let alpha = match transparency_bits {
            Some(bits) => {
                let value = self
                    .transparency_encoding
                    .decode(bits, self.transparency_bounds.0);
                smoothstep(self.transparency_bounds.0, self.transparency_bounds.1, value)
            }
            None => 1.0,
        };
        [r, g, b, alpha]
    }

    pub fn texel_rgba8(&self, color_bits: u32, transparency_bits: Option<u32>) -> [u8; 4] {
        self.texel(color_bits, transparency_bits)
            .map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}
