//! Host mirrors of the uniform blocks the kernels read. Field order and
//! padding follow WGSL uniform layout rules.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use trajectories::{Colorize, RAMP_BIN_COUNT, palette_rgba_f32};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ColorizeParams {
    pub size: [u32; 2],
    pub color_bounds: [f32; 2],
    pub transparency_bounds: [f32; 2],
    pub use_interpolation: u32,
    pub use_transparency: u32,
    pub color_encoding: u32,
    pub transparency_encoding: u32,
    pub padding: [u32; 2],
    pub palette: [[f32; 4]; RAMP_BIN_COUNT],
}

const_assert_eq!(std::mem::size_of::<ColorizeParams>(), 368);
const_assert_eq!(std::mem::offset_of!(ColorizeParams, palette), 48);

impl ColorizeParams {
    pub fn new(colorize: &Colorize, width: u32, height: u32, use_transparency: bool) -> Self {
        Self {
            size: [width, height],
            color_bounds: [colorize.color_bounds.0, colorize.color_bounds.1],
            transparency_bounds: [colorize.transparency_bounds.0, colorize.transparency_bounds.1],
            use_interpolation: u32::from(colorize.interpolate),
            use_transparency: u32::from(use_transparency),
            color_encoding: colorize.color_encoding.gpu_index(),
            transparency_encoding: colorize.transparency_encoding.gpu_index(),
            padding: [0; 2],
            palette: palette_rgba_f32(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct FillParams {
    pub value: u32,
    pub count: u32,
    pub padding: [u32; 2],
}

const_assert_eq!(std::mem::size_of::<FillParams>(), 16);

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DownsampleParams {
    pub tile_size: [u32; 2],
    /// Output row pitch in `u32` words, matching the padded copy layout.
    pub words_per_row: u32,
    pub num_parents: u32,
}

const_assert_eq!(std::mem::size_of::<DownsampleParams>(), 16);

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct UpsampleParams {
    pub source_size: [u32; 2],
    pub target_size: [u32; 2],
    pub num_layers: u32,
    pub padding: [u32; 3],
}

const_assert_eq!(std::mem::size_of::<UpsampleParams>(), 32);

/// Angles in degrees, altitudes in metres.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SnowParams {
    pub min_angle: f32,
    pub max_angle: f32,
    pub angle_blend: f32,
    pub min_altitude: f32,
    pub altitude_variation: f32,
    pub altitude_blend: f32,
    pub specular: f32,
    pub padding: f32,
}

const_assert_eq!(std::mem::size_of::<SnowParams>(), 32);

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ReleasePointParams {
    pub min_slope_angle: f32,
    pub max_slope_angle: f32,
    pub sampling_interval: [u32; 2],
}

const_assert_eq!(std::mem::size_of::<ReleasePointParams>(), 16);

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TextureNormalsParams {
    pub texel_size_m: [f32; 2],
    pub padding: [f32; 2],
}

const_assert_eq!(std::mem::size_of::<TextureNormalsParams>(), 16);

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DispatchParams {
    pub num_paths: u32,
    pub padding: [u32; 3],
}

const_assert_eq!(std::mem::size_of::<DispatchParams>(), 16);

/// Per-tile entry of the `jobs` array the tile kernels index by
/// `global_invocation_id.z`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TileJob {
    pub input_layer: u32,
    pub output_layer: u32,
    pub texel_size_m: [f32; 2],
}

const_assert_eq!(std::mem::size_of::<TileJob>(), 16);
