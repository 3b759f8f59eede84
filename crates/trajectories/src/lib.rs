//! Avalanche trajectory model shared by the GPU kernels and their CPU
//! reference.
//!
//! `TrajectoryParams` is the uniform the trajectory kernel reads; `simulate`
//! runs the same walk on the CPU.

mod color_ramp;
mod encoding;
mod friction;
mod model;
mod params;
mod rng;
mod simulate;
mod terrain;

pub use color_ramp::{
    Colorize, RAMP_BIN_COUNT, RAMP_PALETTE, normalize_to_bounds, palette_rgba_f32, ramp_bin,
    ramp_color, smoothstep,
};
pub use encoding::{BufferEncoding, TRAVEL_ANGLE_EMPTY, decode_ordered_f32, encode_ordered_f32};
pub use friction::{SAMOS_B, SAMOS_KAPPA, SAMOS_R, SAMOS_RS0, friction_per_unit_mass};
pub use model::{
    ActiveLayers, FrictionModel, LayerKind, Model2Settings, ModelCodeError, PhysicsModel,
    TrajectorySettings, TrajectorySettingsError,
};
pub use params::{TrajectoryParams, indirect_dispatch_args};
pub use rng::{PathRng, path_seed, pcg_hash};
pub use simulate::{
    D8_OFFSETS, Simulation, SimulationReport, Termination, TrajectoryLayers, normalize_or_zero,
    simulate,
};
pub use terrain::{TerrainRasters, central_difference_normal, normal_texels, quantize_normal};
