use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use static_assertions::const_assert_eq;

use crate::model::TrajectorySettings;

/// Uniform block of `trajectories.wgsl`; field order mirrors `TrajectoryParams`
/// in the shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TrajectoryParams {
    pub input_size: [u32; 2],
    pub output_size: [u32; 2],
    pub texel_size_m: [f32; 2],
    pub resolution_multiplier: u32,
    pub num_steps: u32,
    pub step_length: f32,
    pub num_paths: u32,
    pub random_contribution: f32,
    pub persistence_contribution: f32,
    pub run_seed: u32,
    pub physics_model: u32,
    pub friction_model: u32,
    pub runout_alpha: f32,
    pub gravity: f32,
    pub mass: f32,
    pub friction_coeff: f32,
    pub drag_coeff: f32,
    pub slab_thickness: f32,
    pub density: f32,
    pub min_shear_stress: f32,
    pub active_layers: u32,
}

const_assert_eq!(std::mem::size_of::<TrajectoryParams>(), 96);

impl TrajectoryParams {
    /// `output_texel_size_m` is the metric size of one output texel.
    pub fn new(
        settings: &TrajectorySettings,
        input_size: (u32, u32),
        output_texel_size_m: Vec2,
        run: u32,
    ) -> Self {
        let multiplier = settings.resolution_multiplier;
        let model2 = &settings.model2;
        Self {
            input_size: [input_size.0, input_size.1],
            output_size: [input_size.0 * multiplier, input_size.1 * multiplier],
            texel_size_m: output_texel_size_m.to_array(),
            resolution_multiplier: multiplier,
            num_steps: settings.num_steps,
            step_length: settings.step_length,
            num_paths: settings.num_paths_per_release_cell,
            random_contribution: settings.random_contribution,
            persistence_contribution: settings.persistence_contribution,
            run_seed: settings.random_seed.wrapping_add(run),
            physics_model: settings.physics_model.gpu_index(),
            friction_model: settings.friction_model.code() as u32,
            runout_alpha: settings.runout_flowpy_alpha,
            gravity: model2.gravity,
            mass: model2.mass,
            friction_coeff: model2.friction_coeff,
            drag_coeff: model2.drag_coeff,
            slab_thickness: model2.slab_thickness,
            density: model2.density,
            min_shear_stress: model2.min_shear_stress,
            active_layers: settings.active_layers.bits(),
        }
    }

    pub fn output_texel_count(&self) -> u64 {
        self.output_size[0] as u64 * self.output_size[1] as u64
    }
}

/// Indirect dispatch arguments for `jobs` trajectories at 64 threads per
/// workgroup. Grids wider than 65535 workgroups spill into y.
pub fn indirect_dispatch_args(jobs: u32) -> [u32; 3] {
    let workgroups = jobs.div_ceil(64);
    [workgroups.min(65_535), workgroups.div_ceil(65_535), 1]
}
