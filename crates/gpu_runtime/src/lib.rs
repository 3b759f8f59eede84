//! GPU plumbing shared by every compute node.
//!
//! - `context`: adapter and device selection, limit checks, error callbacks.
//! - `executor`: drives node futures while ticking the device.
//! - `tasks`: futures over queue completion and buffer mapping.
//! - `resources`: textures, storage buffers and readback helpers.
//! - `pipelines`: the compute kernels and their bind group layouts.
//! - `uniforms`: host mirrors of the kernels' uniform blocks.

mod context;
mod executor;
mod pipelines;
mod resources;
mod tasks;
mod uniforms;

pub use context::{
    Context, ContextDescriptor, ContextError, RECOMMENDED_TEXTURE_ARRAY_LAYERS,
    REQUIRED_STORAGE_BUFFER_BINDING_SIZE, check_limits,
};
pub use executor::{Executor, TICK_INTERVAL, block_on_local};
pub use pipelines::{ComputePipeline, ComputeShader, PipelineManager, linear_workgroups};
pub use resources::{
    GpuTexture, MAX_TEXTURE_DIMENSION, StorageBuffer, TextureRead, create_storage_buffer_init,
    create_uniform_buffer, mip_level_count, padded_bytes_per_row, read_buffer,
    read_texture_layer, strip_row_padding,
};
pub use tasks::{BufferRead, GpuTaskError, SubmittedWork};
pub use uniforms::{
    ColorizeParams, DispatchParams, DownsampleParams, FillParams, ReleasePointParams, SnowParams,
    TextureNormalsParams, TileJob, UpsampleParams,
};

#[cfg(test)]
mod tests;
#[cfg(test)]
mod wgsl_tests;
