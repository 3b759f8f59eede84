use std::collections::HashMap;

/// Every compute kernel the node graph dispatches. All of them use a single
/// bind group at index 0 and the entry point `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeShader {
    HeightDecode,
    TextureNormals,
    TileNormals,
    TileD8,
    TileSnow,
    ReleasePoints,
    DownsampleR16,
    DownsampleRgba8,
    UpsampleRgba8,
    FillU32,
    ReleaseCompaction,
    TrajectoryDispatch,
    Trajectories,
    BufferToTexture,
    Mipmap,
}

impl ComputeShader {
    pub const ALL: [ComputeShader; 15] = [
        ComputeShader::HeightDecode,
        ComputeShader::TextureNormals,
        ComputeShader::TileNormals,
        ComputeShader::TileD8,
        ComputeShader::TileSnow,
        ComputeShader::ReleasePoints,
        ComputeShader::DownsampleR16,
        ComputeShader::DownsampleRgba8,
        ComputeShader::UpsampleRgba8,
        ComputeShader::FillU32,
        ComputeShader::ReleaseCompaction,
        ComputeShader::TrajectoryDispatch,
        ComputeShader::Trajectories,
        ComputeShader::BufferToTexture,
        ComputeShader::Mipmap,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ComputeShader::HeightDecode => "gpu_runtime.height_decode",
            ComputeShader::TextureNormals => "gpu_runtime.texture_normals",
            ComputeShader::TileNormals => "gpu_runtime.tile_normals",
            ComputeShader::TileD8 => "gpu_runtime.tile_d8",
            ComputeShader::TileSnow => "gpu_runtime.tile_snow",
            ComputeShader::ReleasePoints => "gpu_runtime.release_points",
            ComputeShader::DownsampleR16 => "gpu_runtime.downsample_r16",
            ComputeShader::DownsampleRgba8 => "gpu_runtime.downsample_rgba8",
            ComputeShader::UpsampleRgba8 => "gpu_runtime.upsample_rgba8",
            ComputeShader::FillU32 => "gpu_runtime.fill_u32",
            ComputeShader::ReleaseCompaction => "gpu_runtime.release_compaction",
            ComputeShader::TrajectoryDispatch => "gpu_runtime.trajectory_dispatch",
            ComputeShader::Trajectories => "gpu_runtime.trajectories",
            ComputeShader::BufferToTexture => "gpu_runtime.buffer_to_texture",
            ComputeShader::Mipmap => "gpu_runtime.mipmap",
        }
    }

    /// Complete WGSL module, with the shared snippets prepended.
    pub fn source(self) -> &'static str {
        match self {
            ComputeShader::HeightDecode => include_str!("shaders/height_decode.wgsl"),
            ComputeShader::TextureNormals => include_str!("shaders/texture_normals.wgsl"),
            ComputeShader::TileNormals => concat!(
                include_str!("shaders/tile_common.wgsl"),
                include_str!("shaders/tile_normals.wgsl")
            ),
            ComputeShader::TileD8 => concat!(
                include_str!("shaders/tile_common.wgsl"),
                include_str!("shaders/tile_d8.wgsl")
            ),
            ComputeShader::TileSnow => concat!(
                include_str!("shaders/tile_common.wgsl"),
                include_str!("shaders/tile_snow.wgsl")
            ),
            ComputeShader::ReleasePoints => include_str!("shaders/release_points.wgsl"),
            ComputeShader::DownsampleR16 => concat!(
                include_str!("shaders/hash_map.wgsl"),
                include_str!("shaders/downsample.wgsl"),
                include_str!("shaders/downsample_r16.wgsl")
            ),
            ComputeShader::DownsampleRgba8 => concat!(
                include_str!("shaders/hash_map.wgsl"),
                include_str!("shaders/downsample.wgsl"),
                include_str!("shaders/downsample_rgba8.wgsl")
            ),
            ComputeShader::UpsampleRgba8 => include_str!("shaders/upsample_rgba8.wgsl"),
            ComputeShader::FillU32 => include_str!("shaders/fill_u32.wgsl"),
            ComputeShader::ReleaseCompaction => include_str!("shaders/release_compaction.wgsl"),
            ComputeShader::TrajectoryDispatch => include_str!("shaders/trajectory_dispatch.wgsl"),
            ComputeShader::Trajectories => include_str!("shaders/trajectories.wgsl"),
            ComputeShader::BufferToTexture => include_str!("shaders/buffer_to_texture.wgsl"),
            ComputeShader::Mipmap => include_str!("shaders/mipmap.wgsl"),
        }
    }

    pub fn workgroup_size(self) -> [u32; 3] {
        match self {
            ComputeShader::HeightDecode
            | ComputeShader::TextureNormals
            | ComputeShader::ReleasePoints
            | ComputeShader::ReleaseCompaction
            | ComputeShader::BufferToTexture => [16, 16, 1],
            ComputeShader::TileNormals
            | ComputeShader::TileD8
            | ComputeShader::TileSnow
            | ComputeShader::DownsampleR16
            | ComputeShader::DownsampleRgba8
            | ComputeShader::UpsampleRgba8
            | ComputeShader::Mipmap => [8, 8, 1],
            ComputeShader::FillU32 => [256, 1, 1],
            ComputeShader::Trajectories => [64, 1, 1],
            ComputeShader::TrajectoryDispatch => [1, 1, 1],
        }
    }

    /// Workgroup count covering a `width` x `height` x `depth` grid.
    pub fn workgroups_for(self, width: u32, height: u32, depth: u32) -> [u32; 3] {
        let [x, y, z] = self.workgroup_size();
        [width.div_ceil(x), height.div_ceil(y), depth.div_ceil(z)]
    }

    pub fn layout_entries(self) -> Vec<wgpu::BindGroupLayoutEntry> {
        use wgpu::TextureFormat::{R32Float, Rgba8Unorm};
        use wgpu::TextureViewDimension::{D2, D2Array};

        match self {
            ComputeShader::HeightDecode => vec![
                texture(0, float_sample(), D2),
                storage_texture(1, R32Float, D2),
            ],
            ComputeShader::TextureNormals => vec![
                uniform(0),
                texture(1, float_sample(), D2),
                storage_texture(2, Rgba8Unorm, D2),
            ],
            ComputeShader::TileNormals | ComputeShader::TileD8 => vec![
                texture(0, wgpu::TextureSampleType::Uint, D2Array),
                storage(1, true),
                storage_texture(2, Rgba8Unorm, D2Array),
            ],
            ComputeShader::TileSnow => vec![
                uniform(0),
                texture(1, wgpu::TextureSampleType::Uint, D2Array),
                storage(2, true),
                storage_texture(3, Rgba8Unorm, D2Array),
            ],
            ComputeShader::ReleasePoints => vec![
                uniform(0),
                texture(1, float_sample(), D2),
                storage_texture(2, Rgba8Unorm, D2),
            ],
            ComputeShader::DownsampleR16 | ComputeShader::DownsampleRgba8 => {
                let sample_type = if self == ComputeShader::DownsampleR16 {
                    wgpu::TextureSampleType::Uint
                } else {
                    float_sample()
                };
                vec![
                    uniform(0),
                    storage(1, true),
                    storage(2, true),
                    storage(3, true),
                    texture(4, sample_type, D2Array),
                    storage(5, false),
                ]
            }
            ComputeShader::UpsampleRgba8 => vec![
                uniform(0),
                storage(1, true),
                texture(2, float_sample(), D2Array),
                storage_texture(3, Rgba8Unorm, D2Array),
            ],
            ComputeShader::FillU32 => vec![uniform(0), storage(1, false)],
            ComputeShader::ReleaseCompaction => vec![
                texture(0, float_sample(), D2),
                storage(1, false),
                storage(2, false),
            ],
            ComputeShader::TrajectoryDispatch => {
                vec![uniform(0), storage(1, true), storage(2, false)]
            }
            ComputeShader::Trajectories => {
                let mut entries = vec![
                    uniform(0),
                    texture(1, float_sample(), D2),
                    texture(2, float_sample(), D2),
                    storage(3, true),
                    storage(4, true),
                ];
                entries.extend((5..10).map(|binding| storage(binding, false)));
                entries
            }
            ComputeShader::BufferToTexture => vec![
                uniform(0),
                storage(1, true),
                storage(2, true),
                storage_texture(3, Rgba8Unorm, D2),
            ],
            ComputeShader::Mipmap => vec![
                texture(0, float_sample(), D2),
                storage_texture(1, Rgba8Unorm, D2),
            ],
        }
    }
}

fn float_sample() -> wgpu::TextureSampleType {
    wgpu::TextureSampleType::Float { filterable: false }
}

fn uniform(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture(
    binding: u32,
    sample_type: wgpu::TextureSampleType,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn storage_texture(
    binding: u32,
    format: wgpu::TextureFormat,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension,
        },
        count: None,
    }
}

pub struct ComputePipeline {
    pub pipeline: wgpu::ComputePipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

/// Compiles every `ComputeShader` once when the context is created.
pub struct PipelineManager {
    pipelines: HashMap<ComputeShader, ComputePipeline>,
}

impl PipelineManager {
    pub fn new(device: &wgpu::Device) -> Self {
        let pipelines = ComputeShader::ALL
            .iter()
            .map(|&shader| (shader, create_pipeline(device, shader)))
            .collect();
        log::debug!("compiled {} compute pipelines", ComputeShader::ALL.len());
        Self { pipelines }
    }

    pub fn get(&self, shader: ComputeShader) -> &ComputePipeline {
        self.pipelines
            .get(&shader)
            .unwrap_or_else(|| panic!("pipeline {shader:?} was not compiled"))
    }

    /// Binds `resources` in order, starting at binding 0.
    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        shader: ComputeShader,
        resources: &[wgpu::BindingResource<'_>],
    ) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry<'_>> = resources
            .iter()
            .enumerate()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: resource.clone(),
            })
            .collect();
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(shader.label()),
            layout: &self.get(shader).bind_group_layout,
            entries: &entries,
        })
    }

    /// Records one compute pass dispatching `workgroups`.
    pub fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        shader: ComputeShader,
        bind_group: &wgpu::BindGroup,
        workgroups: [u32; 3],
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(shader.label()),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.get(shader).pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
    }

    /// Records one compute pass whose workgroup count is read from
    /// `indirect` at offset 0.
    pub fn dispatch_indirect(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        shader: ComputeShader,
        bind_group: &wgpu::BindGroup,
        indirect: &wgpu::Buffer,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(shader.label()),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.get(shader).pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups_indirect(indirect, 0);
    }
}

fn create_pipeline(device: &wgpu::Device, shader: ComputeShader) -> ComputePipeline {
    let label = shader.label();
    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &shader.layout_entries(),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&bind_group_layout],
        immediate_size: 0,
    });
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(shader.source().into()),
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });
    ComputePipeline {
        pipeline,
        bind_group_layout,
    }
}

/// Linear dispatch size for `count` invocations of 256, spilling into y
/// past the per-dimension limit.
pub fn linear_workgroups(count: u32) -> [u32; 3] {
    let groups = count.div_ceil(256);
    if groups == 0 {
        return [0, 0, 1];
    }
    let x = groups.min(65_535);
    [x, groups.div_ceil(x), 1]
}
