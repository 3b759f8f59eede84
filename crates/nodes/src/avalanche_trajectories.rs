use gpu_runtime::{
    ComputeShader, Context, DispatchParams, GpuTexture, StorageBuffer, SubmittedWork,
    create_uniform_buffer,
};
use node_graph::{
    InputData, Node, NodeRunFailure, RasterDimensions, SocketData, SocketSpec, SocketType,
};
use tiles::Aabb2;
use trajectories::{LayerKind, TrajectoryParams, TrajectorySettings, TrajectorySettingsError};

use crate::texture_nodes::region_texel_size_m;

pub(crate) fn settings_failure(error: TrajectorySettingsError) -> NodeRunFailure {
    NodeRunFailure::new(format!("invalid trajectory settings: {error}"))
}

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("region aabb", SocketType::RegionAabb),
    SocketSpec::new("normal texture", SocketType::Texture),
    SocketSpec::new("height texture", SocketType::Texture),
    SocketSpec::new("release point texture", SocketType::Texture),
];
const OUTPUTS: &[SocketSpec] = &[
    SocketSpec::new("raster dimensions", SocketType::RasterDimensions),
    SocketSpec::new("layer1_zdelta", SocketType::Buffer),
    SocketSpec::new("layer2_cellCounts", SocketType::Buffer),
    SocketSpec::new("layer3_travelLength", SocketType::Buffer),
    SocketSpec::new("layer4_travelAngle", SocketType::Buffer),
    SocketSpec::new("layer5_heightDifference", SocketType::Buffer),
    SocketSpec::new("storage buffer", SocketType::Buffer),
];

struct TrajectoryOutput {
    dimensions: RasterDimensions,
    /// Indexed by `LayerKind::index`.
    layers: Vec<StorageBuffer>,
}

/// Checks the raster sizes and returns the number of trajectory jobs per
/// run, which must fit the kernel's `u32` job index.
pub fn trajectory_job_count(
    input_size: (u32, u32),
    settings: &TrajectorySettings,
) -> Result<u32, NodeRunFailure> {
    let cells = u64::from(input_size.0) * u64::from(input_size.1);
    let jobs = cells * u64::from(settings.num_paths_per_release_cell);
    u32::try_from(jobs).map_err(|_| {
        NodeRunFailure::new(format!(
            "{} release cells with {} paths each exceed the maximum of {} trajectories per run",
            cells,
            settings.num_paths_per_release_cell,
            u32::MAX
        ))
    })
}

/// Traces avalanche paths from every release texel and accumulates their
/// statistics into five `u32` layers at `resolution_multiplier` times the
/// input resolution.
#[derive(Default)]
pub struct AvalancheTrajectoriesNode {
    settings: TrajectorySettings,
    result: Option<TrajectoryOutput>,
}

impl AvalancheTrajectoriesNode {
    pub fn new(settings: TrajectorySettings) -> Self {
        Self {
            settings,
            result: None,
        }
    }

    pub fn settings(&self) -> &TrajectorySettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: TrajectorySettings) {
        self.settings = settings;
    }

    pub fn layer(&self, kind: LayerKind) -> Option<&StorageBuffer> {
        self.result
            .as_ref()
            .map(|result| &result.layers[kind.index()])
    }
}

impl Node for AvalancheTrajectoriesNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output<'a>(&'a self, index: usize, _inputs: &InputData<'a>) -> Option<SocketData<'a>> {
        let result = self.result.as_ref()?;
        match index {
            0 => Some(SocketData::RasterDimensions(result.dimensions)),
            1..=5 => Some(SocketData::Buffer(&result.layers[index - 1])),
            6 => Some(SocketData::Buffer(&result.layers[LayerKind::ZDelta.index()])),
            _ => None,
        }
    }

    async fn run_impl(
        &mut self,
        context: &Context,
        inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        self.result = None;
        let aabb = inputs.get::<&Aabb2>("region aabb")?;
        let normals = inputs.get::<&GpuTexture>("normal texture")?;
        let heights = inputs.get::<&GpuTexture>("height texture")?;
        let release_points = inputs.get::<&GpuTexture>("release point texture")?;
        if normals.size() != heights.size() || normals.size() != release_points.size() {
            return Err(NodeRunFailure::new(format!(
                "Input textures have different sizes: normal {}x{}, height {}x{}, release {}x{}",
                normals.width(),
                normals.height(),
                heights.width(),
                heights.height(),
                release_points.width(),
                release_points.height()
            )));
        }
        if heights.format() != wgpu::TextureFormat::R32Float {
            return Err(NodeRunFailure::new(format!(
                "height texture has format {:?}, expected R32Float",
                heights.format()
            )));
        }
        self.settings.validate().map_err(settings_failure)?;
        let settings = self.settings;
        let (width, height) = heights.size();
        let num_jobs = trajectory_job_count((width, height), &settings)?;
        let multiplier = settings.resolution_multiplier;
        let dimensions = RasterDimensions::new(width * multiplier, height * multiplier);

        let device = context.device();
        let queue = context.queue();
        let layer_bytes = dimensions.texel_count() * 4;
        let binding_limit = u64::from(device.limits().max_storage_buffer_binding_size);
        if layer_bytes > binding_limit {
            return Err(NodeRunFailure::new(format!(
                "output layers of {}x{} texels need {layer_bytes} bytes, the device binds at most {binding_limit}",
                dimensions.width, dimensions.height
            )));
        }

        let layers: Vec<StorageBuffer> = LayerKind::ALL
            .iter()
            .map(|kind| {
                let len = if settings.active_layers.contains(*kind) {
                    dimensions.texel_count()
                } else {
                    1
                };
                StorageBuffer::new(
                    device,
                    &format!("nodes.trajectories.{}", kind.socket_name()),
                    len,
                    wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
                )
            })
            .collect();
        let release_cells = StorageBuffer::new(
            device,
            "nodes.trajectories.release_cells",
            2 * u64::from(width) * u64::from(height),
            wgpu::BufferUsages::empty(),
        );
        let release_count = StorageBuffer::new(
            device,
            "nodes.trajectories.release_count",
            1,
            wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        );
        let dispatch_args = StorageBuffer::new(
            device,
            "nodes.trajectories.dispatch_args",
            3,
            wgpu::BufferUsages::INDIRECT,
        );

        let pipelines = context.pipelines();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("nodes.trajectories.prepare"),
        });
        for kind in LayerKind::ALL {
            layers[kind.index()].record_fill(device, pipelines, &mut encoder, kind.initial_value());
        }
        release_count.record_fill(device, pipelines, &mut encoder, 0);
        let compaction = pipelines.bind_group(
            device,
            ComputeShader::ReleaseCompaction,
            &[
                wgpu::BindingResource::TextureView(release_points.view()),
                release_cells.buffer().as_entire_binding(),
                release_count.buffer().as_entire_binding(),
            ],
        );
        pipelines.dispatch(
            &mut encoder,
            ComputeShader::ReleaseCompaction,
            &compaction,
            ComputeShader::ReleaseCompaction.workgroups_for(width, height, 1),
        );
        let dispatch_params = create_uniform_buffer(
            device,
            "nodes.trajectories.dispatch_params",
            &DispatchParams {
                num_paths: settings.num_paths_per_release_cell,
                padding: [0; 3],
            },
        );
        let dispatch = pipelines.bind_group(
            device,
            ComputeShader::TrajectoryDispatch,
            &[
                dispatch_params.as_entire_binding(),
                release_count.buffer().as_entire_binding(),
                dispatch_args.buffer().as_entire_binding(),
            ],
        );
        pipelines.dispatch(
            &mut encoder,
            ComputeShader::TrajectoryDispatch,
            &dispatch,
            [1, 1, 1],
        );
        queue.submit(Some(encoder.finish()));

        let count_bytes = release_count.read(device, queue).await?;
        let num_release_cells = bytemuck::pod_read_unaligned::<u32>(&count_bytes[..4]);
        log::info!(
            "tracing {} paths from each of {num_release_cells} release cells, {} runs, output {}x{}",
            settings.num_paths_per_release_cell,
            settings.num_runs,
            dimensions.width,
            dimensions.height
        );
        if num_release_cells == 0 {
            log::warn!("release point texture marks no cells, trajectory layers stay empty");
        }
        log::debug!("at most {num_jobs} trajectory jobs per run");

        let texel_size_m = region_texel_size_m(aabb, width, height) / multiplier as f32;
        let num_runs = if num_release_cells == 0 {
            0
        } else {
            settings.num_runs
        };
        for run in 0..num_runs {
            let params = create_uniform_buffer(
                device,
                "nodes.trajectories.params",
                &TrajectoryParams::new(&settings, (width, height), texel_size_m, run),
            );
            let mut resources = vec![
                params.as_entire_binding(),
                wgpu::BindingResource::TextureView(heights.view()),
                wgpu::BindingResource::TextureView(normals.view()),
                release_cells.buffer().as_entire_binding(),
                release_count.buffer().as_entire_binding(),
            ];
            resources.extend(layers.iter().map(|layer| layer.buffer().as_entire_binding()));
            let bind_group = pipelines.bind_group(device, ComputeShader::Trajectories, &resources);
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("nodes.trajectories.run"),
            });
            pipelines.dispatch_indirect(
                &mut encoder,
                ComputeShader::Trajectories,
                &bind_group,
                dispatch_args.buffer(),
            );
            queue.submit(Some(encoder.finish()));
            SubmittedWork::new(queue).await?;
            log::debug!("trajectory run {} of {} finished", run + 1, settings.num_runs);
        }

        self.result = Some(TrajectoryOutput { dimensions, layers });
        Ok(())
    }
}
