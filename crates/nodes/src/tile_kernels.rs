//! Per-tile kernels over an R16Uint height tile array: surface normals,
//! D8 flow directions and snow cover. All three write one RGBA8 layer per
//! input tile and publish a fresh hash map for the output array.

use glam::Vec2;
use gpu_runtime::{
    ComputeShader, Context, SnowParams, SubmittedWork, TileJob, create_storage_buffer_init,
    create_uniform_buffer,
};
use node_graph::{InputData, Node, NodeRunFailure, SocketData, SocketSpec, SocketType};
use tiles::{
    GpuHashMap, TileId, TileStorageConfig, TileStorageFormat, TileStorageTexture,
    TileStoreError, ground_scale_factor, tile_bounds,
};
use trajectories::{D8_OFFSETS, smoothstep};

/// Index written for cells without a lower neighbour.
pub const D8_PIT: u32 = 8;

/// Metric spacing of neighbouring texels of a tile. Tiles share their
/// border texels, so `width` texels span `width - 1` intervals.
pub fn tile_texel_size_m(id: TileId, width: u32, height: u32) -> Vec2 {
    let bounds = tile_bounds(id);
    let scale = ground_scale_factor(bounds.center().y);
    let size = bounds.size();
    Vec2::new(
        (size.x / f64::from(width.max(2) - 1) * scale) as f32,
        (size.y / f64::from(height.max(2) - 1) * scale) as f32,
    )
}

/// Steepest-descent neighbour of `(x, y)` in `D8_OFFSETS` order, or
/// [`D8_PIT`]. Diagonal drops are divided by `sqrt(2)`.
pub fn d8_direction(heights: &[f32], width: u32, height: u32, x: u32, y: u32) -> u32 {
    let at = |x: i32, y: i32| heights[(y as u32 * width + x as u32) as usize];
    let centre = at(x as i32, y as i32);
    let mut best = D8_PIT;
    let mut best_slope = 0.0f32;
    for (index, offset) in D8_OFFSETS.iter().enumerate() {
        let nx = x as i32 + offset.x;
        let ny = y as i32 + offset.y;
        if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
            continue;
        }
        let distance = if offset.x != 0 && offset.y != 0 {
            std::f32::consts::SQRT_2
        } else {
            1.0
        };
        let slope = (centre - at(nx, ny)) / distance;
        if slope > best_slope {
            best_slope = slope;
            best = index as u32;
        }
    }
    best
}

/// Parameters of the snow cover kernel. Angles in degrees, altitudes in
/// metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnowSettings {
    pub capacity: u32,
    pub min_angle: f32,
    pub max_angle: f32,
    pub angle_blend: f32,
    pub min_altitude: f32,
    /// Random variation of the altitude limit, spread over +-half.
    pub altitude_variation: f32,
    pub altitude_blend: f32,
    pub specular: f32,
}

impl Default for SnowSettings {
    fn default() -> Self {
        Self {
            capacity: 256,
            min_angle: 0.0,
            max_angle: 45.0,
            angle_blend: 0.0,
            min_altitude: 1000.0,
            altitude_variation: 200.0,
            altitude_blend: 200.0,
            specular: 1.0,
        }
    }
}

impl SnowSettings {
    pub fn params(&self) -> SnowParams {
        SnowParams {
            min_angle: self.min_angle,
            max_angle: self.max_angle,
            angle_blend: self.angle_blend,
            min_altitude: self.min_altitude,
            altitude_variation: self.altitude_variation,
            altitude_blend: self.altitude_blend,
            specular: self.specular,
            padding: 0.0,
        }
    }
}

fn blend_step(edge: f32, blend: f32, value: f32) -> f32 {
    if blend <= 0.0 {
        return if value >= edge { 1.0 } else { 0.0 };
    }
    smoothstep(edge - blend, edge, value)
}

/// Snow alpha of one texel; `jitter` is in `[-0.5, 0.5)`.
pub fn snow_alpha(settings: &SnowSettings, slope_degrees: f32, altitude: f32, jitter: f32) -> f32 {
    let angle_alpha = blend_step(settings.min_angle, settings.angle_blend, slope_degrees)
        * (1.0
            - blend_step(
                settings.max_angle + settings.angle_blend,
                settings.angle_blend,
                slope_degrees,
            ));
    let limit = settings.min_altitude + settings.altitude_variation * jitter;
    angle_alpha * blend_step(limit, settings.altitude_blend, altitude)
}

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("tile ids", SocketType::TileIdList),
    SocketSpec::new("hash map", SocketType::HashMap),
    SocketSpec::new("height textures", SocketType::TileStorage),
];
const NORMAL_OUTPUTS: &[SocketSpec] = &[
    SocketSpec::new("hash map", SocketType::HashMap),
    SocketSpec::new("normal textures", SocketType::TileStorage),
];
const D8_OUTPUTS: &[SocketSpec] = &[
    SocketSpec::new("hash map", SocketType::HashMap),
    SocketSpec::new("d8 direction textures", SocketType::TileStorage),
];
const SNOW_OUTPUTS: &[SocketSpec] = &[
    SocketSpec::new("hash map", SocketType::HashMap),
    SocketSpec::new("snow textures", SocketType::TileStorage),
];

#[derive(Debug, Default)]
struct TileKernelOutput {
    hash_map: Option<GpuHashMap>,
    storage: Option<TileStorageTexture>,
}

impl TileKernelOutput {
    fn socket(&self, index: usize) -> Option<SocketData<'_>> {
        match index {
            0 => self.hash_map.as_ref().map(SocketData::HashMap),
            1 => self.storage.as_ref().map(SocketData::TileStorage),
            _ => None,
        }
    }

    /// Dispatches `shader` once per tile of `inputs`, writing layer `i` of
    /// a new RGBA8 array for tile `i`.
    async fn run(
        &mut self,
        context: &Context,
        inputs: &InputData<'_>,
        shader: ComputeShader,
        capacity: u32,
        settings: Option<&wgpu::Buffer>,
    ) -> Result<(), NodeRunFailure> {
        self.hash_map = None;
        self.storage = None;
        let ids = inputs.get::<&[TileId]>("tile ids")?;
        let input_map = inputs.get::<&GpuHashMap>("hash map")?;
        let heights = inputs.get::<&TileStorageTexture>("height textures")?;
        if heights.format() != TileStorageFormat::R16Uint {
            return Err(NodeRunFailure::new(format!(
                "height textures must be R16Uint, got {:?}",
                heights.format()
            )));
        }
        if ids.is_empty() {
            return Err(NodeRunFailure::new("received no tile ids"));
        }
        if ids.len() > capacity as usize {
            return Err(TileStoreError::CapacityExceeded {
                capacity,
                requested: ids.len() as u32,
            }
            .into());
        }

        let (width, height) = (heights.width(), heights.height());
        let mut storage = TileStorageTexture::new(
            context.device(),
            TileStorageConfig::rgba8_storage(width, height, capacity),
        )?;
        let mut hash_map = GpuHashMap::new(context.device());
        let mut jobs = Vec::with_capacity(ids.len());
        for (output_layer, id) in ids.iter().enumerate() {
            let input_layer = input_map.value_at(*id).ok_or_else(|| {
                NodeRunFailure::new(format!("tile {id} is missing from the input hash map"))
            })?;
            storage.reserve_at(output_layer as u32)?;
            hash_map.store(*id, output_layer as u32);
            jobs.push(TileJob {
                input_layer,
                output_layer: output_layer as u32,
                texel_size_m: tile_texel_size_m(*id, width, height).to_array(),
            });
        }
        hash_map.update_gpu_data(context.queue());

        let device = context.device();
        let jobs_buffer = create_storage_buffer_init(device, "nodes.tile_kernel.jobs", &jobs);
        let mut resources = Vec::with_capacity(4);
        if let Some(settings) = settings {
            resources.push(settings.as_entire_binding());
        }
        resources.push(wgpu::BindingResource::TextureView(heights.view()));
        resources.push(jobs_buffer.as_entire_binding());
        resources.push(wgpu::BindingResource::TextureView(storage.view()));
        let pipelines = context.pipelines();
        let bind_group = pipelines.bind_group(device, shader, &resources);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(shader.label()),
        });
        pipelines.dispatch(
            &mut encoder,
            shader,
            &bind_group,
            shader.workgroups_for(width, height, jobs.len() as u32),
        );
        context.queue().submit(Some(encoder.finish()));
        SubmittedWork::new(context.queue()).await?;
        log::debug!("{} finished for {} tiles", shader.label(), jobs.len());

        self.hash_map = Some(hash_map);
        self.storage = Some(storage);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileKernelSettings {
    pub capacity: u32,
}

impl Default for TileKernelSettings {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Central-difference normals, quantised as `n * 0.5 + 0.5`.
#[derive(Debug, Default)]
pub struct ComputeNormalsNode {
    settings: TileKernelSettings,
    output: TileKernelOutput,
}

impl ComputeNormalsNode {
    pub fn new(settings: TileKernelSettings) -> Self {
        Self {
            settings,
            output: TileKernelOutput::default(),
        }
    }
}

impl Node for ComputeNormalsNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        NORMAL_OUTPUTS
    }

    fn output<'a>(&'a self, index: usize, _inputs: &InputData<'a>) -> Option<SocketData<'a>> {
        self.output.socket(index)
    }

    async fn run_impl(
        &mut self,
        context: &Context,
        inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        self.output
            .run(
                context,
                inputs,
                ComputeShader::TileNormals,
                self.settings.capacity,
                None,
            )
            .await
    }
}

/// Steepest-descent direction index per texel, stored as `index / 255` in
/// the red channel.
#[derive(Debug, Default)]
pub struct ComputeD8DirectionsNode {
    settings: TileKernelSettings,
    output: TileKernelOutput,
}

impl ComputeD8DirectionsNode {
    pub fn new(settings: TileKernelSettings) -> Self {
        Self {
            settings,
            output: TileKernelOutput::default(),
        }
    }
}

impl Node for ComputeD8DirectionsNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        D8_OUTPUTS
    }

    fn output<'a>(&'a self, index: usize, _inputs: &InputData<'a>) -> Option<SocketData<'a>> {
        self.output.socket(index)
    }

    async fn run_impl(
        &mut self,
        context: &Context,
        inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        self.output
            .run(
                context,
                inputs,
                ComputeShader::TileD8,
                self.settings.capacity,
                None,
            )
            .await
    }
}

#[derive(Debug, Default)]
pub struct ComputeSnowNode {
    settings: SnowSettings,
    output: TileKernelOutput,
}

impl ComputeSnowNode {
    pub fn new(settings: SnowSettings) -> Self {
        Self {
            settings,
            output: TileKernelOutput::default(),
        }
    }

    pub fn settings(&self) -> &SnowSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: SnowSettings) {
        self.settings = settings;
    }
}

impl Node for ComputeSnowNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        SNOW_OUTPUTS
    }

    fn output<'a>(&'a self, index: usize, _inputs: &InputData<'a>) -> Option<SocketData<'a>> {
        self.output.socket(index)
    }

    async fn run_impl(
        &mut self,
        context: &Context,
        inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        let params = create_uniform_buffer(
            context.device(),
            "nodes.snow.settings",
            &self.settings.params(),
        );
        self.output
            .run(
                context,
                inputs,
                ComputeShader::TileSnow,
                self.settings.capacity,
                Some(&params),
            )
            .await
    }
}
