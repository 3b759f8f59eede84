//! Nodes over single 2-D textures covering a region: height decoding,
//! normals and release point candidates.

use glam::{DVec2, Vec2, Vec3};
use gpu_runtime::{
    ComputeShader, Context, GpuTexture, ReleasePointParams, SubmittedWork, TextureNormalsParams,
    create_uniform_buffer,
};
use node_graph::{InputData, Node, NodeRunFailure, SocketData, SocketSpec, SocketType};
use tiles::{Aabb2, ground_scale_factor};

/// Metric size of one texel of a `width` x `height` raster spanning `aabb`,
/// scaled to ground distance at the region's centre.
pub fn region_texel_size_m(aabb: &Aabb2, width: u32, height: u32) -> Vec2 {
    let size = aabb.size() / DVec2::new(f64::from(width), f64::from(height));
    (size * ground_scale_factor(aabb.center().y)).as_vec2()
}

fn dispatch_texture_pass(
    context: &Context,
    shader: ComputeShader,
    resources: &[wgpu::BindingResource<'_>],
    size: (u32, u32),
) {
    let device = context.device();
    let pipelines = context.pipelines();
    let bind_group = pipelines.bind_group(device, shader, resources);
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some(shader.label()),
    });
    pipelines.dispatch(
        &mut encoder,
        shader,
        &bind_group,
        shader.workgroups_for(size.0, size.1, 1),
    );
    context.queue().submit(Some(encoder.finish()));
}

fn expect_format(
    texture: &GpuTexture,
    socket: &str,
    format: wgpu::TextureFormat,
) -> Result<(), NodeRunFailure> {
    if texture.format() != format {
        return Err(NodeRunFailure::new(format!(
            "input '{socket}' has format {:?}, expected {format:?}",
            texture.format()
        )));
    }
    Ok(())
}

fn output_usage() -> wgpu::TextureUsages {
    wgpu::TextureUsages::STORAGE_BINDING
        | wgpu::TextureUsages::TEXTURE_BINDING
        | wgpu::TextureUsages::COPY_SRC
}

const DECODE_INPUTS: &[SocketSpec] = &[SocketSpec::new("encoded texture", SocketType::Texture)];
const DECODE_OUTPUTS: &[SocketSpec] = &[SocketSpec::new("decoded texture", SocketType::Texture)];

/// RGBA8 terrain-RGB heights to an R32Float texture in metres.
#[derive(Default)]
pub struct DecodeHeightTextureNode {
    decoded: Option<GpuTexture>,
}

impl DecodeHeightTextureNode {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Node for DecodeHeightTextureNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        DECODE_INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        DECODE_OUTPUTS
    }

    fn output<'a>(&'a self, index: usize, _inputs: &InputData<'a>) -> Option<SocketData<'a>> {
        match index {
            0 => self.decoded.as_ref().map(SocketData::Texture),
            _ => None,
        }
    }

    async fn run_impl(
        &mut self,
        context: &Context,
        inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        self.decoded = None;
        let encoded = inputs.get::<&GpuTexture>("encoded texture")?;
        expect_format(encoded, "encoded texture", wgpu::TextureFormat::Rgba8Unorm)?;
        let (width, height) = encoded.size();
        let decoded = GpuTexture::new(
            context.device(),
            "nodes.decode_height_texture.output",
            width,
            height,
            wgpu::TextureFormat::R32Float,
            output_usage(),
            1,
        );
        dispatch_texture_pass(
            context,
            ComputeShader::HeightDecode,
            &[
                wgpu::BindingResource::TextureView(encoded.view()),
                wgpu::BindingResource::TextureView(decoded.view()),
            ],
            (width, height),
        );
        SubmittedWork::new(context.queue()).await?;
        log::debug!("decoded {width}x{height} height texture");
        self.decoded = Some(decoded);
        Ok(())
    }
}

const NORMALS_INPUTS: &[SocketSpec] = &[
    SocketSpec::new("height texture", SocketType::Texture),
    SocketSpec::new("region aabb", SocketType::RegionAabb),
];
const NORMALS_OUTPUTS: &[SocketSpec] = &[SocketSpec::new("normal texture", SocketType::Texture)];

/// Central-difference normals of an R32Float height texture, packed as
/// `n * 0.5 + 0.5` into RGBA8.
#[derive(Default)]
pub struct ComputeTextureNormalsNode {
    normals: Option<GpuTexture>,
}

impl ComputeTextureNormalsNode {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Node for ComputeTextureNormalsNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        NORMALS_INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        NORMALS_OUTPUTS
    }

    fn output<'a>(&'a self, index: usize, _inputs: &InputData<'a>) -> Option<SocketData<'a>> {
        match index {
            0 => self.normals.as_ref().map(SocketData::Texture),
            _ => None,
        }
    }

    async fn run_impl(
        &mut self,
        context: &Context,
        inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        self.normals = None;
        let heights = inputs.get::<&GpuTexture>("height texture")?;
        let aabb = inputs.get::<&Aabb2>("region aabb")?;
        expect_format(heights, "height texture", wgpu::TextureFormat::R32Float)?;
        let (width, height) = heights.size();
        let texel_size_m = region_texel_size_m(aabb, width, height);
        let params = create_uniform_buffer(
            context.device(),
            "nodes.texture_normals.params",
            &TextureNormalsParams {
                texel_size_m: texel_size_m.to_array(),
                padding: [0.0; 2],
            },
        );
        let normals = GpuTexture::new(
            context.device(),
            "nodes.texture_normals.output",
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
            output_usage(),
            1,
        );
        dispatch_texture_pass(
            context,
            ComputeShader::TextureNormals,
            &[
                params.as_entire_binding(),
                wgpu::BindingResource::TextureView(heights.view()),
                wgpu::BindingResource::TextureView(normals.view()),
            ],
            (width, height),
        );
        SubmittedWork::new(context.queue()).await?;
        log::debug!(
            "computed {width}x{height} normals, texel size {:.2}x{:.2} m",
            texel_size_m.x,
            texel_size_m.y
        );
        self.normals = Some(normals);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReleasePointSettings {
    /// Degrees.
    pub min_slope_angle: f32,
    pub max_slope_angle: f32,
    pub sampling_interval: (u32, u32),
}

impl Default for ReleasePointSettings {
    fn default() -> Self {
        Self {
            min_slope_angle: 30.0,
            max_slope_angle: 45.0,
            sampling_interval: (1, 1),
        }
    }
}

impl ReleasePointSettings {
    pub fn validate(&self) -> Result<(), NodeRunFailure> {
        let (dx, dy) = self.sampling_interval;
        if dx == 0 || dy == 0 {
            return Err(NodeRunFailure::new(format!(
                "sampling interval must be at least 1, got {dx}x{dy}"
            )));
        }
        Ok(())
    }

    pub fn params(&self) -> ReleasePointParams {
        ReleasePointParams {
            min_slope_angle: self.min_slope_angle.to_radians(),
            max_slope_angle: self.max_slope_angle.to_radians(),
            sampling_interval: [self.sampling_interval.0, self.sampling_interval.1],
        }
    }
}

/// Host mirror of the release point kernel over quantised normals.
pub fn release_point_mask(
    normals: &[[u8; 4]],
    width: u32,
    height: u32,
    settings: &ReleasePointSettings,
) -> Vec<bool> {
    assert_eq!(normals.len(), (width * height) as usize);
    let params = settings.params();
    let (dx, dy) = settings.sampling_interval;
    let mut mask = Vec::with_capacity(normals.len());
    for y in 0..height {
        for x in 0..width {
            let [r, g, b, _] = normals[(y * width + x) as usize];
            let normal = Vec3::new(f32::from(r), f32::from(g), f32::from(b)) / 255.0 * 2.0
                - Vec3::ONE;
            let slope = normal.z.clamp(-1.0, 1.0).acos();
            let sampled = x % dx == 0 && y % dy == 0;
            mask.push(
                sampled && slope >= params.min_slope_angle && slope <= params.max_slope_angle,
            );
        }
    }
    mask
}

const RELEASE_INPUTS: &[SocketSpec] = &[SocketSpec::new("normal texture", SocketType::Texture)];
const RELEASE_OUTPUTS: &[SocketSpec] =
    &[SocketSpec::new("release point texture", SocketType::Texture)];

/// Marks texels whose slope lies within the configured range, on a
/// regular sampling grid.
#[derive(Default)]
pub struct ComputeReleasePointsNode {
    settings: ReleasePointSettings,
    release_points: Option<GpuTexture>,
}

impl ComputeReleasePointsNode {
    pub fn new(settings: ReleasePointSettings) -> Self {
        Self {
            settings,
            release_points: None,
        }
    }

    pub fn settings(&self) -> &ReleasePointSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: ReleasePointSettings) {
        self.settings = settings;
    }
}

impl Node for ComputeReleasePointsNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        RELEASE_INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        RELEASE_OUTPUTS
    }

    fn output<'a>(&'a self, index: usize, _inputs: &InputData<'a>) -> Option<SocketData<'a>> {
        match index {
            0 => self.release_points.as_ref().map(SocketData::Texture),
            _ => None,
        }
    }

    async fn run_impl(
        &mut self,
        context: &Context,
        inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        self.release_points = None;
        self.settings.validate()?;
        let normals = inputs.get::<&GpuTexture>("normal texture")?;
        expect_format(normals, "normal texture", wgpu::TextureFormat::Rgba8Unorm)?;
        let (width, height) = normals.size();
        let params = create_uniform_buffer(
            context.device(),
            "nodes.release_points.params",
            &self.settings.params(),
        );
        let release_points = GpuTexture::new(
            context.device(),
            "nodes.release_points.output",
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
            output_usage(),
            1,
        );
        dispatch_texture_pass(
            context,
            ComputeShader::ReleasePoints,
            &[
                params.as_entire_binding(),
                wgpu::BindingResource::TextureView(normals.view()),
                wgpu::BindingResource::TextureView(release_points.view()),
            ],
            (width, height),
        );
        SubmittedWork::new(context.queue()).await?;
        self.release_points = Some(release_points);
        Ok(())
    }
}
