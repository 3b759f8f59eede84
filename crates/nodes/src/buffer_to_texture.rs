use gpu_runtime::{
    ColorizeParams, ComputeShader, Context, GpuTexture, MAX_TEXTURE_DIMENSION, StorageBuffer,
    SubmittedWork, create_uniform_buffer, mip_level_count,
};
use node_graph::{
    InputData, Node, NodeRunFailure, RasterDimensions, SocketData, SocketSpec, SocketType,
};
use trajectories::{BufferEncoding, Colorize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferToTextureSettings {
    pub color_map_bounds: (f32, f32),
    pub transparency_map_bounds: (f32, f32),
    pub use_bin_interpolation: bool,
    pub use_transparency_buffer: bool,
    pub create_mipmaps: bool,
    pub color_encoding: BufferEncoding,
    pub transparency_encoding: BufferEncoding,
}

impl Default for BufferToTextureSettings {
    fn default() -> Self {
        Self {
            color_map_bounds: (0.0, 100.0),
            transparency_map_bounds: (0.0, 10.0),
            use_bin_interpolation: true,
            use_transparency_buffer: true,
            create_mipmaps: false,
            color_encoding: BufferEncoding::FloatBits,
            transparency_encoding: BufferEncoding::UnsignedInteger,
        }
    }
}

impl BufferToTextureSettings {
    pub fn colorize(&self) -> Colorize {
        Colorize {
            color_bounds: self.color_map_bounds,
            transparency_bounds: self.transparency_map_bounds,
            interpolate: self.use_bin_interpolation,
            color_encoding: self.color_encoding,
            transparency_encoding: self.transparency_encoding,
        }
    }
}

/// Host mirror of the colouring kernel, one RGBA8 texel per value.
pub fn colorize_values(
    settings: &BufferToTextureSettings,
    color_values: &[u32],
    transparency_values: Option<&[u32]>,
) -> Vec<[u8; 4]> {
    let colorize = settings.colorize();
    color_values
        .iter()
        .enumerate()
        .map(|(index, bits)| {
            let transparency = transparency_values.map(|values| values[index]);
            colorize.texel_rgba8(*bits, transparency)
        })
        .collect()
}

pub fn check_texture_dimensions(dimensions: RasterDimensions) -> Result<(), NodeRunFailure> {
    let RasterDimensions { width, height } = dimensions;
    if width > MAX_TEXTURE_DIMENSION || height > MAX_TEXTURE_DIMENSION {
        return Err(NodeRunFailure::new(format!(
            "cannot create texture: texture dimensions ({width}x{height}) exceed {MAX_TEXTURE_DIMENSION}"
        )));
    }
    if width == 0 || height == 0 {
        return Err(NodeRunFailure::new(format!(
            "cannot create texture: texture dimensions ({width}x{height}) are empty"
        )));
    }
    Ok(())
}

fn check_buffer_len(
    buffer: &StorageBuffer,
    socket: &str,
    dimensions: RasterDimensions,
) -> Result<(), NodeRunFailure> {
    if buffer.len() < dimensions.texel_count() {
        return Err(NodeRunFailure::new(format!(
            "input '{socket}' holds {} values, a {}x{} raster needs {}",
            buffer.len(),
            dimensions.width,
            dimensions.height,
            dimensions.texel_count()
        )));
    }
    Ok(())
}

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("raster dimensions", SocketType::RasterDimensions),
    SocketSpec::new("storage buffer", SocketType::Buffer),
    SocketSpec::new("transparency buffer", SocketType::Buffer),
];
const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("texture", SocketType::Texture)];

/// Colours a raster buffer through the fixed ramp, optionally with alpha
/// from a second buffer and a mip chain.
#[derive(Default)]
pub struct BufferToTextureNode {
    settings: BufferToTextureSettings,
    texture: Option<GpuTexture>,
}

impl BufferToTextureNode {
    pub fn new(settings: BufferToTextureSettings) -> Self {
        Self {
            settings,
            texture: None,
        }
    }

    pub fn settings(&self) -> &BufferToTextureSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: BufferToTextureSettings) {
        self.settings = settings;
    }
}

impl Node for BufferToTextureNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output<'a>(&'a self, index: usize, _inputs: &InputData<'a>) -> Option<SocketData<'a>> {
        match index {
            0 => self.texture.as_ref().map(SocketData::Texture),
            _ => None,
        }
    }

    async fn run_impl(
        &mut self,
        context: &Context,
        inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        self.texture = None;
        let dimensions = inputs.get::<RasterDimensions>("raster dimensions")?;
        let color_values = inputs.get::<&StorageBuffer>("storage buffer")?;
        check_texture_dimensions(dimensions)?;
        check_buffer_len(color_values, "storage buffer", dimensions)?;
        let transparency_values = if self.settings.use_transparency_buffer {
            inputs.get_optional::<&StorageBuffer>("transparency buffer")
        } else {
            None
        };
        if let Some(values) = transparency_values {
            check_buffer_len(values, "transparency buffer", dimensions)?;
        }

        let device = context.device();
        let RasterDimensions { width, height } = dimensions;
        let mip_count = if self.settings.create_mipmaps {
            mip_level_count(width, height)
        } else {
            1
        };
        let texture = GpuTexture::new(
            device,
            "nodes.buffer_to_texture.output",
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            mip_count,
        );
        let params = create_uniform_buffer(
            device,
            "nodes.buffer_to_texture.params",
            &ColorizeParams::new(
                &self.settings.colorize(),
                width,
                height,
                transparency_values.is_some(),
            ),
        );

        let pipelines = context.pipelines();
        let base_level = texture.mip_view(0);
        let bind_group = pipelines.bind_group(
            device,
            ComputeShader::BufferToTexture,
            &[
                params.as_entire_binding(),
                color_values.buffer().as_entire_binding(),
                transparency_values
                    .unwrap_or(color_values)
                    .buffer()
                    .as_entire_binding(),
                wgpu::BindingResource::TextureView(&base_level),
            ],
        );
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("nodes.buffer_to_texture"),
        });
        pipelines.dispatch(
            &mut encoder,
            ComputeShader::BufferToTexture,
            &bind_group,
            ComputeShader::BufferToTexture.workgroups_for(width, height, 1),
        );
        for level in 1..mip_count {
            let source = texture.mip_view(level - 1);
            let target = texture.mip_view(level);
            let bind_group = pipelines.bind_group(
                device,
                ComputeShader::Mipmap,
                &[
                    wgpu::BindingResource::TextureView(&source),
                    wgpu::BindingResource::TextureView(&target),
                ],
            );
            pipelines.dispatch(
                &mut encoder,
                ComputeShader::Mipmap,
                &bind_group,
                ComputeShader::Mipmap.workgroups_for(
                    (width >> level).max(1),
                    (height >> level).max(1),
                    1,
                ),
            );
        }
        context.queue().submit(Some(encoder.finish()));
        SubmittedWork::new(context.queue()).await?;
        log::debug!("coloured {width}x{height} buffer into texture with {mip_count} mip levels");

        self.texture = Some(texture);
        Ok(())
    }
}
