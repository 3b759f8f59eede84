use gpu_runtime::{
    ComputeShader, Context, SubmittedWork, UpsampleParams, create_storage_buffer_init,
    create_uniform_buffer,
};
use node_graph::{InputData, Node, NodeRunFailure, SocketData, SocketSpec, SocketType};
use tiles::{TileStorageConfig, TileStorageFormat, TileStorageTexture};

/// Host mirror of the upsample kernel: bilinear interpolation with texel
/// centres mapped onto texel centres and reads clamped at the border.
pub fn upsample_tile(
    source: &[[u8; 4]],
    source_size: (u32, u32),
    target_size: (u32, u32),
) -> Vec<[u8; 4]> {
    assert_eq!(
        source.len(),
        (source_size.0 * source_size.1) as usize,
        "source texel count does not match its size"
    );
    let scale = (
        source_size.0 as f32 / target_size.0 as f32,
        source_size.1 as f32 / target_size.1 as f32,
    );
    let load = |x: i64, y: i64, channel: usize| -> f32 {
        let x = x.clamp(0, i64::from(source_size.0) - 1) as u32;
        let y = y.clamp(0, i64::from(source_size.1) - 1) as u32;
        f32::from(source[(y * source_size.0 + x) as usize][channel]) / 255.0
    };
    let mix = |a: f32, b: f32, t: f32| a * (1.0 - t) + b * t;

    let mut target = Vec::with_capacity((target_size.0 * target_size.1) as usize);
    for y in 0..target_size.1 {
        for x in 0..target_size.0 {
            let px = (x as f32 + 0.5) * scale.0 - 0.5;
            let py = (y as f32 + 0.5) * scale.1 - 0.5;
            let (bx, by) = (px.floor(), py.floor());
            let (tx, ty) = (px - bx, py - by);
            let (cx, cy) = (bx as i64, by as i64);
            let texel = std::array::from_fn(|channel| {
                let top = mix(load(cx, cy, channel), load(cx + 1, cy, channel), tx);
                let bottom = mix(load(cx, cy + 1, channel), load(cx + 1, cy + 1, channel), tx);
                (mix(top, bottom, ty).clamp(0.0, 1.0) * 255.0).round() as u8
            });
            target.push(texel);
        }
    }
    target
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsampleSettings {
    pub target_size: (u32, u32),
}

impl Default for UpsampleSettings {
    fn default() -> Self {
        Self {
            target_size: (256, 256),
        }
    }
}

const INPUTS: &[SocketSpec] = &[SocketSpec::new("textures", SocketType::TileStorage)];
const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("textures", SocketType::TileStorage)];

/// Resamples every used layer of an RGBA8 tile array to a larger tile size.
/// Layers keep their index, so the input hash map stays valid for the
/// output.
#[derive(Debug, Default)]
pub struct UpsampleTexturesNode {
    settings: UpsampleSettings,
    pass_through: bool,
    storage: Option<TileStorageTexture>,
}

impl UpsampleTexturesNode {
    pub fn new(settings: UpsampleSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &UpsampleSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: UpsampleSettings) {
        self.settings = settings;
    }
}

impl Node for UpsampleTexturesNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output<'a>(&'a self, index: usize, inputs: &InputData<'a>) -> Option<SocketData<'a>> {
        match index {
            0 if self.pass_through => inputs.raw(0),
            0 => self.storage.as_ref().map(SocketData::TileStorage),
            _ => None,
        }
    }

    async fn run_impl(
        &mut self,
        context: &Context,
        inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        self.pass_through = false;
        self.storage = None;
        let source = inputs.get::<&TileStorageTexture>("textures")?;
        if source.format() != TileStorageFormat::Rgba8Unorm {
            return Err(NodeRunFailure::new(format!(
                "upsampling is not supported for {:?} tiles",
                source.format()
            )));
        }
        let source_size = (source.width(), source.height());
        let target_size = self.settings.target_size;
        if target_size == source_size {
            log::debug!("tiles already have {}x{} texels, passing through", source_size.0, source_size.1);
            self.pass_through = true;
            return Ok(());
        }
        if target_size.0 < source_size.0 || target_size.1 < source_size.1 {
            return Err(NodeRunFailure::new(format!(
                "cannot upsample {}x{} tiles to the smaller size {}x{}",
                source_size.0, source_size.1, target_size.0, target_size.1
            )));
        }

        let device = context.device();
        let queue = context.queue();
        let mut storage = TileStorageTexture::new(
            device,
            TileStorageConfig::rgba8_storage(target_size.0, target_size.1, source.capacity()),
        )?;
        let used = source.used_layer_indices();
        log::debug!(
            "upsampling {} tiles from {}x{} to {}x{}",
            used.len(),
            source_size.0,
            source_size.1,
            target_size.0,
            target_size.1
        );
        for &slot in &used {
            storage.reserve_at(slot)?;
        }
        if !used.is_empty() {
            let params = create_uniform_buffer(
                device,
                "nodes.upsample.params",
                &UpsampleParams {
                    source_size: [source_size.0, source_size.1],
                    target_size: [target_size.0, target_size.1],
                    num_layers: used.len() as u32,
                    padding: [0; 3],
                },
            );
            let indices = create_storage_buffer_init(device, "nodes.upsample.layer_indices", &used);
            let shader = ComputeShader::UpsampleRgba8;
            let pipelines = context.pipelines();
            let bind_group = pipelines.bind_group(
                device,
                shader,
                &[
                    params.as_entire_binding(),
                    indices.as_entire_binding(),
                    wgpu::BindingResource::TextureView(source.view()),
                    wgpu::BindingResource::TextureView(storage.view()),
                ],
            );
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(shader.label()),
            });
            pipelines.dispatch(
                &mut encoder,
                shader,
                &bind_group,
                shader.workgroups_for(target_size.0, target_size.1, used.len() as u32),
            );
            queue.submit(Some(encoder.finish()));
            SubmittedWork::new(queue).await?;
        }

        self.storage = Some(storage);
        Ok(())
    }
}
