use gpu_runtime::{
    ComputeShader, Context, DownsampleParams, StorageBuffer, SubmittedWork,
    create_storage_buffer_init, create_uniform_buffer, padded_bytes_per_row,
};
use node_graph::{InputData, Node, NodeRunFailure, SocketData, SocketSpec, SocketType};
use tiles::{
    GpuHashMap, GpuTileId, TileId, TileStorageConfig, TileStorageFormat, TileStorageTexture,
};

/// Unique parents of `ids` in ascending order. Root tiles have none.
pub fn parent_tile_ids(ids: &[TileId]) -> Vec<TileId> {
    let mut parents: Vec<TileId> = ids.iter().filter_map(|id| id.parent()).collect();
    parents.sort();
    parents.dedup();
    parents
}

/// Host mirror of the downsample kernel for single-channel tiles.
/// `children[row_from_top][column]`; in TMS the top row holds the
/// children with the larger y.
pub fn downsample_tile(children: [[Option<&[f32]>; 2]; 2], width: u32, height: u32) -> Vec<f32> {
    assert!(width >= 2 && height >= 2, "tiles must be at least 2x2");
    let edge = (width - 1, height - 1);
    let child_texel = |child: &[f32], x: u32, y: u32| child[(y * width + x) as usize];
    let mosaic_texel = |mx: u32, my: u32| -> f32 {
        let quadrant = ((mx / edge.0).min(1), (my / edge.1).min(1));
        let local_texel = (mx - quadrant.0 * edge.0, my - quadrant.1 * edge.1);
        let near_edge = (
            if quadrant.0 == 1 { edge.0 } else { 0 },
            if quadrant.1 == 1 { edge.1 } else { 0 },
        );
        let child = |column: u32, row: u32| children[row as usize][column as usize];
        if let Some(own) = child(quadrant.0, quadrant.1) {
            return child_texel(own, local_texel.0, local_texel.1);
        }
        if let Some(horizontal) = child(1 - quadrant.0, quadrant.1) {
            return child_texel(horizontal, near_edge.0, local_texel.1);
        }
        if let Some(vertical) = child(quadrant.0, 1 - quadrant.1) {
            return child_texel(vertical, local_texel.0, near_edge.1);
        }
        if let Some(diagonal) = child(1 - quadrant.0, 1 - quadrant.1) {
            return child_texel(diagonal, near_edge.0, near_edge.1);
        }
        0.0
    };

    let last = (2 * edge.0, 2 * edge.1);
    let mut parent = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let corner = ((2 * x).min(last.0), (2 * y).min(last.1));
            let opposite = ((corner.0 + 1).min(last.0), (corner.1 + 1).min(last.1));
            let sum = mosaic_texel(corner.0, corner.1)
                + mosaic_texel(opposite.0, corner.1)
                + mosaic_texel(corner.0, opposite.1)
                + mosaic_texel(opposite.0, opposite.1);
            parent.push(sum * 0.25);
        }
    }
    parent
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownsampleSettings {
    /// Zoom levels to add above the input tiles; zero passes the inputs
    /// through.
    pub num_levels: u32,
    /// Layer count of the output array; `None` keeps the input capacity.
    pub capacity: Option<u32>,
}

impl Default for DownsampleSettings {
    fn default() -> Self {
        Self {
            num_levels: 1,
            capacity: None,
        }
    }
}

const SOCKETS: &[SocketSpec] = &[
    SocketSpec::new("tile ids", SocketType::TileIdList),
    SocketSpec::new("hash map", SocketType::HashMap),
    SocketSpec::new("textures", SocketType::TileStorage),
];
const OUTPUTS: &[SocketSpec] = &[
    SocketSpec::new("hash map", SocketType::HashMap),
    SocketSpec::new("textures", SocketType::TileStorage),
];

/// Adds coarser zoom levels to a tile array. Works on an owned copy of the
/// input map and array so upstream data stays untouched.
#[derive(Debug, Default)]
pub struct DownsampleTilesNode {
    settings: DownsampleSettings,
    pass_through: bool,
    hash_map: Option<GpuHashMap>,
    storage: Option<TileStorageTexture>,
}

impl DownsampleTilesNode {
    pub fn new(settings: DownsampleSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &DownsampleSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: DownsampleSettings) {
        self.settings = settings;
    }
}

impl Node for DownsampleTilesNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        SOCKETS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output<'a>(&'a self, index: usize, inputs: &InputData<'a>) -> Option<SocketData<'a>> {
        if self.pass_through {
            return match index {
                0 | 1 => inputs.raw(index + 1),
                _ => None,
            };
        }
        match index {
            0 => self.hash_map.as_ref().map(SocketData::HashMap),
            1 => self.storage.as_ref().map(SocketData::TileStorage),
            _ => None,
        }
    }

    async fn run_impl(
        &mut self,
        context: &Context,
        inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        self.pass_through = false;
        self.hash_map = None;
        self.storage = None;
        let ids = inputs.get::<&[TileId]>("tile ids")?;
        let input_map = inputs.get::<&GpuHashMap>("hash map")?;
        let input_storage = inputs.get::<&TileStorageTexture>("textures")?;
        if self.settings.num_levels == 0 {
            log::debug!("downsampling over zero levels, passing inputs through");
            self.pass_through = true;
            return Ok(());
        }
        let shader = match input_storage.format() {
            TileStorageFormat::R16Uint => ComputeShader::DownsampleR16,
            TileStorageFormat::Rgba8Unorm => ComputeShader::DownsampleRgba8,
            format => {
                return Err(NodeRunFailure::new(format!(
                    "downsampling is not supported for {format:?} tiles"
                )));
            }
        };

        let device = context.device();
        let queue = context.queue();
        let capacity = self.settings.capacity.unwrap_or(input_storage.capacity());
        let mut storage = TileStorageTexture::new(
            device,
            TileStorageConfig {
                capacity,
                ..input_storage.config()
            },
        )?;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("nodes.downsample.copy"),
        });
        for slot in input_storage.used_layer_indices() {
            if slot >= capacity {
                return Err(NodeRunFailure::new(format!(
                    "failed to copy textures for downsampling: input layer {slot} does not fit into {capacity} layers"
                )));
            }
            storage.reserve_at(slot)?;
            input_storage.copy_layer_to(&mut encoder, slot, &storage, slot);
        }
        queue.submit(Some(encoder.finish()));
        let mut hash_map = input_map.duplicate(device, queue);

        let mut level_ids = ids.to_vec();
        for level in 0..self.settings.num_levels {
            let parents = parent_tile_ids(&level_ids);
            if parents.is_empty() {
                log::warn!("no parent tiles left after {level} downsampled levels");
                break;
            }
            downsample_level(context, shader, &parents, &mut hash_map, &mut storage)?;
            level_ids = parents;
        }
        SubmittedWork::new(queue).await?;
        log::debug!(
            "downsampled {} tiles over {} levels, {} layers used",
            ids.len(),
            self.settings.num_levels,
            storage.num_used()
        );

        self.hash_map = Some(hash_map);
        self.storage = Some(storage);
        Ok(())
    }
}

/// Renders `parents` from their children into a scratch buffer, then
/// copies each parent into a newly reserved layer. The map is updated only
/// after the copies are recorded.
fn downsample_level(
    context: &Context,
    shader: ComputeShader,
    parents: &[TileId],
    hash_map: &mut GpuHashMap,
    storage: &mut TileStorageTexture,
) -> Result<(), NodeRunFailure> {
    if storage.num_used() as usize + parents.len() > storage.capacity() as usize {
        return Err(NodeRunFailure::new(format!(
            "failed to store textures for downsampling in buffer: texture array has {} layers, where {} layers are already used, tried to store {} additional downsampled textures",
            storage.capacity(),
            storage.num_used(),
            parents.len()
        )));
    }
    let device = context.device();
    let (width, height) = (storage.width(), storage.height());
    let bytes_per_row = padded_bytes_per_row(width * storage.format().bytes_per_texel());
    let words_per_row = bytes_per_row / 4;
    let params = create_uniform_buffer(
        device,
        "nodes.downsample.params",
        &DownsampleParams {
            tile_size: [width, height],
            words_per_row,
            num_parents: parents.len() as u32,
        },
    );
    let gpu_parents: Vec<GpuTileId> = parents.iter().map(|id| id.to_gpu()).collect();
    let parents_buffer = create_storage_buffer_init(device, "nodes.downsample.parents", &gpu_parents);
    let scratch = StorageBuffer::new(
        device,
        "nodes.downsample.scratch",
        u64::from(words_per_row) * u64::from(height) * parents.len() as u64,
        wgpu::BufferUsages::COPY_SRC,
    );

    let pipelines = context.pipelines();
    let bind_group = pipelines.bind_group(
        device,
        shader,
        &[
            params.as_entire_binding(),
            parents_buffer.as_entire_binding(),
            hash_map.key_buffer().as_entire_binding(),
            hash_map.value_buffer().as_entire_binding(),
            wgpu::BindingResource::TextureView(storage.view()),
            scratch.buffer().as_entire_binding(),
        ],
    );
    let columns = match shader {
        ComputeShader::DownsampleR16 => width.div_ceil(2),
        _ => width,
    };
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some(shader.label()),
    });
    pipelines.dispatch(
        &mut encoder,
        shader,
        &bind_group,
        shader.workgroups_for(columns, height, parents.len() as u32),
    );

    let parent_bytes = u64::from(bytes_per_row) * u64::from(height);
    for (index, parent) in parents.iter().enumerate() {
        let slot = storage.reserve()?;
        encoder.copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer: scratch.buffer(),
                layout: wgpu::TexelCopyBufferLayout {
                    offset: index as u64 * parent_bytes,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::TexelCopyTextureInfo {
                texture: storage.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: slot,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        hash_map.store(*parent, slot);
    }
    context.queue().submit(Some(encoder.finish()));
    hash_map.update_gpu_data(context.queue());
    Ok(())
}
