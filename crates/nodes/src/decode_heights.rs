use gpu_runtime::Context;
use node_graph::{InputData, Node, NodeRunFailure, SocketData, SocketSpec, SocketType};
use tiles::{
    GpuHashMap, TileId, TileStorageConfig, TileStorageTexture, TileStoreError, decode_tile_png,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeHeightsSettings {
    pub capacity: u32,
    pub tile_resolution: (u32, u32),
}

impl Default for DecodeHeightsSettings {
    fn default() -> Self {
        Self {
            capacity: 256,
            tile_resolution: (65, 65),
        }
    }
}

impl DecodeHeightsSettings {
    pub fn storage_config(&self) -> TileStorageConfig {
        TileStorageConfig {
            width: self.tile_resolution.0,
            height: self.tile_resolution.1,
            ..TileStorageConfig::heights(self.capacity)
        }
    }
}

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("tile ids", SocketType::TileIdList),
    SocketSpec::new("tile data", SocketType::ByteArrayList),
];
const OUTPUTS: &[SocketSpec] = &[
    SocketSpec::new("hash map", SocketType::HashMap),
    SocketSpec::new("textures", SocketType::TileStorage),
];

/// Decodes encoded height tiles on the CPU into an R16Uint tile array.
/// Tile `i` of the input lands in layer `i`.
#[derive(Debug, Default)]
pub struct DecodeHeightsNode {
    settings: DecodeHeightsSettings,
    hash_map: Option<GpuHashMap>,
    storage: Option<TileStorageTexture>,
}

impl DecodeHeightsNode {
    pub fn new(settings: DecodeHeightsSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &DecodeHeightsSettings {
        &self.settings
    }
}

impl Node for DecodeHeightsNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output<'a>(&'a self, index: usize, _inputs: &InputData<'a>) -> Option<SocketData<'a>> {
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
        self.hash_map = None;
        self.storage = None;
        let ids = inputs.get::<&[TileId]>("tile ids")?;
        let tile_data = inputs.get::<&[Vec<u8>]>("tile data")?;
        if ids.len() != tile_data.len() {
            return Err(NodeRunFailure::new(format!(
                "received {} tile ids but {} tile images",
                ids.len(),
                tile_data.len()
            )));
        }
        let config = self.settings.storage_config();
        if ids.len() > config.capacity as usize {
            return Err(TileStoreError::CapacityExceeded {
                capacity: config.capacity,
                requested: ids.len() as u32,
            }
            .into());
        }

        let mut storage = TileStorageTexture::new(context.device(), config)?;
        let mut hash_map = GpuHashMap::new(context.device());
        for (slot, (id, bytes)) in ids.iter().zip(tile_data).enumerate() {
            let texels = decode_tile_png(bytes, config).map_err(|error| {
                NodeRunFailure::new(format!("failed to decode heights of tile {id}: {error}"))
            })?;
            storage.store_raw(context.queue(), slot as u32, &texels)?;
            hash_map.store(*id, slot as u32);
        }
        hash_map.update_gpu_data(context.queue());
        log::debug!("decoded {} height tiles", ids.len());

        self.hash_map = Some(hash_map);
        self.storage = Some(storage);
        Ok(())
    }
}
