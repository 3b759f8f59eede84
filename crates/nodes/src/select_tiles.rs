use glam::DVec2;
use gpu_runtime::Context;
use node_graph::{InputData, Node, NodeRunFailure, SocketData, SocketSpec, SocketType};
use tiles::{Aabb2, MAX_ZOOM_LEVEL, TileId, tile_bounds, tile_extent, tile_ids_for_aabb};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectTilesSettings {
    pub zoom_level: u32,
    /// Texels per tile, borders shared with the neighbours.
    pub tile_resolution: (u32, u32),
}

impl Default for SelectTilesSettings {
    fn default() -> Self {
        Self {
            zoom_level: 14,
            tile_resolution: (65, 65),
        }
    }
}

/// Every tile at `zoom` intersecting `aabb`, sorted, and the region they
/// cover. The region's max edge is pulled in by one texel since the last
/// texel row and column duplicate the next tile's first.
pub fn select_tiles(
    aabb: &Aabb2,
    settings: &SelectTilesSettings,
) -> Result<(Vec<TileId>, Aabb2), NodeRunFailure> {
    if settings.zoom_level > MAX_ZOOM_LEVEL {
        return Err(NodeRunFailure::new(format!(
            "zoom level {} exceeds max zoom level {MAX_ZOOM_LEVEL}",
            settings.zoom_level
        )));
    }
    let (width, height) = settings.tile_resolution;
    if width < 2 || height < 2 {
        return Err(NodeRunFailure::new(format!(
            "tile resolution {width}x{height} must be at least 2x2"
        )));
    }
    let mut ids = tile_ids_for_aabb(aabb, settings.zoom_level);
    ids.sort();
    ids.dedup();

    let mut bounds = tile_bounds(ids[0]);
    for id in &ids[1..] {
        bounds = bounds.union(&tile_bounds(*id));
    }
    let extent = tile_extent(settings.zoom_level);
    bounds.max -= DVec2::new(
        extent / f64::from(width - 1),
        extent / f64::from(height - 1),
    );
    Ok((ids, bounds))
}

const INPUTS: &[SocketSpec] = &[SocketSpec::new("region aabb", SocketType::RegionAabb)];
const OUTPUTS: &[SocketSpec] = &[
    SocketSpec::new("tile ids", SocketType::TileIdList),
    SocketSpec::new("region aabb", SocketType::RegionAabb),
];

#[derive(Debug, Default)]
pub struct SelectTilesNode {
    settings: SelectTilesSettings,
    tile_ids: Option<Vec<TileId>>,
    bounds: Option<Aabb2>,
}

impl SelectTilesNode {
    pub fn new(settings: SelectTilesSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &SelectTilesSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: SelectTilesSettings) {
        self.settings = settings;
    }

    pub fn tile_ids(&self) -> Option<&[TileId]> {
        self.tile_ids.as_deref()
    }
}

impl Node for SelectTilesNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output<'a>(&'a self, index: usize, _inputs: &InputData<'a>) -> Option<SocketData<'a>> {
        match index {
            0 => self.tile_ids.as_deref().map(SocketData::TileIdList),
            1 => self.bounds.as_ref().map(SocketData::RegionAabb),
            _ => None,
        }
    }

    async fn run_impl(
        &mut self,
        _context: &Context,
        inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        self.tile_ids = None;
        self.bounds = None;
        let aabb = inputs.get::<&Aabb2>("region aabb")?;
        let (ids, bounds) = select_tiles(aabb, &self.settings)?;
        log::debug!(
            "selected {} tiles at zoom {}",
            ids.len(),
            self.settings.zoom_level
        );
        self.tile_ids = Some(ids);
        self.bounds = Some(bounds);
        Ok(())
    }
}
