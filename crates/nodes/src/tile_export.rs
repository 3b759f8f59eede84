use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use gpu_runtime::{Context, GpuTexture, read_texture_layer};
use node_graph::{InputData, Node, NodeRunFailure, SocketData, SocketSpec, SocketType};
use tiles::{
    Aabb2, GpuHashMap, TileId, TileStorageFormat, TileStorageTexture, tile_bounds,
};

use crate::buffer_export::create_parent_dirs;
use crate::region_aabb::format_region_aabb;

pub const MAX_STITCHED_IMAGE_SIZE: u32 = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StitchError {
    NoTiles,
    TooLarge { zoom: u32, width: u64, height: u64 },
}

impl fmt::Display for StitchError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StitchError::NoTiles => write!(formatter, "no tiles to stitch"),
            StitchError::TooLarge { zoom, .. } => write!(
                formatter,
                "Stitched image size would exceed maximum size of {MAX_STITCHED_IMAGE_SIZE}x{MAX_STITCHED_IMAGE_SIZE} pixel for zoom level {zoom}"
            ),
        }
    }
}

impl std::error::Error for StitchError {}

impl From<StitchError> for NodeRunFailure {
    fn from(error: StitchError) -> Self {
        NodeRunFailure::new(error.to_string())
    }
}

/// Extent of the tiles of one zoom level inside a stitched image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLayout {
    pub min_tile: (u32, u32),
    pub max_tile: (u32, u32),
    pub size_pixels: (u32, u32),
    /// Union of the tile bounds.
    pub bounds: Aabb2,
}

/// Placement of tiles into one image per zoom level.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchLayout {
    /// Pixels each tile contributes, after overlap removal.
    pub tile_size: (u32, u32),
    pub inverted_y: bool,
    pub levels: BTreeMap<u32, ZoomLayout>,
}

impl StitchLayout {
    pub fn new(
        ids: impl IntoIterator<Item = TileId>,
        tile_size: (u32, u32),
        inverted_y: bool,
    ) -> Result<Self, StitchError> {
        let mut levels: BTreeMap<u32, ZoomLayout> = BTreeMap::new();
        for id in ids {
            let bounds = tile_bounds(id);
            levels
                .entry(id.zoom)
                .and_modify(|level| {
                    level.min_tile = (level.min_tile.0.min(id.x), level.min_tile.1.min(id.y));
                    level.max_tile = (level.max_tile.0.max(id.x), level.max_tile.1.max(id.y));
                    level.bounds = level.bounds.union(&bounds);
                })
                .or_insert(ZoomLayout {
                    min_tile: (id.x, id.y),
                    max_tile: (id.x, id.y),
                    size_pixels: (0, 0),
                    bounds,
                });
        }
        if levels.is_empty() {
            return Err(StitchError::NoTiles);
        }
        for (zoom, level) in &mut levels {
            let tiles_x = u64::from(level.max_tile.0 - level.min_tile.0 + 1);
            let tiles_y = u64::from(level.max_tile.1 - level.min_tile.1 + 1);
            let width = tiles_x * u64::from(tile_size.0);
            let height = tiles_y * u64::from(tile_size.1);
            let limit = u64::from(MAX_STITCHED_IMAGE_SIZE);
            if width > limit || height > limit {
                return Err(StitchError::TooLarge {
                    zoom: *zoom,
                    width,
                    height,
                });
            }
            level.size_pixels = (width as u32, height as u32);
        }
        Ok(Self {
            tile_size,
            inverted_y,
            levels,
        })
    }

    /// Top-left pixel of `id` in the image of its zoom level.
    pub fn tile_offset(&self, id: TileId) -> Option<(u32, u32)> {
        let level = self.levels.get(&id.zoom)?;
        let column = id.x.checked_sub(level.min_tile.0)?;
        let row = if self.inverted_y {
            level.max_tile.1.checked_sub(id.y)?
        } else {
            id.y.checked_sub(level.min_tile.1)?
        };
        Some((column * self.tile_size.0, row * self.tile_size.1))
    }
}

/// Texel layout of exported images. Everything is written as RGBA8 PNG;
/// `R16` texels keep their little-endian bytes in red and green.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    R16,
    Rgba8,
}

impl ExportFormat {
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            ExportFormat::R16 => 2,
            ExportFormat::Rgba8 => 4,
        }
    }

    fn for_texture(format: wgpu::TextureFormat) -> Result<Self, NodeRunFailure> {
        match format {
            wgpu::TextureFormat::R16Uint => Ok(ExportFormat::R16),
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => {
                Ok(ExportFormat::Rgba8)
            }
            format => Err(NodeRunFailure::new(format!(
                "cannot export textures of format {format:?}"
            ))),
        }
    }
}

/// An image as tightly packed texel bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportImage {
    pub width: u32,
    pub height: u32,
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
}

impl ExportImage {
    pub fn blank(width: u32, height: u32, format: ExportFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_texel() as usize;
        Self {
            width,
            height,
            format,
            bytes: vec![0; len],
        }
    }

    /// Top-left `width` x `height` corner.
    pub fn cropped(&self, width: u32, height: u32) -> Self {
        assert!(width <= self.width && height <= self.height);
        let bpp = self.format.bytes_per_texel() as usize;
        let mut bytes = Vec::with_capacity(width as usize * height as usize * bpp);
        for row in 0..height as usize {
            let start = row * self.width as usize * bpp;
            bytes.extend_from_slice(&self.bytes[start..start + width as usize * bpp]);
        }
        Self {
            width,
            height,
            format: self.format,
            bytes,
        }
    }

    pub fn blit(&mut self, source: &ExportImage, offset: (u32, u32)) {
        assert_eq!(self.format, source.format, "cannot blit between formats");
        assert!(
            offset.0 + source.width <= self.width && offset.1 + source.height <= self.height,
            "blit exceeds the target image"
        );
        let bpp = self.format.bytes_per_texel() as usize;
        let row_len = source.width as usize * bpp;
        for row in 0..source.height as usize {
            let source_start = row * row_len;
            let target_start =
                ((offset.1 as usize + row) * self.width as usize + offset.0 as usize) * bpp;
            self.bytes[target_start..target_start + row_len]
                .copy_from_slice(&source.bytes[source_start..source_start + row_len]);
        }
    }

    /// Texels as RGBA8: `R16` becomes `(low, high, 0, 255)`.
    pub fn to_rgba8(&self) -> Vec<u8> {
        match self.format {
            ExportFormat::Rgba8 => self.bytes.clone(),
            ExportFormat::R16 => self
                .bytes
                .chunks_exact(2)
                .flat_map(|pair| [pair[0], pair[1], 0, 255])
                .collect(),
        }
    }

    pub fn save_png(&self, path: &Path) -> Result<(), NodeRunFailure> {
        image::save_buffer(
            path,
            &self.to_rgba8(),
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|error| {
            NodeRunFailure::new(format!("failed to write {}: {error}", path.display()))
        })
    }
}

fn write_aabb_file(path: &Path, aabb: &Aabb2) -> Result<(), NodeRunFailure> {
    std::fs::write(path, format_region_aabb(aabb)).map_err(|error| {
        NodeRunFailure::new(format!("failed to write {}: {error}", path.display()))
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileExportSettings {
    pub output_directory: PathBuf,
    /// Drops the last texel row and column, which repeat the neighbour's
    /// first.
    pub remove_overlap: bool,
    pub stitch_tiles: bool,
    /// Puts the northernmost tile row at the top of stitched images.
    pub stitch_inverted_y: bool,
    pub export_aabb_text_files: bool,
    pub file_stem: String,
}

impl Default for TileExportSettings {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("export"),
            remove_overlap: true,
            stitch_tiles: true,
            stitch_inverted_y: true,
            export_aabb_text_files: true,
            file_stem: "texture".to_owned(),
        }
    }
}

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("texture", SocketType::Texture),
    SocketSpec::new("region aabb", SocketType::RegionAabb),
    SocketSpec::new("hash map", SocketType::HashMap),
    SocketSpec::new("textures", SocketType::TileStorage),
];

/// Writes either one texture or every tile of a tile array to PNG files.
#[derive(Debug, Default)]
pub struct TileExportNode {
    settings: TileExportSettings,
}

impl TileExportNode {
    pub fn new(settings: TileExportSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TileExportSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: TileExportSettings) {
        self.settings = settings;
    }

    async fn export_texture(
        &self,
        context: &Context,
        texture: &GpuTexture,
        aabb: Option<&Aabb2>,
    ) -> Result<(), NodeRunFailure> {
        let format = ExportFormat::for_texture(texture.format())?;
        let bytes = texture
            .read(context.device(), context.queue())
            .into_bytes()
            .await?;
        let image = ExportImage {
            width: texture.width(),
            height: texture.height(),
            format,
            bytes,
        };
        let directory = &self.settings.output_directory;
        let stem = &self.settings.file_stem;
        let path = directory.join(format!("{stem}.png"));
        create_parent_dirs(&path)?;
        image.save_png(&path)?;
        if let Some(aabb) = aabb.filter(|_| self.settings.export_aabb_text_files) {
            write_aabb_file(&directory.join("aabb.txt"), aabb)?;
        }
        log::info!(
            "exported {}x{} texture to {}",
            image.width,
            image.height,
            path.display()
        );
        Ok(())
    }

    async fn export_tiles(
        &self,
        context: &Context,
        hash_map: &GpuHashMap,
        storage: &TileStorageTexture,
    ) -> Result<(), NodeRunFailure> {
        let format = match storage.format() {
            TileStorageFormat::R16Uint => ExportFormat::R16,
            TileStorageFormat::Rgba8Unorm => ExportFormat::Rgba8,
            format => {
                return Err(NodeRunFailure::new(format!(
                    "cannot export tiles of format {format:?}"
                )));
            }
        };
        let mut layers = Vec::new();
        for slot in storage.used_layer_indices() {
            match hash_map.key_with_value(slot) {
                Some(id) => layers.push((id, slot)),
                None => log::warn!("layer {slot} holds no mapped tile, skipping it"),
            }
        }
        let (width, height) = (storage.width(), storage.height());
        let tile_size = if self.settings.remove_overlap {
            (width.saturating_sub(1).max(1), height.saturating_sub(1).max(1))
        } else {
            (width, height)
        };
        let layout = if self.settings.stitch_tiles {
            Some(StitchLayout::new(
                layers.iter().map(|(id, _)| *id),
                tile_size,
                self.settings.stitch_inverted_y,
            )?)
        } else {
            None
        };

        let mut tiles = BTreeMap::new();
        for (id, slot) in &layers {
            let bytes = read_texture_layer(
                context.device(),
                context.queue(),
                storage.texture(),
                *slot,
                width,
                height,
                storage.format().to_wgpu(),
            )
            .into_bytes()
            .await?;
            let image = ExportImage {
                width,
                height,
                format,
                bytes,
            };
            tiles.insert(*id, image.cropped(tile_size.0, tile_size.1));
        }

        let directory = &self.settings.output_directory;
        std::fs::create_dir_all(directory).map_err(|error| {
            NodeRunFailure::new(format!(
                "failed to create directory {}: {error}",
                directory.display()
            ))
        })?;
        match layout {
            Some(layout) => self.write_stitched(directory, &layout, &tiles)?,
            None => {
                for (id, image) in &tiles {
                    let path = directory
                        .join(id.zoom.to_string())
                        .join(id.x.to_string())
                        .join(format!("{}.png", id.y));
                    create_parent_dirs(&path)?;
                    image.save_png(&path)?;
                }
                log::info!("exported {} tiles to {}", tiles.len(), directory.display());
            }
        }
        Ok(())
    }

    fn write_stitched(
        &self,
        directory: &Path,
        layout: &StitchLayout,
        tiles: &BTreeMap<TileId, ExportImage>,
    ) -> Result<(), NodeRunFailure> {
        let Some(format) = tiles.values().next().map(|image| image.format) else {
            return Ok(());
        };
        for (zoom, level) in &layout.levels {
            let mut stitched = ExportImage::blank(level.size_pixels.0, level.size_pixels.1, format);
            for (id, image) in tiles.iter().filter(|(id, _)| id.zoom == *zoom) {
                if let Some(offset) = layout.tile_offset(*id) {
                    stitched.blit(image, offset);
                }
            }
            let path = directory.join(format!("{zoom}.png"));
            stitched.save_png(&path)?;
            if self.settings.export_aabb_text_files {
                write_aabb_file(&directory.join(format!("{zoom}_aabb.txt")), &level.bounds)?;
            }
            log::info!(
                "exported stitched {}x{} image of zoom level {zoom} to {}",
                stitched.width,
                stitched.height,
                path.display()
            );
        }
        Ok(())
    }
}

impl Node for TileExportNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        &[]
    }

    fn output<'a>(&'a self, _index: usize, _inputs: &InputData<'a>) -> Option<SocketData<'a>> {
        None
    }

    async fn run_impl(
        &mut self,
        context: &Context,
        inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        if let Some(texture) = inputs.get_optional::<&GpuTexture>("texture") {
            let aabb = inputs.get_optional::<&Aabb2>("region aabb");
            return self.export_texture(context, texture, aabb).await;
        }
        let hash_map = inputs.get::<&GpuHashMap>("hash map")?;
        let storage = inputs.get::<&TileStorageTexture>("textures")?;
        self.export_tiles(context, hash_map, storage).await
    }
}
