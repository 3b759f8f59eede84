use std::path::{Path, PathBuf};

use gpu_runtime::{Context, StorageBuffer};
use node_graph::{
    InputData, Node, NodeRunFailure, RasterDimensions, SocketData, SocketSpec, SocketType,
};

/// Values outside this range are clamped before rescaling.
pub const EXPORT_VALUE_LIMIT: f32 = 10_000.0;

/// Maps one buffer element, read as `f32` bits, onto the full `u32` range
/// and splits it into big-endian RGBA bytes. NaN maps to the lower limit.
pub fn encode_export_value(bits: u32) -> [u8; 4] {
    let value = f32::from_bits(bits);
    let clamped = if value.is_nan() {
        -EXPORT_VALUE_LIMIT
    } else {
        value.clamp(-EXPORT_VALUE_LIMIT, EXPORT_VALUE_LIMIT)
    };
    let limit = f64::from(EXPORT_VALUE_LIMIT);
    let normalized = (f64::from(clamped) + limit) / (2.0 * limit);
    let mapped = (normalized * f64::from(u32::MAX)) as u32;
    mapped.to_be_bytes()
}

/// RGBA8 image bytes for the first `width * height` values.
pub fn encode_buffer_export(values: &[u32], width: u32, height: u32) -> Vec<u8> {
    let count = width as usize * height as usize;
    assert!(values.len() >= count, "buffer holds fewer values than the raster");
    values[..count]
        .iter()
        .flat_map(|bits| encode_export_value(*bits))
        .collect()
}

pub(crate) fn create_parent_dirs(path: &Path) -> Result<(), NodeRunFailure> {
    let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) else {
        return Ok(());
    };
    std::fs::create_dir_all(parent).map_err(|error| {
        NodeRunFailure::new(format!(
            "failed to create directory {}: {error}",
            parent.display()
        ))
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferExportSettings {
    pub output_path: PathBuf,
    pub create_parent_dirs: bool,
}

impl Default for BufferExportSettings {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("buffer.png"),
            create_parent_dirs: true,
        }
    }
}

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("buffer", SocketType::Buffer),
    SocketSpec::new("dimensions", SocketType::RasterDimensions),
];

/// Writes a raw `u32` raster as an RGBA8 PNG, one value per pixel.
#[derive(Debug, Default)]
pub struct BufferExportNode {
    settings: BufferExportSettings,
}

impl BufferExportNode {
    pub fn new(settings: BufferExportSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &BufferExportSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: BufferExportSettings) {
        self.settings = settings;
    }
}

impl Node for BufferExportNode {
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
        let buffer = inputs.get::<&StorageBuffer>("buffer")?;
        let dimensions = inputs.get::<RasterDimensions>("dimensions")?;
        let RasterDimensions { width, height } = dimensions;
        if buffer.len() < dimensions.texel_count() {
            log::warn!(
                "buffer of {} values is too small for a {width}x{height} raster, skipping export to {}",
                buffer.len(),
                self.settings.output_path.display()
            );
            return Ok(());
        }

        let bytes = buffer.read(context.device(), context.queue()).await?;
        let values: Vec<u32> = bytes
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<u32>)
            .collect();
        let pixels = encode_buffer_export(&values, width, height);

        let path = &self.settings.output_path;
        if self.settings.create_parent_dirs {
            create_parent_dirs(path)?;
        }
        image::save_buffer(path, &pixels, width, height, image::ExtendedColorType::Rgba8)
            .map_err(|error| {
                NodeRunFailure::new(format!("failed to write {}: {error}", path.display()))
            })?;
        log::info!("exported {width}x{height} buffer to {}", path.display());
        Ok(())
    }
}
