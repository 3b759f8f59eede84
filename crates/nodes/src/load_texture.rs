use std::path::PathBuf;

use gpu_runtime::{Context, GpuTexture, MAX_TEXTURE_DIMENSION};
use node_graph::{InputData, Node, NodeRunFailure, SocketData, SocketSpec, SocketType};

#[derive(Debug, Clone, PartialEq)]
pub struct LoadTextureSettings {
    pub file_path: PathBuf,
    /// An RGBA8 format; the decoded pixels are uploaded as is.
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

impl Default for LoadTextureSettings {
    fn default() -> Self {
        Self {
            file_path: PathBuf::new(),
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC,
        }
    }
}

/// Decodes a PNG or JPEG file into tightly packed RGBA8 texels.
pub fn load_rgba8_image(path: &std::path::Path) -> Result<(u32, u32, Vec<u8>), NodeRunFailure> {
    let decoded = image::ImageReader::open(path)
        .map_err(|error| {
            NodeRunFailure::new(format!(
                "failed to open texture {}: {error}",
                path.display()
            ))
        })?
        .with_guessed_format()
        .map_err(|error| {
            NodeRunFailure::new(format!(
                "failed to read texture {}: {error}",
                path.display()
            ))
        })?
        .decode()
        .map_err(|error| {
            NodeRunFailure::new(format!(
                "failed to decode texture {}: {error}",
                path.display()
            ))
        })?
        .to_rgba8();
    Ok((decoded.width(), decoded.height(), decoded.into_raw()))
}

const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("texture", SocketType::Texture)];

#[derive(Default)]
pub struct LoadTextureNode {
    settings: LoadTextureSettings,
    texture: Option<GpuTexture>,
}

impl LoadTextureNode {
    pub fn new(settings: LoadTextureSettings) -> Self {
        Self {
            settings,
            texture: None,
        }
    }

    pub fn settings(&self) -> &LoadTextureSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: LoadTextureSettings) {
        self.settings = settings;
    }
}

impl Node for LoadTextureNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        &[]
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
        _inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        self.texture = None;
        let format = self.settings.format;
        if !matches!(
            format,
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb
        ) {
            return Err(NodeRunFailure::new(format!(
                "cannot load images into {format:?} textures"
            )));
        }
        let path = &self.settings.file_path;
        let (width, height, texels) = load_rgba8_image(path)?;
        if width > MAX_TEXTURE_DIMENSION || height > MAX_TEXTURE_DIMENSION {
            return Err(NodeRunFailure::new(format!(
                "cannot create texture: texture dimensions ({width}x{height}) exceed {MAX_TEXTURE_DIMENSION}"
            )));
        }
        let texture = GpuTexture::with_data(
            context.device(),
            context.queue(),
            "nodes.load_texture",
            width,
            height,
            format,
            self.settings.usage,
            &texels,
        );
        log::info!("loaded {width}x{height} texture from {}", path.display());
        self.texture = Some(texture);
        Ok(())
    }
}
