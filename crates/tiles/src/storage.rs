use bitvec::prelude::{BitVec, Lsb0};

use crate::TileStoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStorageFormat {
    /// Decoded heights, one `u16` per texel.
    R16Uint,
    /// Colour, normal, direction and release tiles.
    Rgba8Unorm,
    R32Float,
}

impl TileStorageFormat {
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TileStorageFormat::R16Uint => wgpu::TextureFormat::R16Uint,
            TileStorageFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TileStorageFormat::R32Float => wgpu::TextureFormat::R32Float,
        }
    }

    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TileStorageFormat::R16Uint => 2,
            TileStorageFormat::Rgba8Unorm | TileStorageFormat::R32Float => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TileStorageConfig {
    pub width: u32,
    pub height: u32,
    pub capacity: u32,
    pub format: TileStorageFormat,
    pub usage: wgpu::TextureUsages,
}

impl TileStorageConfig {
    /// 65x65 R16Uint height tiles, written from the CPU.
    pub fn heights(capacity: u32) -> Self {
        Self {
            width: 65,
            height: 65,
            capacity,
            format: TileStorageFormat::R16Uint,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
        }
    }

    /// RGBA8 tiles written by compute shaders.
    pub fn rgba8_storage(width: u32, height: u32, capacity: u32) -> Self {
        Self {
            width,
            height,
            capacity,
            format: TileStorageFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
        }
    }
}

/// Texture array with one tile per layer and CPU-side slot bookkeeping.
#[derive(Debug)]
pub struct TileStorageTexture {
    config: TileStorageConfig,
    used: BitVec<u64, Lsb0>,
    num_used: u32,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

impl TileStorageTexture {
    pub fn new(device: &wgpu::Device, config: TileStorageConfig) -> Result<Self, TileStoreError> {
        validate_config(device, config)?;
        let format = config.format.to_wgpu();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tiles.storage"),
            size: wgpu::Extent3d {
                width: config.width,
                height: config.height,
                depth_or_array_layers: config.capacity,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: config.usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("tiles.storage.array_view"),
            format: Some(format),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            usage: None,
            aspect: wgpu::TextureAspect::All,
            base_mip_level: 0,
            mip_level_count: Some(1),
            base_array_layer: 0,
            array_layer_count: Some(config.capacity),
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("tiles.storage.sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            config,
            used: BitVec::repeat(false, config.capacity as usize),
            num_used: 0,
            texture,
            view,
            sampler,
        })
    }

    /// Decodes `png_bytes` into the first free layer and returns that layer.
    pub fn store(&mut self, queue: &wgpu::Queue, png_bytes: &[u8]) -> Result<u32, TileStoreError> {
        let texels = decode_tile_png(png_bytes, self.config)?;
        let slot = self.reserve()?;
        self.write_layer(queue, slot, &texels)?;
        Ok(slot)
    }

    pub fn store_at(
        &mut self,
        queue: &wgpu::Queue,
        slot: u32,
        png_bytes: &[u8],
    ) -> Result<(), TileStoreError> {
        let texels = decode_tile_png(png_bytes, self.config)?;
        self.store_raw(queue, slot, &texels)
    }

    /// Writes already decoded texels and marks `slot` used.
    pub fn store_raw(
        &mut self,
        queue: &wgpu::Queue,
        slot: u32,
        texels: &[u8],
    ) -> Result<(), TileStoreError> {
        self.check_slot(slot)?;
        self.write_layer(queue, slot, texels)?;
        if !self.used[slot as usize] {
            self.used.set(slot as usize, true);
            self.num_used += 1;
        }
        Ok(())
    }

    /// Reserves the first free layer without writing pixels; a shader is
    /// expected to fill it.
    pub fn reserve(&mut self) -> Result<u32, TileStoreError> {
        let Some(slot) = self.used.first_zero() else {
            return Err(TileStoreError::CapacityExceeded {
                capacity: self.config.capacity,
                requested: self.num_used + 1,
            });
        };
        self.used.set(slot, true);
        self.num_used += 1;
        Ok(slot as u32)
    }

    pub fn reserve_at(&mut self, slot: u32) -> Result<(), TileStoreError> {
        self.check_slot(slot)?;
        assert!(
            !self.used[slot as usize],
            "tile storage slot {slot} is already reserved"
        );
        self.used.set(slot as usize, true);
        self.num_used += 1;
        Ok(())
    }

    /// Frees every slot. Pixel data is left untouched.
    pub fn clear(&mut self) {
        self.used.fill(false);
        self.num_used = 0;
    }

    pub fn clear_slot(&mut self, slot: u32) {
        assert!(
            slot < self.config.capacity,
            "tile storage slot {slot} out of range"
        );
        if self.used[slot as usize] {
            self.used.set(slot as usize, false);
            self.num_used -= 1;
        }
    }

    pub fn is_used(&self, slot: u32) -> bool {
        self.used.get(slot as usize).is_some_and(|bit| *bit)
    }

    pub fn used_layer_indices(&self) -> Vec<u32> {
        self.used.iter_ones().map(|slot| slot as u32).collect()
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    pub fn capacity(&self) -> u32 {
        self.config.capacity
    }

    pub fn num_used(&self) -> u32 {
        self.num_used
    }

    pub fn format(&self) -> TileStorageFormat {
        self.config.format
    }

    pub fn config(&self) -> TileStorageConfig {
        self.config
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn layer_byte_len(&self) -> usize {
        self.config.width as usize
            * self.config.height as usize
            * self.config.format.bytes_per_texel() as usize
    }

    /// Uploads texels into `slot` without touching occupancy.
    pub fn write_layer(
        &self,
        queue: &wgpu::Queue,
        slot: u32,
        texels: &[u8],
    ) -> Result<(), TileStoreError> {
        self.check_slot(slot)?;
        if texels.len() != self.layer_byte_len() {
            return Err(TileStoreError::TexelLengthMismatch {
                expected: self.layer_byte_len(),
                actual: texels.len(),
            });
        }
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: slot,
                },
                aspect: wgpu::TextureAspect::All,
            },
            texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.config.width * self.config.format.bytes_per_texel()),
                rows_per_image: Some(self.config.height),
            },
            wgpu::Extent3d {
                width: self.config.width,
                height: self.config.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    pub fn copy_layer_to(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source_slot: u32,
        target: &TileStorageTexture,
        target_slot: u32,
    ) {
        assert!(
            self.config.width == target.config.width
                && self.config.height == target.config.height
                && self.config.format == target.config.format,
            "layer copies require matching tile storage layouts"
        );
        assert!(source_slot < self.config.capacity && target_slot < target.config.capacity);
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: source_slot,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: target_slot,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: self.config.width,
                height: self.config.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn check_slot(&self, slot: u32) -> Result<(), TileStoreError> {
        if slot >= self.config.capacity {
            return Err(TileStoreError::SlotOutOfRange {
                slot,
                capacity: self.config.capacity,
            });
        }
        Ok(())
    }
}

fn validate_config(device: &wgpu::Device, config: TileStorageConfig) -> Result<(), TileStoreError> {
    if config.width == 0 || config.height == 0 || config.capacity == 0 {
        return Err(TileStoreError::ZeroSized);
    }
    let limits = device.limits();
    if config.capacity > limits.max_texture_array_layers {
        return Err(TileStoreError::CapacityExceedsDeviceLimit {
            capacity: config.capacity,
            limit: limits.max_texture_array_layers,
        });
    }
    if config.width > limits.max_texture_dimension_2d
        || config.height > limits.max_texture_dimension_2d
    {
        return Err(TileStoreError::SizeExceedsDeviceLimit);
    }
    if !supports_texture_usage_for_format(device, config.format.to_wgpu(), config.usage) {
        return Err(TileStoreError::UnsupportedFormatUsage);
    }
    Ok(())
}

fn supports_texture_usage_for_format(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> bool {
    let error_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let _probe_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("tiles.format_usage_probe"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });
    pollster::block_on(error_scope.pop()).is_none()
}

/// Decodes the PNG red/green/blue channels into `u16` heights,
/// `((r * 256 + g) * 256 + b) / 256` truncated.
pub fn decode_height(r: u8, g: u8, b: u8) -> u16 {
    let encoded = (u32::from(r) * 256 + u32::from(g)) * 256 + u32::from(b);
    (encoded / 256) as u16
}

/// Decodes an encoded tile image into texel bytes of `config.format`.
pub fn decode_tile_png(bytes: &[u8], config: TileStorageConfig) -> Result<Vec<u8>, TileStoreError> {
    let image = image::load_from_memory(bytes)
        .map_err(|error| TileStoreError::Decode(error.to_string()))?
        .to_rgba8();
    if image.width() != config.width || image.height() != config.height {
        return Err(TileStoreError::ResolutionMismatch {
            expected: (config.width, config.height),
            actual: (image.width(), image.height()),
        });
    }
    let texels = match config.format {
        TileStorageFormat::Rgba8Unorm => image.into_raw(),
        TileStorageFormat::R16Uint => image
            .pixels()
            .flat_map(|pixel| decode_height(pixel[0], pixel[1], pixel[2]).to_le_bytes())
            .collect(),
        TileStorageFormat::R32Float => image
            .pixels()
            .flat_map(|pixel| {
                let height = f32::from(pixel[0]) * 256.0
                    + f32::from(pixel[1])
                    + f32::from(pixel[2]) / 256.0;
                height.to_le_bytes()
            })
            .collect(),
    };
    Ok(texels)
}
