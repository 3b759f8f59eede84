use wgpu::util::DeviceExt;

use crate::pipelines::{ComputeShader, PipelineManager, linear_workgroups};
use crate::tasks::BufferRead;
use crate::uniforms::FillParams;

pub const MAX_TEXTURE_DIMENSION: u32 = 8192;

/// Number of mip levels down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

pub fn padded_bytes_per_row(unpadded: u32) -> u32 {
    unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// A single 2-D texture with a full-resource view.
pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

impl GpuTexture {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        mip_level_count: u32,
    ) -> Self {
        assert!(width > 0 && height > 0, "texture must not be empty");
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
            format,
        }
    }

    /// Uploads tightly packed texels into mip level 0.
    pub fn with_data(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        texels: &[u8],
    ) -> Self {
        let texture = Self::new(
            device,
            label,
            width,
            height,
            format,
            usage | wgpu::TextureUsages::COPY_DST,
            1,
        );
        texture.write(queue, texels);
        texture
    }

    pub fn write(&self, queue: &wgpu::Queue, texels: &[u8]) {
        let bytes_per_row = self.unpadded_bytes_per_row();
        assert_eq!(
            texels.len(),
            bytes_per_row as usize * self.height as usize,
            "texel data does not match texture size"
        );
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn mip_level_count(&self) -> u32 {
        self.texture.mip_level_count()
    }

    pub fn mip_view(&self, level: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("gpu_runtime.texture.mip_view"),
            base_mip_level: level,
            mip_level_count: Some(1),
            ..Default::default()
        })
    }

    pub fn unpadded_bytes_per_row(&self) -> u32 {
        let block_size = self
            .format
            .block_copy_size(None)
            .unwrap_or_else(|| panic!("format {:?} has no block copy size", self.format));
        self.width * block_size
    }

    /// Copies mip level 0 into a fresh readback buffer; resolves to tightly
    /// packed rows.
    pub fn read(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> TextureRead {
        read_texture_layer(device, queue, &self.texture, 0, self.width, self.height, self.format)
    }
}

/// A storage buffer of `u32` elements.
pub struct StorageBuffer {
    buffer: wgpu::Buffer,
    len: u64,
}

impl StorageBuffer {
    pub fn new(device: &wgpu::Device, label: &str, len: u64, usage: wgpu::BufferUsages) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: len.max(1) * 4,
            usage: wgpu::BufferUsages::STORAGE | usage,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            len: len.max(1),
        }
    }

    pub fn with_data(
        device: &wgpu::Device,
        label: &str,
        data: &[u32],
        usage: wgpu::BufferUsages,
    ) -> Self {
        assert!(!data.is_empty(), "storage buffer data must not be empty");
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(data),
            usage: wgpu::BufferUsages::STORAGE | usage,
        });
        Self {
            buffer,
            len: data.len() as u64,
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn size_bytes(&self) -> u64 {
        self.len * 4
    }

    /// Records a pass setting every element to `value`.
    pub fn record_fill(
        &self,
        device: &wgpu::Device,
        pipelines: &PipelineManager,
        encoder: &mut wgpu::CommandEncoder,
        value: u32,
    ) {
        let count = u32::try_from(self.len).unwrap_or_else(|_| {
            panic!("storage buffer of {} elements is too large to fill", self.len)
        });
        let params = create_uniform_buffer(
            device,
            "gpu_runtime.fill_u32.params",
            &FillParams {
                value,
                count,
                padding: [0; 2],
            },
        );
        let bind_group = pipelines.bind_group(
            device,
            ComputeShader::FillU32,
            &[params.as_entire_binding(), self.buffer.as_entire_binding()],
        );
        pipelines.dispatch(
            encoder,
            ComputeShader::FillU32,
            &bind_group,
            linear_workgroups(count),
        );
    }

    /// Copies the whole buffer into a readback buffer.
    pub fn read(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> BufferRead {
        read_buffer(device, queue, &self.buffer, self.size_bytes())
    }
}

pub fn create_uniform_buffer<T: bytemuck::Pod>(
    device: &wgpu::Device,
    label: &str,
    value: &T,
) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(value),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

pub fn create_storage_buffer_init<T: bytemuck::Pod>(
    device: &wgpu::Device,
    label: &str,
    data: &[T],
) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(data),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
    })
}

/// Copies the first `size` bytes of `source` (which needs `COPY_SRC`) and
/// maps the copy.
pub fn read_buffer(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &wgpu::Buffer,
    size: u64,
) -> BufferRead {
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("gpu_runtime.readback"),
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("gpu_runtime.readback_encoder"),
    });
    encoder.copy_buffer_to_buffer(source, 0, &readback, 0, size);
    queue.submit(Some(encoder.finish()));
    BufferRead::new(readback)
}

/// Pending texture readback; strips the 256-byte row padding on
/// completion.
pub struct TextureRead {
    read: BufferRead,
    unpadded_bytes_per_row: u32,
    padded_bytes_per_row: u32,
    height: u32,
}

impl TextureRead {
    pub async fn into_bytes(self) -> Result<Vec<u8>, crate::GpuTaskError> {
        let padded = self.read.await?;
        Ok(strip_row_padding(
            &padded,
            self.unpadded_bytes_per_row,
            self.padded_bytes_per_row,
            self.height,
        ))
    }
}

pub fn strip_row_padding(padded: &[u8], unpadded: u32, padded_row: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(unpadded as usize * height as usize);
    for row in 0..height as usize {
        let start = row * padded_row as usize;
        bytes.extend_from_slice(&padded[start..start + unpadded as usize]);
    }
    bytes
}

/// Reads one array layer (or a plain 2-D texture with `layer = 0`) at mip
/// level 0.
pub fn read_texture_layer(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    layer: u32,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> TextureRead {
    let block_size = format
        .block_copy_size(None)
        .unwrap_or_else(|| panic!("format {format:?} has no block copy size"));
    let unpadded_bytes_per_row = width * block_size;
    let padded_bytes_per_row = padded_bytes_per_row(unpadded_bytes_per_row);
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("gpu_runtime.texture_readback"),
        size: padded_bytes_per_row as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("gpu_runtime.texture_readback_encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: 0,
                y: 0,
                z: layer,
            },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));
    TextureRead {
        read: BufferRead::new(readback),
        unpadded_bytes_per_row,
        padded_bytes_per_row,
        height,
    }
}
