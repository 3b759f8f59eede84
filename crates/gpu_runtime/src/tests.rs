use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

use trajectories::{BufferEncoding, Colorize};

use super::*;

fn test_context() -> Option<Context> {
    match Context::new(ContextDescriptor {
        relaxed_limits: true,
        ..Default::default()
    }) {
        Ok(context) => Some(context),
        Err(error) => {
            eprintln!("skipping GPU test: {error}");
            None
        }
    }
}

#[test]
fn mip_level_count_reaches_one_texel() {
    assert_eq!(mip_level_count(1, 1), 1);
    assert_eq!(mip_level_count(2, 1), 2);
    assert_eq!(mip_level_count(256, 256), 9);
    assert_eq!(mip_level_count(300, 17), 9);
    assert_eq!(mip_level_count(0, 0), 1);
}

#[test]
fn padded_rows_are_aligned_to_copy_alignment() {
    assert_eq!(padded_bytes_per_row(4), 256);
    assert_eq!(padded_bytes_per_row(256), 256);
    assert_eq!(padded_bytes_per_row(257), 512);
}

#[test]
fn strip_row_padding_keeps_texel_bytes_only() {
    let mut padded = vec![0xEEu8; 256 * 2];
    padded[..4].copy_from_slice(&[1, 2, 3, 4]);
    padded[256..260].copy_from_slice(&[5, 6, 7, 8]);
    assert_eq!(
        strip_row_padding(&padded, 4, 256, 2),
        vec![1, 2, 3, 4, 5, 6, 7, 8]
    );
}

#[test]
fn check_limits_rejects_small_storage_bindings() {
    let limits = wgpu::Limits::downlevel_defaults();
    assert!(matches!(
        check_limits(&limits, false),
        Err(ContextError::StorageBufferBindingTooSmall { .. })
    ));
    assert_eq!(check_limits(&limits, true), Ok(()));
}

#[test]
fn linear_workgroups_spill_into_y() {
    assert_eq!(linear_workgroups(0), [0, 0, 1]);
    assert_eq!(linear_workgroups(1), [1, 1, 1]);
    assert_eq!(linear_workgroups(256 * 65_535), [65_535, 1, 1]);
    assert_eq!(linear_workgroups(256 * 65_535 + 1), [65_535, 2, 1]);
}

#[test]
fn workgroups_for_rounds_up() {
    assert_eq!(
        ComputeShader::BufferToTexture.workgroups_for(17, 16, 1),
        [2, 1, 1]
    );
    assert_eq!(ComputeShader::TileNormals.workgroups_for(256, 256, 3), [32, 32, 3]);
}

#[test]
fn colorize_params_carry_palette_and_flags() {
    let colorize = Colorize {
        color_bounds: (0.0, 10.0),
        transparency_bounds: (1.0, 1.0),
        interpolate: true,
        color_encoding: BufferEncoding::UnsignedInteger,
        transparency_encoding: BufferEncoding::FloatBits,
    };
    let params = ColorizeParams::new(&colorize, 3, 2, false);
    assert_eq!(params.size, [3, 2]);
    assert_eq!(params.use_interpolation, 1);
    assert_eq!(params.use_transparency, 0);
    assert_eq!(params.color_encoding, 1);
    assert_eq!(params.transparency_encoding, 0);
    assert_eq!(params.palette[0][3], 1.0);
    assert_eq!(bytemuck::bytes_of(&params).len(), 368);
}

struct ReadyAfter {
    polls_left: u32,
}

impl Future for ReadyAfter {
    type Output = u32;

    fn poll(mut self: Pin<&mut Self>, _context: &mut std::task::Context<'_>) -> Poll<u32> {
        if self.polls_left == 0 {
            return Poll::Ready(7);
        }
        self.polls_left -= 1;
        Poll::Pending
    }
}

#[test]
fn block_on_local_polls_until_ready() {
    assert_eq!(block_on_local(ReadyAfter { polls_left: 3 }), 7);
}

#[test]
fn fill_and_read_back_storage_buffer() {
    let Some(context) = test_context() else {
        return;
    };
    let buffer = StorageBuffer::new(
        context.device(),
        "tests.fill",
        1000,
        wgpu::BufferUsages::COPY_SRC,
    );
    let mut encoder = context
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tests.fill"),
        });
    buffer.record_fill(context.device(), context.pipelines(), &mut encoder, 0xDEAD_BEEF);
    context.queue().submit(Some(encoder.finish()));

    let bytes = context
        .block_on(buffer.read(context.device(), context.queue()))
        .expect("buffer read");
    let values: &[u32] = bytemuck::cast_slice(&bytes);
    assert_eq!(values.len(), 1000);
    assert!(values.iter().all(|value| *value == 0xDEAD_BEEF));
}

#[test]
fn texture_round_trips_through_readback() {
    let Some(context) = test_context() else {
        return;
    };
    let texels: Vec<u8> = (0..5 * 3 * 4).map(|value| value as u8).collect();
    let texture = GpuTexture::with_data(
        context.device(),
        context.queue(),
        "tests.texture",
        5,
        3,
        wgpu::TextureFormat::Rgba8Unorm,
        wgpu::TextureUsages::COPY_SRC,
        &texels,
    );
    let bytes = context
        .block_on(texture.read(context.device(), context.queue()).into_bytes())
        .expect("texture read");
    assert_eq!(bytes, texels);
}

#[test]
fn submitted_work_resolves() {
    let Some(context) = test_context() else {
        return;
    };
    context.queue().submit(None);
    assert_eq!(context.block_on(SubmittedWork::new(context.queue())), Ok(()));
}
