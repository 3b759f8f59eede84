use std::io::Cursor;

use glam::DVec2;

use super::*;

fn try_create_device_queue() -> Option<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok()?;
        let limits = adapter.limits();
        adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("tiles tests"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .ok()
    })
}

macro_rules! device_or_skip {
    () => {
        match try_create_device_queue() {
            Some(device_queue) => device_queue,
            None => {
                eprintln!("skipping: no wgpu adapter available");
                return;
            }
        }
    };
}

fn read_buffer(device: &wgpu::Device, queue: &wgpu::Queue, source: &wgpu::Buffer) -> Vec<u8> {
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("tiles tests readback"),
        size: source.size(),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("tiles tests readback"),
    });
    encoder.copy_buffer_to_buffer(source, 0, &readback, 0, source.size());
    queue.submit(Some(encoder.finish()));

    let slice = readback.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        sender.send(result).expect("map callback send");
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .expect("device poll");
    receiver
        .recv()
        .expect("map callback recv")
        .expect("map readback");
    let bytes = slice.get_mapped_range().to_vec();
    readback.unmap();
    bytes
}

fn encode_png(width: u32, height: u32, pixel: impl Fn(u32, u32) -> [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_fn(width, height, |x, y| image::Rgba(pixel(x, y)));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encode png");
    bytes
}

#[test]
fn parent_halves_coordinates_and_drops_one_zoom_level() {
    let tile = TileId::new(5, 13, 6);
    assert_eq!(tile.parent(), Some(TileId::new(4, 6, 3)));
    assert_eq!(TileId::new(0, 0, 0).parent(), None);
    assert_eq!(tile.ancestor(2), Some(TileId::new(3, 3, 1)));
    assert_eq!(tile.ancestor(6), None);
}

#[test]
fn children_cover_the_parent_quadrants() {
    let tile = TileId::new(2, 1, 3);
    let children = tile.children().expect("children below max zoom");
    assert_eq!(
        children,
        [
            TileId::new(3, 2, 6),
            TileId::new(3, 3, 6),
            TileId::new(3, 2, 7),
            TileId::new(3, 3, 7),
        ]
    );
    for child in children {
        assert_eq!(child.parent(), Some(tile));
    }
    assert!(TileId::new(MAX_ZOOM_LEVEL, 0, 0).children().is_none());
}

#[test]
fn invalid_tile_is_never_valid_and_has_no_parent() {
    assert!(!TileId::INVALID.is_valid());
    assert_eq!(TileId::INVALID.parent(), None);
    assert_eq!(TileId::INVALID.to_string(), "tile(invalid)");
    assert_eq!(TileId::new(3, 1, 2).to_string(), "tile(3/1/2)");
}

#[test]
#[should_panic(expected = "out of bounds")]
fn tile_coordinates_outside_the_zoom_grid_panic() {
    let _ = TileId::new(2, 4, 0);
}

#[test]
fn tile_ids_order_by_zoom_then_x_then_y() {
    let mut ids = vec![
        TileId::new(2, 1, 0),
        TileId::new(1, 1, 1),
        TileId::new(2, 0, 3),
        TileId::new(2, 0, 1),
    ];
    ids.sort();
    assert_eq!(
        ids,
        vec![
            TileId::new(1, 1, 1),
            TileId::new(2, 0, 1),
            TileId::new(2, 0, 3),
            TileId::new(2, 1, 0),
        ]
    );
}

#[test]
fn gpu_tile_id_round_trips_and_pads_with_max() {
    let tile = TileId::new(7, 100, 27);
    let gpu = tile.to_gpu();
    assert_eq!(gpu.padding, u32::MAX);
    assert_eq!(TileId::from(gpu), tile);
    assert_eq!(bytemuck::bytes_of(&gpu).len(), 16);
}

#[test]
fn zoom_zero_tile_covers_the_mercator_square() {
    let bounds = tile_bounds(TileId::new(0, 0, 0));
    assert_eq!(bounds.min, DVec2::splat(-ORIGIN_SHIFT));
    assert_eq!(bounds.max, DVec2::splat(ORIGIN_SHIFT));
}

#[test]
fn tms_y_grows_north() {
    let north_east = tile_bounds(TileId::new(1, 1, 1));
    assert_eq!(north_east.min, DVec2::ZERO);
    assert_eq!(north_east.max, DVec2::splat(ORIGIN_SHIFT));
    let south_west = tile_bounds(TileId::new(1, 0, 0));
    assert_eq!(south_west.max, DVec2::ZERO);
}

#[test]
fn world_points_map_to_containing_tiles_and_clamp_outside() {
    assert_eq!(
        world_xy_to_tile_id(DVec2::new(1.0, -1.0), 1),
        TileId::new(1, 1, 0)
    );
    assert_eq!(
        world_xy_to_tile_id(DVec2::splat(-ORIGIN_SHIFT * 2.0), 3),
        TileId::new(3, 0, 0)
    );
    assert_eq!(
        world_xy_to_tile_id(DVec2::splat(ORIGIN_SHIFT * 2.0), 3),
        TileId::new(3, 7, 7)
    );
}

#[test]
fn region_covering_an_aabb_lists_tiles_row_major_inclusive() {
    let extent = tile_extent(4);
    let origin = tile_bounds(TileId::new(4, 5, 9)).min;
    let aabb = Aabb2::try_new(
        origin + DVec2::new(0.25 * extent, 0.5 * extent),
        origin + DVec2::new(1.5 * extent, 2.5 * extent),
    )
    .expect("valid aabb");
    let region = RectangularTileRegion::covering(&aabb, 4);
    assert_eq!(region.min, (5, 9));
    assert_eq!(region.max, (6, 11));
    let tiles = region.tiles();
    assert_eq!(tiles.len(), region.tile_count());
    assert_eq!(tiles[0], TileId::new(4, 5, 9));
    assert_eq!(tiles[1], TileId::new(4, 6, 9));
    assert_eq!(tiles[5], TileId::new(4, 6, 11));
}

#[test]
fn aabb_max_on_a_tile_border_does_not_pull_in_the_next_tile() {
    let bounds = tile_bounds(TileId::new(3, 2, 2));
    let tiles = tile_ids_for_aabb(&bounds, 3);
    assert_eq!(tiles, vec![TileId::new(3, 2, 2)]);
}

#[test]
fn grid_snapped_aabb_covers_only_its_own_tiles() {
    let extent = tile_extent(3);
    let min = tile_bounds(TileId::new(3, 2, 2)).min;
    let aabb = Aabb2::try_new(min, min + DVec2::splat(2.0 * extent)).expect("aabb");
    let region = RectangularTileRegion::covering(&aabb, 3);
    assert_eq!(region.min, (2, 2));
    assert_eq!(region.max, (3, 3));

    let single = Aabb2::try_new(min, min + DVec2::splat(extent)).expect("aabb");
    assert_eq!(tile_ids_for_aabb(&single, 3), vec![TileId::new(3, 2, 2)]);

    let zoom_8 = tile_bounds(TileId::new(8, 100, 57));
    assert_eq!(tile_ids_for_aabb(&zoom_8, 8), vec![TileId::new(8, 100, 57)]);
}

#[test]
fn aabb_crossing_a_border_keeps_both_tiles() {
    let bounds = tile_bounds(TileId::new(3, 2, 2));
    let nudge = tile_extent(3) * 0.01;
    let aabb = Aabb2::try_new(bounds.min, bounds.max + DVec2::new(nudge, 0.0)).expect("aabb");
    assert_eq!(
        tile_ids_for_aabb(&aabb, 3),
        vec![TileId::new(3, 2, 2), TileId::new(3, 3, 2)]
    );
}

#[test]
fn aabb_rejects_non_increasing_axes() {
    let error = Aabb2::try_new(DVec2::new(5.0, 0.0), DVec2::new(5.0, 1.0)).unwrap_err();
    assert_eq!(error.to_string(), "x_min (5) must not be >= x_max (5)");
    let error = Aabb2::try_new(DVec2::new(0.0, 2.0), DVec2::new(1.0, 1.0)).unwrap_err();
    assert_eq!(error.to_string(), "y_min (2) must not be >= y_max (1)");
}

#[test]
fn ground_scale_is_one_at_the_equator_and_shrinks_poleward() {
    assert_eq!(ground_scale_factor(0.0), 1.0);
    assert!(ground_scale_factor(5_000_000.0) < 1.0);
}

#[test]
fn probe_table_finds_every_stored_key() {
    let mut entries = std::collections::BTreeMap::new();
    let region = RectangularTileRegion {
        min: (0, 0),
        max: (7, 7),
        zoom: 3,
    };
    for (index, tile) in region.tiles().into_iter().enumerate() {
        entries.insert(tile, index as u32);
    }
    let table = build_probe_table(&entries, 128);
    for (tile, value) in &entries {
        assert_eq!(table.get(*tile), *value);
    }
    assert_eq!(table.get(TileId::new(4, 0, 0)), EMPTY_VALUE);
    assert_eq!(table.get(TileId::INVALID), EMPTY_VALUE);
}

#[test]
fn probe_table_occupies_exactly_one_slot_per_key_under_collisions() {
    let mut entries = std::collections::BTreeMap::new();
    for x in 0..8 {
        entries.insert(TileId::new(3, x, 1), x + 10);
    }
    let table = build_probe_table(&entries, 8);
    let empty = GpuTileId::from(TileId::INVALID);
    assert!(table.keys.iter().all(|key| *key != empty));
    for (tile, value) in &entries {
        let occurrences = table
            .keys
            .iter()
            .filter(|key| **key == GpuTileId::from(*tile))
            .count();
        assert_eq!(occurrences, 1);
        assert_eq!(table.get(*tile), *value);
    }
}

#[test]
#[should_panic(expected = "hash map overflow")]
fn probe_table_panics_when_keys_exceed_capacity() {
    let mut entries = std::collections::BTreeMap::new();
    for x in 0..5 {
        entries.insert(TileId::new(3, x, 0), x);
    }
    let _ = build_probe_table(&entries, 4);
}

#[test]
fn height_decode_truncates_the_blue_channel() {
    assert_eq!(decode_height(0, 0, 0), 0);
    assert_eq!(decode_height(1, 2, 255), 258);
    assert_eq!(decode_height(255, 255, 255), u16::MAX);
}

#[test]
fn png_tiles_decode_into_the_declared_format() {
    let png = encode_png(3, 2, |x, y| [0, x as u8, y as u8 * 128, 255]);
    let config = TileStorageConfig {
        width: 3,
        height: 2,
        capacity: 1,
        format: TileStorageFormat::R16Uint,
        usage: wgpu::TextureUsages::COPY_DST,
    };
    let texels = decode_tile_png(&png, config).expect("decode heights");
    let heights: Vec<u16> = texels
        .chunks_exact(2)
        .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
        .collect();
    assert_eq!(heights, vec![0, 1, 2, 0, 1, 2]);

    let rgba = decode_tile_png(
        &png,
        TileStorageConfig {
            format: TileStorageFormat::Rgba8Unorm,
            ..config
        },
    )
    .expect("decode rgba");
    assert_eq!(rgba.len(), 3 * 2 * 4);
    assert_eq!(&rgba[4..8], &[0, 1, 0, 255]);
}

#[test]
fn png_tiles_with_wrong_resolution_are_rejected() {
    let png = encode_png(4, 4, |_, _| [0, 0, 0, 255]);
    let error = decode_tile_png(&png, TileStorageConfig::heights(1)).unwrap_err();
    assert_eq!(
        error,
        TileStoreError::ResolutionMismatch {
            expected: (65, 65),
            actual: (4, 4),
        }
    );
}

#[test]
fn storage_reserves_first_free_slot_and_clear_frees_without_reuse_delay() {
    let (device, _queue) = device_or_skip!();
    let mut storage =
        TileStorageTexture::new(&device, TileStorageConfig::heights(3)).expect("create storage");
    assert_eq!(storage.reserve(), Ok(0));
    assert_eq!(storage.reserve(), Ok(1));
    storage.reserve_at(2).expect("reserve last slot");
    assert_eq!(
        storage.reserve(),
        Err(TileStoreError::CapacityExceeded {
            capacity: 3,
            requested: 4,
        })
    );
    storage.clear_slot(1);
    assert_eq!(storage.num_used(), 2);
    assert_eq!(storage.used_layer_indices(), vec![0, 2]);
    assert_eq!(storage.reserve(), Ok(1));
    storage.clear();
    assert_eq!(storage.num_used(), 0);
    assert!(storage.used_layer_indices().is_empty());
}

#[test]
fn storage_store_decodes_png_into_first_free_layer() {
    let (device, queue) = device_or_skip!();
    let mut storage =
        TileStorageTexture::new(&device, TileStorageConfig::heights(2)).expect("create storage");
    let png = encode_png(65, 65, |_, _| [1, 0, 0, 255]);
    assert_eq!(storage.store(&queue, &png), Ok(0));
    assert_eq!(storage.store(&queue, &png), Ok(1));
    assert!(matches!(
        storage.store(&queue, &png),
        Err(TileStoreError::CapacityExceeded { .. })
    ));
}

#[test]
fn hash_map_gpu_buffers_match_the_probe_table_after_update() {
    let (device, queue) = device_or_skip!();
    let mut map = GpuHashMap::with_capacity(&device, 64);
    map.store(TileId::new(2, 1, 1), 4);
    map.store(TileId::new(2, 3, 0), 7);
    map.store(TileId::new(1, 0, 1), 9);
    map.update_gpu_data(&queue);

    let table = map.probe_table();
    let keys = read_buffer(&device, &queue, map.key_buffer());
    let values = read_buffer(&device, &queue, map.value_buffer());
    assert_eq!(keys, bytemuck::cast_slice::<GpuTileId, u8>(&table.keys));
    assert_eq!(values, bytemuck::cast_slice::<u32, u8>(&table.values));

    assert_eq!(map.value_at(TileId::new(2, 3, 0)), Some(7));
    assert_eq!(map.key_with_value(9), Some(TileId::new(1, 0, 1)));
    assert_eq!(map.key_with_value(100), None);
}

#[test]
fn duplicated_hash_map_is_independent() {
    let (device, queue) = device_or_skip!();
    let mut map = GpuHashMap::with_capacity(&device, 16);
    map.store(TileId::new(1, 1, 1), 0);
    let mut copy = map.duplicate(&device, &queue);
    copy.store(TileId::new(1, 0, 0), 1);
    assert_eq!(map.len(), 1);
    assert_eq!(copy.len(), 2);
}
