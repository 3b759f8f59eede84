use std::path::{Path, PathBuf};

use glam::{DVec2, IVec2, Vec2};
use gpu_runtime::{ContextDescriptor, Executor, GpuTexture, read_texture_layer};
use node_graph::RasterDimensions;
use tiles::{Aabb2, TileId, TileStorageConfig, TileStorageTexture, tile_bounds, tile_extent};
use trajectories::{
    D8_OFFSETS, LayerKind, PhysicsModel, RAMP_PALETTE, TRAVEL_ANGLE_EMPTY, TerrainRasters,
    TrajectoryLayers, TrajectorySettings, simulate,
};

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

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("nodes-tests-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

fn aabb(min: (f64, f64), max: (f64, f64)) -> Aabb2 {
    Aabb2::try_new(DVec2::new(min.0, min.1), DVec2::new(max.0, max.1)).expect("valid aabb")
}

#[test]
fn region_aabb_round_trips_through_text() {
    let region = aabb((1_234.5678, -98_765.4321), (1_300.125, -98_000.0));
    let text = format_region_aabb(&region);
    assert_eq!(parse_region_aabb(&text, "region.txt"), Ok(region));
}

#[test]
fn region_aabb_ignores_trailing_blank_lines() {
    let parsed = parse_region_aabb("0\n1\n2\n3\n\n  \n", "region.txt").expect("parse");
    assert_eq!(parsed, aabb((0.0, 1.0), (2.0, 3.0)));
}

#[test]
fn region_aabb_reports_the_bad_line() {
    let error = parse_region_aabb("0\nabc\n2\n3\n", "a.txt").unwrap_err();
    assert_eq!(
        error.to_string(),
        "Failed to parse file a.txt: Could not convert \"abc\" to float (line 2)"
    );
}

#[test]
fn region_aabb_rejects_wrong_line_counts_and_empty_ranges() {
    assert!(matches!(
        parse_region_aabb("0\n1\n2\n", "a.txt"),
        Err(AabbParseError::LineCount { count: 3, .. })
    ));
    let error = parse_region_aabb("5\n0\n1\n3\n", "a.txt").unwrap_err();
    assert_eq!(error.to_string(), "x_min (5) must not be >= x_max (1)");
}

#[test]
fn select_tiles_covers_a_region_inside_one_tile() {
    let tile = TileId::new(14, 8_000, 9_000);
    let bounds = tile_bounds(tile);
    let region = aabb(
        (bounds.min.x + 10.0, bounds.min.y + 10.0),
        (bounds.max.x - 10.0, bounds.max.y - 10.0),
    );
    let settings = SelectTilesSettings::default();
    let (ids, covered) = select_tiles(&region, &settings).expect("select");
    assert_eq!(ids, vec![tile]);
    assert_eq!(covered.min, bounds.min);
    let texel = tile_extent(14) / 64.0;
    assert!((covered.max.x - (bounds.max.x - texel)).abs() < 1e-6);
    assert!((covered.max.y - (bounds.max.y - texel)).abs() < 1e-6);
}

#[test]
fn select_tiles_rejects_zoom_beyond_the_pyramid() {
    let settings = SelectTilesSettings {
        zoom_level: 40,
        ..Default::default()
    };
    assert!(select_tiles(&aabb((0.0, 0.0), (1.0, 1.0)), &settings).is_err());
}

#[test]
fn tile_urls_follow_the_scheme() {
    let id = TileId::new(3, 2, 1);
    let tms = FileTileSource::new("tiles/{z}/{x}/{y}.png", TileScheme::Tms);
    assert_eq!(tms.resolve_url(id), "tiles/3/2/1.png");
    let slippy = FileTileSource::new("tiles/{z}/{x}/{y}.png", TileScheme::SlippyMap);
    assert_eq!(slippy.resolve_url(id), "tiles/3/2/6.png");
}

#[test]
fn remote_tile_urls_are_rejected() {
    let source = FileTileSource::new("https://example.com/{z}/{x}/{y}.png", TileScheme::Tms);
    assert!(matches!(
        source.load(TileId::new(1, 0, 0)),
        Err(TileSourceError::UnsupportedScheme { .. })
    ));
}

#[test]
fn file_tile_source_reads_from_disk() {
    let dir = scratch_dir("tile-source");
    std::fs::create_dir_all(dir.join("2/1")).expect("create tile dir");
    std::fs::write(dir.join("2/1/3.png"), [1u8, 2, 3]).expect("write tile");
    let template = format!("file://{}/{{z}}/{{x}}/{{y}}.png", dir.display());
    let source = FileTileSource::new(template, TileScheme::Tms);
    assert_eq!(source.load(TileId::new(2, 1, 3)), Ok(vec![1, 2, 3]));
    assert!(matches!(
        source.load(TileId::new(2, 0, 0)),
        Err(TileSourceError::Read { .. })
    ));
}

#[test]
fn d8_picks_the_steepest_drop() {
    let mut heights = vec![5.0f32; 9];
    heights[5] = 1.0;
    heights[8] = 2.0;
    let east = D8_OFFSETS
        .iter()
        .position(|offset| *offset == IVec2::new(1, 0))
        .expect("east offset") as u32;
    assert_eq!(d8_direction(&heights, 3, 3, 1, 1), east);
}

#[test]
fn d8_marks_flat_cells_as_pits() {
    let heights = vec![5.0f32; 9];
    assert_eq!(d8_direction(&heights, 3, 3, 1, 1), D8_PIT);
}

#[test]
fn snow_needs_gentle_slopes_and_altitude() {
    let settings = SnowSettings::default();
    assert_eq!(snow_alpha(&settings, 20.0, 2_000.0, 0.0), 1.0);
    assert_eq!(snow_alpha(&settings, 50.0, 2_000.0, 0.0), 0.0);
    assert_eq!(snow_alpha(&settings, 20.0, 500.0, 0.0), 0.0);
    let partial = snow_alpha(&settings, 20.0, 900.0, 0.0);
    assert!(partial > 0.0 && partial < 1.0);
}

#[test]
fn root_tile_texels_span_the_equator_unscaled() {
    let size = tile_texel_size_m(TileId::new(0, 0, 0), 65, 65);
    let expected = (tile_extent(0) / 64.0) as f32;
    assert!((size.x - expected).abs() / expected < 1e-6);
    assert!((size.y - expected).abs() / expected < 1e-6);
}

#[test]
fn region_texels_shrink_away_from_the_equator() {
    let equator = region_texel_size_m(&aabb((0.0, -50.0), (100.0, 50.0)), 10, 10);
    assert!((equator - Vec2::splat(10.0)).abs().max_element() < 1e-4);
    let north = region_texel_size_m(&aabb((0.0, 5_000_000.0), (100.0, 5_000_100.0)), 10, 10);
    assert!(north.x < 10.0 && north.y < 10.0);
}

#[test]
fn release_points_follow_slope_range_and_sampling_grid() {
    let steep = [218u8, 128, 218, 255];
    let normals = vec![steep; 16];
    let settings = ReleasePointSettings {
        min_slope_angle: 28.0,
        max_slope_angle: 60.0,
        sampling_interval: (2, 2),
    };
    let mask = release_point_mask(&normals, 4, 4, &settings);
    let selected: Vec<(u32, u32)> = (0..16u32)
        .filter(|index| mask[*index as usize])
        .map(|index| (index % 4, index / 4))
        .collect();
    assert_eq!(selected, vec![(0, 0), (2, 0), (0, 2), (2, 2)]);

    let flat = vec![[128u8, 128, 255, 255]; 16];
    assert!(release_point_mask(&flat, 4, 4, &settings).iter().all(|selected| !selected));
}

#[test]
fn release_points_reject_a_zero_sampling_interval() {
    let settings = ReleasePointSettings {
        sampling_interval: (0, 1),
        ..Default::default()
    };
    let error = settings.validate().unwrap_err();
    assert_eq!(error.message(), "sampling interval must be at least 1, got 0x1");
}

#[test]
fn parents_are_unique_and_sorted() {
    let ids = [
        TileId::new(2, 2, 2),
        TileId::new(2, 0, 0),
        TileId::new(2, 1, 1),
        TileId::new(0, 0, 0),
    ];
    assert_eq!(
        parent_tile_ids(&ids),
        vec![TileId::new(1, 0, 0), TileId::new(1, 1, 1)]
    );
}

#[test]
fn downsample_averages_the_child_mosaic() {
    let top_left: Vec<f32> = (1..=9).map(|value| value as f32).collect();
    let bottom_right = vec![10.0f32; 9];
    let other = vec![0.0f32; 9];
    let parent = downsample_tile(
        [
            [Some(top_left.as_slice()), Some(other.as_slice())],
            [Some(other.as_slice()), Some(bottom_right.as_slice())],
        ],
        3,
        3,
    );
    assert_eq!(parent.len(), 9);
    assert_eq!(parent[0], 3.0);
    assert_eq!(parent[8], 10.0);
}

#[test]
fn downsample_fills_missing_children_from_neighbours() {
    let only = vec![4.0f32; 9];
    let parent = downsample_tile([[Some(only.as_slice()), None], [None, None]], 3, 3);
    assert!(parent.iter().all(|value| *value == 4.0));
    let empty = downsample_tile([[None, None], [None, None]], 3, 3);
    assert!(empty.iter().all(|value| *value == 0.0));
}

#[test]
fn export_values_span_the_u32_range() {
    assert_eq!(encode_export_value(0.0f32.to_bits()), [0x7F, 0xFF, 0xFF, 0xFF]);
    assert_eq!(encode_export_value((-EXPORT_VALUE_LIMIT).to_bits()), [0; 4]);
    assert_eq!(encode_export_value(1.0e9f32.to_bits()), [0xFF; 4]);
    assert_eq!(encode_export_value(f32::NAN.to_bits()), [0; 4]);
}

#[test]
fn export_writes_one_rgba_texel_per_value() {
    let values = vec![0.0f32.to_bits(); 6];
    assert_eq!(encode_buffer_export(&values, 2, 2).len(), 16);
}

#[test]
fn stitching_too_many_tiles_fails_before_readback() {
    let ids = (0..200u32).flat_map(|x| (0..200u32).map(move |y| TileId::new(10, x, y)));
    let error = StitchLayout::new(ids, (64, 64), true).unwrap_err();
    assert_eq!(
        error.to_string(),
        "Stitched image size would exceed maximum size of 8192x8192 pixel for zoom level 10"
    );
}

#[test]
fn stitch_layout_places_tiles_by_orientation() {
    let ids: Vec<TileId> = (10..=12u32)
        .flat_map(|x| (20..=22u32).map(move |y| TileId::new(5, x, y)))
        .collect();
    let inverted = StitchLayout::new(ids.iter().copied(), (64, 64), true).expect("layout");
    assert_eq!(inverted.levels[&5].size_pixels, (192, 192));
    assert_eq!(inverted.tile_offset(TileId::new(5, 10, 22)), Some((0, 0)));
    assert_eq!(inverted.tile_offset(TileId::new(5, 11, 20)), Some((64, 128)));

    let upright = StitchLayout::new(ids, (64, 64), false).expect("layout");
    assert_eq!(upright.tile_offset(TileId::new(5, 10, 20)), Some((0, 0)));
    assert_eq!(upright.tile_offset(TileId::new(4, 0, 0)), None);
}

#[test]
fn removing_overlap_crops_the_shared_border() {
    let tile = ExportImage::blank(65, 65, ExportFormat::Rgba8);
    let cropped = tile.cropped(64, 64);
    assert_eq!((cropped.width, cropped.height), (64, 64));
    assert_eq!(cropped.bytes.len(), 64 * 64 * 4);
}

#[test]
fn blit_copies_rows_at_the_offset() {
    let mut target = ExportImage::blank(4, 2, ExportFormat::R16);
    let source = ExportImage {
        width: 2,
        height: 1,
        format: ExportFormat::R16,
        bytes: vec![1, 2, 3, 4],
    };
    target.blit(&source, (2, 1));
    assert_eq!(&target.bytes[12..16], &[1, 2, 3, 4]);
    assert!(target.bytes[..12].iter().all(|byte| *byte == 0));
}

#[test]
fn r16_tiles_are_written_as_rgba8_with_split_bytes() {
    let image = ExportImage {
        width: 2,
        height: 1,
        format: ExportFormat::R16,
        bytes: 0x1234u16
            .to_le_bytes()
            .into_iter()
            .chain(0xABCDu16.to_le_bytes())
            .collect(),
    };
    assert_eq!(image.to_rgba8(), vec![0x34, 0x12, 0, 255, 0xCD, 0xAB, 0, 255]);

    let dir = scratch_dir("r16-export");
    let path = dir.join("heights.png");
    image.save_png(&path).expect("save png");
    let (width, height, texels) = load_rgba8_image(&path).expect("load png");
    assert_eq!((width, height), (2, 1));
    assert_eq!(texels, image.to_rgba8());
}

#[test]
fn colorize_maps_bounds_to_the_ramp_ends() {
    let settings = BufferToTextureSettings::default();
    let colors = [0.0f32.to_bits(), 100.0f32.to_bits(), 100.0f32.to_bits()];
    let counts = [10u32, 10, 0];
    let texels = colorize_values(&settings, &colors, Some(&counts));
    let [r, g, b] = RAMP_PALETTE[0];
    assert_eq!(texels[0], [r, g, b, 255]);
    let [r, g, b] = RAMP_PALETTE[RAMP_PALETTE.len() - 1];
    assert_eq!(texels[1], [r, g, b, 255]);
    assert_eq!(texels[2][3], 0);

    let opaque = colorize_values(&settings, &colors[..1], None);
    assert_eq!(opaque[0][3], 255);
}

#[test]
fn texture_dimensions_are_bounded() {
    assert!(check_texture_dimensions(RasterDimensions::new(8192, 8192)).is_ok());
    let error = check_texture_dimensions(RasterDimensions::new(8193, 1)).unwrap_err();
    assert_eq!(
        error.message(),
        "cannot create texture: texture dimensions (8193x1) exceed 8192"
    );
    assert!(check_texture_dimensions(RasterDimensions::new(0, 4)).is_err());
}

#[test]
fn trajectory_jobs_must_fit_a_u32_index() {
    let settings = TrajectorySettings::default();
    assert_eq!(trajectory_job_count((100, 100), &settings), Ok(5_000_000));
    let crowded = TrajectorySettings {
        num_paths_per_release_cell: 2048,
        ..settings
    };
    assert!(trajectory_job_count((8192, 8192), &crowded).is_err());
}

#[test]
fn compute_nodes_downcast_to_their_variant() {
    let mut node: ComputeNode = BufferExportNode::default().into();
    assert_eq!(node.type_name(), "BufferExport");
    assert_eq!(node.inputs().len(), 2);
    assert!(node.outputs().is_empty());
    assert!(<&BufferExportNode>::try_from(&node).is_ok());
    assert!(<&TileExportNode>::try_from(&node).is_err());

    let export = <&mut BufferExportNode>::try_from(&mut node).expect("buffer export");
    export.set_settings(BufferExportSettings {
        output_path: PathBuf::from("out/layer.png"),
        create_parent_dirs: false,
    });
    let export = <&BufferExportNode>::try_from(&node).expect("buffer export");
    assert_eq!(export.settings().output_path, Path::new("out/layer.png"));
}

#[test]
fn load_rgba8_image_reads_png_files() {
    let dir = scratch_dir("load-image");
    let path = dir.join("pixels.png");
    let pixels = [10u8, 20, 30, 255, 40, 50, 60, 128];
    image::save_buffer(&path, &pixels, 2, 1, image::ExtendedColorType::Rgba8).expect("save png");
    assert_eq!(load_rgba8_image(&path).expect("load"), (2, 1, pixels.to_vec()));
    assert!(load_rgba8_image(&dir.join("missing.png")).is_err());
}

#[test]
fn graph_reports_the_failing_loader() {
    let Some(context) = test_context() else {
        return;
    };
    let dir = scratch_dir("missing-aabb");
    let settings = EvalGraphSettings {
        aabb_file_path: dir.join("missing.txt"),
        output_dir_path: dir.join("out"),
        ..Default::default()
    };
    let mut graph = build_eval_graph(&context, &settings);
    let failure = graph.run().unwrap_err();
    assert_eq!(failure.node_name, "load_aabb_node");
    assert!(failure.node_failure.message().starts_with("Failed to open file"));
}

fn write_eval_inputs(dir: &Path, size: u32) {
    let region = aabb((0.0, -80.0), (f64::from(size) * 10.0, 80.0));
    std::fs::write(dir.join("aabb.txt"), format_region_aabb(&region)).expect("write aabb");

    let mut heights = Vec::new();
    let mut release = Vec::new();
    for y in 0..size {
        for x in 0..size {
            let height = 2_000 - 8 * x;
            heights.extend_from_slice(&[(height / 256) as u8, (height % 256) as u8, 0, 255]);
            let alpha = if x == 2 && y % 4 == 0 { 255 } else { 0 };
            release.extend_from_slice(&[255, 0, 0, alpha]);
        }
    }
    image::save_buffer(
        dir.join("heights.png"),
        &heights,
        size,
        size,
        image::ExtendedColorType::Rgba8,
    )
    .expect("write heights");
    image::save_buffer(
        dir.join("release.png"),
        &release,
        size,
        size,
        image::ExtendedColorType::Rgba8,
    )
    .expect("write release points");
}

#[test]
fn eval_graph_writes_every_output() {
    let Some(context) = test_context() else {
        return;
    };
    let dir = scratch_dir("eval-graph");
    write_eval_inputs(&dir, 16);
    let settings = EvalGraphSettings {
        aabb_file_path: dir.join("aabb.txt"),
        release_points_texture_path: dir.join("release.png"),
        heightmap_texture_path: dir.join("heights.png"),
        output_dir_path: dir.join("out"),
        trajectories: TrajectorySettings {
            num_steps: 64,
            num_paths_per_release_cell: 8,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut graph = build_eval_graph(&context, &settings);
    graph.run().expect("eval graph run");

    let out = dir.join("out");
    for file in [
        "trajectories/texture.png",
        "trajectories/aabb.txt",
        "trajectories/texture_layer1_zdelta.png",
        "trajectories/texture_layer5_heightDifference.png",
        "heights/texture.png",
        "release_points/aabb.txt",
        "normals/texture.png",
    ] {
        assert!(out.join(file).is_file(), "missing {file}");
    }
    let (width, height, _) = load_rgba8_image(&out.join("trajectories/texture.png")).expect("load");
    assert_eq!((width, height), (16, 16));
    assert!(graph.timings().contains_key("compute_avalanche_trajectories_node"));
}

#[test]
fn tile_pipeline_graph_wires_every_export() {
    let Some(context) = test_context() else {
        return;
    };
    let settings = TilePipelineSettings {
        aabb_file_path: PathBuf::from("aabb.txt"),
        tile_source: FileTileSource::new("tiles/{z}/{x}/{y}.png", TileScheme::Tms),
        select: SelectTilesSettings::default(),
        decode: DecodeHeightsSettings::default(),
        downsample: DownsampleSettings::default(),
        kernels: TileKernelSettings::default(),
        snow: SnowSettings::default(),
        upsample: UpsampleSettings::default(),
        output_dir_path: PathBuf::from("out"),
    };
    let graph = build_tile_pipeline_graph(&context, &settings);
    for name in [
        "heights_export",
        "normals_export",
        "d8_directions_export",
        "snow_export",
    ] {
        let export = graph.node_as::<TileExportNode>(name).expect("tile export");
        assert!(export.settings().output_directory.starts_with("out"));
    }
    assert_eq!(
        graph.node("downsample_heights_node").map(ComputeNode::type_name),
        Some("DownsampleTiles")
    );
    for name in ["upsample_normals_node", "upsample_snow_node"] {
        let upsample = graph.node_as::<UpsampleTexturesNode>(name).expect("upsample node");
        assert_eq!(upsample.settings().target_size, (256, 256));
    }
}

fn upload_terrain(context: &Context, terrain: &TerrainRasters) -> [GpuTexture; 3] {
    let (device, queue) = (context.device(), context.queue());
    let (width, height) = (terrain.width(), terrain.height());
    let usage = wgpu::TextureUsages::TEXTURE_BINDING;
    let heights = GpuTexture::with_data(
        device,
        queue,
        "tests.heights",
        width,
        height,
        wgpu::TextureFormat::R32Float,
        usage,
        bytemuck::cast_slice(terrain.heights()),
    );
    let normals = GpuTexture::with_data(
        device,
        queue,
        "tests.normals",
        width,
        height,
        wgpu::TextureFormat::Rgba8Unorm,
        usage,
        bytemuck::cast_slice(terrain.normals()),
    );
    let release: Vec<u8> = terrain
        .release_alpha()
        .iter()
        .flat_map(|&alpha| [0, 0, 0, alpha])
        .collect();
    let release = GpuTexture::with_data(
        device,
        queue,
        "tests.release_points",
        width,
        height,
        wgpu::TextureFormat::Rgba8Unorm,
        usage,
        &release,
    );
    [heights, normals, release]
}

fn run_trajectories_on_gpu(
    context: &Context,
    terrain: &TerrainRasters,
    settings: TrajectorySettings,
) -> Vec<Vec<u32>> {
    let [heights, normals, release] = upload_terrain(context, terrain);
    // equatorial region whose texels measure one metre
    let half = DVec2::new(f64::from(terrain.width()), f64::from(terrain.height())) * 0.5;
    let aabb = Aabb2::try_new(DVec2::new(0.0, 0.0) - half, half).expect("aabb");
    let mut node = AvalancheTrajectoriesNode::new(settings);
    let inputs = InputData::new(
        node.inputs(),
        vec![
            Some(SocketData::RegionAabb(&aabb)),
            Some(SocketData::Texture(&normals)),
            Some(SocketData::Texture(&heights)),
            Some(SocketData::Texture(&release)),
        ],
    );
    context
        .block_on(node.run_impl(context, &inputs))
        .expect("trajectory run");
    LayerKind::ALL
        .iter()
        .map(|&kind| {
            let layer = node.layer(kind).expect("layer");
            let bytes = context
                .block_on(layer.read(context.device(), context.queue()))
                .expect("read layer");
            bytes
                .chunks_exact(4)
                .map(|word| bytemuck::pod_read_unaligned::<u32>(word))
                .collect()
        })
        .collect()
}

fn assert_layers_match(gpu: &[Vec<u32>], cpu: &TrajectoryLayers) {
    for kind in LayerKind::ALL {
        let expected = cpu.layer(kind).expect("active layer");
        let actual = &gpu[kind.index()];
        assert_eq!(actual.len(), expected.len(), "{}", kind.socket_name());
        for (index, (&actual, &expected)) in actual.iter().zip(expected).enumerate() {
            let name = kind.socket_name();
            if kind == LayerKind::CellCounts || expected == TRAVEL_ANGLE_EMPTY {
                assert_eq!(actual, expected, "{name} texel {index}");
                continue;
            }
            let (actual, expected) = (f32::from_bits(actual), f32::from_bits(expected));
            let tolerance = 1e-3 * expected.abs().max(1.0);
            assert!(
                (actual - expected).abs() <= tolerance,
                "{name} texel {index}: gpu {actual}, cpu {expected}"
            );
        }
    }
}

#[test]
fn gpu_trajectories_match_the_cpu_model_on_an_inclined_plane() {
    let Some(context) = test_context() else {
        return;
    };
    let terrain = TerrainRasters::from_height_fn(16, 4, Vec2::ONE, |x, _| 100.0 - x as f32)
        .with_release_cells(&[(0, 0), (0, 2)]);
    let settings = TrajectorySettings {
        num_steps: 8,
        step_length: 1.0,
        num_paths_per_release_cell: 4,
        random_contribution: 0.0,
        persistence_contribution: 0.0,
        random_seed: 42,
        runout_flowpy_alpha: 0.0,
        physics_model: PhysicsModel::PhysicsSimple,
        ..TrajectorySettings::default()
    };
    let cpu = simulate(&terrain, &settings);
    let gpu = run_trajectories_on_gpu(&context, &terrain, settings);
    assert_layers_match(&gpu, &cpu.layers);
    let counts = &gpu[LayerKind::CellCounts.index()];
    assert_eq!(counts[0], 4);
    assert_eq!(counts[2 * 16], 4);
    assert_eq!(counts[3 * 16], 0);
}

#[test]
fn gpu_trajectories_repeat_bit_for_bit_with_the_same_seed() {
    let Some(context) = test_context() else {
        return;
    };
    let bumpy = |x: u32, y: u32| {
        200.0 - 0.8 * x as f32 - 0.3 * y as f32 + ((x * 7 + y * 3) % 5) as f32 * 0.1
    };
    let terrain = TerrainRasters::from_height_fn(24, 24, Vec2::ONE, bumpy)
        .with_release_cells(&[(2, 2), (3, 10), (5, 5)]);
    let settings = TrajectorySettings {
        num_steps: 200,
        num_paths_per_release_cell: 16,
        num_runs: 2,
        random_contribution: 0.3,
        persistence_contribution: 0.2,
        random_seed: 7,
        runout_flowpy_alpha: 5f32.to_radians(),
        ..TrajectorySettings::default()
    };
    let first = run_trajectories_on_gpu(&context, &terrain, settings);
    let second = run_trajectories_on_gpu(&context, &terrain, settings);
    assert_eq!(first, second);
    let visited: u32 = first[LayerKind::CellCounts.index()].iter().sum();
    assert!(visited > 0);

    let reseeded = run_trajectories_on_gpu(
        &context,
        &terrain,
        TrajectorySettings {
            random_seed: 8,
            ..settings
        },
    );
    assert_ne!(first, reseeded);
}

#[test]
fn invalid_trajectory_settings_become_node_failures() {
    let settings = TrajectorySettings {
        num_runs: 0,
        ..TrajectorySettings::default()
    };
    let error = settings.validate().unwrap_err();
    let failure = avalanche_trajectories::settings_failure(error.clone());
    assert_eq!(
        failure.message(),
        format!("invalid trajectory settings: {error}")
    );
}

#[test]
fn upsampling_interpolates_between_texel_centres() {
    let source = [[0, 0, 0, 255], [255, 0, 0, 255], [0, 0, 0, 255], [255, 0, 0, 255]];
    let target = upsample_tile(&source, (2, 2), (4, 4));
    assert_eq!(target.len(), 16);
    for row in target.chunks(4) {
        let reds: Vec<u8> = row.iter().map(|texel| texel[0]).collect();
        assert_eq!(reds, vec![0, 64, 191, 255]);
        assert!(row.iter().all(|texel| texel[3] == 255));
    }
}

#[test]
fn upsampling_to_the_same_size_is_the_identity() {
    let source: Vec<[u8; 4]> = (0..9u8).map(|value| [value * 20, 7, 255 - value, 128]).collect();
    assert_eq!(upsample_tile(&source, (3, 3), (3, 3)), source);
}

#[test]
fn upsample_node_matches_the_host_mirror() {
    let Some(context) = test_context() else {
        return;
    };
    let (device, queue) = (context.device(), context.queue());
    let source_texels: Vec<[u8; 4]> = (0..16u32)
        .map(|index| [(index * 16) as u8, (255 - index * 8) as u8, 0, 255])
        .collect();
    let mut source = TileStorageTexture::new(device, TileStorageConfig::rgba8_storage(4, 4, 4))
        .expect("source storage");
    source
        .store_raw(queue, 2, bytemuck::cast_slice(&source_texels))
        .expect("store tile");

    let mut node = UpsampleTexturesNode::new(UpsampleSettings {
        target_size: (8, 8),
    });
    let inputs = InputData::new(node.inputs(), vec![Some(SocketData::TileStorage(&source))]);
    context
        .block_on(node.run_impl(&context, &inputs))
        .expect("upsample run");
    let Some(SocketData::TileStorage(output)) = node.output(0, &inputs) else {
        panic!("upsample node has no output");
    };
    assert_eq!((output.width(), output.height()), (8, 8));
    assert_eq!(output.used_layer_indices(), vec![2]);

    let bytes = context
        .block_on(
            read_texture_layer(
                device,
                queue,
                output.texture(),
                2,
                8,
                8,
                wgpu::TextureFormat::Rgba8Unorm,
            )
            .into_bytes(),
        )
        .expect("read layer");
    let expected = upsample_tile(&source_texels, (4, 4), (8, 8));
    for (index, (actual, expected)) in bytes.chunks_exact(4).zip(&expected).enumerate() {
        for channel in 0..4 {
            let difference = i16::from(actual[channel]) - i16::from(expected[channel]);
            assert!(difference.abs() <= 1, "texel {index}: gpu {actual:?}, host {expected:?}");
        }
    }
}

#[test]
fn upsample_node_rejects_height_tiles_and_smaller_targets() {
    let Some(context) = test_context() else {
        return;
    };
    let device = context.device();
    let heights = TileStorageTexture::new(device, TileStorageConfig::heights(2)).expect("heights");
    let mut node = UpsampleTexturesNode::default();
    let inputs = InputData::new(node.inputs(), vec![Some(SocketData::TileStorage(&heights))]);
    let failure = context
        .block_on(node.run_impl(&context, &inputs))
        .unwrap_err();
    assert_eq!(failure.message(), "upsampling is not supported for R16Uint tiles");

    let colour = TileStorageTexture::new(device, TileStorageConfig::rgba8_storage(64, 64, 2))
        .expect("colour");
    let mut node = UpsampleTexturesNode::new(UpsampleSettings {
        target_size: (32, 64),
    });
    let inputs = InputData::new(node.inputs(), vec![Some(SocketData::TileStorage(&colour))]);
    let failure = context
        .block_on(node.run_impl(&context, &inputs))
        .unwrap_err();
    assert_eq!(
        failure.message(),
        "cannot upsample 64x64 tiles to the smaller size 32x64"
    );
}
