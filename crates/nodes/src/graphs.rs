//! Prebuilt graphs: the region-based avalanche evaluation and the tile
//! pipeline.

use std::path::PathBuf;

use gpu_runtime::Context;
use node_graph::NodeGraph;
use trajectories::{LayerKind, TrajectorySettings};

use crate::{
    AvalancheTrajectoriesNode, BufferExportNode, BufferExportSettings, BufferToTextureNode,
    BufferToTextureSettings, ComputeD8DirectionsNode, ComputeNode, ComputeNormalsNode,
    ComputeSnowNode, ComputeTextureNormalsNode, DecodeHeightTextureNode, DecodeHeightsNode,
    DecodeHeightsSettings, DownsampleSettings, DownsampleTilesNode, FileTileSource,
    LoadRegionAabbNode, LoadRegionAabbSettings, LoadTextureNode, LoadTextureSettings,
    RequestTilesNode, SelectTilesNode, SelectTilesSettings, SnowSettings, TileExportNode,
    TileExportSettings, TileKernelSettings, UpsampleSettings, UpsampleTexturesNode,
};

fn node_mut<'g, T>(graph: &'g mut NodeGraph<'_, ComputeNode>, name: &str) -> &'g mut T
where
    &'g mut T: TryFrom<&'g mut ComputeNode>,
{
    graph
        .node_as_mut::<T>(name)
        .unwrap_or_else(|| panic!("graph has no node '{name}' of the requested type"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalGraphSettings {
    pub aabb_file_path: PathBuf,
    pub release_points_texture_path: PathBuf,
    pub heightmap_texture_path: PathBuf,
    pub output_dir_path: PathBuf,
    pub trajectories: TrajectorySettings,
    pub colorize: BufferToTextureSettings,
}

impl Default for EvalGraphSettings {
    fn default() -> Self {
        Self {
            aabb_file_path: PathBuf::from("aabb.txt"),
            release_points_texture_path: PathBuf::from("release_points.png"),
            heightmap_texture_path: PathBuf::from("heights.png"),
            output_dir_path: PathBuf::from("output"),
            trajectories: TrajectorySettings::default(),
            colorize: BufferToTextureSettings::default(),
        }
    }
}

/// Region evaluation from files on disk: an AABB, an encoded heightmap
/// and a release point mask covering it. Exports every trajectory layer,
/// the coloured trajectories and the intermediate textures.
pub fn build_eval_graph<'c>(
    context: &'c Context,
    settings: &EvalGraphSettings,
) -> NodeGraph<'c, ComputeNode> {
    let mut graph = NodeGraph::new(context);
    graph.add_node("load_aabb_node", LoadRegionAabbNode::default().into());
    graph.add_node("load_rp_node", LoadTextureNode::default().into());
    graph.add_node("load_heights_node", LoadTextureNode::default().into());
    graph.add_node("decode_heights_node", DecodeHeightTextureNode::new().into());
    graph.add_node("compute_normals_node", ComputeTextureNormalsNode::new().into());
    graph.add_node(
        "compute_avalanche_trajectories_node",
        AvalancheTrajectoriesNode::default().into(),
    );
    graph.add_node("buffer_to_texture_node", BufferToTextureNode::default().into());
    for layer in LayerKind::ALL {
        graph.add_node(layer_export_name(layer), BufferExportNode::default().into());
    }
    for name in ["trajectories_export", "height_export", "rp_export", "normals_export"] {
        graph.add_node(name, TileExportNode::default().into());
    }

    graph.connect("load_heights_node", "texture", "decode_heights_node", "encoded texture");
    graph.connect("decode_heights_node", "decoded texture", "compute_normals_node", "height texture");
    graph.connect("load_aabb_node", "region aabb", "compute_normals_node", "region aabb");

    let trajectories = "compute_avalanche_trajectories_node";
    graph.connect("load_aabb_node", "region aabb", trajectories, "region aabb");
    graph.connect("compute_normals_node", "normal texture", trajectories, "normal texture");
    graph.connect("decode_heights_node", "decoded texture", trajectories, "height texture");
    graph.connect("load_rp_node", "texture", trajectories, "release point texture");

    graph.connect(trajectories, "raster dimensions", "buffer_to_texture_node", "raster dimensions");
    graph.connect(trajectories, "storage buffer", "buffer_to_texture_node", "storage buffer");
    graph.connect(
        trajectories,
        LayerKind::CellCounts.socket_name(),
        "buffer_to_texture_node",
        "transparency buffer",
    );
    for layer in LayerKind::ALL {
        let export = layer_export_name(layer);
        graph.connect(trajectories, layer.socket_name(), export, "buffer");
        graph.connect(trajectories, "raster dimensions", export, "dimensions");
    }

    for (source, socket, export) in [
        ("buffer_to_texture_node", "texture", "trajectories_export"),
        ("load_heights_node", "texture", "height_export"),
        ("load_rp_node", "texture", "rp_export"),
        ("compute_normals_node", "normal texture", "normals_export"),
    ] {
        graph.connect(source, socket, export, "texture");
        graph.connect("load_aabb_node", "region aabb", export, "region aabb");
    }

    configure_eval_graph(&mut graph, settings);
    graph
}

fn layer_export_name(layer: LayerKind) -> &'static str {
    match layer {
        LayerKind::ZDelta => "l1_export_node",
        LayerKind::CellCounts => "l2_export_node",
        LayerKind::TravelLength => "l3_export_node",
        LayerKind::TravelAngle => "l4_export_node",
        LayerKind::HeightDifference => "l5_export_node",
    }
}

/// Applies input paths, output locations and model settings to a graph
/// from `build_eval_graph`.
pub fn configure_eval_graph(graph: &mut NodeGraph<'_, ComputeNode>, settings: &EvalGraphSettings) {
    node_mut::<LoadRegionAabbNode>(graph, "load_aabb_node").set_settings(LoadRegionAabbSettings {
        file_path: settings.aabb_file_path.clone(),
    });
    node_mut::<LoadTextureNode>(graph, "load_rp_node").set_settings(LoadTextureSettings {
        file_path: settings.release_points_texture_path.clone(),
        ..Default::default()
    });
    node_mut::<LoadTextureNode>(graph, "load_heights_node").set_settings(LoadTextureSettings {
        file_path: settings.heightmap_texture_path.clone(),
        ..Default::default()
    });
    node_mut::<AvalancheTrajectoriesNode>(graph, "compute_avalanche_trajectories_node")
        .set_settings(settings.trajectories);
    node_mut::<BufferToTextureNode>(graph, "buffer_to_texture_node")
        .set_settings(settings.colorize);

    let output_dir = &settings.output_dir_path;
    for layer in LayerKind::ALL {
        node_mut::<BufferExportNode>(graph, layer_export_name(layer)).set_settings(
            BufferExportSettings {
                output_path: output_dir
                    .join("trajectories")
                    .join(format!("texture_{}.png", layer.socket_name())),
                create_parent_dirs: true,
            },
        );
    }
    for (export, directory) in [
        ("trajectories_export", "trajectories"),
        ("height_export", "heights"),
        ("rp_export", "release_points"),
        ("normals_export", "normals"),
    ] {
        node_mut::<TileExportNode>(graph, export).set_settings(TileExportSettings {
            output_directory: output_dir.join(directory),
            ..Default::default()
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TilePipelineSettings {
    pub aabb_file_path: PathBuf,
    pub tile_source: FileTileSource,
    pub select: SelectTilesSettings,
    pub decode: DecodeHeightsSettings,
    pub downsample: DownsampleSettings,
    pub kernels: TileKernelSettings,
    pub snow: SnowSettings,
    pub upsample: UpsampleSettings,
    pub output_dir_path: PathBuf,
}

/// Tile-based production: select and fetch height tiles for a region,
/// derive normals, flow directions and snow per tile, then export them
/// stitched per zoom level. Heights are exported with their downsampled
/// levels; normals and snow are upsampled before export.
pub fn build_tile_pipeline_graph<'c>(
    context: &'c Context,
    settings: &TilePipelineSettings,
) -> NodeGraph<'c, ComputeNode> {
    let mut graph = NodeGraph::new(context);
    graph.add_node(
        "load_aabb_node",
        LoadRegionAabbNode::new(LoadRegionAabbSettings {
            file_path: settings.aabb_file_path.clone(),
        })
        .into(),
    );
    graph.add_node("select_tiles_node", SelectTilesNode::new(settings.select).into());
    graph.add_node(
        "request_tiles_node",
        RequestTilesNode::new(settings.tile_source.clone()).into(),
    );
    graph.add_node("decode_heights_node", DecodeHeightsNode::new(settings.decode).into());
    graph.add_node(
        "downsample_heights_node",
        DownsampleTilesNode::new(settings.downsample).into(),
    );
    graph.add_node("compute_normals_node", ComputeNormalsNode::new(settings.kernels).into());
    graph.add_node(
        "compute_d8_node",
        ComputeD8DirectionsNode::new(settings.kernels).into(),
    );
    graph.add_node("compute_snow_node", ComputeSnowNode::new(settings.snow).into());

    graph.connect("load_aabb_node", "region aabb", "select_tiles_node", "region aabb");
    graph.connect("select_tiles_node", "tile ids", "request_tiles_node", "tile ids");
    graph.connect("select_tiles_node", "tile ids", "decode_heights_node", "tile ids");
    graph.connect("request_tiles_node", "tile data", "decode_heights_node", "tile data");
    graph.connect("select_tiles_node", "tile ids", "downsample_heights_node", "tile ids");
    graph.connect("decode_heights_node", "hash map", "downsample_heights_node", "hash map");
    graph.connect("decode_heights_node", "textures", "downsample_heights_node", "textures");

    let kernels = [
        ("compute_normals_node", "normal textures"),
        ("compute_d8_node", "d8 direction textures"),
        ("compute_snow_node", "snow textures"),
    ];
    for (kernel, _) in kernels {
        graph.connect("select_tiles_node", "tile ids", kernel, "tile ids");
        graph.connect("decode_heights_node", "hash map", kernel, "hash map");
        graph.connect("decode_heights_node", "textures", kernel, "height textures");
    }
    for (kernel, socket, upsample) in [
        ("compute_normals_node", "normal textures", "upsample_normals_node"),
        ("compute_snow_node", "snow textures", "upsample_snow_node"),
    ] {
        graph.add_node(upsample, UpsampleTexturesNode::new(settings.upsample).into());
        graph.connect(kernel, socket, upsample, "textures");
    }

    let export = |directory: &str| {
        TileExportNode::new(TileExportSettings {
            output_directory: settings.output_dir_path.join(directory),
            ..Default::default()
        })
    };
    graph.add_node("heights_export", export("heights").into());
    graph.connect("downsample_heights_node", "hash map", "heights_export", "hash map");
    graph.connect("downsample_heights_node", "textures", "heights_export", "textures");
    for (kernel, source, socket, directory) in [
        ("compute_normals_node", "upsample_normals_node", "textures", "normals"),
        ("compute_d8_node", "compute_d8_node", "d8 direction textures", "d8_directions"),
        ("compute_snow_node", "upsample_snow_node", "textures", "snow"),
    ] {
        let name = format!("{directory}_export");
        graph.add_node(name.as_str(), export(directory).into());
        graph.connect(kernel, "hash map", &name, "hash map");
        graph.connect(source, socket, &name, "textures");
    }
    graph
}
