//! Compute nodes of the terrain pipeline and the graphs built from them.
//!
//! - Tile production: `SelectTilesNode`, `RequestTilesNode`,
//!   `DecodeHeightsNode`, `DownsampleTilesNode`, `UpsampleTexturesNode` and
//!   the per-tile kernels (`ComputeNormalsNode`, `ComputeD8DirectionsNode`,
//!   `ComputeSnowNode`).
//! - Region textures: `DecodeHeightTextureNode`, `ComputeTextureNormalsNode`,
//!   `ComputeReleasePointsNode`.
//! - Simulation: `AvalancheTrajectoriesNode`, `BufferToTextureNode`.
//! - I/O: `LoadRegionAabbNode`, `LoadTextureNode`, `BufferExportNode`,
//!   `TileExportNode`.
//!
//! `ComputeNode` is the closed sum of all of them, which is what a
//! `NodeGraph` stores.

mod avalanche_trajectories;
mod buffer_export;
mod buffer_to_texture;
mod decode_heights;
mod downsample;
mod graphs;
mod load_texture;
mod region_aabb;
mod request_tiles;
mod select_tiles;
mod texture_nodes;
mod tile_export;
mod tile_kernels;
mod upsample;

use gpu_runtime::Context;
use node_graph::{InputData, Node, NodeRunFailure, SocketData, SocketSpec};

pub use avalanche_trajectories::{AvalancheTrajectoriesNode, trajectory_job_count};
pub use buffer_export::{
    BufferExportNode, BufferExportSettings, EXPORT_VALUE_LIMIT, encode_buffer_export,
    encode_export_value,
};
pub use buffer_to_texture::{
    BufferToTextureNode, BufferToTextureSettings, check_texture_dimensions, colorize_values,
};
pub use decode_heights::{DecodeHeightsNode, DecodeHeightsSettings};
pub use downsample::{DownsampleSettings, DownsampleTilesNode, downsample_tile, parent_tile_ids};
pub use graphs::{
    EvalGraphSettings, TilePipelineSettings, build_eval_graph, build_tile_pipeline_graph,
    configure_eval_graph,
};
pub use load_texture::{LoadTextureNode, LoadTextureSettings, load_rgba8_image};
pub use region_aabb::{
    AabbParseError, LoadRegionAabbNode, LoadRegionAabbSettings, format_region_aabb,
    parse_region_aabb,
};
pub use request_tiles::{FileTileSource, RequestTilesNode, TileScheme, TileSource, TileSourceError};
pub use select_tiles::{SelectTilesNode, SelectTilesSettings, select_tiles};
pub use texture_nodes::{
    ComputeReleasePointsNode, ComputeTextureNormalsNode, DecodeHeightTextureNode,
    ReleasePointSettings, region_texel_size_m, release_point_mask,
};
pub use tile_export::{
    ExportFormat, ExportImage, MAX_STITCHED_IMAGE_SIZE, StitchError, StitchLayout,
    TileExportNode, TileExportSettings, ZoomLayout,
};
pub use tile_kernels::{
    ComputeD8DirectionsNode, ComputeNormalsNode, ComputeSnowNode, D8_PIT, SnowSettings,
    TileKernelSettings, d8_direction, snow_alpha, tile_texel_size_m,
};
pub use upsample::{UpsampleSettings, UpsampleTexturesNode, upsample_tile};

macro_rules! compute_nodes {
    ($($variant:ident($node:ty)),+ $(,)?) => {
        /// Every node type the pipeline knows about.
        pub enum ComputeNode {
            $($variant($node),)+
        }

        impl Node for ComputeNode {
            type Context = Context;

            fn inputs(&self) -> &'static [SocketSpec] {
                match self {
                    $(ComputeNode::$variant(node) => node.inputs(),)+
                }
            }

            fn outputs(&self) -> &'static [SocketSpec] {
                match self {
                    $(ComputeNode::$variant(node) => node.outputs(),)+
                }
            }

            fn output<'a>(
                &'a self,
                index: usize,
                inputs: &InputData<'a>,
            ) -> Option<SocketData<'a>> {
                match self {
                    $(ComputeNode::$variant(node) => node.output(index, inputs),)+
                }
            }

            async fn run_impl(
                &mut self,
                context: &Context,
                inputs: &InputData<'_>,
            ) -> Result<(), NodeRunFailure> {
                match self {
                    $(ComputeNode::$variant(node) => node.run_impl(context, inputs).await,)+
                }
            }
        }

        $(
            impl From<$node> for ComputeNode {
                fn from(node: $node) -> Self {
                    ComputeNode::$variant(node)
                }
            }

            impl<'a> TryFrom<&'a ComputeNode> for &'a $node {
                type Error = ();

                fn try_from(node: &'a ComputeNode) -> Result<Self, ()> {
                    match node {
                        ComputeNode::$variant(node) => Ok(node),
                        #[allow(unreachable_patterns)]
                        _ => Err(()),
                    }
                }
            }

            impl<'a> TryFrom<&'a mut ComputeNode> for &'a mut $node {
                type Error = ();

                fn try_from(node: &'a mut ComputeNode) -> Result<Self, ()> {
                    match node {
                        ComputeNode::$variant(node) => Ok(node),
                        #[allow(unreachable_patterns)]
                        _ => Err(()),
                    }
                }
            }
        )+
    };
}

compute_nodes! {
    LoadRegionAabb(LoadRegionAabbNode),
    SelectTiles(SelectTilesNode),
    RequestTiles(RequestTilesNode),
    DecodeHeights(DecodeHeightsNode),
    DownsampleTiles(DownsampleTilesNode),
    UpsampleTextures(UpsampleTexturesNode),
    ComputeNormals(ComputeNormalsNode),
    ComputeD8Directions(ComputeD8DirectionsNode),
    ComputeSnow(ComputeSnowNode),
    DecodeHeightTexture(DecodeHeightTextureNode),
    ComputeTextureNormals(ComputeTextureNormalsNode),
    ComputeReleasePoints(ComputeReleasePointsNode),
    AvalancheTrajectories(AvalancheTrajectoriesNode),
    BufferToTexture(BufferToTextureNode),
    LoadTexture(LoadTextureNode),
    BufferExport(BufferExportNode),
    TileExport(TileExportNode),
}

impl ComputeNode {
    pub fn type_name(&self) -> &'static str {
        match self {
            ComputeNode::LoadRegionAabb(_) => "LoadRegionAabb",
            ComputeNode::SelectTiles(_) => "SelectTiles",
            ComputeNode::RequestTiles(_) => "RequestTiles",
            ComputeNode::DecodeHeights(_) => "DecodeHeights",
            ComputeNode::DownsampleTiles(_) => "DownsampleTiles",
            ComputeNode::UpsampleTextures(_) => "UpsampleTextures",
            ComputeNode::ComputeNormals(_) => "ComputeNormals",
            ComputeNode::ComputeD8Directions(_) => "ComputeD8Directions",
            ComputeNode::ComputeSnow(_) => "ComputeSnow",
            ComputeNode::DecodeHeightTexture(_) => "DecodeHeightTexture",
            ComputeNode::ComputeTextureNormals(_) => "ComputeTextureNormals",
            ComputeNode::ComputeReleasePoints(_) => "ComputeReleasePoints",
            ComputeNode::AvalancheTrajectories(_) => "AvalancheTrajectories",
            ComputeNode::BufferToTexture(_) => "BufferToTexture",
            ComputeNode::LoadTexture(_) => "LoadTexture",
            ComputeNode::BufferExport(_) => "BufferExport",
            ComputeNode::TileExport(_) => "TileExport",
        }
    }
}

#[cfg(test)]
mod tests;
