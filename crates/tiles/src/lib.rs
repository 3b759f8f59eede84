//! Tile model and GPU tile store.
//!
//! - `tile_id`: hierarchical `(zoom, x, y)` identifiers and the shared slot hash.
//! - `srs`: web-mercator bounds, tile lookup and rectangular tile regions.
//! - `storage`: texture arrays holding one tile per layer.
//! - `hash_map`: `TileId -> layer` map mirrored into GPU buffers.

use std::fmt;

mod hash_map;
mod srs;
mod storage;
mod tile_id;

pub use hash_map::{
    DEFAULT_HASH_MAP_CAPACITY, EMPTY_VALUE, GpuHashMap, ProbeTable, build_probe_table,
};
pub use srs::{
    Aabb2, AabbError, EARTH_RADIUS, ORIGIN_SHIFT, RectangularTileRegion, ground_scale_factor,
    tile_bounds, tile_extent, tile_ids_for_aabb, world_xy_to_tile_id,
};
pub use storage::{
    TileStorageConfig, TileStorageFormat, TileStorageTexture, decode_height, decode_tile_png,
};
pub use tile_id::{GpuTileId, MAX_ZOOM_LEVEL, TileId, gpu_hash};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileStoreError {
    ZeroSized,
    CapacityExceeded { capacity: u32, requested: u32 },
    CapacityExceedsDeviceLimit { capacity: u32, limit: u32 },
    SizeExceedsDeviceLimit,
    UnsupportedFormatUsage,
    SlotOutOfRange { slot: u32, capacity: u32 },
    TexelLengthMismatch { expected: usize, actual: usize },
    ResolutionMismatch { expected: (u32, u32), actual: (u32, u32) },
    Decode(String),
}

impl fmt::Display for TileStoreError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileStoreError::ZeroSized => {
                write!(formatter, "tile storage width, height and capacity must be at least 1")
            }
            TileStoreError::CapacityExceeded {
                capacity,
                requested,
            } => write!(
                formatter,
                "tile storage capacity exceeded: {requested} layers requested, capacity is {capacity}"
            ),
            TileStoreError::CapacityExceedsDeviceLimit { capacity, limit } => write!(
                formatter,
                "tile storage capacity {capacity} exceeds device texture array layer limit {limit}"
            ),
            TileStoreError::SizeExceedsDeviceLimit => {
                write!(formatter, "tile storage layer size exceeds device limit")
            }
            TileStoreError::UnsupportedFormatUsage => write!(
                formatter,
                "tile storage texture format does not support requested usage"
            ),
            TileStoreError::SlotOutOfRange { slot, capacity } => write!(
                formatter,
                "tile storage slot {slot} out of range for capacity {capacity}"
            ),
            TileStoreError::TexelLengthMismatch { expected, actual } => write!(
                formatter,
                "tile texel data has {actual} bytes, expected {expected}"
            ),
            TileStoreError::ResolutionMismatch { expected, actual } => write!(
                formatter,
                "tile image is {}x{}, expected {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
            TileStoreError::Decode(message) => {
                write!(formatter, "failed to decode tile image: {message}")
            }
        }
    }
}

impl std::error::Error for TileStoreError {}

#[cfg(test)]
mod tests;
