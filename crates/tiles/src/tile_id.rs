//! Hierarchical tile identifiers and their GPU encoding.
//!
//! A tile is addressed by `(zoom, x, y)` in the TMS scheme (y grows north).
//! The GPU side sees the same triple padded to 16 bytes so that shaders can
//! read it as a `vec4<u32>`.

use std::fmt;

use static_assertions::const_assert_eq;

pub const MAX_ZOOM_LEVEL: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub zoom: u32,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    /// Marks empty slots. Never a valid tile: its zoom is out of range.
    pub const INVALID: Self = Self {
        zoom: u32::MAX,
        x: 0,
        y: 0,
    };

    pub fn new(zoom: u32, x: u32, y: u32) -> Self {
        assert!(
            zoom <= MAX_ZOOM_LEVEL,
            "tile zoom {zoom} exceeds max zoom level {MAX_ZOOM_LEVEL}"
        );
        let tiles_per_axis = 1u32 << zoom;
        assert!(
            x < tiles_per_axis && y < tiles_per_axis,
            "tile ({x}, {y}) is out of bounds for zoom {zoom}"
        );
        Self { zoom, x, y }
    }

    pub fn is_valid(self) -> bool {
        self.zoom <= MAX_ZOOM_LEVEL && self.x < (1 << self.zoom) && self.y < (1 << self.zoom)
    }

    pub fn parent(self) -> Option<Self> {
        if self.zoom == 0 || !self.is_valid() {
            return None;
        }
        Some(Self {
            zoom: self.zoom - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// Children in `(i, j)` order: `[(0,0), (1,0), (0,1), (1,1)]` where `i`
    /// offsets x and `j` offsets y.
    pub fn children(self) -> Option<[Self; 4]> {
        if self.zoom >= MAX_ZOOM_LEVEL || !self.is_valid() {
            return None;
        }
        let zoom = self.zoom + 1;
        let x = self.x * 2;
        let y = self.y * 2;
        Some([
            Self { zoom, x, y },
            Self { zoom, x: x + 1, y },
            Self { zoom, x, y: y + 1 },
            Self {
                zoom,
                x: x + 1,
                y: y + 1,
            },
        ])
    }

    /// Walks `levels` parents up. `None` if the chain leaves the pyramid.
    pub fn ancestor(self, levels: u32) -> Option<Self> {
        let mut current = self;
        for _ in 0..levels {
            current = current.parent()?;
        }
        Some(current)
    }

    pub fn to_gpu(self) -> GpuTileId {
        GpuTileId::from(self)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            return write!(formatter, "tile(invalid)");
        }
        write!(formatter, "tile({}/{}/{})", self.zoom, self.x, self.y)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuTileId {
    pub x: u32,
    pub y: u32,
    pub zoom: u32,
    pub padding: u32,
}

const_assert_eq!(std::mem::size_of::<GpuTileId>(), 16);

impl From<TileId> for GpuTileId {
    fn from(value: TileId) -> Self {
        Self {
            x: value.x,
            y: value.y,
            zoom: value.zoom,
            padding: u32::MAX,
        }
    }
}

impl From<GpuTileId> for TileId {
    fn from(value: GpuTileId) -> Self {
        Self {
            zoom: value.zoom,
            x: value.x,
            y: value.y,
        }
    }
}

/// Slot hash shared with `hash_map.wgsl`. `capacity` must be a power of two.
pub fn gpu_hash(id: TileId, capacity: u32) -> u32 {
    debug_assert!(capacity.is_power_of_two());
    let mixed = id.x.wrapping_mul(73_856_093)
        ^ id.y.wrapping_mul(19_349_663)
        ^ id.zoom.wrapping_mul(83_492_791);
    mixed & (capacity - 1)
}
