//! Web-mercator (EPSG:3857) helpers for the TMS tile pyramid.

use std::fmt;

use glam::DVec2;

use crate::{MAX_ZOOM_LEVEL, TileId};

pub const EARTH_RADIUS: f64 = 6_378_137.0;
/// Half the extent of the mercator square, in metres.
pub const ORIGIN_SHIFT: f64 = std::f64::consts::PI * EARTH_RADIUS;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb2 {
    pub min: DVec2,
    pub max: DVec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AabbError {
    NotFinite,
    XMinNotBelowXMax { x_min: f64, x_max: f64 },
    YMinNotBelowYMax { y_min: f64, y_max: f64 },
}

impl fmt::Display for AabbError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AabbError::NotFinite => write!(formatter, "aabb bounds must be finite"),
            AabbError::XMinNotBelowXMax { x_min, x_max } => {
                write!(formatter, "x_min ({x_min}) must not be >= x_max ({x_max})")
            }
            AabbError::YMinNotBelowYMax { y_min, y_max } => {
                write!(formatter, "y_min ({y_min}) must not be >= y_max ({y_max})")
            }
        }
    }
}

impl std::error::Error for AabbError {}

impl Aabb2 {
    pub fn try_new(min: DVec2, max: DVec2) -> Result<Self, AabbError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(AabbError::NotFinite);
        }
        if min.x >= max.x {
            return Err(AabbError::XMinNotBelowXMax {
                x_min: min.x,
                x_max: max.x,
            });
        }
        if min.y >= max.y {
            return Err(AabbError::YMinNotBelowYMax {
                y_min: min.y,
                y_max: max.y,
            });
        }
        Ok(Self { min, max })
    }

    pub fn size(&self) -> DVec2 {
        self.max - self.min
    }

    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }
}

pub fn tile_extent(zoom: u32) -> f64 {
    2.0 * ORIGIN_SHIFT / f64::from(1u32 << zoom)
}

pub fn tile_bounds(id: TileId) -> Aabb2 {
    assert!(id.is_valid(), "cannot compute bounds of {id}");
    let extent = tile_extent(id.zoom);
    let min = DVec2::new(
        -ORIGIN_SHIFT + f64::from(id.x) * extent,
        -ORIGIN_SHIFT + f64::from(id.y) * extent,
    );
    Aabb2 {
        min,
        max: min + DVec2::splat(extent),
    }
}

/// Tile containing `point`; points outside the mercator square clamp to the
/// border tiles.
pub fn world_xy_to_tile_id(point: DVec2, zoom: u32) -> TileId {
    assert!(zoom <= MAX_ZOOM_LEVEL, "zoom {zoom} exceeds {MAX_ZOOM_LEVEL}");
    let extent = tile_extent(zoom);
    let last = (1u32 << zoom) - 1;
    let to_index = |value: f64| -> u32 {
        let index = ((value + ORIGIN_SHIFT) / extent).floor();
        if index <= 0.0 {
            0
        } else if index >= f64::from(last) {
            last
        } else {
            index as u32
        }
    };
    TileId {
        zoom,
        x: to_index(point.x),
        y: to_index(point.y),
    }
}

/// Ratio of ground distance to mercator distance at mercator `y`.
pub fn ground_scale_factor(mercator_y: f64) -> f64 {
    1.0 / (mercator_y / EARTH_RADIUS).cosh()
}

/// Tolerance in tile units when deciding on which side of a border an edge lies.
const BORDER_EPSILON: f64 = 1e-9;

/// Inclusive rectangle of tiles at a single zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectangularTileRegion {
    pub min: (u32, u32),
    pub max: (u32, u32),
    pub zoom: u32,
}

impl RectangularTileRegion {
    pub fn covering(aabb: &Aabb2, zoom: u32) -> Self {
        assert!(zoom <= MAX_ZOOM_LEVEL, "zoom {zoom} exceeds {MAX_ZOOM_LEVEL}");
        let extent = tile_extent(zoom);
        let last = f64::from((1u32 << zoom) - 1);
        // edges within a rounding error of a tile border snap onto it, and a
        // max edge on a border only touches the next tile
        let index_units = |value: f64| (value + ORIGIN_SHIFT) / extent;
        let clamp = |index: f64| index.clamp(0.0, last) as u32;
        let min_index = |value: f64| clamp((index_units(value) + BORDER_EPSILON).floor());
        let max_index = |value: f64, min: u32| {
            clamp((index_units(value) - BORDER_EPSILON).ceil() - 1.0).max(min)
        };
        let min = (min_index(aabb.min.x), min_index(aabb.min.y));
        Self {
            min,
            max: (max_index(aabb.max.x, min.0), max_index(aabb.max.y, min.1)),
            zoom,
        }
    }

    pub fn tile_count(&self) -> usize {
        let columns = (self.max.0 - self.min.0 + 1) as usize;
        let rows = (self.max.1 - self.min.1 + 1) as usize;
        columns * rows
    }

    pub fn tiles(&self) -> Vec<TileId> {
        assert!(
            self.min.0 <= self.max.0 && self.min.1 <= self.max.1,
            "tile region min must not exceed max"
        );
        let mut tiles = Vec::with_capacity(self.tile_count());
        for y in self.min.1..=self.max.1 {
            for x in self.min.0..=self.max.0 {
                tiles.push(TileId::new(self.zoom, x, y));
            }
        }
        tiles
    }
}

pub fn tile_ids_for_aabb(aabb: &Aabb2, zoom: u32) -> Vec<TileId> {
    RectangularTileRegion::covering(aabb, zoom).tiles()
}
