use glam::{Vec2, Vec3};

/// Rasters the simulator reads, laid out like the GPU input textures:
/// R32Float heights, RGBA8 normals and an RGBA8 release mask of which only
/// alpha is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainRasters {
    width: u32,
    height: u32,
    texel_size_m: Vec2,
    heights: Vec<f32>,
    normals: Vec<[u8; 4]>,
    release_alpha: Vec<u8>,
}

impl TerrainRasters {
    /// Builds heights from `height_at(x, y)` and derives normals the way the
    /// texture normals kernel does.
    pub fn from_height_fn(
        width: u32,
        height: u32,
        texel_size_m: Vec2,
        height_at: impl Fn(u32, u32) -> f32,
    ) -> Self {
        assert!(width >= 2 && height >= 2, "terrain must be at least 2x2");
        let mut heights = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                heights.push(height_at(x, y));
            }
        }
        let normals = normal_texels(&heights, width, height, texel_size_m);
        Self {
            width,
            height,
            texel_size_m,
            heights,
            normals,
            release_alpha: vec![0; (width * height) as usize],
        }
    }

    pub fn with_release_cells(mut self, cells: &[(u32, u32)]) -> Self {
        for &(x, y) in cells {
            assert!(x < self.width && y < self.height, "release cell out of range");
            let index = self.index(x, y);
            self.release_alpha[index] = 255;
        }
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texel_size_m(&self) -> Vec2 {
        self.texel_size_m
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    pub fn normals(&self) -> &[[u8; 4]] {
        &self.normals
    }

    pub fn release_alpha(&self) -> &[u8] {
        &self.release_alpha
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    pub(crate) fn height_texel(&self, x: i32, y: i32) -> f32 {
        let x = x.clamp(0, self.width as i32 - 1) as u32;
        let y = y.clamp(0, self.height as i32 - 1) as u32;
        self.heights[self.index(x, y)]
    }

    /// Bilinear height at input texel coordinate `coord` (texel centres at
    /// integers), clamped to the edge.
    pub fn bilinear_height(&self, coord: Vec2) -> f32 {
        let base = coord.floor();
        let fraction = coord - base;
        let x0 = base.x as i32;
        let y0 = base.y as i32;
        let top = mix(
            self.height_texel(x0, y0),
            self.height_texel(x0 + 1, y0),
            fraction.x,
        );
        let bottom = mix(
            self.height_texel(x0, y0 + 1),
            self.height_texel(x0 + 1, y0 + 1),
            fraction.x,
        );
        mix(top, bottom, fraction.y)
    }

    pub fn normal_texel(&self, x: u32, y: u32) -> Vec3 {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        let [r, g, b, _] = self.normals[self.index(x, y)];
        Vec3::new(r as f32, g as f32, b as f32) / 255.0 * 2.0 - Vec3::ONE
    }

    pub fn is_release(&self, x: u32, y: u32) -> bool {
        self.release_alpha[self.index(x, y)] > 0
    }
}

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// Central-difference normal of every texel. Border texels reuse the
/// normal of their interior neighbour.
pub fn normal_texels(heights: &[f32], width: u32, height: u32, texel_size_m: Vec2) -> Vec<[u8; 4]> {
    assert_eq!(heights.len(), (width * height) as usize);
    assert!(width >= 2 && height >= 2, "normals need at least 2x2 heights");
    let at = |x: u32, y: u32| heights[(y * width + x) as usize];
    let mut texels = Vec::with_capacity(heights.len());
    for y in 0..height {
        for x in 0..width {
            let cx = interior(x, width);
            let cy = interior(y, height);
            let normal = central_difference_normal(
                at(cx.saturating_sub(1), cy),
                at((cx + 1).min(width - 1), cy),
                at(cx, cy.saturating_sub(1)),
                at(cx, (cy + 1).min(height - 1)),
                texel_size_m,
            );
            texels.push(quantize_normal(normal));
        }
    }
    texels
}

fn interior(coord: u32, size: u32) -> u32 {
    if size < 3 {
        return coord;
    }
    coord.clamp(1, size - 2)
}

pub fn central_difference_normal(
    left: f32,
    right: f32,
    up: f32,
    down: f32,
    texel_size_m: Vec2,
) -> Vec3 {
    let dzdx = (right - left) / (2.0 * texel_size_m.x);
    let dzdy = (down - up) / (2.0 * texel_size_m.y);
    Vec3::new(-dzdx, -dzdy, 1.0).normalize()
}

/// `n * 0.5 + 0.5` rounded into RGBA8 with opaque alpha.
pub fn quantize_normal(normal: Vec3) -> [u8; 4] {
    let encoded = normal * 0.5 + Vec3::splat(0.5);
    let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    [channel(encoded.x), channel(encoded.y), channel(encoded.z), 255]
}
