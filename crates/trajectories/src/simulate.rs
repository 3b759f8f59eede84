//! CPU reference of `trajectories.wgsl`.
//!
//! Walks every path of every release cell sequentially and accumulates into
//! the same five layers with the same float encodings, so GPU results can be
//! checked against it without an adapter.

use std::f32::consts::{FRAC_PI_4, TAU};

use glam::{IVec2, Vec2};

use crate::encoding::encode_ordered_f32;
use crate::friction::friction_per_unit_mass;
use crate::model::{LayerKind, PhysicsModel, TrajectorySettings};
use crate::rng::{PathRng, path_seed};
use crate::terrain::TerrainRasters;

/// Neighbour offsets in D8 index order: E, SE, S, SW, W, NW, N, NE.
pub const D8_OFFSETS: [IVec2; 8] = [
    IVec2::new(1, 0),
    IVec2::new(1, 1),
    IVec2::new(0, 1),
    IVec2::new(-1, 1),
    IVec2::new(-1, 0),
    IVec2::new(-1, -1),
    IVec2::new(0, -1),
    IVec2::new(1, -1),
];

const MIN_SPEED: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    OffMap,
    MaxSteps,
    Stopped,
    Runout,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationReport {
    pub release_cells: u32,
    pub paths: u64,
    pub off_map: u64,
    pub max_steps: u64,
    pub stopped: u64,
    pub runout: u64,
}

impl SimulationReport {
    fn record(&mut self, termination: Termination) {
        self.paths += 1;
        match termination {
            Termination::OffMap => self.off_map += 1,
            Termination::MaxSteps => self.max_steps += 1,
            Termination::Stopped => self.stopped += 1,
            Termination::Runout => self.runout += 1,
        }
    }

    pub fn terminated(&self) -> u64 {
        self.off_map + self.max_steps + self.stopped + self.runout
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrajectoryLayers {
    width: u32,
    height: u32,
    layers: [Option<Vec<u32>>; 5],
}

impl TrajectoryLayers {
    pub fn new(width: u32, height: u32, settings: &TrajectorySettings) -> Self {
        let texels = (width * height) as usize;
        let layers = LayerKind::ALL.map(|kind| {
            settings
                .active_layers
                .contains(kind)
                .then(|| vec![kind.initial_value(); texels])
        });
        Self {
            width,
            height,
            layers,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layer(&self, kind: LayerKind) -> Option<&[u32]> {
        self.layers[kind.index()].as_deref()
    }

    pub fn get(&self, kind: LayerKind, x: u32, y: u32) -> Option<u32> {
        assert!(x < self.width && y < self.height, "cell out of range");
        self.layer(kind)
            .map(|values| values[(y * self.width + x) as usize])
    }

    fn update(&mut self, kind: LayerKind, index: usize, update: impl FnOnce(&mut u32)) {
        if let Some(values) = self.layers[kind.index()].as_mut() {
            update(&mut values[index]);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub layers: TrajectoryLayers,
    pub report: SimulationReport,
}

/// Runs all paths of all runs over `terrain`.
pub fn simulate(terrain: &TerrainRasters, settings: &TrajectorySettings) -> Simulation {
    let multiplier = settings.resolution_multiplier;
    assert!(multiplier >= 1, "resolution multiplier must be at least 1");
    let walker = Walker {
        terrain,
        settings,
        multiplier: multiplier as f32,
        output_size: Vec2::new(
            (terrain.width() * multiplier) as f32,
            (terrain.height() * multiplier) as f32,
        ),
        output_texel_m: terrain.texel_size_m() / multiplier as f32,
    };
    let mut layers = TrajectoryLayers::new(
        terrain.width() * multiplier,
        terrain.height() * multiplier,
        settings,
    );
    let mut report = SimulationReport::default();
    for y in 0..terrain.height() {
        for x in 0..terrain.width() {
            if terrain.is_release(x, y) {
                report.release_cells += 1;
            }
        }
    }
    for run in 0..settings.num_runs {
        let run_seed = settings.random_seed.wrapping_add(run);
        for y in 0..terrain.height() {
            for x in 0..terrain.width() {
                if !terrain.is_release(x, y) {
                    continue;
                }
                for path in 0..settings.num_paths_per_release_cell {
                    let mut rng = PathRng::new(path_seed(x, y, path, run_seed));
                    let termination = walker.trace(x, y, &mut rng, &mut layers);
                    report.record(termination);
                }
            }
        }
    }
    Simulation { layers, report }
}

struct Walker<'a> {
    terrain: &'a TerrainRasters,
    settings: &'a TrajectorySettings,
    multiplier: f32,
    output_size: Vec2,
    output_texel_m: Vec2,
}

impl Walker<'_> {
    fn height(&self, position: Vec2) -> f32 {
        self.terrain
            .bilinear_height(position / self.multiplier - Vec2::splat(0.5))
    }

    fn off_map(&self, position: Vec2) -> bool {
        position.x < 0.0
            || position.y < 0.0
            || position.x >= self.output_size.x
            || position.y >= self.output_size.y
    }

    /// Normalized steepest descent in output texel space.
    fn downhill(&self, position: Vec2) -> Vec2 {
        let coord = position / self.multiplier - Vec2::splat(0.5);
        let input_texel_m = self.terrain.texel_size_m();
        let dzdx = (self.terrain.bilinear_height(coord + Vec2::X)
            - self.terrain.bilinear_height(coord - Vec2::X))
            / (2.0 * input_texel_m.x);
        let dzdy = (self.terrain.bilinear_height(coord + Vec2::Y)
            - self.terrain.bilinear_height(coord - Vec2::Y))
            / (2.0 * input_texel_m.y);
        normalize_or_zero(Vec2::new(-dzdx, -dzdy) / self.output_texel_m)
    }

    fn cos_slope(&self, position: Vec2) -> f32 {
        let texel = (position / self.multiplier).floor().max(Vec2::ZERO);
        let normal = self.terrain.normal_texel(texel.x as u32, texel.y as u32);
        normal.z.clamp(0.0, 1.0)
    }

    fn metres(&self, delta: Vec2) -> f32 {
        (delta * self.output_texel_m).length()
    }

    /// Best or randomly weighted D8 neighbour of the cell containing
    /// `position`, as a displacement to that neighbour's centre.
    fn d8_step(&self, position: Vec2, weighted: bool, rng: &mut PathRng) -> Option<Vec2> {
        let centre = position.floor() + Vec2::splat(0.5);
        let centre_height = self.height(centre);
        let mut slopes = [0.0f32; 8];
        for (index, offset) in D8_OFFSETS.iter().enumerate() {
            let neighbour = centre + offset.as_vec2();
            if self.off_map(neighbour) {
                continue;
            }
            let drop = centre_height - self.height(neighbour);
            slopes[index] = (drop / self.metres(offset.as_vec2())).max(0.0);
        }
        let chosen = if weighted {
            let total: f32 = slopes.iter().sum();
            if total <= 0.0 {
                return None;
            }
            let target = rng.next_f32() * total;
            let mut cumulative = 0.0;
            let mut chosen = None;
            for (index, slope) in slopes.iter().enumerate() {
                if *slope <= 0.0 {
                    continue;
                }
                cumulative += slope;
                chosen = Some(index);
                if target < cumulative {
                    break;
                }
            }
            chosen?
        } else {
            let mut best = None;
            let mut best_slope = 0.0;
            for (index, slope) in slopes.iter().enumerate() {
                if *slope > best_slope {
                    best_slope = *slope;
                    best = Some(index);
                }
            }
            best?
        };
        Some(centre + D8_OFFSETS[chosen].as_vec2() - position)
    }

    fn trace(
        &self,
        release_x: u32,
        release_y: u32,
        rng: &mut PathRng,
        layers: &mut TrajectoryLayers,
    ) -> Termination {
        let settings = self.settings;
        let gravity = settings.model2.gravity;
        let mut position = Vec2::new(release_x as f32 + 0.5, release_y as f32 + 0.5)
            * self.multiplier;
        let release_height = self.height(position);
        let mut previous_direction = self.downhill(position);
        let mut speed = 0.0f32;
        let mut slow_steps = 0u32;
        let mut travelled = 0.0f32;

        for step in 0..settings.num_steps {
            if self.off_map(position) {
                return Termination::OffMap;
            }
            let current_height = self.height(position);
            let drop = release_height - current_height;
            let z_delta = match settings.physics_model {
                PhysicsModel::PhysicsLessSimple => speed * speed / (2.0 * gravity),
                _ => drop,
            };
            let cell = position.floor();
            let index = (cell.y as u32 * layers.width() + cell.x as u32) as usize;
            layers.update(LayerKind::ZDelta, index, |value| {
                *value = (*value).max(encode_ordered_f32(z_delta));
            });
            layers.update(LayerKind::CellCounts, index, |value| {
                *value = value.wrapping_add(1);
            });
            layers.update(LayerKind::TravelLength, index, |value| {
                *value = (*value).max(encode_ordered_f32(travelled));
            });
            if travelled > 0.0 {
                let angle = drop.atan2(travelled).to_degrees();
                layers.update(LayerKind::TravelAngle, index, |value| {
                    *value = (*value).min(encode_ordered_f32(angle));
                });
            }
            layers.update(LayerKind::HeightDifference, index, |value| {
                *value = (*value).max(encode_ordered_f32(drop));
            });

            if step + 1 >= settings.num_steps {
                return Termination::MaxSteps;
            }

            let delta = match settings.physics_model {
                PhysicsModel::PhysicsSimple | PhysicsModel::PhysicsLessSimple => {
                    let gradient = self.downhill(position);
                    let angle = rng.next_f32() * TAU;
                    let random = Vec2::new(angle.cos(), angle.sin());
                    let blended = previous_direction * settings.persistence_contribution
                        + random * settings.random_contribution
                        + gradient
                            * (1.0
                                - settings.persistence_contribution
                                - settings.random_contribution);
                    let direction = normalize_or_zero(blended);
                    if direction == Vec2::ZERO {
                        return Termination::Stopped;
                    }
                    direction * settings.step_length
                }
                PhysicsModel::Gradient => {
                    let direction = self.downhill(position);
                    if direction == Vec2::ZERO {
                        return Termination::Stopped;
                    }
                    direction * settings.step_length
                }
                PhysicsModel::DiscretizedGradient => {
                    let gradient = self.downhill(position);
                    if gradient == Vec2::ZERO {
                        return Termination::Stopped;
                    }
                    let octant = (gradient.y.atan2(gradient.x) / FRAC_PI_4 + 0.5).floor() as i32;
                    let offset = D8_OFFSETS[octant.rem_euclid(8) as usize].as_vec2();
                    normalize_or_zero(offset) * settings.step_length
                }
                PhysicsModel::D8NoWeights => match self.d8_step(position, false, rng) {
                    Some(delta) => delta,
                    None => return Termination::Stopped,
                },
                PhysicsModel::D8Weights => match self.d8_step(position, true, rng) {
                    Some(delta) => delta,
                    None => return Termination::Stopped,
                },
            };
            let step_metres = self.metres(delta);

            if settings.physics_model == PhysicsModel::PhysicsLessSimple {
                let cos_theta = self.cos_slope(position);
                let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
                let friction = friction_per_unit_mass(
                    settings.friction_model,
                    &settings.model2,
                    speed,
                    cos_theta,
                );
                let speed_sq = (speed * speed
                    + 2.0 * step_metres * (gravity * sin_theta - friction))
                    .max(0.0);
                speed = speed_sq.sqrt();
                if speed < MIN_SPEED {
                    slow_steps += 1;
                    if slow_steps >= 2 {
                        return Termination::Stopped;
                    }
                } else {
                    slow_steps = 0;
                }
            }

            position += delta;
            travelled += step_metres;
            previous_direction = normalize_or_zero(delta);

            if travelled > 0.0 {
                let angle = (release_height - self.height(position)).atan2(travelled);
                if angle < settings.runout_flowpy_alpha {
                    return Termination::Runout;
                }
            }
        }
        Termination::MaxSteps
    }
}

/// Divides by the length instead of multiplying by its reciprocal so axis
/// aligned directions stay exact.
pub fn normalize_or_zero(vector: Vec2) -> Vec2 {
    let length = vector.length();
    if length < 1e-12 {
        return Vec2::ZERO;
    }
    vector / length
}
