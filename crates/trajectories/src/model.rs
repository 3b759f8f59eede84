use std::fmt;

use serde::{Deserialize, Serialize};

/// Movement model of a single path. Settings files use the numeric codes
/// `1..=6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhysicsModel {
    /// Kinematic walk along the blended direction.
    PhysicsSimple,
    /// Blended direction with speed integrated from gravity and friction.
    PhysicsLessSimple,
    Gradient,
    DiscretizedGradient,
    D8NoWeights,
    D8Weights,
}

impl PhysicsModel {
    pub const ALL: [PhysicsModel; 6] = [
        PhysicsModel::PhysicsSimple,
        PhysicsModel::PhysicsLessSimple,
        PhysicsModel::Gradient,
        PhysicsModel::DiscretizedGradient,
        PhysicsModel::D8NoWeights,
        PhysicsModel::D8Weights,
    ];

    pub fn code(self) -> i32 {
        match self {
            PhysicsModel::PhysicsSimple => 1,
            PhysicsModel::PhysicsLessSimple => 2,
            PhysicsModel::Gradient => 3,
            PhysicsModel::DiscretizedGradient => 4,
            PhysicsModel::D8NoWeights => 5,
            PhysicsModel::D8Weights => 6,
        }
    }

    /// Index used by the shader's model switch.
    pub fn gpu_index(self) -> u32 {
        (self.code() - 1) as u32
    }

    pub fn from_code(code: i32) -> Result<Self, ModelCodeError> {
        Self::ALL
            .into_iter()
            .find(|model| model.code() == code)
            .ok_or(ModelCodeError::PhysicsModel(code))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrictionModel {
    Coulomb,
    Voellmy,
    VoellmyMinShear,
    SamosAt,
    None,
}

impl FrictionModel {
    pub const ALL: [FrictionModel; 5] = [
        FrictionModel::Coulomb,
        FrictionModel::Voellmy,
        FrictionModel::VoellmyMinShear,
        FrictionModel::SamosAt,
        FrictionModel::None,
    ];

    pub fn code(self) -> i32 {
        match self {
            FrictionModel::Coulomb => 0,
            FrictionModel::Voellmy => 1,
            FrictionModel::VoellmyMinShear => 2,
            FrictionModel::SamosAt => 3,
            FrictionModel::None => 4,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, ModelCodeError> {
        Self::ALL
            .into_iter()
            .find(|model| model.code() == code)
            .ok_or(ModelCodeError::FrictionModel(code))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCodeError {
    PhysicsModel(i32),
    FrictionModel(i32),
}

impl fmt::Display for ModelCodeError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelCodeError::PhysicsModel(code) => {
                write!(formatter, "unknown physics model {code}, expected 1..=6")
            }
            ModelCodeError::FrictionModel(code) => {
                write!(formatter, "unknown friction model {code}, expected 0..=4")
            }
        }
    }
}

impl std::error::Error for ModelCodeError {}

/// Parameters of the speed-integrating model and of the friction laws.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Model2Settings {
    pub gravity: f32,
    /// Carried for reporting; forces are evaluated per unit mass.
    pub mass: f32,
    pub friction_coeff: f32,
    /// Turbulent friction coefficient xi in m/s^2.
    pub drag_coeff: f32,
    pub slab_thickness: f32,
    pub density: f32,
    /// Minimum shear stress in Pa, also the SamosAT cohesion term.
    pub min_shear_stress: f32,
}

impl Default for Model2Settings {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            mass: 10.0,
            friction_coeff: 0.155,
            drag_coeff: 4000.0,
            slab_thickness: 0.5,
            density: 200.0,
            min_shear_stress: 70.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    ZDelta,
    CellCounts,
    TravelLength,
    TravelAngle,
    HeightDifference,
}

impl LayerKind {
    pub const ALL: [LayerKind; 5] = [
        LayerKind::ZDelta,
        LayerKind::CellCounts,
        LayerKind::TravelLength,
        LayerKind::TravelAngle,
        LayerKind::HeightDifference,
    ];

    pub fn index(self) -> usize {
        match self {
            LayerKind::ZDelta => 0,
            LayerKind::CellCounts => 1,
            LayerKind::TravelLength => 2,
            LayerKind::TravelAngle => 3,
            LayerKind::HeightDifference => 4,
        }
    }

    pub fn socket_name(self) -> &'static str {
        match self {
            LayerKind::ZDelta => "layer1_zdelta",
            LayerKind::CellCounts => "layer2_cellCounts",
            LayerKind::TravelLength => "layer3_travelLength",
            LayerKind::TravelAngle => "layer4_travelAngle",
            LayerKind::HeightDifference => "layer5_heightDifference",
        }
    }

    /// Value every cell holds before the first path arrives.
    pub fn initial_value(self) -> u32 {
        match self {
            LayerKind::TravelAngle => crate::TRAVEL_ANGLE_EMPTY,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveLayers {
    bits: u32,
}

impl ActiveLayers {
    pub const fn all() -> Self {
        Self { bits: 0b1_1111 }
    }

    pub const fn none() -> Self {
        Self { bits: 0 }
    }

    pub fn with(mut self, layer: LayerKind, active: bool) -> Self {
        let mask = 1 << layer.index();
        if active {
            self.bits |= mask;
        } else {
            self.bits &= !mask;
        }
        self
    }

    pub fn contains(self, layer: LayerKind) -> bool {
        self.bits & (1 << layer.index()) != 0
    }

    pub fn bits(self) -> u32 {
        self.bits
    }
}

impl Default for ActiveLayers {
    fn default() -> Self {
        Self::all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySettings {
    pub resolution_multiplier: u32,
    pub num_steps: u32,
    /// Step length in output texels.
    pub step_length: f32,
    pub num_paths_per_release_cell: u32,
    pub num_runs: u32,
    pub random_contribution: f32,
    pub persistence_contribution: f32,
    pub random_seed: u32,
    /// Flow-Py runout angle in radians.
    pub runout_flowpy_alpha: f32,
    pub physics_model: PhysicsModel,
    pub friction_model: FrictionModel,
    pub model2: Model2Settings,
    pub active_layers: ActiveLayers,
}

impl Default for TrajectorySettings {
    fn default() -> Self {
        Self {
            resolution_multiplier: 1,
            num_steps: 2048,
            step_length: 0.1,
            num_paths_per_release_cell: 500,
            num_runs: 1,
            random_contribution: 0.2,
            persistence_contribution: 0.2,
            random_seed: 1,
            runout_flowpy_alpha: 25f32.to_radians(),
            physics_model: PhysicsModel::PhysicsLessSimple,
            friction_model: FrictionModel::Voellmy,
            model2: Model2Settings::default(),
            active_layers: ActiveLayers::all(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrajectorySettingsError {
    ResolutionMultiplier(u32),
    NumSteps(u32),
    NumPaths(u32),
    NumRuns,
    StepLength(f32),
    Contribution {
        random: f32,
        persistence: f32,
    },
    RunoutAlpha(f32),
    NonPositive(&'static str),
}

impl fmt::Display for TrajectorySettingsError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrajectorySettingsError::ResolutionMultiplier(value) => write!(
                formatter,
                "resolution multiplier {value} must be within 1..=32"
            ),
            TrajectorySettingsError::NumSteps(value) => {
                write!(formatter, "num_steps {value} must be within 1..=20000")
            }
            TrajectorySettingsError::NumPaths(value) => write!(
                formatter,
                "num_paths_per_release_cell {value} must be within 1..=2048"
            ),
            TrajectorySettingsError::NumRuns => write!(formatter, "num_runs must be at least 1"),
            TrajectorySettingsError::StepLength(value) => {
                write!(formatter, "step_length {value} must be positive")
            }
            TrajectorySettingsError::Contribution {
                random,
                persistence,
            } => write!(
                formatter,
                "random ({random}) and persistence ({persistence}) contributions must be in [0, 1) and sum to less than 1"
            ),
            TrajectorySettingsError::RunoutAlpha(value) => write!(
                formatter,
                "runout alpha {value} rad must be within [0, pi/2]"
            ),
            TrajectorySettingsError::NonPositive(name) => {
                write!(formatter, "{name} must be positive")
            }
        }
    }
}

impl std::error::Error for TrajectorySettingsError {}

impl TrajectorySettings {
    pub fn validate(&self) -> Result<(), TrajectorySettingsError> {
        if !(1..=32).contains(&self.resolution_multiplier) {
            return Err(TrajectorySettingsError::ResolutionMultiplier(
                self.resolution_multiplier,
            ));
        }
        if !(1..=20_000).contains(&self.num_steps) {
            return Err(TrajectorySettingsError::NumSteps(self.num_steps));
        }
        if !(1..=2048).contains(&self.num_paths_per_release_cell) {
            return Err(TrajectorySettingsError::NumPaths(
                self.num_paths_per_release_cell,
            ));
        }
        if self.num_runs == 0 {
            return Err(TrajectorySettingsError::NumRuns);
        }
        if !(self.step_length > 0.0) {
            return Err(TrajectorySettingsError::StepLength(self.step_length));
        }
        let random = self.random_contribution;
        let persistence = self.persistence_contribution;
        let in_unit = |value: f32| (0.0..1.0).contains(&value);
        if !in_unit(random) || !in_unit(persistence) || random + persistence >= 1.0 {
            return Err(TrajectorySettingsError::Contribution {
                random,
                persistence,
            });
        }
        if !(0.0..=std::f32::consts::FRAC_PI_2).contains(&self.runout_flowpy_alpha) {
            return Err(TrajectorySettingsError::RunoutAlpha(self.runout_flowpy_alpha));
        }
        let model2 = &self.model2;
        for (name, value) in [
            ("gravity", model2.gravity),
            ("mass", model2.mass),
            ("drag_coeff", model2.drag_coeff),
            ("slab_thickness", model2.slab_thickness),
            ("density", model2.density),
        ] {
            if !(value > 0.0) {
                return Err(TrajectorySettingsError::NonPositive(name));
            }
        }
        Ok(())
    }
}
