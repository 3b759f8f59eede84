use std::fmt;
use std::path::{Path, PathBuf};

use nodes::{BufferToTextureSettings, EvalGraphSettings};
use serde::{Deserialize, Serialize};
use trajectories::{FrictionModel, Model2Settings, PhysicsModel, TrajectorySettings};

/// Friction law the evaluation always runs with.
pub const EVAL_FRICTION_MODEL: FrictionModel = FrictionModel::VoellmyMinShear;
/// Trajectory step length in output texels.
pub const EVAL_STEP_LENGTH: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    Read { path: PathBuf, message: String },
    Parse { path: PathBuf, message: String },
    Invalid { key: &'static str, message: String },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Read { path, message } => {
                write!(formatter, "failed to read {}: {message}", path.display())
            }
            SettingsError::Parse { path, message } => {
                write!(formatter, "failed to parse {}: {message}", path.display())
            }
            SettingsError::Invalid { key, message } => {
                write!(formatter, "invalid setting '{key}': {message}")
            }
        }
    }
}

impl std::error::Error for SettingsError {}

fn invalid(key: &'static str, message: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        key,
        message: message.into(),
    }
}

fn default_random_seed() -> u32 {
    1
}

/// Contents of the evaluation settings file. Keys mirror the JSON names;
/// `alpha` is in degrees and the model fields use their numeric codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSettings {
    pub trajectory_resolution_multiplier: u32,
    pub num_steps: u32,
    pub num_paths_per_release_cell: u32,
    pub random_contribution: f32,
    pub persistence_contribution: f32,
    pub alpha: f32,
    pub aabb_file_path: PathBuf,
    pub release_points_texture_path: PathBuf,
    pub heightmap_texture_path: PathBuf,
    pub output_dir_path: PathBuf,
    #[serde(default = "default_random_seed")]
    pub random_seed: u32,
    pub model_type: i32,
    pub friction_model: i32,
    pub friction_coeff: f32,
    pub drag_coeff: f32,
    pub slab_thickness: f32,
    pub density: f32,
}

impl EvalSettings {
    pub fn from_json_str(text: &str, path: &Path) -> Result<Self, SettingsError> {
        serde_json::from_str(text).map_err(|error| SettingsError::Parse {
            path: path.to_owned(),
            message: error.to_string(),
        })
    }

    /// Reads and parses `path`. Relative paths inside are resolved against
    /// the directory of the file.
    pub fn read_from_json_file(path: &Path) -> Result<Self, SettingsError> {
        if path.is_dir() {
            return Err(SettingsError::Read {
                path: path.to_owned(),
                message: "path is a directory".to_owned(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|error| SettingsError::Read {
            path: path.to_owned(),
            message: error.to_string(),
        })?;
        let mut settings = Self::from_json_str(&text, path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        settings.resolve_relative_paths(base_dir);
        Ok(settings)
    }

    pub fn write_to_json_file(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    pub fn resolve_relative_paths(&mut self, base_dir: &Path) {
        for path in [
            &mut self.aabb_file_path,
            &mut self.release_points_texture_path,
            &mut self.heightmap_texture_path,
            &mut self.output_dir_path,
        ] {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        check_range(
            "trajectory_resolution_multiplier",
            self.trajectory_resolution_multiplier,
            1,
            32,
        )?;
        check_range("num_steps", self.num_steps, 1, 20_000)?;
        check_range(
            "num_paths_per_release_cell",
            self.num_paths_per_release_cell,
            1,
            2048,
        )?;
        check_unit_interval("random_contribution", self.random_contribution)?;
        check_unit_interval("persistence_contribution", self.persistence_contribution)?;
        if self.random_contribution + self.persistence_contribution >= 1.0 {
            return Err(invalid(
                "persistence_contribution",
                format!(
                    "random_contribution ({}) and persistence_contribution ({}) must sum to less than 1",
                    self.random_contribution, self.persistence_contribution
                ),
            ));
        }
        if !(0.0..=90.0).contains(&self.alpha) {
            return Err(invalid(
                "alpha",
                format!("{} must be within [0, 90] degrees", self.alpha),
            ));
        }
        PhysicsModel::from_code(self.model_type)
            .map_err(|error| invalid("model_type", error.to_string()))?;
        FrictionModel::from_code(self.friction_model)
            .map_err(|error| invalid("friction_model", error.to_string()))?;
        if !(self.friction_coeff >= 0.0) {
            return Err(invalid(
                "friction_coeff",
                format!("{} must not be negative", self.friction_coeff),
            ));
        }
        for (key, value) in [
            ("drag_coeff", self.drag_coeff),
            ("slab_thickness", self.slab_thickness),
            ("density", self.density),
        ] {
            if !(value > 0.0) {
                return Err(invalid(key, format!("{value} must be positive")));
            }
        }
        for (key, path) in [
            ("aabb_file_path", &self.aabb_file_path),
            ("release_points_texture_path", &self.release_points_texture_path),
            ("heightmap_texture_path", &self.heightmap_texture_path),
            ("output_dir_path", &self.output_dir_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(invalid(key, "path must not be empty"));
            }
        }
        Ok(())
    }

    /// Model settings for the trajectory node. The friction law is always
    /// [`EVAL_FRICTION_MODEL`].
    pub fn trajectory_settings(&self) -> Result<TrajectorySettings, SettingsError> {
        self.validate()?;
        let requested = FrictionModel::from_code(self.friction_model)
            .map_err(|error| invalid("friction_model", error.to_string()))?;
        if requested != EVAL_FRICTION_MODEL {
            log::warn!(
                "friction_model {} ({requested:?}) is ignored, evaluation runs with {EVAL_FRICTION_MODEL:?}",
                self.friction_model
            );
        }
        let physics_model = PhysicsModel::from_code(self.model_type)
            .map_err(|error| invalid("model_type", error.to_string()))?;
        Ok(TrajectorySettings {
            resolution_multiplier: self.trajectory_resolution_multiplier,
            num_steps: self.num_steps,
            step_length: EVAL_STEP_LENGTH,
            num_paths_per_release_cell: self.num_paths_per_release_cell,
            random_contribution: self.random_contribution,
            persistence_contribution: self.persistence_contribution,
            random_seed: self.random_seed,
            runout_flowpy_alpha: self.alpha.to_radians(),
            physics_model,
            friction_model: EVAL_FRICTION_MODEL,
            model2: Model2Settings {
                friction_coeff: self.friction_coeff,
                drag_coeff: self.drag_coeff,
                slab_thickness: self.slab_thickness,
                density: self.density,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    /// The settings the run actually uses, with the friction model replaced
    /// by [`EVAL_FRICTION_MODEL`].
    pub fn effective(&self) -> Self {
        Self {
            friction_model: EVAL_FRICTION_MODEL.code(),
            ..self.clone()
        }
    }

    pub fn graph_settings(&self) -> Result<EvalGraphSettings, SettingsError> {
        Ok(EvalGraphSettings {
            aabb_file_path: self.aabb_file_path.clone(),
            release_points_texture_path: self.release_points_texture_path.clone(),
            heightmap_texture_path: self.heightmap_texture_path.clone(),
            output_dir_path: self.output_dir_path.clone(),
            trajectories: self.trajectory_settings()?,
            colorize: BufferToTextureSettings::default(),
        })
    }
}

fn check_range(key: &'static str, value: u32, min: u32, max: u32) -> Result<(), SettingsError> {
    if !(min..=max).contains(&value) {
        return Err(invalid(key, format!("{value} must be within {min}..={max}")));
    }
    Ok(())
}

fn check_unit_interval(key: &'static str, value: f32) -> Result<(), SettingsError> {
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(key, format!("{value} must be within [0, 1)")));
    }
    Ok(())
}
