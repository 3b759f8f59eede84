use std::fmt;
use std::path::PathBuf;

use glam::DVec2;
use gpu_runtime::Context;
use node_graph::{InputData, Node, NodeRunFailure, SocketData, SocketSpec, SocketType};
use tiles::{Aabb2, AabbError};

#[derive(Debug, Clone, PartialEq)]
pub enum AabbParseError {
    Open { path: String },
    InvalidFloat { path: String, text: String, line: usize },
    LineCount { path: String, count: usize },
    Bounds(AabbError),
}

impl fmt::Display for AabbParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AabbParseError::Open { path } => write!(formatter, "Failed to open file {path}"),
            AabbParseError::InvalidFloat { path, text, line } => write!(
                formatter,
                "Failed to parse file {path}: Could not convert \"{text}\" to float (line {line})"
            ),
            AabbParseError::LineCount { path, count } => write!(
                formatter,
                "Failed to parse file {path}: expected 4 lines (min_x, min_y, max_x, max_y), found {count}"
            ),
            AabbParseError::Bounds(error) => write!(formatter, "{error}"),
        }
    }
}

impl std::error::Error for AabbParseError {}

impl From<AabbParseError> for NodeRunFailure {
    fn from(error: AabbParseError) -> Self {
        NodeRunFailure::new(error.to_string())
    }
}

/// Parses four float lines `min_x, min_y, max_x, max_y`. `path` only
/// names the source in error messages.
pub fn parse_region_aabb(text: &str, path: &str) -> Result<Aabb2, AabbParseError> {
    let mut lines: Vec<&str> = text.lines().collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    if lines.len() != 4 {
        return Err(AabbParseError::LineCount {
            path: path.to_owned(),
            count: lines.len(),
        });
    }
    let mut values = [0.0f64; 4];
    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        values[index] = trimmed
            .parse::<f64>()
            .map_err(|_| AabbParseError::InvalidFloat {
                path: path.to_owned(),
                text: trimmed.to_owned(),
                line: index + 1,
            })?;
    }
    Aabb2::try_new(
        DVec2::new(values[0], values[1]),
        DVec2::new(values[2], values[3]),
    )
    .map_err(AabbParseError::Bounds)
}

/// Inverse of [`parse_region_aabb`]; `f64` display round-trips exactly.
pub fn format_region_aabb(aabb: &Aabb2) -> String {
    format!(
        "{}\n{}\n{}\n{}\n",
        aabb.min.x, aabb.min.y, aabb.max.x, aabb.max.y
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadRegionAabbSettings {
    pub file_path: PathBuf,
}

const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("region aabb", SocketType::RegionAabb)];

#[derive(Debug, Default)]
pub struct LoadRegionAabbNode {
    settings: LoadRegionAabbSettings,
    aabb: Option<Aabb2>,
}

impl LoadRegionAabbNode {
    pub fn new(settings: LoadRegionAabbSettings) -> Self {
        Self {
            settings,
            aabb: None,
        }
    }

    pub fn settings(&self) -> &LoadRegionAabbSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: LoadRegionAabbSettings) {
        self.settings = settings;
    }

    pub fn aabb(&self) -> Option<&Aabb2> {
        self.aabb.as_ref()
    }
}

impl Node for LoadRegionAabbNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        &[]
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output<'a>(&'a self, index: usize, _inputs: &InputData<'a>) -> Option<SocketData<'a>> {
        match index {
            0 => self.aabb.as_ref().map(SocketData::RegionAabb),
            _ => None,
        }
    }

    async fn run_impl(
        &mut self,
        _context: &Context,
        _inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        let path = self.settings.file_path.display().to_string();
        self.aabb = None;
        let text = std::fs::read_to_string(&self.settings.file_path)
            .map_err(|_| AabbParseError::Open { path: path.clone() })?;
        let aabb = parse_region_aabb(&text, &path)?;
        log::debug!(
            "loaded region aabb [({}, {}), ({}, {})] from {path}",
            aabb.min.x,
            aabb.min.y,
            aabb.max.x,
            aabb.max.y
        );
        self.aabb = Some(aabb);
        Ok(())
    }
}
