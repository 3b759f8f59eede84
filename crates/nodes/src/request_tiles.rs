use std::fmt;
use std::path::Path;

use gpu_runtime::Context;
use node_graph::{InputData, Node, NodeRunFailure, SocketData, SocketSpec, SocketType};
use tiles::TileId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileSourceError {
    UnsupportedScheme { url: String },
    Read { path: String, message: String },
}

impl fmt::Display for TileSourceError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileSourceError::UnsupportedScheme { url } => {
                write!(formatter, "unsupported tile url scheme: {url}")
            }
            TileSourceError::Read { path, message } => {
                write!(formatter, "failed to read tile {path}: {message}")
            }
        }
    }
}

impl std::error::Error for TileSourceError {}

/// Loads encoded tile images. Implementations block until the bytes are
/// available.
pub trait TileSource {
    fn load(&self, id: TileId) -> Result<Vec<u8>, TileSourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileScheme {
    /// y grows north, like `TileId`.
    #[default]
    Tms,
    /// y grows south.
    SlippyMap,
}

/// Tiles on a local file system, addressed by a `{z}/{x}/{y}` template
/// that is either a plain path or a `file://` url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTileSource {
    pub url_template: String,
    pub scheme: TileScheme,
}

impl FileTileSource {
    pub fn new(url_template: impl Into<String>, scheme: TileScheme) -> Self {
        Self {
            url_template: url_template.into(),
            scheme,
        }
    }

    pub fn resolve_url(&self, id: TileId) -> String {
        let y = match self.scheme {
            TileScheme::Tms => id.y,
            TileScheme::SlippyMap => (1u32 << id.zoom) - 1 - id.y,
        };
        self.url_template
            .replace("{z}", &id.zoom.to_string())
            .replace("{x}", &id.x.to_string())
            .replace("{y}", &y.to_string())
    }
}

impl TileSource for FileTileSource {
    fn load(&self, id: TileId) -> Result<Vec<u8>, TileSourceError> {
        let url = self.resolve_url(id);
        let path = match url.strip_prefix("file://") {
            Some(path) => path,
            None if url.contains("://") => return Err(TileSourceError::UnsupportedScheme { url }),
            None => url.as_str(),
        };
        std::fs::read(Path::new(path)).map_err(|error| TileSourceError::Read {
            path: path.to_owned(),
            message: error.to_string(),
        })
    }
}

const INPUTS: &[SocketSpec] = &[SocketSpec::new("tile ids", SocketType::TileIdList)];
const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("tile data", SocketType::ByteArrayList)];

/// Fetches one encoded image per tile id, in input order.
pub struct RequestTilesNode {
    source: Box<dyn TileSource>,
    tile_data: Option<Vec<Vec<u8>>>,
}

impl RequestTilesNode {
    pub fn new(source: impl TileSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            tile_data: None,
        }
    }

    pub fn set_source(&mut self, source: impl TileSource + 'static) {
        self.source = Box::new(source);
    }
}

impl Node for RequestTilesNode {
    type Context = Context;

    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output<'a>(&'a self, index: usize, _inputs: &InputData<'a>) -> Option<SocketData<'a>> {
        match index {
            0 => self.tile_data.as_deref().map(SocketData::ByteArrayList),
            _ => None,
        }
    }

    async fn run_impl(
        &mut self,
        _context: &Context,
        inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        self.tile_data = None;
        let ids = inputs.get::<&[TileId]>("tile ids")?;
        let mut tile_data = Vec::with_capacity(ids.len());
        for id in ids {
            let bytes = self.source.load(*id).map_err(|error| {
                NodeRunFailure::new(format!("failed to load tile {id}: {error}"))
            })?;
            tile_data.push(bytes);
        }
        log::debug!("requested {} tiles", tile_data.len());
        self.tile_data = Some(tile_data);
        Ok(())
    }
}
