use std::fmt;

use gpu_runtime::{GpuTexture, StorageBuffer};
use tiles::{Aabb2, GpuHashMap, TileId, TileStorageTexture};

/// The closed set of values that can flow along a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
    TileIdList,
    ByteArrayList,
    TileStorage,
    HashMap,
    Texture,
    Buffer,
    RasterDimensions,
    RegionAabb,
}

impl fmt::Display for SocketType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketType::TileIdList => "tile id list",
            SocketType::ByteArrayList => "byte array list",
            SocketType::TileStorage => "tile storage",
            SocketType::HashMap => "hash map",
            SocketType::Texture => "texture",
            SocketType::Buffer => "buffer",
            SocketType::RasterDimensions => "raster dimensions",
            SocketType::RegionAabb => "region aabb",
        };
        formatter.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterDimensions {
    pub width: u32,
    pub height: u32,
}

impl RasterDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn texel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// A borrowed view of a producer's output. Only `RasterDimensions` is
/// carried by value.
#[derive(Clone, Copy)]
pub enum SocketData<'a> {
    TileIdList(&'a [TileId]),
    ByteArrayList(&'a [Vec<u8>]),
    TileStorage(&'a TileStorageTexture),
    HashMap(&'a GpuHashMap),
    Texture(&'a GpuTexture),
    Buffer(&'a StorageBuffer),
    RasterDimensions(RasterDimensions),
    RegionAabb(&'a Aabb2),
}

impl SocketData<'_> {
    pub fn socket_type(&self) -> SocketType {
        match self {
            SocketData::TileIdList(_) => SocketType::TileIdList,
            SocketData::ByteArrayList(_) => SocketType::ByteArrayList,
            SocketData::TileStorage(_) => SocketType::TileStorage,
            SocketData::HashMap(_) => SocketType::HashMap,
            SocketData::Texture(_) => SocketType::Texture,
            SocketData::Buffer(_) => SocketType::Buffer,
            SocketData::RasterDimensions(_) => SocketType::RasterDimensions,
            SocketData::RegionAabb(_) => SocketType::RegionAabb,
        }
    }
}

impl fmt::Debug for SocketData<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketData::TileIdList(ids) => write!(formatter, "TileIdList(len={})", ids.len()),
            SocketData::ByteArrayList(data) => {
                write!(formatter, "ByteArrayList(len={})", data.len())
            }
            SocketData::TileStorage(storage) => write!(
                formatter,
                "TileStorage({}x{}, {}/{} used)",
                storage.width(),
                storage.height(),
                storage.num_used(),
                storage.capacity()
            ),
            SocketData::HashMap(map) => write!(formatter, "HashMap(len={})", map.len()),
            SocketData::Texture(texture) => write!(
                formatter,
                "Texture({}x{}, {:?})",
                texture.width(),
                texture.height(),
                texture.format()
            ),
            SocketData::Buffer(buffer) => write!(formatter, "Buffer(len={})", buffer.len()),
            SocketData::RasterDimensions(dimensions) => write!(
                formatter,
                "RasterDimensions({}x{})",
                dimensions.width, dimensions.height
            ),
            SocketData::RegionAabb(aabb) => write!(formatter, "RegionAabb({aabb:?})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketSpec {
    pub name: &'static str,
    pub socket_type: SocketType,
}

impl SocketSpec {
    pub const fn new(name: &'static str, socket_type: SocketType) -> Self {
        Self { name, socket_type }
    }
}

/// Rust types that can be read from a socket. `TYPE` witnesses the variant
/// so lookups can be checked against the socket declaration.
pub trait SocketValue<'a>: Sized {
    const TYPE: SocketType;

    fn from_socket(data: SocketData<'a>) -> Option<Self>;
}

macro_rules! socket_value {
    ($target:ty, $variant:ident) => {
        impl<'a> SocketValue<'a> for $target {
            const TYPE: SocketType = SocketType::$variant;

            fn from_socket(data: SocketData<'a>) -> Option<Self> {
                match data {
                    SocketData::$variant(value) => Some(value),
                    _ => None,
                }
            }
        }
    };
}

socket_value!(&'a [TileId], TileIdList);
socket_value!(&'a [Vec<u8>], ByteArrayList);
socket_value!(&'a TileStorageTexture, TileStorage);
socket_value!(&'a GpuHashMap, HashMap);
socket_value!(&'a GpuTexture, Texture);
socket_value!(&'a StorageBuffer, Buffer);
socket_value!(RasterDimensions, RasterDimensions);
socket_value!(&'a Aabb2, RegionAabb);
