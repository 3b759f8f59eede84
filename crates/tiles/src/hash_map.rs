//! `TileId -> u32` map mirrored into two GPU storage buffers.
//!
//! The CPU side keeps an ordered shadow map; [`GpuHashMap::update_gpu_data`]
//! rebuilds an open-addressing table from it and uploads keys and values.
//! Shaders probe the table with the same hash and linear probing (see
//! `hash_map.wgsl` in `gpu_runtime`).

use std::collections::BTreeMap;

use crate::{GpuTileId, TileId, gpu_hash};

pub const DEFAULT_HASH_MAP_CAPACITY: u32 = 1 << 16;
pub const EMPTY_VALUE: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTable {
    pub keys: Vec<GpuTileId>,
    pub values: Vec<u32>,
}

impl ProbeTable {
    pub fn capacity(&self) -> u32 {
        self.keys.len() as u32
    }

    /// Host-side mirror of the shader lookup.
    pub fn get(&self, id: TileId) -> u32 {
        if id == TileId::INVALID {
            return EMPTY_VALUE;
        }
        let capacity = self.capacity();
        let wanted = GpuTileId::from(id);
        let empty = GpuTileId::from(TileId::INVALID);
        let mut slot = gpu_hash(id, capacity);
        for _ in 0..capacity {
            let key = self.keys[slot as usize];
            if key == wanted {
                return self.values[slot as usize];
            }
            if key == empty {
                return EMPTY_VALUE;
            }
            slot = (slot + 1) & (capacity - 1);
        }
        EMPTY_VALUE
    }
}

pub fn build_probe_table<'a>(
    entries: impl IntoIterator<Item = (&'a TileId, &'a u32)>,
    capacity: u32,
) -> ProbeTable {
    assert!(
        capacity.is_power_of_two(),
        "hash map capacity {capacity} must be a power of two"
    );
    let empty = GpuTileId::from(TileId::INVALID);
    let mut keys = vec![empty; capacity as usize];
    let mut values = vec![EMPTY_VALUE; capacity as usize];
    let mut stored = 0u32;
    for (id, value) in entries {
        assert!(
            *id != TileId::INVALID,
            "the invalid tile id cannot be stored in a hash map"
        );
        stored += 1;
        assert!(
            stored <= capacity,
            "hash map overflow: more than {capacity} keys"
        );
        let mut slot = gpu_hash(*id, capacity);
        while keys[slot as usize] != empty {
            slot = (slot + 1) & (capacity - 1);
        }
        keys[slot as usize] = GpuTileId::from(*id);
        values[slot as usize] = *value;
    }
    ProbeTable { keys, values }
}

#[derive(Debug)]
pub struct GpuHashMap {
    capacity: u32,
    shadow: BTreeMap<TileId, u32>,
    key_buffer: wgpu::Buffer,
    value_buffer: wgpu::Buffer,
}

impl GpuHashMap {
    pub fn new(device: &wgpu::Device) -> Self {
        Self::with_capacity(device, DEFAULT_HASH_MAP_CAPACITY)
    }

    pub fn with_capacity(device: &wgpu::Device, capacity: u32) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "hash map capacity {capacity} must be a power of two"
        );
        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;
        let key_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tiles.hash_map.keys"),
            size: u64::from(capacity) * std::mem::size_of::<GpuTileId>() as u64,
            usage,
            mapped_at_creation: false,
        });
        let value_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tiles.hash_map.values"),
            size: u64::from(capacity) * std::mem::size_of::<u32>() as u64,
            usage,
            mapped_at_creation: false,
        });
        Self {
            capacity,
            shadow: BTreeMap::new(),
            key_buffer,
            value_buffer,
        }
    }

    /// Independent copy with its own buffers, already uploaded.
    pub fn duplicate(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let mut copy = Self::with_capacity(device, self.capacity);
        copy.shadow = self.shadow.clone();
        copy.update_gpu_data(queue);
        copy
    }

    /// Takes effect on the GPU after [`Self::update_gpu_data`].
    pub fn store(&mut self, id: TileId, value: u32) {
        assert!(
            id != TileId::INVALID,
            "the invalid tile id cannot be stored in a hash map"
        );
        if !self.shadow.contains_key(&id) {
            assert!(
                (self.shadow.len() as u64) < u64::from(self.capacity),
                "hash map overflow: capacity {} exhausted",
                self.capacity
            );
        }
        self.shadow.insert(id, value);
    }

    pub fn remove(&mut self, id: TileId) -> Option<u32> {
        self.shadow.remove(&id)
    }

    pub fn clear(&mut self) {
        self.shadow.clear();
    }

    pub fn value_at(&self, id: TileId) -> Option<u32> {
        self.shadow.get(&id).copied()
    }

    pub fn key_with_value(&self, value: u32) -> Option<TileId> {
        self.shadow
            .iter()
            .find_map(|(id, stored)| (*stored == value).then_some(*id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileId, u32)> + '_ {
        self.shadow.iter().map(|(id, value)| (*id, *value))
    }

    pub fn len(&self) -> usize {
        self.shadow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shadow.is_empty()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn probe_table(&self) -> ProbeTable {
        build_probe_table(self.shadow.iter(), self.capacity)
    }

    pub fn update_gpu_data(&self, queue: &wgpu::Queue) {
        if self.shadow.len() as u64 > u64::from(self.capacity / 2) {
            log::warn!(
                "hash map load factor above 0.5 ({} of {} slots), probing degrades",
                self.shadow.len(),
                self.capacity
            );
        }
        let table = self.probe_table();
        queue.write_buffer(&self.key_buffer, 0, bytemuck::cast_slice(&table.keys));
        queue.write_buffer(&self.value_buffer, 0, bytemuck::cast_slice(&table.values));
    }

    pub fn key_buffer(&self) -> &wgpu::Buffer {
        &self.key_buffer
    }

    pub fn value_buffer(&self) -> &wgpu::Buffer {
        &self.value_buffer
    }
}
