use std::fmt;
use std::sync::Arc;

use crate::pipelines::PipelineManager;

/// Trajectory layers for an 8192x8192 output are bound as single storage
/// buffers.
pub const REQUIRED_STORAGE_BUFFER_BINDING_SIZE: u64 = 256 * 1024 * 1024;
pub const RECOMMENDED_TEXTURE_ARRAY_LAYERS: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    NoAdapter(String),
    RequestDevice(String),
    StorageBufferBindingTooSmall { required: u64, available: u64 },
}

impl fmt::Display for ContextError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::NoAdapter(message) => {
                write!(formatter, "no suitable GPU adapter found: {message}")
            }
            ContextError::RequestDevice(message) => {
                write!(formatter, "failed to request GPU device: {message}")
            }
            ContextError::StorageBufferBindingTooSmall {
                required,
                available,
            } => write!(
                formatter,
                "device max_storage_buffer_binding_size is {available} bytes, at least {required} bytes are required"
            ),
        }
    }
}

impl std::error::Error for ContextError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextDescriptor {
    pub power_preference: wgpu::PowerPreference,
    /// Skips the storage binding size requirement; used by tests on
    /// software adapters.
    pub relaxed_limits: bool,
}

/// Owns the device, its queue and every compiled compute pipeline. Nodes
/// borrow it for the duration of a graph run.
pub struct Context {
    adapter_info: wgpu::AdapterInfo,
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipelines: PipelineManager,
}

impl Context {
    pub fn new(descriptor: ContextDescriptor) -> Result<Self, ContextError> {
        pollster::block_on(Self::new_async(descriptor))
    }

    pub async fn new_async(descriptor: ContextDescriptor) -> Result<Self, ContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: descriptor.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|error| ContextError::NoAdapter(error.to_string()))?;
        let limits = adapter.limits();
        check_limits(&limits, descriptor.relaxed_limits)?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("gpu_runtime.device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|error| ContextError::RequestDevice(error.to_string()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "using adapter {} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.device_type,
            adapter_info.backend
        );
        Ok(Self::from_device(adapter_info, device, queue))
    }

    /// Wraps an existing device. Installs the fatal error callbacks and
    /// compiles all pipelines.
    pub fn from_device(
        adapter_info: wgpu::AdapterInfo,
        device: wgpu::Device,
        queue: wgpu::Queue,
    ) -> Self {
        install_error_callbacks(&device);
        let pipelines = PipelineManager::new(&device);
        Self {
            adapter_info,
            device,
            queue,
            pipelines,
        }
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn pipelines(&self) -> &PipelineManager {
        &self.pipelines
    }
}

pub fn check_limits(limits: &wgpu::Limits, relaxed: bool) -> Result<(), ContextError> {
    let available = u64::from(limits.max_storage_buffer_binding_size);
    if !relaxed && available < REQUIRED_STORAGE_BUFFER_BINDING_SIZE {
        return Err(ContextError::StorageBufferBindingTooSmall {
            required: REQUIRED_STORAGE_BUFFER_BINDING_SIZE,
            available,
        });
    }
    if limits.max_texture_array_layers < RECOMMENDED_TEXTURE_ARRAY_LAYERS {
        log::warn!(
            "device supports only {} texture array layers, tile stores are limited accordingly",
            limits.max_texture_array_layers
        );
    }
    Ok(())
}

fn install_error_callbacks(device: &wgpu::Device) {
    device.on_uncaptured_error(Arc::new(|error: wgpu::Error| {
        log::error!(target: "WebGPU", "uncaptured device error: {error}");
        std::process::abort();
    }));
    device.set_device_lost_callback(|reason, message| {
        if reason == wgpu::DeviceLostReason::Destroyed {
            log::debug!(target: "WebGPU", "device destroyed: {message}");
            return;
        }
        log::error!(target: "WebGPU", "device lost ({reason:?}): {message}");
        std::process::abort();
    });
}
