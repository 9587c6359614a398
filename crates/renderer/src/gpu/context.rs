use anyhow::{Context as AnyhowContext, Result};
use fabric::Codec;
use textures::CodecSet;

/// Device and queue for offscreen rendering. No surface is involved, so the
/// adapter is picked on power preference alone.
pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
    pub codecs: CodecSet,
}

impl GpuContext {
    pub(crate) fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let info = adapter.get_info();
        let available = adapter.features();
        let required_features = available & compression_features();
        tracing::debug!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            compression = ?required_features,
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("loom device"),
            required_features,
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        Ok(Self {
            _instance: instance,
            device,
            queue,
            adapter_name: info.name,
            codecs: codec_set(required_features),
        })
    }
}

fn compression_features() -> wgpu::Features {
    wgpu::Features::TEXTURE_COMPRESSION_BC | wgpu::Features::TEXTURE_COMPRESSION_ETC2
}

/// Compressed families the device can sample. ETC1 data is valid ETC2 RGB8,
/// PVRTC has no `wgpu` format at all.
pub(crate) fn codec_set(features: wgpu::Features) -> CodecSet {
    let mut codecs = Vec::new();
    if features.contains(wgpu::Features::TEXTURE_COMPRESSION_BC) {
        codecs.push(Codec::S3tc);
    }
    if features.contains(wgpu::Features::TEXTURE_COMPRESSION_ETC2) {
        codecs.push(Codec::Etc1);
    }
    CodecSet::from_codecs(codecs)
}
