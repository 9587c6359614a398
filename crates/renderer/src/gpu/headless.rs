use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use image::RgbaImage;
use material::Material;
use textures::{CodecSet, TextureState};
use tracing::{debug, warn};
use wgpu::util::DeviceExt;

use crate::compile::wrap_material_fragment;

use super::context::GpuContext;
use super::pipeline::{MaterialPipeline, PipelineCache, PipelineKey, PipelineLayouts};
use super::upload::{Placeholders, UploadedTexture, WgpuTextureUploader};
use super::uniforms::{texture_binding, FrameUniforms, MaterialLayout};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// One offscreen frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    /// Clear colour behind the material, straight RGBA.
    pub background: [u8; 4],
    pub time: f32,
    pub frame_number: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            background: [0, 0, 255, 255],
            time: 0.0,
            frame_number: 0,
        }
    }
}

/// Renders materials onto a full-target quad without a window.
pub struct HeadlessRenderer {
    context: GpuContext,
    layouts: PipelineLayouts,
    cache: PipelineCache,
    placeholders: Placeholders,
}

impl HeadlessRenderer {
    /// Fails when no adapter is available.
    pub fn new() -> Result<Self> {
        let context = GpuContext::new()?;
        let layouts = PipelineLayouts::new(&context.device)?;
        let placeholders = Placeholders::new(&context.device, &context.queue);
        debug!(adapter = %context.adapter_name, "headless renderer ready");
        Ok(Self {
            context,
            layouts,
            cache: PipelineCache::default(),
            placeholders,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.context.adapter_name
    }

    /// Compressed texture families this device samples, for the texture
    /// loader's codec probe.
    pub fn codecs(&self) -> CodecSet {
        self.context.codecs.clone()
    }

    /// An uploader targeting this renderer's device, to pass to
    /// [`Material::poll`].
    pub fn uploader(&self) -> WgpuTextureUploader {
        WgpuTextureUploader::new(self.context.device.clone(), self.context.queue.clone())
    }

    /// Number of distinct compiled programs.
    pub fn cached_pipelines(&self) -> usize {
        self.cache.len()
    }

    /// Draws `material` over `options.background` and reads the result back.
    /// Textures that are not ready bind a white placeholder.
    pub fn render(&mut self, material: &Material, options: &RenderOptions) -> Result<RgbaImage> {
        if material.is_destroyed() {
            bail!("cannot render a destroyed material");
        }
        if !material.is_intact() {
            bail!("cannot render a material with a destroyed sub-material");
        }
        if options.width == 0 || options.height == 0 {
            bail!("render target must not be empty, got {}x{}", options.width, options.height);
        }
        let max_edge = self.context.device.limits().max_texture_dimension_2d;
        if options.width > max_edge || options.height > max_edge {
            bail!(
                "render target {}x{} exceeds the device limit of {max_edge} pixels per edge",
                options.width,
                options.height
            );
        }

        let bindings = material.bindings();
        let layout = MaterialLayout::from_bindings(&bindings);
        let wrapped = wrap_material_fragment(material.source(), &layout);
        let key = PipelineKey::new(wrapped, material.is_translucent(), TARGET_FORMAT);
        let pipeline = self.pipeline(key, &layout)?;

        let device = &self.context.device;
        let frame = FrameUniforms::new(options.width, options.height, options.time, options.frame_number);
        let frame_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("frame uniforms"),
            contents: bytemuck::bytes_of(&frame),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let material_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("material uniforms"),
            contents: &layout.pack(&bindings),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let frame_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame bind group"),
            layout: &self.layouts.frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        let mut views = Vec::with_capacity(layout.textures().len());
        for texture in layout.textures() {
            let state = bindings
                .iter()
                .find(|binding| binding.name == texture.name)
                .and_then(|binding| binding.texture);
            let uploaded = match state {
                Some(TextureState::Ready(gpu)) => {
                    let uploaded = gpu.resource::<UploadedTexture>();
                    if uploaded.is_none() {
                        warn!(uniform = %texture.name, "texture was uploaded elsewhere; using placeholder");
                    }
                    uploaded.filter(|_| gpu.kind() == texture.kind)
                }
                _ => None,
            };
            views.push(match uploaded {
                Some(uploaded) => &uploaded.view,
                None => self.placeholders.view(texture.kind),
            });
        }

        let mut entries = Vec::with_capacity(1 + views.len() * 2);
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: material_buffer.as_entire_binding(),
        });
        for (index, view) in views.iter().copied().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: texture_binding(index),
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: texture_binding(index) + 1,
                resource: wgpu::BindingResource::Sampler(&self.placeholders.sampler),
            });
        }
        let material_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("material bind group"),
            layout: &pipeline.material_layout,
            entries: &entries,
        });

        let extent = wgpu::Extent3d {
            width: options.width,
            height: options.height,
            depth_or_array_layers: 1,
        };
        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("render target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let unpadded_row = options
            .width
            .checked_mul(4)
            .ok_or_else(|| anyhow!("render target width {} overflows a row", options.width))?;
        let padded_row = unpadded_row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: u64::from(padded_row) * u64::from(options.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let [r, g, b, a] = options.background.map(|channel| f64::from(channel) / 255.0);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("material render"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("material pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&pipeline.pipeline);
            pass.set_bind_group(0, &frame_group, &[]);
            pass.set_bind_group(1, &material_group, &[]);
            pass.draw(0..3, 0..1);
        }
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(options.height),
                },
            },
            extent,
        );
        self.context.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| anyhow!("failed waiting for the GPU: {err}"))?;
        receiver
            .recv()
            .context("readback callback never ran")?
            .map_err(|err| anyhow!("failed to map readback buffer: {err}"))?;

        let mut pixels = Vec::with_capacity(unpadded_row as usize * options.height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded_row as usize) {
                pixels.extend_from_slice(&row[..unpadded_row as usize]);
            }
        }
        readback.unmap();

        RgbaImage::from_raw(options.width, options.height, pixels)
            .ok_or_else(|| anyhow!("readback produced a short image"))
    }

    fn pipeline(&mut self, key: PipelineKey, layout: &MaterialLayout) -> Result<Arc<MaterialPipeline>> {
        if let Some(pipeline) = self.cache.get(&key) {
            return Ok(pipeline);
        }
        let pipeline = Arc::new(MaterialPipeline::new(
            &self.context.device,
            &self.layouts,
            &key,
            layout,
        )?);
        debug!(cached = self.cache.len() + 1, "compiled material pipeline");
        self.cache.store(key, Arc::clone(&pipeline));
        Ok(pipeline)
    }
}
