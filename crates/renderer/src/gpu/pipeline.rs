use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use textures::TextureKind;

use crate::compile::{compile_fragment_shader, compile_vertex_shader};

use super::uniforms::{texture_binding, MaterialLayout};

/// Pieces shared by every material pipeline.
pub(crate) struct PipelineLayouts {
    pub frame_layout: wgpu::BindGroupLayout,
    pub vertex_module: wgpu::ShaderModule,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Result<Self> {
        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let vertex_module = compile_vertex_shader(device)?;

        Ok(Self {
            frame_layout,
            vertex_module,
        })
    }
}

/// Identifies a compiled program. The wrapped source already encodes the
/// binding layout, so materials with the same structure share one entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    wrapped_source: String,
    translucent: bool,
    target_format: wgpu::TextureFormat,
}

impl PipelineKey {
    pub fn new(wrapped_source: String, translucent: bool, target_format: wgpu::TextureFormat) -> Self {
        Self {
            wrapped_source,
            translucent,
            target_format,
        }
    }

    pub fn wrapped_source(&self) -> &str {
        &self.wrapped_source
    }
}

pub(crate) struct MaterialPipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub material_layout: wgpu::BindGroupLayout,
}

impl MaterialPipeline {
    pub fn new(
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        key: &PipelineKey,
        material_layout: &MaterialLayout,
    ) -> Result<Self> {
        let fragment_module = compile_fragment_shader(device, key.wrapped_source())
            .context("failed to compile material")?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material layout"),
            entries: &build_material_layout_entries(material_layout),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("material pipeline layout"),
            bind_group_layouts: &[&layouts.frame_layout, &bind_layout],
            push_constant_ranges: &[],
        });

        let blend = if key.translucent {
            Some(wgpu::BlendState::ALPHA_BLENDING)
        } else {
            Some(wgpu::BlendState::REPLACE)
        };

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("material pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &layouts.vertex_module,
                entry_point: Some("main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: key.target_format,
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            bail!("failed to build material pipeline: {error}");
        }

        Ok(Self {
            pipeline,
            material_layout: bind_layout,
        })
    }
}

pub(crate) fn build_material_layout_entries(layout: &MaterialLayout) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(1 + layout.textures().len() * 2);
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });
    for (index, texture) in layout.textures().iter().enumerate() {
        let dimension = match texture.kind {
            TextureKind::D2 => wgpu::TextureViewDimension::D2,
            TextureKind::Cube => wgpu::TextureViewDimension::Cube,
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: texture_binding(index),
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: dimension,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: texture_binding(index) + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

/// Compiled pipelines by key. Entries live as long as the renderer.
#[derive(Default)]
pub(crate) struct PipelineCache {
    entries: HashMap<PipelineKey, Arc<MaterialPipeline>>,
}

impl PipelineCache {
    pub fn get(&self, key: &PipelineKey) -> Option<Arc<MaterialPipeline>> {
        self.entries.get(key).cloned()
    }

    pub fn store(&mut self, key: PipelineKey, pipeline: Arc<MaterialPipeline>) {
        self.entries.insert(key, pipeline);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
