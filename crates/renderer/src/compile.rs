use std::borrow::Cow;
use std::collections::HashSet;

use anyhow::{bail, Result};
use fabric::{scan, ENTRY_POINT, SURFACE_PRELUDE};
use wgpu::naga::ShaderStage;

use crate::gpu::MaterialLayout;

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    compile_checked(
        device,
        "fullscreen triangle vertex",
        VERTEX_SHADER_GLSL.to_string(),
        ShaderStage::Vertex,
    )
}

/// Compiles an already wrapped material fragment shader, turning validation
/// failures into errors instead of device-lost panics.
pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
    wrapped: &str,
) -> Result<wgpu::ShaderModule> {
    compile_checked(device, "material fragment", wrapped.to_string(), ShaderStage::Fragment)
}

fn compile_checked(
    device: &wgpu::Device,
    label: &str,
    source: String,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source),
            stage,
            defines: &[],
        },
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        bail!("failed to compile {label}: {error}");
    }
    Ok(module)
}

/// Produces a self-contained GLSL fragment shader from composed material
/// source.
///
/// Steps performed:
///
/// 1. Strip the `uniform <type> <name>;` declarations of every bound uniform,
///    since Vulkan GLSL has no loose uniforms.
/// 2. Prepend [`HEADER`], the material block and texture bindings from
///    `layout`, and the surface prelude.
/// 3. Append a `main` that builds the material input from the quad's UVs,
///    calls the root material function, and writes `diffuse + emission` with
///    the material's alpha.
pub(crate) fn wrap_material_fragment(source: &str, layout: &MaterialLayout) -> String {
    let bound: HashSet<&str> = layout
        .fields()
        .iter()
        .map(|field| field.name.as_str())
        .chain(layout.textures().iter().map(|texture| texture.name.as_str()))
        .collect();
    let spans: Vec<_> = scan::uniform_declarations(source)
        .into_iter()
        .filter(|declaration| bound.contains(declaration.name))
        .map(|declaration| declaration.span)
        .collect();
    let body = scan::remove_spans(source, &spans);

    format!(
        "{HEADER}\n{declarations}\n{SURFACE_PRELUDE}\n{body}\n{footer}",
        declarations = layout.declarations(),
        footer = footer(),
    )
}

fn footer() -> String {
    format!(
        r"void main() {{
    fabric_materialInput materialInput;
    materialInput.s = v_uv.x;
    materialInput.st = v_uv;
    materialInput.str = vec3(v_uv, 0.0);
    materialInput.normalEC = vec3(0.0, 0.0, 1.0);
    materialInput.tangentToEyeMatrix = mat3(1.0);
    materialInput.positionToEyeEC = vec3(0.0, 0.0, 1.0);

    fabric_material material = {ENTRY_POINT}(materialInput);
    outColor = vec4(material.diffuse + material.emission, material.alpha);
}}
"
    )
}

/// GLSL prologue injected ahead of every material.
///
/// The frame block layout must match `FrameUniforms` in `gpu/uniforms.rs`.
const HEADER: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform FrameParams {
    vec4 _resolution;
    float _time;
    float _frameNumber;
    vec2 _padding;
} frame;

#define fabric_resolution frame._resolution.xy
#define fabric_time frame._time
#define fabric_frameNumber frame._frameNumber
";

/// Minimal full-screen triangle vertex shader.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";
