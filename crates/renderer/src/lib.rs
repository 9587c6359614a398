//! Headless `wgpu` renderer for loom materials.
//!
//! The crate turns a [`material::Material`] into pixels. The overall flow is:
//!
//! ```text
//!   Material::source() + Material::bindings()
//!          │
//!          ▼
//!   MaterialLayout ──▶ wrap_material_fragment() ──▶ naga GLSL ──▶ pipeline cache
//!          │                                                         │
//!          └─▶ std140 block + texture bindings ──▶ quad draw ◀───────┘
//!                                                      │
//!                                                      ▼
//!                                              readback RgbaImage
//! ```
//!
//! Composed material source uses loose `uniform` declarations; the wrapper
//! replaces them with a uniform block and separate texture/sampler bindings as
//! Vulkan GLSL requires, prepends the surface prelude, and appends a `main`
//! that evaluates the root material over the quad's UVs.

mod compile;
mod gpu;

pub use gpu::{HeadlessRenderer, RenderOptions, UploadedTexture, WgpuTextureUploader};
