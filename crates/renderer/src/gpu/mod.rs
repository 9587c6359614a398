//! Offscreen GPU rendering of composed materials.
//!
//! - `context` owns the wgpu instance, adapter, and device, and probes the
//!   compressed texture families the device can sample.
//! - `uniforms` lays material bindings out as one std140 block plus
//!   texture/sampler pairs, and packs values into it every frame.
//! - `upload` uploads decoded textures and keeps the white placeholders
//!   bound while a material texture is not ready.
//! - `pipeline` compiles wrapped GLSL into render pipelines, cached by program.
//! - `headless` glues everything together behind `HeadlessRenderer`.

mod context;
mod headless;
mod pipeline;
mod uniforms;
mod upload;

pub use headless::{HeadlessRenderer, RenderOptions};
pub use upload::{UploadedTexture, WgpuTextureUploader};
pub(crate) use uniforms::MaterialLayout;
