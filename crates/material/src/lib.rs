//! Material instances built from fabrics.
//!
//! A [`Material`] validates and composes its fabric once, keeps one typed slot
//! per uniform, and drives the texture loads behind image-shaped values. The
//! owning thread calls [`Material::poll`] each frame, then hands
//! [`Material::source`] and [`Material::bindings`] to a renderer.
mod error;
mod instance;

pub use error::MaterialError;
pub use instance::{Binding, Material, MaterialOptions};
