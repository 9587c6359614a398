//! Declarative material descriptions ("fabrics") and their compilation into a
//! single shading-language function.
//!
//! The pipeline is `Fabric` → [`validate::resolve`] → [`compose::compose`]:
//! resolution merges registry defaults and checks structure, composition emits
//! the program text and the mangled uniform names a renderer binds.
pub mod compose;
mod error;
mod library;
pub mod registry;
pub mod scan;
mod template;
pub mod uniform;
pub mod validate;
mod value;

pub use compose::{compose, ComposedNode, ComposedUniform, ENTRY_POINT, SURFACE_PRELUDE};
pub use error::{DeclarationKind, FabricError};
pub use library::TemplateLibrary;
pub use registry::{Template, Translucency};
pub use template::{Component, Fabric};
pub use uniform::{
    infer, Codec, CompressedSet, CubeMapSource, ImageSource, InvalidShape, TypedValue,
    UniformType, CUBE_FACES,
};
pub use validate::{resolve, ResolvedNode};
pub use value::{FieldValue, ImageLocation, InMemoryImage, UniformValue, DEFAULT_CUBE_MAP, DEFAULT_IMAGE};
