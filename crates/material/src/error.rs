use fabric::{FabricError, UniformType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaterialError {
    #[error(transparent)]
    Fabric(#[from] FabricError),

    #[error("material has already been destroyed")]
    AlreadyDestroyed,

    #[error("material declares no uniform named '{0}'")]
    UnknownUniform(String),

    #[error("material declares no sub-material named '{0}'")]
    UnknownMaterial(String),

    #[error("uniform '{name}' is a {expected}, the new value is a {found}")]
    UniformTypeMismatch {
        name: String,
        expected: UniformType,
        found: UniformType,
    },

    #[error("uniform '{0}' selects channels and is fixed once the material is built")]
    FixedUniform(String),
}
