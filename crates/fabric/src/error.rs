use thiserror::Error;

/// Kind of declaration reported by [`FabricError::UnusedDeclaration`] and
/// [`FabricError::ReservedName`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Uniform,
    Material,
}

impl std::fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeclarationKind::Uniform => f.write_str("uniform"),
            DeclarationKind::Material => f.write_str("material"),
        }
    }
}

/// Structural errors raised while resolving, validating, or parsing a fabric.
///
/// Every variant that concerns a node carries its dotted path from the root
/// (`root`, `root.first`, `root.first.second`).
#[derive(Debug, Error)]
pub enum FabricError {
    #[error("{path}: {reason}")]
    ConflictingTemplate { path: String, reason: String },
    #[error("{path}: '{name}' is declared both as a uniform and as a material")]
    DuplicateName { path: String, name: String },
    #[error("{path}: {kind} '{name}' is declared but never referenced")]
    UnusedDeclaration {
        path: String,
        kind: DeclarationKind,
        name: String,
    },
    #[error("{path}: unknown material type '{name}'")]
    UnknownType { path: String, name: String },
    #[error("{path}: '{name}' is not a material component")]
    InvalidComponent { path: String, name: String },
    #[error("{path}: uniform '{name}' has an invalid shape: {reason}")]
    InvalidUniformShape {
        path: String,
        name: String,
        reason: String,
    },
    #[error("{path}: {kind} name '{name}' would produce a reserved GLSL identifier")]
    ReservedName {
        path: String,
        kind: DeclarationKind,
        name: String,
    },
    #[error("{path}: unknown fabric field '{field}'")]
    UnknownField { path: String, field: String },
    #[error("{path}: '{name}.{component}' does not refer to a declared material")]
    UnknownMaterialReference {
        path: String,
        name: String,
        component: String,
    },
    #[error("template '{0}' is already registered")]
    TemplateExists(String),
    #[error("failed to parse fabric: {0}")]
    Parse(String),
}

impl FabricError {
    /// Path of the node the error was raised for, when it concerns one.
    pub fn path(&self) -> Option<&str> {
        match self {
            FabricError::ConflictingTemplate { path, .. }
            | FabricError::DuplicateName { path, .. }
            | FabricError::UnusedDeclaration { path, .. }
            | FabricError::UnknownType { path, .. }
            | FabricError::InvalidComponent { path, .. }
            | FabricError::InvalidUniformShape { path, .. }
            | FabricError::ReservedName { path, .. }
            | FabricError::UnknownField { path, .. }
            | FabricError::UnknownMaterialReference { path, .. } => Some(path),
            FabricError::TemplateExists(_) | FabricError::Parse(_) => None,
        }
    }
}

impl From<serde_json::Error> for FabricError {
    fn from(err: serde_json::Error) -> Self {
        FabricError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for FabricError {
    fn from(err: toml::de::Error) -> Self {
        FabricError::Parse(err.to_string())
    }
}
