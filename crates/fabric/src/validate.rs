//! Resolution and validation of fabric trees.
//!
//! `resolve` walks a [`Fabric`] top-down. For each node it merges the
//! registry defaults of its `type`, checks the structural rules, infers every
//! uniform, and records which declarations the body actually references.
//! Structural impossibilities are rejected in both modes; unknown fields,
//! unused declarations, and dangling `name.component` accesses are rejected
//! only when `strict` is set.
use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{DeclarationKind, FabricError};
use crate::library::TemplateLibrary;
use crate::registry::Translucency;
use crate::scan;
use crate::template::{Component, Fabric};
use crate::uniform::{infer, TypedValue, UniformType};

/// Body of a resolved node.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Neither source nor components: the default surface.
    Default,
    Components(Vec<(Component, String)>),
    /// Hand-written source with declarations of declared uniforms removed.
    Source(String),
}

impl Body {
    /// Text scanned for references.
    pub fn text(&self) -> String {
        match self {
            Body::Default => String::new(),
            Body::Components(components) => components
                .iter()
                .map(|(_, expression)| expression.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            Body::Source(source) => source.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUniform {
    pub name: String,
    pub value: TypedValue,
    /// Referenced by the node body. Unused uniforms only survive in lenient
    /// mode and are left out of the emitted program.
    pub used: bool,
}

impl ResolvedUniform {
    pub fn uniform_type(&self) -> UniformType {
        self.value.uniform_type()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChild {
    pub name: String,
    pub node: ResolvedNode,
    pub used: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNode {
    /// Segments from the root; empty for the root itself.
    pub path: Vec<String>,
    pub type_name: Option<String>,
    pub uniforms: Vec<ResolvedUniform>,
    pub materials: Vec<ResolvedChild>,
    pub body: Body,
    pub translucency: Translucency,
}

impl ResolvedNode {
    /// Dotted path such as `root.first.second`.
    pub fn path_string(&self) -> String {
        dotted(&self.path)
    }

    pub fn uniform(&self, name: &str) -> Option<&ResolvedUniform> {
        self.uniforms.iter().find(|uniform| uniform.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&ResolvedChild> {
        self.materials.iter().find(|child| child.name == name)
    }

    /// Evaluates the translucency hint of this node on its initial values.
    pub fn initially_translucent(&self) -> bool {
        let values: BTreeMap<String, TypedValue> = self
            .uniforms
            .iter()
            .map(|uniform| (uniform.name.clone(), uniform.value.clone()))
            .collect();
        self.translucency.evaluate(&values)
    }
}

fn dotted(path: &[String]) -> String {
    std::iter::once("root")
        .chain(path.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(".")
}

/// Resolves and validates `fabric` against `library`.
pub fn resolve(
    fabric: &Fabric,
    library: &TemplateLibrary,
    strict: bool,
) -> Result<ResolvedNode, FabricError> {
    resolve_node(fabric, library, strict, Vec::new())
}

fn resolve_node(
    fabric: &Fabric,
    library: &TemplateLibrary,
    strict: bool,
    path: Vec<String>,
) -> Result<ResolvedNode, FabricError> {
    let path_text = dotted(&path);

    if let Some(field) = fabric.unknown.keys().next() {
        if strict {
            return Err(FabricError::UnknownField {
                path: path_text,
                field: field.clone(),
            });
        }
        debug!(path = %path_text, field = %field, "ignoring unknown fabric field");
    }

    let (merged, translucency) = expand_type(fabric, library, &path_text, &mut Vec::new())?;

    if merged.source.is_some() && merged.components.is_some() {
        return Err(FabricError::ConflictingTemplate {
            path: path_text,
            reason: "a material may define source or components, not both".to_string(),
        });
    }

    let components = match &merged.components {
        Some(entries) => {
            let mut components = Vec::with_capacity(entries.len());
            for (name, expression) in entries {
                let component =
                    Component::from_name(name).ok_or_else(|| FabricError::InvalidComponent {
                        path: path_text.clone(),
                        name: name.clone(),
                    })?;
                components.push((component, expression.clone()));
            }
            Some(components)
        }
        None => None,
    };

    if let Some(name) = merged
        .uniforms
        .keys()
        .find(|name| merged.materials.contains_key(*name))
    {
        return Err(FabricError::DuplicateName {
            path: path_text,
            name: name.clone(),
        });
    }

    // Mangling appends `_r`, so a trailing underscore becomes `__`.
    let reserved_uniform = merged
        .uniforms
        .keys()
        .find(|name| name.ends_with('_') || name.contains("__"))
        .map(|name| (DeclarationKind::Uniform, name));
    let reserved_material = merged
        .materials
        .keys()
        .find(|name| name.contains("__"))
        .map(|name| (DeclarationKind::Material, name));
    if let Some((kind, name)) = reserved_uniform.or(reserved_material) {
        return Err(FabricError::ReservedName {
            path: path_text,
            kind,
            name: name.clone(),
        });
    }

    let mut typed: Vec<(String, TypedValue)> = Vec::with_capacity(merged.uniforms.len());
    for (name, value) in &merged.uniforms {
        let value = infer(value).map_err(|err| FabricError::InvalidUniformShape {
            path: path_text.clone(),
            name: name.clone(),
            reason: err.0,
        })?;
        typed.push((name.clone(), value));
    }

    let body = match (&merged.source, components) {
        (Some(source), _) => Body::Source(strip_declarations(source, &mut typed, &path_text)),
        (None, Some(components)) => Body::Components(components),
        (None, None) => Body::Default,
    };
    let text = body.text();

    let mut uniforms = Vec::with_capacity(typed.len());
    for (name, value) in typed {
        let include_members = matches!(value, TypedValue::Channels(_));
        let used = scan::count_references(&text, &name, include_members) > 0;
        if !used {
            if strict {
                return Err(FabricError::UnusedDeclaration {
                    path: path_text,
                    kind: DeclarationKind::Uniform,
                    name,
                });
            }
            debug!(path = %path_text, uniform = %name, "uniform is never referenced; leaving it out of the program");
        }
        uniforms.push(ResolvedUniform { name, value, used });
    }

    let mut child_usage = Vec::with_capacity(merged.materials.len());
    for name in merged.materials.keys() {
        let used = scan::count_references(&text, name, false) > 0;
        if !used {
            if strict {
                return Err(FabricError::UnusedDeclaration {
                    path: path_text,
                    kind: DeclarationKind::Material,
                    name: name.clone(),
                });
            }
            debug!(path = %path_text, material = %name, "material is never referenced; leaving it out of the program");
        }
        child_usage.push(used);
    }

    if strict {
        if let Body::Components(components) = &body {
            for (_, expression) in components {
                for (base, member) in scan::member_accesses(expression) {
                    if Component::from_name(member).is_none()
                        || base == "material"
                        || base == "materialInput"
                        || merged.materials.contains_key(base)
                    {
                        continue;
                    }
                    return Err(FabricError::UnknownMaterialReference {
                        path: path_text,
                        name: base.to_string(),
                        component: member.to_string(),
                    });
                }
            }
        }
    }

    let mut materials = Vec::with_capacity(merged.materials.len());
    for ((name, child), used) in merged.materials.iter().zip(child_usage) {
        let mut child_path = path.clone();
        child_path.push(name.clone());
        let node = resolve_node(child, library, strict, child_path)?;
        materials.push(ResolvedChild {
            name: name.clone(),
            node,
            used,
        });
    }

    Ok(ResolvedNode {
        path,
        type_name: fabric.type_name.clone(),
        uniforms,
        materials,
        body,
        translucency,
    })
}

/// Merges the template chain of `fabric.type_name` under `fabric`.
fn expand_type(
    fabric: &Fabric,
    library: &TemplateLibrary,
    path: &str,
    chain: &mut Vec<String>,
) -> Result<(Fabric, Translucency), FabricError> {
    let Some(name) = &fabric.type_name else {
        return Ok((fabric.clone(), Translucency::Opaque));
    };
    if chain.contains(name) {
        return Err(FabricError::ConflictingTemplate {
            path: path.to_string(),
            reason: format!("type '{name}' refers to itself"),
        });
    }
    let template = library
        .get(name)
        .ok_or_else(|| FabricError::UnknownType {
            path: path.to_string(),
            name: name.clone(),
        })?;

    chain.push(name.clone());
    let (base, inherited) = expand_type(&template.fabric, library, path, chain)?;
    let merged = merge(fabric, &base, path, name)?;
    let translucency = match &template.translucency {
        Translucency::Opaque => inherited,
        own => own.clone(),
    };
    Ok((merged, translucency))
}

fn merge(user: &Fabric, base: &Fabric, path: &str, type_name: &str) -> Result<Fabric, FabricError> {
    if base.components.is_some() && user.components.is_some() {
        return Err(FabricError::ConflictingTemplate {
            path: path.to_string(),
            reason: format!("type '{type_name}' already defines components"),
        });
    }

    let mut merged = base.clone();
    merged.type_name = None;
    merged.unknown = user.unknown.clone();
    for (name, value) in &user.uniforms {
        merged.uniforms.insert(name.clone(), value.clone());
    }
    for (name, child) in &user.materials {
        merged.materials.insert(name.clone(), child.clone());
    }
    if user.components.is_some() {
        merged.components = user.components.clone();
    }
    if user.source.is_some() {
        merged.source = user.source.clone();
    }
    Ok(merged)
}

/// Removes `uniform <type> <name>;` declarations of declared uniforms from
/// raw source, using the declared type to settle the texture kind.
fn strip_declarations(source: &str, typed: &mut [(String, TypedValue)], path: &str) -> String {
    let mut spans = Vec::new();
    for declaration in scan::uniform_declarations(source) {
        let Some((name, value)) = typed.iter_mut().find(|(name, _)| name == declaration.name) else {
            continue;
        };
        spans.push(declaration.span.clone());

        let inferred = value.uniform_type();
        match UniformType::from_glsl_name(declaration.type_name) {
            Some(declared) if declared == inferred => {}
            Some(declared) => match value.coerce_texture_kind(declared) {
                Some(coerced) => *value = coerced,
                None => warn!(
                    path,
                    uniform = %name,
                    declared = declaration.type_name,
                    inferred = %inferred,
                    "declared uniform type differs from its value; keeping the inferred type"
                ),
            },
            None => warn!(
                path,
                uniform = %name,
                declared = declaration.type_name,
                "unrecognised uniform type in source declaration"
            ),
        }
    }
    scan::remove_spans(source, &spans)
}
