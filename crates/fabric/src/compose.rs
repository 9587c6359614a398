//! Shader source assembly.
//!
//! `compose` turns a [`ResolvedNode`] tree into one program fragment. Every
//! node becomes a function named after its path from the root, children are
//! emitted before their parent, uniform identifiers are mangled with the same
//! path so two children of one type never collide, and `child.property`
//! becomes `fabric_getMaterial<suffix>(materialInput).property`. The text
//! depends on structure only, never on uniform values.
//!
//! Renderers prepend [`SURFACE_PRELUDE`] and must also provide
//! `fabric_frameNumber` as a `float` expression for animated templates.
use std::collections::HashMap;

use tracing::debug;

use crate::scan::{self, Replacement};
use crate::uniform::TypedValue;
use crate::validate::{Body, ResolvedNode};

/// Name of the root material function.
pub const ENTRY_POINT: &str = "fabric_getMaterial";

/// Surface structures and the default material every composed program relies
/// on.
pub const SURFACE_PRELUDE: &str = r#"struct fabric_materialInput
{
    float s;
    vec2 st;
    vec3 str;
    vec3 normalEC;
    mat3 tangentToEyeMatrix;
    vec3 positionToEyeEC;
};

struct fabric_material
{
    vec3 diffuse;
    float specular;
    float shininess;
    vec3 normal;
    vec3 emission;
    float alpha;
    vec3 ambient;
    vec3 specularColor;
};

fabric_material fabric_getDefaultMaterial(fabric_materialInput materialInput)
{
    fabric_material material;
    material.diffuse = vec3(0.0);
    material.specular = 0.0;
    material.shininess = 1.0;
    material.normal = materialInput.normalEC;
    material.emission = vec3(0.0);
    material.alpha = 1.0;
    material.ambient = vec3(0.0);
    material.specularColor = vec3(1.0);
    return material;
}
"#;

#[derive(Debug, Clone, PartialEq)]
pub struct ComposedUniform {
    pub name: String,
    /// Shader identifier; `None` when the uniform is not part of the program
    /// (unreferenced, a channel selector, or inside an unreferenced material).
    pub mangled: Option<String>,
    pub value: TypedValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposedNode {
    pub path: Vec<String>,
    pub type_name: Option<String>,
    pub function: String,
    /// Part of the enclosing program.
    pub emitted: bool,
    /// Text of this node's subtree, children first. Empty when not emitted.
    pub source: String,
    pub uniforms: Vec<ComposedUniform>,
    pub materials: Vec<(String, ComposedNode)>,
    /// Translucency hint evaluated on the initial values.
    pub translucent: bool,
}

impl ComposedNode {
    /// Whether this node or any emitted descendant starts out translucent.
    pub fn any_translucent(&self) -> bool {
        self.translucent
            || self
                .materials
                .iter()
                .any(|(_, child)| child.emitted && child.any_translucent())
    }
}

/// Length-prefixed path segments, e.g. `3sub5inner`.
fn encode_path(path: &[String]) -> String {
    path.iter()
        .map(|segment| format!("{}{}", segment.len(), segment))
        .collect()
}

/// Function name for the node at `path`.
pub fn function_name(path: &[String]) -> String {
    if path.is_empty() {
        ENTRY_POINT.to_string()
    } else {
        format!("{ENTRY_POINT}_{}", encode_path(path))
    }
}

/// Shader identifier of uniform `name` declared at `path`.
pub fn mangle_uniform(name: &str, path: &[String]) -> String {
    format!("{name}_r{}", encode_path(path))
}

/// Composes the program for `root`.
pub fn compose(root: &ResolvedNode) -> ComposedNode {
    let composed = compose_node(root, true);
    debug!(
        bytes = composed.source.len(),
        materials = root.materials.len(),
        "composed material source"
    );
    composed
}

fn compose_node(node: &ResolvedNode, emitted: bool) -> ComposedNode {
    let function = function_name(&node.path);
    let materials: Vec<(String, ComposedNode)> = node
        .materials
        .iter()
        .map(|child| {
            (
                child.name.clone(),
                compose_node(&child.node, emitted && child.used),
            )
        })
        .collect();

    let uniforms: Vec<ComposedUniform> = node
        .uniforms
        .iter()
        .map(|uniform| {
            let bound = emitted && uniform.used && !matches!(uniform.value, TypedValue::Channels(_));
            ComposedUniform {
                name: uniform.name.clone(),
                mangled: bound.then(|| mangle_uniform(&uniform.name, &node.path)),
                value: uniform.value.clone(),
            }
        })
        .collect();

    let source = if emitted {
        let mut source: String = materials
            .iter()
            .map(|(_, child)| child.source.as_str())
            .collect();
        source.push_str(&node_text(node, &function, &uniforms, &materials));
        source
    } else {
        String::new()
    };

    ComposedNode {
        path: node.path.clone(),
        type_name: node.type_name.clone(),
        function,
        emitted,
        source,
        uniforms,
        materials,
        translucent: node.initially_translucent(),
    }
}

fn node_text(
    node: &ResolvedNode,
    function: &str,
    uniforms: &[ComposedUniform],
    materials: &[(String, ComposedNode)],
) -> String {
    let mut replacements: HashMap<String, Replacement> = HashMap::new();
    for (resolved, composed) in node.uniforms.iter().zip(uniforms) {
        if !resolved.used {
            continue;
        }
        let replacement = match (&composed.value, &composed.mangled) {
            (TypedValue::Channels(selector), _) => Replacement {
                text: selector.clone(),
                include_members: true,
            },
            (_, Some(mangled)) => Replacement {
                text: mangled.clone(),
                include_members: false,
            },
            (_, None) => continue,
        };
        replacements.insert(resolved.name.clone(), replacement);
    }
    for (name, child) in materials {
        if child.emitted {
            replacements.insert(
                name.clone(),
                Replacement {
                    text: format!("{}(materialInput)", child.function),
                    include_members: false,
                },
            );
        }
    }

    let mut text = String::new();
    for uniform in uniforms {
        if let Some(mangled) = &uniform.mangled {
            text.push_str(&format!(
                "uniform {} {};\n",
                uniform.value.uniform_type().glsl_name(),
                mangled
            ));
        }
    }

    match &node.body {
        Body::Source(source) => {
            if function != ENTRY_POINT {
                replacements.insert(
                    ENTRY_POINT.to_string(),
                    Replacement {
                        text: function.to_string(),
                        include_members: false,
                    },
                );
            }
            text.push_str(&scan::rewrite(source, &replacements));
            if !text.ends_with('\n') {
                text.push('\n');
            }
        }
        Body::Components(components) => {
            text.push_str(&format!(
                "fabric_material {function}(fabric_materialInput materialInput)\n{{\n    fabric_material material = fabric_getDefaultMaterial(materialInput);\n"
            ));
            for (component, expression) in components {
                text.push_str(&format!(
                    "    material.{} = {};\n",
                    component.name(),
                    scan::rewrite(expression, &replacements)
                ));
            }
            text.push_str("    return material;\n}\n");
        }
        Body::Default => {
            text.push_str(&format!(
                "fabric_material {function}(fabric_materialInput materialInput)\n{{\n    return fabric_getDefaultMaterial(materialInput);\n}}\n"
            ));
        }
    }
    text
}
