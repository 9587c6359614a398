use fabric::{
    compose, infer, resolve, ComposedNode, Fabric, FabricError, TemplateLibrary, TypedValue,
    UniformType, UniformValue,
};
use textures::{TextureLoader, TextureRequest, TextureSlot, TextureState, TextureUploader};
use tracing::{debug, warn};

use crate::error::MaterialError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialOptions {
    /// Reject unknown fields, unused declarations, and dangling
    /// `name.component` accesses instead of tolerating them.
    pub strict: bool,
    /// Overrides the translucency hint of the material's types.
    pub translucent: Option<bool>,
}

impl MaterialOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            translucent: None,
        }
    }
}

/// One uniform as the renderer binds it.
#[derive(Debug, Clone, Copy)]
pub struct Binding<'a> {
    /// Identifier in the composed source.
    pub name: &'a str,
    /// Name as declared in the fabric.
    pub declared: &'a str,
    /// Path of the declaring material below the root.
    pub path: &'a [String],
    pub ty: UniformType,
    pub value: &'a TypedValue,
    /// Present for texture uniforms.
    pub texture: Option<&'a TextureState>,
}

#[derive(Debug)]
struct UniformSlot {
    name: String,
    mangled: Option<String>,
    value: TypedValue,
    texture: Option<TextureSlot>,
}

/// A composed material and the resources behind its uniforms.
///
/// The instance owns its sub-materials; `destroy` releases the textures of the
/// whole tree and may be called once.
#[derive(Debug)]
pub struct Material {
    type_name: Option<String>,
    path: Vec<String>,
    function: String,
    source: String,
    emitted: bool,
    uniforms: Vec<UniformSlot>,
    materials: Vec<(String, Material)>,
    translucent: bool,
    destroyed: bool,
    loader: TextureLoader,
}

impl Material {
    pub fn new(
        fabric: &Fabric,
        options: MaterialOptions,
        loader: &TextureLoader,
    ) -> Result<Self, MaterialError> {
        Self::with_library(fabric, &TemplateLibrary::new(), options, loader)
    }

    /// Like [`Material::new`], resolving `type` names against `library` before
    /// the built-in templates.
    pub fn with_library(
        fabric: &Fabric,
        library: &TemplateLibrary,
        options: MaterialOptions,
        loader: &TextureLoader,
    ) -> Result<Self, MaterialError> {
        let resolved = resolve(fabric, library, options.strict)?;
        let composed = compose(&resolved);
        let translucent = options
            .translucent
            .unwrap_or_else(|| composed.any_translucent());
        let material = Self::build(composed, loader, translucent);
        debug!(
            material = material.type_name().unwrap_or("<custom>"),
            strict = options.strict,
            translucent,
            bindings = material.bindings().len(),
            "material constructed"
        );
        Ok(material)
    }

    /// Builds a material of a registered type, overriding some of its uniform
    /// values.
    pub fn from_type<'a>(
        name: &str,
        overrides: impl IntoIterator<Item = (&'a str, UniformValue)>,
        loader: &TextureLoader,
    ) -> Result<Self, MaterialError> {
        Self::from_type_with_library(&TemplateLibrary::new(), name, overrides, loader)
    }

    pub fn from_type_with_library<'a>(
        library: &TemplateLibrary,
        name: &str,
        overrides: impl IntoIterator<Item = (&'a str, UniformValue)>,
        loader: &TextureLoader,
    ) -> Result<Self, MaterialError> {
        let declared = resolve(&Fabric::of_type(name), library, false)?;
        let mut fabric = Fabric::of_type(name);
        for (uniform, value) in overrides {
            if declared.uniform(uniform).is_none() {
                return Err(MaterialError::UnknownUniform(uniform.to_string()));
            }
            fabric.uniforms.insert(uniform.to_string(), value);
        }
        Self::with_library(&fabric, library, MaterialOptions::default(), loader)
    }

    fn build(node: ComposedNode, loader: &TextureLoader, translucent: bool) -> Self {
        let path_label = std::iter::once("root")
            .chain(node.path.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(".");

        let uniforms = node
            .uniforms
            .into_iter()
            .map(|uniform| {
                let texture = match (&uniform.mangled, TextureRequest::from_value(&uniform.value)) {
                    (Some(_), Some(request)) => {
                        let mut slot =
                            TextureSlot::new(format!("{path_label}.{}", uniform.name), request.kind());
                        slot.assign(loader, &request);
                        Some(slot)
                    }
                    _ => None,
                };
                UniformSlot {
                    name: uniform.name,
                    mangled: uniform.mangled,
                    value: uniform.value,
                    texture,
                }
            })
            .collect();

        let materials = node
            .materials
            .into_iter()
            .map(|(name, child)| {
                let translucent = child.any_translucent();
                (name, Self::build(child, loader, translucent))
            })
            .collect();

        Self {
            type_name: node.type_name,
            path: node.path,
            function: node.function,
            source: node.source,
            emitted: node.emitted,
            uniforms,
            materials,
            translucent,
            destroyed: false,
            loader: loader.clone(),
        }
    }

    /// The `type` this material was built from, if any.
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Composed source of this material and its sub-materials. Empty once
    /// destroyed, and for sub-materials left out of the program.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Name of the function [`Material::source`] defines last.
    pub fn function_name(&self) -> &str {
        &self.function
    }

    pub fn is_translucent(&self) -> bool {
        self.translucent
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// `false` once this material or any sub-material has been destroyed.
    pub fn is_intact(&self) -> bool {
        !self.destroyed && self.materials.iter().all(|(_, child)| child.is_intact())
    }

    pub fn uniform(&self, name: &str) -> Option<&TypedValue> {
        self.slot(name).map(|slot| &slot.value)
    }

    pub fn uniform_names(&self) -> impl Iterator<Item = &str> {
        self.uniforms.iter().map(|slot| slot.name.as_str())
    }

    pub fn texture_state(&self, name: &str) -> Option<&TextureState> {
        self.slot(name)?.texture.as_ref().map(TextureSlot::state)
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials
            .iter()
            .find(|(child, _)| child == name)
            .map(|(_, material)| material)
    }

    pub fn material_mut(&mut self, name: &str) -> Result<&mut Material, MaterialError> {
        self.ensure_alive()?;
        self.materials
            .iter_mut()
            .find(|(child, _)| child == name)
            .map(|(_, material)| material)
            .ok_or_else(|| MaterialError::UnknownMaterial(name.to_string()))
    }

    pub fn material_names(&self) -> impl Iterator<Item = &str> {
        self.materials.iter().map(|(name, _)| name.as_str())
    }

    /// Replaces a uniform value. The new value must infer to the declared
    /// type; texture values restart loading.
    pub fn set_uniform(
        &mut self,
        name: &str,
        value: impl Into<UniformValue>,
    ) -> Result<(), MaterialError> {
        self.ensure_alive()?;
        let path = self.path_string();
        let loader = self.loader.clone();
        let slot = self
            .uniforms
            .iter_mut()
            .find(|slot| slot.name == name)
            .ok_or_else(|| MaterialError::UnknownUniform(name.to_string()))?;

        let expected = slot.value.uniform_type();
        if expected == UniformType::Channels {
            return Err(MaterialError::FixedUniform(name.to_string()));
        }
        let typed = infer(&value.into()).map_err(|err| FabricError::InvalidUniformShape {
            path,
            name: name.to_string(),
            reason: err.0,
        })?;
        let typed = if typed.uniform_type() == expected {
            typed
        } else {
            typed
                .coerce_texture_kind(expected)
                .ok_or(MaterialError::UniformTypeMismatch {
                    name: name.to_string(),
                    expected,
                    found: typed.uniform_type(),
                })?
        };

        if let Some(texture) = slot.texture.as_mut() {
            if let Some(request) = TextureRequest::from_value(&typed) {
                texture.assign(&loader, &request);
            }
        }
        slot.value = typed;
        Ok(())
    }

    /// Applies finished texture loads across the tree. Returns how many
    /// texture slots changed state.
    pub fn poll(&mut self, uploader: &mut dyn TextureUploader) -> Result<usize, MaterialError> {
        self.ensure_alive()?;
        Ok(self.poll_tree(uploader))
    }

    fn poll_tree(&mut self, uploader: &mut dyn TextureUploader) -> usize {
        if self.destroyed {
            return 0;
        }
        let mut changed = 0;
        for (_, child) in &mut self.materials {
            changed += child.poll_tree(uploader);
        }
        for slot in &mut self.uniforms {
            if let Some(texture) = slot.texture.as_mut() {
                if texture.poll(uploader) {
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Texture slots of the tree still waiting for a load.
    pub fn pending_textures(&self) -> usize {
        let own = self
            .uniforms
            .iter()
            .filter(|slot| slot.texture.as_ref().is_some_and(TextureSlot::is_loading))
            .count();
        own + self
            .materials
            .iter()
            .map(|(_, child)| child.pending_textures())
            .sum::<usize>()
    }

    /// Uniforms the composed source declares, sub-materials first.
    /// Destroyed materials contribute nothing.
    pub fn bindings(&self) -> Vec<Binding<'_>> {
        let mut bindings = Vec::new();
        self.collect_bindings(&mut bindings);
        bindings
    }

    fn collect_bindings<'a>(&'a self, bindings: &mut Vec<Binding<'a>>) {
        if !self.emitted || self.destroyed {
            return;
        }
        for (_, child) in &self.materials {
            child.collect_bindings(bindings);
        }
        for slot in &self.uniforms {
            let Some(mangled) = &slot.mangled else {
                continue;
            };
            bindings.push(Binding {
                name: mangled,
                declared: &slot.name,
                path: &self.path,
                ty: slot.value.uniform_type(),
                value: &slot.value,
                texture: slot.texture.as_ref().map(TextureSlot::state),
            });
        }
    }

    /// Releases every texture of the tree and marks all descendants destroyed.
    pub fn destroy(&mut self) -> Result<(), MaterialError> {
        self.ensure_alive()?;
        self.release_tree();
        debug!(
            material = self.type_name().unwrap_or("<custom>"),
            "material destroyed"
        );
        Ok(())
    }

    fn release_tree(&mut self) {
        for (_, child) in &mut self.materials {
            if !child.destroyed {
                child.release_tree();
            }
        }
        for slot in &mut self.uniforms {
            if let Some(texture) = slot.texture.as_mut() {
                texture.release();
            }
        }
        self.source.clear();
        self.destroyed = true;
    }

    fn slot(&self, name: &str) -> Option<&UniformSlot> {
        self.uniforms.iter().find(|slot| slot.name == name)
    }

    fn ensure_alive(&self) -> Result<(), MaterialError> {
        if self.destroyed {
            Err(MaterialError::AlreadyDestroyed)
        } else {
            Ok(())
        }
    }

    fn path_string(&self) -> String {
        std::iter::once("root")
            .chain(self.path.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl Drop for Material {
    fn drop(&mut self) {
        if !self.destroyed && self.pending_textures() > 0 {
            warn!(
                material = self.type_name().unwrap_or("<custom>"),
                "material dropped while textures were loading"
            );
        }
    }
}
