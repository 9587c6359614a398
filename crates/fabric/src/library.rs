use std::collections::BTreeMap;

use crate::error::FabricError;
use crate::registry::{self, Template, Translucency};
use crate::template::Fabric;

/// Caller-owned named templates layered over the built-in registry.
///
/// Registered types resolve exactly like built-ins, so a fabric defined once
/// can be reused as the `type` of any number of sub-materials.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    custom: BTreeMap<String, Template>,
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, fabric: Fabric) -> Result<(), FabricError> {
        self.register_template(Template::new(name, fabric).with_translucency(Translucency::Opaque))
    }

    pub fn register_template(&mut self, mut template: Template) -> Result<(), FabricError> {
        let name = template.name.trim().to_string();
        if name.is_empty() {
            return Err(FabricError::Parse("template names must not be empty".to_string()));
        }
        if registry::builtin(&name).is_some() || self.custom.contains_key(&name) {
            return Err(FabricError::TemplateExists(name));
        }
        tracing::debug!(template = %name, "registered material template");
        template.name = name.clone();
        self.custom.insert(name, template);
        Ok(())
    }

    /// Custom templates first, then built-ins.
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.custom.get(name).or_else(|| registry::builtin(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Custom template names followed by built-in names.
    pub fn names(&self) -> Vec<&str> {
        self.custom
            .keys()
            .map(String::as_str)
            .chain(registry::builtin_names().map(|name| -> &str { name }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_custom_and_builtin_types() {
        let mut library = TemplateLibrary::new();
        library
            .register(
                "Tinted",
                Fabric::new()
                    .uniform("tint", [0.5f32, 0.5, 0.5])
                    .component("diffuse", "tint"),
            )
            .unwrap();

        assert!(library.contains("Tinted"));
        assert!(library.contains("Color"));
        assert!(!library.contains("Missing"));
        assert_eq!(library.names()[0], "Tinted");
    }

    #[test]
    fn names_list_custom_templates_before_builtins() {
        let mut library = TemplateLibrary::new();
        library.register("Moss", Fabric::of_type("Color")).unwrap();
        library.register("Bark", Fabric::of_type("Image")).unwrap();

        let names = library.names();
        assert_eq!(&names[..2], ["Bark", "Moss"]);
        assert_eq!(names.len(), 2 + registry::builtin_names().count());
        assert!(names.contains(&"Color"));
        assert!(names.contains(&"PolylineOutline"));
    }

    #[test]
    fn refuses_to_shadow_or_repeat() {
        let mut library = TemplateLibrary::new();
        let err = library.register("Color", Fabric::new()).unwrap_err();
        assert!(matches!(err, FabricError::TemplateExists(name) if name == "Color"));

        library.register("Mine", Fabric::new()).unwrap();
        assert!(library.register("Mine", Fabric::new()).is_err());
        assert!(library.register("  ", Fabric::new()).is_err());
    }
}
