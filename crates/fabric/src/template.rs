//! Declarative fabric descriptions.
//!
//! Types:
//!
//! - `Fabric` is one node of a material tree: an optional registry `type`,
//!   uniform values, nested sub-materials, and either component expressions or
//!   a hand-written `source` body. Unrecognised keys are kept in `unknown` so
//!   strict validation can report them.
//! - `Component` enumerates the surface properties a component expression may
//!   assign.
//!
//! Functions:
//!
//! - `Fabric::from_json_str` / `Fabric::from_toml_str` parse descriptions;
//!   the builder methods (`with_type`, `uniform`, `material`, `component`,
//!   `with_source`) assemble the same structure in code.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FabricError;
use crate::value::UniformValue;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fabric {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub uniforms: BTreeMap<String, UniformValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub materials: BTreeMap<String, Fabric>,
    /// Component name and expression, in declaration order.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ordered_components"
    )]
    pub components: Option<Vec<(String, String)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

impl Fabric {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(name: impl Into<String>) -> Self {
        Self::default().with_type(name)
    }

    pub fn from_json_str(input: &str) -> Result<Self, FabricError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_toml_str(input: &str) -> Result<Self, FabricError> {
        Ok(toml::from_str(input)?)
    }

    pub fn to_json_string(&self) -> Result<String, FabricError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_type(mut self, name: impl Into<String>) -> Self {
        self.type_name = Some(name.into());
        self
    }

    pub fn uniform(mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> Self {
        self.uniforms.insert(name.into(), value.into());
        self
    }

    pub fn material(mut self, name: impl Into<String>, fabric: Fabric) -> Self {
        self.materials.insert(name.into(), fabric);
        self
    }

    /// Adds or replaces a component expression, keeping first-declaration
    /// order.
    pub fn component(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        let name = name.into();
        let expression = expression.into();
        let components = self.components.get_or_insert_with(Vec::new);
        match components.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = expression,
            None => components.push((name, expression)),
        }
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Surface properties assignable from component expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Diffuse,
    Specular,
    Shininess,
    Normal,
    Emission,
    Alpha,
    Ambient,
    SpecularColor,
}

impl Component {
    pub const ALL: [Component; 8] = [
        Component::Diffuse,
        Component::Specular,
        Component::Shininess,
        Component::Normal,
        Component::Emission,
        Component::Alpha,
        Component::Ambient,
        Component::SpecularColor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Component::Diffuse => "diffuse",
            Component::Specular => "specular",
            Component::Shininess => "shininess",
            Component::Normal => "normal",
            Component::Emission => "emission",
            Component::Alpha => "alpha",
            Component::Ambient => "ambient",
            Component::SpecularColor => "specularColor",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|component| component.name() == name)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

mod ordered_components {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<(String, String)>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(entries) => serializer.collect_map(entries.iter().map(|(k, v)| (k, v))),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<(String, String)>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ComponentsVisitor;

        impl<'de> Visitor<'de> for ComponentsVisitor {
            type Value = Option<Vec<(String, String)>>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of component names to expressions")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries: Vec<(String, String)> = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, String>()? {
                    match entries.iter_mut().find(|(existing, _)| *existing == key) {
                        Some(entry) => entry.1 = value,
                        None => entries.push((key, value)),
                    }
                }
                Ok(Some(entries))
            }
        }

        deserializer.deserialize_map(ComponentsVisitor)
    }
}
