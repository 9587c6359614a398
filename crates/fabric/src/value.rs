//! Loosely-typed uniform literals as they appear in a fabric description.
//!
//! `UniformValue` is what callers hand in (from JSON, TOML, or code); the
//! closed `TypedValue` produced by `uniform::infer` is what the rest of the
//! engine works with.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of the neutral 2D texture every renderer provides.
pub const DEFAULT_IMAGE: &str = "fabric_defaultImage";
/// Identifier of the neutral cube map every renderer provides.
pub const DEFAULT_CUBE_MAP: &str = "fabric_defaultCubeMap";

/// A uniform value before shape inference.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Number(f64),
    Sequence(Vec<f64>),
    Text(String),
    Object(BTreeMap<String, FieldValue>),
    Location(ImageLocation),
    Image(InMemoryImage),
}

/// Field of an object-shaped uniform value (`{x, y}`, cube-map faces,
/// compressed sets).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

/// A fetchable image: a URL or path plus optional request headers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageLocation {
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

impl ImageLocation {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn is_remote(&self) -> bool {
        self.url.starts_with("http://") || self.url.starts_with("https://")
    }
}

impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Already-decoded RGBA8 pixels, rows bottom to top.
#[derive(Clone, PartialEq)]
pub struct InMemoryImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

impl InMemoryImage {
    /// Returns `None` when `pixels` does not hold exactly `width * height`
    /// RGBA texels.
    pub fn new(width: u32, height: u32, pixels: impl Into<Arc<[u8]>>) -> Option<Self> {
        let pixels = pixels.into();
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        if width == 0 || height == 0 || pixels.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Option<Self> {
        let count = (width as usize).checked_mul(height as usize)?;
        let pixels: Vec<u8> = rgba.iter().copied().cycle().take(count * 4).collect();
        Self::new(width, height, pixels)
    }
}

impl fmt::Debug for InMemoryImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl UniformValue {
    /// `{x, y}` object.
    pub fn xy(x: f64, y: f64) -> Self {
        Self::object([("x", x), ("y", y)])
    }

    /// `{x, y, z}` object.
    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self::object([("x", x), ("y", y), ("z", z)])
    }

    /// `{red, green, blue, alpha}` object.
    pub fn color(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        Self::object([
            ("red", red),
            ("green", green),
            ("blue", blue),
            ("alpha", alpha),
        ])
    }

    /// Six-face cube map; faces in the order `+X, -X, +Y, -Y, +Z, -Z`.
    pub fn cube_map<S: Into<String>>(faces: [S; 6]) -> Self {
        let names = crate::uniform::CUBE_FACES;
        Self::Object(
            names
                .iter()
                .zip(faces)
                .map(|(name, url)| (name.to_string(), FieldValue::Text(url.into())))
                .collect(),
        )
    }

    /// Compressed set keyed by codec name (`s3tc`, `etc1`, `pvrtc`).
    pub fn compressed<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::Object(
            entries
                .into_iter()
                .map(|(codec, url)| (codec.to_string(), FieldValue::Text(url.to_string())))
                .collect(),
        )
    }

    fn object<const N: usize>(fields: [(&str, f64); N]) -> Self {
        Self::Object(
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), FieldValue::Number(value)))
                .collect(),
        )
    }
}

impl From<bool> for UniformValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for UniformValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        Self::Number(value as f64)
    }
}

impl<const N: usize> From<[f32; N]> for UniformValue {
    fn from(value: [f32; N]) -> Self {
        Self::Sequence(value.iter().map(|v| *v as f64).collect())
    }
}

impl<const N: usize> From<[f64; N]> for UniformValue {
    fn from(value: [f64; N]) -> Self {
        Self::Sequence(value.to_vec())
    }
}

impl From<Vec<f64>> for UniformValue {
    fn from(value: Vec<f64>) -> Self {
        Self::Sequence(value)
    }
}

impl From<&str> for UniformValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for UniformValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<ImageLocation> for UniformValue {
    fn from(value: ImageLocation) -> Self {
        Self::Location(value)
    }
}

impl From<InMemoryImage> for UniformValue {
    fn from(value: InMemoryImage) -> Self {
        Self::Image(value)
    }
}

impl Serialize for UniformValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            UniformValue::Bool(value) => serializer.serialize_bool(*value),
            UniformValue::Number(value) => serializer.serialize_f64(*value),
            UniformValue::Sequence(values) => serializer.collect_seq(values),
            UniformValue::Text(value) => serializer.serialize_str(value),
            UniformValue::Object(fields) => serializer.collect_map(fields),
            UniformValue::Location(location) => serializer.serialize_str(&location.url),
            UniformValue::Image(_) => Err(serde::ser::Error::custom(
                "in-memory images cannot be serialized",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for UniformValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct UniformVisitor;

        impl<'de> Visitor<'de> for UniformVisitor {
            type Value = UniformValue;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a boolean, number, numeric array, string, or object")
            }

            fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(UniformValue::Bool(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(UniformValue::Number(value as f64))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(UniformValue::Number(value as f64))
            }

            fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(UniformValue::Number(value))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(UniformValue::Text(value.to_string()))
            }

            fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(UniformValue::Text(value))
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Err(E::custom("uniform values must not be null"))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut values = Vec::with_capacity(seq.size_hint().unwrap_or(4));
                while let Some(value) = seq.next_element::<f64>()? {
                    values.push(value);
                }
                Ok(UniformValue::Sequence(values))
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut fields = BTreeMap::new();
                while let Some((key, value)) = map.next_entry::<String, FieldValue>()? {
                    fields.insert(key, value);
                }
                Ok(UniformValue::Object(fields))
            }
        }

        deserializer.deserialize_any(UniformVisitor)
    }
}
