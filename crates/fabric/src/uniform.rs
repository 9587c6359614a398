//! Uniform shape inference.
//!
//! `infer` maps a loosely-typed [`UniformValue`] onto the closed
//! [`TypedValue`] set the composer and renderers understand. Inference is pure
//! and never starts a texture load.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::{FieldValue, ImageLocation, InMemoryImage, UniformValue, DEFAULT_CUBE_MAP, DEFAULT_IMAGE};

/// Cube-map face keys, in upload layer order.
pub const CUBE_FACES: [&str; 6] = [
    "positiveX",
    "negativeX",
    "positiveY",
    "negativeY",
    "positiveZ",
    "negativeZ",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UniformType {
    Bool,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Sampler2d,
    SamplerCube,
    /// Swizzle selector substituted into the source; never bound.
    Channels,
}

impl UniformType {
    pub fn glsl_name(self) -> &'static str {
        match self {
            UniformType::Bool => "bool",
            UniformType::Float => "float",
            UniformType::Vec2 => "vec2",
            UniformType::Vec3 => "vec3",
            UniformType::Vec4 => "vec4",
            UniformType::Mat3 => "mat3",
            UniformType::Mat4 => "mat4",
            UniformType::Sampler2d => "sampler2D",
            UniformType::SamplerCube => "samplerCube",
            UniformType::Channels => "channels",
        }
    }

    pub fn from_glsl_name(name: &str) -> Option<Self> {
        let ty = match name {
            "bool" => UniformType::Bool,
            "float" => UniformType::Float,
            "vec2" => UniformType::Vec2,
            "vec3" => UniformType::Vec3,
            "vec4" => UniformType::Vec4,
            "mat3" => UniformType::Mat3,
            "mat4" => UniformType::Mat4,
            "sampler2D" => UniformType::Sampler2d,
            "samplerCube" => UniformType::SamplerCube,
            _ => return None,
        };
        Some(ty)
    }

    pub fn is_texture(self) -> bool {
        matches!(self, UniformType::Sampler2d | UniformType::SamplerCube)
    }
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glsl_name())
    }
}

/// Compressed texture families a compressed set may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    S3tc,
    Etc1,
    Pvrtc,
}

impl Codec {
    /// Default preference order.
    pub const PREFERENCE: [Codec; 3] = [Codec::S3tc, Codec::Etc1, Codec::Pvrtc];

    pub fn key(self) -> &'static str {
        match self {
            Codec::S3tc => "s3tc",
            Codec::Etc1 => "etc1",
            Codec::Pvrtc => "pvrtc",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::PREFERENCE.into_iter().find(|codec| codec.key() == key)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Per-codec locations of one compressed image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressedSet {
    entries: BTreeMap<Codec, ImageLocation>,
}

impl CompressedSet {
    pub fn get(&self, codec: Codec) -> Option<&ImageLocation> {
        self.entries.get(&codec)
    }

    pub fn insert(&mut self, codec: Codec, location: ImageLocation) {
        self.entries.insert(codec, location);
    }

    pub fn codecs(&self) -> impl Iterator<Item = Codec> + '_ {
        self.entries.keys().copied()
    }

    /// First codec in `preference` that the set provides and `supported`
    /// accepts.
    pub fn select(
        &self,
        preference: &[Codec],
        supported: impl Fn(Codec) -> bool,
    ) -> Option<(Codec, &ImageLocation)> {
        preference
            .iter()
            .copied()
            .filter(|codec| supported(*codec))
            .find_map(|codec| self.entries.get(&codec).map(|location| (codec, location)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// The renderer's neutral 2D texture.
    Default,
    Location(ImageLocation),
    Decoded(InMemoryImage),
    Compressed(CompressedSet),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CubeMapSource {
    /// The renderer's neutral cube map.
    Default,
    /// Faces in [`CUBE_FACES`] order.
    Faces(Box<[ImageLocation; 6]>),
}

/// A uniform value after inference.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Bool(bool),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column-major.
    Mat3([f32; 9]),
    /// Column-major.
    Mat4([f32; 16]),
    Texture(ImageSource),
    CubeMap(CubeMapSource),
    Channels(String),
}

impl TypedValue {
    pub fn uniform_type(&self) -> UniformType {
        match self {
            TypedValue::Bool(_) => UniformType::Bool,
            TypedValue::Float(_) => UniformType::Float,
            TypedValue::Vec2(_) => UniformType::Vec2,
            TypedValue::Vec3(_) => UniformType::Vec3,
            TypedValue::Vec4(_) => UniformType::Vec4,
            TypedValue::Mat3(_) => UniformType::Mat3,
            TypedValue::Mat4(_) => UniformType::Mat4,
            TypedValue::Texture(_) => UniformType::Sampler2d,
            TypedValue::CubeMap(_) => UniformType::SamplerCube,
            TypedValue::Channels(_) => UniformType::Channels,
        }
    }

    /// Numeric components, `None` for textures and channel selectors.
    pub fn as_floats(&self) -> Option<Vec<f32>> {
        let values = match self {
            TypedValue::Bool(value) => vec![if *value { 1.0 } else { 0.0 }],
            TypedValue::Float(value) => vec![*value],
            TypedValue::Vec2(value) => value.to_vec(),
            TypedValue::Vec3(value) => value.to_vec(),
            TypedValue::Vec4(value) => value.to_vec(),
            TypedValue::Mat3(value) => value.to_vec(),
            TypedValue::Mat4(value) => value.to_vec(),
            TypedValue::Texture(_) | TypedValue::CubeMap(_) | TypedValue::Channels(_) => {
                return None
            }
        };
        Some(values)
    }

    /// Reinterprets the value under a type declared in raw source, when the
    /// two only differ in texture kind (`fabric_defaultImage` declared as a
    /// `samplerCube`, and the reverse).
    pub fn coerce_texture_kind(&self, declared: UniformType) -> Option<TypedValue> {
        match (self, declared) {
            (TypedValue::Texture(ImageSource::Default), UniformType::SamplerCube) => {
                Some(TypedValue::CubeMap(CubeMapSource::Default))
            }
            (TypedValue::CubeMap(CubeMapSource::Default), UniformType::Sampler2d) => {
                Some(TypedValue::Texture(ImageSource::Default))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvalidShape(pub String);

/// Infers the uniform type of `value`.
///
/// Plain strings of one to four `rgba` characters are channel selectors
/// before they are image URLs, so an image named `bar` must be written as
/// `./bar` or `bar.png`, or passed as an [`ImageLocation`], which always
/// infers a texture.
pub fn infer(value: &UniformValue) -> Result<TypedValue, InvalidShape> {
    match value {
        UniformValue::Bool(value) => Ok(TypedValue::Bool(*value)),
        UniformValue::Number(value) => Ok(TypedValue::Float(*value as f32)),
        UniformValue::Sequence(values) => infer_sequence(values),
        UniformValue::Text(text) => Ok(infer_text(text)),
        UniformValue::Location(location) => {
            Ok(TypedValue::Texture(ImageSource::Location(location.clone())))
        }
        UniformValue::Image(image) => Ok(TypedValue::Texture(ImageSource::Decoded(image.clone()))),
        UniformValue::Object(fields) => infer_object(fields),
    }
}

fn infer_sequence(values: &[f64]) -> Result<TypedValue, InvalidShape> {
    let floats: Vec<f32> = values.iter().map(|value| *value as f32).collect();
    let typed = match floats.len() {
        2 => TypedValue::Vec2([floats[0], floats[1]]),
        3 => TypedValue::Vec3([floats[0], floats[1], floats[2]]),
        4 => TypedValue::Vec4([floats[0], floats[1], floats[2], floats[3]]),
        9 => {
            let mut matrix = [0.0; 9];
            matrix.copy_from_slice(&floats);
            TypedValue::Mat3(matrix)
        }
        16 => {
            let mut matrix = [0.0; 16];
            matrix.copy_from_slice(&floats);
            TypedValue::Mat4(matrix)
        }
        len => {
            return Err(InvalidShape(format!(
                "numeric sequences must have 2, 3, 4, 9, or 16 entries, found {len}"
            )))
        }
    };
    Ok(typed)
}

fn infer_text(text: &str) -> TypedValue {
    if is_channel_selector(text) {
        TypedValue::Channels(text.to_string())
    } else if text == DEFAULT_CUBE_MAP {
        TypedValue::CubeMap(CubeMapSource::Default)
    } else if text == DEFAULT_IMAGE {
        TypedValue::Texture(ImageSource::Default)
    } else {
        TypedValue::Texture(ImageSource::Location(ImageLocation::new(text)))
    }
}

/// `true` for one to four characters out of `rgba`.
pub fn is_channel_selector(text: &str) -> bool {
    (1..=4).contains(&text.len()) && text.bytes().all(|b| matches!(b, b'r' | b'g' | b'b' | b'a'))
}

fn infer_object(fields: &BTreeMap<String, FieldValue>) -> Result<TypedValue, InvalidShape> {
    if fields.len() == CUBE_FACES.len() && CUBE_FACES.iter().all(|face| fields.contains_key(*face)) {
        let mut faces = Vec::with_capacity(6);
        for face in CUBE_FACES {
            match &fields[face] {
                FieldValue::Text(url) => faces.push(ImageLocation::new(url.clone())),
                FieldValue::Number(_) => {
                    return Err(InvalidShape(format!("cube-map face '{face}' must be a string")))
                }
            }
        }
        let faces: [ImageLocation; 6] = faces
            .try_into()
            .map_err(|_| InvalidShape("cube maps need six faces".to_string()))?;
        return Ok(TypedValue::CubeMap(CubeMapSource::Faces(Box::new(faces))));
    }

    if !fields.is_empty() && fields.keys().all(|key| Codec::from_key(key).is_some()) {
        let mut set = CompressedSet::default();
        for (key, field) in fields {
            let codec = Codec::from_key(key).ok_or_else(|| InvalidShape(format!("unknown codec '{key}'")))?;
            match field {
                FieldValue::Text(url) => set.insert(codec, ImageLocation::new(url.clone())),
                FieldValue::Number(_) => {
                    return Err(InvalidShape(format!("compressed entry '{key}' must be a string")))
                }
            }
        }
        return Ok(TypedValue::Texture(ImageSource::Compressed(set)));
    }

    let number = |key: &str| match fields.get(key) {
        Some(FieldValue::Number(value)) => Some(*value as f32),
        _ => None,
    };
    let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
    let typed = match keys.as_slice() {
        ["x", "y"] => number("x").zip(number("y")).map(|(x, y)| TypedValue::Vec2([x, y])),
        ["x", "y", "z"] => match (number("x"), number("y"), number("z")) {
            (Some(x), Some(y), Some(z)) => Some(TypedValue::Vec3([x, y, z])),
            _ => None,
        },
        ["w", "x", "y", "z"] => match (number("x"), number("y"), number("z"), number("w")) {
            (Some(x), Some(y), Some(z), Some(w)) => Some(TypedValue::Vec4([x, y, z, w])),
            _ => None,
        },
        ["alpha", "blue", "green", "red"] => {
            match (number("red"), number("green"), number("blue"), number("alpha")) {
                (Some(r), Some(g), Some(b), Some(a)) => Some(TypedValue::Vec4([r, g, b, a])),
                _ => None,
            }
        }
        _ => None,
    };
    typed.ok_or_else(|| {
        InvalidShape(format!(
            "object with fields [{}] is not a vector, color, cube map, or compressed set",
            keys.join(", ")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(len: usize) -> UniformValue {
        UniformValue::Sequence((0..len).map(|i| i as f64).collect())
    }

    #[test]
    fn infers_scalars_and_sequences() {
        assert_eq!(infer(&UniformValue::Bool(true)).unwrap(), TypedValue::Bool(true));
        assert_eq!(infer(&UniformValue::Number(0.5)).unwrap(), TypedValue::Float(0.5));
        assert_eq!(infer(&seq(2)).unwrap().uniform_type(), UniformType::Vec2);
        assert_eq!(infer(&seq(3)).unwrap().uniform_type(), UniformType::Vec3);
        assert_eq!(infer(&seq(4)).unwrap().uniform_type(), UniformType::Vec4);
        assert_eq!(infer(&seq(9)).unwrap().uniform_type(), UniformType::Mat3);
        assert_eq!(infer(&seq(16)).unwrap().uniform_type(), UniformType::Mat4);
    }

    #[test]
    fn rejects_unsupported_sequence_lengths() {
        for len in [0, 1, 5, 8, 10, 15, 17] {
            assert!(infer(&seq(len)).is_err(), "length {len} should be rejected");
        }
    }

    #[test]
    fn infers_strings() {
        assert_eq!(
            infer(&"rgb".into()).unwrap(),
            TypedValue::Channels("rgb".into())
        );
        assert_eq!(
            infer(&DEFAULT_CUBE_MAP.into()).unwrap(),
            TypedValue::CubeMap(CubeMapSource::Default)
        );
        assert_eq!(
            infer(&DEFAULT_IMAGE.into()).unwrap(),
            TypedValue::Texture(ImageSource::Default)
        );
        assert_eq!(
            infer(&"textures/brick.png".into()).unwrap().uniform_type(),
            UniformType::Sampler2d
        );
        // five characters is no longer a selector
        assert_eq!(
            infer(&"rgbar".into()).unwrap().uniform_type(),
            UniformType::Sampler2d
        );
    }

    #[test]
    fn selector_shaped_strings_win_over_image_names() {
        assert_eq!(infer(&"bar".into()).unwrap(), TypedValue::Channels("bar".into()));
        for name in ["./bar", "bar.png"] {
            assert_eq!(
                infer(&name.into()).unwrap(),
                TypedValue::Texture(ImageSource::Location(ImageLocation::new(name)))
            );
        }
        assert_eq!(
            infer(&ImageLocation::new("bar").into()).unwrap(),
            TypedValue::Texture(ImageSource::Location(ImageLocation::new("bar")))
        );
    }

    #[test]
    fn infers_objects() {
        assert_eq!(
            infer(&UniformValue::xy(1.0, 2.0)).unwrap(),
            TypedValue::Vec2([1.0, 2.0])
        );
        assert_eq!(
            infer(&UniformValue::xyz(1.0, 2.0, 3.0)).unwrap(),
            TypedValue::Vec3([1.0, 2.0, 3.0])
        );
        assert_eq!(
            infer(&UniformValue::color(0.0, 1.0, 0.0, 1.0)).unwrap(),
            TypedValue::Vec4([0.0, 1.0, 0.0, 1.0])
        );

        let cube = UniformValue::cube_map(["px", "nx", "py", "ny", "pz", "nz"]);
        match infer(&cube).unwrap() {
            TypedValue::CubeMap(CubeMapSource::Faces(faces)) => {
                assert_eq!(faces[0].url, "px");
                assert_eq!(faces[5].url, "nz");
            }
            other => panic!("unexpected {other:?}"),
        }

        let compressed = UniformValue::compressed([("etc1", "a.ktx"), ("s3tc", "b.ktx")]);
        match infer(&compressed).unwrap() {
            TypedValue::Texture(ImageSource::Compressed(set)) => {
                assert_eq!(set.codecs().collect::<Vec<_>>(), vec![Codec::S3tc, Codec::Etc1]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_partial_cube_maps_and_odd_objects() {
        let mut fields = BTreeMap::new();
        fields.insert("positiveX".to_string(), FieldValue::Text("px".into()));
        assert!(infer(&UniformValue::Object(fields)).is_err());

        let mut fields = BTreeMap::new();
        fields.insert("x".to_string(), FieldValue::Number(1.0));
        fields.insert("q".to_string(), FieldValue::Number(1.0));
        assert!(infer(&UniformValue::Object(fields)).is_err());
        assert!(infer(&UniformValue::Object(BTreeMap::new())).is_err());
    }

    #[test]
    fn compressed_selection_follows_preference() {
        let mut set = CompressedSet::default();
        set.insert(Codec::Pvrtc, ImageLocation::new("p.ktx"));
        set.insert(Codec::Etc1, ImageLocation::new("e.ktx"));

        let (codec, location) = set.select(&Codec::PREFERENCE, |_| true).unwrap();
        assert_eq!(codec, Codec::Etc1);
        assert_eq!(location.url, "e.ktx");

        let (codec, _) = set.select(&Codec::PREFERENCE, |c| c == Codec::Pvrtc).unwrap();
        assert_eq!(codec, Codec::Pvrtc);

        assert!(set.select(&Codec::PREFERENCE, |c| c == Codec::S3tc).is_none());
    }
}
