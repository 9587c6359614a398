//! Built-in material templates.
//!
//! The table is built on first use and never changes afterwards; callers that
//! need additional named types layer a [`crate::TemplateLibrary`] on top.
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::template::Fabric;
use crate::uniform::TypedValue;
use crate::value::{UniformValue, DEFAULT_IMAGE};

/// How a template decides whether it needs alpha blending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translucency {
    Opaque,
    Translucent,
    /// Translucent when any of the named uniforms carries alpha below one
    /// (the `w` of a `vec4`, or a `float` itself).
    AlphaOf(Vec<String>),
}

impl Translucency {
    fn alpha_of(names: &[&str]) -> Self {
        Translucency::AlphaOf(names.iter().map(|name| name.to_string()).collect())
    }

    pub fn evaluate(&self, uniforms: &BTreeMap<String, TypedValue>) -> bool {
        match self {
            Translucency::Opaque => false,
            Translucency::Translucent => true,
            Translucency::AlphaOf(names) => names.iter().any(|name| match uniforms.get(name) {
                Some(TypedValue::Vec4(value)) => value[3] < 1.0,
                Some(TypedValue::Float(value)) => *value < 1.0,
                _ => false,
            }),
        }
    }
}

/// A named fabric usable as a `type`.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    pub fabric: Fabric,
    pub translucency: Translucency,
}

impl Template {
    pub fn new(name: impl Into<String>, fabric: Fabric) -> Self {
        Self {
            name: name.into(),
            fabric,
            translucency: Translucency::Opaque,
        }
    }

    pub fn with_translucency(mut self, translucency: Translucency) -> Self {
        self.translucency = translucency;
        self
    }
}

static BUILTINS: OnceLock<BTreeMap<&'static str, Template>> = OnceLock::new();

fn builtins() -> &'static BTreeMap<&'static str, Template> {
    BUILTINS.get_or_init(|| {
        let mut table = BTreeMap::new();
        for (name, fabric, translucency) in builtin_templates() {
            table.insert(name, Template {
                name: name.to_string(),
                fabric,
                translucency,
            });
        }
        tracing::debug!(count = table.len(), "initialised built-in material templates");
        table
    })
}

/// Looks up a built-in template.
pub fn builtin(name: &str) -> Option<&'static Template> {
    builtins().get(name)
}

/// Names of every built-in template, sorted.
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    builtins().keys().copied()
}

fn texture_lookup(channel: &str) -> String {
    format!("texture(image, fract(repeat * materialInput.st)).{channel}")
}

fn image_map(channel_uniform: &str, default: &str, component: &str) -> Fabric {
    Fabric::new()
        .uniform("image", DEFAULT_IMAGE)
        .uniform(channel_uniform, default)
        .uniform("repeat", UniformValue::xy(1.0, 1.0))
        .component(component, texture_lookup(channel_uniform))
}

fn builtin_templates() -> Vec<(&'static str, Fabric, Translucency)> {
    vec![
        (
            "Color",
            Fabric::new()
                .uniform("color", [1.0f32, 0.0, 0.0, 0.5])
                .component("diffuse", "color.rgb")
                .component("alpha", "color.a"),
            Translucency::alpha_of(&["color"]),
        ),
        (
            "Image",
            Fabric::new()
                .uniform("image", DEFAULT_IMAGE)
                .uniform("repeat", UniformValue::xy(1.0, 1.0))
                .uniform("color", [1.0f32, 1.0, 1.0, 1.0])
                .component(
                    "diffuse",
                    "texture(image, fract(repeat * materialInput.st)).rgb * color.rgb",
                )
                .component(
                    "alpha",
                    "texture(image, fract(repeat * materialInput.st)).a * color.a",
                ),
            Translucency::alpha_of(&["color"]),
        ),
        (
            "DiffuseMap",
            image_map("channels", "rgb", "diffuse"),
            Translucency::Opaque,
        ),
        (
            "AlphaMap",
            image_map("channel", "a", "alpha"),
            Translucency::Translucent,
        ),
        (
            "SpecularMap",
            image_map("channel", "r", "specular"),
            Translucency::Opaque,
        ),
        (
            "EmissionMap",
            image_map("channels", "rgb", "emission"),
            Translucency::Opaque,
        ),
        (
            "BumpMap",
            Fabric::new()
                .uniform("image", DEFAULT_IMAGE)
                .uniform("channel", "r")
                .uniform("strength", 0.8)
                .uniform("repeat", UniformValue::xy(1.0, 1.0))
                .with_source(BUMP_MAP_SOURCE),
            Translucency::Opaque,
        ),
        (
            "NormalMap",
            Fabric::new()
                .uniform("image", DEFAULT_IMAGE)
                .uniform("channels", "rgb")
                .uniform("strength", 0.8)
                .uniform("repeat", UniformValue::xy(1.0, 1.0))
                .with_source(NORMAL_MAP_SOURCE),
            Translucency::Opaque,
        ),
        (
            "Grid",
            Fabric::new()
                .uniform("color", [0.0f32, 1.0, 0.0, 1.0])
                .uniform("cellAlpha", 0.1)
                .uniform("lineCount", UniformValue::xy(8.0, 8.0))
                .uniform("lineThickness", UniformValue::xy(1.0, 1.0))
                .uniform("lineOffset", UniformValue::xy(0.0, 0.0))
                .with_source(GRID_SOURCE),
            Translucency::alpha_of(&["color", "cellAlpha"]),
        ),
        (
            "Stripe",
            Fabric::new()
                .uniform("horizontal", true)
                .uniform("evenColor", [1.0f32, 1.0, 1.0, 0.5])
                .uniform("oddColor", [0.0f32, 0.0, 1.0, 0.5])
                .uniform("offset", 0.0)
                .uniform("repeat", 5.0)
                .with_source(STRIPE_SOURCE),
            Translucency::alpha_of(&["evenColor", "oddColor"]),
        ),
        (
            "Checkerboard",
            Fabric::new()
                .uniform("lightColor", [1.0f32, 1.0, 1.0, 0.5])
                .uniform("darkColor", [0.0f32, 0.0, 0.0, 0.5])
                .uniform("repeat", UniformValue::xy(5.0, 5.0))
                .with_source(CHECKERBOARD_SOURCE),
            Translucency::alpha_of(&["lightColor", "darkColor"]),
        ),
        (
            "Dot",
            Fabric::new()
                .uniform("lightColor", [1.0f32, 1.0, 0.0, 0.75])
                .uniform("darkColor", [0.0f32, 1.0, 1.0, 0.75])
                .uniform("repeat", UniformValue::xy(5.0, 5.0))
                .with_source(DOT_SOURCE),
            Translucency::alpha_of(&["lightColor", "darkColor"]),
        ),
        (
            "Water",
            Fabric::new()
                .uniform("baseWaterColor", [0.2f32, 0.3, 0.6, 1.0])
                .uniform("blendColor", [0.0f32, 1.0, 0.699, 1.0])
                .uniform("specularMap", DEFAULT_IMAGE)
                .uniform("normalMap", DEFAULT_IMAGE)
                .uniform("frequency", 10.0)
                .uniform("animationSpeed", 0.01)
                .uniform("amplitude", 1.0)
                .uniform("specularIntensity", 0.5)
                .uniform("fadeFactor", 1.0)
                .with_source(WATER_SOURCE),
            Translucency::alpha_of(&["baseWaterColor", "blendColor"]),
        ),
        (
            "RimLighting",
            Fabric::new()
                .uniform("color", [1.0f32, 0.0, 0.0, 0.7])
                .uniform("rimColor", [1.0f32, 1.0, 1.0, 0.4])
                .uniform("width", 0.3)
                .with_source(RIM_LIGHTING_SOURCE),
            Translucency::alpha_of(&["color", "rimColor"]),
        ),
        (
            "Fade",
            Fabric::new()
                .uniform("fadeInColor", [1.0f32, 0.0, 0.0, 1.0])
                .uniform("fadeOutColor", [0.0f32, 0.0, 0.0, 0.0])
                .uniform("maximumDistance", 0.5)
                .uniform("repeat", true)
                .uniform("fadeDirection", UniformValue::xy(1.0, 1.0))
                .uniform("time", UniformValue::xy(0.5, 0.5))
                .with_source(FADE_SOURCE),
            Translucency::alpha_of(&["fadeInColor", "fadeOutColor"]),
        ),
        (
            "PolylineArrow",
            Fabric::new()
                .uniform("color", [1.0f32, 1.0, 1.0, 1.0])
                .with_source(POLYLINE_ARROW_SOURCE),
            Translucency::Translucent,
        ),
        (
            "PolylineDash",
            Fabric::new()
                .uniform("color", [1.0f32, 1.0, 0.0, 1.0])
                .uniform("gapColor", [0.0f32, 0.0, 0.0, 0.0])
                .uniform("dashLength", 16.0)
                .uniform("dashPattern", 255.0)
                .with_source(POLYLINE_DASH_SOURCE),
            Translucency::alpha_of(&["color", "gapColor"]),
        ),
        (
            "PolylineGlow",
            Fabric::new()
                .uniform("color", [0.0f32, 0.5, 1.0, 1.0])
                .uniform("glowPower", 0.25)
                .uniform("taperPower", 1.0)
                .with_source(POLYLINE_GLOW_SOURCE),
            Translucency::Translucent,
        ),
        (
            "PolylineOutline",
            Fabric::new()
                .uniform("color", [1.0f32, 1.0, 1.0, 1.0])
                .uniform("outlineColor", [1.0f32, 0.0, 0.0, 1.0])
                .uniform("outlineWidth", 1.0)
                .with_source(POLYLINE_OUTLINE_SOURCE),
            Translucency::alpha_of(&["color", "outlineColor"]),
        ),
    ]
}

const BUMP_MAP_SOURCE: &str = r#"fabric_material fabric_getMaterial(fabric_materialInput materialInput)
{
    fabric_material material = fabric_getDefaultMaterial(materialInput);
    vec2 st = materialInput.st;
    float delta = 1.0 / 256.0;
    float centerBump = texture(image, fract(repeat * st)).channel;
    float rightBump = texture(image, fract(repeat * (st + vec2(delta, 0.0)))).channel;
    float topBump = texture(image, fract(repeat * (st + vec2(0.0, delta)))).channel;
    vec3 normalTangentSpace = normalize(vec3(centerBump - rightBump, centerBump - topBump, clamp(1.0 - strength, 0.1, 1.0)));
    material.normal = normalize(materialInput.tangentToEyeMatrix * normalTangentSpace);
    material.diffuse = vec3(0.01);
    return material;
}
"#;

const NORMAL_MAP_SOURCE: &str = r#"fabric_material fabric_getMaterial(fabric_materialInput materialInput)
{
    fabric_material material = fabric_getDefaultMaterial(materialInput);
    vec4 texel = texture(image, fract(repeat * materialInput.st));
    vec3 normalTangentSpace = texel.channels;
    normalTangentSpace.xy = normalTangentSpace.xy * 2.0 - 1.0;
    normalTangentSpace.z = clamp(1.0 - strength, 0.1, 1.0);
    normalTangentSpace = normalize(normalTangentSpace);
    material.normal = normalize(materialInput.tangentToEyeMatrix * normalTangentSpace);
    return material;
}
"#;

const GRID_SOURCE: &str = r#"fabric_material fabric_getMaterial(fabric_materialInput materialInput)
{
    fabric_material material = fabric_getDefaultMaterial(materialInput);
    vec2 st = materialInput.st;
    vec2 cell = fract(lineCount * st - lineOffset);
    vec2 distanceToLine = abs(cell - floor(cell + 0.5));
    vec2 threshold = lineThickness * 0.02;
    float onLine = max(1.0 - step(threshold.x, distanceToLine.x), 1.0 - step(threshold.y, distanceToLine.y));
    material.diffuse = color.rgb;
    material.alpha = color.a * mix(cellAlpha, 1.0, onLine);
    return material;
}
"#;

const STRIPE_SOURCE: &str = r#"fabric_material fabric_getMaterial(fabric_materialInput materialInput)
{
    fabric_material material = fabric_getDefaultMaterial(materialInput);
    float coord = mix(materialInput.st.s, materialInput.st.t, float(horizontal));
    float value = fract((coord - offset) * (repeat * 0.5));
    vec4 currentColor = mix(evenColor, oddColor, step(0.5, value));
    material.diffuse = currentColor.rgb;
    material.alpha = currentColor.a;
    return material;
}
"#;

const CHECKERBOARD_SOURCE: &str = r#"fabric_material fabric_getMaterial(fabric_materialInput materialInput)
{
    fabric_material material = fabric_getDefaultMaterial(materialInput);
    vec2 st = materialInput.st;
    float b = mod(floor(repeat.s * st.s) + floor(repeat.t * st.t), 2.0);
    vec4 currentColor = mix(lightColor, darkColor, b);
    material.diffuse = currentColor.rgb;
    material.alpha = currentColor.a;
    return material;
}
"#;

const DOT_SOURCE: &str = r#"fabric_material fabric_getMaterial(fabric_materialInput materialInput)
{
    fabric_material material = fabric_getDefaultMaterial(materialInput);
    float b = smoothstep(0.3, 0.32, length(fract(repeat * materialInput.st) - 0.5));
    vec4 currentColor = mix(lightColor, darkColor, b);
    material.diffuse = currentColor.rgb;
    material.alpha = currentColor.a;
    return material;
}
"#;

const WATER_SOURCE: &str = r#"fabric_material fabric_getMaterial(fabric_materialInput materialInput)
{
    fabric_material material = fabric_getDefaultMaterial(materialInput);
    float waveTime = fabric_frameNumber * animationSpeed;
    float fade = max(1.0, length(materialInput.positionToEyeEC) * fadeFactor);
    float specularMapValue = texture(specularMap, materialInput.st).r;
    vec2 waveSt = materialInput.st * frequency + vec2(sin(waveTime), cos(waveTime)) * 0.1;
    vec3 normalTangentSpace = texture(normalMap, fract(waveSt)).rgb * 2.0 - 1.0;
    normalTangentSpace.xy *= amplitude / fade;
    normalTangentSpace = mix(vec3(0.0, 0.0, 50.0), normalTangentSpace, specularMapValue);
    normalTangentSpace = normalize(normalTangentSpace);
    float perturbation = clamp(dot(normalTangentSpace, vec3(0.0, 0.0, 1.0)), 0.0, 1.0);
    material.alpha = mix(blendColor.a, baseWaterColor.a, specularMapValue) * specularMapValue;
    material.diffuse = mix(blendColor.rgb, baseWaterColor.rgb, specularMapValue) + 0.1 * perturbation;
    material.normal = normalize(materialInput.tangentToEyeMatrix * normalTangentSpace);
    material.specular = specularIntensity;
    material.shininess = 10.0;
    return material;
}
"#;

const RIM_LIGHTING_SOURCE: &str = r#"fabric_material fabric_getMaterial(fabric_materialInput materialInput)
{
    fabric_material material = fabric_getDefaultMaterial(materialInput);
    float d = 1.0 - dot(materialInput.normalEC, normalize(materialInput.positionToEyeEC));
    float rim = smoothstep(1.0 - width, 1.0, d);
    material.diffuse = color.rgb;
    material.emission = rimColor.rgb * rim;
    material.alpha = mix(color.a, rimColor.a, rim);
    return material;
}
"#;

const FADE_SOURCE: &str = r#"fabric_material fabric_getMaterial(fabric_materialInput materialInput)
{
    fabric_material material = fabric_getDefaultMaterial(materialInput);
    vec2 st = materialInput.st;
    vec2 dist = abs(time - st);
    if (repeat) {
        dist = min(dist, min(abs(time - (st + 1.0)), abs(time - (st - 1.0))));
    }
    vec2 fadeAmount = clamp(dist / maximumDistance, 0.0, 1.0) * fadeDirection;
    vec4 currentColor = mix(fadeInColor, fadeOutColor, clamp(length(fadeAmount), 0.0, 1.0));
    material.diffuse = currentColor.rgb;
    material.alpha = currentColor.a;
    return material;
}
"#;

const POLYLINE_ARROW_SOURCE: &str = r#"fabric_material fabric_getMaterial(fabric_materialInput materialInput)
{
    fabric_material material = fabric_getDefaultMaterial(materialInput);
    vec2 st = materialInput.st;
    float across = abs(st.t - 0.5);
    float shaft = step(across, 0.15) * step(st.s, 0.75);
    float head = step(0.75, st.s) * step(across, (1.0 - st.s) * 2.0);
    material.diffuse = color.rgb;
    material.alpha = color.a * max(shaft, head);
    return material;
}
"#;

const POLYLINE_DASH_SOURCE: &str = r#"fabric_material fabric_getMaterial(fabric_materialInput materialInput)
{
    fabric_material material = fabric_getDefaultMaterial(materialInput);
    float dashPosition = fract(materialInput.s * 256.0 / dashLength);
    float maskIndex = floor(dashPosition * 16.0);
    float maskTest = floor(dashPattern / pow(2.0, maskIndex));
    vec4 currentColor = mod(maskTest, 2.0) < 1.0 ? gapColor : color;
    material.diffuse = currentColor.rgb;
    material.alpha = currentColor.a;
    return material;
}
"#;

const POLYLINE_GLOW_SOURCE: &str = r#"fabric_material fabric_getMaterial(fabric_materialInput materialInput)
{
    fabric_material material = fabric_getDefaultMaterial(materialInput);
    vec2 st = materialInput.st;
    float glow = glowPower / max(abs(st.t - 0.5), 0.0001) - (glowPower / 0.5);
    if (taperPower <= 0.99999) {
        glow *= min(1.0, taperPower / max(0.5 - st.s * 0.5, 0.0001) - (taperPower / 0.5));
    }
    material.diffuse = max(vec3(glow - 1.0) + color.rgb, color.rgb);
    material.alpha = clamp(glow, 0.0, 1.0) * color.a;
    return material;
}
"#;

const POLYLINE_OUTLINE_SOURCE: &str = r#"fabric_material fabric_getMaterial(fabric_materialInput materialInput)
{
    fabric_material material = fabric_getDefaultMaterial(materialInput);
    float halfInteriorWidth = 0.5 * (1.0 - clamp(outlineWidth * 0.1, 0.0, 1.0));
    float inside = step(0.5 - halfInteriorWidth, materialInput.st.t) * step(materialInput.st.t, 0.5 + halfInteriorWidth);
    vec4 currentColor = mix(outlineColor, color, inside);
    material.diffuse = currentColor.rgb;
    material.alpha = currentColor.a;
    return material;
}
"#;
