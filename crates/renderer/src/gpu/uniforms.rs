use bytemuck::{Pod, Zeroable};
use fabric::UniformType;
use material::Binding;
use textures::TextureKind;

/// Per-frame values behind `fabric_frameNumber`, `fabric_time`, and
/// `fabric_resolution`. Layout must match `FrameParams` in `compile.rs`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct FrameUniforms {
    pub resolution: [f32; 4],
    pub time: f32,
    pub frame_number: f32,
    pub _padding: [f32; 2],
}

impl FrameUniforms {
    pub fn new(width: u32, height: u32, time: f32, frame_number: u32) -> Self {
        Self {
            resolution: [width as f32, height as f32, 0.0, 0.0],
            time,
            frame_number: frame_number as f32,
            _padding: [0.0; 2],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct UniformField {
    pub name: String,
    pub ty: UniformType,
    pub offset: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TextureField {
    pub name: String,
    pub kind: TextureKind,
}

/// Where each material binding lives on the GPU: plain values in one std140
/// block, textures as separate texture/sampler pairs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct MaterialLayout {
    fields: Vec<UniformField>,
    textures: Vec<TextureField>,
    size: u32,
}

impl MaterialLayout {
    pub fn from_bindings(bindings: &[Binding<'_>]) -> Self {
        let mut layout = Self::default();
        let mut cursor = 0u32;
        for binding in bindings {
            match binding.ty {
                UniformType::Sampler2d => layout.textures.push(TextureField {
                    name: binding.name.to_string(),
                    kind: TextureKind::D2,
                }),
                UniformType::SamplerCube => layout.textures.push(TextureField {
                    name: binding.name.to_string(),
                    kind: TextureKind::Cube,
                }),
                UniformType::Channels => {}
                ty => {
                    let (align, size) = std140(ty);
                    let offset = cursor.next_multiple_of(align);
                    layout.fields.push(UniformField {
                        name: binding.name.to_string(),
                        ty,
                        offset,
                    });
                    cursor = offset + size;
                }
            }
        }
        // an empty block still carries one float
        layout.size = cursor.max(4).next_multiple_of(16);
        layout
    }

    pub fn fields(&self) -> &[UniformField] {
        &self.fields
    }

    pub fn textures(&self) -> &[TextureField] {
        &self.textures
    }

    /// Size of the std140 block in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Writes the values of `bindings` at their offsets. Bindings that are not
    /// part of the layout are skipped.
    pub fn pack(&self, bindings: &[Binding<'_>]) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size as usize];
        for field in &self.fields {
            let Some(binding) = bindings.iter().find(|binding| binding.name == field.name) else {
                continue;
            };
            let Some(values) = binding.value.as_floats() else {
                continue;
            };
            let offset = field.offset as usize;
            match field.ty {
                UniformType::Bool => {
                    let flag: i32 = if values.first().copied().unwrap_or(0.0) != 0.0 { 1 } else { 0 };
                    bytes[offset..offset + 4].copy_from_slice(bytemuck::bytes_of(&flag));
                }
                UniformType::Mat3 => {
                    for (column, chunk) in values.chunks(3).enumerate() {
                        let start = offset + column * 16;
                        let data: &[u8] = bytemuck::cast_slice(chunk);
                        bytes[start..start + data.len()].copy_from_slice(data);
                    }
                }
                _ => {
                    let data: &[u8] = bytemuck::cast_slice(&values);
                    bytes[offset..offset + data.len()].copy_from_slice(data);
                }
            }
        }
        bytes
    }

    /// GLSL for the material block and texture bindings, each value exposed
    /// under its composed name through a macro.
    pub fn declarations(&self) -> String {
        let mut text = String::from("layout(std140, set = 1, binding = 0) uniform MaterialParams {\n");
        if self.fields.is_empty() {
            text.push_str("    float _unused;\n");
        }
        for field in &self.fields {
            let ty = match field.ty {
                UniformType::Bool => "int",
                ty => ty.glsl_name(),
            };
            text.push_str(&format!("    {ty} _{};\n", field.name));
        }
        text.push_str("} material_params;\n\n");

        for field in &self.fields {
            match field.ty {
                UniformType::Bool => text.push_str(&format!(
                    "#define {name} bool(material_params._{name})\n",
                    name = field.name
                )),
                _ => text.push_str(&format!(
                    "#define {name} material_params._{name}\n",
                    name = field.name
                )),
            }
        }

        for (index, texture) in self.textures.iter().enumerate() {
            let (texture_ty, sampler_ty) = match texture.kind {
                TextureKind::D2 => ("texture2D", "sampler2D"),
                TextureKind::Cube => ("textureCube", "samplerCube"),
            };
            let binding = texture_binding(index);
            text.push_str(&format!(
                "layout(set = 1, binding = {binding}) uniform {texture_ty} {name}_texture;\n\
                 layout(set = 1, binding = {sampler}) uniform sampler {name}_sampler;\n\
                 #define {name} {sampler_ty}({name}_texture, {name}_sampler)\n",
                sampler = binding + 1,
                name = texture.name,
            ));
        }
        text
    }
}

/// Binding of the `index`-th texture; its sampler follows it.
pub(crate) fn texture_binding(index: usize) -> u32 {
    1 + 2 * index as u32
}

/// Base alignment and size under std140.
fn std140(ty: UniformType) -> (u32, u32) {
    match ty {
        UniformType::Bool | UniformType::Float => (4, 4),
        UniformType::Vec2 => (8, 8),
        UniformType::Vec3 => (16, 12),
        UniformType::Vec4 => (16, 16),
        UniformType::Mat3 => (16, 48),
        UniformType::Mat4 => (16, 64),
        UniformType::Sampler2d | UniformType::SamplerCube | UniformType::Channels => (4, 0),
    }
}

#[cfg(test)]
mod tests {
    use fabric::Fabric;
    use material::{Material, MaterialOptions};
    use textures::TextureLoader;

    use super::*;

    fn material(fabric: Fabric) -> Material {
        Material::new(&fabric, MaterialOptions::default(), &TextureLoader::disabled()).unwrap()
    }

    fn floats(bytes: &[u8], offset: u32, count: usize) -> Vec<f32> {
        let start = offset as usize;
        bytes[start..start + count * 4]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    #[test]
    fn offsets_follow_std140() {
        let material = material(
            Fabric::new()
                .uniform("a", [1.0f32, 2.0, 3.0])
                .uniform("b", 4.0)
                .uniform("c", [5.0f32, 6.0])
                .uniform("d", vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
                .component("diffuse", "a * b + vec3(c, 0.0) + d[0]"),
        );
        let bindings = material.bindings();
        let layout = MaterialLayout::from_bindings(&bindings);
        let offsets: Vec<_> = layout
            .fields()
            .iter()
            .map(|field| (field.name.as_str(), field.offset))
            .collect();
        assert_eq!(offsets, vec![("a_r", 0), ("b_r", 12), ("c_r", 16), ("d_r", 32)]);
        assert_eq!(layout.size(), 80);

        let bytes = layout.pack(&bindings);
        assert_eq!(floats(&bytes, 0, 4), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(floats(&bytes, 16, 2), vec![5.0, 6.0]);
        assert_eq!(floats(&bytes, 32, 4), vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(floats(&bytes, 48, 2), vec![0.0, 1.0]);
    }

    #[test]
    fn bools_pack_as_ints() {
        let material = material(
            Fabric::new()
                .uniform("flag", true)
                .component("alpha", "float(flag)"),
        );
        let bindings = material.bindings();
        let layout = MaterialLayout::from_bindings(&bindings);
        let bytes = layout.pack(&bindings);
        assert_eq!(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 1);
        assert!(layout
            .declarations()
            .contains("#define flag_r bool(material_params._flag_r)"));
    }

    #[test]
    fn textures_get_paired_bindings() {
        let material = material(Fabric::of_type("Image"));
        let bindings = material.bindings();
        let layout = MaterialLayout::from_bindings(&bindings);
        assert_eq!(layout.textures().len(), 1);
        assert_eq!(layout.textures()[0].kind, TextureKind::D2);

        let declarations = layout.declarations();
        assert!(declarations.contains("layout(set = 1, binding = 1) uniform texture2D image_r_texture;"));
        assert!(declarations.contains("layout(set = 1, binding = 2) uniform sampler image_r_sampler;"));
        assert!(declarations.contains("#define image_r sampler2D(image_r_texture, image_r_sampler)"));
    }

    #[test]
    fn empty_layout_keeps_a_placeholder_field() {
        let layout = MaterialLayout::from_bindings(&[]);
        assert_eq!(layout.size(), 16);
        assert!(layout.declarations().contains("float _unused;"));
    }
}
