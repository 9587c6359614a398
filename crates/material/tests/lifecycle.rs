use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fabric::{registry, Fabric, FabricError, UniformValue};
use image::{Rgba, RgbaImage};
use material::{Material, MaterialError, MaterialOptions};
use tempfile::tempdir;
use textures::{
    CodecSet, DecodedTexture, DefaultFetcher, GpuTexture, LoaderConfig, TextureError,
    TextureLoader, TextureState, TextureUploader,
};

struct Live(Arc<AtomicUsize>);

impl Drop for Live {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CountingUploader {
    live: Arc<AtomicUsize>,
}

impl TextureUploader for CountingUploader {
    fn upload(&mut self, _label: &str, texture: &DecodedTexture) -> Result<GpuTexture, TextureError> {
        self.live.fetch_add(1, Ordering::SeqCst);
        let (width, height) = texture.dimensions();
        Ok(GpuTexture::new(
            texture.kind(),
            width,
            height,
            Live(Arc::clone(&self.live)),
        ))
    }
}

fn disk_loader(dir: &std::path::Path) -> TextureLoader {
    let fetcher = DefaultFetcher::new(dir, Duration::from_secs(5)).unwrap();
    TextureLoader::new(
        Arc::new(fetcher),
        Arc::new(CodecSet::none()),
        LoaderConfig::default(),
    )
}

fn write_png(dir: &std::path::Path, name: &str) {
    RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]))
        .save(dir.join(name))
        .unwrap();
}

fn poll_until_settled(material: &mut Material, uploader: &mut CountingUploader) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while material.pending_textures() > 0 && Instant::now() < deadline {
        material.poll(uploader).unwrap();
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn url_texture_loads_from_disk() {
    let dir = tempdir().unwrap();
    write_png(dir.path(), "brick.png");
    let loader = disk_loader(dir.path());
    let mut uploader = CountingUploader::default();

    let mut material =
        Material::from_type("Image", [("image", UniformValue::from("brick.png"))], &loader)
            .unwrap();
    assert!(matches!(
        material.texture_state("image"),
        Some(TextureState::Loading)
    ));
    poll_until_settled(&mut material, &mut uploader);

    let state = material.texture_state("image").unwrap();
    assert_eq!(state.texture().unwrap().dimensions(), (4, 4));
    let binding = material
        .bindings()
        .into_iter()
        .find(|binding| binding.declared == "image")
        .unwrap();
    assert_eq!(binding.name, "image_r");
    assert!(matches!(binding.texture, Some(TextureState::Ready(_))));

    material.destroy().unwrap();
    assert_eq!(uploader.live.load(Ordering::SeqCst), 0);
}

#[test]
fn missing_file_fails_without_aborting() {
    let dir = tempdir().unwrap();
    let loader = disk_loader(dir.path());
    let mut uploader = CountingUploader::default();

    let mut material =
        Material::from_type("Image", [("image", UniformValue::from("absent.png"))], &loader)
            .unwrap();
    poll_until_settled(&mut material, &mut uploader);
    assert!(matches!(
        material.texture_state("image"),
        Some(TextureState::Failed(TextureError::Fetch(_)))
    ));
}

#[test]
fn destroying_before_ready_leaves_nothing_alive() {
    let dir = tempdir().unwrap();
    write_png(dir.path(), "late.png");
    let loader = disk_loader(dir.path());
    let mut uploader = CountingUploader::default();

    let mut material =
        Material::from_type("Image", [("image", UniformValue::from("late.png"))], &loader)
            .unwrap();
    material.destroy().unwrap();
    assert!(matches!(
        material.texture_state("image"),
        Some(TextureState::Unset)
    ));
    assert!(matches!(
        material.poll(&mut uploader),
        Err(MaterialError::AlreadyDestroyed)
    ));

    thread::sleep(Duration::from_millis(100));
    assert_eq!(uploader.live.load(Ordering::SeqCst), 0);
}

#[test]
fn nested_textures_load_and_release_with_the_root() {
    let dir = tempdir().unwrap();
    write_png(dir.path(), "a.png");
    write_png(dir.path(), "b.png");
    let loader = disk_loader(dir.path());
    let mut uploader = CountingUploader::default();

    let fabric = Fabric::new()
        .material(
            "base",
            Fabric::of_type("DiffuseMap").uniform("image", "a.png"),
        )
        .material(
            "mask",
            Fabric::new()
                .material("inner", Fabric::of_type("AlphaMap").uniform("image", "b.png"))
                .component("alpha", "inner.alpha"),
        )
        .component("diffuse", "base.diffuse")
        .component("alpha", "mask.alpha");
    let mut material = Material::new(&fabric, MaterialOptions::strict(), &loader).unwrap();
    assert!(material.is_translucent());
    assert_eq!(material.pending_textures(), 2);

    poll_until_settled(&mut material, &mut uploader);
    assert_eq!(uploader.live.load(Ordering::SeqCst), 2);
    let names: Vec<_> = material
        .bindings()
        .iter()
        .map(|binding| binding.name.to_string())
        .collect();
    assert!(names.contains(&"image_r4base".to_string()));
    assert!(names.contains(&"image_r4mask5inner".to_string()));

    material.destroy().unwrap();
    assert_eq!(uploader.live.load(Ordering::SeqCst), 0);
    let inner = material.material("mask").unwrap().material("inner").unwrap();
    assert!(inner.is_destroyed());
}

#[test]
fn reassigning_a_texture_restarts_loading() {
    let dir = tempdir().unwrap();
    write_png(dir.path(), "first.png");
    RgbaImage::from_pixel(2, 8, Rgba([0, 0, 0, 255]))
        .save(dir.path().join("second.png"))
        .unwrap();
    let loader = disk_loader(dir.path());
    let mut uploader = CountingUploader::default();

    let mut material =
        Material::from_type("Image", [("image", UniformValue::from("first.png"))], &loader)
            .unwrap();
    poll_until_settled(&mut material, &mut uploader);

    material.set_uniform("image", "second.png").unwrap();
    assert!(matches!(
        material.texture_state("image"),
        Some(TextureState::Loading)
    ));
    assert_eq!(uploader.live.load(Ordering::SeqCst), 0);
    poll_until_settled(&mut material, &mut uploader);
    let texture = material.texture_state("image").unwrap().texture().unwrap();
    assert_eq!(texture.dimensions(), (2, 8));
}

#[test]
fn every_builtin_builds_strictly() {
    let loader = TextureLoader::disabled();
    for name in registry::builtin_names() {
        let fabric = Fabric::of_type(name);
        let material = Material::new(&fabric, MaterialOptions::strict(), &loader)
            .unwrap_or_else(|err| panic!("{name}: {err}"));
        assert_eq!(material.type_name(), Some(name));
        assert!(material.source().contains("fabric_getMaterial("), "{name}");
    }
}

#[test]
fn strict_rejections_and_lenient_acceptance() {
    let loader = TextureLoader::disabled();

    let conflicting = Fabric::new()
        .component("diffuse", "vec3(1.0)")
        .with_source("fabric_material fabric_getMaterial(fabric_materialInput materialInput) { return fabric_getDefaultMaterial(materialInput); }");
    for options in [MaterialOptions::default(), MaterialOptions::strict()] {
        assert!(matches!(
            Material::new(&conflicting, options, &loader),
            Err(MaterialError::Fabric(FabricError::ConflictingTemplate { .. }))
        ));
    }

    let duplicate = Fabric::new()
        .uniform("shared", 1.0)
        .material("shared", Fabric::of_type("Color"))
        .component("diffuse", "shared.diffuse");
    assert!(matches!(
        Material::new(&duplicate, MaterialOptions::default(), &loader),
        Err(MaterialError::Fabric(FabricError::DuplicateName { .. }))
    ));

    let unused_material = Fabric::new()
        .material("spare", Fabric::of_type("Color"))
        .component("diffuse", "vec3(0.5)");
    let unused_channels = Fabric::new()
        .uniform("image", fabric::DEFAULT_IMAGE)
        .uniform("channels", "rgb")
        .component("diffuse", "texture(image, materialInput.st).rgb");
    for fabric in [&unused_material, &unused_channels] {
        assert!(matches!(
            Material::new(fabric, MaterialOptions::strict(), &loader),
            Err(MaterialError::Fabric(FabricError::UnusedDeclaration { .. }))
        ));
        assert!(Material::new(fabric, MaterialOptions::default(), &loader).is_ok());
    }

    let lenient = Material::new(&unused_material, MaterialOptions::default(), &loader).unwrap();
    assert!(!lenient.source().contains("_5spare"));
    assert!(lenient.material("spare").is_some());
    assert!(!lenient.is_translucent());
}

#[test]
fn sequence_lengths_pick_types() {
    let loader = TextureLoader::disabled();
    let fabric = |value: Vec<f64>| {
        Fabric::new()
            .uniform("value", value)
            .component("diffuse", "vec3(value[0])")
    };

    let vec4 = Material::new(&fabric(vec![0.0; 4]), MaterialOptions::default(), &loader).unwrap();
    assert_eq!(vec4.bindings()[0].ty, fabric::UniformType::Vec4);
    let mat4 = Material::new(&fabric(vec![0.0; 16]), MaterialOptions::default(), &loader).unwrap();
    assert_eq!(mat4.bindings()[0].ty, fabric::UniformType::Mat4);

    for options in [MaterialOptions::default(), MaterialOptions::strict()] {
        assert!(matches!(
            Material::new(&fabric(vec![0.0; 5]), options, &loader),
            Err(MaterialError::Fabric(FabricError::InvalidUniformShape { .. }))
        ));
    }
}
