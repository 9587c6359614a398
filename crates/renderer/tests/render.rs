use fabric::{registry, Fabric, InMemoryImage, UniformValue};
use image::Rgba;
use material::{Material, MaterialOptions};
use renderer::{HeadlessRenderer, RenderOptions};
use textures::{TextureLoader, TextureState};

fn headless() -> Option<HeadlessRenderer> {
    match HeadlessRenderer::new() {
        Ok(renderer) => Some(renderer),
        Err(err) => {
            eprintln!("skipping GPU test: {err:#}");
            None
        }
    }
}

fn close(actual: Rgba<u8>, expected: [u8; 4]) -> bool {
    actual
        .0
        .iter()
        .zip(expected)
        .all(|(a, e)| a.abs_diff(e) <= 2)
}

#[test]
fn opaque_color_covers_the_background() {
    let Some(mut renderer) = headless() else {
        return;
    };
    let material = Material::from_type(
        "Color",
        [("color", UniformValue::from([0.0f32, 1.0, 0.0, 1.0]))],
        &TextureLoader::disabled(),
    )
    .unwrap();
    assert!(!material.is_translucent());

    let image = renderer.render(&material, &RenderOptions::default()).unwrap();
    assert_eq!(image.dimensions(), (64, 64));
    assert!(image.pixels().all(|pixel| pixel.0 == [0, 255, 0, 255]));
}

#[test]
fn translucent_color_blends_over_the_background() {
    let Some(mut renderer) = headless() else {
        return;
    };
    let material = Material::from_type("Color", [], &TextureLoader::disabled()).unwrap();
    assert!(material.is_translucent());

    let options = RenderOptions {
        width: 8,
        height: 8,
        ..RenderOptions::default()
    };
    let image = renderer.render(&material, &options).unwrap();
    assert!(image.pixels().all(|pixel| close(*pixel, [128, 0, 128, 255])));
}

#[test]
fn same_structure_shares_a_pipeline() {
    let Some(mut renderer) = headless() else {
        return;
    };
    let loader = TextureLoader::disabled();
    let color = |value: UniformValue| Material::from_type("Color", [("color", value)], &loader);
    let red = color(UniformValue::color(1.0, 0.0, 0.0, 1.0)).unwrap();
    let blue = color(UniformValue::color(0.0, 0.0, 1.0, 1.0)).unwrap();
    let options = RenderOptions {
        width: 4,
        height: 4,
        background: [0, 0, 0, 255],
        ..RenderOptions::default()
    };

    let first = renderer.render(&red, &options).unwrap();
    let second = renderer.render(&blue, &options).unwrap();
    assert_eq!(renderer.cached_pipelines(), 1);
    assert_eq!(first.get_pixel(0, 0).0, [255, 0, 0, 255]);
    assert_eq!(second.get_pixel(0, 0).0, [0, 0, 255, 255]);
}

#[test]
fn uploaded_textures_are_sampled() {
    let Some(mut renderer) = headless() else {
        return;
    };
    let green = InMemoryImage::solid(2, 2, [0, 255, 0, 255]).unwrap();
    let mut material = Material::from_type(
        "Image",
        [("image", UniformValue::from(green))],
        &TextureLoader::disabled(),
    )
    .unwrap();

    let mut uploader = renderer.uploader();
    assert_eq!(material.poll(&mut uploader).unwrap(), 1);
    assert!(matches!(
        material.texture_state("image"),
        Some(TextureState::Ready(_))
    ));

    let options = RenderOptions {
        width: 8,
        height: 8,
        ..RenderOptions::default()
    };
    let image = renderer.render(&material, &options).unwrap();
    assert!(image.pixels().all(|pixel| close(*pixel, [0, 255, 0, 255])));
}

#[test]
fn nested_materials_render() {
    let Some(mut renderer) = headless() else {
        return;
    };
    let fabric = Fabric::new()
        .material(
            "left",
            Fabric::of_type("Color").uniform("color", [1.0f32, 0.0, 0.0, 1.0]),
        )
        .material(
            "right",
            Fabric::of_type("Color").uniform("color", [0.0f32, 1.0, 0.0, 1.0]),
        )
        .component("diffuse", "left.diffuse + right.diffuse");
    let material =
        Material::new(&fabric, MaterialOptions::strict(), &TextureLoader::disabled()).unwrap();

    let image = renderer.render(&material, &RenderOptions::default()).unwrap();
    assert!(image.pixels().all(|pixel| pixel.0 == [255, 255, 0, 255]));
}

#[test]
fn three_levels_render_and_destroy_together() {
    let Some(mut renderer) = headless() else {
        return;
    };
    let grandchild = Fabric::of_type("Color").uniform("color", [0.0f32, 1.0, 0.0, 1.0]);
    let child = Fabric::new()
        .material("inner", grandchild)
        .component("diffuse", "inner.diffuse");
    let fabric = Fabric::new()
        .material("middle", child)
        .component("diffuse", "middle.diffuse");
    let mut material =
        Material::new(&fabric, MaterialOptions::strict(), &TextureLoader::disabled()).unwrap();

    let image = renderer.render(&material, &RenderOptions::default()).unwrap();
    assert!(image.pixels().all(|pixel| pixel.0 == [0, 255, 0, 255]));

    material.destroy().unwrap();
    let middle = material.material("middle").unwrap();
    assert!(middle.is_destroyed());
    assert!(middle.material("inner").unwrap().is_destroyed());
}

#[test]
fn every_builtin_renders_something() {
    let Some(mut renderer) = headless() else {
        return;
    };
    let loader = TextureLoader::disabled();
    let options = RenderOptions {
        width: 32,
        height: 32,
        ..RenderOptions::default()
    };
    let background = Rgba(options.background);
    for name in registry::builtin_names() {
        let material = Material::from_type(name, [], &loader).unwrap();
        let image = renderer
            .render(&material, &options)
            .unwrap_or_else(|err| panic!("{name}: {err:#}"));
        assert!(
            image.pixels().any(|pixel| *pixel != background),
            "{name} left the background untouched"
        );
    }
}

#[test]
fn destroyed_materials_are_rejected() {
    let Some(mut renderer) = headless() else {
        return;
    };
    let mut material = Material::from_type("Color", [], &TextureLoader::disabled()).unwrap();
    material.destroy().unwrap();
    assert!(renderer.render(&material, &RenderOptions::default()).is_err());

    let fabric = Fabric::new()
        .material("first", Fabric::of_type("Color"))
        .component("diffuse", "first.diffuse");
    let mut material =
        Material::new(&fabric, MaterialOptions::strict(), &TextureLoader::disabled()).unwrap();
    material.material_mut("first").unwrap().destroy().unwrap();
    let err = renderer.render(&material, &RenderOptions::default()).unwrap_err();
    assert!(err.to_string().contains("destroyed sub-material"), "{err:#}");
}

#[test]
fn targets_beyond_the_device_limit_are_rejected() {
    let Some(mut renderer) = headless() else {
        return;
    };
    let material = Material::from_type("Color", [], &TextureLoader::disabled()).unwrap();
    let options = RenderOptions {
        width: u32::MAX,
        height: 1,
        ..RenderOptions::default()
    };
    let err = renderer.render(&material, &options).unwrap_err();
    assert!(err.to_string().contains("exceeds the device limit"), "{err:#}");
}
