use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn loom(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_loom"))
        .env("LOOM_CONFIG_DIR", config_dir)
        .env_remove("LOOM_CONFIG")
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run loom")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn types_lists_builtins() {
    let root = TempDir::new().unwrap();
    let output = loom(root.path(), &["types"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let listed = stdout(&output);
    for name in ["Color", "Image", "Water", "PolylineOutline"] {
        assert!(listed.contains(name), "missing {name} in:\n{listed}");
    }
}

#[test]
fn types_includes_configured_templates() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("config.toml"),
        "version = 1\n[templates]\nMoss = \"moss.json\"\n",
    )
    .unwrap();
    fs::write(
        root.path().join("moss.json"),
        r#"{"type": "Color", "uniforms": {"color": [0.2, 0.5, 0.1, 1.0]}}"#,
    )
    .unwrap();

    let output = loom(root.path(), &["types"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let listed = stdout(&output);
    assert!(listed.contains("Moss"));
    assert!(listed.contains("custom"));

    let output = loom(root.path(), &["check", "type:Moss"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("color_r"));
}

#[test]
fn compose_prints_the_material_function() {
    let root = TempDir::new().unwrap();
    let output = loom(root.path(), &["compose", "type:Color"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let source = stdout(&output);
    assert!(source.contains("uniform vec4 color_r;"));
    assert!(source.contains("fabric_material fabric_getMaterial(fabric_materialInput materialInput)"));
    assert!(source.contains("material.diffuse = color_r.rgb;"));
}

#[test]
fn check_lists_nested_bindings() {
    let root = TempDir::new().unwrap();
    let fabric = root.path().join("nested.json");
    fs::write(
        &fabric,
        r#"{
            "materials": {
                "first": {"type": "Color", "uniforms": {"color": [0.0, 1.0, 0.0, 1.0]}}
            },
            "uniforms": {"tint": [1.0, 1.0, 1.0]},
            "components": {"diffuse": "first.diffuse * tint"}
        }"#,
    )
    .unwrap();

    let output = loom(root.path(), &["check", fabric.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));

    let report = stdout(&output);
    assert!(report.contains("Material: custom (opaque)"), "{report}");
    assert!(report.contains("Entry point: fabric_getMaterial"));
    let first = report.find("color_r5first").expect("child binding");
    let tint = report.find("tint_r").expect("root binding");
    assert!(first < tint);
    assert!(report.contains("first.color"));
    assert!(report.contains("vec3"));
}

#[test]
fn strict_mode_rejects_unused_uniforms() {
    let root = TempDir::new().unwrap();
    let fabric = root.path().join("unused.toml");
    fs::write(
        &fabric,
        "type = \"Color\"\n[uniforms]\nextra = 1.0\n",
    )
    .unwrap();
    let path = fabric.to_str().unwrap();

    let output = loom(root.path(), &["compose", path]);
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("declared but never referenced"),
        "{}",
        stderr(&output)
    );

    let output = loom(root.path(), &["compose", path, "--lenient"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(!stdout(&output).contains("extra_r"));
}

#[test]
fn config_can_default_to_lenient() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("config.toml"),
        "version = 1\n[materials]\nstrict = false\n",
    )
    .unwrap();
    let fabric = root.path().join("unused.json");
    fs::write(&fabric, r#"{"type": "Color", "uniforms": {"extra": 1.0}}"#).unwrap();
    let path = fabric.to_str().unwrap();

    let output = loom(root.path(), &["check", path]);
    assert!(output.status.success(), "{}", stderr(&output));

    let output = loom(root.path(), &["check", path, "--strict"]);
    assert!(!output.status.success());
}

#[test]
fn unknown_types_and_formats_fail() {
    let root = TempDir::new().unwrap();
    let output = loom(root.path(), &["compose", "type:Velvet"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unknown material type 'Velvet'"));

    let fabric = root.path().join("color.yaml");
    fs::write(&fabric, "type: Color").unwrap();
    let output = loom(root.path(), &["check", fabric.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unsupported fabric format"));
}

#[test]
fn invalid_config_is_reported() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("config.toml"), "version = 3\n").unwrap();
    let output = loom(root.path(), &["types"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unsupported config version 3"));
}

#[test]
fn oversized_render_targets_are_refused() {
    let root = TempDir::new().unwrap();
    let out = root.path().join("out.png");
    let output = loom(
        root.path(),
        &["render", "type:Color", "-o", out.to_str().unwrap(), "--size", "100000x100000"],
    );
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("exceeds 8192 pixels per edge"),
        "{}",
        stderr(&output)
    );
    assert!(!out.exists());
}
