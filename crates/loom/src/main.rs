mod cli;
mod load;
mod paths;
mod run;

use anyhow::Result;
use cli::{Command, FabricArgs};
use fabric::{CubeMapSource, ImageSource, TypedValue};
use load::{build_library, FabricSource};
use loomconfig::LoomConfig;
use textures::TextureLoader;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();
    let config = load::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Compose(args) => handle_compose(&config, &args),
        Command::Check(args) => handle_check(&config, &args),
        Command::Types => handle_types(&config),
        Command::Render(args) => run::render(&config, &args),
    }
}

fn handle_compose(config: &LoomConfig, args: &FabricArgs) -> Result<()> {
    let source = FabricSource::parse(&args.fabric)?;
    let library = build_library(config)?;
    let material =
        run::construct_material(config, &library, &source, args, &TextureLoader::disabled())?;
    print!("{}", material.source());
    Ok(())
}

fn handle_check(config: &LoomConfig, args: &FabricArgs) -> Result<()> {
    let source = FabricSource::parse(&args.fabric)?;
    let library = build_library(config)?;
    let material =
        run::construct_material(config, &library, &source, args, &TextureLoader::disabled())?;

    println!(
        "Material: {} ({})",
        material.type_name().unwrap_or("custom"),
        if material.is_translucent() {
            "translucent"
        } else {
            "opaque"
        }
    );
    println!("Entry point: {}", material.function_name());

    let bindings = material.bindings();
    if bindings.is_empty() {
        println!("No uniforms are bound.");
        return Ok(());
    }
    println!("Bindings:");
    for binding in bindings {
        let declared = if binding.path.is_empty() {
            binding.declared.to_string()
        } else {
            format!("{}.{}", binding.path.join("."), binding.declared)
        };
        println!(
            "  {:<24} {:<12} {:<24} {}",
            binding.name,
            binding.ty.glsl_name(),
            declared,
            describe_value(binding.value)
        );
    }
    Ok(())
}

fn handle_types(config: &LoomConfig) -> Result<()> {
    let library = build_library(config)?;
    let custom = config.templates.len();
    println!("Material types:");
    for (index, name) in library.names().into_iter().enumerate() {
        let origin = if index < custom { "custom" } else { "built-in" };
        println!("  {name:<20} {origin}");
    }
    Ok(())
}

fn describe_value(value: &TypedValue) -> String {
    match value {
        TypedValue::Bool(v) => v.to_string(),
        TypedValue::Float(v) => format!("{v:?}"),
        TypedValue::Vec2(v) => format!("{v:?}"),
        TypedValue::Vec3(v) => format!("{v:?}"),
        TypedValue::Vec4(v) => format!("{v:?}"),
        TypedValue::Mat3(v) => format!("{v:?}"),
        TypedValue::Mat4(v) => format!("{v:?}"),
        TypedValue::Texture(ImageSource::Default) => "default image".to_string(),
        TypedValue::Texture(ImageSource::Location(location)) => location.to_string(),
        TypedValue::Texture(ImageSource::Decoded(_)) => "in-memory image".to_string(),
        TypedValue::Texture(ImageSource::Compressed(_)) => "compressed set".to_string(),
        TypedValue::CubeMap(CubeMapSource::Default) => "default cube map".to_string(),
        TypedValue::CubeMap(CubeMapSource::Faces(faces)) => format!("cube map ({})", faces[0]),
        TypedValue::Channels(channels) => format!("\"{channels}\""),
    }
}
