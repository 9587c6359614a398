use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use fabric::TemplateLibrary;
use loomconfig::LoomConfig;
use material::{Material, MaterialOptions};
use renderer::{HeadlessRenderer, RenderOptions};
use textures::{TextureLoader, TextureState, TextureUploader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{FabricArgs, RenderArgs};
use crate::load::{build_library, build_loader, FabricSource};

const TEXTURE_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the material `args` names, with templates from `library`.
pub fn construct_material(
    config: &LoomConfig,
    library: &TemplateLibrary,
    source: &FabricSource,
    args: &FabricArgs,
    loader: &TextureLoader,
) -> Result<Material> {
    let fabric = source.load()?;
    let options = MaterialOptions {
        strict: args.strictness().unwrap_or(config.materials.strict),
        translucent: None,
    };
    Material::with_library(&fabric, library, options, loader)
        .with_context(|| format!("failed to build material from '{}'", args.fabric))
}

pub fn render(config: &LoomConfig, args: &RenderArgs) -> Result<()> {
    let source = FabricSource::parse(&args.fabric.fabric)?;
    let library = build_library(config)?;

    let mut renderer = HeadlessRenderer::new().context("failed to initialise headless renderer")?;
    info!(adapter = renderer.adapter_name(), "rendering headless");

    let loader = build_loader(config, &source, Arc::new(renderer.codecs()))?;
    let mut material = construct_material(config, &library, &source, &args.fabric, &loader)?;

    let mut uploader = renderer.uploader();
    wait_for_textures(&mut material, &mut uploader, args.texture_timeout)?;
    for binding in material.bindings() {
        if let Some(TextureState::Failed(err)) = binding.texture {
            warn!(uniform = binding.declared, error = %err, "texture failed; rendering the default");
        }
    }

    let (width, height) = args.size.unwrap_or(config.render.size);
    let options = RenderOptions {
        width,
        height,
        background: args.background.unwrap_or(config.render.background),
        time: args.time,
        frame_number: args.frame,
    };
    let image = renderer.render(&material, &options)?;
    image
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(
        path = %args.output.display(),
        width,
        height,
        translucent = material.is_translucent(),
        "wrote render"
    );

    material.destroy()?;
    Ok(())
}

/// Polls until no texture is loading or `timeout` passes. Unfinished textures
/// render with the default.
fn wait_for_textures(
    material: &mut Material,
    uploader: &mut dyn TextureUploader,
    timeout: Duration,
) -> Result<()> {
    let started = Instant::now();
    loop {
        material.poll(uploader)?;
        let pending = material.pending_textures();
        if pending == 0 {
            return Ok(());
        }
        if started.elapsed() >= timeout {
            warn!(pending, ?timeout, "textures still loading; rendering with defaults");
            return Ok(());
        }
        thread::sleep(TEXTURE_POLL_INTERVAL);
    }
}
