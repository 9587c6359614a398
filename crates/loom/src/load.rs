use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use fabric::{Fabric, TemplateLibrary};
use loomconfig::LoomConfig;
use textures::{CodecSupport, DefaultFetcher, LoaderConfig, TextureLoader};
use tracing::debug;

use crate::paths::AppPaths;

const TYPE_PREFIX: &str = "type:";

/// Where a fabric comes from on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FabricSource {
    Type(String),
    File(PathBuf),
}

impl FabricSource {
    pub fn parse(raw: &str) -> Result<Self> {
        if let Some(name) = raw.strip_prefix(TYPE_PREFIX) {
            let name = name.trim();
            if name.is_empty() {
                bail!("'{raw}' names no material type");
            }
            return Ok(Self::Type(name.to_string()));
        }
        Ok(Self::File(PathBuf::from(raw)))
    }

    /// Directory relative image paths resolve against when the config sets
    /// no `textures.base_dir`.
    pub fn base_dir(&self) -> PathBuf {
        match self {
            Self::File(path) => path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
            Self::Type(_) => PathBuf::from("."),
        }
    }

    pub fn load(&self) -> Result<Fabric> {
        match self {
            Self::Type(name) => Ok(Fabric::of_type(name.as_str())),
            Self::File(path) => read_fabric(path),
        }
    }
}

pub fn read_fabric(path: &Path) -> Result<Fabric> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read fabric at {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    let fabric = match extension.as_deref() {
        Some("json") => Fabric::from_json_str(&contents),
        Some("toml") => Fabric::from_toml_str(&contents),
        Some(other) => bail!(
            "unsupported fabric format '.{other}' for {}; expected .json or .toml",
            path.display()
        ),
        None => bail!(
            "fabric path {} has no extension; expected .json or .toml",
            path.display()
        ),
    };
    fabric.with_context(|| format!("failed to parse fabric at {}", path.display()))
}

/// Loads `explicit`, or the config file in the loom config directory when it
/// exists, or the defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<LoomConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = AppPaths::discover()?.config_file();
            if !path.exists() {
                debug!(path = %path.display(), "no config file; using defaults");
                return Ok(LoomConfig::default());
            }
            path
        }
    };

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    let config = LoomConfig::from_toml_str(&contents)
        .with_context(|| format!("failed to load config at {}", path.display()))?;
    debug!(path = %path.display(), "loaded config");
    Ok(match path.parent() {
        Some(dir) => config.relative_to(dir),
        None => config,
    })
}

/// Registers every `[templates]` entry of `config`.
pub fn build_library(config: &LoomConfig) -> Result<TemplateLibrary> {
    let mut library = TemplateLibrary::new();
    for (name, path) in &config.templates {
        let fabric = read_fabric(path)?;
        library
            .register(name.as_str(), fabric)
            .with_context(|| format!("failed to register template '{name}'"))?;
    }
    Ok(library)
}

pub fn build_loader(
    config: &LoomConfig,
    source: &FabricSource,
    codecs: Arc<dyn CodecSupport>,
) -> Result<TextureLoader> {
    let settings = &config.textures;
    if !settings.enabled {
        debug!("texture loading disabled by config");
        return Ok(TextureLoader::disabled());
    }

    let base_dir = settings
        .base_dir
        .clone()
        .unwrap_or_else(|| source.base_dir());
    let fetcher = DefaultFetcher::new(&base_dir, settings.fetch_timeout)
        .context("failed to construct texture fetcher")?;
    debug!(
        base = %base_dir.display(),
        workers = settings.workers,
        codecs = ?settings.codecs,
        "starting texture loader"
    );
    Ok(TextureLoader::new(
        Arc::new(fetcher),
        codecs,
        LoaderConfig {
            workers: settings.workers,
            codec_preference: settings.codecs.clone(),
        },
    ))
}
