use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;
use tracing::debug;

pub const ENV_CONFIG_DIR: &str = "LOOM_CONFIG_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "Loom";
const APPLICATION: &str = "loom";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    /// `LOOM_CONFIG_DIR` wins over the platform config directory.
    pub fn discover() -> Result<Self> {
        if let Some(dir) = env::var_os(ENV_CONFIG_DIR).filter(|value| !value.is_empty()) {
            let config_dir = PathBuf::from(dir);
            debug!(path = %config_dir.display(), "using config directory from {ENV_CONFIG_DIR}");
            return Ok(Self { config_dir });
        }

        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;
        Ok(Self {
            config_dir: project_dirs.config_dir().to_path_buf(),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}
