use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fabric::Codec;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

const MAX_WORKERS: usize = 64;
/// Largest accepted render edge, in pixels.
pub const MAX_RENDER_EDGE: u32 = 8192;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoomConfig {
    pub version: u32,
    #[serde(default)]
    pub materials: MaterialSettings,
    #[serde(default)]
    pub textures: TextureSettings,
    #[serde(default)]
    pub render: RenderSettings,
    /// Extra named templates: type name → fabric file (`.json` or `.toml`).
    #[serde(default)]
    pub templates: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MaterialSettings {
    #[serde(default = "default_strict")]
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TextureSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Relative image paths resolve against this directory.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    #[serde(
        default = "default_fetch_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub fetch_timeout: Duration,
    /// Compressed-set preference, tried in order.
    #[serde(default = "default_codecs")]
    pub codecs: Vec<Codec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RenderSettings {
    #[serde(default = "default_size")]
    pub size: (u32, u32),
    #[serde(default = "default_background")]
    pub background: [u8; 4],
}

impl Default for LoomConfig {
    fn default() -> Self {
        Self {
            version: 1,
            materials: MaterialSettings::default(),
            textures: TextureSettings::default(),
            render: RenderSettings::default(),
            templates: BTreeMap::new(),
        }
    }
}

impl Default for MaterialSettings {
    fn default() -> Self {
        Self {
            strict: default_strict(),
        }
    }
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            workers: default_workers(),
            base_dir: None,
            fetch_timeout: default_fetch_timeout(),
            codecs: default_codecs(),
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            size: default_size(),
            background: default_background(),
        }
    }
}

fn default_strict() -> bool {
    true
}

fn default_enabled() -> bool {
    true
}

fn default_workers() -> usize {
    2
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_codecs() -> Vec<Codec> {
    Codec::PREFERENCE.to_vec()
}

fn default_size() -> (u32, u32) {
    (64, 64)
}

fn default_background() -> [u8; 4] {
    [0, 0, 255, 255]
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl LoomConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: LoomConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Rebases relative `textures.base_dir` and template paths onto `dir`,
    /// normally the directory holding the config file.
    pub fn relative_to(mut self, dir: &Path) -> Self {
        if let Some(base) = self.textures.base_dir.take() {
            self.textures.base_dir = Some(rebase(dir, base));
        }
        self.templates = std::mem::take(&mut self.templates)
            .into_iter()
            .map(|(name, path)| (name, rebase(dir, path)))
            .collect();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let workers = self.textures.workers;
        if workers == 0 || workers > MAX_WORKERS {
            return Err(ConfigError::Invalid(format!(
                "textures.workers must be between 1 and {MAX_WORKERS}, got {workers}"
            )));
        }

        if self.textures.fetch_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "textures.fetch_timeout must be greater than zero".into(),
            ));
        }

        let mut seen = BTreeSet::new();
        for codec in &self.textures.codecs {
            if !seen.insert(*codec) {
                return Err(ConfigError::Invalid(format!(
                    "textures.codecs lists '{codec}' more than once"
                )));
            }
        }

        let (width, height) = self.render.size;
        if width == 0 || height == 0 || width > MAX_RENDER_EDGE || height > MAX_RENDER_EDGE {
            return Err(ConfigError::Invalid(format!(
                "render.size must be within 1..={MAX_RENDER_EDGE} on both axes, got {width}x{height}"
            )));
        }

        for (name, path) in &self.templates {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("template name may not be empty".into()));
            }
            if fabric::registry::builtin(name).is_some() {
                return Err(ConfigError::Invalid(format!(
                    "template '{name}' shadows a built-in type"
                )));
            }
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "template '{name}' has an empty path"
                )));
            }
        }

        Ok(())
    }
}

fn rebase(dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[materials]
strict = false

[textures]
workers = 4
base_dir = "assets"
fetch_timeout = "10s"
codecs = ["etc1", "s3tc"]

[render]
size = [128, 32]
background = [0, 0, 0, 255]

[templates]
Brick = "templates/brick.json"
"#;

    #[test]
    fn parses_sample_config() {
        let config = LoomConfig::from_toml_str(SAMPLE).expect("parse config");
        assert!(!config.materials.strict);
        assert_eq!(config.textures.workers, 4);
        assert_eq!(config.textures.base_dir, Some(PathBuf::from("assets")));
        assert_eq!(config.textures.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.textures.codecs, vec![Codec::Etc1, Codec::S3tc]);
        assert_eq!(config.render.size, (128, 32));
        assert_eq!(config.render.background, [0, 0, 0, 255]);
        assert_eq!(
            config.templates.get("Brick"),
            Some(&PathBuf::from("templates/brick.json"))
        );
    }

    #[test]
    fn missing_sections_take_defaults() {
        let config = LoomConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(config, LoomConfig::default());
        assert!(config.materials.strict);
        assert!(config.textures.enabled);
        assert_eq!(config.textures.workers, 2);
        assert_eq!(config.textures.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.textures.codecs, Codec::PREFERENCE.to_vec());
        assert_eq!(config.render.size, (64, 64));
        assert_eq!(config.render.background, [0, 0, 255, 255]);
    }

    #[test]
    fn numeric_timeouts_are_seconds() {
        let config = LoomConfig::from_toml_str(
            r#"
version = 1
[textures]
fetch_timeout = 2.5
"#,
        )
        .unwrap();
        assert_eq!(config.textures.fetch_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = LoomConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_codec() {
        let err = LoomConfig::from_toml_str(
            r#"
version = 1
[textures]
codecs = ["astc"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_invalid_values() {
        for input in [
            "version = 1\n[textures]\nworkers = 0\n",
            "version = 1\n[textures]\nfetch_timeout = \"0s\"\n",
            "version = 1\n[textures]\ncodecs = [\"s3tc\", \"s3tc\"]\n",
            "version = 1\n[render]\nsize = [0, 10]\n",
            "version = 1\n[templates]\nColor = \"color.json\"\n",
        ] {
            let err = LoomConfig::from_toml_str(input).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{input}: {err}");
        }
    }

    #[test]
    fn relative_paths_follow_the_config_directory() {
        let config = LoomConfig::from_toml_str(SAMPLE)
            .unwrap()
            .relative_to(Path::new("/etc/loom"));
        assert_eq!(
            config.textures.base_dir,
            Some(PathBuf::from("/etc/loom/assets"))
        );
        assert_eq!(
            config.templates.get("Brick"),
            Some(&PathBuf::from("/etc/loom/templates/brick.json"))
        );
    }

    #[test]
    fn serialises_back_to_toml() {
        let config = LoomConfig::from_toml_str(SAMPLE).unwrap();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("fetch_timeout = \"10s\""));
        assert_eq!(LoomConfig::from_toml_str(&text).unwrap(), config);
    }
}
