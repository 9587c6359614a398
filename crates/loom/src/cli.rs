use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use loomconfig::MAX_RENDER_EDGE;

#[derive(Parser, Debug)]
#[command(
    name = "loom",
    author,
    version,
    about = "Compose material fabrics into GLSL and render them offscreen",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Configuration file; defaults to `config.toml` in the loom config directory.
    #[arg(long, global = true, env = "LOOM_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the composed shader source of a fabric.
    Compose(FabricArgs),
    /// Validate a fabric and list the uniforms a renderer binds.
    Check(FabricArgs),
    /// List the available material types.
    Types,
    /// Render a fabric onto a filled quad and write a PNG.
    Render(RenderArgs),
}

#[derive(Args, Debug, Clone)]
pub struct FabricArgs {
    /// Fabric file (`.json` or `.toml`) or `type:<Name>`.
    #[arg(value_name = "FABRIC")]
    pub fabric: String,

    /// Reject unused declarations and unknown fields.
    #[arg(long, conflicts_with = "lenient")]
    pub strict: bool,

    /// Tolerate unused declarations and unknown fields.
    #[arg(long)]
    pub lenient: bool,
}

impl FabricArgs {
    /// Command-line override of `materials.strict`, if any.
    pub fn strictness(&self) -> Option<bool> {
        match (self.strict, self.lenient) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub fabric: FabricArgs,

    /// PNG path to write.
    #[arg(long, short, value_name = "PATH")]
    pub output: PathBuf,

    /// Render target size, e.g. `256x256`.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Clear colour behind the material as `r,g,b,a` bytes.
    #[arg(long, value_name = "R,G,B,A", value_parser = parse_background)]
    pub background: Option<[u8; 4]>,

    /// Value of `fabric_time` in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0)]
    pub time: f32,

    /// Value of `fabric_frameNumber`.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub frame: u32,

    /// How long to wait for textures before rendering with defaults.
    #[arg(
        long,
        value_name = "DURATION",
        value_parser = humantime::parse_duration,
        default_value = "10s"
    )]
    pub texture_timeout: Duration,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width == 0 || height == 0 {
        return Err("render size must be greater than zero".into());
    }
    if width > MAX_RENDER_EDGE || height > MAX_RENDER_EDGE {
        return Err(format!(
            "render size {width}x{height} exceeds {MAX_RENDER_EDGE} pixels per edge"
        ));
    }
    Ok((width, height))
}

pub fn parse_background(value: &str) -> Result<[u8; 4], String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!(
            "expected four comma-separated channels, got {}",
            parts.len()
        ));
    }
    let mut color = [0u8; 4];
    for (slot, part) in color.iter_mut().zip(&parts) {
        *slot = part
            .parse::<u8>()
            .map_err(|_| format!("invalid channel '{part}'; expected 0-255"))?;
    }
    Ok(color)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("256x128").unwrap(), (256, 128));
        assert_eq!(parse_size(" 3X4 ").unwrap(), (3, 4));
        assert!(parse_size("256").is_err());
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("ax10").is_err());
        assert_eq!(parse_size("8192x1").unwrap(), (8192, 1));
        assert!(parse_size("8193x1").is_err());
        assert!(parse_size("100000x100000").is_err());
    }

    #[test]
    fn parses_backgrounds() {
        assert_eq!(parse_background("0,0,255,255").unwrap(), [0, 0, 255, 255]);
        assert_eq!(parse_background(" 1, 2 ,3,4").unwrap(), [1, 2, 3, 4]);
        assert!(parse_background("0,0,255").is_err());
        assert!(parse_background("0,0,256,255").is_err());
    }

    #[test]
    fn strict_and_lenient_conflict() {
        let parsed = Cli::try_parse_from(["loom", "compose", "type:Color", "--strict", "--lenient"]);
        assert!(parsed.is_err());

        let cli = Cli::try_parse_from(["loom", "check", "type:Color", "--lenient"]).unwrap();
        let Command::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.strictness(), Some(false));
    }

    #[test]
    fn render_defaults() {
        let cli = Cli::try_parse_from(["loom", "render", "type:Grid", "-o", "out.png"]).unwrap();
        let Command::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.output, PathBuf::from("out.png"));
        assert_eq!(args.size, None);
        assert_eq!(args.texture_timeout, Duration::from_secs(10));
        assert_eq!(args.fabric.strictness(), None);
    }
}
