use std::path::PathBuf;

use clap::Parser;
use renderer::{ColorSpaceMode, GpuPowerPreference};

#[derive(Parser, Debug)]
#[command(
    name = "backdrop",
    author,
    version,
    about = "Fluid simulation driving a two-image transition backdrop"
)]
pub struct Cli {
    /// Scene description to load instead of the user or built-in scene.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Image location: a directory or an `http(s)://` site root.
    #[arg(long, value_name = "LOCATION", env = "BACKDROP_ASSETS")]
    pub assets: Option<String>,

    /// Initial window size in logical pixels (e.g. `1280x800`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// Output color space handling: `auto`, `gamma`, or `linear`.
    #[arg(
        long,
        value_name = "MODE",
        value_parser = parse_color_space,
        default_value = "auto"
    )]
    pub color_space: ColorSpaceMode,

    /// Adapter preference: `low` or `high`.
    #[arg(
        long,
        value_name = "POWER",
        value_parser = parse_power,
        default_value = "low"
    )]
    pub power: GpuPowerPreference,

    /// Seed for the splat tint generator.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Report the adapter and negotiated field formats, then exit.
    #[arg(long)]
    pub probe: bool,

    /// Only fetch the images of the current step at start-up.
    #[arg(long)]
    pub no_preload: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_surface_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1280x800".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width '{}' in size", width.trim()))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height '{}' in size", height.trim()))?;

    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".to_string());
    }

    Ok((width, height))
}

pub fn parse_color_space(value: &str) -> Result<ColorSpaceMode, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("color space must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    match normalized.as_str() {
        "auto" => Ok(ColorSpaceMode::Auto),
        "gamma" | "srgb-off" | "webgl" => Ok(ColorSpaceMode::Gamma),
        "linear" | "srgb" => Ok(ColorSpaceMode::Linear),
        other => Err(format!(
            "unknown color space '{other}'; expected auto, gamma, or linear"
        )),
    }
}

pub fn parse_power(value: &str) -> Result<GpuPowerPreference, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "low" | "low-power" | "integrated" => Ok(GpuPowerPreference::Low),
        "high" | "high-performance" | "discrete" => Ok(GpuPowerPreference::High),
        "" => Err("power preference must not be empty".to_string()),
        other => Err(format!(
            "unknown power preference '{other}'; expected low or high"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_size_accepts_common_separators() {
        assert_eq!(parse_surface_size("1280x800"), Ok((1280, 800)));
        assert_eq!(parse_surface_size(" 640 X 480 "), Ok((640, 480)));
        assert_eq!(parse_surface_size("800×600"), Ok((800, 600)));
    }

    #[test]
    fn surface_size_rejects_bad_input() {
        assert!(parse_surface_size("1280").is_err());
        assert!(parse_surface_size("0x600").is_err());
        assert!(parse_surface_size("widex600").is_err());
    }

    #[test]
    fn color_space_aliases() {
        assert_eq!(parse_color_space("AUTO"), Ok(ColorSpaceMode::Auto));
        assert_eq!(parse_color_space("webgl"), Ok(ColorSpaceMode::Gamma));
        assert_eq!(parse_color_space("srgb"), Ok(ColorSpaceMode::Linear));
        assert!(parse_color_space("").is_err());
        assert!(parse_color_space("hdr").is_err());
    }

    #[test]
    fn power_preference_aliases() {
        assert_eq!(parse_power("high"), Ok(GpuPowerPreference::High));
        assert_eq!(parse_power(" Integrated "), Ok(GpuPowerPreference::Low));
        assert!(parse_power("turbo").is_err());
    }

    #[test]
    fn defaults_leave_scene_choices_alone() {
        let cli = Cli::try_parse_from(["backdrop"]).expect("parse");
        assert_eq!(cli.config, None);
        assert_eq!(cli.size, None);
        assert_eq!(cli.color_space, ColorSpaceMode::Auto);
        assert_eq!(cli.power, GpuPowerPreference::Low);
        assert!(!cli.probe);
        assert!(!cli.no_preload);
    }

    #[test]
    fn flags_are_parsed() {
        let cli = Cli::try_parse_from([
            "backdrop",
            "--config",
            "scene.toml",
            "--size",
            "1024x768",
            "--color-space",
            "linear",
            "--power",
            "high",
            "--seed",
            "42",
            "--no-preload",
        ])
        .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("scene.toml")));
        assert_eq!(cli.size, Some((1024, 768)));
        assert_eq!(cli.color_space, ColorSpaceMode::Linear);
        assert_eq!(cli.power, GpuPowerPreference::High);
        assert_eq!(cli.seed, Some(42));
        assert!(cli.no_preload);
    }
}
