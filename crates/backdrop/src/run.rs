use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use renderer::{GpuPowerPreference, Renderer, RendererConfig};
use sceneconfig::SceneConfig;
use transition::{AssetSource, ImageSource};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::paths::AppPaths;

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    if cli.probe {
        return probe(cli.power);
    }

    let paths = AppPaths::discover()?;
    tracing::debug!(config = %paths.config_dir().display(), "resolved backdrop paths");

    let scene_path = paths.scene_path(cli.config.as_deref());
    let scene = load_scene(scene_path.as_deref())?;
    for warning in scene.lint() {
        tracing::warn!(%warning, "scene lint");
    }

    let location = asset_location(&cli, &scene, scene_path.as_deref());
    let source = AssetSource::from_location(&location)
        .with_context(|| format!("failed to open image location '{location}'"))?;
    tracing::info!(location = %location, "resolved image location");
    let images: Arc<dyn ImageSource> = Arc::new(source);

    let mut config = RendererConfig::new(scene, images);
    if let Some(size) = cli.size {
        config.surface_size = size;
    }
    config.color_space = cli.color_space;
    config.gpu_power = cli.power;
    config.seed = cli.seed;
    config.preload = !cli.no_preload;

    tracing::info!(?config, "starting backdrop");
    Renderer::new(config).run()
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn probe(power: GpuPowerPreference) -> Result<()> {
    let (profile, formats) =
        renderer::probe(power).context("GPU cannot run the fluid simulation")?;
    println!("adapter:   {profile}");
    println!("driver:    {}", profile.driver);
    println!("velocity:  {:?}", formats.velocity);
    println!("dye:       {:?}", formats.dye);
    println!("scalar:    {:?}", formats.scalar);
    println!("filtering: {}", if formats.linear_filtering { "linear" } else { "nearest" });
    println!("advection: {:?}", formats.advection);
    Ok(())
}

fn load_scene(path: Option<&Path>) -> Result<SceneConfig> {
    match path {
        Some(path) => {
            let scene = SceneConfig::load(path)
                .with_context(|| format!("failed to load scene {}", path.display()))?;
            tracing::info!(path = %path.display(), steps = scene.steps.len(), "loaded scene");
            Ok(scene)
        }
        None => {
            let scene = SceneConfig::builtin().context("built-in scene is invalid")?;
            tracing::info!(steps = scene.steps.len(), "using built-in scene");
            Ok(scene)
        }
    }
}

/// `--assets` wins, then the scene's `asset_root` (relative to the scene file),
/// then the working directory.
fn asset_location(cli: &Cli, scene: &SceneConfig, scene_path: Option<&Path>) -> String {
    if let Some(location) = cli.assets.as_deref() {
        return location.to_string();
    }
    let Some(root) = scene.asset_root.as_deref() else {
        return ".".to_string();
    };
    let resolved: PathBuf = match scene_path.and_then(Path::parent) {
        Some(dir) if root.is_relative() => dir.join(root),
        _ => root.to_path_buf(),
    };
    resolved.display().to_string()
}
