//! Scene description for the backdrop renderer.
//!
//! A scene names the image "steps" the transition engine can show, how scroll
//! targets map onto them, the order sections appear in while scrolling, and
//! the tuning constants for the fluid solver and compositor. Scenes are TOML;
//! the built-in scene lives in `default_scene.toml` next to this file.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

const BUILTIN_SCENE: &str = include_str!("default_scene.toml");

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse scene: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid scene: {0}")]
    Invalid(String),
    #[error("failed to read scene at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which image list of a step is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Desktop,
    Mobile,
}

impl Variant {
    pub fn from_mobile(mobile: bool) -> Self {
        if mobile {
            Variant::Mobile
        } else {
            Variant::Desktop
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Desktop => f.write_str("desktop"),
            Variant::Mobile => f.write_str("mobile"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SceneConfig {
    pub version: u32,
    pub default_step: String,
    #[serde(default)]
    pub sequence: Vec<String>,
    #[serde(default = "default_mobile_breakpoint")]
    pub mobile_breakpoint: u32,
    /// Directory that root-relative image URLs resolve against.
    #[serde(default)]
    pub asset_root: Option<PathBuf>,
    #[serde(default)]
    pub fade: FadeSettings,
    #[serde(default)]
    pub appearance: Appearance,
    #[serde(default)]
    pub fluid: FluidSettings,
    #[serde(default)]
    pub pointer: PointerSettings,
    /// Scroll target name to step name. Targets missing here map to themselves.
    #[serde(default)]
    pub sections: BTreeMap<String, String>,
    pub steps: BTreeMap<String, StepImages>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StepImages {
    pub desktop: Vec<String>,
    pub mobile: Vec<String>,
}

impl StepImages {
    pub fn urls(&self, variant: Variant) -> &[String] {
        match variant {
            Variant::Desktop => &self.desktop,
            Variant::Mobile => &self.mobile,
        }
    }
}

/// Default parameters for a slide fade.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FadeSettings {
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    pub zoom_from: f32,
    pub rotation_from: f32,
}

impl Default for FadeSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(800),
            zoom_from: 1.05,
            rotation_from: 0.02,
        }
    }
}

/// Compositor look: morph displacement, fluid distortion and post effects.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Appearance {
    pub strength: f32,
    pub lateral: f32,
    pub distort: f32,
    pub intensity: f32,
    pub color: [f32; 3],
    pub grain: f32,
    pub chroma: f32,
    pub vignette: f32,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            strength: 0.1,
            lateral: 0.5,
            distort: 0.003,
            intensity: 0.1,
            color: [0.125, 0.125, 0.125],
            grain: 0.04,
            chroma: 0.005,
            vignette: 0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FluidSettings {
    pub sim_resolution: u32,
    pub dye_resolution: u32,
    pub splat_radius: f32,
    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    pub pressure_dissipation: f32,
    pub curl: f32,
    pub force: f32,
    pub dt: f32,
    /// Seed for the splat tint generator; unset draws from entropy.
    pub seed: Option<u64>,
}

impl Default for FluidSettings {
    fn default() -> Self {
        Self {
            sim_resolution: 128,
            dye_resolution: 512,
            splat_radius: 0.0015,
            density_dissipation: 0.96,
            velocity_dissipation: 0.97,
            pressure_dissipation: 0.8,
            curl: 3.0,
            force: 15.0,
            dt: 0.016,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PointerSettings {
    #[serde(deserialize_with = "deserialize_duration")]
    pub min_interval: Duration,
    pub velocity_scale: f32,
    pub threshold: f32,
}

impl Default for PointerSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(14),
            velocity_scale: 0.8,
            threshold: 0.001,
        }
    }
}

/// Non-fatal findings reported by [`SceneConfig::lint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Two neighbouring sections open on the same image, so the morph between
    /// them has nothing to animate.
    IdenticalFirstImage {
        from: String,
        to: String,
        variant: Variant,
        url: String,
    },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::IdenticalFirstImage {
                from,
                to,
                variant,
                url,
            } => write!(
                f,
                "steps '{from}' and '{to}' both start on {variant} image '{url}'; the morph between them is invisible"
            ),
        }
    }
}

fn default_mobile_breakpoint() -> u32 {
    768
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

impl SceneConfig {
    /// The scene compiled into the binary.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml_str(BUILTIN_SCENE)
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SceneConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn step(&self, name: &str) -> Option<&StepImages> {
        self.steps.get(name)
    }

    pub fn has_step(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// Maps a scroll target onto a step name, or `None` when the target leads
    /// nowhere known.
    pub fn resolve_section(&self, target: &str) -> Option<&str> {
        let step = self
            .sections
            .get(target)
            .map(String::as_str)
            .unwrap_or(target);
        self.steps.get_key_value(step).map(|(key, _)| key.as_str())
    }

    pub fn is_mobile_width(&self, logical_width: f64) -> bool {
        logical_width < f64::from(self.mobile_breakpoint)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported scene version {}; expected 1",
                self.version
            )));
        }

        if self.steps.is_empty() {
            return Err(ConfigError::Invalid(
                "scene must define at least one step".into(),
            ));
        }

        for (name, images) in &self.steps {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("step names may not be empty".into()));
            }
            for variant in [Variant::Desktop, Variant::Mobile] {
                let urls = images.urls(variant);
                if urls.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "step '{name}' has no {variant} images"
                    )));
                }
                if urls.iter().any(|url| url.trim().is_empty()) {
                    return Err(ConfigError::Invalid(format!(
                        "step '{name}' contains an empty {variant} image url"
                    )));
                }
            }
        }

        if !self.has_step(&self.default_step) {
            return Err(ConfigError::Invalid(format!(
                "default_step references unknown step '{}'",
                self.default_step
            )));
        }

        for name in &self.sequence {
            if !self.has_step(name) {
                return Err(ConfigError::Invalid(format!(
                    "sequence references unknown step '{name}'"
                )));
            }
        }

        for (target, step) in &self.sections {
            if target.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "section target may not be empty".into(),
                ));
            }
            if !self.has_step(step) {
                return Err(ConfigError::Invalid(format!(
                    "section '{target}' references unknown step '{step}'"
                )));
            }
        }

        if self.mobile_breakpoint == 0 {
            return Err(ConfigError::Invalid(
                "mobile_breakpoint must be greater than zero".into(),
            ));
        }

        self.fluid.validate()?;

        if self.fade.zoom_from <= 0.0 || !self.fade.zoom_from.is_finite() {
            return Err(ConfigError::Invalid(
                "fade.zoom_from must be a positive number".into(),
            ));
        }

        if !self.fade.rotation_from.is_finite() {
            return Err(ConfigError::Invalid(
                "fade.rotation_from must be finite".into(),
            ));
        }

        if self.pointer.min_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "pointer.min_interval must be greater than zero".into(),
            ));
        }

        if self.pointer.threshold < 0.0 {
            return Err(ConfigError::Invalid(
                "pointer.threshold must be >= 0".into(),
            ));
        }

        Ok(())
    }

    /// Reports neighbouring sequence entries that open on the same image.
    pub fn lint(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        for pair in self.sequence.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            let (Some(a), Some(b)) = (self.step(from), self.step(to)) else {
                continue;
            };
            for variant in [Variant::Desktop, Variant::Mobile] {
                let first_a = a.urls(variant).first();
                let first_b = b.urls(variant).first();
                if let (Some(url), Some(other)) = (first_a, first_b) {
                    if url == other {
                        warnings.push(ConfigWarning::IdenticalFirstImage {
                            from: from.clone(),
                            to: to.clone(),
                            variant,
                            url: url.clone(),
                        });
                    }
                }
            }
        }
        warnings
    }

    /// Every distinct image url of the given variant, in step-name order.
    pub fn all_urls(&self, variant: Variant) -> Vec<&str> {
        let mut seen = Vec::new();
        for images in self.steps.values() {
            for url in images.urls(variant) {
                if !seen.contains(&url.as_str()) {
                    seen.push(url.as_str());
                }
            }
        }
        seen
    }
}

impl FluidSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.sim_resolution == 0 || self.dye_resolution == 0 {
            return Err(ConfigError::Invalid(
                "fluid grid resolutions must be greater than zero".into(),
            ));
        }

        let positive = [
            ("fluid.splat_radius", self.splat_radius),
            ("fluid.dt", self.dt),
            ("fluid.force", self.force),
        ];
        for (name, value) in positive {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a positive number"
                )));
            }
        }

        let unit = [
            ("fluid.density_dissipation", self.density_dissipation),
            ("fluid.velocity_dissipation", self.velocity_dissipation),
            ("fluid.pressure_dissipation", self.pressure_dissipation),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must lie within [0, 1]"
                )));
            }
        }

        if self.curl < 0.0 {
            return Err(ConfigError::Invalid("fluid.curl must be >= 0".into()));
        }

        Ok(())
    }
}
