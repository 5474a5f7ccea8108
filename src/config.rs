use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::detect::{AdapterConfig, DEFAULT_DETECT_TIMEOUT, DEFAULT_MIN_FACE_PX};
use crate::frame::PixelFormat;
use crate::geometry::{CameraFacing, FitMode, MirrorPolicy, Rotation, Size};
use crate::ingest::CameraConfig;
use crate::overlay::{EffectKind, EffectSettings, Intensity};
use crate::session::PipelineConfig;
use crate::throttle::DEFAULT_THROTTLE_INTERVAL;

const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_SOURCE_WIDTH: u32 = 1280;
const DEFAULT_SOURCE_HEIGHT: u32 = 720;
const DEFAULT_SOURCE_FPS: u32 = 30;
const DEFAULT_SOURCE_ROTATION: u32 = 90;
const DEFAULT_DISPLAY_WIDTH: u32 = 1080;
const DEFAULT_DISPLAY_HEIGHT: u32 = 1920;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FacecloakConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    effect: Option<EffectConfigFile>,
    display: Option<DisplayConfigFile>,
    platform: Option<PlatformConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    rotation: Option<u32>,
    pixel_format: Option<String>,
    facing: Option<String>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    min_face_px: Option<f32>,
    timeout_ms: Option<u64>,
    throttle_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EffectConfigFile {
    enabled: Option<bool>,
    kind: Option<String>,
    intensity: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DisplayConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    fit: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PlatformConfigFile {
    profile: Option<String>,
    mirror: Option<String>,
}

/// Host platform. Each profile carries the mirroring quirk of its camera stack.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Platform {
    #[default]
    Android,
    Ios,
    Web,
    Desktop,
}

impl Platform {
    pub fn default_mirror(self) -> MirrorPolicy {
        match self {
            // Front-camera boxes from the Android analyzer arrive unmirrored only
            // while the buffer is landscape-major.
            Platform::Android => MirrorPolicy::LandscapeFrontOnly,
            Platform::Ios | Platform::Web => MirrorPolicy::FrontAlways,
            Platform::Desktop => MirrorPolicy::Never,
        }
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "web" | "browser" => Ok(Platform::Web),
            "desktop" => Ok(Platform::Desktop),
            other => Err(anyhow!("unknown platform '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FacecloakConfig {
    pub source: SourceSettings,
    pub detector: DetectorSettings,
    pub effect: EffectSettings,
    pub display: DisplaySettings,
    pub platform: Platform,
    pub mirror: MirrorPolicy,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub rotation: Rotation,
    pub pixel_format: PixelFormat,
    pub facing: CameraFacing,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// `None` selects the registry default.
    pub backend: Option<String>,
    pub min_face_px: f32,
    pub timeout: Duration,
    pub throttle: Duration,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub width: u32,
    pub height: u32,
    pub fit: FitMode,
}

impl FacecloakConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FACECLOAK_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FacecloakConfigFile) -> Result<Self> {
        let source_file = file.source.unwrap_or_default();
        let source = SourceSettings {
            url: source_file
                .url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            width: source_file.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            fps: source_file.fps.unwrap_or(DEFAULT_SOURCE_FPS),
            rotation: Rotation::from_degrees(
                source_file.rotation.unwrap_or(DEFAULT_SOURCE_ROTATION),
            )?,
            pixel_format: parse_or(source_file.pixel_format.as_deref(), PixelFormat::Nv21)?,
            facing: parse_or(source_file.facing.as_deref(), CameraFacing::Back)?,
            seed: source_file.seed,
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file.backend.filter(|name| !name.trim().is_empty()),
            min_face_px: detector_file.min_face_px.unwrap_or(DEFAULT_MIN_FACE_PX),
            timeout: detector_file
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_DETECT_TIMEOUT),
            throttle: detector_file
                .throttle_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_THROTTLE_INTERVAL),
        };

        let effect_file = file.effect.unwrap_or_default();
        let defaults = EffectSettings::default();
        let effect = EffectSettings {
            enabled: effect_file.enabled.unwrap_or(defaults.enabled),
            kind: parse_or(effect_file.kind.as_deref(), defaults.kind)?,
            intensity: match effect_file.intensity {
                Some(value) => Intensity::new(value)?,
                None => defaults.intensity,
            },
        };

        let display_file = file.display.unwrap_or_default();
        let display = DisplaySettings {
            width: display_file.width.unwrap_or(DEFAULT_DISPLAY_WIDTH),
            height: display_file.height.unwrap_or(DEFAULT_DISPLAY_HEIGHT),
            fit: parse_or(display_file.fit.as_deref(), FitMode::Contain)?,
        };

        let platform_file = file.platform.unwrap_or_default();
        let platform: Platform = parse_or(platform_file.profile.as_deref(), Platform::default())?;
        let mirror = parse_or(platform_file.mirror.as_deref(), platform.default_mirror())?;

        Ok(Self {
            source,
            detector,
            effect,
            display,
            platform,
            mirror,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("FACECLOAK_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(backend) = std::env::var("FACECLOAK_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = Some(backend.trim().to_string());
            }
        }
        if let Ok(profile) = std::env::var("FACECLOAK_PLATFORM") {
            if !profile.trim().is_empty() {
                self.platform = profile.parse()?;
                self.mirror = self.platform.default_mirror();
            }
        }
        if let Ok(mirror) = std::env::var("FACECLOAK_MIRROR") {
            if !mirror.trim().is_empty() {
                self.mirror = mirror.parse()?;
            }
        }
        if let Ok(throttle) = std::env::var("FACECLOAK_THROTTLE_MS") {
            let millis: u64 = throttle.trim().parse().map_err(|_| {
                anyhow!("FACECLOAK_THROTTLE_MS must be an integer number of milliseconds")
            })?;
            self.detector.throttle = Duration::from_millis(millis);
        }
        if let Ok(timeout) = std::env::var("FACECLOAK_TIMEOUT_MS") {
            let millis: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("FACECLOAK_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.detector.timeout = Duration::from_millis(millis);
        }
        if let Ok(intensity) = std::env::var("FACECLOAK_INTENSITY") {
            let value: u32 = intensity
                .trim()
                .parse()
                .map_err(|_| anyhow!("FACECLOAK_INTENSITY must be an integer"))?;
            self.effect.intensity = Intensity::new(value)?;
        }
        if let Ok(effect) = std::env::var("FACECLOAK_EFFECT") {
            match effect.trim().to_ascii_lowercase().as_str() {
                "" => {}
                "off" | "none" => self.effect.enabled = false,
                kind => {
                    self.effect.kind = kind.parse()?;
                    self.effect.enabled = true;
                }
            }
        }
        if let Ok(facing) = std::env::var("FACECLOAK_FACING") {
            if !facing.trim().is_empty() {
                self.source.facing = facing.parse()?;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be non-zero"));
        }
        if self.source.fps == 0 {
            return Err(anyhow!("source fps must be greater than zero"));
        }
        self.source
            .pixel_format
            .expected_len(self.source.width, self.source.height)?;

        let min_face = self.detector.min_face_px;
        if !min_face.is_finite() || min_face < DEFAULT_MIN_FACE_PX {
            return Err(anyhow!(
                "detector min_face_px must be at least {}",
                DEFAULT_MIN_FACE_PX
            ));
        }
        if self.detector.timeout.is_zero() {
            return Err(anyhow!("detector timeout must be greater than zero"));
        }

        if self.display.width == 0 || self.display.height == 0 {
            return Err(anyhow!("display dimensions must be non-zero"));
        }
        Ok(())
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            url: self.source.url.clone(),
            width: self.source.width,
            height: self.source.height,
            target_fps: self.source.fps,
            format: self.source.pixel_format,
            rotation: self.source.rotation,
            facing: self.source.facing,
            seed: self.source.seed,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            throttle: self.detector.throttle,
            adapter: AdapterConfig {
                timeout: self.detector.timeout,
                min_face_px: self.detector.min_face_px,
            },
            backend: self.detector.backend.clone(),
            mirror: self.mirror,
            fit: self.display.fit,
        }
    }

    pub fn screen_size(&self) -> Size {
        Size::from_pixels(self.display.width, self.display.height)
    }
}

fn read_config_file(path: &Path) -> Result<FacecloakConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg: FacecloakConfigFile = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_or<T>(value: Option<&str>, default: T) -> Result<T>
where
    T: FromStr<Err = anyhow::Error>,
{
    match value.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw.parse(),
        _ => Ok(default),
    }
}
