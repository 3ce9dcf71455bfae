// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every field has a default, so a partial (or missing) config file is fine.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub assets: AssetsConfig,
    pub scene: SceneConfig,
    pub controls: ControlsConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan".to_string(),
            width: 800,
            height: 600,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Preferred present mode; FIFO is used when the surface lacks it
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_frames_in_flight: 2,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "cloth_sim.log".to_string(),
            show_fps: true,
        }
    }
}

/// Locations of the shader and texture assets
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub texture: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            vertex_shader: PathBuf::from("shaders/vert.spv"),
            fragment_shader: PathBuf::from("shaders/frag.spv"),
            texture: PathBuf::from("assets/textures/texture.png"),
        }
    }
}

/// Camera and animation parameters fed into the uniform buffer
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Model rotation about +Z, degrees per second
    pub rotation_speed_deg: f32,
    pub camera_eye: [f32; 3],
    pub fov_y_deg: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            rotation_speed_deg: 90.0,
            camera_eye: [2.0, 2.0, 2.0],
            fov_y_deg: 45.0,
            near: 0.1,
            far: 10.0,
        }
    }
}

/// Control key bindings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub fullscreen_key: String,
    pub quit_key: String,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            fullscreen_key: "F11".to_string(),
            quit_key: "Escape".to_string(),
        }
    }
}

pub const CONFIG_PATH: &str = "config.toml";

/// Where the active configuration came from.
///
/// Loading happens before the logger exists, so the outcome is kept and
/// reported through `log` once logging is up.
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file at the path
    Defaults(PathBuf),
    /// The file exists but could not be read or parsed
    Fallback(anyhow::Error),
}

impl ConfigSource {
    pub fn level(&self) -> log::Level {
        match self {
            ConfigSource::File(_) | ConfigSource::Defaults(_) => log::Level::Info,
            ConfigSource::Fallback(_) => log::Level::Warn,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ConfigSource::File(path) => format!("Loaded configuration from {:?}", path),
            ConfigSource::Defaults(path) => {
                format!("Config file not found at {:?}, using defaults", path)
            }
            ConfigSource::Fallback(e) => format!("{:#}. Using defaults.", e),
        }
    }

    pub fn log(&self) {
        log::log!(self.level(), "{}", self.message());
    }
}

impl Config {
    /// Load `config.toml`, falling back to defaults if it is missing or broken
    pub fn load() -> (Self, ConfigSource) {
        Self::load_or_default(CONFIG_PATH)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, ConfigSource) {
        let path = path.as_ref();

        if !path.exists() {
            return (Config::default(), ConfigSource::Defaults(path.to_path_buf()));
        }

        match Self::load_from_path(path) {
            Ok(config) => (config, ConfigSource::File(path.to_path_buf())),
            Err(e) => (Config::default(), ConfigSource::Fallback(e)),
        }
    }

    /// Load configuration from a specific path; a missing file gives defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Preferred present mode as Vulkan enum
    pub fn get_present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::MAILBOX
            }
        }
    }

    /// Number of frames the CPU may prepare ahead of the GPU (at least one)
    pub fn frames_in_flight(&self) -> usize {
        self.graphics.max_frames_in_flight.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn test_defaults_match_tutorial_setup() {
        let config = Config::default();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.scene.camera_eye, [2.0, 2.0, 2.0]);
        assert_eq!(config.assets.vertex_shader, PathBuf::from("shaders/vert.spv"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::parse(
            r#"
            [window]
            title = "Cloth"

            [scene]
            rotation_speed_deg = 45.0
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Cloth");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.scene.rotation_speed_deg, 45.0);
        assert_eq!(config.scene.far, 10.0);
        assert!(config.debug.validation_layers);
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.graphics.present_mode, "mailbox");
        assert_eq!(config.controls.quit_key, "Escape");
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        assert!(Config::parse("[window\nwidth = ").is_err());
        assert!(Config::parse("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load_from_path("does/not/exist/config.toml").unwrap();
        assert_eq!(config.window.height, 600);
    }

    #[test]
    fn test_broken_file_warns_and_uses_defaults() {
        let path = std::env::temp_dir().join(format!("broken_config_{}.toml", std::process::id()));
        std::fs::write(&path, "[window\nwidth = ").unwrap();

        let (config, source) = Config::load_or_default(&path);
        let _ = std::fs::remove_file(&path);

        assert!(matches!(source, ConfigSource::Fallback(_)));
        assert_eq!(source.level(), log::Level::Warn);
        assert!(source.message().contains("Failed to parse config file"));
        assert!(source.message().ends_with("Using defaults."));
        assert_eq!(config.window.width, 800);
    }

    #[test]
    fn test_missing_file_is_reported_at_info() {
        let (_, source) = Config::load_or_default("does/not/exist/config.toml");
        assert!(matches!(source, ConfigSource::Defaults(_)));
        assert_eq!(source.level(), log::Level::Info);
    }

    #[test]
    fn test_readable_file_is_used() {
        let path = std::env::temp_dir().join(format!("good_config_{}.toml", std::process::id()));
        std::fs::write(&path, "[window]\nwidth = 1024\n").unwrap();

        let (config, source) = Config::load_or_default(&path);
        let _ = std::fs::remove_file(&path);

        assert!(matches!(source, ConfigSource::File(_)));
        assert_eq!(config.window.width, 1024);
    }

    #[test]
    fn test_present_mode_parsing() {
        let mut config = Config::default();
        for (name, mode) in [
            ("immediate", vk::PresentModeKHR::IMMEDIATE),
            ("MAILBOX", vk::PresentModeKHR::MAILBOX),
            ("fifo", vk::PresentModeKHR::FIFO),
            ("fifo_relaxed", vk::PresentModeKHR::FIFO_RELAXED),
            ("vsync-ish", vk::PresentModeKHR::MAILBOX),
        ] {
            config.graphics.present_mode = name.to_string();
            assert_eq!(config.get_present_mode(), mode, "{}", name);
        }
    }

    #[test]
    fn test_frames_in_flight_never_zero() {
        let mut config = Config::default();
        config.graphics.max_frames_in_flight = 0;
        assert_eq!(config.frames_in_flight(), 1);
        config.graphics.max_frames_in_flight = 3;
        assert_eq!(config.frames_in_flight(), 3);
    }
}
