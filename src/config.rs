// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section is `#[serde(default)]`, so a missing file, a missing section
// or a missing key all fall back to the values below.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::shader::{FragmentSource, Toolchain};
use crate::specialization::SpecializationMode;

pub const DEFAULT_PATH: &str = "config.toml";

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub specialization: SpecializationConfig,
    pub shaders: ShaderConfig,
    pub texture: TextureConfig,
    pub output: OutputConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "SPIR-V Specialization".to_string(),
            width: 500,
            height: 500,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    /// Upper bound for a single fence wait; the wait is retried on timeout
    pub fence_timeout_ns: u64,
    /// How long the presented frame stays on screen before teardown
    pub present_hold_ms: u64,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.2, 0.2, 0.2, 0.2],
            fence_timeout_ns: 100_000_000,
            present_hold_ms: 1000,
        }
    }
}

/// Which constants the fragment shader is specialized with
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SpecializationConfig {
    pub mode: SpecializationMode,
    pub draw_user_color: bool,
    pub user_color: [f32; 3],
}

impl Default for SpecializationConfig {
    fn default() -> Self {
        Self {
            mode: SpecializationMode::default(),
            draw_user_color: true,
            user_color: [0.0, 0.0, 1.0],
        }
    }
}

/// Shader acquisition
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub fragment_source: FragmentSource,
    pub toolchain: Toolchain,
    pub glslc: String,
    pub spirv_as: String,
    /// Check the specialization block against the SpecIds in the module
    pub verify_spec_ids: bool,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            fragment_source: FragmentSource::default(),
            toolchain: Toolchain::default(),
            glslc: "glslc".to_string(),
            spirv_as: "spirv-as".to_string(),
            verify_spec_ids: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TextureConfig {
    pub path: Option<PathBuf>,
    pub size: u32,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self { path: None, size: 256 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub save_images: bool,
    pub image_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_images: false,
            image_name: "spirv_specialization".to_string(),
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
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "spirv_specialization.log".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults on any error.
    ///
    /// Runs before the logger exists, so the error is handed back for the
    /// caller to report.
    pub fn load(path: &Path) -> (Self, Option<anyhow::Error>) {
        match Self::load_from_path(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    }

    /// Load configuration from a specific path; a missing file is not an error
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validation layers are a debug-build facility
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }

    /// Get present mode as Vulkan enum
    pub fn get_present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.width, 500);
        assert_eq!(config.window.height, 500);
        assert_eq!(config.graphics.clear_color, [0.2; 4]);
        assert_eq!(config.graphics.fence_timeout_ns, 100_000_000);
        assert_eq!(config.specialization.mode, SpecializationMode::FullColor);
        assert!(config.specialization.draw_user_color);
        assert_eq!(config.specialization.user_color, [0.0, 0.0, 1.0]);
        assert_eq!(config.shaders.fragment_source, FragmentSource::Assembly);
        assert_eq!(config.shaders.toolchain, Toolchain::External);
        assert!(config.shaders.verify_spec_ids);
        assert!(config.texture.path.is_none());
        assert!(!config.output.save_images);
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [specialization]
            mode = "flag_only"
            draw_user_color = false

            [shaders]
            fragment_source = "glsl"
            glslc = "/opt/vulkan/bin/glslc"

            [texture]
            path = "lunarg.ppm"
            "#,
        )
        .unwrap();

        assert_eq!(config.specialization.mode, SpecializationMode::FlagOnly);
        assert!(!config.specialization.draw_user_color);
        assert_eq!(config.specialization.user_color, [0.0, 0.0, 1.0]);
        assert_eq!(config.shaders.fragment_source, FragmentSource::Glsl);
        assert_eq!(config.shaders.glslc, "/opt/vulkan/bin/glslc");
        assert_eq!(config.shaders.spirv_as, "spirv-as");
        assert_eq!(config.texture.path.as_deref(), Some(Path::new("lunarg.ppm")));
        assert_eq!(config.texture.size, 256);
        assert_eq!(config.window.title, "SPIR-V Specialization");
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        assert!(Config::parse("[specialization]\nmode = \"rainbow\"\n").is_err());
    }

    #[test]
    fn present_mode_names() {
        let mut config = Config::default();
        config.graphics.present_mode = "Mailbox".to_string();
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::MAILBOX);
        config.graphics.present_mode = "bogus".to_string();
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.output.image_name, "spirv_specialization");

        let (_, error) = Config::load(Path::new("does/not/exist.toml"));
        assert!(error.is_none());
    }

    #[test]
    fn bad_file_falls_back_and_returns_the_error() {
        let path = std::env::temp_dir().join(format!("spirv_spec_bad_{}.toml", std::process::id()));
        std::fs::write(&path, "[specialization]\nmode = \"flag_onyl\"\n").unwrap();

        let (config, error) = Config::load(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.specialization.mode, SpecializationMode::FullColor);
        let message = format!("{:#}", error.expect("parse failure must be reported"));
        assert!(message.contains("Failed to parse config file"), "{}", message);
        assert!(message.contains("flag_onyl"), "{}", message);
    }
}
