//! Application configuration.
//!
//! Settings are read from an optional TOML file. Every section and field has a
//! default, so an absent file or a partial file is valid:
//!
//! ```toml
//! [window]
//! width = 1024
//!
//! [gpu]
//! fence_timeout_ms = 2000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// File looked up in the working directory when no override is given.
pub const DEFAULT_CONFIG_PATH: &str = "fractal.toml";

/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_ENV_VAR: &str = "FRACTAL_CONFIG";

/// Deepest accepted subdivision; 3 * 3^10 vertices is already ~177k.
pub const MAX_FRACTAL_DEPTH: u32 = 10;

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub window: WindowConfig,
    pub shaders: ShaderConfig,
    pub gpu: GpuConfig,
    pub fractal: FractalConfig,
}

/// Window title and initial size.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Sierpinski".to_string(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

/// Paths of the two compiled SPIR-V stages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/simple_shader.vert.spv"),
            fragment: PathBuf::from("shaders/simple_shader.frag.spv"),
        }
    }
}

/// Device-level settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GpuConfig {
    /// Enable the Khronos validation layer when it is installed.
    pub validation: bool,
    /// Upper bound for every fence and acquire wait.
    pub fence_timeout_ms: u64,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            fence_timeout_ms: 5_000,
        }
    }
}

impl GpuConfig {
    /// The fence timeout as a [`Duration`].
    #[inline]
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }
}

/// Fractal generation parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FractalConfig {
    pub depth: u32,
}

impl Default for FractalConfig {
    fn default() -> Self {
        Self { depth: 6 }
    }
}

impl Config {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document is malformed, contains
    /// unknown keys or fails validation.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Config = toml::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration file at `path`, or the defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads from `$FRACTAL_CONFIG` if set, else from [`DEFAULT_CONFIG_PATH`].
    pub fn load_default_location() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load(&path)
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        if self.gpu.fence_timeout_ms == 0 {
            return Err(Error::Config(
                "gpu.fence_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.fractal.depth > MAX_FRACTAL_DEPTH {
            return Err(Error::Config(format!(
                "fractal.depth must be at most {}, got {}",
                MAX_FRACTAL_DEPTH, self.fractal.depth
            )));
        }

        Ok(())
    }
}
