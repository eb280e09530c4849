//! Configuration system for Area Wallpaper
//!
//! Loads per-output background settings from a TOML file given on the command
//! line. Without a file, a single built-in `default` section is used (black,
//! no image, centered). Values are validated once at load time; the loaded
//! configuration is read-only afterwards.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::geometry::{PlacementMode, UnknownMode};

/// Name of the fallback section (compared case-insensitively)
pub const DEFAULT_SECTION: &str = "default";

/// Errors raised while loading configuration. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("output section with an empty name")]
    EmptyName,

    #[error("output '{output}': invalid color '{value}', expected #RRGGBB")]
    InvalidColor { output: String, value: String },

    #[error("output '{output}': {source}")]
    InvalidMode {
        output: String,
        #[source]
        source: UnknownMode,
    },
}

/// Background color, each channel in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };

    /// Parse a `#RRGGBB` string
    pub fn parse_hex(value: &str) -> Option<Self> {
        let hex = value.strip_prefix('#')?;
        if value.len() != 7 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }

        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .ok()
                .map(|v| f64::from(v) / 255.0)
        };

        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    /// Packed `0x00RRGGBB` value
    pub fn to_pixel(&self) -> u32 {
        let quantize = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u32;
        (quantize(self.r) << 16) | (quantize(self.g) << 8) | quantize(self.b)
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Resolved settings for one output
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    /// Output name this section applies to
    pub name: String,
    /// Image to draw, if any
    pub image: Option<PathBuf>,
    /// Placement mode for the image
    pub mode: PlacementMode,
    /// Color painted under (and around) the image
    pub color: Rgb,
}

impl OutputConfig {
    /// Built-in settings: black, no image, centered
    pub fn builtin() -> Self {
        Self {
            name: DEFAULT_SECTION.to_string(),
            image: None,
            mode: PlacementMode::Centered,
            color: Rgb::BLACK,
        }
    }

    pub fn is_default_section(&self) -> bool {
        self.name.eq_ignore_ascii_case(DEFAULT_SECTION)
    }
}

/// On-disk layout of the config file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    output: Vec<RawOutput>,
}

/// One `[[output]]` section as written by the user
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOutput {
    name: String,
    file: Option<String>,
    color: Option<String>,
    mode: Option<String>,
}

impl RawOutput {
    fn validate(self) -> Result<OutputConfig, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }

        let color = match self.color {
            Some(value) => Rgb::parse_hex(&value).ok_or_else(|| ConfigError::InvalidColor {
                output: self.name.clone(),
                value,
            })?,
            None => Rgb::BLACK,
        };

        let mode = match self.mode {
            Some(value) => value
                .parse::<PlacementMode>()
                .map_err(|source| ConfigError::InvalidMode {
                    output: self.name.clone(),
                    source,
                })?,
            None => PlacementMode::Centered,
        };

        Ok(OutputConfig {
            name: self.name,
            image: self.file.as_deref().map(expand_home),
            mode,
            color,
        })
    }
}

/// Expand a leading `~/` to the user's home directory
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Loaded configuration: output sections in file order
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub outputs: Vec<OutputConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            outputs: vec![OutputConfig::builtin()],
        }
    }
}

impl Config {
    /// Load the config file at `path`, or the built-in configuration when no
    /// path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given, using built-in defaults");
            return Ok(Self::default());
        };

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_toml_str(&content)?;
        info!(
            "Configuration loaded from {:?} ({} output sections)",
            path,
            config.outputs.len()
        );
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        let outputs = raw
            .output
            .into_iter()
            .map(RawOutput::validate)
            .collect::<Result<Vec<_>, _>>()?;

        for output in &outputs {
            debug!(
                "Output section '{}': mode={}, color=#{:06x}, file={:?}",
                output.name,
                output.mode,
                output.color.to_pixel(),
                output.image
            );
        }

        Ok(Self { outputs })
    }

    /// Settings for the output called `output_name`.
    ///
    /// First case-insensitive match wins. Otherwise the `default` section,
    /// wherever it appears in the file, and finally the built-in settings.
    pub fn resolve(&self, output_name: &str) -> OutputConfig {
        let mut fallback = None;

        for section in &self.outputs {
            if section.is_default_section() {
                fallback.get_or_insert(section);
            } else if section.name.eq_ignore_ascii_case(output_name) {
                return section.clone();
            }
        }

        fallback.cloned().unwrap_or_else(OutputConfig::builtin)
    }
}
