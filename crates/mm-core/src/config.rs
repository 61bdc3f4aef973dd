//! Application configuration types.
//!
//! The top-level [`Config`] is deserialized from TOML. Every section defaults
//! sensibly so a completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Locations searched when no explicit config path is given.
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "./mediamill.toml",
    "./config.toml",
    "~/.config/mediamill/config.toml",
    "/etc/mediamill/config.toml",
];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub tools: ToolsConfig,
    pub compression: CompressionConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string and reject fatal problems.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str)
            .map_err(|e| Error::InvalidConfiguration(format!("config parse error: {e}")))?;
        config.check()?;
        Ok(config)
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.tools.image_tool_candidates.is_empty() {
            warnings.push(
                "tools.image_tool_candidates is empty; images use the in-process encoder only"
                    .into(),
            );
        }

        for (name, path) in self.tools.explicit_paths() {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!(
                        "tools.{name}_path {} does not exist; falling back to PATH",
                        p.display()
                    ));
                }
            }
        }

        if self.queue.concurrency > 64 {
            warnings.push(format!(
                "queue.concurrency {} is unusually high for process-bound work",
                self.queue.concurrency
            ));
        }

        let ratio = self.compression.good_enough_ratio;
        if ratio > 0.99 {
            warnings.push(format!(
                "compression.good_enough_ratio {ratio} leaves almost no early-exit window"
            ));
        }

        warnings
    }

    /// Fatal checks: values the queue or compressor cannot operate with.
    fn check(&self) -> Result<()> {
        if self.queue.concurrency < 1 {
            return Err(Error::InvalidConfiguration(
                "queue.concurrency must be a positive integer".into(),
            ));
        }
        if self.queue.max_pending == Some(0) {
            return Err(Error::InvalidConfiguration(
                "queue.max_pending must be at least 1 when set".into(),
            ));
        }
        if self.tools.timeout_secs == 0 {
            return Err(Error::InvalidConfiguration(
                "tools.timeout_secs must be greater than 0".into(),
            ));
        }

        let c = &self.compression;
        if !(c.good_enough_ratio > 0.0 && c.good_enough_ratio <= 1.0) {
            return Err(Error::InvalidConfiguration(
                "compression.good_enough_ratio must be in (0, 1]".into(),
            ));
        }
        if !(c.bitrate_headroom > 0.0 && c.bitrate_headroom <= 1.0) {
            return Err(Error::InvalidConfiguration(
                "compression.bitrate_headroom must be in (0, 1]".into(),
            ));
        }
        if c.quality_floor == 0 || c.quality_floor > 100 {
            return Err(Error::InvalidConfiguration(
                "compression.quality_floor must be between 1 and 100".into(),
            ));
        }
        if c.refine_step == 0 {
            return Err(Error::InvalidConfiguration(
                "compression.refine_step must be greater than 0".into(),
            ));
        }
        if c
            .image_probe_qualities
            .iter()
            .any(|&q| q == 0 || q > 100)
        {
            return Err(Error::InvalidConfiguration(
                "compression.image_probe_qualities must be between 1 and 100".into(),
            ));
        }
        if c.default_duration_secs <= 0.0 || c.default_gif_fps == 0 {
            return Err(Error::InvalidConfiguration(
                "compression defaults for duration and fps must be positive".into(),
            ));
        }

        Ok(())
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::InvalidConfiguration(format!("failed to read {}: {e}", path.display()))
    })?;
    Config::from_toml(&content)
}

/// Load config from the given path, or from the first default location that
/// exists, or fall back to defaults.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());
        if path.exists() {
            tracing::info!("Loading config from {}", path.display());
            return load_config(path);
        }
    }

    tracing::debug!("No config file found; using defaults");
    Ok(Config::default())
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Task queue sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of tasks running at once.
    pub concurrency: usize,
    /// Maximum number of tasks waiting for a slot. `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pending: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_pending: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Paths and limits for external tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffprobe_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magick_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub libreoffice_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sevenzip_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rar_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_path: Option<PathBuf>,

    /// Binaries tried in order for image conversion before the in-process
    /// encoder is used.
    pub image_tool_candidates: Vec<PathBuf>,

    /// Wall-clock limit for a single tool invocation.
    pub timeout_secs: u64,
}

impl ToolsConfig {
    /// Per-invocation timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The explicit path override for a registry tool name, if any.
    pub fn path_for(&self, tool: &str) -> Option<&Path> {
        match tool {
            "ffmpeg" => self.ffmpeg_path.as_deref(),
            "ffprobe" => self.ffprobe_path.as_deref(),
            "magick" => self.magick_path.as_deref(),
            "libreoffice" | "soffice" => self.libreoffice_path.as_deref(),
            "7z" => self.sevenzip_path.as_deref(),
            "rar" => self.rar_path.as_deref(),
            "zip" => self.zip_path.as_deref(),
            _ => None,
        }
    }

    fn explicit_paths(&self) -> [(&'static str, Option<&PathBuf>); 7] {
        [
            ("ffmpeg", self.ffmpeg_path.as_ref()),
            ("ffprobe", self.ffprobe_path.as_ref()),
            ("magick", self.magick_path.as_ref()),
            ("libreoffice", self.libreoffice_path.as_ref()),
            ("sevenzip", self.sevenzip_path.as_ref()),
            ("rar", self.rar_path.as_ref()),
            ("zip", self.zip_path.as_ref()),
        ]
    }
}

fn default_image_tool_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![
        PathBuf::from("magick"),
        PathBuf::from("/usr/bin/magick"),
        PathBuf::from("/usr/local/bin/magick"),
        PathBuf::from("convert"),
    ];
    if cfg!(windows) {
        candidates.extend([
            PathBuf::from("magick.exe"),
            PathBuf::from(r"C:\Program Files\ImageMagick-7.1.1-Q16\magick.exe"),
            PathBuf::from(r"C:\Program Files (x86)\ImageMagick-7.1.1-Q16\magick.exe"),
        ]);
    }
    candidates
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            magick_path: None,
            libreoffice_path: None,
            sevenzip_path: None,
            rar_path: None,
            zip_path: None,
            image_tool_candidates: default_image_tool_candidates(),
            timeout_secs: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// Compression
// ---------------------------------------------------------------------------

/// Tuning knobs for the size-targeted compression search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Coarse image qualities probed first, highest first.
    pub image_probe_qualities: Vec<u8>,
    /// Lowest image quality ever tried.
    pub quality_floor: u8,
    /// Granularity of the refinement pass between two coarse probes.
    pub refine_step: u8,
    /// A trial at or above `target * good_enough_ratio` (and within target)
    /// stops the search.
    pub good_enough_ratio: f64,
    /// Fraction of the byte budget handed to the video bitrate.
    pub bitrate_headroom: f64,
    /// Video bitrate never drops below this many kbps.
    pub min_video_bitrate_kbps: u32,
    /// Duration assumed when ffprobe cannot report one.
    pub default_duration_secs: f64,
    /// Frame rate assumed when ffprobe cannot report one for a GIF.
    pub default_gif_fps: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            image_probe_qualities: vec![90, 70, 50, 30, 10],
            quality_floor: 5,
            refine_step: 5,
            good_enough_ratio: 0.95,
            bitrate_headroom: 0.97,
            min_video_bitrate_kbps: 50,
            default_duration_secs: 10.0,
            default_gif_fps: 10,
        }
    }
}
