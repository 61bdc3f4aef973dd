//! Media probing via `ffprobe`.
//!
//! The compression engine only needs two numbers from a file: its duration
//! (to budget a video bitrate) and its frame rate (to start a GIF frame-rate
//! search). Both are read through the [`MediaProbe`] trait; [`FfprobeProbe`]
//! is the production backend.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Reads timing facts from a media file.
///
/// Returning `None` means "unknown"; callers substitute their configured
/// defaults. Probing never fails the surrounding operation.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Container duration in seconds.
    async fn duration_secs(&self, path: &Path) -> Option<f64>;

    /// Frame rate of the first video stream.
    async fn frame_rate(&self, path: &Path) -> Option<f64>;
}

/// A [`MediaProbe`] backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeProbe {
    /// Create a probe using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffprobe_path,
            timeout,
        }
    }

    /// Create a probe from a discovered registry, if ffprobe was found.
    pub fn from_registry(registry: &ToolRegistry) -> Option<Self> {
        registry
            .require("ffprobe")
            .ok()
            .map(|cfg| Self::new(cfg.path.clone(), cfg.timeout))
    }

    async fn query(&self, path: &Path, selector: &[&str]) -> Option<String> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.args(["-v", "error"])
            .args(selector.iter().copied())
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .path_arg(path)
            .timeout(self.timeout);

        match cmd.execute().await {
            Ok(out) => Some(out.stdout),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "ffprobe query failed");
                None
            }
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn duration_secs(&self, path: &Path) -> Option<f64> {
        let out = self
            .query(path, &["-show_entries", "format=duration"])
            .await?;
        parse_duration(&out)
    }

    async fn frame_rate(&self, path: &Path) -> Option<f64> {
        let out = self
            .query(
                path,
                &["-select_streams", "v:0", "-show_entries", "stream=r_frame_rate"],
            )
            .await?;
        parse_frame_rate(&out)
    }
}

/// A probe that knows nothing. Used when ffprobe is not installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProbe;

#[async_trait]
impl MediaProbe for NullProbe {
    async fn duration_secs(&self, _path: &Path) -> Option<f64> {
        None
    }

    async fn frame_rate(&self, _path: &Path) -> Option<f64> {
        None
    }
}

/// Parse ffprobe's `format=duration` output. `N/A` and non-positive values
/// are treated as unknown.
pub fn parse_duration(s: &str) -> Option<f64> {
    let value: f64 = s.lines().next()?.trim().parse().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Parse an `r_frame_rate` value such as `"30000/1001"` or `"12.5"`.
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let s = s.lines().next()?.trim();
    let fps = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}
