//! Video trial encoder and bitrate budgeting.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use mm_core::{Error, Result};

use super::{Knob, TrialEncoder};
use crate::tools::ToolRegistry;

/// Video bitrate (kbps) that spends `headroom` of `target_bytes` over
/// `duration_secs`, never below `min_kbps`.
pub fn target_bitrate_kbps(target_bytes: u64, duration_secs: f64, headroom: f64, min_kbps: u32) -> u32 {
    let duration = if duration_secs > 0.0 { duration_secs } else { 1.0 };
    let kbps = (target_bytes as f64 * 8.0 * headroom / duration / 1000.0).floor();
    if kbps < f64::from(min_kbps) {
        tracing::debug!(computed = kbps, min_kbps, "Bitrate below minimum; clamping");
        min_kbps
    } else {
        kbps.min(f64::from(u32::MAX)) as u32
    }
}

/// ffmpeg output arguments for a bitrate-capped, audio-less re-encode.
pub fn video_bitrate_args(ext: &str, kbps: u32) -> Vec<String> {
    let rate = |factor: f64| format!("{}k", f64::from(kbps) * factor);
    let bitrate = format!("{kbps}k");

    match ext {
        "webm" => vec![
            "-c:v".into(),
            "libvpx-vp9".into(),
            "-b:v".into(),
            bitrate,
            "-maxrate".into(),
            rate(1.5),
            "-bufsize".into(),
            rate(2.0),
            "-crf".into(),
            "35".into(),
            "-pix_fmt".into(),
            "yuva420p".into(),
            "-an".into(),
        ],
        "mp4" => vec![
            "-c:v".into(),
            "libx264".into(),
            "-b:v".into(),
            bitrate,
            "-maxrate".into(),
            rate(1.5),
            "-bufsize".into(),
            rate(2.0),
            "-preset".into(),
            "slow".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-movflags".into(),
            "faststart".into(),
            "-an".into(),
        ],
        _ => vec![
            "-b:v".into(),
            bitrate,
            "-maxrate".into(),
            rate(1.5),
            "-bufsize".into(),
            rate(2.0),
            "-an".into(),
        ],
    }
}

/// Single-pass bitrate-targeted re-encode through ffmpeg.
#[derive(Debug, Clone)]
pub struct VideoTrialEncoder {
    tools: Arc<ToolRegistry>,
}

impl VideoTrialEncoder {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl TrialEncoder for VideoTrialEncoder {
    async fn encode(&self, source: &Path, dest: &Path, knob: Knob) -> Result<()> {
        let Knob::BitrateKbps(kbps) = knob else {
            return Err(Error::InvalidArgument(format!("video trials take a bitrate, got {knob}")));
        };
        let ext = dest
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let mut cmd = self.tools.command("ffmpeg")?;
        cmd.arg("-i")
            .path_arg(source)
            .arg("-y")
            .args(video_bitrate_args(&ext, kbps))
            .path_arg(dest);
        cmd.execute().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_formula() {
        // 2 MB over 30s with 3% headroom.
        assert_eq!(target_bitrate_kbps(2_000_000, 30.0, 0.97, 50), 517);
        assert_eq!(target_bitrate_kbps(1_000_000, 20.0, 0.97, 50), 388);
    }

    #[test]
    fn bitrate_has_floor() {
        assert_eq!(target_bitrate_kbps(10_000, 60.0, 0.97, 50), 50);
        assert_eq!(target_bitrate_kbps(0, 10.0, 0.97, 50), 50);
    }

    #[test]
    fn zero_duration_does_not_divide_by_zero() {
        assert_eq!(target_bitrate_kbps(100_000, 0.0, 1.0, 50), 800);
    }

    #[test]
    fn webm_uses_vp9_with_caps() {
        let args = video_bitrate_args("webm", 101);
        assert_eq!(
            args,
            [
                "-c:v", "libvpx-vp9", "-b:v", "101k", "-maxrate", "151.5k", "-bufsize", "202k",
                "-crf", "35", "-pix_fmt", "yuva420p", "-an"
            ]
        );
    }

    #[test]
    fn mp4_uses_x264_slow_faststart() {
        let args = video_bitrate_args("mp4", 400);
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-maxrate", "600k"]));
        assert!(args.windows(2).any(|w| w == ["-preset", "slow"]));
        assert!(args.windows(2).any(|w| w == ["-movflags", "faststart"]));
        assert_eq!(args.last().unwrap(), "-an");
    }

    #[test]
    fn other_containers_get_plain_bitrate() {
        let args = video_bitrate_args("mkv", 300);
        assert_eq!(args[..2], ["-b:v", "300k"]);
        assert!(!args.contains(&"-c:v".to_string()));
    }
}
