//! GIF trial encoder.
//!
//! Only the frame rate changes between trials. Each trial regenerates its
//! palette from the kept frames, so dimensions and colour depth match the
//! source.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use mm_core::{Error, Result};

use super::{format_fps, Knob, TrialEncoder};
use crate::tools::ToolRegistry;

/// ffmpeg filter graph that resamples to `fps` and re-palettizes.
pub fn gif_filter(fps: f64) -> String {
    format!(
        "fps={},split[s0][s1];[s0]palettegen=stats_mode=diff[p];[s1][p]paletteuse=dither=none",
        format_fps(fps)
    )
}

/// Re-encodes GIFs at a lower frame rate through ffmpeg.
#[derive(Debug, Clone)]
pub struct GifTrialEncoder {
    tools: Arc<ToolRegistry>,
}

impl GifTrialEncoder {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl TrialEncoder for GifTrialEncoder {
    async fn encode(&self, source: &Path, dest: &Path, knob: Knob) -> Result<()> {
        let Knob::Fps(fps) = knob else {
            return Err(Error::InvalidArgument(format!("GIF trials take a frame rate, got {knob}")));
        };

        let mut cmd = self.tools.command("ffmpeg")?;
        cmd.arg("-i")
            .path_arg(source)
            .arg("-vf")
            .arg(gif_filter(fps))
            .arg("-y")
            .path_arg(dest);
        cmd.execute().await?;
        Ok(())
    }
}
