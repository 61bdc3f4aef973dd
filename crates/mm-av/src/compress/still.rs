//! Still-image trial encoder.
//!
//! Each candidate ImageMagick binary is tried in turn; if none runs, the
//! `image` crate encodes in process (JPEG quality and maximum PNG
//! compression only; lossy WebP needs ImageMagick).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::DynamicImage;

use mm_core::{Error, Result};

use super::{Knob, TrialEncoder};
use crate::tools::ToolRegistry;

/// Encodes still-image trials at a given quality.
#[derive(Debug, Clone)]
pub struct ImageTrialEncoder {
    tools: Arc<ToolRegistry>,
    candidates: Vec<PathBuf>,
}

impl ImageTrialEncoder {
    pub fn new(tools: Arc<ToolRegistry>, candidates: Vec<PathBuf>) -> Self {
        Self { tools, candidates }
    }
}

fn extension(p: &Path) -> String {
    p.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// ImageMagick arguments for one quality trial.
pub fn magick_args(source: &Path, dest: &Path, quality: u8) -> Vec<String> {
    let q = quality.to_string();
    let mut args = vec![source.to_string_lossy().into_owned()];
    let mut dest_arg = dest.to_string_lossy().into_owned();

    match extension(dest).as_str() {
        "jpg" | "jpeg" => {
            args.extend(["-quality", q.as_str(), "-interlace", "Plane"].map(String::from));
        }
        "webp" => {
            args.extend(["-quality".to_string(), q.clone()]);
            args.extend(["-define".to_string(), format!("webp:alpha-quality={q}")]);
        }
        "png" => {
            args.extend(["-define", "png:compression-level=9"].map(String::from));
            if quality < 50 {
                dest_arg = format!("PNG8:{dest_arg}");
            }
        }
        _ => {
            args.extend(["-quality".to_string(), q.clone()]);
        }
    }

    args.push(dest_arg);
    args
}

fn encode_in_process(source: &Path, dest: &Path, quality: u8) -> Result<()> {
    let img = image::open(source).map_err(|e| Error::Internal(format!("failed to decode image: {e}")))?;
    let encode_err = |e: image::ImageError| Error::Internal(format!("failed to encode image: {e}"));
    let create = || -> Result<_> { Ok(std::io::BufWriter::new(std::fs::File::create(dest)?)) };

    match extension(dest).as_str() {
        "jpg" | "jpeg" => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(create()?, quality))
                .map_err(encode_err)
        }
        "png" => img
            .write_with_encoder(PngEncoder::new_with_quality(
                create()?,
                CompressionType::Best,
                FilterType::Adaptive,
            ))
            .map_err(encode_err),
        other => Err(Error::UnsupportedFormat(format!(
            "in-process compression of {other}"
        ))),
    }
}

#[async_trait]
impl TrialEncoder for ImageTrialEncoder {
    async fn encode(&self, source: &Path, dest: &Path, knob: Knob) -> Result<()> {
        let Knob::Quality(quality) = knob else {
            return Err(Error::InvalidArgument(format!("image trials take a quality, got {knob}")));
        };

        let mut last_error = None;
        for candidate in &self.candidates {
            let mut cmd = self.tools.command_for_path(candidate);
            cmd.args(magick_args(source, dest, quality));
            match cmd.execute().await {
                Ok(_) if dest.exists() => return Ok(()),
                Ok(_) => {}
                Err(e) => last_error = Some(e),
            }
        }
        if let Some(e) = last_error {
            tracing::debug!(error = %e, "No ImageMagick candidate ran; encoding in process");
        }

        let (src, dst) = (source.to_path_buf(), dest.to_path_buf());
        tokio::task::spawn_blocking(move || encode_in_process(&src, &dst, quality))
            .await
            .map_err(|e| Error::Internal(format!("image encoder task failed: {e}")))?
    }
}
