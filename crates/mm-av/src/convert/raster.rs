//! Image conversion through ImageMagick, with an in-process fallback.

use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};

use mm_core::{Error, Result};

use super::{ensure_output, stage_error, ConversionOptions, Converter};

const STAGE: &str = "Image conversion";
const HINT: &str = "ensure ImageMagick is installed";

/// Formats the in-process encoder can write.
const FALLBACK_FORMATS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tiff", "gif"];

pub(super) async fn convert(
    conv: &Converter,
    input: &Path,
    output: &Path,
    ext: &str,
    options: &ConversionOptions,
) -> Result<()> {
    let mut last_error: Option<Error> = None;

    for candidate in &conv.image_candidates {
        let mut cmd = conv.tools.command_for_path(candidate);
        cmd.path_arg(input);
        if let Some(q) = options.quality {
            cmd.args(["-quality".to_string(), q.to_string()]);
        }
        cmd.path_arg(output);

        match cmd.execute().await.and_then(|_| ensure_output(output)) {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::debug!(tool = %candidate.display(), error = %e, "Image tool candidate failed");
                let _ = std::fs::remove_file(output);
                last_error = Some(e);
            }
        }
    }

    if FALLBACK_FORMATS.contains(&ext) {
        tracing::info!(format = ext, "Using in-process encoder for image conversion");
        let (src, dst, fmt) = (input.to_path_buf(), output.to_path_buf(), ext.to_string());
        let quality = options.quality;
        let encoded = tokio::task::spawn_blocking(move || encode_in_process(&src, &dst, &fmt, quality))
            .await
            .map_err(|e| Error::Internal(format!("image encoder task failed: {e}")))
            .and_then(|r| r);
        match encoded {
            Ok(()) => return ensure_output(output).map_err(|e| stage_error(STAGE, HINT, e)),
            Err(e) => {
                tracing::warn!(error = %e, "In-process image encoder failed");
                last_error = Some(e);
            }
        }
    }

    let cause = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "command not found".to_string());
    Err(stage_error(STAGE, HINT, cause))
}

/// Decode `src` and re-encode it as `ext` with the `image` crate.
pub(crate) fn encode_in_process(src: &Path, dst: &Path, ext: &str, quality: Option<u8>) -> Result<()> {
    let img = image::open(src).map_err(|e| Error::Internal(format!("failed to decode image: {e}")))?;
    let encode_err = |e: image::ImageError| Error::Internal(format!("failed to encode image: {e}"));

    match ext {
        "jpg" | "jpeg" => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let file = std::fs::File::create(dst)?;
            let mut writer = std::io::BufWriter::new(file);
            let encoder = JpegEncoder::new_with_quality(&mut writer, quality.unwrap_or(80));
            rgb.write_with_encoder(encoder).map_err(encode_err)?;
        }
        other => {
            let format = ImageFormat::from_extension(other)
                .ok_or_else(|| Error::UnsupportedFormat(other.to_string()))?;
            img.save_with_format(dst, format).map_err(encode_err)?;
        }
    }
    Ok(())
}
