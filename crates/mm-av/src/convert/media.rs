//! Video and audio conversion through ffmpeg.
//!
//! Argument construction is split out into pure functions so the codec and
//! CRF choices can be checked without running ffmpeg.

use std::path::Path;

use mm_core::Result;

use super::{ensure_output, stage_error, ConversionOptions, Converter};

/// Map quality 1..=100 onto VP9's CRF scale (63 worst, ~10 best).
pub fn vp9_crf(quality: u8) -> u32 {
    (63.0 - f64::from(quality) * 0.53).round() as u32
}

/// Map quality 1..=100 onto H.264's CRF scale (51 worst, ~10 best).
pub fn h264_crf(quality: u8) -> u32 {
    (51.0 - f64::from(quality) * 0.41).round() as u32
}

fn lossy(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

/// ffmpeg arguments for turning an animated GIF into a video.
pub fn gif_to_video_args(
    input: &Path,
    output: &Path,
    ext: &str,
    options: &ConversionOptions,
) -> Vec<String> {
    let mut args = vec!["-i".to_string(), lossy(input)];

    match ext {
        "webm" => {
            let crf = options.quality.map(vp9_crf).unwrap_or(30).to_string();
            args.extend(
                [
                    "-c:v",
                    "libvpx-vp9",
                    "-crf",
                    crf.as_str(),
                    "-b:v",
                    "0",
                    "-pix_fmt",
                    "yuva420p",
                ]
                .map(String::from),
            );
        }
        "mp4" => {
            args.extend(
                [
                    "-movflags",
                    "faststart",
                    "-pix_fmt",
                    "yuv420p",
                    "-vf",
                    "scale=trunc(iw/2)*2:trunc(ih/2)*2",
                ]
                .map(String::from),
            );
            if let Some(q) = options.quality {
                args.push("-crf".into());
                args.push(h264_crf(q).to_string());
            }
        }
        _ => {}
    }

    // An explicit bitrate overrides the constant-quality "-b:v 0" above.
    if let Some(ref b) = options.bitrate {
        args.push("-b:v".into());
        args.push(b.clone());
    }
    args.push("-y".into());
    args.push(lossy(output));
    args
}

/// ffmpeg arguments for a generic video transcode.
pub fn video_args(input: &Path, output: &Path, options: &ConversionOptions) -> Vec<String> {
    let mut args = vec!["-i".to_string(), lossy(input)];
    if let Some(ref b) = options.bitrate {
        args.push("-b:v".into());
        args.push(b.clone());
    }
    args.push("-y".into());
    args.push(lossy(output));
    args
}

/// ffmpeg arguments for an audio transcode.
pub fn audio_args(input: &Path, output: &Path, options: &ConversionOptions) -> Vec<String> {
    let mut args = vec!["-i".to_string(), lossy(input)];
    if let Some(ref b) = options.bitrate {
        args.push("-b:a".into());
        args.push(b.clone());
    }
    args.push("-y".into());
    args.push(lossy(output));
    args
}

fn is_gif(input: &Path) -> bool {
    input
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("gif"))
}

async fn run_ffmpeg(conv: &Converter, args: Vec<String>, output: &Path) -> Result<()> {
    let mut cmd = conv.tools.command("ffmpeg")?;
    cmd.args(args);
    cmd.execute().await?;
    ensure_output(output)
}

pub(super) async fn convert_video(
    conv: &Converter,
    input: &Path,
    output: &Path,
    ext: &str,
    options: &ConversionOptions,
) -> Result<()> {
    if is_gif(input) {
        tracing::debug!(format = ext, "Converting GIF to video");
        let args = gif_to_video_args(input, output, ext, options);
        return run_ffmpeg(conv, args, output)
            .await
            .map_err(|e| stage_error("GIF to video conversion", "ensure ffmpeg is installed", e));
    }

    run_ffmpeg(conv, video_args(input, output, options), output)
        .await
        .map_err(|e| stage_error("Video conversion", "ensure ffmpeg is installed", e))
}

pub(super) async fn convert_audio(
    conv: &Converter,
    input: &Path,
    output: &Path,
    options: &ConversionOptions,
) -> Result<()> {
    run_ffmpeg(conv, audio_args(input, output, options), output)
        .await
        .map_err(|e| stage_error("Audio conversion", "ensure ffmpeg is installed", e))
}
