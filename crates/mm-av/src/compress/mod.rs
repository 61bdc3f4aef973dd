//! Size-targeted compression.
//!
//! [`Compressor::compress_to_target_size`] re-encodes a file that exceeds a
//! byte budget, searching one encoder knob per kind: quality for still
//! images, frame rate for GIFs and a computed bitrate for video. Each trial
//! is written to a [`TrialWorkspace`]; the best one replaces the original.
//!
//! Compression is best-effort. Tool failures never surface as errors; they
//! produce an outcome with `degraded` set and the original left untouched.

mod gif;
mod still;
pub mod search;
mod video;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use mm_core::config::CompressionConfig;
use mm_core::Result;

use crate::probe::{FfprobeProbe, MediaProbe, NullProbe};
use crate::tools::ToolRegistry;
use crate::workspace::TrialWorkspace;

/// Highest source frame rate the GIF ladder starts from.
pub const MAX_GIF_FPS: u32 = 60;

pub use self::gif::{gif_filter, GifTrialEncoder};
pub use self::still::ImageTrialEncoder;
pub use self::video::{target_bitrate_kbps, VideoTrialEncoder};
pub use search::{Trial, TrialSelector};

/// What kind of search a file gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    Image,
    Gif,
    Video,
}

impl CompressionKind {
    /// Classify a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "webp" => Some(Self::Image),
            "gif" => Some(Self::Gif),
            "mp4" | "webm" | "mkv" | "avi" | "mov" => Some(Self::Video),
            _ => None,
        }
    }

    /// Classify a path by its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Image => "image",
            Self::Gif => "gif",
            Self::Video => "video",
        })
    }
}

/// The single encoder parameter a trial varies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "knob", content = "value", rename_all = "snake_case")]
pub enum Knob {
    /// Encoder quality, 1..=100.
    Quality(u8),
    /// Output frame rate.
    Fps(f64),
    /// Video bitrate in kbps.
    BitrateKbps(u32),
}

impl Knob {
    /// Short label used in trial file names.
    pub fn label(&self) -> String {
        match self {
            Knob::Quality(q) => format!("q{q}"),
            Knob::Fps(f) => format!("fps{}", format_fps(*f)),
            Knob::BitrateKbps(b) => format!("b{b}k"),
        }
    }
}

impl fmt::Display for Knob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Knob::Quality(q) => write!(f, "quality {q}"),
            Knob::Fps(v) => write!(f, "{} fps", format_fps(*v)),
            Knob::BitrateKbps(b) => write!(f, "{b}k"),
        }
    }
}

/// Render a frame rate without a trailing `.0` for whole numbers.
pub(crate) fn format_fps(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{fps:.0}")
    } else {
        format!("{fps}")
    }
}

/// Produces one trial file from a source at a given knob setting.
///
/// Implementations read the output format from `dest`'s extension, which
/// always matches the source's.
#[async_trait]
pub trait TrialEncoder: Send + Sync {
    async fn encode(&self, source: &Path, dest: &Path, knob: Knob) -> Result<()>;
}

/// Result of a compression call.
#[derive(Debug, Clone, Serialize)]
pub struct CompressionOutcome {
    /// Path holding the result. Always the input path.
    pub path: PathBuf,
    pub original_size: u64,
    pub final_size: u64,
    /// Number of trial encodes attempted.
    pub trials: usize,
    /// The original was kept because compression could not run or could
    /// not produce anything smaller.
    pub degraded: bool,
    /// Human-readable note for degraded or over-target results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl CompressionOutcome {
    fn unchanged(path: &Path, size: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            original_size: size,
            final_size: size,
            trials: 0,
            degraded: false,
            warning: None,
        }
    }

    fn degraded(path: &Path, size: u64, trials: usize, warning: String) -> Self {
        tracing::warn!(path = %path.display(), %warning, "Compression degraded; keeping original");
        Self {
            path: path.to_path_buf(),
            original_size: size,
            final_size: size,
            trials,
            degraded: true,
            warning: Some(warning),
        }
    }

    /// Whether the result fits the budget it was compressed for.
    pub fn within(&self, target: u64) -> bool {
        self.final_size <= target
    }
}

/// Runs size-targeted searches.
#[derive(Clone)]
pub struct Compressor {
    config: CompressionConfig,
    image: Arc<dyn TrialEncoder>,
    gif: Arc<dyn TrialEncoder>,
    video: Arc<dyn TrialEncoder>,
    probe: Arc<dyn MediaProbe>,
}

impl fmt::Debug for Compressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compressor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Compressor {
    /// Production compressor: ImageMagick (with in-process fallback) for
    /// images, ffmpeg for GIF and video, ffprobe for probing.
    pub fn new(
        tools: Arc<ToolRegistry>,
        image_candidates: Vec<PathBuf>,
        config: CompressionConfig,
    ) -> Self {
        let probe: Arc<dyn MediaProbe> = match FfprobeProbe::from_registry(&tools) {
            Some(p) => Arc::new(p),
            None => Arc::new(NullProbe),
        };
        Self {
            config,
            image: Arc::new(ImageTrialEncoder::new(tools.clone(), image_candidates)),
            gif: Arc::new(GifTrialEncoder::new(tools.clone())),
            video: Arc::new(VideoTrialEncoder::new(tools)),
            probe,
        }
    }

    /// Replace the still-image encoder.
    pub fn with_image_encoder(mut self, encoder: Arc<dyn TrialEncoder>) -> Self {
        self.image = encoder;
        self
    }

    /// Replace the GIF encoder.
    pub fn with_gif_encoder(mut self, encoder: Arc<dyn TrialEncoder>) -> Self {
        self.gif = encoder;
        self
    }

    /// Replace the video encoder.
    pub fn with_video_encoder(mut self, encoder: Arc<dyn TrialEncoder>) -> Self {
        self.video = encoder;
        self
    }

    /// Replace the media probe.
    pub fn with_probe(mut self, probe: Arc<dyn MediaProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Bring `path` as close as possible to `target` bytes without going
    /// over, replacing it in place.
    ///
    /// Files already within budget are returned untouched with zero trials.
    ///
    /// # Errors
    ///
    /// Only when `path` cannot be read. Every other failure yields a
    /// degraded outcome with the original intact.
    pub async fn compress_to_target_size(
        &self,
        path: &Path,
        target: u64,
        kind: CompressionKind,
    ) -> Result<CompressionOutcome> {
        let original_size = std::fs::metadata(path)?.len();

        if original_size <= target {
            tracing::debug!(
                path = %path.display(),
                size = original_size,
                target,
                "Already within target; nothing to do"
            );
            return Ok(CompressionOutcome::unchanged(path, original_size));
        }

        tracing::info!(
            path = %path.display(),
            %kind,
            size = original_size,
            target,
            "Compressing to target size"
        );

        let ws = match TrialWorkspace::new(path) {
            Ok(ws) => ws,
            Err(e) => {
                return Ok(CompressionOutcome::degraded(
                    path,
                    original_size,
                    0,
                    e.to_string(),
                ))
            }
        };

        let encoder: &dyn TrialEncoder = match kind {
            CompressionKind::Image => self.image.as_ref(),
            CompressionKind::Gif => self.gif.as_ref(),
            CompressionKind::Video => self.video.as_ref(),
        };
        let mut runner = search::TrialRunner::new(
            encoder,
            path,
            &ws,
            TrialSelector::new(target, self.config.good_enough_ratio),
        );

        match kind {
            CompressionKind::Image => {
                search::search_quality(
                    &mut runner,
                    &self.config.image_probe_qualities,
                    self.config.quality_floor,
                    self.config.refine_step,
                )
                .await
            }
            CompressionKind::Gif => {
                let fps = self
                    .probe
                    .frame_rate(path)
                    .await
                    .map(|f| f.round().min(f64::from(MAX_GIF_FPS)) as u32)
                    .filter(|f| *f >= 1)
                    .unwrap_or(self.config.default_gif_fps)
                    .min(MAX_GIF_FPS);
                tracing::debug!(fps, "Source frame rate");
                search::search_fps(&mut runner, fps).await
            }
            CompressionKind::Video => {
                let duration = self
                    .probe
                    .duration_secs(path)
                    .await
                    .unwrap_or(self.config.default_duration_secs);
                let kbps = target_bitrate_kbps(
                    target,
                    duration,
                    self.config.bitrate_headroom,
                    self.config.min_video_bitrate_kbps,
                );
                tracing::debug!(duration, kbps, "Video bitrate budget");
                runner.run(Knob::BitrateKbps(kbps)).await;
            }
        }

        let trials = runner.attempts();
        let last_error = runner.last_error().map(str::to_string);
        let Some(best) = runner.into_best() else {
            let warning = match last_error {
                Some(e) => format!("every compression trial failed: {e}"),
                None => "no compression trial was run".to_string(),
            };
            return Ok(CompressionOutcome::degraded(path, original_size, trials, warning));
        };

        if best.size >= original_size {
            ws.discard(&best.path);
            return Ok(CompressionOutcome::degraded(
                path,
                original_size,
                trials,
                format!(
                    "best trial ({}, {} bytes) is not smaller than the original",
                    best.knob, best.size
                ),
            ));
        }

        let final_size = best.size;
        let knob = best.knob;
        if let Err(e) = ws.promote(&best.path) {
            return Ok(CompressionOutcome::degraded(
                path,
                original_size,
                trials,
                format!("failed to replace original: {e}"),
            ));
        }

        let warning = (final_size > target).then(|| {
            format!("could not reach target {target} bytes; smallest achievable is {final_size} bytes")
        });
        tracing::info!(
            path = %path.display(),
            %knob,
            size = final_size,
            target,
            trials,
            "Compression finished"
        );

        Ok(CompressionOutcome {
            path: path.to_path_buf(),
            original_size,
            final_size,
            trials,
            degraded: false,
            warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Writes `size_for(knob)` bytes, or fails when it returns `None`.
    struct FakeEncoder<F> {
        size_for: F,
        calls: Mutex<Vec<Knob>>,
    }

    impl<F> FakeEncoder<F>
    where
        F: Fn(Knob) -> Option<usize> + Send + Sync,
    {
        fn new(size_for: F) -> Arc<Self> {
            Arc::new(Self {
                size_for,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Knob> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl<F> TrialEncoder for FakeEncoder<F>
    where
        F: Fn(Knob) -> Option<usize> + Send + Sync,
    {
        async fn encode(&self, _source: &Path, dest: &Path, knob: Knob) -> Result<()> {
            self.calls.lock().unwrap().push(knob);
            match (self.size_for)(knob) {
                Some(n) => {
                    std::fs::write(dest, vec![0u8; n])?;
                    Ok(())
                }
                None => Err(mm_core::Error::Internal("encoder exploded".into())),
            }
        }
    }

    struct FixedProbe {
        duration: Option<f64>,
        fps: Option<f64>,
    }

    #[async_trait]
    impl MediaProbe for FixedProbe {
        async fn duration_secs(&self, _path: &Path) -> Option<f64> {
            self.duration
        }
        async fn frame_rate(&self, _path: &Path) -> Option<f64> {
            self.fps
        }
    }

    fn compressor() -> Compressor {
        Compressor::new(
            Arc::new(ToolRegistry::empty()),
            Vec::new(),
            CompressionConfig::default(),
        )
    }

    fn write_file(dir: &Path, name: &str, size: usize) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, vec![7u8; size]).unwrap();
        p
    }

    fn quality_of(knob: Knob) -> u8 {
        match knob {
            Knob::Quality(q) => q,
            other => panic!("unexpected knob {other:?}"),
        }
    }

    #[test]
    fn kind_from_extension() {
        assert_eq!(CompressionKind::from_extension("JPG"), Some(CompressionKind::Image));
        assert_eq!(CompressionKind::from_extension("gif"), Some(CompressionKind::Gif));
        assert_eq!(CompressionKind::from_extension("mov"), Some(CompressionKind::Video));
        assert_eq!(CompressionKind::from_extension("bmp"), None);
        assert_eq!(
            CompressionKind::from_path(Path::new("/x/clip.webm")),
            Some(CompressionKind::Video)
        );
    }

    #[test]
    fn knob_labels() {
        assert_eq!(Knob::Quality(70).label(), "q70");
        assert_eq!(Knob::Fps(8.0).label(), "fps8");
        assert_eq!(Knob::Fps(0.5).label(), "fps0.5");
        assert_eq!(Knob::BitrateKbps(320).to_string(), "320k");
    }

    #[tokio::test]
    async fn within_target_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "small.jpg", 1_000);
        let encoder = FakeEncoder::new(|_| Some(10));
        let c = compressor().with_image_encoder(encoder.clone());

        let out = c
            .compress_to_target_size(&file, 1_000, CompressionKind::Image)
            .await
            .unwrap();
        assert_eq!(out.path, file);
        assert_eq!(out.trials, 0);
        assert!(!out.degraded);
        assert!(encoder.calls().is_empty());
    }

    #[tokio::test]
    async fn unreadable_input_is_an_error() {
        let err = compressor()
            .compress_to_target_size(Path::new("/nonexistent/a.png"), 10, CompressionKind::Image)
            .await
            .unwrap_err();
        assert!(matches!(err, mm_core::Error::Io { .. }));
    }

    #[tokio::test]
    async fn image_under_target_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "photo.jpg", 500_000);
        // Size grows linearly with quality: 5 KB per point.
        let encoder = FakeEncoder::new(|k| Some(quality_of(k) as usize * 5_000));
        let c = compressor().with_image_encoder(encoder.clone());

        let out = c
            .compress_to_target_size(&file, 200_000, CompressionKind::Image)
            .await
            .unwrap();
        assert!(!out.degraded);
        assert!(out.final_size <= 200_000);
        assert_eq!(std::fs::metadata(&file).unwrap().len(), out.final_size);
        // 40 lands exactly at 200 KB; the search finds it by refining
        // between 30 and 50.
        assert_eq!(out.final_size, 200_000);

        // Only the original remains in the directory.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let calls_before = encoder.calls().len();
        let again = c
            .compress_to_target_size(&file, 200_000, CompressionKind::Image)
            .await
            .unwrap();
        assert_eq!(again.trials, 0);
        assert_eq!(again.final_size, out.final_size);
        assert_eq!(encoder.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn unreachable_target_keeps_smallest_trial() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "photo.webp", 500_000);
        let encoder = FakeEncoder::new(|k| Some(300_000 + quality_of(k) as usize * 1_000));
        let c = compressor().with_image_encoder(encoder.clone());

        let out = c
            .compress_to_target_size(&file, 100_000, CompressionKind::Image)
            .await
            .unwrap();
        assert!(!out.degraded);
        assert_eq!(out.final_size, 305_000); // the floor quality
        assert!(out.warning.is_some());
        assert!(out.final_size < out.original_size);
    }

    #[tokio::test]
    async fn never_returns_larger_than_original() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "tiny.png", 50_000);
        let encoder = FakeEncoder::new(|_| Some(80_000));
        let c = compressor().with_image_encoder(encoder);

        let out = c
            .compress_to_target_size(&file, 10_000, CompressionKind::Image)
            .await
            .unwrap();
        assert!(out.degraded);
        assert_eq!(out.final_size, 50_000);
        assert_eq!(std::fs::read(&file).unwrap(), vec![7u8; 50_000]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn all_trials_failing_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "anim.gif", 90_000);
        let encoder = FakeEncoder::new(|_| None);
        let c = compressor()
            .with_gif_encoder(encoder.clone())
            .with_probe(Arc::new(FixedProbe { duration: None, fps: Some(3.0) }));

        let out = c
            .compress_to_target_size(&file, 10_000, CompressionKind::Gif)
            .await
            .unwrap();
        assert!(out.degraded);
        assert!(out.warning.unwrap().contains("encoder exploded"));
        // 3, 2, 1 and the final half-fps probe.
        assert_eq!(encoder.calls().len(), 4);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn gif_ladder_is_capped_for_bogus_frame_rates() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "anim.gif", 90_000);
        let encoder = FakeEncoder::new(|_| None);
        let c = compressor()
            .with_gif_encoder(encoder.clone())
            .with_probe(Arc::new(FixedProbe { duration: None, fps: Some(1000.0) }));

        let out = c
            .compress_to_target_size(&file, 10_000, CompressionKind::Gif)
            .await
            .unwrap();
        assert!(out.degraded);
        let calls = encoder.calls();
        assert_eq!(calls.first(), Some(&Knob::Fps(60.0)));
        // 60 down to 1, then half fps.
        assert_eq!(calls.len(), 61);
    }

    #[tokio::test]
    async fn video_is_single_shot_at_budgeted_bitrate() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "clip.mp4", 5_000_000);
        let encoder = FakeEncoder::new(|_| Some(900_000));
        let c = compressor()
            .with_video_encoder(encoder.clone())
            .with_probe(Arc::new(FixedProbe { duration: Some(20.0), fps: None }));

        let out = c
            .compress_to_target_size(&file, 1_000_000, CompressionKind::Video)
            .await
            .unwrap();
        assert_eq!(out.trials, 1);
        assert_eq!(out.final_size, 900_000);
        // floor(1_000_000 * 8 * 0.97 / 20 / 1000) = 388
        assert_eq!(encoder.calls(), vec![Knob::BitrateKbps(388)]);
    }

    #[tokio::test]
    async fn video_without_duration_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "clip.webm", 2_000_000);
        let encoder = FakeEncoder::new(|_| Some(1_000));
        let c = compressor()
            .with_video_encoder(encoder.clone())
            .with_probe(Arc::new(NullProbe));

        c.compress_to_target_size(&file, 100_000, CompressionKind::Video)
            .await
            .unwrap();
        // floor(100_000 * 8 * 0.97 / 10 / 1000) = 77
        assert_eq!(encoder.calls(), vec![Knob::BitrateKbps(77)]);
    }
}
