//! Format conversion.
//!
//! [`Converter::convert_file`] validates a request, classifies the target
//! format into a [`FormatFamily`] and dispatches to that family's tool chain.
//! Output always lands in a fresh `{uuid}.{ext}` file beside the input; a
//! failed conversion leaves nothing behind.

mod archive;
mod document;
pub mod formats;
pub mod media;
mod options;
mod raster;

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mm_core::config::ToolsConfig;
use mm_core::{Error, Result};

use crate::tools::ToolRegistry;

pub use formats::{supported_formats, FormatFamily};
pub use options::ConversionOptions;

/// Longest accepted target-format name.
const MAX_FORMAT_LEN: usize = 10;

/// Dispatches conversion requests to external tools.
#[derive(Debug, Clone)]
pub struct Converter {
    tools: Arc<ToolRegistry>,
    image_candidates: Vec<PathBuf>,
}

impl Converter {
    /// Build a converter over a discovered registry.
    ///
    /// Image conversion tries the registry's ImageMagick first (when found),
    /// then each configured candidate in order.
    pub fn new(tools: Arc<ToolRegistry>, tools_config: &ToolsConfig) -> Self {
        let mut image_candidates = Vec::new();
        if let Ok(magick) = tools.require("magick") {
            image_candidates.push(magick.path.clone());
        }
        for c in &tools_config.image_tool_candidates {
            if !image_candidates.contains(c) {
                image_candidates.push(c.clone());
            }
        }
        Self {
            tools,
            image_candidates,
        }
    }

    /// Replace the image tool candidate list.
    pub fn with_image_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.image_candidates = candidates;
        self
    }

    /// The tool registry this converter runs against.
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Image tool binaries in the order they are tried.
    pub fn image_candidates(&self) -> &[PathBuf] {
        &self.image_candidates
    }

    /// Convert `input` into `target_format`, returning the absolute path of
    /// the newly created output file.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for a missing input, a malformed format name or
    ///   bad options. Nothing is spawned.
    /// - [`Error::UnsupportedFormat`] when no family claims the format.
    ///   Nothing is spawned.
    /// - [`Error::ConversionFailed`] naming the failed stage, carrying the
    ///   underlying tool message.
    pub async fn convert_file(
        &self,
        input: &Path,
        target_format: &str,
        options: &ConversionOptions,
    ) -> Result<PathBuf> {
        let ext = normalize_format(target_format)?;
        if !input.exists() {
            return Err(Error::validation(format!(
                "Input file does not exist: {}",
                input.display()
            )));
        }
        options.validate()?;

        let family = FormatFamily::classify(&ext)
            .ok_or_else(|| Error::UnsupportedFormat(target_format.to_string()))?;

        let input = std::fs::canonicalize(input)?;
        let out_dir = input
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::validation("input has no parent directory"))?;
        let output = out_dir.join(format!("{}.{ext}", uuid::Uuid::new_v4()));

        tracing::info!(
            input = %input.display(),
            format = %ext,
            family = %family,
            "Starting conversion"
        );

        let result = match family {
            FormatFamily::Image => raster::convert(self, &input, &output, &ext, options).await,
            FormatFamily::Video => media::convert_video(self, &input, &output, &ext, options).await,
            FormatFamily::Audio => media::convert_audio(self, &input, &output, options).await,
            FormatFamily::Document => document::convert(self, &input, &output, &ext).await,
            FormatFamily::Zip => archive::create_zip(self, &input, &output).await,
            FormatFamily::SevenZip => archive::create_7z(self, &input, &output).await,
            FormatFamily::Rar => archive::create_rar(self, &input, &output).await,
        };

        match result {
            Ok(()) => {
                tracing::info!(output = %output.display(), "Conversion finished");
                Ok(output)
            }
            Err(e) => {
                remove_partial(&output);
                tracing::warn!(input = %input.display(), format = %ext, error = %e, "Conversion failed");
                Err(e)
            }
        }
    }
}

/// Lowercase and trim a format name, then check it is 1-10 ASCII
/// alphanumerics.
pub fn normalize_format(target_format: &str) -> Result<String> {
    let ext = target_format.trim().to_ascii_lowercase();
    if ext.is_empty() {
        return Err(Error::validation("targetFormat is required"));
    }
    if !ext
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    {
        return Err(Error::validation(format!("Invalid format: {target_format}")));
    }
    if ext.len() > MAX_FORMAT_LEN {
        return Err(Error::validation("Format name too long"));
    }
    Ok(ext)
}

/// Build a [`Error::ConversionFailed`] from a stage, an install hint and the
/// underlying failure.
pub(crate) fn stage_error(stage: &str, hint: &str, cause: impl Display) -> Error {
    Error::conversion(stage, format!("{hint} - {cause}"))
}

/// Fail unless the tool actually produced `output`.
pub(crate) fn ensure_output(output: &Path) -> Result<()> {
    if output.exists() {
        Ok(())
    } else {
        Err(Error::Internal("Conversion produced no output".into()))
    }
}

fn remove_partial(output: &Path) {
    if output.exists() {
        if let Err(e) = std::fs::remove_file(output) {
            tracing::warn!(path = %output.display(), error = %e, "Failed to remove partial output");
        }
    }
}
