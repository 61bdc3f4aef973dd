//! # mm-av
//!
//! External tool execution, format conversion and size-targeted compression
//! for mediamill.
//!
//! This crate provides:
//!
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for running external processes.
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg,
//!   ffprobe, ImageMagick, LibreOffice, 7z, rar and zip.
//! - **Probing** ([`MediaProbe`], [`FfprobeProbe`]) -- duration and frame
//!   rate via ffprobe.
//! - **Conversion** ([`Converter`]) -- target-format dispatch to the right
//!   tool chain.
//! - **Compression** ([`Compressor`]) -- quality, frame-rate and bitrate
//!   searches toward a byte budget, with trials kept in a
//!   [`TrialWorkspace`].

pub mod command;
pub mod compress;
pub mod convert;
pub mod probe;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use compress::{CompressionKind, CompressionOutcome, Compressor, Knob, TrialEncoder};
pub use convert::{supported_formats, ConversionOptions, Converter, FormatFamily};
pub use probe::{FfprobeProbe, MediaProbe, NullProbe};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry, ToolsSummary};
pub use workspace::TrialWorkspace;
