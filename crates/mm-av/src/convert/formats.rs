//! Target-format classification.
//!
//! Every supported target extension belongs to exactly one [`FormatFamily`];
//! the family decides which tool chain produces it.

use std::fmt;

use phf::phf_map;
use serde::Serialize;

/// Tool-chain family a target format is produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatFamily {
    Image,
    Video,
    Audio,
    Document,
    Zip,
    #[serde(rename = "7z")]
    SevenZip,
    Rar,
}

static FORMAT_FAMILIES: phf::Map<&'static str, FormatFamily> = phf_map! {
    // image
    "jpg" => FormatFamily::Image,
    "jpeg" => FormatFamily::Image,
    "png" => FormatFamily::Image,
    "webp" => FormatFamily::Image,
    "tiff" => FormatFamily::Image,
    "gif" => FormatFamily::Image,
    "bmp" => FormatFamily::Image,
    "svg" => FormatFamily::Image,
    "ico" => FormatFamily::Image,
    // video
    "mp4" => FormatFamily::Video,
    "mkv" => FormatFamily::Video,
    "webm" => FormatFamily::Video,
    "avi" => FormatFamily::Video,
    "mov" => FormatFamily::Video,
    "wmv" => FormatFamily::Video,
    "flv" => FormatFamily::Video,
    "m3u8" => FormatFamily::Video,
    "mpg" => FormatFamily::Video,
    "mpeg" => FormatFamily::Video,
    // audio
    "mp3" => FormatFamily::Audio,
    "wav" => FormatFamily::Audio,
    "flac" => FormatFamily::Audio,
    "aac" => FormatFamily::Audio,
    "ogg" => FormatFamily::Audio,
    "m4a" => FormatFamily::Audio,
    "wma" => FormatFamily::Audio,
    "opus" => FormatFamily::Audio,
    // document
    "pdf" => FormatFamily::Document,
    "docx" => FormatFamily::Document,
    "odt" => FormatFamily::Document,
    "html" => FormatFamily::Document,
    "txt" => FormatFamily::Document,
    "pptx" => FormatFamily::Document,
    "xlsx" => FormatFamily::Document,
    "rtf" => FormatFamily::Document,
    "doc" => FormatFamily::Document,
    // archives
    "zip" => FormatFamily::Zip,
    "7z" => FormatFamily::SevenZip,
    "rar" => FormatFamily::Rar,
};

impl FormatFamily {
    /// All families in display order.
    pub const ALL: [FormatFamily; 7] = [
        FormatFamily::Image,
        FormatFamily::Video,
        FormatFamily::Audio,
        FormatFamily::Document,
        FormatFamily::Zip,
        FormatFamily::SevenZip,
        FormatFamily::Rar,
    ];

    /// Classify a normalized (lowercase) target extension.
    pub fn classify(ext: &str) -> Option<FormatFamily> {
        FORMAT_FAMILIES.get(ext).copied()
    }

    /// Short lowercase name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatFamily::Image => "image",
            FormatFamily::Video => "video",
            FormatFamily::Audio => "audio",
            FormatFamily::Document => "document",
            FormatFamily::Zip => "zip",
            FormatFamily::SevenZip => "7z",
            FormatFamily::Rar => "rar",
        }
    }

    /// Every target extension in this family, sorted.
    pub fn formats(&self) -> Vec<&'static str> {
        let mut out: Vec<&'static str> = FORMAT_FAMILIES
            .entries()
            .filter(|(_, fam)| *fam == self)
            .map(|(ext, _)| *ext)
            .collect();
        out.sort_unstable();
        out
    }
}

impl fmt::Display for FormatFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported target formats grouped by family.
pub fn supported_formats() -> Vec<(FormatFamily, Vec<&'static str>)> {
    FormatFamily::ALL
        .iter()
        .map(|fam| (*fam, fam.formats()))
        .collect()
}
