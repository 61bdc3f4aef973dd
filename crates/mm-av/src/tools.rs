//! External tool detection and management.
//!
//! The [`ToolRegistry`] discovers and caches the locations of the external
//! CLI tools (ffmpeg, ffprobe, ImageMagick, LibreOffice, 7z, rar, zip) and
//! hands out preconfigured [`ToolCommand`]s for the rest of the crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mm_core::config::ToolsConfig;
use mm_core::{Error, Result};

use crate::command::{ToolCommand, DEFAULT_TIMEOUT};

/// Static description of a tool the registry knows how to find.
struct KnownTool {
    name: &'static str,
    /// Binaries tried on `PATH`, in order.
    binaries: &'static [&'static str],
    version_arg: &'static str,
    required: bool,
    description: &'static str,
}

const KNOWN_TOOLS: &[KnownTool] = &[
    KnownTool {
        name: "ffmpeg",
        binaries: &["ffmpeg"],
        version_arg: "-version",
        required: true,
        description: "Video/Audio conversion",
    },
    KnownTool {
        name: "ffprobe",
        binaries: &["ffprobe"],
        version_arg: "-version",
        required: false,
        description: "Duration and frame-rate probing",
    },
    KnownTool {
        name: "magick",
        binaries: &["magick", "convert"],
        version_arg: "--version",
        required: true,
        description: "Image conversion",
    },
    KnownTool {
        name: "libreoffice",
        binaries: &["libreoffice", "soffice"],
        version_arg: "--version",
        required: true,
        description: "Document conversion",
    },
    KnownTool {
        name: "7z",
        binaries: &["7z", "7za"],
        version_arg: "i",
        required: false,
        description: "7Z archive creation, ZIP fallback",
    },
    KnownTool {
        name: "rar",
        binaries: &["rar"],
        version_arg: "-?",
        required: false,
        description: "RAR archive creation",
    },
    KnownTool {
        name: "zip",
        binaries: &["zip"],
        version_arg: "-v",
        required: false,
        description: "ZIP archive creation (fallback)",
    },
];

/// A resolved external tool.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Registry name (e.g. "ffmpeg").
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
    /// Maximum execution time before the tool is killed.
    pub timeout: Duration,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// First line of the tool's version output, if it reported one.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
    /// Whether conversions of a core family depend on it.
    pub required: bool,
    /// What the tool is used for.
    pub description: String,
}

/// Which format families can currently be produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyAvailability {
    pub image: bool,
    pub video: bool,
    pub audio: bool,
    pub document: bool,
    pub zip: bool,
    #[serde(rename = "7z")]
    pub seven_zip: bool,
    pub rar: bool,
}

/// Aggregate tool status for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsSummary {
    pub tools: Vec<ToolInfo>,
    pub all_required_available: bool,
    pub families: FamilyAvailability,
}

/// Registry holding discovered tool configurations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
    timeout: Duration,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// For each known tool, if the [`ToolsConfig`] supplies a custom path
    /// **and** that path exists, it is used directly. Otherwise each of the
    /// tool's binary names is looked up with [`which::which`]. Tools that are
    /// not found are omitted from the registry.
    pub fn discover(tools_config: &ToolsConfig) -> Self {
        let timeout = tools_config.timeout();
        let mut tools = HashMap::new();

        for known in KNOWN_TOOLS {
            let resolved = match tools_config.path_for(known.name) {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(
                        tool = known.name,
                        path = %p.display(),
                        "Configured tool path does not exist; searching PATH"
                    );
                    find_on_path(known.binaries)
                }
                None => find_on_path(known.binaries),
            };

            if let Some(path) = resolved {
                tracing::debug!(tool = known.name, path = %path.display(), "Discovered tool");
                tools.insert(
                    known.name.to_string(),
                    ToolConfig {
                        name: known.name.to_string(),
                        path,
                        timeout,
                    },
                );
            }
        }

        Self { tools, timeout }
    }

    /// An empty registry. Every lookup fails; useful when no tool may run.
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Register (or replace) a tool at an explicit path.
    pub fn with_tool(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.tools.insert(
            name.to_string(),
            ToolConfig {
                name: name.to_string(),
                path: path.into(),
                timeout: self.timeout,
            },
        );
        self
    }

    /// Per-invocation timeout handed to every command built here.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Return the [`ToolConfig`] for the given tool, or
    /// [`Error::CommandNotFound`] if the tool was not found during discovery.
    pub fn require(&self, name: &str) -> Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| {
            Error::command_not_found(name, format!("{name} not found; is it installed and in PATH?"))
        })
    }

    /// Whether the tool was discovered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// A [`ToolCommand`] for the named tool with its path and timeout set.
    pub fn command(&self, name: &str) -> Result<ToolCommand> {
        let tool = self.require(name)?;
        let mut cmd = ToolCommand::new(tool.path.clone());
        cmd.timeout(tool.timeout);
        Ok(cmd)
    }

    /// A [`ToolCommand`] for an arbitrary program path using the registry's
    /// timeout. Used for candidate lists that bypass discovery.
    pub fn command_for_path(&self, program: &Path) -> ToolCommand {
        let mut cmd = ToolCommand::new(program);
        cmd.timeout(self.timeout);
        cmd
    }

    /// Check all known tools and return availability information.
    pub async fn check_all(&self) -> Vec<ToolInfo> {
        let mut infos = Vec::with_capacity(KNOWN_TOOLS.len());
        for known in KNOWN_TOOLS {
            let info = match self.tools.get(known.name) {
                Some(cfg) => ToolInfo {
                    name: known.name.to_string(),
                    available: true,
                    version: detect_version(&cfg.path, known.version_arg).await,
                    path: Some(cfg.path.clone()),
                    required: known.required,
                    description: known.description.to_string(),
                },
                None => ToolInfo {
                    name: known.name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                    required: known.required,
                    description: known.description.to_string(),
                },
            };
            infos.push(info);
        }
        infos
    }

    /// Tool availability plus the format families it enables.
    pub async fn summary(&self) -> ToolsSummary {
        let tools = self.check_all().await;
        let all_required_available = tools.iter().filter(|t| t.required).all(|t| t.available);
        let families = FamilyAvailability {
            // The in-process encoder always covers the common raster formats.
            image: true,
            video: self.has("ffmpeg"),
            audio: self.has("ffmpeg"),
            document: self.has("libreoffice"),
            // Zip archives are written in process.
            zip: true,
            seven_zip: self.has("7z"),
            rar: self.has("rar"),
        };
        ToolsSummary {
            tools,
            all_required_available,
            families,
        }
    }
}

fn find_on_path(binaries: &[&str]) -> Option<PathBuf> {
    binaries.iter().find_map(|b| which::which(b).ok())
}

/// Run the tool's version command with a short timeout and return the first
/// non-empty output line.
async fn detect_version(path: &Path, version_arg: &str) -> Option<String> {
    let mut cmd = ToolCommand::new(path);
    cmd.arg(version_arg).timeout(Duration::from_secs(5));

    // Several tools print usage to stderr and exit non-zero for the version
    // flag; any output still counts.
    let text = match cmd.execute().await {
        Ok(out) => format!("{}\n{}", out.stdout, out.stderr),
        Err(Error::CommandFailed { message, .. }) => message,
        Err(_) => return None,
    };

    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_with_default_config() {
        let cfg = ToolsConfig::default();
        let registry = ToolRegistry::discover(&cfg);
        // We cannot guarantee any tool is installed in CI,
        // but discovery itself must not panic.
        assert_eq!(registry.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn require_missing_tool_returns_command_not_found() {
        let registry = ToolRegistry::empty();
        let result = registry.require("ffmpeg");
        assert!(matches!(result, Err(Error::CommandNotFound { .. })));
    }

    #[test]
    fn explicit_path_wins_when_it_exists() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("my-ffmpeg");
        std::fs::write(&fake, "").unwrap();

        let cfg = ToolsConfig {
            ffmpeg_path: Some(fake.clone()),
            ..ToolsConfig::default()
        };
        let registry = ToolRegistry::discover(&cfg);
        assert_eq!(registry.require("ffmpeg").unwrap().path, fake);
    }

    #[test]
    fn command_carries_path_and_timeout() {
        let registry = ToolRegistry::empty().with_tool("7z", "/opt/bin/7z");
        let cmd = registry.command("7z").unwrap();
        assert_eq!(cmd.program(), Path::new("/opt/bin/7z"));
        assert!(registry.command("rar").is_err());
    }

    #[tokio::test]
    async fn check_all_returns_known_tools() {
        let registry = ToolRegistry::empty();
        let infos = registry.check_all().await;
        let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            names,
            ["ffmpeg", "ffprobe", "magick", "libreoffice", "7z", "rar", "zip"]
        );
        assert!(infos.iter().all(|i| !i.available));
    }

    #[tokio::test]
    async fn summary_of_empty_registry() {
        let summary = ToolRegistry::empty().summary().await;
        assert!(!summary.all_required_available);
        assert!(summary.families.image);
        assert!(!summary.families.video);
        assert!(summary.families.zip);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["families"]["7z"], false);
    }
}
