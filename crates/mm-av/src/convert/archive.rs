//! Archive creation: zip in process, 7z and rar through their CLIs.
//!
//! Archives hold a single entry named after the input's bare file name.
//! External archivers are run from the input's directory for that reason.

use std::fs::File;
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use mm_core::{Error, Result};

use super::{ensure_output, stage_error, Converter};
use crate::command::ToolCommand;

fn entry_parts(input: &Path) -> Result<(&Path, String)> {
    let dir = input
        .parent()
        .ok_or_else(|| Error::Internal("input has no parent directory".into()))?;
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Internal("input has no file name".into()))?;
    Ok((dir, name))
}

async fn run(mut cmd: ToolCommand, input: &Path, output: &Path) -> Result<()> {
    let (dir, name) = entry_parts(input)?;
    cmd.current_dir(dir);
    cmd.arg(name);
    cmd.execute().await?;
    ensure_output(output)
}

async fn sevenzip(conv: &Converter, input: &Path, output: &Path, zip: bool) -> Result<()> {
    let mut cmd = conv.tools.command("7z")?;
    cmd.arg("a");
    if zip {
        cmd.arg("-tzip");
    }
    cmd.path_arg(output);
    run(cmd, input, output).await
}

/// Write `input` as the only deflated entry of a new zip at `output`.
fn write_zip(input: &Path, output: &Path) -> Result<()> {
    let (_, name) = entry_parts(input)?;
    let mut src = File::open(input)?;
    let large = src.metadata()?.len() >= u64::from(u32::MAX);

    let mut zip = ZipWriter::new(File::create(output)?);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(large);
    zip.start_file(name, options).map_err(zip_error)?;
    std::io::copy(&mut src, &mut zip)?;
    zip.finish().map_err(zip_error)?;
    Ok(())
}

fn zip_error(e: zip::result::ZipError) -> Error {
    match e {
        zip::result::ZipError::Io(source) => Error::Io { source },
        other => Error::Internal(format!("zip writer: {other}")),
    }
}

pub(super) async fn create_zip(conv: &Converter, input: &Path, output: &Path) -> Result<()> {
    let (src, dst) = (input.to_path_buf(), output.to_path_buf());
    let written = tokio::task::spawn_blocking(move || write_zip(&src, &dst))
        .await
        .map_err(|e| Error::Internal(format!("zip task failed: {e}")))
        .and_then(|r| r);

    match written {
        Ok(()) => ensure_output(output),
        Err(e) => {
            tracing::warn!(error = %e, "In-process zip failed; trying external archivers");
            let _ = std::fs::remove_file(output);
            create_zip_with_tools(conv, input, output).await
        }
    }
}

/// Zip through `7z a -tzip`, then the `zip` CLI.
pub(super) async fn create_zip_with_tools(
    conv: &Converter,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let first = match sevenzip(conv, input, output, true).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    tracing::debug!(error = %first, "7z unavailable for zip; trying zip");
    let _ = std::fs::remove_file(output);

    let zip = async {
        let mut cmd = conv.tools.command("zip")?;
        cmd.args(["-q", "-r"]).path_arg(output);
        run(cmd, input, output).await
    };
    zip.await
        .map_err(|e| stage_error("ZIP creation", "ensure 7-Zip or zip is installed", e))
}

pub(super) async fn create_7z(conv: &Converter, input: &Path, output: &Path) -> Result<()> {
    sevenzip(conv, input, output, false)
        .await
        .map_err(|e| stage_error("7z conversion", "ensure 7-Zip is installed", e))
}

pub(super) async fn create_rar(conv: &Converter, input: &Path, output: &Path) -> Result<()> {
    let rar = async {
        let mut cmd = conv.tools.command("rar")?;
        cmd.arg("a").path_arg(output);
        run(cmd, input, output).await
    };
    rar.await.map_err(|e| {
        stage_error(
            "RAR conversion",
            "ensure WinRAR or rar command is installed",
            e,
        )
    })
}
