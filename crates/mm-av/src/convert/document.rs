//! Document conversion through LibreOffice.

use std::path::{Path, PathBuf};

use mm_core::{Error, Result};

use super::{stage_error, Converter};

const STAGE: &str = "Document conversion";
const HINT: &str = "ensure LibreOffice (soffice) is installed";

/// LibreOffice binaries in the order they are tried. A discovered or
/// configured binary is used alone; otherwise both names go to `PATH`.
fn candidates(conv: &Converter) -> Vec<PathBuf> {
    match conv.tools.require("libreoffice") {
        Ok(cfg) => vec![cfg.path.clone()],
        Err(_) => vec![PathBuf::from("libreoffice"), PathBuf::from("soffice")],
    }
}

/// LibreOffice names its output after the input stem and writes it into
/// `--outdir`, so conversion happens in a private staging directory and the
/// result is then moved to the unique output path.
pub(super) async fn convert(
    conv: &Converter,
    input: &Path,
    output: &Path,
    ext: &str,
) -> Result<()> {
    let out_dir = output
        .parent()
        .ok_or_else(|| Error::Internal("output has no parent directory".into()))?;
    let staging = tempfile::Builder::new()
        .prefix(".mediamill-doc-")
        .tempdir_in(out_dir)
        .map_err(|e| stage_error(STAGE, HINT, e))?;

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let produced = staging.path().join(format!("{stem}.{ext}"));

    let mut last_error: Option<Error> = None;
    for program in candidates(conv) {
        let mut cmd = conv.tools.command_for_path(&program);
        cmd.args(["--headless", "--convert-to", ext, "--outdir"])
            .path_arg(staging.path())
            .path_arg(input);

        match cmd.execute().await {
            Ok(_) if produced.exists() => {
                if std::fs::rename(&produced, output).is_err() {
                    std::fs::copy(&produced, output).map_err(|e| stage_error(STAGE, HINT, e))?;
                }
                return Ok(());
            }
            Ok(_) => {
                last_error = Some(Error::Internal(
                    "LibreOffice conversion produced no output".into(),
                ));
            }
            Err(e) => {
                tracing::debug!(tool = %program.display(), error = %e, "Document converter candidate failed");
                last_error = Some(e);
            }
        }
    }

    let cause = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "command not found".to_string());
    Err(stage_error(STAGE, HINT, cause))
}
