//! Local OCR engine adapter.
//!
//! Text recognition shells out to the `tesseract` executable; PDFs are first rasterized with
//! `pdftoppm` (see [`pdf`]). Both run under `tokio::process` with a timeout and `kill_on_drop`,
//! so an abandoned request does not leave a stray process behind.
//!
//! The engine sits behind the [`TextRecognizer`] trait so the rest of the service (and its tests)
//! never depend on a system binary directly.

pub mod pdf;

use async_trait::async_trait;
use std::{ffi::OsStr, path::Path, process::Stdio, time::Duration};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::OcrConfig;
use crate::extraction::ExtractionError;

/// Turns an image on disk into plain text.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &Path) -> Result<String, ExtractionError>;
}

/// [`TextRecognizer`] backed by the Tesseract command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: String,
    languages: String,
    timeout: Duration,
}

impl TesseractCli {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            program: config.tesseract_path.clone(),
            languages: config.languages.join("+"),
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl TextRecognizer for TesseractCli {
    #[instrument(skip(self), fields(languages = %self.languages), err)]
    async fn recognize(&self, image: &Path) -> Result<String, ExtractionError> {
        let args = [image.as_os_str(), OsStr::new("stdout"), OsStr::new("-l"), OsStr::new(&self.languages)];
        let stdout = run_tool(&self.program, args, self.timeout).await?;
        let text = String::from_utf8(stdout).map_err(|_| ExtractionError::InvalidText)?;
        Ok(join_lines(&text))
    }
}

/// Collapse recognizer output to a single line: trim each line, drop blanks, join with a space.
pub fn join_lines(text: &str) -> String {
    text.lines().map(str::trim).filter(|line| !line.is_empty()).collect::<Vec<_>>().join(" ")
}

/// Run an external tool to completion and return its stdout.
///
/// A non-zero exit carries stderr (or stdout, if stderr is empty) in the error.
pub(crate) async fn run_tool<I, S>(program: &str, args: I, limit: Duration) -> Result<Vec<u8>, ExtractionError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExtractionError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(result) => result?,
        // the child is dropped with the future and killed
        Err(_) => {
            return Err(ExtractionError::Timeout {
                program: program.to_string(),
                timeout: limit,
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(ExtractionError::ToolFailed {
            program: program.to_string(),
            code: output.status.code().unwrap_or(-1),
            detail,
        });
    }

    debug!(program, bytes = output.stdout.len(), "External tool finished");
    Ok(output.stdout)
}
