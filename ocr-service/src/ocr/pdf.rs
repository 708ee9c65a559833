//! PDF rasterization via poppler's `pdftoppm`.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};
use tempfile::TempDir;
use tracing::{info, instrument};

use super::run_tool;
use crate::config::OcrConfig;
use crate::extraction::ExtractionError;

/// Which pages to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pages {
    All,
    First,
}

/// PNG renderings of a PDF's pages, in page order.
///
/// The images live in a temporary directory that is removed when this value is dropped.
#[derive(Debug)]
pub struct RenderedPages {
    _dir: TempDir,
    pages: Vec<PathBuf>,
}

impl RenderedPages {
    pub fn paths(&self) -> &[PathBuf] {
        &self.pages
    }

    pub fn first(&self) -> Option<&Path> {
        self.pages.first().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PdfRasterizer {
    program: String,
    dpi: u32,
    timeout: Duration,
}

impl PdfRasterizer {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            program: config.pdftoppm_path.clone(),
            dpi: config.pdf_dpi,
            timeout: config.timeout,
        }
    }

    #[instrument(skip(self), fields(dpi = self.dpi), err)]
    pub async fn render(&self, pdf: &Path, pages: Pages) -> Result<RenderedPages, ExtractionError> {
        let dir = tempfile::Builder::new().prefix("ocr-pages-").tempdir()?;
        let args = self.args(pdf, dir.path(), pages);
        run_tool(&self.program, args, self.timeout).await?;

        let mut rendered = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "png") {
                rendered.push(path);
            }
        }
        // pdftoppm zero-pads page numbers to a common width, so name order is page order
        rendered.sort();

        if rendered.is_empty() {
            return Err(ExtractionError::EmptyPdf);
        }

        info!(pages = rendered.len(), "Rasterized PDF");
        Ok(RenderedPages {
            _dir: dir,
            pages: rendered,
        })
    }

    fn args(&self, pdf: &Path, out_dir: &Path, pages: Pages) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-r".into(), self.dpi.to_string().into(), "-png".into()];
        if pages == Pages::First {
            args.extend(["-f".into(), "1".into(), "-l".into(), "1".into()]);
        }
        args.push(pdf.as_os_str().to_owned());
        args.push(out_dir.join("page").into_os_string());
        args
    }
}
